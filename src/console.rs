use std::io::Write;

use anyhow::{Context, Result};

use crate::api::ImportOutcome;
use crate::attendance::ValidatedAttendance;
use crate::biometric::ProgressEvent;
use crate::column_mapper::ImportPreview;
use crate::datetime::{to_display_time, DISPLAY_PLACEHOLDER};

/// Consoleに結果を表示するためのtrait。
pub trait ConsolePresenter {
    /// 検証済みのattendanceと勤務時間を表示する。
    ///
    /// # Arguments
    ///
    /// * `attendance` - 表示するattendance
    /// * `worked_hours` - 勤務時間。計算できない場合は`None`
    fn show_attendance(
        &mut self,
        attendance: &ValidatedAttendance,
        worked_hours: Option<f64>,
    ) -> Result<()>;

    /// 取り込みファイルのプレビューを表示する。
    fn show_preview(&mut self, preview: &ImportPreview) -> Result<()>;

    /// 取り込み結果を表示する。
    fn show_import_outcome(&mut self, outcome: &ImportOutcome) -> Result<()>;

    /// 生体認証ログ取得の進捗を表示する。
    fn show_progress(&mut self, event: &ProgressEvent) -> Result<()>;

    /// APIからのメッセージを表示する。
    fn show_message(&mut self, message: &str) -> Result<()>;
}

/// 結果をMarkdown形式で表示する。
pub struct ConsoleMarkdown<'a, W: Write> {
    writer: &'a mut W,
}

impl<'a, W: Write> ConsoleMarkdown<'a, W> {
    /// 新しい`ConsoleMarkdown`を返す。
    pub fn new(writer: &'a mut W) -> Self {
        Self { writer }
    }
}

fn display_time(value: &Option<String>) -> String {
    to_display_time(value.as_deref().unwrap_or_default())
}

/// Markdownの表のセルとして崩れないようにする。
fn escape_cell(cell: &str) -> String {
    cell.replace('|', "\\|").replace('\n', " ")
}

impl<'a, W: Write> ConsolePresenter for ConsoleMarkdown<'a, W> {
    fn show_attendance(
        &mut self,
        attendance: &ValidatedAttendance,
        worked_hours: Option<f64>,
    ) -> Result<()> {
        let end = match &attendance.next_day_timeout {
            Some(timeout) => format!("{} (next day)", to_display_time(timeout)),
            None => display_time(&attendance.time_out),
        };
        let shift = if attendance.is_nightshift {
            "night"
        } else {
            "regular"
        };
        let hours = worked_hours
            .map(|hours| format!("{:.2}", hours))
            .unwrap_or_else(|| DISPLAY_PLACEHOLDER.to_string());

        writeln!(self.writer, "- shift: {}", shift)
            .and_then(|_| {
                writeln!(
                    self.writer,
                    "- time: {} ~ {}",
                    to_display_time(&attendance.time_in),
                    end
                )
            })
            .and_then(|_| {
                writeln!(
                    self.writer,
                    "- break: {} ~ {}",
                    display_time(&attendance.break_out),
                    display_time(&attendance.break_in)
                )
            })
            .and_then(|_| writeln!(self.writer, "- trip: {:.2}", attendance.trip))
            .and_then(|_| writeln!(self.writer, "- hours: {}", hours))
            .with_context(|| format!("Failed to write attendance: {:?}", attendance))?;

        Ok(())
    }

    // プレビューを表形式で表示する。
    fn show_preview(&mut self, preview: &ImportPreview) -> Result<()> {
        let header_line = preview
            .headers
            .iter()
            .map(|header| escape_cell(header))
            .collect::<Vec<_>>()
            .join(" | ");
        let separator = vec!["---"; preview.headers.len()].join(" | ");
        writeln!(self.writer, "| {} |", header_line)
            .and_then(|_| writeln!(self.writer, "| {} |", separator))
            .context("Failed to write preview header")?;

        for row in &preview.rows {
            let cells = (0..preview.headers.len())
                .map(|index| row.get(index).map(|cell| escape_cell(cell)).unwrap_or_default())
                .collect::<Vec<_>>()
                .join(" | ");
            writeln!(self.writer, "| {} |", cells)
                .with_context(|| format!("Failed to write preview row: {:?}", row))?;
        }

        writeln!(
            self.writer,
            "\nShowing {} of {} rows",
            preview.rows.len(),
            preview.total_rows
        )
        .context("Failed to write preview summary")?;

        Ok(())
    }

    fn show_import_outcome(&mut self, outcome: &ImportOutcome) -> Result<()> {
        if let Some(message) = &outcome.message {
            writeln!(self.writer, "{}", message).context("Failed to write import message")?;
        }
        writeln!(
            self.writer,
            "- imported: {}\n- updated: {}\n- failed: {}",
            outcome.imported,
            outcome.updated,
            outcome.failures.len()
        )
        .context("Failed to write import counts")?;

        for failure in &outcome.failures {
            writeln!(
                self.writer,
                "  - row {}: {}",
                failure.row,
                failure.errors.join("; ")
            )
            .with_context(|| format!("Failed to write import failure: {:?}", failure))?;
        }
        for error in &outcome.errors {
            writeln!(self.writer, "- error: {}", error)
                .with_context(|| format!("Failed to write import error: {}", error))?;
        }

        Ok(())
    }

    fn show_progress(&mut self, event: &ProgressEvent) -> Result<()> {
        let line = match event {
            ProgressEvent::Progress {
                message,
                percent: Some(percent),
            } => format!("[{:>3.0}%] {}", percent, message),
            ProgressEvent::Progress {
                message,
                percent: None,
            } => format!("[ .. ] {}", message),
            ProgressEvent::Complete { message, fetched } => {
                format!("[done] {} ({} logs)", message, fetched)
            }
            ProgressEvent::Error { message } => format!("[fail] {}", message),
        };
        writeln!(self.writer, "{}", line)
            .with_context(|| format!("Failed to write progress: {:?}", event))?;

        Ok(())
    }

    fn show_message(&mut self, message: &str) -> Result<()> {
        writeln!(self.writer, "{}", message)
            .with_context(|| format!("Failed to write message: {}", message))?;

        Ok(())
    }
}
