use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::info;

use crate::api::{AttendanceRepository, ImportOutcome};
use crate::column_mapper::{build_preview, validate_headers, ImportPreview, PREVIEW_ROW_LIMIT};
use crate::spreadsheet::read_table;

/// `import`サブコマンドの引数。
#[derive(Debug, clap::Subcommand)]
pub enum ImportArgs {
    /// Shows how the file will be read before uploading it
    Preview(PreviewArgs),
    /// Uploads the file to the server
    Upload(UploadArgs),
}

#[derive(Debug, clap::Args)]
pub struct PreviewArgs {
    #[clap(help = "CSV file to preview")]
    file: PathBuf,

    #[clap(
        short = 'n',
        long = "rows",
        help = "Number of data rows to show",
        default_value_t = PREVIEW_ROW_LIMIT
    )]
    rows: usize,
}

#[derive(Debug, clap::Args)]
pub struct UploadArgs {
    #[clap(help = "CSV file to upload")]
    file: PathBuf,
}

/// `import preview`サブコマンドの処理を行う。
///
/// ファイルを読み込み、必要な列が揃っていれば先頭の数行を整形して返す。
///
/// # Arguments
///
/// * `args` - `import preview`サブコマンドの引数
pub fn preview_import(args: &PreviewArgs) -> Result<ImportPreview> {
    let table = read_table(&args.file)?;
    let preview = build_preview(table, args.rows)
        .with_context(|| format!("Cannot import {}", args.file.display()))?;
    info!(
        "Previewing {} of {} rows from {}",
        preview.rows.len(),
        preview.total_rows,
        args.file.display()
    );

    Ok(preview)
}

pub struct ImportCommand<'a, T: AttendanceRepository> {
    repository: &'a T,
}

impl<'a, T: AttendanceRepository> ImportCommand<'a, T> {
    /// 新しい`ImportCommand`を返す。
    pub fn new(repository: &'a T) -> Self {
        Self { repository }
    }

    /// `import upload`サブコマンドの処理を行う。
    ///
    /// ヘッダー行に必要な列が揃っていない場合はアップロードしない。
    /// サーバーが取り込みを拒否した場合は、結果を返した上で呼び出し側がエラーとして扱う。
    pub async fn upload(&self, args: &UploadArgs) -> Result<ImportOutcome> {
        let table = read_table(&args.file)?;
        check_headers(&table)?;

        let content = std::fs::read(&args.file)
            .with_context(|| format!("Failed to read file: {}", args.file.display()))?;
        let outcome = self
            .repository
            .upload_import(&file_name(&args.file), content)
            .await
            .context("Failed to upload import file")?;
        info!("Import upload finished: success={}", outcome.success);

        Ok(outcome)
    }
}

fn check_headers(table: &[Vec<String>]) -> Result<()> {
    let Some(headers) = table
        .iter()
        .find(|row| row.iter().any(|cell| !cell.trim().is_empty()))
    else {
        bail!("The file does not contain a header row");
    };
    let validation = validate_headers(headers);
    if !validation.valid {
        bail!(
            "Missing required columns: {}",
            validation.missing_columns.join(", ")
        );
    }
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "import.csv".to_string())
}
