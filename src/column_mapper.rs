use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use thiserror::Error;

use crate::datetime::{parse_time_of_day, to_meridiem_time};

/// プレビューに表示するデータ行の既定の上限。
pub const PREVIEW_ROW_LIMIT: usize = 10;

/// 取り込みに必要な列。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CanonicalField {
    EmployeeNo,
    Date,
    Day,
    In,
    Out,
    In2,
    Out2,
    NextDay,
    HoursWork,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 9] = [
        CanonicalField::EmployeeNo,
        CanonicalField::Date,
        CanonicalField::Day,
        CanonicalField::In,
        CanonicalField::Out,
        CanonicalField::In2,
        CanonicalField::Out2,
        CanonicalField::NextDay,
        CanonicalField::HoursWork,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalField::EmployeeNo => "employee_no",
            CanonicalField::Date => "date",
            CanonicalField::Day => "day",
            CanonicalField::In => "in",
            CanonicalField::Out => "out",
            CanonicalField::In2 => "in2",
            CanonicalField::Out2 => "out2",
            CanonicalField::NextDay => "next_day",
            CanonicalField::HoursWork => "hours_work",
        }
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 列ごとに受け付けるヘッダー名の表記ゆれ。
///
/// 比較は`normalize_header`を通した値同士で行うため、大文字小文字や空白の違いはここに書かなくてよい。
pub const COLUMN_VARIANTS: &[(CanonicalField, &[&str])] = &[
    (
        CanonicalField::EmployeeNo,
        &[
            "employee_no",
            "employee no",
            "employee_number",
            "employee_id",
            "emp_no",
            "idno",
            "id_no",
            "id",
        ],
    ),
    (
        CanonicalField::Date,
        &["date", "attendance_date", "work_date", "log_date"],
    ),
    (CanonicalField::Day, &["day", "weekday", "day_of_week"]),
    (CanonicalField::In, &["in", "time_in", "timein", "in1", "in_1"]),
    (
        CanonicalField::Out,
        &["out", "time_out", "timeout", "out1", "out_1"],
    ),
    (CanonicalField::In2, &["in2", "in_2", "time_in2", "time_in_2"]),
    (
        CanonicalField::Out2,
        &["out2", "out_2", "time_out2", "time_out_2"],
    ),
    (
        CanonicalField::NextDay,
        &["next_day", "nextday", "next_day_timeout", "next_day_out"],
    ),
    (
        CanonicalField::HoursWork,
        &[
            "hours_work",
            "hours_worked",
            "work_hours",
            "total_hours",
            "hours",
        ],
    ),
];

/// 自由形式の日付として受け付けるフォーマット。
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// 列名から列番号への対応。
pub type ColumnIndices = BTreeMap<CanonicalField, usize>;

/// ヘッダー行の検証結果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderValidation {
    pub valid: bool,
    pub missing_columns: Vec<String>,
    pub column_indices: ColumnIndices,
}

/// 取り込みファイルのプレビュー。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportPreview {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub total_rows: usize,
}

/// 取り込みファイルを受け付けられない理由。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImportError {
    #[error("The file does not contain a header row")]
    EmptyFile,

    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
}

/// ヘッダー名を比較用に正規化する。
///
/// 小文字にして前後の空白を除き、連続する空白を1つの`_`にまとめる。
pub fn normalize_header(raw: &str) -> String {
    raw.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// ヘッダー行から各列の列番号を求める。
///
/// `in`が丁度2列ある場合は1列目を`in`、2列目を`in2`とし、表記ゆれの照合よりも優先する。
/// `out`についても同様。
/// それ以外の列は表記ゆれの表と照合し、最初に一致した列名に割り当てる。既に割り当て済みの列名は上書きしない。
pub fn map_headers<S: AsRef<str>>(headers: &[S]) -> ColumnIndices {
    let normalized: Vec<String> = headers
        .iter()
        .map(|header| normalize_header(header.as_ref()))
        .collect();
    let mut indices = ColumnIndices::new();
    let mut claimed = vec![false; normalized.len()];

    for (name, first, second) in [
        ("in", CanonicalField::In, CanonicalField::In2),
        ("out", CanonicalField::Out, CanonicalField::Out2),
    ] {
        let positions: Vec<usize> = normalized
            .iter()
            .enumerate()
            .filter(|(_, header)| header.as_str() == name)
            .map(|(index, _)| index)
            .collect();
        if let &[a, b] = positions.as_slice() {
            indices.insert(first, a);
            indices.insert(second, b);
            claimed[a] = true;
            claimed[b] = true;
        }
    }

    for (index, header) in normalized.iter().enumerate() {
        if claimed[index] {
            continue;
        }
        let matched = COLUMN_VARIANTS.iter().find(|(_, variants)| {
            variants
                .iter()
                .any(|variant| normalize_header(variant) == *header)
        });
        if let Some((field, _)) = matched {
            indices.entry(*field).or_insert(index);
        }
    }

    indices
}

/// ヘッダー行に必要な列が揃っているか検証する。
pub fn validate_headers<S: AsRef<str>>(headers: &[S]) -> HeaderValidation {
    let column_indices = map_headers(headers);
    let missing_columns: Vec<String> = CanonicalField::ALL
        .iter()
        .filter(|field| !column_indices.contains_key(*field))
        .map(|field| field.as_str().to_string())
        .collect();

    HeaderValidation {
        valid: missing_columns.is_empty(),
        missing_columns,
        column_indices,
    }
}

/// 1行の各セルを列の種類に応じて表示用に整形する。
///
/// 解釈できない値はそのまま残す。
pub fn format_row(row: &[String], column_indices: &ColumnIndices) -> Vec<String> {
    let mut formatted = row.to_vec();
    for (field, index) in column_indices {
        let Some(cell) = formatted.get_mut(*index) else {
            continue;
        };
        let value = match field {
            CanonicalField::Date => format_date_cell(cell),
            CanonicalField::In
            | CanonicalField::Out
            | CanonicalField::In2
            | CanonicalField::Out2
            | CanonicalField::NextDay => format_time_cell(cell),
            CanonicalField::HoursWork => format_hours_cell(cell),
            CanonicalField::EmployeeNo | CanonicalField::Day => None,
        };
        if let Some(value) = value {
            *cell = value;
        }
    }
    formatted
}

/// 全てのセルが空の行を取り除く。
pub fn filter_blank_rows(rows: Vec<Vec<String>>) -> Vec<Vec<String>> {
    rows.into_iter()
        .filter(|row| row.iter().any(|cell| !cell.is_empty()))
        .collect()
}

/// 取り込みファイルの先頭行をヘッダーとしてプレビューを作成する。
///
/// # Arguments
///
/// * `table` - ヘッダー行とデータ行
/// * `limit` - プレビューに含めるデータ行の上限
pub fn build_preview(table: Vec<Vec<String>>, limit: usize) -> Result<ImportPreview, ImportError> {
    let mut rows = filter_blank_rows(table).into_iter();
    let headers = rows.next().ok_or(ImportError::EmptyFile)?;

    let validation = validate_headers(&headers);
    if !validation.valid {
        return Err(ImportError::MissingColumns(validation.missing_columns));
    }

    let data: Vec<Vec<String>> = rows.collect();
    let preview_rows = data
        .iter()
        .take(limit)
        .map(|row| format_row(row, &validation.column_indices))
        .collect();

    Ok(ImportPreview {
        headers,
        rows: preview_rows,
        total_rows: data.len(),
    })
}

fn parse_serial(cell: &str) -> Option<f64> {
    cell.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && *value >= 0.0)
}

fn format_date_cell(cell: &str) -> Option<String> {
    let value = cell.trim();
    if value.is_empty() {
        return None;
    }

    let date = match parse_serial(value) {
        Some(serial) => serial_to_date(serial),
        None => DATE_FORMATS
            .iter()
            .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
            .or_else(|| {
                DATETIME_FORMATS
                    .iter()
                    .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
                    .map(|datetime| datetime.date())
            }),
    }
    .filter(|date| (1..=9999).contains(&date.year()))?;
    Some(date.format("%Y-%m-%d").to_string())
}

/// 1899-12-30を起点とした表計算ソフトのシリアル値を日付にする。
fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(Duration::days(millis.div_euclid(86_400_000)))
}

fn format_time_cell(cell: &str) -> Option<String> {
    let value = cell.trim();
    let time = match parse_serial(value) {
        Some(serial) => serial_to_time(serial),
        None => parse_time_of_day(value),
    }?;
    Some(to_meridiem_time(time))
}

/// 1日を1とした表計算ソフトの時刻の小数部分を時刻にする。
fn serial_to_time(serial: f64) -> Option<NaiveTime> {
    let seconds = (serial.fract() * 86_400.0).round() as u32 % 86_400;
    NaiveTime::from_num_seconds_from_midnight_opt(seconds, 0)
}

fn format_hours_cell(cell: &str) -> Option<String> {
    cell.trim()
        .parse::<f64>()
        .ok()
        .filter(|hours| hours.is_finite())
        .map(|hours| format!("{:.2}", hours))
}
