use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use log::warn;

/// 日時文字列として受け付けるフォーマット。
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// 時刻のみの文字列として受け付けるフォーマット。
const TIME_FORMATS: &[&str] = &[
    "%H:%M:%S%.f",
    "%H:%M",
    "%I:%M:%S %p",
    "%I:%M %p",
    "%I:%M%p",
];

/// 表示専用の箇所で時刻が読めなかった場合に表示する文字列。
pub const DISPLAY_PLACEHOLDER: &str = "-";

#[cfg(not(test))]
/// 現在のLocalタイムゾーンでの日付を取得する。
pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// テスト時に利用するモック日付を取得する。
#[cfg(test)]
pub mod mock_datetime {
    use std::cell::RefCell;

    use super::NaiveDate;

    thread_local! {
        static MOCK_DATE: RefCell<Option<NaiveDate>> = RefCell::new(None);
    }

    /// モック日付を取得する。
    pub fn today() -> NaiveDate {
        MOCK_DATE.with(|cell| {
            cell.borrow()
                .as_ref()
                .cloned()
                .unwrap_or_else(|| chrono::Local::now().date_naive())
        })
    }

    /// モック日付を設定する。
    pub fn set_mock_date(date: NaiveDate) {
        MOCK_DATE.with(|cell| *cell.borrow_mut() = Some(date));
    }

    // 設定したモック日付をクリアする。
    pub fn clear_mock_date() {
        MOCK_DATE.with(|cell| *cell.borrow_mut() = None);
    }
}

#[cfg(test)]
pub use mock_datetime::today;

/// 文字列から時刻部分を取り出す。
///
/// 以下の形式を受け付ける。空文字列や解釈できない文字列は`None`を返す。
///
/// - RFC 3339 (`2024-01-01T08:30:00+09:00`)。タイムゾーン変換はせず、記載された時刻をそのまま使う
/// - ISO 8601 のオフセットなし日時 (`2024-01-01T08:30:00`)
/// - スペース区切りの日時 (`2024-01-01 08:30:00`)
/// - `HH:MM[:SS]`
/// - 12時間表記 (`08:30 PM`)
///
/// # Arguments
///
/// * `raw` - 解釈する文字列
pub fn parse_time_of_day(raw: &str) -> Option<NaiveTime> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(datetime) = DateTime::parse_from_rfc3339(value) {
        return Some(datetime.time());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|datetime| datetime.time())
        .or_else(|| {
            TIME_FORMATS
                .iter()
                .find_map(|format| NaiveTime::parse_from_str(value, format).ok())
        })
}

/// 時刻を`HH:MM`形式の文字列にする。
pub fn to_hhmm(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

/// 時刻を`hh:mm AM/PM`形式の文字列にする。
pub fn to_meridiem_time(time: NaiveTime) -> String {
    time.format("%I:%M %p").to_string()
}

/// 入力欄の初期値として使う`HH:MM`形式の文字列を返す。
///
/// 解釈できない場合は空文字列を返し、失敗はログにのみ出力する。
pub fn to_input_time(raw: &str) -> String {
    format_or(raw, "")
}

/// 表示用の`HH:MM`形式の文字列を返す。
///
/// 解釈できない場合は`-`を返し、失敗はログにのみ出力する。
pub fn to_display_time(raw: &str) -> String {
    format_or(raw, DISPLAY_PLACEHOLDER)
}

fn format_or(raw: &str, fallback: &str) -> String {
    match parse_time_of_day(raw) {
        Some(time) => to_hhmm(time),
        None => {
            if !raw.trim().is_empty() {
                warn!("Failed to parse time value: {:?}", raw);
            }
            fallback.to_string()
        }
    }
}
