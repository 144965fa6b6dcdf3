use std::fmt;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::datetime::{parse_time_of_day, to_hhmm, to_input_time};

/// tripとして受け付ける上限値。
pub const MAX_TRIP: f64 = 999.99;

/// 送信前のattendanceの時刻入力。
///
/// 時刻は入力欄の値をそのまま保持し、空文字列は未入力として扱う。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttendanceTimeInput {
    pub time_in: String,
    pub time_out: String,
    pub break_out: String,
    pub break_in: String,
    pub next_day_timeout: String,
    pub is_nightshift: bool,
    pub trip: String,
}

/// サーバーから受け取った既存のattendance。
///
/// 時刻は`2024-01-01 08:00:00`のような日時文字列で届くことがある。
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AttendanceRecord {
    #[serde(default)]
    pub time_in: Option<String>,
    #[serde(default)]
    pub time_out: Option<String>,
    #[serde(default)]
    pub break_out: Option<String>,
    #[serde(default)]
    pub break_in: Option<String>,
    #[serde(default)]
    pub next_day_timeout: Option<String>,
    #[serde(default)]
    pub is_nightshift: bool,
    #[serde(default)]
    pub trip: Option<f64>,
}

impl From<&AttendanceRecord> for AttendanceTimeInput {
    /// 入力欄の初期値を作る。読めない時刻は空欄にする。
    fn from(record: &AttendanceRecord) -> Self {
        let time = |value: &Option<String>| to_input_time(value.as_deref().unwrap_or_default());
        Self {
            time_in: time(&record.time_in),
            time_out: time(&record.time_out),
            break_out: time(&record.break_out),
            break_in: time(&record.break_in),
            next_day_timeout: time(&record.next_day_timeout),
            is_nightshift: record.is_nightshift,
            trip: record.trip.map(|trip| trip.to_string()).unwrap_or_default(),
        }
    }
}

/// 夜勤フラグと終了時刻の組み合わせを表す状態。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftState {
    Regular,
    NightShiftSameDay,
    NightShiftNextDay,
}

/// 検証済みのattendance。
///
/// 時刻はすべて`HH:MM`の24時間表記に正規化されている。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedAttendance {
    pub time_in: String,
    pub time_out: Option<String>,
    pub break_out: Option<String>,
    pub break_in: Option<String>,
    pub next_day_timeout: Option<String>,
    pub is_nightshift: bool,
    pub trip: f64,
}

/// 時刻の入力欄。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeField {
    TimeIn,
    TimeOut,
    BreakOut,
    BreakIn,
    NextDayTimeout,
}

impl fmt::Display for TimeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TimeField::TimeIn => "Time in",
            TimeField::TimeOut => "Time out",
            TimeField::BreakOut => "Break out",
            TimeField::BreakIn => "Break in",
            TimeField::NextDayTimeout => "Next day timeout",
        };
        f.write_str(label)
    }
}

/// 送信前の検証エラー。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Time in is required")]
    MissingTimeIn,

    #[error("Night shift requires either a time out or a next day timeout")]
    MissingNightShiftEnd,

    #[error("Night shift cannot have both a time out and a next day timeout")]
    ConflictingNightShiftEnd,

    #[error("Time out is required")]
    MissingTimeOut,

    #[error("{missing} is required when {present} is set")]
    IncompleteBreakPair {
        missing: TimeField,
        present: TimeField,
    },

    #[error("Trip must be a number between 0 and 999.99: {0:?}")]
    InvalidTrip(String),

    #[error("{field} is not a valid time: {value:?}")]
    InvalidTime { field: TimeField, value: String },
}

fn present(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

impl AttendanceTimeInput {
    /// 夜勤フラグと終了時刻の入力状況から状態を判定する。
    pub fn shift_state(&self) -> ShiftState {
        if !self.is_nightshift {
            ShiftState::Regular
        } else if present(&self.next_day_timeout).is_some() {
            ShiftState::NightShiftNextDay
        } else {
            ShiftState::NightShiftSameDay
        }
    }
}

/// 夜勤フラグを切り替えた後の入力を返す。
///
/// - ONにした時、翌日の退勤時刻が入力済みであれば当日の退勤時刻を消す
/// - OFFにした時、翌日の退勤時刻を無条件に消す
///
/// # Arguments
///
/// * `current` - 切り替え前の入力
/// * `is_nightshift` - 切り替え後の夜勤フラグ
pub fn on_night_shift_toggle(
    current: AttendanceTimeInput,
    is_nightshift: bool,
) -> AttendanceTimeInput {
    let mut next = AttendanceTimeInput {
        is_nightshift,
        ..current
    };
    match next.shift_state() {
        ShiftState::Regular => next.next_day_timeout.clear(),
        ShiftState::NightShiftNextDay => next.time_out.clear(),
        ShiftState::NightShiftSameDay => {}
    }
    next
}

/// 送信前にattendanceの入力を検証し、正規化する。
///
/// 検証は以下の順で行い、最初に見つかったエラーを返す。
///
/// 1. 出勤時刻が入力されていること
/// 2. 夜勤の場合、当日と翌日の退勤時刻のどちらか一方のみが入力されていること
/// 3. 夜勤でない場合、退勤時刻が入力されていること
/// 4. 休憩の開始と終了が揃っていること
/// 5. tripが0以上999.99以下の数値であること
/// 6. 入力された時刻がすべて解釈できること
pub fn validate(input: &AttendanceTimeInput) -> Result<ValidatedAttendance, ValidationError> {
    let time_in = present(&input.time_in).ok_or(ValidationError::MissingTimeIn)?;
    let time_out = present(&input.time_out);
    let next_day_timeout = if input.is_nightshift {
        present(&input.next_day_timeout)
    } else {
        None
    };

    if input.is_nightshift {
        match (time_out, next_day_timeout) {
            (None, None) => return Err(ValidationError::MissingNightShiftEnd),
            (Some(_), Some(_)) => return Err(ValidationError::ConflictingNightShiftEnd),
            _ => {}
        }
    } else if time_out.is_none() {
        return Err(ValidationError::MissingTimeOut);
    }

    let break_out = present(&input.break_out);
    let break_in = present(&input.break_in);
    match (break_out, break_in) {
        (Some(_), None) => {
            return Err(ValidationError::IncompleteBreakPair {
                missing: TimeField::BreakIn,
                present: TimeField::BreakOut,
            })
        }
        (None, Some(_)) => {
            return Err(ValidationError::IncompleteBreakPair {
                missing: TimeField::BreakOut,
                present: TimeField::BreakIn,
            })
        }
        _ => {}
    }

    let trip = parse_trip(&input.trip)?;

    Ok(ValidatedAttendance {
        time_in: normalize(TimeField::TimeIn, time_in)?,
        time_out: normalize_optional(TimeField::TimeOut, time_out)?,
        break_out: normalize_optional(TimeField::BreakOut, break_out)?,
        break_in: normalize_optional(TimeField::BreakIn, break_in)?,
        next_day_timeout: normalize_optional(TimeField::NextDayTimeout, next_day_timeout)?,
        is_nightshift: input.is_nightshift,
        trip,
    })
}

fn parse_trip(raw: &str) -> Result<f64, ValidationError> {
    let Some(value) = present(raw) else {
        return Ok(0.0);
    };
    match value.parse::<f64>() {
        Ok(trip) if trip.is_finite() && (0.0..=MAX_TRIP).contains(&trip) => {
            Ok((trip * 100.0).round() / 100.0)
        }
        _ => Err(ValidationError::InvalidTrip(value.to_string())),
    }
}

fn normalize(field: TimeField, value: &str) -> Result<String, ValidationError> {
    parse_time_of_day(value)
        .map(to_hhmm)
        .ok_or_else(|| ValidationError::InvalidTime {
            field,
            value: value.to_string(),
        })
}

fn normalize_optional(
    field: TimeField,
    value: Option<&str>,
) -> Result<Option<String>, ValidationError> {
    value.map(|value| normalize(field, value)).transpose()
}

/// 勤務時間を時間単位で計算する。
///
/// 終了時刻は夜勤で翌日の退勤時刻が入力されていればそれを、そうでなければ当日の退勤時刻を使う。
/// 計算は`date`と時刻を組み合わせた日時で行い、夜勤で出勤時刻より前の時刻は翌日として扱う。
/// 休憩の開始と終了が揃っていて、終了が開始より後の場合のみ、勤務時間と重なる部分を差し引く。
///
/// 出勤時刻か終了時刻が無い、または解釈できない場合は`None`を返す。
/// 夜勤でないのに終了が開始より前の場合も`None`を返す。
///
/// # Arguments
///
/// * `date` - 出勤日
/// * `input` - attendanceの入力
pub fn derive_worked_hours(date: NaiveDate, input: &AttendanceTimeInput) -> Option<f64> {
    let time_in = parse_time_of_day(&input.time_in)?;
    let start = date.and_time(time_in);
    let anchor = |time: NaiveTime, next_day: bool| -> NaiveDateTime {
        if next_day || (input.is_nightshift && time < time_in) {
            (date + Duration::days(1)).and_time(time)
        } else {
            date.and_time(time)
        }
    };

    let end = match input.shift_state() {
        ShiftState::NightShiftNextDay => anchor(parse_time_of_day(&input.next_day_timeout)?, true),
        _ => anchor(parse_time_of_day(&input.time_out)?, false),
    };
    if end < start {
        return None;
    }

    let mut worked = end - start;
    let break_out = parse_time_of_day(&input.break_out);
    let break_in = parse_time_of_day(&input.break_in);
    if let (Some(break_out), Some(break_in)) = (break_out, break_in) {
        // 勤務時間の外にはみ出した休憩は差し引かない。
        let break_start = anchor(break_out, false).max(start);
        let break_end = anchor(break_in, false).min(end);
        if break_end > break_start {
            worked = worked - (break_end - break_start);
        }
    }

    let hours = worked.num_seconds() as f64 / 3600.0;
    Some((hours * 100.0).round() / 100.0)
}
