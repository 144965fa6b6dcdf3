use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use log::{debug, info};

use crate::api::{ApiMessage, AttendanceRepository, CreateAttendanceRequest, SaveAttendanceRequest};
use crate::attendance::{
    derive_worked_hours, on_night_shift_toggle, validate, AttendanceRecord, AttendanceTimeInput,
    ValidatedAttendance,
};
use crate::datetime;

/// attendanceの時刻入力を受け取るための引数。
#[derive(Debug, Clone, Default, clap::Args)]
pub struct EntryArgs {
    #[clap(
        long = "record",
        help = "JSON file of an existing attendance record used as the starting values"
    )]
    record: Option<PathBuf>,

    #[clap(long = "date", help = "Attendance date in the format YYYY-MM-DD", parse(try_from_str = parse_date))]
    date: Option<NaiveDate>,

    #[clap(long = "time-in", help = "Clock-in time")]
    time_in: Option<String>,

    #[clap(long = "time-out", help = "Same-day clock-out time")]
    time_out: Option<String>,

    #[clap(long = "break-out", help = "Break start time")]
    break_out: Option<String>,

    #[clap(long = "break-in", help = "Break end time")]
    break_in: Option<String>,

    #[clap(long = "next-day-timeout", help = "Next-day clock-out time (night shift only)")]
    next_day_timeout: Option<String>,

    #[clap(long = "nightshift", help = "Marks the attendance as a night shift")]
    nightshift: bool,

    #[clap(
        long = "no-nightshift",
        help = "Marks the attendance as a regular shift",
        conflicts_with = "nightshift"
    )]
    no_nightshift: bool,

    #[clap(long = "trip", help = "Number of trips, up to two decimal places")]
    trip: Option<String>,
}

/// 保存先のattendanceを指定する引数。
#[derive(Debug, Clone, clap::Args)]
pub struct SaveArgs {
    #[clap(long = "id", help = "Updates the attendance with this id")]
    id: Option<u64>,

    #[clap(
        long = "employee-no",
        help = "Employee number for a new manual entry",
        conflicts_with = "id"
    )]
    employee_no: Option<String>,

    #[clap(flatten)]
    entry: EntryArgs,
}

/// 検証結果。
#[derive(Debug, Clone, PartialEq)]
pub struct EntryReport {
    pub date: NaiveDate,
    pub attendance: ValidatedAttendance,
    pub worked_hours: Option<f64>,
}

impl EntryArgs {
    /// 引数から入力を組み立てる。
    ///
    /// `--record`があれば既存のattendanceを、無ければ新規入力の既定値を初期値とする。
    /// 初期値を引数で上書きした後、夜勤フラグの切り替えを反映する。
    pub fn to_input(&self) -> Result<AttendanceTimeInput> {
        let base = match &self.record {
            Some(path) => AttendanceTimeInput::from(&read_record(path)?),
            None => AttendanceTimeInput::default(),
        };
        let is_nightshift = if self.nightshift {
            true
        } else if self.no_nightshift {
            false
        } else {
            base.is_nightshift
        };
        let pick = |value: &Option<String>, current: String| value.clone().unwrap_or(current);

        let input = AttendanceTimeInput {
            time_in: pick(&self.time_in, base.time_in),
            time_out: pick(&self.time_out, base.time_out),
            break_out: pick(&self.break_out, base.break_out),
            break_in: pick(&self.break_in, base.break_in),
            next_day_timeout: pick(&self.next_day_timeout, base.next_day_timeout),
            is_nightshift: base.is_nightshift,
            trip: pick(&self.trip, base.trip),
        };
        Ok(on_night_shift_toggle(input, is_nightshift))
    }
}

/// `validate`サブコマンドの処理を行う。
///
/// 日付が指定されていない場合は、Localタイムゾーンで今日の日付を利用する。
///
/// # Arguments
///
/// * `args` - 時刻入力の引数
pub fn validate_entry(args: &EntryArgs) -> Result<EntryReport> {
    let date = args.date.unwrap_or_else(datetime::today);
    let input = args.to_input()?;
    debug!("Validating attendance input: {:?}", input);

    let attendance = validate(&input).context("Attendance is invalid")?;
    let worked_hours = derive_worked_hours(date, &input);
    info!("Attendance on {} is valid", date);

    Ok(EntryReport {
        date,
        attendance,
        worked_hours,
    })
}

pub struct EntryCommand<'a, T: AttendanceRepository> {
    repository: &'a T,
}

impl<'a, T: AttendanceRepository> EntryCommand<'a, T> {
    /// 新しい`EntryCommand`を返す。
    ///
    /// # Arguments
    /// * `repository` - attendanceのAPIと通信するためのリポジトリ
    pub fn new(repository: &'a T) -> Self {
        Self { repository }
    }

    /// `save`サブコマンドの処理を行う。
    ///
    /// 入力を検証し、`--id`があれば既存のattendanceを更新し、無ければ`--employee-no`で新規登録する。
    /// 検証に失敗した場合はAPIを呼ばない。
    ///
    /// # Arguments
    ///
    /// * `args` - `save`サブコマンドの引数
    pub async fn run(&self, args: SaveArgs) -> Result<(EntryReport, ApiMessage)> {
        let report = validate_entry(&args.entry)?;

        let message = match (args.id, args.employee_no) {
            (Some(id), _) => {
                let request = SaveAttendanceRequest {
                    id,
                    attendance: report.attendance.clone(),
                };
                self.repository
                    .save_attendance(&request)
                    .await
                    .with_context(|| format!("Failed to save attendance {}", id))?
            }
            (None, Some(employee_no)) => {
                let request = CreateAttendanceRequest {
                    employee_no,
                    date: report.date,
                    attendance: report.attendance.clone(),
                };
                self.repository
                    .create_attendance(&request)
                    .await
                    .context("Failed to create attendance")?
            }
            (None, None) => bail!("Either --id or --employee-no must be given"),
        };
        info!("Attendance submitted successfully.");

        Ok((report, message))
    }
}

fn read_record(path: &Path) -> Result<AttendanceRecord> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read record: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse record: {}", path.display()))
}

/// 日付をパースする。
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("Failed to parse date: {}", s))
}
