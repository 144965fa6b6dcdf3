use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use log::info;

use crate::api::{ApiMessage, AttendanceRepository, HolidayRequest};
use crate::entry_command::parse_date;

/// 既存のattendanceを指定する引数。
#[derive(Debug, clap::Args)]
pub struct RecordArgs {
    #[clap(long = "id", help = "Attendance id")]
    id: u64,
}

/// `holiday`サブコマンドの引数。
#[derive(Debug, clap::Args)]
pub struct HolidayArgs {
    #[clap(long = "date", help = "Holiday date in the format YYYY-MM-DD", parse(try_from_str = parse_date))]
    date: NaiveDate,

    #[clap(long = "multiplier", help = "Pay multiplier applied to the holiday")]
    multiplier: f64,

    #[clap(long = "department", help = "Limits the holiday to one department")]
    department: Option<String>,
}

/// 既存のattendanceに対する操作を行う。
pub struct RecordCommand<'a, T: AttendanceRepository> {
    repository: &'a T,
}

impl<'a, T: AttendanceRepository> RecordCommand<'a, T> {
    /// 新しい`RecordCommand`を返す。
    pub fn new(repository: &'a T) -> Self {
        Self { repository }
    }

    /// `sync`サブコマンドの処理を行う。
    pub async fn sync(&self, args: &RecordArgs) -> Result<ApiMessage> {
        let message = self
            .repository
            .sync_attendance(args.id)
            .await
            .with_context(|| format!("Failed to sync attendance {}", args.id))?;
        info!("Attendance {} synced.", args.id);

        Ok(message)
    }

    /// `delete`サブコマンドの処理を行う。
    pub async fn delete(&self, args: &RecordArgs) -> Result<ApiMessage> {
        let message = self
            .repository
            .delete_attendance(args.id)
            .await
            .with_context(|| format!("Failed to delete attendance {}", args.id))?;
        info!("Attendance {} deleted.", args.id);

        Ok(message)
    }

    /// `holiday`サブコマンドの処理を行う。
    ///
    /// 倍率は正の数でなければならない。残業のあるattendanceに倍率を適用しない判定はサーバー側で行う。
    pub async fn holiday(&self, args: HolidayArgs) -> Result<ApiMessage> {
        if !(args.multiplier.is_finite() && args.multiplier > 0.0) {
            bail!("Multiplier must be a positive number: {}", args.multiplier);
        }
        let request = HolidayRequest {
            date: args.date,
            multiplier: args.multiplier,
            department: args
                .department
                .map(|department| department.trim().to_string())
                .filter(|department| !department.is_empty()),
        };

        let message = self
            .repository
            .set_holiday(&request)
            .await
            .with_context(|| format!("Failed to set holiday on {}", request.date))?;
        info!("Holiday set on {} with multiplier {}", request.date, request.multiplier);

        Ok(message)
    }
}
