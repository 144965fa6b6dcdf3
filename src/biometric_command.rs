use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use log::info;

use crate::api::{ApiClient, BiometricFetchRequest, FetchSummary};
use crate::console::ConsolePresenter;
use crate::entry_command::parse_date;

/// `fetch-logs`サブコマンドの引数。
#[derive(Debug, clap::Args)]
pub struct FetchLogsArgs {
    #[clap(long = "start-date", help = "First day to fetch in the format YYYY-MM-DD", parse(try_from_str = parse_date))]
    start_date: Option<NaiveDate>,

    #[clap(long = "end-date", help = "Last day to fetch in the format YYYY-MM-DD", parse(try_from_str = parse_date))]
    end_date: Option<NaiveDate>,
}

/// `fetch-logs`サブコマンドの処理を行う。
///
/// 生体認証端末からのログ取得を開始し、届いた進捗を順に表示する。
///
/// # Arguments
///
/// * `client` - APIクライアント
/// * `args` - `fetch-logs`サブコマンドの引数
/// * `presenter` - 進捗の表示先
pub async fn fetch_logs<P: ConsolePresenter>(
    client: &ApiClient,
    args: &FetchLogsArgs,
    presenter: &mut P,
) -> Result<FetchSummary> {
    if let (Some(start), Some(end)) = (args.start_date, args.end_date) {
        if start > end {
            bail!("Start date {} is after end date {}", start, end);
        }
    }
    let request = BiometricFetchRequest {
        start_date: args.start_date,
        end_date: args.end_date,
    };
    info!(
        "Fetching biometric logs from {:?} to {:?}",
        request.start_date, request.end_date
    );

    let summary = client
        .fetch_biometric_logs(&request, |event| presenter.show_progress(event))
        .await
        .context("Failed to fetch biometric logs")?;
    if summary.completed.is_none() {
        bail!("Biometric fetch ended without a completion event");
    }

    Ok(summary)
}
