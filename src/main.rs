use std::io;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

mod api;
mod attendance;
mod biometric;
mod biometric_command;
mod column_mapper;
mod config;
mod console;
mod datetime;
mod entry_command;
mod import_command;
mod logger;
mod record_command;
mod spreadsheet;

use api::ApiClient;
use biometric_command::{fetch_logs, FetchLogsArgs};
use config::Config;
use console::{ConsoleMarkdown, ConsolePresenter};
use entry_command::{validate_entry, EntryArgs, EntryCommand, SaveArgs};
use import_command::{preview_import, ImportArgs, ImportCommand};
use record_command::{HolidayArgs, RecordArgs, RecordCommand};

/// attendanceの時刻入力の検証と、勤怠ファイルの取り込みを行うCLIアプリケーション。
///
/// # Examples
/// ```
/// $ cargo run -- validate --time-in 22:00 --next-day-timeout 06:00 --nightshift
/// $ cargo run -- import preview attendance.csv
/// ```
#[derive(Debug, Parser)]
#[clap(version, about)]
struct Args {
    #[clap(short = 'v', long = "verbose", global = true, help = "Shows debug logs")]
    verbose: bool,

    #[clap(subcommand)]
    subcommand: SubCommands,
}

/// サブコマンドを表す列挙型。
#[derive(Debug, Subcommand)]
enum SubCommands {
    /// Validates attendance times without sending them
    Validate(EntryArgs),
    /// Validates attendance times and saves them
    Save(SaveArgs),
    /// Syncs an attendance record
    Sync(RecordArgs),
    /// Deletes an attendance record
    Delete(RecordArgs),
    /// Previews or uploads an attendance file
    #[clap(subcommand)]
    Import(ImportArgs),
    /// Sets a holiday multiplier
    Holiday(HolidayArgs),
    /// Fetches logs from the biometric devices
    FetchLogs(FetchLogsArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logger::init(args.verbose)?;

    let mut stdout = io::stdout();
    let mut presenter = ConsoleMarkdown::new(&mut stdout);

    match args.subcommand {
        SubCommands::Validate(entry) => {
            let report = validate_entry(&entry)?;
            presenter.show_attendance(&report.attendance, report.worked_hours)?;
        }
        SubCommands::Import(ImportArgs::Preview(preview)) => {
            let preview = preview_import(&preview)?;
            presenter.show_preview(&preview)?;
        }
        subcommand => {
            let config = Config::from_env().context("Failed to load configuration")?;
            let client = ApiClient::new(config);
            run_remote(&client, subcommand, &mut presenter).await?;
        }
    }

    Ok(())
}

/// APIとの通信が必要なサブコマンドを実行する。
async fn run_remote<P: ConsolePresenter>(
    client: &ApiClient,
    subcommand: SubCommands,
    presenter: &mut P,
) -> Result<()> {
    match subcommand {
        SubCommands::Save(save) => {
            let (report, message) = EntryCommand::new(client).run(save).await?;
            presenter.show_attendance(&report.attendance, report.worked_hours)?;
            show_api_message(presenter, message.message, "Attendance saved")?;
        }
        SubCommands::Sync(record) => {
            let message = RecordCommand::new(client).sync(&record).await?;
            show_api_message(presenter, message.message, "Attendance synced")?;
        }
        SubCommands::Delete(record) => {
            let message = RecordCommand::new(client).delete(&record).await?;
            show_api_message(presenter, message.message, "Attendance deleted")?;
        }
        SubCommands::Holiday(holiday) => {
            let message = RecordCommand::new(client).holiday(holiday).await?;
            show_api_message(presenter, message.message, "Holiday set")?;
        }
        SubCommands::Import(ImportArgs::Upload(upload)) => {
            let outcome = ImportCommand::new(client).upload(&upload).await?;
            presenter.show_import_outcome(&outcome)?;
            if !outcome.success {
                bail!("The server rejected the import");
            }
        }
        SubCommands::FetchLogs(fetch) => {
            fetch_logs(client, &fetch, presenter).await?;
        }
        SubCommands::Validate(_) | SubCommands::Import(ImportArgs::Preview(_)) => {
            bail!("This subcommand does not use the API")
        }
    }

    Ok(())
}

fn show_api_message<P: ConsolePresenter>(
    presenter: &mut P,
    message: Option<String>,
    fallback: &str,
) -> Result<()> {
    presenter.show_message(message.as_deref().unwrap_or(fallback))
}
