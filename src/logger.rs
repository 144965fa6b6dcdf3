use std::fs::{self, File};
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use fern::colors::{Color, ColoredLevelConfig};
use log::{warn, LevelFilter};

/// ログファイルを置くディレクトリ名。
const LOG_DIR_NAME: &str = "timesheet-tools";

/// ロガーを初期化する。
///
/// 標準エラー出力には色付きで、キャッシュディレクトリ配下のログファイルには時刻付きで出力する。
/// キャッシュディレクトリが取得できない、またはログファイルを開けない場合は標準エラー出力のみとする。
///
/// # Arguments
///
/// * `verbose` - `true`の場合はdebugレベルまで出力する
pub fn init(verbose: bool) -> Result<()> {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let (dispatch, file_error) = build_dispatch(level, dirs::cache_dir());
    dispatch.apply().context("Failed to initialize logger")?;

    if let Some(error) = file_error {
        warn!("Logging to stderr only: {:#}", error);
    }

    Ok(())
}

/// ロガーの出力先を組み立てる。
///
/// ログファイルを開けなかった場合は、標準エラー出力のみの設定とその理由を返す。
fn build_dispatch(
    level: LevelFilter,
    cache_dir: Option<PathBuf>,
) -> (fern::Dispatch, Option<anyhow::Error>) {
    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Blue);

    let console = fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{}] {}: {}",
                colors.color(record.level()),
                record.target(),
                message
            ))
        })
        .chain(std::io::stderr());

    let dispatch = fern::Dispatch::new().level(level).chain(console);
    let file = match open_log_file(cache_dir) {
        Ok(Some(file)) => file,
        Ok(None) => return (dispatch, None),
        Err(error) => return (dispatch, Some(error)),
    };

    let dispatch = dispatch.chain(
        fern::Dispatch::new()
            .format(|out, message, record| {
                out.finish(format_args!(
                    "{} [{}] {}: {}",
                    Local::now().format("%Y-%m-%dT%H:%M:%S%:z"),
                    record.level(),
                    record.target(),
                    message
                ))
            })
            .chain(file),
    );
    (dispatch, None)
}

/// キャッシュディレクトリ配下のログファイルを開く。ディレクトリが無ければ作成する。
fn open_log_file(cache_dir: Option<PathBuf>) -> Result<Option<File>> {
    let Some(cache_dir) = cache_dir else {
        return Ok(None);
    };
    let dir = cache_dir.join(LOG_DIR_NAME);
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

    let path = dir.join("timesheet.log");
    let file = fern::log_file(&path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))?;

    Ok(Some(file))
}
