//! ナレッジベース取り込みTUIのエントリポイント。

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;

mod app;
mod backend;
mod config;
mod error;
mod events;
mod input;
mod items;
mod layout;
mod queue;
mod session;
mod shortcuts;
mod source;
mod store;
mod ui;
mod view;

/// ファイルロギングを初期化する。返すガードは終了まで保持すること。
fn init_logging() -> Result<WorkerGuard> {
    let log_file = "kb_import.log";
    // TUIの描画を汚さないよう、標準出力ではなくファイルへ書く。
    let file_appender = tracing_appender::rolling::never(".", log_file);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to init logging: {e}"))?;
    tracing::info!("logging to {}", log_file);
    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = init_logging()?;
    tracing::info!("kb_import starting");

    let mut terminal = ui::init_terminal()?;
    let res = app::run_app(&mut terminal).await;
    // エラー時も端末は必ず元に戻す。
    ui::restore_terminal()?;

    if let Err(ref e) = res {
        tracing::error!("app error: {e:#}");
    }
    tracing::info!("kb_import exiting");
    res
}
