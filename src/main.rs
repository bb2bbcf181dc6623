use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use crate::config::Cli;
use crate::stage::pipeline::Pipeline;

mod config;
mod stage;
mod status;

fn init_logging(level: log::LevelFilter) {
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .parse_default_env()
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_level());

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.to_config()?;
    let cancel = CancellationToken::new();

    let cancel_clone = cancel.clone();
    let signals = tokio::spawn(async move {
        tokio::select! {
            _ = cancel_clone.cancelled() => {},
            _ = tokio::signal::ctrl_c() => {
                log::warn!("interrupted, stopping");
                cancel_clone.cancel();
            },
        }
    });

    let result = Pipeline::new(config, cancel.clone()).run().await;
    cancel.cancel();
    if let Err(e) = signals.await {
        log::warn!("signal watcher task failed: {}", e);
    }

    let report = result?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}
