mod atr_calculator;
mod budget;
mod candle_manager;
mod clock;
mod config;
mod database;
mod error;
mod exchange;
mod indicators;
mod notifications;
mod position_manager;
mod strategy;
mod types;
mod worker;

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use clock::SystemClock;
use config::InfraConfig;
use database::SqliteStateStore;
use notifications::WebhookNotifier;
use worker::BotWorker;

#[derive(Parser)]
#[command(name = "bot-runner")]
#[command(author = "Trading Bot")]
#[command(version = "0.1.0")]
#[command(about = "Runs one trading bot's control loop to completion", long_about = None)]
struct Cli {
    /// Bot id to load from the state store
    #[arg(long)]
    bot_id: String,

    /// Infra config file path (store URI, notifier URL, log level)
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose (debug-level) logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let infra = match InfraConfig::load(&cli.config) {
        Ok(infra) => infra,
        Err(e) => {
            eprintln!("failed to load infra config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let log_level = if cli.verbose { Level::DEBUG } else { infra_log_level(&infra.log_level) };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("logging subscriber already set");
    }

    info!("bot-runner starting for bot_id={}", cli.bot_id);

    let store = match SqliteStateStore::new(&infra.store_uri).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("failed to open state store: {e}");
            return ExitCode::FAILURE;
        }
    };
    let notifier = Arc::new(WebhookNotifier::new(infra.webhook_url.clone()));
    let clock = Arc::new(SystemClock);
    let stop_requested = Arc::new(AtomicBool::new(false));

    install_signal_handlers(stop_requested.clone());

    let worker = BotWorker::new(cli.bot_id, store, notifier, clock, stop_requested);
    match worker.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("bot-runner exiting after startup failure: {e}");
            ExitCode::FAILURE
        }
    }
}

fn infra_log_level(label: &str) -> Level {
    match label.to_ascii_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Both SIGINT and SIGTERM flip the same cooperative stop flag the worker
/// checks at the top of each iteration; neither interrupts in-flight I/O.
fn install_signal_handlers(stop_requested: Arc<AtomicBool>) {
    let ctrl_c_flag = stop_requested.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received SIGINT, requesting shutdown");
            ctrl_c_flag.store(true, Ordering::SeqCst);
        }
    });

    #[cfg(unix)]
    {
        let term_flag = stop_requested;
        tokio::spawn(async move {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut term) => {
                    term.recv().await;
                    info!("received SIGTERM, requesting shutdown");
                    term_flag.store(true, Ordering::SeqCst);
                }
                Err(e) => error!("failed to install SIGTERM handler: {e}"),
            }
        });
    }
}
