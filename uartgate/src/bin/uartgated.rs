//! Gateway daemon.
//!
//! Serves the HTTP API and owns the serial link. The daemon does not connect
//! at startup; clients ask it to via `/api/v1/connect`.

use std::{process::ExitCode, sync::Arc};
use tokio::signal::unix::{self, SignalKind};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing_subscriber::filter::LevelFilter;

use uartgate::{
    api::{self, AppState},
    config::Config,
    link::LinkManager,
    tracing::{self, prelude::*},
    transport::NativeBackend,
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("uartgated: {e}");
            return ExitCode::FAILURE;
        }
    };

    let level = tracing::parse_level(config.log_level.as_str()).unwrap_or(LevelFilter::INFO);
    tracing::init_journald_or_stdout(level);

    debug!(?config, "Loaded configuration");

    let link = Arc::new(LinkManager::new(NativeBackend::new(), &config));
    let state = AppState::new(Arc::clone(&link));

    let running = CancellationToken::new();
    let tracker = TaskTracker::new();
    {
        let running = running.clone();
        let listen = config.api.listen.clone();
        tracker.spawn(async move {
            if let Err(e) = api::serve(&listen, state, running.clone()).await {
                error!(error = %e, "API server failed");
                running.cancel();
            }
        });
    }
    tracker.close();
    info!(
        baud_rate = config.serial.baud_rate,
        fault_policy = %config.serial.fault_policy,
        "Started. Use the API to connect to the device."
    );

    let (mut sigint, mut sigterm) = match (
        unix::signal(SignalKind::interrupt()),
        unix::signal(SignalKind::terminate()),
    ) {
        (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
        (Err(e), _) | (_, Err(e)) => {
            error!(error = %e, "Failed to install signal handlers");
            return ExitCode::FAILURE;
        }
    };
    tokio::select! {
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
        _ = running.cancelled() => {},
    }

    trace!("Shutting down.");
    running.cancel();
    tracker.wait().await;

    // Release the port before exit so the next process can open it.
    if let Err(e) = tokio::task::spawn_blocking(move || link.disconnect()).await {
        warn!(error = %e, "Failed to close serial link");
    }
    info!("Exiting.");
    ExitCode::SUCCESS
}
