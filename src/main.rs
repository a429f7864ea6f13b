use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use qa_coordinator::config::{CliArgs, CoordinatorConfig};
use qa_coordinator::server;
use qa_coordinator::settings::{load_settings, save_settings};
use qa_coordinator::state::{CoordinatorState, SharedState};
use qa_coordinator::writer::build_writers;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    // Keep the guard alive so buffered file logs are flushed on exit.
    let _log_guard = init_tracing(&args);

    info!("Starting qa-coordinator v{}", env!("CARGO_PKG_VERSION"));

    let mut config = CoordinatorConfig::from_args(args);
    if let Some(path) = config.settings_path.clone() {
        if path.exists() {
            info!("Loading settings from {:?}", path);
            config.apply_settings(&load_settings(&path));
        } else {
            info!("Settings file {:?} not found, writing current values to it", path);
            if let Err(e) = save_settings(&path, &config.to_settings()) {
                warn!("Could not create settings file {:?}: {}", path, e);
            }
        }
    }

    let writers = build_writers(&config)?;
    info!("{} results writers enabled", writers.len());

    let addr = config.listen_addr();
    let state: SharedState = Arc::new(CoordinatorState::new(config, writers));

    let router = server::build_router(state.clone());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Coordinator listening on http://{}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await?;

    // Ctrl+C lands here without the pool having been torn down.
    if state.coordinator.is_accepting() {
        state.coordinator.shut_down(false).await?;
    }
    info!("Coordinator stopped");
    Ok(())
}

fn init_tracing(args: &CliArgs) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("qa_coordinator=info,tower_http=info"));
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());

    match &args.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "qa-coordinator.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        None => {
            registry.init();
            None
        }
    }
}

async fn shutdown_signal(state: SharedState) {
    let mut stopped = state.coordinator.shutdown_signal();
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = ctrl_c => info!("Received shutdown signal"),
        _ = stopped.wait_for(|s| *s) => info!("Coordinator shut down over HTTP"),
    }
}
