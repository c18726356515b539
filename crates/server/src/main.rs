use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use billwire_core::{load_config, validate_config, LogFormat};
use billwire_server::{build_store, create_router, AppState, Collaborators, Runtime};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        eprintln!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn run() -> Result<()> {
    // Determine config path
    let config_path = std::env::var("BILLWIRE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("billwire.toml"));

    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    init_tracing(config.logging.format);
    info!(version = VERSION, "Loaded configuration from {:?}", config_path);

    validate_config(&config).context("Configuration validation failed")?;

    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    let config_hash_short = config_hash[..16].to_string();
    info!(config_hash = %config_hash_short, bills = config.controller.bills.len(), "Configuration valid");

    let store = build_store(&config)?;
    let collaborators = Collaborators::from_config(&config)?;
    let runtime = Runtime::new(&config, store, collaborators);

    runtime.start_pools().await?;
    info!(pools = runtime.pools.len(), "Worker pools started");

    // Status API runs alongside the controller and stops with it.
    let (server_stop_tx, mut server_stop_rx) = watch::channel(false);
    let server_handle = if config.server.enabled {
        let state = Arc::new(AppState::new(
            config.clone(),
            config_hash_short,
            runtime.controller.snapshot_handle(),
            runtime.pools.clone(),
        ));
        let app = create_router(state);

        let addr = SocketAddr::new(config.server.host, config.server.port);
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind to {}", addr))?;
        info!("Status API listening on {}", addr);

        Some(tokio::spawn(async move {
            let shutdown = async move {
                let _ = server_stop_rx.wait_for(|stop| *stop).await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!("Server error: {}", e);
            }
        }))
    } else {
        info!("Status API disabled in config");
        None
    };

    // Ctrl+C ends the run early; whatever finished is still written out.
    let controller = Arc::clone(&runtime.controller);
    let signal_handle = tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Shutdown signal received, finishing run early");
        controller.stop();
    });

    let result = runtime.controller.run().await;

    signal_handle.abort();
    runtime.stop_pools().await;
    info!("Worker pools stopped");

    let _ = server_stop_tx.send(true);
    if let Some(handle) = server_handle {
        let _ = handle.await;
    }

    let report = result.context("Run failed")?;
    info!(
        articles = report.articles.len(),
        incomplete = report.incomplete.len(),
        failed = report.failed.len(),
        unattributed_errors = report.unattributed_errors.len(),
        completion_rate = report.summary.completion_rate,
        output_dir = ?config.output.dir,
        "Run complete"
    );

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
