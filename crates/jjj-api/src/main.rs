//! Axum API server binary.

use std::net::SocketAddr;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use jjj_api::{create_router, metrics, ApiConfig, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // rustls 0.23 needs a process-wide crypto provider.
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider was already installed");
    }

    init_tracing();

    info!("Starting jjj-api");

    let config = ApiConfig::from_env();
    info!(
        host = %config.host,
        port = config.port,
        environment = %config.environment,
        provider = ?config.providers.chat_provider,
        store = ?config.store_backend,
        "API config loaded"
    );
    if config.admin_api_key.is_none() {
        warn!("ADMIN_API_KEY not set; admin routes will reject every request");
    }
    if config.razorpay_webhook_secret.is_none() {
        warn!("RAZORPAY_WEBHOOK_SECRET not set; billing webhook is disabled");
    }

    let state = match AppState::new(config.clone()) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create application state: {:#}", e);
            std::process::exit(1);
        }
    };

    let metrics_enabled = std::env::var("METRICS_ENABLED")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(true);

    let metrics_handle = if metrics_enabled {
        match metrics::init_metrics() {
            Ok(handle) => {
                info!("Prometheus metrics enabled at /metrics");
                Some(handle)
            }
            Err(e) => {
                warn!("Failed to install metrics recorder: {}", e);
                None
            }
        }
    } else {
        None
    };

    let app = create_router(state, metrics_handle);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid bind address")?;

    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("jjj_api=info,jjj_firestore=info,tower_http=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Received shutdown signal");
}
