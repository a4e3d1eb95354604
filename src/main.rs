use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::Parser; // for cli
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use limit_gateway::alert::AlertSink;
use limit_gateway::app::build_app;
use limit_gateway::config::{Args, GatewayConfig};
use limit_gateway::rate_limit::AdmissionPolicy;
use limit_gateway::state::AppState;
use limit_gateway::upstream::build_client;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // parse cli arguments
    let args = Args::parse();
    init_tracing(args.log_file.as_deref())?;

    info!("Starting limit-gateway {}", env!("CARGO_PKG_VERSION"));

    let config = GatewayConfig::from_file(&args.config)
        .with_context(|| format!("failed to load route table {}", args.config.display()))?;
    info!(routes = config.routes.len(), "Configuration loaded");

    if config.insecure_skip_verify {
        warn!("upstream TLS certificate verification is DISABLED (insecureSkipVerify)");
    }

    let state = Arc::new(AppState {
        client: build_client(config.insecure_skip_verify)?,
        policy: AdmissionPolicy::new(config.limits),
        alerts: AlertSink::new(config.webhook_url.clone())?,
    });
    info!(
        minute_max = config.limits.minute.max_count,
        minute_span = config.limits.minute.span_seconds,
        hour_max = config.limits.hour.max_count,
        hour_span = config.limits.hour.span_seconds,
        "Admission policy initialized"
    );

    let app = build_app(state, &config.routes);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!("Gateway running on http://localhost:{}", args.port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway stopped");
    Ok(())
}

fn init_tracing(log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.init(),
    }
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}
