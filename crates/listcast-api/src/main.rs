//! listcast API server

use anyhow::Context;
use clap::{Parser, ValueEnum};
use listcast_api::AppState;
use listcast_config::ServiceConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Config file picked up from the working directory when `--config` is not given.
const DEFAULT_CONFIG_FILE: &str = "listcast.kdl";

#[derive(Parser)]
#[command(name = "listcast-server")]
#[command(about = "Render job orchestrator HTTP server", long_about = None)]
#[command(version)]
struct Args {
    /// Path to the KDL service configuration
    #[arg(short, long, env = "LISTCAST_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long, env = "LISTCAST_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Render deadline in milliseconds
    #[arg(long, env = "JOB_TIMEOUT_MS")]
    job_timeout_ms: Option<u64>,

    /// Log output format
    #[arg(long, env = "LISTCAST_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let config = load_config(&args)?;
    info!(
        program = %config.pipeline.program,
        timeout_ms = config.job.timeout.as_millis() as u64,
        grace_ms = config.job.grace.as_millis() as u64,
        "Configuration loaded"
    );

    let state = AppState::new(&config);
    let app = listcast_api::app(state.clone());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Starting server on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn load_config(args: &Args) -> anyhow::Result<ServiceConfig> {
    let path = args.config.clone().or_else(|| {
        let default = Path::new(DEFAULT_CONFIG_FILE);
        default.exists().then(|| default.to_path_buf())
    });

    let mut config = match path {
        Some(path) => ServiceConfig::load(&path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ServiceConfig::default(),
    };

    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(ms) = args.job_timeout_ms {
        config.job.timeout = Duration::from_millis(ms);
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Resolves on Ctrl+C, after tearing down any render still in flight.
async fn shutdown_signal(state: AppState) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");

    if state.orchestrator.cancel().await.cancelled() {
        info!("Cancelled the active render");
    }
}
