use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use marketgate::config::{LogFormat, LoggingConfig, MarketgateConfig};
use marketgate::http::{self, AppState, HttpServer};
use marketgate::ratelimit::{
    spawn_sweeper, AdmissionController, AdmissionPolicy, Clock, IdentityResolver, SystemClock,
};

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "marketgate")]
#[command(about = "Admission control and HTTP front door for the marketplace API")]
#[command(version)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override server.bind_addr
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = MarketgateConfig::load(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        config.server.bind_addr = bind;
        config.validate()?;
    }

    init_tracing(&config.logging);

    info!("Starting Marketgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        bind_addr = %config.server.bind_addr,
        environment = %config.server.environment,
        window_secs = config.rate_limiting.window_secs,
        max_requests = config.rate_limiting.max_requests,
        "Configuration loaded"
    );

    let policy = AdmissionPolicy::from_config(&config.rate_limiting)?;
    let controller = Arc::new(AdmissionController::new(policy));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let sweeper = config
        .rate_limiting
        .sweep_interval()
        .map(|every| spawn_sweeper(Arc::clone(&controller), Arc::clone(&clock), every));
    if sweeper.is_none() {
        info!("Expired window sweeper disabled");
    }

    let state = Arc::new(AppState::new(
        controller,
        clock,
        IdentityResolver::from_config(&config.rate_limiting),
        config.server.environment.clone(),
    ));
    let router = http::router(state, &config.server)?;

    let server = HttpServer::bind(config.bind_socket_addr()?, router).await?;
    server.serve_with_shutdown(shutdown_signal()).await?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }

    info!("Marketgate stopped");
    Ok(())
}

/// Install the global tracing subscriber. `RUST_LOG` overrides the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    match logging.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init(),
    }
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
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
