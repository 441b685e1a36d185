use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ball_stream::config::ConfigStore;
use ball_stream::state::AppState;
use ball_stream::web;

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// ball-stream command line arguments
#[derive(Parser, Debug)]
#[command(name = "ball-stream")]
#[command(version, about = "Bouncing ball H.264 stream over WebRTC", long_about = None)]
struct CliArgs {
    /// JSON configuration file (created with defaults if missing)
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Listen address (overrides config file)
    #[arg(short = 'a', long, value_name = "ADDRESS")]
    address: Option<String>,

    /// HTTP port (overrides config file)
    #[arg(short = 'p', long, value_name = "PORT")]
    http_port: Option<u16>,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_level, args.verbose);

    tracing::info!("Starting ball-stream v{}", env!("CARGO_PKG_VERSION"));

    let config_store = match &args.config {
        Some(path) => {
            tracing::info!("Config file: {}", path.display());
            ConfigStore::load(path).await?
        }
        None => ConfigStore::in_memory(),
    };

    // CLI overrides apply to this run only and are never written back
    let mut config = (*config_store.get()).clone();
    if let Some(addr) = args.address {
        config.web.bind_address = addr;
    }
    if let Some(port) = args.http_port {
        config.web.http_port = port;
    }

    let bind_ip: IpAddr = config
        .web
        .bind_address
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid bind address: {}", config.web.bind_address))?;
    let bind_addr = SocketAddr::new(bind_ip, config.web.http_port);

    let state = AppState::new(&config);

    let cleanup_task = state
        .sessions
        .spawn_cleanup_task(config.stream.cleanup_interval());

    let app = web::create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("Starting HTTP server on {}", listener.local_addr()?);

    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for CTRL+C: {}", e);
        }
        tracing::info!("Shutdown signal received");
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
    {
        tracing::error!("HTTP server error: {}", e);
    }

    cleanup(&state).await;
    cleanup_task.abort();

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Initialize logging with tracing
fn init_logging(level: LogLevel, verbose_count: u8) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "ball_stream=error,tower_http=error",
        LogLevel::Warn => "ball_stream=warn,tower_http=warn",
        LogLevel::Info => "ball_stream=info,tower_http=info",
        LogLevel::Verbose => "ball_stream=debug,tower_http=info",
        LogLevel::Debug => "ball_stream=debug,tower_http=debug,webrtc=info",
        LogLevel::Trace => "ball_stream=trace,tower_http=debug,webrtc=debug",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}

/// Close every session and stop its frame pump
async fn cleanup(state: &Arc<AppState>) {
    let closed = state.sessions.shutdown().await;
    tracing::info!("Closed {} WebRTC session(s)", closed);
}
