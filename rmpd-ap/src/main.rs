//! rmpd - Main entry point
//!
//! Opens the audio device, binds the control socket and serves clients until
//! Ctrl+C or SIGTERM.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rmpd_ap::audio::{AudioDevice, AudioOutput};
use rmpd_ap::playback::TrackResolver;
use rmpd_ap::protocol::{ManagerSource, ProtocolServer};
use rmpd_common::config::{OutputKind, QueueScope, TomlConfig};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for rmpd
#[derive(Parser, Debug)]
#[command(name = "rmpd")]
#[command(about = "Network-controlled audio playback daemon")]
#[command(version)]
struct Args {
    /// Path to config.toml
    #[arg(short, long, env = "RMPD_CONFIG")]
    config: Option<PathBuf>,

    /// Control socket address (overrides config)
    #[arg(short, long, env = "RMPD_BIND")]
    bind: Option<String>,

    /// Queue sharing: "shared" or "per-connection" (overrides config)
    #[arg(long, env = "RMPD_QUEUE_SCOPE")]
    queue_scope: Option<QueueScope>,

    /// Output backend: "cpal" or "null" (overrides config)
    #[arg(long, env = "RMPD_OUTPUT")]
    output: Option<OutputKind>,

    /// Output device name (overrides config)
    #[arg(long, env = "RMPD_DEVICE")]
    device: Option<String>,

    /// Print the available output devices and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is read before tracing starts so the file can set the filter
    let config_result = TomlConfig::load_or_default(args.config.as_deref());
    let log_filter = config_result
        .as_ref()
        .map(TomlConfig::log_filter)
        .unwrap_or_else(|_| rmpd_common::config::DEFAULT_LOG_LEVEL.to_string());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = config_result.context("Failed to load configuration")?;

    if args.list_devices {
        for name in AudioOutput::list_devices().context("Failed to list audio devices")? {
            println!("{}", name);
        }
        return Ok(());
    }

    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }
    if let Some(scope) = args.queue_scope {
        config.server.queue_scope = scope;
    }
    if let Some(output) = args.output {
        config.audio.output = output;
    }
    if let Some(device) = args.device {
        config.audio.device = Some(device);
    }

    info!("Starting rmpd v{}", env!("CARGO_PKG_VERSION"));
    info!("Queue scope: {:?}", config.server.queue_scope);

    let device = AudioDevice::open(&config.audio).context("Failed to open audio output")?;

    let resolver = TrackResolver::new(
        config.audio.scan_directories.clone(),
        config.audio.scan_formats.clone(),
    );
    let managers = ManagerSource::new(config.server.queue_scope, device, resolver);

    let server = match ProtocolServer::bind(&config.server.bind_address, managers).await {
        Ok(server) => server,
        Err(e) => {
            error!("{}", e);
            return Err(e.into());
        }
    };

    server.run_until(shutdown_signal()).await;

    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
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
            Ok(mut stream) => {
                stream.recv().await;
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
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
