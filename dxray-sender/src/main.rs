//! dxray-sender entry point.
//!
//! ```text
//! dxray-sender                      Stream the configured dataset
//! dxray-sender --config <path>      Load a custom config TOML
//! dxray-sender --dataset <dir>      Override the dataset directory
//! dxray-sender --address <host>     Override the receiver address
//! dxray-sender --port <port>        Override the receiver port
//! dxray-sender --gen-config         Write default config to stdout
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use dxray_core::RunOutcome;
use dxray_sender::config::SenderConfig;
use dxray_sender::service::SenderService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "dxray-sender", about = "Stream a line-scan dataset to a receiver")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "dxray-sender.toml")]
    config: PathBuf,

    /// Dataset directory (overrides the config file).
    #[arg(short, long)]
    dataset: Option<PathBuf>,

    /// Receiver address (overrides the config file).
    #[arg(long)]
    address: Option<String>,

    /// Receiver port (overrides the config file).
    #[arg(short, long)]
    port: Option<u16>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&SenderConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = SenderConfig::load(&cli.config);
    if let Some(dataset) = cli.dataset {
        config.dataset.path = dataset;
    }
    if let Some(address) = cli.address {
        config.network.address = address;
    }
    if let Some(port) = cli.port {
        config.network.port = port;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("dxray-sender v{}", env!("CARGO_PKG_VERSION"));
    info!("dataset: {}", config.dataset.path.display());
    info!("receiver: {}:{}", config.network.address, config.network.port);
    info!("send interval: {} ms", config.pipeline.send_interval_ms);
    info!("payload: {}", config.pipeline.payload);

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received; shutting down");
        ctrl_c.cancel();
    });

    let summary = SenderService::new(config).run(shutdown).await?;
    if summary.outcome == Some(RunOutcome::Failed) {
        error!("stream halted: {}", summary.progress.last_status);
        std::process::exit(1);
    }

    Ok(())
}
