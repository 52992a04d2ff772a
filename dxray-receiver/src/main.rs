//! dxray-receiver entry point.
//!
//! ```text
//! dxray-receiver                    Listen with the configured settings
//! dxray-receiver --config <path>    Load a custom config TOML
//! dxray-receiver --port <port>      Override the listen port
//! dxray-receiver --output <dir>     Override the output directory
//! dxray-receiver --gen-config       Write default config to stdout
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dxray_receiver::config::ReceiverConfig;
use dxray_receiver::server::FrameServer;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "dxray-receiver", about = "Receive streamed line-scan frames")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "dxray-receiver.toml")]
    config: PathBuf,

    /// Listen port (overrides the config file).
    #[arg(short, long)]
    port: Option<u16>,

    /// Output directory (overrides the config file).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ReceiverConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = ReceiverConfig::load(&cli.config);
    if let Some(port) = cli.port {
        config.network.port = port;
    }
    if let Some(output) = cli.output {
        config.output.dir = output;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("dxray-receiver v{}", env!("CARGO_PKG_VERSION"));
    info!("output: {}", config.output.dir.display());

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received; shutting down");
        ctrl_c.cancel();
    });

    let stats = FrameServer::new(config).run(shutdown).await?;
    info!(
        "received {} frames ({} bytes) over {} connections",
        stats.frames, stats.bytes, stats.connections
    );
    Ok(())
}
