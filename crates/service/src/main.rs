use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;

use momos_service::config::{ServiceConfig, DEFAULT_CONFIG_FILE};

#[derive(Parser)]
#[command(name = "momos-service")]
#[command(about = "Generate browser action scripts and replay them in a sandbox")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "MOMOS_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Listen address (overrides the configuration file)
    #[arg(short, long)]
    listen: Option<String>,

    /// Write the effective configuration to the config path and exit
    #[arg(long)]
    write_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = ServiceConfig::load(&args.config)?;
    config.apply_env()?;
    if let Some(listen) = args.listen {
        config.listen = listen;
    }

    if args.write_config {
        config.save(&args.config)?;
        info!("Wrote configuration to {}", args.config.display());
        return Ok(());
    }

    let addr: SocketAddr = config.listen.parse()?;
    info!(
        "Sandbox {:?} '{}', telemetry {}",
        config.sandbox.provider,
        config.sandbox.name,
        if config.program.telemetry.enabled { "on" } else { "off" }
    );

    let state = momos_service::build_state(&config)?;
    momos_service::server::serve(addr, state).await
}
