//! Momos CLI - Main Entry Point

use clap::{Parser, Subcommand};

use momos_cli::client::ServiceClient;
use momos_cli::commands::{run, script};
use momos_cli::output::{print_error, print_success, OutputFormat};

/// Momos CLI - natural-language browser checks
#[derive(Parser)]
#[command(name = "momos")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Service address
    #[arg(long, env = "MOMOS_SERVICE_URL", default_value = "http://127.0.0.1:8787", global = true)]
    service_url: String,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check an action script against the schema
    Validate(script::ValidateArgs),

    /// Compile an action script to JavaScript
    Compile(script::CompileArgs),

    /// Split captured program output into trace, telemetry and stdout
    Demux(script::DemuxArgs),

    /// Generate a script from a description
    Generate(run::GenerateArgs),

    /// Run a script in the service's sandbox
    Run(run::RunArgs),

    /// Check service status
    Status,

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let client = ServiceClient::new(&cli.service_url);

    match cli.command {
        Commands::Validate(args) => script::validate(args, cli.format)?,
        Commands::Compile(args) => script::compile_script(args, cli.format)?,
        Commands::Demux(args) => script::demux_output(args, cli.format)?,
        Commands::Generate(args) => run::generate(args, &client, cli.format).await?,
        Commands::Run(args) => run::run(args, &client, cli.format).await?,
        Commands::Status => match client.health().await {
            Ok(health) => {
                let service = health["service"].as_str().unwrap_or("service");
                print_success(&format!("{} is running at {}", service, client.base_url()));
            }
            Err(e) => {
                print_error(&format!("Cannot reach service at {}: {}", client.base_url(), e));
                std::process::exit(1);
            }
        },
        Commands::Version => {
            println!("Momos CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Action script version {}", momos_common::SUPPORTED_VERSION);
        }
    }

    Ok(())
}
