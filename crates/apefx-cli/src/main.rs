//! apefx CLI - run the effects against WAV files on a desktop host.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "apefx")]
#[command(author, version, about = "apefx effect runtime CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a WAV file through an effect
    Process(commands::process::ProcessArgs),

    /// Run an effect over a WAV file and report its telemetry
    Telemetry(commands::telemetry::TelemetryArgs),

    /// List available effects and their descriptors
    Effects(commands::effects::EffectsArgs),
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so `--json` output stays parseable.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Process(args) => commands::process::run(args),
        Commands::Telemetry(args) => commands::telemetry::run(args),
        Commands::Effects(args) => commands::effects::run(args),
    }
}
