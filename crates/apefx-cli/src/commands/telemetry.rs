//! Telemetry-only run: process a file, discard the audio, report the counters.

use clap::Args;
use std::path::PathBuf;

use super::common::{RunArgs, print_telemetry, resolve_config, run_effect};

#[derive(Args)]
pub struct TelemetryArgs {
    /// Input WAV file
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    #[command(flatten)]
    run: RunArgs,
}

pub fn run(args: TelemetryArgs) -> anyhow::Result<()> {
    let config = resolve_config(&args.run)?;
    let report = run_effect(&config, &args.input, !args.run.json)?;
    print_telemetry(&report, args.run.json)
}
