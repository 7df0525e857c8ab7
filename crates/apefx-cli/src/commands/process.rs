//! File-based effect processing command.

use apefx_host::{WavSpec, write_wav};
use clap::Args;
use std::path::PathBuf;

use super::common::{RunArgs, print_telemetry, resolve_config, run_effect};

#[derive(Args)]
pub struct ProcessArgs {
    /// Input WAV file
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output WAV file
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    #[command(flatten)]
    run: RunArgs,
}

pub fn run(args: ProcessArgs) -> anyhow::Result<()> {
    let config = resolve_config(&args.run)?;
    let quiet = args.run.json;

    if !quiet {
        println!(
            "Processing {} with '{}'...",
            args.input.display(),
            config.effect.name
        );
    }
    let report = run_effect(&config, &args.input, !quiet)?;

    let spec = WavSpec {
        channels: config.output_channels(),
        sample_rate: report.input_spec.sample_rate,
    };
    write_wav(&args.output, &report.output, spec)?;
    tracing::info!(
        path = %args.output.display(),
        channels = spec.channels,
        samples = report.output.len(),
        "wrote output"
    );
    if !quiet {
        println!(
            "Wrote {} ({} frames, {} ch)",
            args.output.display(),
            report.output.len() / usize::from(spec.channels.max(1)),
            spec.channels
        );
    }

    print_telemetry(&report, args.run.json)
}
