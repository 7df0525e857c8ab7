//! Shared CLI helpers used across multiple commands.

use std::path::{Path, PathBuf};

use apefx_config::RunConfig;
use apefx_core::{ActivityState, PinCounters, Telemetry};
use apefx_host::{
    EffectRegistry, HostedEffect, WavSpec, pcm_bytes, pcm_samples, read_wav, remap_channels,
};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};

/// Options shared by every command that runs an effect.
#[derive(Args)]
pub struct RunArgs {
    /// Run configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Effect to load, overriding the configuration
    #[arg(short, long, value_name = "NAME")]
    pub effect: Option<String>,

    /// Bytes written per input pin per round, overriding the configuration
    #[arg(long, value_name = "N")]
    pub chunk_bytes: Option<usize>,

    /// Print the telemetry summary as JSON
    #[arg(long)]
    pub json: bool,
}

/// Loads the configuration named by `args`, applies the overrides and
/// validates the result.
pub fn resolve_config(args: &RunArgs) -> anyhow::Result<RunConfig> {
    let mut config = match &args.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    if let Some(name) = &args.effect {
        config.effect.name = name.to_ascii_lowercase();
    }
    if let Some(chunk_bytes) = args.chunk_bytes {
        config.host.chunk_bytes = chunk_bytes;
    }
    config.validate()?;
    Ok(config)
}

/// What a finished run leaves behind.
pub struct RunReport {
    /// Effect name from the descriptor.
    pub effect: &'static str,
    /// Layout of the input file.
    pub input_spec: WavSpec,
    /// Interleaved samples drained from output pin 0.
    pub output: Vec<i16>,
    /// Final telemetry snapshot.
    pub telemetry: Telemetry,
    /// Status updates signalled by the effect.
    pub status_updates: u32,
    /// `process` calls made.
    pub ticks: u64,
}

/// Loads the configured effect, sends its configuration, streams `input`
/// through it and closes it.
pub fn run_effect(
    config: &RunConfig,
    input: &Path,
    show_progress: bool,
) -> anyhow::Result<RunReport> {
    let (samples, input_spec) = read_wav(input)?;
    tracing::info!(
        path = %input.display(),
        channels = input_spec.channels,
        sample_rate = input_spec.sample_rate,
        samples = samples.len(),
        "read input"
    );

    let registry = EffectRegistry::new();
    let mut host = registry.create(&config.effect.name, config.host_config())?;
    for message in config.call_messages() {
        host.call(&message)?;
    }

    let pins = pin_streams(&samples, input_spec.channels, config, host.info().num_input_pins)?;
    let inputs: Vec<&[u8]> = pins.iter().map(Vec::as_slice).collect();

    let pb = if show_progress {
        ProgressBar::new(inputs.first().map_or(0, |pin| pin.len()) as u64)
    } else {
        ProgressBar::hidden()
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")?
            .progress_chars("##-"),
    );
    let output = host.stream(&inputs, &mut |n| pb.inc(n as u64))?;
    pb.finish_and_clear();

    Ok(RunReport {
        effect: host.info().name,
        input_spec,
        output: pcm_samples(&output),
        telemetry: host.telemetry(),
        status_updates: host.status_updates(),
        ticks: host.ticks(),
    })
}

/// Splits interleaved file samples into the byte stream of each input pin.
///
/// With one channel per pin and several pins, file channel `k` feeds pin `k`.
/// Otherwise every frame goes to pin 0, remapped to the channels the effect
/// expects there.
fn pin_streams(
    samples: &[i16],
    channels: u16,
    config: &RunConfig,
    num_pins: usize,
) -> anyhow::Result<Vec<Vec<u8>>> {
    let per_pin = config.input_channels();
    if per_pin == 1 && num_pins > 1 {
        let wide = remap_channels(samples, channels, num_pins as u16)?;
        return Ok((0..num_pins)
            .map(|pin| {
                let channel: Vec<i16> =
                    wide.iter().skip(pin).step_by(num_pins).copied().collect();
                pcm_bytes(&channel)
            })
            .collect());
    }
    Ok(vec![pcm_bytes(&remap_channels(samples, channels, per_pin)?)])
}

/// Prints the telemetry of a run, as text or JSON.
pub fn print_telemetry(report: &RunReport, json: bool) -> anyhow::Result<()> {
    let process = &report.telemetry.process;
    let measured = process.count > 0;

    if json {
        let value = serde_json::json!({
            "effect": report.effect,
            "state": state_name(process.state),
            "ticks": report.ticks,
            "status_updates": report.status_updates,
            "output_samples": report.output.len(),
            "process": {
                "count": process.count,
                "time_last": process.time_last,
                "time_low": measured.then_some(process.time_low),
                "time_high": process.time_high,
                "time_total": process.time_total,
                "period": process.period,
                "ts_last": process.ts_last,
            },
            "input": pin_json(&report.telemetry.input),
            "output": pin_json(&report.telemetry.output),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("\nTelemetry ({}):", report.effect);
    println!("  State:    {}", state_name(process.state));
    println!(
        "  Cycles:   {} measured of {} ticks",
        process.count, report.ticks
    );
    if measured {
        println!(
            "  Time:     last {}, low {}, high {}, mean {:.1}",
            process.time_last,
            process.time_low,
            process.time_high,
            process.time_total as f64 / f64::from(process.count)
        );
    }
    for (pin, counters) in report.telemetry.input.iter().enumerate() {
        if counters.bytes > 0 {
            println!(
                "  Input  {pin}: {} bytes in {} blocks",
                counters.bytes, counters.frames
            );
        }
    }
    for (pin, counters) in report.telemetry.output.iter().enumerate() {
        if counters.bytes > 0 {
            println!(
                "  Output {pin}: {} bytes in {} blocks",
                counters.bytes, counters.frames
            );
        }
    }
    println!("  Status updates: {}", report.status_updates);
    Ok(())
}

fn state_name(state: ActivityState) -> &'static str {
    if state.is_active() {
        "active"
    } else {
        "inactive"
    }
}

fn pin_json(counters: &[PinCounters]) -> Vec<serde_json::Value> {
    counters
        .iter()
        .map(|c| serde_json::json!({ "bytes": c.bytes, "frames": c.frames }))
        .collect()
}
