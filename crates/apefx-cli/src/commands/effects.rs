//! Effect listing and descriptor information command.

#![allow(clippy::print_literal)] // Table labels are literal strings

use apefx_core::EffectInfo;
use apefx_host::EffectRegistry;
use clap::Args;

#[derive(Args)]
pub struct EffectsArgs {
    /// Show the descriptor of a specific effect
    #[arg(value_name = "EFFECT")]
    effect: Option<String>,

    /// Print as JSON
    #[arg(long)]
    json: bool,
}

pub fn run(args: EffectsArgs) -> anyhow::Result<()> {
    let registry = EffectRegistry::new();

    let Some(name) = &args.effect else {
        if args.json {
            let list: Vec<_> = registry
                .all_effects()
                .iter()
                .map(|entry| serde_json::json!({ "id": entry.id, "description": entry.description }))
                .collect();
            println!("{}", serde_json::to_string_pretty(&list)?);
            return Ok(());
        }

        println!("Available Effects");
        println!("=================");
        println!();
        for entry in registry.all_effects() {
            println!("  {:10} - {}", entry.id, entry.description);
        }
        println!();
        println!("Use 'apefx effects <name>' for descriptor details.");
        return Ok(());
    };

    let entry = registry
        .get(&name.to_ascii_lowercase())
        .ok_or_else(|| anyhow::anyhow!("Unknown effect: {}", name))?;
    let info = entry.info;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&info_json(entry.id, info))?);
        return Ok(());
    }

    println!("{}", entry.id);
    println!("{}", "=".repeat(entry.id.len()));
    println!();
    println!("{}", entry.description);
    println!();
    println!("  {:22}  {}", "Name", info.name);
    println!("  {:22}  {}", "GUID", info.id);
    println!("  {:22}  {:#x}", "Version", info.version);
    println!("  {:22}  {:#x}", "Kind", info.kind);
    println!("  {:22}  {}", "Input pins", info.num_input_pins);
    println!("  {:22}  {}", "Output pins", info.num_output_pins);
    println!("  {:22}  {} bytes", "Max call size", info.max_call_params_size);
    println!("  {:22}  {}", "Max process time", info.max_process_time);
    println!("  {:22}  {}", "Period", info.period);
    println!();
    println!("Memory:");
    let memory = &info.memory;
    for (class, bytes) in [
        ("instance", memory.instance),
        ("shared", memory.shared),
        ("fast shared", memory.fast_shared),
        ("internal", memory.internal),
        ("required internal", memory.required_internal),
    ] {
        println!("  {class:22}  {bytes} bytes");
    }
    println!();
    println!("Example usage:");
    println!();
    println!("  apefx process input.wav output.wav --effect {}", entry.id);
    Ok(())
}

fn info_json(id: &str, info: &EffectInfo) -> serde_json::Value {
    let memory = &info.memory;
    serde_json::json!({
        "id": id,
        "name": info.name,
        "guid": info.id.to_string(),
        "version": info.version,
        "kind": info.kind,
        "num_input_pins": info.num_input_pins,
        "num_output_pins": info.num_output_pins,
        "max_call_params_size": info.max_call_params_size,
        "max_process_time": info.max_process_time,
        "period": info.period,
        "memory": {
            "instance": memory.instance,
            "shared": memory.shared,
            "fast_shared": memory.fast_shared,
            "internal": memory.internal,
            "required_internal": memory.required_internal,
        },
    })
}
