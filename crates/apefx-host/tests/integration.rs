//! Integration tests for apefx-host: lifecycle, streaming and WAV I/O.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use apefx_core::{
    Effect, EffectDescriptor, EffectInfo, EffectInstance, Guid, ManualClock, MemoryClass,
    MemoryRequirements, NO_OUTPUTS,
};
use apefx_effects::AEC_DESCRIPTOR;
use apefx_effects::aec::{AecCall, AecMode, AecParams, InputMode, ParamGroup};
use apefx_effects::reverb::{ReverbCall, ReverbParams};
use apefx_host::{
    EffectHost, EffectRegistry, HostConfig, HostedEffect, WavSpec, pcm_bytes, pcm_samples,
    read_wav, remap_channels, write_wav,
};
use tempfile::NamedTempFile;

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

static INITS: AtomicUsize = AtomicUsize::new(0);
static CLOSES: AtomicUsize = AtomicUsize::new(0);
static CALLS: AtomicUsize = AtomicUsize::new(0);

struct Counting {
    core: EffectInstance,
    internal_len: usize,
}

impl Effect for Counting {
    fn instance(&self) -> &EffectInstance {
        &self.core
    }

    fn instance_mut(&mut self) -> &mut EffectInstance {
        &mut self.core
    }
}

static COUNTING: EffectDescriptor<Counting> = EffectDescriptor {
    info: EffectInfo {
        name: "counting",
        id: Guid::new(1, 2, 3, 4),
        version: 3,
        kind: 0,
        memory: MemoryRequirements {
            instance: 0,
            shared: 0,
            fast_shared: 0,
            internal: 64,
            required_internal: 0,
        },
        max_call_params_size: 8,
        num_input_pins: 0,
        num_output_pins: 0,
        max_process_time: 0,
        period: 0,
    },
    init: |descriptor, ctx| {
        INITS.fetch_add(1, Ordering::SeqCst);
        let internal_len = ctx.internal.as_ref().map_or(0, |block| block.len());
        Counting {
            core: EffectInstance::initialize(
                &descriptor.info,
                ctx.shared_state,
                ctx.inputs,
                NO_OUTPUTS,
                ctx.clock,
            ),
            internal_len,
        }
    },
    close: |_| {
        CLOSES.fetch_add(1, Ordering::SeqCst);
    },
    call: |_, _| {
        CALLS.fetch_add(1, Ordering::SeqCst);
    },
    process: |_| {},
};

#[test]
fn init_and_close_run_exactly_once() {
    let mut host = EffectHost::new(&COUNTING, HostConfig::default()).unwrap();
    assert_eq!(INITS.load(Ordering::SeqCst), 1);
    assert_eq!(host.effect().internal_len, 64);
    assert_eq!(
        host.placement().internal.as_ref().unwrap().class(),
        MemoryClass::Internal
    );

    host.call(&apefx_core::CallWriter::new(7).finish()).unwrap();
    assert_eq!(CALLS.load(Ordering::SeqCst), 1);

    host.close();
    assert_eq!(CLOSES.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------------------
// Streaming
// ---------------------------------------------------------------------------

fn interleaved(frames: usize) -> Vec<i16> {
    (0..frames)
        .flat_map(|i| [(i % 1000) as i16, -((i % 1000) as i16)])
        .collect()
}

#[test]
fn aec_streams_interleaved_input() {
    let mut host = EffectHost::with_clock(
        &AEC_DESCRIPTOR,
        HostConfig::default(),
        Arc::new(ManualClock::new()),
    )
    .unwrap();
    host.call(&AecCall::SetMode(AecMode::Bypass as u32).encode())
        .unwrap();

    let input = pcm_bytes(&interleaved(128 * 10 + 50));
    let out = host.stream(&[input.as_slice()], &mut |_| {}).unwrap();

    // Ten whole blocks; the partial block stays pending.
    let samples = pcm_samples(&out);
    assert_eq!(samples.len(), 128 * 10);
    assert!(
        samples
            .iter()
            .enumerate()
            .all(|(i, &s)| s == (i % 1000) as i16)
    );
    assert_eq!(host.telemetry().output[0].frames, 10);
    assert_eq!(host.effect().bytes_available()[0], 50 * 4);
}

#[test]
fn aec_multi_pin_stream() {
    let mut host = EffectHost::new(&AEC_DESCRIPTOR, HostConfig::default()).unwrap();
    let mut filter = AecParams::default().filter;
    filter.input_mode = InputMode::MultiPin;
    host.call(&AecCall::SetParams(ParamGroup::Filter(filter)).encode())
        .unwrap();
    host.call(&AecCall::SetMode(AecMode::Char as u32).encode())
        .unwrap();

    let echo = pcm_bytes(&vec![5i16; 256]);
    let reference = pcm_bytes(&vec![-5i16; 256]);
    let out = host
        .stream(&[echo.as_slice(), reference.as_slice()], &mut |_| {})
        .unwrap();
    let samples = pcm_samples(&out);
    assert_eq!(samples.len(), 512);
    assert!(samples.chunks_exact(2).all(|pair| pair == [5, -5]));
}

#[test]
fn stalled_effect_stops_streaming() {
    let config = HostConfig {
        input_capacity: 256,
        chunk_bytes: 256,
        ticks_per_chunk: 1,
    };
    let mut host = EffectHost::new(&AEC_DESCRIPTOR, config).unwrap();
    let mut filter = AecParams::default().filter;
    filter.input_mode = InputMode::MultiPin;
    host.call(&AecCall::SetParams(ParamGroup::Filter(filter)).encode())
        .unwrap();

    // Reference pin never fed: the echo pin fills and processing stalls.
    let echo = pcm_bytes(&vec![1i16; 4096]);
    let none: &[u8] = &[];
    let out = host.stream(&[echo.as_slice(), none], &mut |_| {}).unwrap();
    assert!(out.is_empty());
}

#[test]
fn reverb_via_registry() {
    let registry = EffectRegistry::new();
    let mut host = registry.create("reverb", HostConfig::default()).unwrap();
    let params = ReverbParams {
        delay_samples: 1,
        gain_q15: 0,
        forward_gain_q15: 0x4000,
    };
    host.call(&ReverbCall::Init(params).encode()).unwrap();

    let input = pcm_bytes(&vec![1000i16; 256]);
    let out = pcm_samples(&host.stream(&[input.as_slice()], &mut |_| {}).unwrap());
    assert_eq!(out, vec![500i16; 256]);
}

// ---------------------------------------------------------------------------
// WAV I/O
// ---------------------------------------------------------------------------

#[test]
fn wav_through_wire_is_identity() {
    let spec = WavSpec {
        channels: 1,
        sample_rate: 16000,
    };
    let mono: Vec<i16> = (0..1280).map(|i| (i * 17 % 4000) as i16 - 2000).collect();
    let input_file = NamedTempFile::new().unwrap();
    write_wav(input_file.path(), &mono, spec).unwrap();

    let (loaded, loaded_spec) = read_wav(input_file.path()).unwrap();
    let stereo = remap_channels(&loaded, loaded_spec.channels, 2).unwrap();
    let mut host = EffectRegistry::new()
        .create("wire", HostConfig::default())
        .unwrap();
    let bytes = pcm_bytes(&stereo);
    let out = pcm_samples(&host.stream(&[bytes.as_slice()], &mut |_| {}).unwrap());
    assert_eq!(out, stereo);

    let output_file = NamedTempFile::new().unwrap();
    let out_spec = WavSpec {
        channels: 2,
        ..spec
    };
    write_wav(output_file.path(), &out, out_spec).unwrap();
    let (reloaded, reloaded_spec) = read_wav(output_file.path()).unwrap();
    assert_eq!(reloaded_spec, out_spec);
    assert_eq!(reloaded.len(), 2560);
}

#[test]
fn shared_state_is_per_host() {
    let a = EffectHost::new(&AEC_DESCRIPTOR, HostConfig::default()).unwrap();
    let mut b = EffectHost::new(&AEC_DESCRIPTOR, HostConfig::default()).unwrap();
    b.call(&AecCall::UpdateStatus.encode()).unwrap();
    assert_eq!(a.status_updates(), 0);
    assert_eq!(b.status_updates(), 1);
}
