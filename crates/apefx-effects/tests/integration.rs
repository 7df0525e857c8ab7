//! Integration tests for apefx-effects.
//!
//! Drives each effect through its descriptor the way a loader does: place the
//! memory it asks for, connect input rings, call `init`, then `process` and
//! `call`.

use std::sync::Arc;

use apefx_core::{
    ActivityState, CallMessage, CallWriter, Effect, EffectDescriptor, InitContext, ManualClock,
    MemoryBlock, MemoryClass, NO_INPUTS, RingBuffer, SharedState, method,
};
use apefx_effects::aec::{
    AecCall, AecMode, AecParams, ControlFlags, InputMode, ParamGroup, aec_method,
};
use apefx_effects::pcm;
use apefx_effects::reverb::{ReverbCall, ReverbParams};
use apefx_effects::wire::BLOCK_SIZE;
use apefx_effects::{AEC_DESCRIPTOR, EchoCanceller, REVERB_DESCRIPTOR, WIRE_DESCRIPTOR};

struct Rig<E: 'static> {
    fx: E,
    inputs: Vec<Arc<RingBuffer>>,
    clock: Arc<ManualClock>,
}

fn load<E: Effect>(descriptor: &'static EffectDescriptor<E>) -> Rig<E> {
    let info = &descriptor.info;
    let inputs: Vec<_> = (0..info.num_input_pins)
        .map(|_| Arc::new(RingBuffer::with_capacity(MemoryClass::Shared, 16 * 1024)))
        .collect();
    let mut pins = NO_INPUTS;
    for (slot, pin) in pins.iter_mut().zip(&inputs) {
        *slot = Some(Arc::clone(pin));
    }
    let clock = Arc::new(ManualClock::new());
    let ctx = InitContext {
        shared_state: Arc::new(SharedState::new()),
        fast_shared: Some(MemoryBlock::shared(
            MemoryClass::FastShared,
            info.memory.fast_shared,
        )),
        internal: None,
        required_internal: None,
        inputs: pins,
        clock: Arc::clone(&clock) as Arc<dyn apefx_core::Clock>,
    };
    Rig {
        fx: (descriptor.init)(descriptor, ctx),
        inputs,
        clock,
    }
}

fn write_samples(pin: &RingBuffer, samples: &[i16]) {
    let mut bytes = vec![0u8; samples.len() * 2];
    pcm::encode_into(samples, &mut bytes);
    pin.copy_in(&bytes);
    assert_eq!(pin.add_bytes(bytes.len()), 0);
}

fn read_samples(pin: &RingBuffer) -> Vec<i16> {
    let mut bytes = vec![0u8; pin.valid_bytes()];
    pin.copy_out(&mut bytes);
    pin.consume_bytes(bytes.len());
    let mut samples = vec![0i16; bytes.len() / 2];
    pcm::decode_into(&bytes, &mut samples);
    samples
}

fn send(fx: &mut EchoCanceller, call: AecCall) {
    let bytes = call.encode();
    (AEC_DESCRIPTOR.call)(fx, &CallMessage::parse(&bytes).unwrap());
}

/// `frames` interleaved frames of (echo, reference).
fn interleaved(frames: usize) -> Vec<i16> {
    (0..frames)
        .flat_map(|i| [i as i16 + 1, -(i as i16) - 1])
        .collect()
}

// ============================================================================
// 1. Echo canceller block flow
// ============================================================================

#[test]
fn one_interleaved_block_produces_one_output_block() {
    let mut rig = load(&AEC_DESCRIPTOR);
    send(
        &mut rig.fx,
        AecCall::Reset(Some(AecParams {
            filter: apefx_effects::aec::FilterConfig {
                block_length: 128,
                input_mode: InputMode::SingleInterleaved,
                ..AecParams::default().filter
            },
            ..AecParams::default()
        })),
    );

    let output = rig.fx.instance().output_handle(0).unwrap();
    let before = output.valid_bytes();
    write_samples(&rig.inputs[0], &interleaved(128));
    (AEC_DESCRIPTOR.process)(&mut rig.fx);

    assert_eq!(output.valid_bytes() - before, 128 * 2);
    assert_eq!(rig.fx.block_lengths().output, 256);
    let shared = rig.fx.instance().shared().snapshot();
    assert_eq!(shared.input[0].bytes, 512);
    assert_eq!(shared.output[0].bytes, 256);
    assert_eq!(shared.output[0].frames, 1);
}

#[test]
fn timing_is_recorded_only_when_output_is_produced() {
    let mut rig = load(&AEC_DESCRIPTOR);
    rig.clock.set_exec_time(1000);

    write_samples(&rig.inputs[0], &interleaved(64));
    rig.fx.process();
    assert_eq!(rig.fx.instance().shared().snapshot().process.count, 0);
    assert_eq!(rig.fx.instance().shared().snapshot().input[0].bytes, 256);

    write_samples(&rig.inputs[0], &interleaved(64));
    rig.fx.process();
    assert_eq!(rig.fx.instance().shared().snapshot().process.count, 1);
}

#[test]
fn bypass_emits_raw_echo() {
    let mut rig = load(&AEC_DESCRIPTOR);
    send(&mut rig.fx, AecCall::SetState(ActivityState::Active));
    send(&mut rig.fx, AecCall::SetMode(AecMode::Bypass as u32));
    assert_eq!(rig.fx.mode(), AecMode::Bypass);

    write_samples(&rig.inputs[0], &interleaved(128));
    rig.fx.process();
    let out = read_samples(&rig.fx.instance().output_handle(0).unwrap());
    let expected: Vec<i16> = (1..=128).collect();
    assert_eq!(out, expected);
}

#[test]
fn char_mode_loops_input_back() {
    let mut rig = load(&AEC_DESCRIPTOR);
    send(&mut rig.fx, AecCall::SetMode(AecMode::Char as u32));
    let input = interleaved(128);
    write_samples(&rig.inputs[0], &input);
    rig.fx.process();

    assert_eq!(rig.fx.block_lengths().output, 512);
    let out = read_samples(&rig.fx.instance().output_handle(0).unwrap());
    assert_eq!(out, input);
}

#[test]
fn cmp_interleaves_result_with_echo() {
    let mut rig = load(&AEC_DESCRIPTOR);
    send(&mut rig.fx, AecCall::SetMode(AecMode::Cmp as u32));
    write_samples(&rig.inputs[0], &interleaved(128));
    rig.fx.process();

    let out = read_samples(&rig.fx.instance().output_handle(0).unwrap());
    assert_eq!(out.len(), 256);
    // Inactive state: the result is the echo itself.
    for (i, pair) in out.chunks_exact(2).enumerate() {
        assert_eq!(pair, [i as i16 + 1, i as i16 + 1]);
    }
}

#[test]
fn multi_pin_char_reinterleaves_both_pins() {
    let mut rig = load(&AEC_DESCRIPTOR);
    let mut filter = AecParams::default().filter;
    filter.input_mode = InputMode::MultiPin;
    filter.block_length = 4;
    send(&mut rig.fx, AecCall::SetParams(ParamGroup::Filter(filter)));
    send(&mut rig.fx, AecCall::SetMode(AecMode::Char as u32));

    write_samples(&rig.inputs[0], &[1, 2, 3, 4]);
    rig.fx.process();
    assert_eq!(rig.fx.bytes_available(), [8, 0]);

    write_samples(&rig.inputs[1], &[-1, -2, -3, -4]);
    rig.fx.process();
    let out = read_samples(&rig.fx.instance().output_handle(0).unwrap());
    assert_eq!(out, [1, -1, 2, -2, 3, -3, 4, -4]);
}

#[test]
fn multi_pin_reference_passes_through_bulk_delay() {
    let mut rig = load(&AEC_DESCRIPTOR);
    let mut filter = AecParams::default().filter;
    filter.input_mode = InputMode::MultiPin;
    filter.block_length = 4;
    filter.bulk_delay = 3;
    send(&mut rig.fx, AecCall::SetParams(ParamGroup::Filter(filter)));
    assert_eq!(rig.fx.params().filter.bulk_delay, 3);

    send(&mut rig.fx, AecCall::SetState(ActivityState::Active));
    write_samples(&rig.inputs[0], &[0; 4]);
    write_samples(&rig.inputs[1], &[10, 20, 30, 40]);
    rig.fx.process();
    assert_eq!(rig.fx.instance().output(0).unwrap().valid_bytes(), 8);
}

// ============================================================================
// 2. Echo canceller calls
// ============================================================================

#[test]
fn reset_with_params_scales_bulk_delay_and_clamps() {
    let mut rig = load(&AEC_DESCRIPTOR);
    let mut params = AecParams::default();
    params.filter.bulk_delay = 40;
    params.filter.block_length = 9999;
    params.data_format.sample_rate = 10;
    send(&mut rig.fx, AecCall::Reset(Some(params)));

    let applied = rig.fx.params();
    assert_eq!(applied.filter.bulk_delay, 40);
    assert_eq!(applied.filter.block_length, 512);
    assert_eq!(applied.data_format.sample_rate, 8000);
}

#[test]
fn bare_reset_restores_defaults_and_mode() {
    let mut rig = load(&AEC_DESCRIPTOR);
    send(&mut rig.fx, AecCall::SetMode(AecMode::Cmp as u32));
    let mut post = AecParams::default().post_proc;
    post.residual_suppression_threshold_active = -3;
    send(&mut rig.fx, AecCall::SetParams(ParamGroup::PostProc(post)));
    send(&mut rig.fx, AecCall::Reset(None));

    assert_eq!(rig.fx.mode(), AecMode::Active);
    assert_eq!(*rig.fx.params(), AecParams::default());
}

#[test]
fn flush_drops_pins_and_telemetry() {
    let mut rig = load(&AEC_DESCRIPTOR);
    rig.clock.set_exec_time(5);
    write_samples(&rig.inputs[0], &interleaved(128));
    rig.fx.process();
    write_samples(&rig.inputs[0], &interleaved(10));
    assert_eq!(rig.fx.instance().shared().snapshot().process.count, 1);

    send(&mut rig.fx, AecCall::Flush);
    let shared = rig.fx.instance().shared().snapshot();
    assert_eq!(shared.process.count, 0);
    assert_eq!(shared.process.time_low, 0);
    assert_eq!(shared.process.time_high, 0);
    assert_eq!(rig.inputs[0].valid_bytes(), 0);
    assert_eq!(rig.fx.instance().output(0).unwrap().valid_bytes(), 0);
}

#[test]
fn unknown_mode_and_method_are_ignored() {
    let mut rig = load(&AEC_DESCRIPTOR);
    send(&mut rig.fx, AecCall::SetMode(42));
    assert_eq!(rig.fx.mode(), AecMode::Active);

    let bytes = CallWriter::new(aec_method::UPDATE_STATUS + 100).u32(1).finish();
    rig.fx.call(&CallMessage::parse(&bytes).unwrap());
    assert_eq!(*rig.fx.params(), AecParams::default());
}

#[test]
fn malformed_payload_is_ignored() {
    let mut rig = load(&AEC_DESCRIPTOR);
    let bytes = CallWriter::new(aec_method::SET_MODE).finish();
    rig.fx.call(&CallMessage::parse(&bytes).unwrap());
    assert_eq!(rig.fx.mode(), AecMode::Active);
}

#[test]
fn update_status_counts_in_shared_state() {
    let mut rig = load(&AEC_DESCRIPTOR);
    send(&mut rig.fx, AecCall::UpdateStatus);
    send(&mut rig.fx, AecCall::UpdateStatus);
    assert_eq!(rig.fx.instance().shared().status_updates(), 2);

    send(&mut rig.fx, AecCall::Reset(None));
    assert_eq!(rig.fx.instance().shared().status_updates(), 0);
}

#[test]
fn controls_toggle_flags() {
    let mut rig = load(&AEC_DESCRIPTOR);
    send(
        &mut rig.fx,
        AecCall::SetControls {
            flags: ControlFlags::DENOISE_DISABLE,
            mask: ControlFlags::DENOISE_DISABLE,
        },
    );
    assert!(rig.fx.params().flags.contains(ControlFlags::DENOISE_DISABLE));
    assert!(!rig.fx.post_filter().denoise());
}

#[test]
fn set_state_reaches_shared_copy() {
    let mut rig = load(&AEC_DESCRIPTOR);
    let bytes = CallWriter::new(method::SET_STATE).u32(1).finish();
    rig.fx.call(&CallMessage::parse(&bytes).unwrap());
    assert!(
        rig.fx
            .instance()
            .shared()
            .snapshot()
            .process
            .state
            .is_active()
    );
}

// ============================================================================
// 3. Wire and reverb
// ============================================================================

#[test]
fn wire_streams_across_many_ticks() {
    let mut rig = load(&WIRE_DESCRIPTOR);
    let data: Vec<u8> = (0..BLOCK_SIZE * 5).map(|i| (i * 7 % 256) as u8).collect();
    let output = rig.fx.instance().output_handle(0).unwrap();

    let mut received = Vec::new();
    for chunk in data.chunks(300) {
        rig.inputs[0].copy_in(chunk);
        rig.inputs[0].add_bytes(chunk.len());
        (WIRE_DESCRIPTOR.process)(&mut rig.fx);
        let mut out = vec![0u8; output.valid_bytes()];
        output.copy_out(&mut out);
        output.consume_bytes(out.len());
        received.extend_from_slice(&out);
    }
    assert_eq!(received, data);
}

#[test]
fn reverb_unity_dry_path_with_zero_feedback() {
    let mut rig = load(&REVERB_DESCRIPTOR);
    rig.fx.apply(ReverbCall::Init(ReverbParams {
        delay_samples: 100,
        gain_q15: 0,
        forward_gain_q15: 0x7fff,
    }));
    let input: Vec<i16> = (0..256).map(|i| (i * 100) as i16).collect();
    write_samples(&rig.inputs[0], &input);
    rig.fx.process();

    let out = read_samples(&rig.fx.instance().output_handle(0).unwrap());
    assert_eq!(out.len(), 256);
    for (x, y) in input.iter().zip(&out) {
        assert!((i32::from(*x) - i32::from(*y)).abs() <= 1, "{x} vs {y}");
    }
}

#[test]
fn reverb_flush_keeps_parameters() {
    let mut rig = load(&REVERB_DESCRIPTOR);
    let params = ReverbParams {
        delay_samples: 10,
        gain_q15: 1,
        forward_gain_q15: 2,
    };
    rig.fx.apply(ReverbCall::Init(params));
    let bytes = CallWriter::new(method::FLUSH).finish();
    rig.fx.call(&CallMessage::parse(&bytes).unwrap());
    assert_eq!(rig.fx.params(), params);
}
