//! Property-based tests for apefx-effects.
//!
//! Parameter validation must always land in range and be idempotent, the
//! bulk delay line must delay by exactly `L - 1`, and the wire must deliver
//! every complete block regardless of how the input is chunked.

use std::sync::Arc;

use apefx_core::{
    Effect, InitContext, ManualClock, MemoryBlock, MemoryClass, NO_INPUTS, RingBuffer, SharedState,
};
use apefx_effects::aec::{AecParams, BulkDelayLine, InputMode, verify_parameters};
use apefx_effects::reverb::ReverbParams;
use apefx_effects::wire::{BLOCK_SIZE, OUTPUT_BUFFER_SIZE};
use apefx_effects::{WIRE_DESCRIPTOR, pcm};
use proptest::prelude::*;

fn arb_params() -> impl Strategy<Value = AecParams> {
    (
        any::<u32>(),
        0u32..8,
        0u32..8,
        0u32..8,
        any::<u32>(),
        any::<u32>(),
        any::<u32>(),
        any::<bool>(),
    )
        .prop_map(|(sr, n_in, n_out, n_ref, bulk, tail, block, multi)| {
            let mut params = AecParams::default();
            params.data_format.sample_rate = sr;
            params.data_format.word_length = 4;
            params.data_format.n_input_channels = n_in;
            params.data_format.n_output_channels = n_out;
            params.data_format.n_reference_channels = n_ref;
            params.filter.bulk_delay = bulk;
            params.filter.tail_length = tail;
            params.filter.block_length = block;
            params.filter.input_mode = if multi {
                InputMode::MultiPin
            } else {
                InputMode::SingleInterleaved
            };
            params
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Validated parameters sit inside every supported range.
    #[test]
    fn verified_params_in_range(mut params in arb_params()) {
        verify_parameters(&mut params);
        let fmt = params.data_format;
        prop_assert!(fmt.sample_rate >= 8000);
        prop_assert_eq!(fmt.word_length, 2);
        prop_assert_eq!(fmt.n_input_channels, 1);
        prop_assert_eq!(fmt.n_output_channels, 1);
        prop_assert_eq!(fmt.n_reference_channels, 1);
        prop_assert!(params.filter.bulk_delay <= 1024);
        prop_assert!(params.filter.block_length <= 512);
        prop_assert!((1..=1024).contains(&params.filter.tail_length));
    }

    /// A second validation changes nothing.
    #[test]
    fn verify_is_idempotent(mut params in arb_params()) {
        verify_parameters(&mut params);
        let once = params;
        verify_parameters(&mut params);
        prop_assert_eq!(params, once);
    }

    /// Output of a fresh line of length `L` is the input delayed by `L - 1`.
    #[test]
    fn delay_line_delays_by_length_minus_one(
        length in 1usize..=1024,
        input in prop::collection::vec(any::<i16>(), 1..3000),
    ) {
        let mut line = BulkDelayLine::default();
        let delay = length - 1;
        for (n, &x) in input.iter().enumerate() {
            let y = line.push(x, length);
            let expected = if n >= delay { input[n - delay] } else { 0 };
            prop_assert_eq!(y, expected, "sample {}", n);
        }
    }

    /// Reverb parameter clamping is idempotent and bounded.
    #[test]
    fn reverb_clamp_bounded(delay in any::<u32>(), gain in any::<i32>(), forward in any::<i32>()) {
        let once = ReverbParams { delay_samples: delay, gain_q15: gain, forward_gain_q15: forward }
            .clamped();
        prop_assert!(once.delay_samples <= 48_000);
        prop_assert!((0..=0x7fff).contains(&once.gain_q15));
        prop_assert!((0..=0x7fff).contains(&once.forward_gain_q15));
        prop_assert_eq!(once.clamped(), once);
    }

    /// `saturate` agrees with a plain clamp.
    #[test]
    fn saturate_is_clamp(x in any::<i32>()) {
        let expected = x.clamp(i32::from(i16::MIN), i32::from(i16::MAX));
        prop_assert_eq!(i32::from(pcm::saturate(x)), expected);
    }

    /// The wire emits exactly the complete blocks of its input, in order,
    /// whatever the chunking.
    #[test]
    fn wire_preserves_stream(
        data in prop::collection::vec(any::<u8>(), 0..BLOCK_SIZE * 6),
        chunk in 1usize..1500,
    ) {
        let input = Arc::new(RingBuffer::with_capacity(MemoryClass::Shared, 8192));
        let mut inputs = NO_INPUTS;
        inputs[0] = Some(Arc::clone(&input));
        let ctx = InitContext {
            shared_state: Arc::new(SharedState::new()),
            fast_shared: Some(MemoryBlock::shared(MemoryClass::FastShared, OUTPUT_BUFFER_SIZE)),
            internal: None,
            required_internal: None,
            inputs,
            clock: Arc::new(ManualClock::new()),
        };
        let mut wire = (WIRE_DESCRIPTOR.init)(&WIRE_DESCRIPTOR, ctx);
        let output = wire.instance().output_handle(0).unwrap();

        let mut received = Vec::new();
        for piece in data.chunks(chunk) {
            input.copy_in(piece);
            input.add_bytes(piece.len());
            wire.process();
            let mut out = vec![0u8; output.valid_bytes()];
            output.copy_out(&mut out);
            output.consume_bytes(out.len());
            received.extend_from_slice(&out);
        }

        let whole = data.len() / BLOCK_SIZE * BLOCK_SIZE;
        prop_assert_eq!(&received[..], &data[..whole]);
        prop_assert_eq!(wire.pending_bytes(), data.len() - whole);
    }
}
