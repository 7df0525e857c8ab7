//! Two-input acoustic echo canceller.
//!
//! Echo (microphone) and reference (far-end) samples arrive either
//! interleaved on pin 0 or split across pins 0 and 1. Each cycle the
//! canceller accumulates one block per pin, and once every pin holds a full
//! block and the output ring has room for a full output block it:
//!
//! 1. de-interleaves echo and reference, pushing the reference through the
//!    bulk delay line,
//! 2. runs the [`CancellationStage`] and [`PostFilterStage`] (unless the mode
//!    is `char` or the activity state is inactive),
//! 3. assembles the output block for the current [`AecMode`] and writes it to
//!    the output ring.
//!
//! ```text
//! pin 0 ──► accumulate ──┬──► echo ───────┬──► cancel ──► post-filter ──┐
//! pin 1 ──► accumulate ──┴──► delay ─► ref┘                             ├──► assemble ──► out
//!                             raw echo / raw input ─────────────────────┘
//! ```
//!
//! Only 16-bit mono streams are supported (one channel per stream).

mod delay_line;
mod messages;
pub mod params;
pub mod stages;

use alloc::sync::Arc;
use core::fmt;

use apefx_core::{
    CallMessage, Effect, EffectDescriptor, EffectInfo, EffectInstance, Guid,
    InitContext, MemFlags, MemoryRegion, MemoryRequirements, NO_OUTPUTS, RingBuffer, SharedState,
};

use crate::pcm;

pub use delay_line::BulkDelayLine;
pub use messages::{
    AecCall, MAX_CALL_SIZE, PARAMS_PAYLOAD_SIZE, ParamGroup, RESET_WITH_PARAMS_SIZE, aec_method,
};
pub use params::{
    AecMode, AecParams, BlockLengths, ControlFlags, DataFormat, FilterConfig, InputMode,
    PostProcConfig, verify_parameters,
};
pub use stages::{CancellationStage, NlmsCanceller, PostFilterStage, ResidualSuppressor};

use params::{MAX_BLOCK_SAMPLES, MAX_IN_BLOCK_BYTES, NUM_INPUT_PINS, OUTPUT_BUFFER_SIZE};

/// Echo canceller identity.
pub const AEC_GUID: Guid = Guid::new(0xf0ae075a, 0x8db549d0, 0x90fbb2c2, 0xb671c9b5);

/// Descriptor of the echo canceller with the reference stages.
pub static AEC_DESCRIPTOR: EffectDescriptor<EchoCanceller> = <EchoCanceller>::DESCRIPTOR;

/// Echo canceller instance, generic over its two signal stages.
pub struct EchoCanceller<C = NlmsCanceller, P = ResidualSuppressor> {
    core: EffectInstance,
    params: AecParams,
    mode: AecMode,
    lengths: BlockLengths,
    bytes_available: [usize; NUM_INPUT_PINS],
    input_available: bool,
    output_available: bool,
    raw: [[u8; MAX_IN_BLOCK_BYTES]; NUM_INPUT_PINS],
    echo: [i16; MAX_BLOCK_SAMPLES],
    reference: [i16; MAX_BLOCK_SAMPLES],
    residual: [i16; MAX_BLOCK_SAMPLES],
    assembled: [u8; MAX_IN_BLOCK_BYTES],
    delay_line: BulkDelayLine,
    canceller: C,
    post_filter: P,
}

impl<C, P> EchoCanceller<C, P>
where
    C: CancellationStage + Default + 'static,
    P: PostFilterStage + Default + 'static,
{
    /// Descriptor for this stage combination.
    pub const DESCRIPTOR: EffectDescriptor<Self> = EffectDescriptor {
        info: EffectInfo {
            name: "aec",
            id: AEC_GUID,
            version: 1,
            kind: 0,
            memory: MemoryRequirements {
                instance: core::mem::size_of::<Self>(),
                shared: core::mem::size_of::<SharedState>(),
                fast_shared: OUTPUT_BUFFER_SIZE,
                internal: 0,
                required_internal: 0,
            },
            max_call_params_size: MAX_CALL_SIZE,
            num_input_pins: NUM_INPUT_PINS,
            num_output_pins: 1,
            max_process_time: 0,
            period: 0,
        },
        init: Self::init,
        close: Self::close,
        call: Self::call,
        process: Self::process,
    };

    /// `init` entry point.
    ///
    /// The output ring is placed at the start of the fast-shared block.
    pub fn init(descriptor: &'static EffectDescriptor<Self>, ctx: InitContext) -> Self {
        let output = match ctx.fast_shared {
            Some(block) => RingBuffer::over_block(block, OUTPUT_BUFFER_SIZE, MemFlags::ALL_ACCESS),
            None => {
                #[cfg(feature = "tracing")]
                tracing::warn!(effect = "aec", "no fast-shared block, output is unbacked");
                RingBuffer::new(MemoryRegion::unbacked(
                    OUTPUT_BUFFER_SIZE,
                    MemFlags::ALL_ACCESS,
                ))
            }
        };
        let mut outputs = NO_OUTPUTS;
        outputs[0] = Some(Arc::new(output));

        let core = EffectInstance::initialize(
            &descriptor.info,
            ctx.shared_state,
            ctx.inputs,
            outputs,
            ctx.clock,
        );
        let mut fx = Self {
            core,
            params: AecParams::default(),
            mode: AecMode::default(),
            lengths: BlockLengths::default(),
            bytes_available: [0; NUM_INPUT_PINS],
            input_available: false,
            output_available: false,
            raw: [[0; MAX_IN_BLOCK_BYTES]; NUM_INPUT_PINS],
            echo: [0; MAX_BLOCK_SAMPLES],
            reference: [0; MAX_BLOCK_SAMPLES],
            residual: [0; MAX_BLOCK_SAMPLES],
            assembled: [0; MAX_IN_BLOCK_BYTES],
            delay_line: BulkDelayLine::default(),
            canceller: C::default(),
            post_filter: P::default(),
        };
        fx.reset_local();
        fx.initialize(None);
        #[cfg(feature = "tracing")]
        tracing::debug!(effect = "aec", params = ?fx.params, "initialized");
        fx
    }

    /// `close` entry point.
    pub fn close(&mut self) {
        #[cfg(feature = "tracing")]
        tracing::debug!(effect = "aec", "closed");
    }

    /// `call` entry point.
    ///
    /// Malformed payloads are logged and ignored.
    pub fn call(&mut self, message: &CallMessage<'_>) {
        match AecCall::decode(message) {
            Ok(call) => self.apply(call),
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(effect = "aec", method = message.method(), error = %_err, "malformed call ignored");
            }
        }
    }

    /// `process` entry point: one full cycle.
    ///
    /// Telemetry timing is recorded only when a block was produced; the pin
    /// counters are mirrored every cycle.
    pub fn process(&mut self) {
        let start = self.core.process_start();
        self.update_block_length_info();
        self.get_input();
        self.process_input();
        let produced = self.put_output();
        if produced > 0 {
            self.core.cached_mut().output[0].record_block(produced);
            self.core.process_end(start, 0);
        }
        self.core.mirror_pin_counters();
    }

    /// Applies a decoded call.
    pub fn apply(&mut self, call: AecCall) {
        match call {
            AecCall::SetState(state) => self.core.set_state(state),
            AecCall::Flush => {
                self.core.full_reset();
            }
            AecCall::Reset(params) => self.reset(params),
            AecCall::SetParams(group) => self.set_params(group),
            AecCall::SetMode(raw) => match AecMode::from_raw(raw) {
                Some(mode) => self.set_mode(mode),
                None => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(effect = "aec", mode = raw, "unknown mode ignored");
                }
            },
            AecCall::SetControls { flags, mask } => self.set_controls(flags, mask),
            AecCall::UpdateStatus => {
                self.update_status();
            }
            AecCall::Unknown(_code) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(effect = "aec", method = _code, "unknown call ignored");
            }
        }
    }

    /// Full reset: pins and telemetry, local state, then parameters.
    ///
    /// With `Some(params)` the block replaces the defaults; its bulk delay is
    /// per reference channel.
    pub fn reset(&mut self, params: Option<AecParams>) {
        self.core.full_reset();
        self.reset_local();
        self.initialize(params);
    }

    /// Merges one parameter group and re-validates.
    ///
    /// The filter group's bulk delay is per reference channel and is scaled
    /// by the current reference channel count.
    pub fn set_params(&mut self, group: ParamGroup) {
        match group {
            ParamGroup::Filter(filter) => {
                let n_ref = self.params.data_format.n_reference_channels;
                self.params.filter = FilterConfig {
                    bulk_delay: filter.bulk_delay.saturating_mul(n_ref),
                    ..filter
                };
            }
            ParamGroup::DataFormat(format) => self.params.data_format = format,
            ParamGroup::PostProc(post_proc) => self.params.post_proc = post_proc,
        }
        verify_parameters(&mut self.params);
        match group {
            ParamGroup::PostProc(_) => self.apply_controls(),
            _ => self.configure_stages(),
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(effect = "aec", params = ?self.params, "parameters updated");
    }

    /// Selects the output mode.
    pub fn set_mode(&mut self, mode: AecMode) {
        self.mode = mode;
        #[cfg(feature = "tracing")]
        tracing::debug!(effect = "aec", mode = mode.name(), "mode set");
    }

    /// Replaces the control bits selected by `mask` and pushes them to the post-filter.
    pub fn set_controls(&mut self, flags: ControlFlags, mask: ControlFlags) {
        self.params.flags = self.params.flags.apply_masked(flags, mask);
        self.apply_controls();
    }

    /// Increments the shared status counter. Returns the new value.
    pub fn update_status(&mut self) -> u32 {
        self.core.shared().bump_status()
    }

    /// Current (validated) parameters.
    pub fn params(&self) -> &AecParams {
        &self.params
    }

    /// Current output mode.
    pub fn mode(&self) -> AecMode {
        self.mode
    }

    /// Byte counts derived on the last cycle.
    pub fn block_lengths(&self) -> BlockLengths {
        self.lengths
    }

    /// Bytes accumulated per input pin toward the next block.
    pub fn bytes_available(&self) -> [usize; NUM_INPUT_PINS] {
        self.bytes_available
    }

    /// The cancellation stage.
    pub fn canceller(&self) -> &C {
        &self.canceller
    }

    /// The post-filter stage.
    pub fn post_filter(&self) -> &P {
        &self.post_filter
    }

    fn reset_local(&mut self) {
        self.params = AecParams::default();
        self.mode = AecMode::default();
        self.bytes_available = [0; NUM_INPUT_PINS];
        self.input_available = false;
        self.output_available = false;
        for raw in &mut self.raw {
            raw.fill(0);
        }
        self.echo.fill(0);
        self.reference.fill(0);
        self.residual.fill(0);
        self.delay_line.clear();
        self.core.shared().reset_status();
    }

    fn initialize(&mut self, params: Option<AecParams>) {
        if let Some(mut params) = params {
            params.filter.bulk_delay = params
                .filter
                .bulk_delay
                .saturating_mul(params.data_format.n_reference_channels);
            self.params = params;
        }
        verify_parameters(&mut self.params);
        self.configure_stages();
    }

    fn configure_stages(&mut self) {
        let block = self.params.filter.block_length as usize;
        let sample_rate = self.params.data_format.sample_rate;
        self.canceller
            .configure(block, self.params.filter.tail_length as usize, sample_rate);
        self.post_filter.configure(block, sample_rate);
        self.apply_controls();
    }

    fn apply_controls(&mut self) {
        let flags = self.params.flags;
        self.post_filter
            .set_denoise(!flags.contains(ControlFlags::DENOISE_DISABLE));
        if flags.contains(ControlFlags::RESIDUAL_SUPPRESSION_DISABLE) {
            self.post_filter.set_echo_suppress(0, 0);
        } else {
            let pp = &self.params.post_proc;
            self.post_filter.set_echo_suppress(
                pp.residual_suppression_threshold_inactive,
                pp.residual_suppression_threshold_active,
            );
        }
    }

    fn update_block_length_info(&mut self) {
        let lengths = BlockLengths::derive(&self.params, self.mode);
        if lengths != self.lengths {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                effect = "aec",
                echo = lengths.echo,
                reference = lengths.reference,
                in0 = lengths.input[0],
                in1 = lengths.input[1],
                out = lengths.output,
                "block lengths"
            );
            self.lengths = lengths;
        }
    }

    fn get_input(&mut self) {
        for pin in 0..NUM_INPUT_PINS {
            let want = self.lengths.input[pin];
            if want == 0 {
                continue;
            }
            let Some(buffer) = self.core.input(pin) else {
                continue;
            };
            let offset = self.bytes_available[pin];
            let n = want.saturating_sub(offset).min(buffer.valid_bytes());
            buffer.copy_out(&mut self.raw[pin][offset..offset + n]);
            buffer.consume_bytes(n);
            self.bytes_available[pin] += n;
            self.core.cached_mut().input[pin].bytes += n as u64;
        }

        let output_free = self.core.output(0).map_or(0, RingBuffer::bytes_free);
        let complete = self
            .bytes_available
            .iter()
            .zip(&self.lengths.input)
            .all(|(have, want)| have >= want);
        if !complete || output_free < self.lengths.output {
            #[cfg(feature = "tracing")]
            tracing::trace!(
                effect = "aec",
                have = ?self.bytes_available,
                output_free,
                "waiting for a full block"
            );
            return;
        }

        match self.params.filter.input_mode {
            InputMode::SingleInterleaved => self.deinterleave_input(),
            InputMode::MultiPin => self.split_input(),
        }
        self.bytes_available = [0; NUM_INPUT_PINS];
        self.input_available = true;
    }

    fn deinterleave_input(&mut self) {
        let frames = self.params.filter.block_length as usize;
        let n_in = self.params.data_format.n_input_channels as usize;
        let n_ref = self.params.data_format.n_reference_channels as usize;
        let bulk = self.params.filter.bulk_delay as usize;

        let mut sample = 0;
        for frame in 0..frames {
            for ch in 0..n_in {
                self.echo[frame * n_in + ch] = pcm::sample_at(&self.raw[0], sample);
                sample += 1;
            }
            for ch in 0..n_ref {
                let s = pcm::sample_at(&self.raw[0], sample);
                self.reference[frame * n_ref + ch] = self.delay_line.push(s, bulk);
                sample += 1;
            }
        }
    }

    fn split_input(&mut self) {
        let echo_bytes = self.lengths.echo;
        let ref_samples = self.lengths.reference / pcm::BYTES_PER_SAMPLE;
        let bulk = self.params.filter.bulk_delay as usize;

        pcm::decode_into(&self.raw[0][..echo_bytes], &mut self.echo);
        for i in 0..ref_samples {
            let s = pcm::sample_at(&self.raw[1], i);
            self.reference[i] = self.delay_line.push(s, bulk);
        }
    }

    fn process_input(&mut self) {
        if !self.input_available {
            return;
        }
        let n = self.params.filter.block_length as usize;
        match self.mode {
            AecMode::Char => {}
            AecMode::Active | AecMode::Bypass | AecMode::Cmp if self.core.state().is_active() => {
                self.canceller
                    .cancel(&self.echo[..n], &self.reference[..n], &mut self.residual[..n]);
                self.post_filter.run(&mut self.residual[..n]);
            }
            _ => self.residual[..n].copy_from_slice(&self.echo[..n]),
        }
        self.input_available = false;
        self.output_available = true;
    }

    fn put_output(&mut self) -> usize {
        if !self.output_available {
            return 0;
        }
        self.output_available = false;

        let len = self.lengths.output;
        let frames = self.params.filter.block_length as usize;
        let format = self.params.data_format;
        let n_in = format.n_input_channels as usize;
        let n_out = format.n_output_channels as usize;
        let n_ref = format.n_reference_channels as usize;

        match self.mode {
            AecMode::Char => match self.params.filter.input_mode {
                InputMode::SingleInterleaved => {
                    self.assembled[..len].copy_from_slice(&self.raw[0][..len]);
                }
                InputMode::MultiPin => pcm::interleave_bytes(
                    &mut self.assembled,
                    &self.raw[0],
                    n_in * pcm::BYTES_PER_SAMPLE,
                    &self.raw[1],
                    n_ref * pcm::BYTES_PER_SAMPLE,
                    frames,
                ),
            },
            AecMode::Active => {
                pcm::encode_into(&self.residual[..frames * n_out], &mut self.assembled[..len]);
            }
            AecMode::Bypass => {
                pcm::encode_into(&self.echo[..frames * n_in], &mut self.assembled[..len]);
            }
            AecMode::Cmp => pcm::interleave_samples(
                &mut self.assembled,
                &self.residual,
                n_out,
                &self.echo,
                n_in,
                frames,
            ),
        }

        let Some(output) = self.core.output(0) else {
            return 0;
        };
        output.copy_in(&self.assembled[..len]);
        output.add_bytes(len);
        len
    }
}

impl<C: 'static, P: 'static> Effect for EchoCanceller<C, P> {
    fn instance(&self) -> &EffectInstance {
        &self.core
    }

    fn instance_mut(&mut self) -> &mut EffectInstance {
        &mut self.core
    }
}

impl<C, P> fmt::Debug for EchoCanceller<C, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EchoCanceller")
            .field("core", &self.core)
            .field("params", &self.params)
            .field("mode", &self.mode)
            .field("lengths", &self.lengths)
            .field("bytes_available", &self.bytes_available)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apefx_core::{ActivityState, ManualClock, MemoryBlock, MemoryClass, NO_INPUTS};

    fn context(input_pins: usize, fast_shared: bool) -> (InitContext, [Arc<RingBuffer>; 2]) {
        let pins = [
            Arc::new(RingBuffer::with_capacity(MemoryClass::Shared, 8192)),
            Arc::new(RingBuffer::with_capacity(MemoryClass::Shared, 8192)),
        ];
        let mut inputs = NO_INPUTS;
        for (slot, pin) in inputs.iter_mut().zip(&pins).take(input_pins) {
            *slot = Some(Arc::clone(pin));
        }
        let ctx = InitContext {
            shared_state: Arc::new(SharedState::new()),
            fast_shared: fast_shared
                .then(|| MemoryBlock::shared(MemoryClass::FastShared, OUTPUT_BUFFER_SIZE)),
            internal: None,
            required_internal: None,
            inputs,
            clock: Arc::new(ManualClock::new()),
        };
        (ctx, pins)
    }

    fn feed(pin: &RingBuffer, samples: &[i16]) {
        let mut bytes = alloc::vec![0u8; samples.len() * 2];
        pcm::encode_into(samples, &mut bytes);
        pin.copy_in(&bytes);
        pin.add_bytes(bytes.len());
    }

    #[test]
    fn descriptor_declares_pins_and_memory() {
        let info = &AEC_DESCRIPTOR.info;
        assert_eq!(info.num_input_pins, 2);
        assert_eq!(info.num_output_pins, 1);
        assert_eq!(info.memory.fast_shared, 16384);
        assert_eq!(info.max_call_params_size, 56);
        assert_eq!(info.id, AEC_GUID);
    }

    #[test]
    fn init_applies_defaults() {
        let (ctx, _pins) = context(1, true);
        let fx = (AEC_DESCRIPTOR.init)(&AEC_DESCRIPTOR, ctx);
        assert_eq!(*fx.params(), AecParams::default());
        assert_eq!(fx.mode(), AecMode::Active);
        assert_eq!(fx.instance().state(), ActivityState::Inactive);
        assert_eq!(fx.canceller().taps(), 512);
        assert_eq!(fx.instance().output(0).map(RingBuffer::capacity), Some(OUTPUT_BUFFER_SIZE));
    }

    #[test]
    fn partial_block_accumulates() {
        let (ctx, pins) = context(1, true);
        let mut fx = (AEC_DESCRIPTOR.init)(&AEC_DESCRIPTOR, ctx);
        feed(&pins[0], &[1; 100]);
        fx.process();
        assert_eq!(fx.bytes_available(), [200, 0]);
        assert_eq!(fx.instance().output(0).map(RingBuffer::valid_bytes), Some(0));
        assert_eq!(fx.instance().cached().process.count, 0);
        assert_eq!(fx.instance().shared().snapshot().input[0].bytes, 200);
    }

    #[test]
    fn inactive_state_passes_echo_through() {
        let (ctx, pins) = context(1, true);
        let mut fx = (AEC_DESCRIPTOR.init)(&AEC_DESCRIPTOR, ctx);
        let frames: alloc::vec::Vec<i16> = (0..128).flat_map(|i| [i as i16, 1000]).collect();
        feed(&pins[0], &frames);
        fx.process();

        let output = fx.instance().output(0).unwrap();
        let mut bytes = [0u8; 256];
        output.copy_out(&mut bytes);
        assert_eq!(pcm::sample_at(&bytes, 0), 0);
        assert_eq!(pcm::sample_at(&bytes, 127), 127);
    }

    #[test]
    fn output_backpressure_holds_the_block() {
        let (ctx, pins) = context(1, true);
        let mut fx = (AEC_DESCRIPTOR.init)(&AEC_DESCRIPTOR, ctx);
        let output = fx.instance().output_handle(0).unwrap();
        output.add_bytes(OUTPUT_BUFFER_SIZE - 100);

        feed(&pins[0], &[0; 256]);
        fx.process();
        assert_eq!(fx.bytes_available(), [512, 0]);
        assert_eq!(output.valid_bytes(), OUTPUT_BUFFER_SIZE - 100);

        output.consume_bytes(1000);
        fx.process();
        assert_eq!(fx.bytes_available(), [0, 0]);
        assert_eq!(output.valid_bytes(), OUTPUT_BUFFER_SIZE - 100 - 1000 + 256);
    }

    #[test]
    fn unbacked_output_does_not_panic() {
        let (ctx, pins) = context(1, false);
        let mut fx = (AEC_DESCRIPTOR.init)(&AEC_DESCRIPTOR, ctx);
        feed(&pins[0], &[0; 256]);
        fx.process();
        assert!(!fx.instance().output(0).unwrap().is_backed());
    }

    #[test]
    fn filter_group_scales_bulk_delay() {
        let (ctx, _pins) = context(1, true);
        let mut fx = (AEC_DESCRIPTOR.init)(&AEC_DESCRIPTOR, ctx);
        let mut filter = AecParams::default().filter;
        filter.bulk_delay = 2000;
        filter.tail_length = 256;
        fx.set_params(ParamGroup::Filter(filter));
        assert_eq!(fx.params().filter.bulk_delay, 1024);
        assert_eq!(fx.canceller().taps(), 256);
    }

    #[test]
    fn controls_reach_post_filter() {
        let (ctx, _pins) = context(1, true);
        let mut fx = (AEC_DESCRIPTOR.init)(&AEC_DESCRIPTOR, ctx);
        let both = ControlFlags::DENOISE_DISABLE.union(ControlFlags::RESIDUAL_SUPPRESSION_DISABLE);
        fx.set_controls(both, both);
        assert!(!fx.post_filter().denoise());
        assert_eq!(fx.post_filter().echo_suppress(), (0, 0));

        fx.set_controls(ControlFlags::NONE, ControlFlags::RESIDUAL_SUPPRESSION_DISABLE);
        assert!(!fx.post_filter().denoise());
        assert_eq!(fx.post_filter().echo_suppress(), (-40, -15));
    }
}
