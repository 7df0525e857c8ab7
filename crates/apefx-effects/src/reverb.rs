//! Reverb: Q15 feedback comb on interleaved stereo.
//!
//! Each sample is mixed with the comb output from `delay` frames earlier:
//!
//! ```text
//! y[n]   = sat16((gain * d[idx] + forward_gain * x[n] + 0x4000) >> 15)
//! d[idx] = y[n]
//! idx    = (idx + 1) mod (channels * delay)
//! ```
//!
//! Gains are Q15 (`0x7fff` is just under unity). Processing runs on the same
//! 512-byte blocks as [`Wire`](crate::Wire).

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use apefx_core::{
    CallError, CallMessage, CallWriter, Effect, EffectDescriptor, EffectInfo, EffectInstance,
    Guid, HEADER_SIZE, InitContext, MemoryRequirements, NO_OUTPUTS, SetStateParams, SharedState,
    method,
};

use crate::block::BlockPump;
use crate::pcm::saturate;
use crate::wire::{BLOCK_SIZE, OUTPUT_BUFFER_SIZE, output_ring};

/// Reverb identity.
pub const REVERB_GUID: Guid = Guid::new(0xfa2db1ca, 0x350041b2, 0xa8fb887b, 0xcab448e6);

/// Interleaved channels. Fixed.
pub const CHANNELS: usize = 2;
/// Bytes per sample. Fixed.
pub const WORD_LENGTH: usize = 2;
/// Longest delay in frames.
pub const MAX_DELAY_SAMPLES: u32 = 48000;
/// Delay line length in samples.
pub const DELAY_LINE_SIZE: usize = MAX_DELAY_SAMPLES as usize * CHANNELS;
/// Largest Q15 gain.
pub const MAX_GAIN_Q15: i32 = 0x7fff;

/// Reverb method codes.
pub mod reverb_method {
    use apefx_core::method::EXTERNAL_START;

    /// Replace every parameter.
    pub const INIT: u32 = EXTERNAL_START;
    /// Set one parameter.
    pub const SET_SINGLE_PARAM: u32 = EXTERNAL_START + 1;
}

/// Size of an `init` message.
pub const INIT_MESSAGE_SIZE: usize = HEADER_SIZE + 5 * 4;

/// Descriptor of the reverb effect.
pub static REVERB_DESCRIPTOR: EffectDescriptor<Reverb> = EffectDescriptor {
    info: EffectInfo {
        name: "reverb",
        id: REVERB_GUID,
        version: 1,
        kind: 0,
        memory: MemoryRequirements {
            instance: core::mem::size_of::<Reverb>() + DELAY_LINE_SIZE * WORD_LENGTH,
            shared: core::mem::size_of::<SharedState>(),
            fast_shared: OUTPUT_BUFFER_SIZE,
            internal: 0,
            required_internal: 0,
        },
        max_call_params_size: INIT_MESSAGE_SIZE,
        num_input_pins: 1,
        num_output_pins: 1,
        max_process_time: 0,
        period: 0,
    },
    init: Reverb::init,
    close: Reverb::close,
    call: Reverb::call,
    process: Reverb::process,
};

/// Comb parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReverbParams {
    /// Delay in frames, `0..=48000`.
    pub delay_samples: u32,
    /// Feedback gain, Q15, `0..=0x7fff`.
    pub gain_q15: i32,
    /// Dry gain, Q15, `0..=0x7fff`.
    pub forward_gain_q15: i32,
}

impl Default for ReverbParams {
    fn default() -> Self {
        Self {
            delay_samples: 4500,
            gain_q15: 0x6000,
            forward_gain_q15: 0x4000,
        }
    }
}

impl ReverbParams {
    /// Returns the parameters clamped into range.
    pub fn clamped(self) -> Self {
        Self {
            delay_samples: self.delay_samples.min(MAX_DELAY_SAMPLES),
            gain_q15: clamp_gain(self.gain_q15),
            forward_gain_q15: clamp_gain(self.forward_gain_q15),
        }
    }
}

fn clamp_gain(gain: i32) -> i32 {
    gain.clamp(0, MAX_GAIN_Q15)
}

fn clamp_delay(value: i32) -> u32 {
    value.clamp(0, MAX_DELAY_SAMPLES as i32) as u32
}

/// Identifier of a single reverb parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ReverbParam {
    /// Delay in frames.
    Delay = 0,
    /// Feedback gain.
    Gain = 1,
    /// Dry gain.
    ForwardGain = 2,
    /// Word length (fixed at 2).
    WordLength = 3,
    /// Channel count (fixed at 2).
    NumChannels = 4,
}

impl ReverbParam {
    /// Decodes a raw parameter id.
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(ReverbParam::Delay),
            1 => Some(ReverbParam::Gain),
            2 => Some(ReverbParam::ForwardGain),
            3 => Some(ReverbParam::WordLength),
            4 => Some(ReverbParam::NumChannels),
            _ => None,
        }
    }
}

/// A decoded reverb call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReverbCall {
    /// Generic activity state change.
    SetState(apefx_core::ActivityState),
    /// Reset parameters, delay line, pins and telemetry.
    Reset,
    /// Drop buffered data and telemetry.
    Flush,
    /// Replace every parameter.
    Init(ReverbParams),
    /// Set one parameter.
    SetSingleParam(ReverbParam, i32),
    /// Any other method code.
    Unknown(u32),
}

impl ReverbCall {
    /// Decodes a call message.
    ///
    /// The `init` payload is channels, word length, delay, gain and forward
    /// gain; channels and word length are read and ignored.
    pub fn decode(message: &CallMessage<'_>) -> Result<Self, CallError> {
        let mut r = message.reader();
        Ok(match message.method() {
            method::SET_STATE => ReverbCall::SetState(SetStateParams::decode(message)?.state),
            method::RESET => ReverbCall::Reset,
            method::FLUSH => ReverbCall::Flush,
            reverb_method::INIT => {
                let _channels = r.i32()?;
                let _word_length = r.i32()?;
                ReverbCall::Init(ReverbParams {
                    delay_samples: clamp_delay(r.i32()?),
                    gain_q15: r.i32()?,
                    forward_gain_q15: r.i32()?,
                })
            }
            reverb_method::SET_SINGLE_PARAM => {
                let id = r.u32()?;
                let param = ReverbParam::from_raw(id).ok_or(CallError::InvalidValue {
                    field: "reverb parameter",
                    value: id,
                })?;
                ReverbCall::SetSingleParam(param, r.i32()?)
            }
            other => ReverbCall::Unknown(other),
        })
    }

    /// Encodes a complete call message.
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            ReverbCall::SetState(state) => SetStateParams::encode(state),
            ReverbCall::Reset => CallWriter::new(method::RESET).finish(),
            ReverbCall::Flush => CallWriter::new(method::FLUSH).finish(),
            ReverbCall::Init(params) => CallWriter::new(reverb_method::INIT)
                .i32(CHANNELS as i32)
                .i32(WORD_LENGTH as i32)
                .i32(params.delay_samples as i32)
                .i32(params.gain_q15)
                .i32(params.forward_gain_q15)
                .finish(),
            ReverbCall::SetSingleParam(param, value) => {
                CallWriter::new(reverb_method::SET_SINGLE_PARAM)
                    .u32(param as u32)
                    .i32(value)
                    .finish()
            }
            ReverbCall::Unknown(code) => CallWriter::new(code).finish(),
        }
    }
}

/// Feedback comb state.
struct Comb {
    params: ReverbParams,
    idx: usize,
    line: Box<[i16]>,
}

impl Comb {
    fn new() -> Self {
        Self {
            params: ReverbParams::default(),
            idx: 0,
            line: alloc::vec![0; DELAY_LINE_SIZE].into_boxed_slice(),
        }
    }

    fn reset(&mut self) {
        self.params = ReverbParams::default();
        self.idx = 0;
        self.line.fill(0);
    }

    fn process(&mut self, block: &mut [u8]) {
        let delay = CHANNELS * self.params.delay_samples as usize;
        let gain = self.params.gain_q15;
        let forward = self.params.forward_gain_q15;
        for word in block.chunks_exact_mut(WORD_LENGTH) {
            let x = i32::from(i16::from_le_bytes([word[0], word[1]]));
            let d = i32::from(self.line[self.idx]);
            let y = saturate((gain * d + forward * x + 0x4000) >> 15);
            self.line[self.idx] = y;
            self.idx += 1;
            if self.idx >= delay {
                self.idx = 0;
            }
            word.copy_from_slice(&y.to_le_bytes());
        }
    }
}

/// Reverb instance.
pub struct Reverb {
    core: EffectInstance,
    pump: BlockPump<BLOCK_SIZE>,
    comb: Comb,
}

impl Reverb {
    /// `init` entry point. Allocates the delay line.
    pub fn init(descriptor: &'static EffectDescriptor<Self>, ctx: InitContext) -> Self {
        let mut outputs = NO_OUTPUTS;
        outputs[0] = Some(Arc::new(output_ring(&ctx, OUTPUT_BUFFER_SIZE)));
        let core = EffectInstance::initialize(
            &descriptor.info,
            ctx.shared_state,
            ctx.inputs,
            outputs,
            ctx.clock,
        );
        let mut reverb = Self {
            core,
            pump: BlockPump::new(),
            comb: Comb::new(),
        };
        reverb.reset();
        reverb
    }

    /// `close` entry point.
    pub fn close(&mut self) {}

    /// `call` entry point.
    pub fn call(&mut self, message: &CallMessage<'_>) {
        match ReverbCall::decode(message) {
            Ok(call) => self.apply(call),
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(effect = "reverb", error = %_err, "malformed call ignored");
            }
        }
    }

    /// `process` entry point.
    pub fn process(&mut self) {
        let start = self.core.process_start();
        self.pump
            .run(&mut self.core, |block| self.comb.process(block));
        self.core.mirror_pin_counters();
        self.core.process_end(start, 0);
    }

    /// Applies a decoded call.
    pub fn apply(&mut self, call: ReverbCall) {
        match call {
            ReverbCall::SetState(state) => self.core.set_state(state),
            ReverbCall::Reset => self.reset(),
            ReverbCall::Flush => {
                self.pump.clear();
                self.core.full_reset();
            }
            ReverbCall::Init(params) => self.set_params(params),
            ReverbCall::SetSingleParam(param, value) => self.set_single_param(param, value),
            ReverbCall::Unknown(_code) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(effect = "reverb", method = _code, "unknown call ignored");
            }
        }
    }

    /// Restores default parameters and clears the delay line, pins and telemetry.
    pub fn reset(&mut self) {
        self.pump.clear();
        self.comb.reset();
        self.core.full_reset();
    }

    /// Replaces every parameter, clamped into range.
    pub fn set_params(&mut self, params: ReverbParams) {
        self.comb.params = params.clamped();
        #[cfg(feature = "tracing")]
        tracing::debug!(effect = "reverb", params = ?self.comb.params, "parameters set");
    }

    /// Sets one parameter, clamped into range. Word length and channel count are fixed.
    pub fn set_single_param(&mut self, param: ReverbParam, value: i32) {
        let params = &mut self.comb.params;
        match param {
            ReverbParam::Delay => params.delay_samples = clamp_delay(value),
            ReverbParam::Gain => params.gain_q15 = clamp_gain(value),
            ReverbParam::ForwardGain => params.forward_gain_q15 = clamp_gain(value),
            ReverbParam::WordLength | ReverbParam::NumChannels => {}
        }
    }

    /// Current parameters.
    pub fn params(&self) -> ReverbParams {
        self.comb.params
    }
}

impl Effect for Reverb {
    fn instance(&self) -> &EffectInstance {
        &self.core
    }

    fn instance_mut(&mut self) -> &mut EffectInstance {
        &mut self.core
    }
}

impl fmt::Debug for Reverb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reverb")
            .field("core", &self.core)
            .field("params", &self.comb.params)
            .field("idx", &self.comb.idx)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apefx_core::{ManualClock, MemoryBlock, MemoryClass, NO_INPUTS, RingBuffer};

    fn reverb() -> (Reverb, Arc<RingBuffer>) {
        let input = Arc::new(RingBuffer::with_capacity(MemoryClass::Shared, 4096));
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
        ((REVERB_DESCRIPTOR.init)(&REVERB_DESCRIPTOR, ctx), input)
    }

    fn send(fx: &mut Reverb, call: ReverbCall) {
        let bytes = call.encode();
        fx.call(&CallMessage::parse(&bytes).unwrap());
    }

    #[test]
    fn defaults_after_init() {
        let (fx, _input) = reverb();
        assert_eq!(fx.params(), ReverbParams::default());
    }

    #[test]
    fn impulse_response_decays_by_gain() {
        let (mut fx, input) = reverb();
        send(
            &mut fx,
            ReverbCall::Init(ReverbParams {
                delay_samples: 2,
                gain_q15: 0x4000,
                forward_gain_q15: 0x7fff,
            }),
        );

        let mut block = [0u8; BLOCK_SIZE];
        block[..2].copy_from_slice(&10000i16.to_le_bytes());
        input.copy_in(&block);
        input.add_bytes(BLOCK_SIZE);
        fx.process();

        let output = fx.instance().output(0).unwrap();
        let mut out = [0u8; BLOCK_SIZE];
        output.copy_out(&mut out);
        let samples: Vec<i16> = (0..13).map(|i| crate::pcm::sample_at(&out, i)).collect();
        assert_eq!(
            samples,
            [10000, 0, 0, 0, 5000, 0, 0, 0, 2500, 0, 0, 0, 1250]
        );
    }

    #[test]
    fn single_params_are_clamped() {
        let (mut fx, _input) = reverb();
        send(&mut fx, ReverbCall::SetSingleParam(ReverbParam::Delay, 100_000));
        send(&mut fx, ReverbCall::SetSingleParam(ReverbParam::Gain, -5));
        send(&mut fx, ReverbCall::SetSingleParam(ReverbParam::ForwardGain, 0x9000));
        send(&mut fx, ReverbCall::SetSingleParam(ReverbParam::NumChannels, 6));
        assert_eq!(
            fx.params(),
            ReverbParams {
                delay_samples: MAX_DELAY_SAMPLES,
                gain_q15: 0,
                forward_gain_q15: MAX_GAIN_Q15,
            }
        );
    }

    #[test]
    fn reset_restores_defaults() {
        let (mut fx, _input) = reverb();
        send(&mut fx, ReverbCall::SetSingleParam(ReverbParam::Gain, 1));
        send(&mut fx, ReverbCall::Reset);
        assert_eq!(fx.params(), ReverbParams::default());
    }

    #[test]
    fn unknown_param_id_is_rejected() {
        let bytes = CallWriter::new(reverb_method::SET_SINGLE_PARAM)
            .u32(9)
            .i32(1)
            .finish();
        let msg = CallMessage::parse(&bytes).unwrap();
        assert_eq!(
            ReverbCall::decode(&msg),
            Err(CallError::InvalidValue {
                field: "reverb parameter",
                value: 9
            })
        );
    }

    #[test]
    fn saturates_loud_input() {
        let mut comb = Comb::new();
        comb.params = ReverbParams {
            delay_samples: 1,
            gain_q15: MAX_GAIN_Q15,
            forward_gain_q15: MAX_GAIN_Q15,
        };
        let mut block = [0u8; 8];
        for word in block.chunks_exact_mut(2) {
            word.copy_from_slice(&i16::MAX.to_le_bytes());
        }
        comb.process(&mut block);
        // Third sample sees the first through the two-sample line.
        assert_eq!(crate::pcm::sample_at(&block, 2), i16::MAX);
    }
}
