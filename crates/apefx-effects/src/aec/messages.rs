//! Echo-canceller call messages.
//!
//! Payload layouts, after the `{ size, method }` header:
//!
//! | method | payload words |
//! |--------|---------------|
//! | `reset` | none, or the 12-word parameter block |
//! | `set_state` | state |
//! | `flush` | none |
//! | `set_params` | group id, 5-word group union |
//! | `set_mode` | mode |
//! | `set_controls` | flags, mask |
//! | `update_status` | none |
//!
//! The parameter block is flags, data format (word length, sample rate,
//! input, output and reference channels), filter (input mode, bulk delay,
//! tail length, block length) and post-proc (inactive, active thresholds).
//!
//! # Control bits
//!
//! The `flags` word of the parameter block and both words of `set_controls`
//! are bit masks, one bit per switch:
//!
//! | bit | value | switch |
//! |-----|-------|--------|
//! | 0 | `0x1` | [`ControlFlags::DENOISE_DISABLE`] |
//! | 1 | `0x2` | [`ControlFlags::RESIDUAL_SUPPRESSION_DISABLE`] |
//!
//! Other bits are carried but ignored. Firmware that passes its control enum
//! values straight through as masks (residual suppression `1`, denoise `0`)
//! must translate them: `1` here disables the denoiser, and a zero mask
//! changes nothing.

use alloc::vec::Vec;

use apefx_core::{
    ActivityState, CallError, CallMessage, CallWriter, HEADER_SIZE, PayloadReader,
    SetStateParams, method,
};

use super::params::{AecParams, ControlFlags, DataFormat, FilterConfig, InputMode, PostProcConfig};

/// Echo-canceller method codes.
pub mod aec_method {
    use apefx_core::method::EXTERNAL_START;

    /// Merge one parameter group.
    pub const SET_PARAMS: u32 = EXTERNAL_START;
    /// Select the output mode.
    pub const SET_MODE: u32 = EXTERNAL_START + 1;
    /// Masked update of the control flags.
    pub const SET_CONTROLS: u32 = EXTERNAL_START + 2;
    /// Bump the shared status counter.
    pub const UPDATE_STATUS: u32 = EXTERNAL_START + 3;
}

/// Bytes in the full parameter block.
pub const PARAMS_PAYLOAD_SIZE: usize = 12 * 4;
/// Size of a `reset` message that carries parameters.
pub const RESET_WITH_PARAMS_SIZE: usize = HEADER_SIZE + PARAMS_PAYLOAD_SIZE;
/// Largest echo-canceller call message.
pub const MAX_CALL_SIZE: usize = RESET_WITH_PARAMS_SIZE;

const GROUP_WORDS: usize = 5;
const GROUP_FILTER: u32 = 0;
const GROUP_DATA_FORMAT: u32 = 1;
const GROUP_POST_PROC: u32 = 2;

/// One parameter group of a `set_params` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamGroup {
    /// Canceller geometry. `bulk_delay` is per reference channel.
    Filter(FilterConfig),
    /// Stream format.
    DataFormat(DataFormat),
    /// Suppression thresholds.
    PostProc(PostProcConfig),
}

/// A decoded echo-canceller call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AecCall {
    /// Generic activity state change.
    SetState(ActivityState),
    /// Drop buffered data and telemetry.
    Flush,
    /// Full reset, optionally applying a parameter block.
    Reset(Option<AecParams>),
    /// Merge one parameter group.
    SetParams(ParamGroup),
    /// Select the output mode. Unknown values are ignored by the effect.
    SetMode(u32),
    /// Replace the control bits selected by `mask`.
    SetControls {
        /// New flag values.
        flags: ControlFlags,
        /// Bits to replace.
        mask: ControlFlags,
    },
    /// Bump the shared status counter.
    UpdateStatus,
    /// Any other method code.
    Unknown(u32),
}

impl AecCall {
    /// Decodes a call message.
    ///
    /// A `reset` carries parameters only when its payload is exactly the
    /// parameter block; any other payload length is a bare reset.
    pub fn decode(message: &CallMessage<'_>) -> Result<Self, CallError> {
        let mut r = message.reader();
        Ok(match message.method() {
            method::SET_STATE => AecCall::SetState(SetStateParams::decode(message)?.state),
            method::FLUSH => AecCall::Flush,
            method::RESET if message.size() == RESET_WITH_PARAMS_SIZE => {
                AecCall::Reset(Some(read_params(&mut r)?))
            }
            method::RESET => AecCall::Reset(None),
            aec_method::SET_PARAMS => AecCall::SetParams(read_group(&mut r)?),
            aec_method::SET_MODE => AecCall::SetMode(r.u32()?),
            aec_method::SET_CONTROLS => AecCall::SetControls {
                flags: ControlFlags::from_bits(r.u32()?),
                mask: ControlFlags::from_bits(r.u32()?),
            },
            aec_method::UPDATE_STATUS => AecCall::UpdateStatus,
            other => AecCall::Unknown(other),
        })
    }

    /// Encodes a complete call message.
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            AecCall::SetState(state) => SetStateParams::encode(state),
            AecCall::Flush => CallWriter::new(method::FLUSH).finish(),
            AecCall::Reset(None) => CallWriter::new(method::RESET).finish(),
            AecCall::Reset(Some(params)) => {
                write_params(CallWriter::new(method::RESET), &params).finish()
            }
            AecCall::SetParams(group) => {
                write_group(CallWriter::new(aec_method::SET_PARAMS), &group).finish()
            }
            AecCall::SetMode(mode) => CallWriter::new(aec_method::SET_MODE).u32(mode).finish(),
            AecCall::SetControls { flags, mask } => CallWriter::new(aec_method::SET_CONTROLS)
                .u32(flags.bits())
                .u32(mask.bits())
                .finish(),
            AecCall::UpdateStatus => CallWriter::new(aec_method::UPDATE_STATUS).finish(),
            AecCall::Unknown(code) => CallWriter::new(code).finish(),
        }
    }
}

fn read_input_mode(r: &mut PayloadReader<'_>) -> Result<InputMode, CallError> {
    // Out-of-range modes fall back to single-interleaved, like any other clamp.
    Ok(InputMode::from_raw(r.u32()?).unwrap_or_default())
}

fn read_data_format(r: &mut PayloadReader<'_>) -> Result<DataFormat, CallError> {
    Ok(DataFormat {
        word_length: r.u32()?,
        sample_rate: r.u32()?,
        n_input_channels: r.u32()?,
        n_output_channels: r.u32()?,
        n_reference_channels: r.u32()?,
    })
}

fn read_filter(r: &mut PayloadReader<'_>) -> Result<FilterConfig, CallError> {
    Ok(FilterConfig {
        input_mode: read_input_mode(r)?,
        bulk_delay: r.u32()?,
        tail_length: r.u32()?,
        block_length: r.u32()?,
    })
}

fn read_post_proc(r: &mut PayloadReader<'_>) -> Result<PostProcConfig, CallError> {
    Ok(PostProcConfig {
        residual_suppression_threshold_inactive: r.i32()?,
        residual_suppression_threshold_active: r.i32()?,
    })
}

fn read_params(r: &mut PayloadReader<'_>) -> Result<AecParams, CallError> {
    Ok(AecParams {
        flags: ControlFlags::from_bits(r.u32()?),
        data_format: read_data_format(r)?,
        filter: read_filter(r)?,
        post_proc: read_post_proc(r)?,
    })
}

fn read_group(r: &mut PayloadReader<'_>) -> Result<ParamGroup, CallError> {
    let id = r.u32()?;
    match id {
        GROUP_FILTER => read_filter(r).map(ParamGroup::Filter),
        GROUP_DATA_FORMAT => read_data_format(r).map(ParamGroup::DataFormat),
        GROUP_POST_PROC => read_post_proc(r).map(ParamGroup::PostProc),
        value => Err(CallError::InvalidValue {
            field: "parameter group",
            value,
        }),
    }
}

fn write_data_format(w: CallWriter, f: &DataFormat) -> CallWriter {
    w.u32(f.word_length)
        .u32(f.sample_rate)
        .u32(f.n_input_channels)
        .u32(f.n_output_channels)
        .u32(f.n_reference_channels)
}

fn write_filter(w: CallWriter, f: &FilterConfig) -> CallWriter {
    w.u32(f.input_mode as u32)
        .u32(f.bulk_delay)
        .u32(f.tail_length)
        .u32(f.block_length)
}

fn write_post_proc(w: CallWriter, p: &PostProcConfig) -> CallWriter {
    w.i32(p.residual_suppression_threshold_inactive)
        .i32(p.residual_suppression_threshold_active)
}

fn write_params(w: CallWriter, p: &AecParams) -> CallWriter {
    let w = write_data_format(w.u32(p.flags.bits()), &p.data_format);
    write_post_proc(write_filter(w, &p.filter), &p.post_proc)
}

fn write_group(w: CallWriter, group: &ParamGroup) -> CallWriter {
    // Every group occupies the full union; shorter groups are zero-padded.
    let (w, used) = match group {
        ParamGroup::Filter(f) => (write_filter(w.u32(GROUP_FILTER), f), 4),
        ParamGroup::DataFormat(f) => (write_data_format(w.u32(GROUP_DATA_FORMAT), f), 5),
        ParamGroup::PostProc(p) => (write_post_proc(w.u32(GROUP_POST_PROC), p), 2),
    };
    (used..GROUP_WORDS).fold(w, |w, _| w.u32(0))
}
