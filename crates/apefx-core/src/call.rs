//! Tagged call messages.
//!
//! A call message is a run of little-endian 32-bit words: a two-word header
//! `{ size, method }` followed by the method's payload. `size` counts the
//! whole message including the header, so an effect can tell a bare `reset`
//! from a `reset` that carries parameters.
//!
//! ```text
//!  0        4        8
//! +--------+--------+----------------------
//! |  size  | method | payload words ...
//! +--------+--------+----------------------
//! ```
//!
//! Methods below [`method::EXTERNAL_START`] are reserved for the generic
//! core; payload layout above it is defined by each effect.

use alloc::vec::Vec;

use crate::telemetry::ActivityState;

/// Reserved method codes.
pub mod method {
    /// Effect-local reset; may carry the effect's full parameter block.
    pub const RESET: u32 = 0;
    /// Set the generic activity state.
    pub const SET_STATE: u32 = 1;
    /// Drop buffered data and telemetry.
    pub const FLUSH: u32 = 2;
    /// First effect-defined method code.
    pub const EXTERNAL_START: u32 = 0x1_0000;
}

/// Size of the `{ size, method }` header in bytes.
pub const HEADER_SIZE: usize = 8;

/// Decoding failures for call messages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    /// Fewer bytes than a header.
    #[error("call message of {0} bytes is shorter than its header")]
    TooShort(usize),

    /// The size field disagrees with the supplied buffer.
    #[error("call message declares {declared} bytes but {available} were supplied")]
    SizeMismatch {
        /// Value of the size field.
        declared: i32,
        /// Bytes actually supplied.
        available: usize,
    },

    /// The payload ended before a required word.
    #[error("payload of method {method:#x} truncated: needed {needed} bytes, had {available}")]
    Truncated {
        /// Method being decoded.
        method: u32,
        /// Bytes required.
        needed: usize,
        /// Bytes present.
        available: usize,
    },

    /// A word held a value outside its enumeration.
    #[error("invalid {field} value {value}")]
    InvalidValue {
        /// Field being decoded.
        field: &'static str,
        /// Raw value.
        value: u32,
    },
}

/// A borrowed, header-validated call message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallMessage<'a> {
    method: u32,
    payload: &'a [u8],
}

impl<'a> CallMessage<'a> {
    /// Builds a message from a method code and its payload bytes.
    pub const fn new(method: u32, payload: &'a [u8]) -> Self {
        Self { method, payload }
    }

    /// Parses an encoded message.
    ///
    /// Trailing bytes past the declared size are ignored.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, CallError> {
        if bytes.len() < HEADER_SIZE {
            return Err(CallError::TooShort(bytes.len()));
        }
        let declared = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let method = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let size = usize::try_from(declared)
            .ok()
            .filter(|&size| (HEADER_SIZE..=bytes.len()).contains(&size))
            .ok_or(CallError::SizeMismatch {
                declared,
                available: bytes.len(),
            })?;
        Ok(Self {
            method,
            payload: &bytes[HEADER_SIZE..size],
        })
    }

    /// Method code.
    pub fn method(&self) -> u32 {
        self.method
    }

    /// Payload bytes after the header.
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// Total encoded size, header included.
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Returns a word reader over the payload.
    pub fn reader(&self) -> PayloadReader<'a> {
        PayloadReader {
            method: self.method,
            bytes: self.payload,
            pos: 0,
        }
    }
}

/// Sequential little-endian word reader over a payload.
#[derive(Debug, Clone)]
pub struct PayloadReader<'a> {
    method: u32,
    bytes: &'a [u8],
    pos: usize,
}

impl PayloadReader<'_> {
    /// Reads the next unsigned word.
    pub fn u32(&mut self) -> Result<u32, CallError> {
        let end = self.pos + 4;
        let word = self
            .bytes
            .get(self.pos..end)
            .ok_or(CallError::Truncated {
                method: self.method,
                needed: end,
                available: self.bytes.len(),
            })?;
        self.pos = end;
        Ok(u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
    }

    /// Reads the next signed word.
    pub fn i32(&mut self) -> Result<i32, CallError> {
        self.u32().map(|w| w as i32)
    }

    /// Bytes not yet read.
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }
}

/// Builds an encoded call message.
///
/// ```rust
/// use apefx_core::{CallMessage, CallWriter, method};
///
/// let bytes = CallWriter::new(method::SET_STATE).u32(1).finish();
/// let msg = CallMessage::parse(&bytes).unwrap();
/// assert_eq!(msg.method(), method::SET_STATE);
/// assert_eq!(msg.size(), 12);
/// ```
#[derive(Debug, Clone)]
pub struct CallWriter {
    buf: Vec<u8>,
}

impl CallWriter {
    /// Starts a message for `method`.
    pub fn new(method: u32) -> Self {
        let mut buf = Vec::with_capacity(HEADER_SIZE + 16);
        buf.extend_from_slice(&0i32.to_le_bytes());
        buf.extend_from_slice(&method.to_le_bytes());
        Self { buf }
    }

    /// Appends an unsigned word.
    pub fn u32(mut self, word: u32) -> Self {
        self.buf.extend_from_slice(&word.to_le_bytes());
        self
    }

    /// Appends a signed word.
    pub fn i32(mut self, word: i32) -> Self {
        self.buf.extend_from_slice(&word.to_le_bytes());
        self
    }

    /// Patches the size field and returns the encoded message.
    pub fn finish(mut self) -> Vec<u8> {
        let size = self.buf.len() as i32;
        self.buf[..4].copy_from_slice(&size.to_le_bytes());
        self.buf
    }
}

/// Payload of [`method::SET_STATE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetStateParams {
    /// Requested activity state.
    pub state: ActivityState,
}

impl SetStateParams {
    /// Decodes the payload of a `set_state` message.
    pub fn decode(message: &CallMessage<'_>) -> Result<Self, CallError> {
        let state = ActivityState::from_raw(message.reader().u32()?);
        Ok(Self { state })
    }

    /// Encodes a complete `set_state` message.
    pub fn encode(state: ActivityState) -> Vec<u8> {
        CallWriter::new(method::SET_STATE)
            .u32(state.as_raw())
            .finish()
    }
}
