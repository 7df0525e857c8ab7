//! Host-side harness for apefx effects.
//!
//! This crate provides:
//!
//! - **Effect hosting**: [`EffectHost`] places the memory an effect's
//!   descriptor asks for, connects its input pins, calls `init` once, drives
//!   `process` per tick, forwards call messages and calls `close` on drop
//! - **Discovery**: [`EffectRegistry`] lists the built-in effects and loads
//!   them by name behind [`HostedEffect`]
//! - **WAV file I/O**: [`read_wav`] and [`write_wav`] for 16-bit PCM
//!
//! ## Quick Start
//!
//! ```rust
//! use apefx_host::{EffectHost, HostConfig};
//! use apefx_effects::WIRE_DESCRIPTOR;
//!
//! let mut host = EffectHost::new(&WIRE_DESCRIPTOR, HostConfig::default()).unwrap();
//! host.write_input(0, &[7u8; 512]).unwrap();
//! host.tick();
//!
//! let mut out = [0u8; 512];
//! assert_eq!(host.read_output(0, &mut out).unwrap(), 512);
//! assert_eq!(out, [7u8; 512]);
//! assert_eq!(host.telemetry().output[0].frames, 1);
//! ```

mod host;
mod registry;
mod wav;

pub use host::{EffectHost, HostConfig, HostedEffect, MemoryPlacement};
pub use registry::{EffectEntry, EffectRegistry};
pub use wav::{WavSpec, pcm_bytes, pcm_samples, read_wav, remap_channels, write_wav};

/// Error types for hosting effects and PCM I/O.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// WAV file read/write error.
    #[error("WAV file error: {0}")]
    Wav(#[from] hound::Error),

    /// The requested sample format is not supported.
    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    /// Pin index outside the effect's pin count.
    #[error("{direction} pin {pin} out of range (effect has {available})")]
    UnknownPin {
        /// `"input"` or `"output"`.
        direction: &'static str,
        /// Requested pin.
        pin: usize,
        /// Pins the effect declares.
        available: usize,
    },

    /// The descriptor cannot be hosted.
    #[error("Invalid descriptor for '{effect}': {reason}")]
    Descriptor {
        /// Effect name.
        effect: &'static str,
        /// What is wrong.
        reason: String,
    },

    /// Malformed call message.
    #[error("Call message error: {0}")]
    Call(#[from] apefx_core::CallError),

    /// Call message larger than the effect accepts.
    #[error("Call message of {size} bytes exceeds the limit of {max}")]
    CallTooLarge {
        /// Message size.
        size: usize,
        /// Descriptor limit.
        max: usize,
    },

    /// No effect registered under this name.
    #[error("Unknown effect: {0}")]
    UnknownEffect(String),

    /// Standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type for host operations.
pub type Result<T> = std::result::Result<T, Error>;
