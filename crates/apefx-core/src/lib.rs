//! apefx Core - shared-memory plumbing and the effect plugin contract
//!
//! This crate provides the pieces every apefx effect is built from. It runs on
//! the audio co-processor (`no_std` + `alloc`) and on the host that feeds it,
//! with no allocation on the processing path.
//!
//! # Core Abstractions
//!
//! ## Memory & Buffers
//!
//! - [`MemoryBlock`] - Fixed-size backing memory tagged with its [`MemoryClass`]
//! - [`MemoryRegion`] - Geometry and access flags over an optional block
//! - [`RingBuffer`] - Single-producer/single-consumer byte ring with
//!   overrun/underrun accounting
//!
//! ## Timing
//!
//! - [`Clock`] - Platform timestamp service ([`SystemClock`], [`ManualClock`])
//! - [`time_diff`] - Rollover-safe 32-bit timestamp difference
//!
//! ## Telemetry
//!
//! - [`Telemetry`] - Per-instance processing statistics and pin counters
//! - [`SharedState`] - The copy published to the other domain once per cycle
//!
//! ## Plugin Contract
//!
//! - [`EffectDescriptor`] - Static capability record + the four entry points
//! - [`EffectInstance`] - Generic per-effect state embedded in every effect
//! - [`Effect`] - Upcast from a concrete effect to its [`EffectInstance`]
//! - [`CallMessage`] - Tagged call messages (`set_state`, `reset`, `flush`, ...)
//!
//! # Cross-domain Ordering
//!
//! A ring buffer is touched by exactly two contexts: one producer, one
//! consumer. Cursor and count updates run inside [`critical_section::with`],
//! which masks interrupts on the co-processor and takes a global lock on a
//! std host. `valid_bytes` is published with release ordering and read with
//! acquire ordering.
//!
//! # no_std Support
//!
//! Disable the default `std` feature and link a `critical-section`
//! implementation from the firmware:
//!
//! ```toml
//! [dependencies]
//! apefx-core = { version = "0.1", default-features = false }
//! ```
//!
//! # Example
//!
//! ```rust
//! use apefx_core::{MemoryClass, RingBuffer};
//!
//! let ring = RingBuffer::with_capacity(MemoryClass::FastShared, 8);
//! ring.copy_in(&[1, 2, 3, 4, 5, 6]);
//! assert_eq!(ring.add_bytes(6), 0);
//!
//! let mut out = [0u8; 4];
//! ring.copy_out(&mut out);
//! assert_eq!(ring.consume_bytes(4), 0);
//! assert_eq!(out, [1, 2, 3, 4]);
//! assert_eq!(ring.valid_bytes(), 2);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod call;
pub mod instance;
pub mod memory;
pub mod plugin;
pub mod ring_buffer;
pub mod telemetry;
pub mod time;

// Re-export main types at crate root
pub use call::{
    CallError, CallMessage, CallWriter, HEADER_SIZE, PayloadReader, SetStateParams, method,
};
pub use instance::{EffectInstance, ProcessSummary};
pub use memory::{MemFlags, MemoryBlock, MemoryClass, MemoryRegion};
pub use plugin::{
    Effect, EffectDescriptor, EffectInfo, Guid, InitContext, InitFn, InputPins,
    MemoryRequirements, NO_INPUTS, NO_OUTPUTS, OutputPins,
};
pub use ring_buffer::RingBuffer;
pub use telemetry::{
    ActivityState, MAX_INPUT_PINS, MAX_OUTPUT_PINS, PinCounters, ProcessTelemetry, SharedState,
    Telemetry,
};
#[cfg(feature = "std")]
pub use time::{SystemClock, monotonic_exec_time, monotonic_system_time};
pub use time::{Clock, ManualClock, time_diff};
