//! apefx Effects - streaming effects on the apefx plugin contract
//!
//! Each effect publishes a static [`EffectDescriptor`](apefx_core::EffectDescriptor)
//! and moves 16-bit PCM between ring buffers:
//!
//! - [`EchoCanceller`] - Two-input acoustic echo canceller with bulk reference
//!   delay, mode dispatch (`bypass`/`active`/`char`/`cmp`) and pluggable
//!   cancellation and post-filter stages
//! - [`Wire`] - Block-wise passthrough, the minimal effect
//! - [`Reverb`] - Q15 feedback comb on interleaved stereo
//!
//! ## Example
//!
//! ```rust,ignore
//! use apefx_effects::{AEC_DESCRIPTOR, aec::{AecCall, AecMode}};
//! use apefx_host::{EffectHost, HostConfig};
//!
//! let mut host = EffectHost::new(&AEC_DESCRIPTOR, HostConfig::default())?;
//! host.call(&AecCall::SetMode(AecMode::Cmp as u32).encode())?;
//! host.write_input(0, &interleaved_pcm)?;
//! host.tick();
//! let processed = host.read_output(0, 4096)?;
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod aec;
mod block;
pub mod pcm;
pub mod reverb;
pub mod wire;

// Re-export main types at crate root
pub use aec::{AEC_DESCRIPTOR, EchoCanceller};
pub use reverb::{REVERB_DESCRIPTOR, Reverb};
pub use wire::{WIRE_DESCRIPTOR, Wire};
