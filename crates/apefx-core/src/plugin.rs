//! The effect plugin contract.
//!
//! Every effect publishes one static [`EffectDescriptor`]: a capability record
//! ([`EffectInfo`]) and four entry points. A loader (on the co-processor, the
//! firmware; on a host, `apefx-host`) places the memory the descriptor asks
//! for, calls `init` exactly once, then drives `process` once per tick and
//! forwards `call` messages, and finally calls `close` exactly once.
//!
//! The instance is passed to every entry point explicitly.
//!
//! # Example
//!
//! ```rust,ignore
//! static DESCRIPTOR: EffectDescriptor<Passthrough> = EffectDescriptor {
//!     info: EffectInfo { /* ... */ },
//!     init: Passthrough::init,
//!     close: Passthrough::close,
//!     call: Passthrough::call,
//!     process: Passthrough::process,
//! };
//! ```

use alloc::sync::Arc;
use core::fmt;

use crate::call::CallMessage;
use crate::instance::EffectInstance;
use crate::memory::MemoryBlock;
use crate::ring_buffer::RingBuffer;
use crate::telemetry::{MAX_INPUT_PINS, MAX_OUTPUT_PINS, SharedState};
use crate::time::Clock;

/// Input pin handles, shared with the producer.
pub type InputPins = [Option<Arc<RingBuffer>>; MAX_INPUT_PINS];

/// Output pin handles, owned by the effect and shared with the consumer.
pub type OutputPins = [Option<Arc<RingBuffer>>; MAX_OUTPUT_PINS];

/// An input pin set with nothing connected.
pub const NO_INPUTS: InputPins = [const { None }; MAX_INPUT_PINS];

/// An output pin set with nothing connected.
pub const NO_OUTPUTS: OutputPins = [const { None }; MAX_OUTPUT_PINS];

/// 128-bit effect identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Guid {
    /// First word.
    pub data1: u32,
    /// Second word.
    pub data2: u32,
    /// Third word.
    pub data3: u32,
    /// Fourth word.
    pub data4: u32,
}

impl Guid {
    /// Creates a GUID from its four words.
    pub const fn new(data1: u32, data2: u32, data3: u32, data4: u32) -> Self {
        Self {
            data1,
            data2,
            data3,
            data4,
        }
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08x}-{:08x}-{:08x}-{:08x}",
            self.data1, self.data2, self.data3, self.data4
        )
    }
}

/// Bytes an effect needs in each memory class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryRequirements {
    /// Private instance memory.
    pub instance: usize,
    /// Cross-processor shared state.
    pub shared: usize,
    /// Cross-processor write-combined memory (output rings).
    pub fast_shared: usize,
    /// Internal RAM, if available.
    pub internal: usize,
    /// Internal RAM, mandatory.
    pub required_internal: usize,
}

/// Static capability record of an effect type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectInfo {
    /// Short name used by hosts and logs.
    pub name: &'static str,
    /// Identity.
    pub id: Guid,
    /// Implementation version.
    pub version: u32,
    /// Effect type code.
    pub kind: u32,
    /// Memory the loader must place.
    pub memory: MemoryRequirements,
    /// Largest call message accepted, header included.
    pub max_call_params_size: usize,
    /// Input pins used (at most [`MAX_INPUT_PINS`]).
    pub num_input_pins: usize,
    /// Output pins used (at most [`MAX_OUTPUT_PINS`]).
    pub num_output_pins: usize,
    /// Worst-case processing time published for the scheduler. Zero if unknown.
    pub max_process_time: u32,
    /// Nominal scheduling period. Zero if unspecified.
    pub period: u32,
}

/// Everything the loader hands an effect at `init`.
pub struct InitContext {
    /// Cross-domain state the effect publishes into.
    pub shared_state: Arc<SharedState>,
    /// Fast-shared block, if requested.
    pub fast_shared: Option<Arc<MemoryBlock>>,
    /// Internal block, if requested.
    pub internal: Option<Arc<MemoryBlock>>,
    /// Required-internal block, if requested.
    pub required_internal: Option<Arc<MemoryBlock>>,
    /// Connected input pins.
    pub inputs: InputPins,
    /// Platform timestamps.
    pub clock: Arc<dyn Clock>,
}

impl fmt::Debug for InitContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitContext")
            .field("fast_shared", &self.fast_shared)
            .field("internal", &self.internal)
            .field("required_internal", &self.required_internal)
            .field(
                "inputs",
                &self.inputs.iter().filter(|pin| pin.is_some()).count(),
            )
            .finish_non_exhaustive()
    }
}

/// `init` entry point: builds the instance from its descriptor and context.
pub type InitFn<E> = fn(&'static EffectDescriptor<E>, InitContext) -> E;

/// Capability record plus the four lifecycle entry points of effect `E`.
pub struct EffectDescriptor<E: 'static> {
    /// Capabilities and memory requirements.
    pub info: EffectInfo,
    /// Called once before any `process` or `call`.
    pub init: InitFn<E>,
    /// Called once at teardown.
    pub close: fn(&mut E),
    /// Handles one call message.
    pub call: fn(&mut E, &CallMessage<'_>),
    /// Runs one processing cycle.
    pub process: fn(&mut E),
}

impl<E> EffectDescriptor<E> {
    /// Size of the descriptor record.
    pub const fn size(&self) -> usize {
        core::mem::size_of::<Self>()
    }
}

impl<E> fmt::Debug for EffectDescriptor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectDescriptor")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// Upcast from a concrete effect to its embedded [`EffectInstance`].
pub trait Effect: 'static {
    /// The generic instance core.
    fn instance(&self) -> &EffectInstance;

    /// The generic instance core, mutably.
    fn instance_mut(&mut self) -> &mut EffectInstance;
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;

    #[test]
    fn guid_display() {
        let id = Guid::new(0xf0ae075a, 0x8db549d0, 0x90fbb2c2, 0xb671c9b5);
        assert_eq!(format!("{id}"), "f0ae075a-8db549d0-90fbb2c2-b671c9b5");
    }

    #[test]
    fn empty_pin_sets() {
        assert!(NO_INPUTS.iter().all(Option::is_none));
        assert!(NO_OUTPUTS.iter().all(Option::is_none));
    }
}
