//! Wire: block-wise passthrough.
//!
//! Copies 512-byte blocks (128 stereo 16-bit frames) from input pin 0 to
//! output pin 0. The smallest complete effect on the plugin contract.

use alloc::sync::Arc;
use core::fmt;

use apefx_core::{
    CallMessage, Effect, EffectDescriptor, EffectInfo, EffectInstance, Guid, HEADER_SIZE,
    InitContext, MemFlags, MemoryRegion, MemoryRequirements, NO_OUTPUTS, RingBuffer,
    SetStateParams, SharedState, method,
};

use crate::block::BlockPump;

/// Frames per block.
pub const BLOCK_FRAMES: usize = 128;
/// Bytes per block: 128 frames of 2 channels of 2 bytes.
pub const BLOCK_SIZE: usize = BLOCK_FRAMES * 2 * 2;
/// Output ring size: sixteen blocks.
pub const OUTPUT_BUFFER_SIZE: usize = BLOCK_SIZE * 16;

/// Wire identity.
pub const WIRE_GUID: Guid = Guid::new(0x75f11827, 0x15464b20, 0xad2409ca, 0x9a2b625c);

/// Descriptor of the wire effect.
pub static WIRE_DESCRIPTOR: EffectDescriptor<Wire> = EffectDescriptor {
    info: EffectInfo {
        name: "wire",
        id: WIRE_GUID,
        version: 1,
        kind: 0,
        memory: MemoryRequirements {
            instance: core::mem::size_of::<Wire>(),
            shared: core::mem::size_of::<SharedState>(),
            fast_shared: OUTPUT_BUFFER_SIZE,
            internal: 0,
            required_internal: 0,
        },
        max_call_params_size: HEADER_SIZE + 4,
        num_input_pins: 1,
        num_output_pins: 1,
        max_process_time: 0,
        period: 0,
    },
    init: Wire::init,
    close: Wire::close,
    call: Wire::call,
    process: Wire::process,
};

/// Builds the output ring over the fast-shared block, or an unbacked one.
pub(crate) fn output_ring(ctx: &InitContext, size: usize) -> RingBuffer {
    match &ctx.fast_shared {
        Some(block) => RingBuffer::over_block(Arc::clone(block), size, MemFlags::ALL_ACCESS),
        None => RingBuffer::new(MemoryRegion::unbacked(size, MemFlags::ALL_ACCESS)),
    }
}

/// Passthrough instance.
pub struct Wire {
    core: EffectInstance,
    pump: BlockPump<BLOCK_SIZE>,
}

impl Wire {
    /// `init` entry point.
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
        let mut wire = Self {
            core,
            pump: BlockPump::new(),
        };
        wire.reset();
        wire
    }

    /// `close` entry point.
    pub fn close(&mut self) {}

    /// `call` entry point: `set_state`, `reset` and `flush`.
    pub fn call(&mut self, message: &CallMessage<'_>) {
        match message.method() {
            method::SET_STATE => match SetStateParams::decode(message) {
                Ok(params) => self.core.set_state(params.state),
                Err(_err) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(effect = "wire", error = %_err, "malformed set_state ignored");
                }
            },
            method::RESET | method::FLUSH => self.reset(),
            _other => {
                #[cfg(feature = "tracing")]
                tracing::debug!(effect = "wire", method = _other, "unknown call ignored");
            }
        }
    }

    /// `process` entry point.
    pub fn process(&mut self) {
        let start = self.core.process_start();
        self.pump.run(&mut self.core, |_| {});
        self.core.mirror_pin_counters();
        self.core.process_end(start, 0);
    }

    /// Drops the partial block, then resets pins and telemetry.
    pub fn reset(&mut self) {
        self.pump.clear();
        self.core.full_reset();
    }

    /// Bytes accumulated toward the next block.
    pub fn pending_bytes(&self) -> usize {
        self.pump.filled()
    }
}

impl Effect for Wire {
    fn instance(&self) -> &EffectInstance {
        &self.core
    }

    fn instance_mut(&mut self) -> &mut EffectInstance {
        &mut self.core
    }
}

impl fmt::Debug for Wire {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wire")
            .field("core", &self.core)
            .field("pending", &self.pump.filled())
            .finish()
    }
}
