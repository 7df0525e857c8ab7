//! Effect hosting: the loader side of the plugin contract.

use std::fmt;
use std::sync::Arc;

use apefx_core::{
    CallMessage, Clock, Effect, EffectDescriptor, EffectInfo, InitContext, MAX_INPUT_PINS,
    MAX_OUTPUT_PINS, MemoryBlock, MemoryClass, MemoryRequirements, NO_INPUTS, RingBuffer,
    SharedState, SystemClock, Telemetry,
};

use crate::{Error, Result};

/// Host-side settings for one loaded effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostConfig {
    /// Capacity of each input pin ring in bytes.
    pub input_capacity: usize,
    /// Bytes written per input pin before ticking when streaming.
    pub chunk_bytes: usize,
    /// `process` calls per written chunk when streaming.
    pub ticks_per_chunk: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            input_capacity: 16 * 1024,
            chunk_bytes: 512,
            ticks_per_chunk: 1,
        }
    }
}

/// Memory blocks placed for one effect, one per requested class.
#[derive(Debug, Clone, Default)]
pub struct MemoryPlacement {
    /// Fast-shared block.
    pub fast_shared: Option<Arc<MemoryBlock>>,
    /// Internal block.
    pub internal: Option<Arc<MemoryBlock>>,
    /// Required-internal block.
    pub required_internal: Option<Arc<MemoryBlock>>,
}

impl MemoryPlacement {
    /// Allocates a zeroed block for every class with a non-zero requirement.
    ///
    /// Instance and shared memory are owned by the host-side objects
    /// themselves and need no block.
    pub fn for_requirements(memory: &MemoryRequirements) -> Self {
        let place = |class, len: usize| (len > 0).then(|| MemoryBlock::shared(class, len));
        Self {
            fast_shared: place(MemoryClass::FastShared, memory.fast_shared),
            internal: place(MemoryClass::Internal, memory.internal),
            required_internal: place(MemoryClass::RequiredInternal, memory.required_internal),
        }
    }

    /// Total bytes placed.
    pub fn total_bytes(&self) -> usize {
        [&self.fast_shared, &self.internal, &self.required_internal]
            .into_iter()
            .flatten()
            .map(|block| block.len())
            .sum()
    }
}

/// One loaded effect and the host-side ends of its pins.
///
/// `init` runs in [`EffectHost::new`]; `close` runs exactly once, either in
/// [`EffectHost::close`] or on drop.
pub struct EffectHost<E: Effect> {
    descriptor: &'static EffectDescriptor<E>,
    effect: Box<E>,
    config: HostConfig,
    inputs: Vec<Arc<RingBuffer>>,
    shared: Arc<SharedState>,
    placement: MemoryPlacement,
    ticks: u64,
    open: bool,
}

impl<E: Effect> EffectHost<E> {
    /// Loads an effect on the system clock.
    pub fn new(descriptor: &'static EffectDescriptor<E>, config: HostConfig) -> Result<Self> {
        Self::with_clock(descriptor, config, Arc::new(SystemClock))
    }

    /// Loads an effect on the given clock.
    pub fn with_clock(
        descriptor: &'static EffectDescriptor<E>,
        config: HostConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let info = &descriptor.info;
        if info.num_input_pins > MAX_INPUT_PINS {
            return Err(Error::Descriptor {
                effect: info.name,
                reason: format!(
                    "{} input pins, at most {MAX_INPUT_PINS} supported",
                    info.num_input_pins
                ),
            });
        }
        if info.num_output_pins > MAX_OUTPUT_PINS {
            return Err(Error::Descriptor {
                effect: info.name,
                reason: format!(
                    "{} output pins, at most {MAX_OUTPUT_PINS} supported",
                    info.num_output_pins
                ),
            });
        }

        let inputs: Vec<_> = (0..info.num_input_pins)
            .map(|_| {
                Arc::new(RingBuffer::with_capacity(
                    MemoryClass::Shared,
                    config.input_capacity,
                ))
            })
            .collect();
        let mut pins = NO_INPUTS;
        for (slot, pin) in pins.iter_mut().zip(&inputs) {
            *slot = Some(Arc::clone(pin));
        }

        let shared = Arc::new(SharedState::new());
        let placement = MemoryPlacement::for_requirements(&info.memory);
        let ctx = InitContext {
            shared_state: Arc::clone(&shared),
            fast_shared: placement.fast_shared.clone(),
            internal: placement.internal.clone(),
            required_internal: placement.required_internal.clone(),
            inputs: pins,
            clock,
        };
        let effect = Box::new((descriptor.init)(descriptor, ctx));

        tracing::info!(
            effect = info.name,
            version = info.version,
            inputs = info.num_input_pins,
            outputs = info.num_output_pins,
            placed_bytes = placement.total_bytes(),
            "effect loaded"
        );

        Ok(Self {
            descriptor,
            effect,
            config,
            inputs,
            shared,
            placement,
            ticks: 0,
            open: true,
        })
    }

    /// Descriptor the effect was loaded from.
    pub fn descriptor(&self) -> &'static EffectDescriptor<E> {
        self.descriptor
    }

    /// Capability record.
    pub fn info(&self) -> &'static EffectInfo {
        &self.descriptor.info
    }

    /// Host settings.
    pub fn config(&self) -> HostConfig {
        self.config
    }

    /// The loaded effect.
    pub fn effect(&self) -> &E {
        &self.effect
    }

    /// The loaded effect, mutably.
    pub fn effect_mut(&mut self) -> &mut E {
        &mut self.effect
    }

    /// Memory placed for the effect.
    pub fn placement(&self) -> &MemoryPlacement {
        &self.placement
    }

    /// Writes as much of `bytes` as fits into input pin `pin`. Returns the bytes written.
    pub fn write_input(&mut self, pin: usize, bytes: &[u8]) -> Result<usize> {
        let ring = self.input_pin(pin)?;
        let n = bytes.len().min(ring.bytes_free());
        ring.copy_in(&bytes[..n]);
        ring.add_bytes(n);
        Ok(n)
    }

    /// Free space on input pin `pin`.
    pub fn input_free(&self, pin: usize) -> Result<usize> {
        Ok(self.input_pin(pin)?.bytes_free())
    }

    /// Reads up to `buf.len()` bytes from output pin `pin`. Returns the bytes read.
    pub fn read_output(&mut self, pin: usize, buf: &mut [u8]) -> Result<usize> {
        let ring = self.output_pin(pin)?;
        let n = buf.len().min(ring.valid_bytes());
        ring.copy_out(&mut buf[..n]);
        ring.consume_bytes(n);
        Ok(n)
    }

    /// Bytes waiting on output pin `pin`.
    pub fn output_pending(&self, pin: usize) -> Result<usize> {
        Ok(self.output_pin(pin)?.valid_bytes())
    }

    /// Runs one processing cycle.
    pub fn tick(&mut self) {
        (self.descriptor.process)(&mut *self.effect);
        self.ticks += 1;
    }

    /// Forwards one encoded call message.
    ///
    /// The message must parse and fit the descriptor's size limit; what the
    /// effect does with it is up to the effect.
    pub fn call(&mut self, bytes: &[u8]) -> Result<()> {
        let max = self.descriptor.info.max_call_params_size;
        if bytes.len() > max {
            return Err(Error::CallTooLarge {
                size: bytes.len(),
                max,
            });
        }
        let message = CallMessage::parse(bytes)?;
        tracing::debug!(
            effect = self.descriptor.info.name,
            method = message.method(),
            size = message.size(),
            "call"
        );
        (self.descriptor.call)(&mut *self.effect, &message);
        Ok(())
    }

    /// Snapshot of the published telemetry.
    pub fn telemetry(&self) -> Telemetry {
        self.shared.snapshot()
    }

    /// Shared status counter.
    pub fn status_updates(&self) -> u32 {
        self.shared.status_updates()
    }

    /// Processing cycles run so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Calls `close` and releases the effect.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.open {
            (self.descriptor.close)(&mut *self.effect);
            self.open = false;
            tracing::debug!(
                effect = self.descriptor.info.name,
                ticks = self.ticks,
                "effect closed"
            );
        }
    }

    fn input_pin(&self, pin: usize) -> Result<&RingBuffer> {
        self.inputs
            .get(pin)
            .map(|ring| &**ring)
            .ok_or(Error::UnknownPin {
                direction: "input",
                pin,
                available: self.inputs.len(),
            })
    }

    fn output_pin(&self, pin: usize) -> Result<&RingBuffer> {
        let available = self.descriptor.info.num_output_pins;
        let ring = if pin < available {
            self.effect.instance().output(pin)
        } else {
            None
        };
        ring.ok_or(Error::UnknownPin {
            direction: "output",
            pin,
            available,
        })
    }
}

impl<E: Effect> Drop for EffectHost<E> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<E: Effect> fmt::Debug for EffectHost<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectHost")
            .field("effect", &self.descriptor.info.name)
            .field("config", &self.config)
            .field("ticks", &self.ticks)
            .field("open", &self.open)
            .finish_non_exhaustive()
    }
}

/// Type-erased view of an [`EffectHost`], for hosts that pick the effect at runtime.
pub trait HostedEffect {
    /// Capability record.
    fn info(&self) -> &'static EffectInfo;

    /// Host settings.
    fn config(&self) -> HostConfig;

    /// See [`EffectHost::write_input`].
    fn write_input(&mut self, pin: usize, bytes: &[u8]) -> Result<usize>;

    /// See [`EffectHost::read_output`].
    fn read_output(&mut self, pin: usize, buf: &mut [u8]) -> Result<usize>;

    /// See [`EffectHost::tick`].
    fn tick(&mut self);

    /// See [`EffectHost::call`].
    fn call(&mut self, bytes: &[u8]) -> Result<()>;

    /// See [`EffectHost::telemetry`].
    fn telemetry(&self) -> Telemetry;

    /// See [`EffectHost::status_updates`].
    fn status_updates(&self) -> u32;

    /// See [`EffectHost::ticks`].
    fn ticks(&self) -> u64;

    /// Streams one byte stream per input pin through the effect.
    ///
    /// Each round writes up to `chunk_bytes` to every pin, runs
    /// `ticks_per_chunk` cycles and drains output pin 0. Once the input is
    /// exhausted the effect is ticked until it stops producing. `progress`
    /// receives the bytes accepted on pin 0 each round. Streaming stops early
    /// if the effect stops accepting input.
    fn stream(&mut self, inputs: &[&[u8]], progress: &mut dyn FnMut(usize)) -> Result<Vec<u8>> {
        let config = self.config();
        let chunk = config.chunk_bytes.max(1);
        let ticks = config.ticks_per_chunk.max(1);
        let total = inputs.iter().map(|data| data.len()).max().unwrap_or(0);

        let mut offsets = vec![0usize; inputs.len()];
        let mut output = Vec::with_capacity(total);
        let mut idle_rounds = 0;
        while offsets.iter().zip(inputs).any(|(at, data)| *at < data.len()) {
            let mut accepted = 0;
            for (pin, (at, data)) in offsets.iter_mut().zip(inputs).enumerate() {
                let end = (*at + chunk).min(data.len());
                let written = self.write_input(pin, &data[*at..end])?;
                *at += written;
                accepted += written;
                if pin == 0 {
                    progress(written);
                }
            }
            for _ in 0..ticks {
                self.tick();
            }
            let drained = drain_into(self, &mut output)?;

            idle_rounds = if accepted == 0 && drained == 0 {
                idle_rounds + 1
            } else {
                0
            };
            if idle_rounds > 1 {
                tracing::warn!(
                    effect = self.info().name,
                    remaining = total - offsets.first().copied().unwrap_or(0),
                    "effect stopped accepting input"
                );
                break;
            }
        }

        loop {
            self.tick();
            if drain_into(self, &mut output)? == 0 {
                break;
            }
        }
        Ok(output)
    }
}

fn drain_into<H: HostedEffect + ?Sized>(host: &mut H, output: &mut Vec<u8>) -> Result<usize> {
    let mut buf = [0u8; 4096];
    let mut drained = 0;
    loop {
        let n = host.read_output(0, &mut buf)?;
        if n == 0 {
            return Ok(drained);
        }
        output.extend_from_slice(&buf[..n]);
        drained += n;
    }
}

impl<E: Effect> HostedEffect for EffectHost<E> {
    fn info(&self) -> &'static EffectInfo {
        EffectHost::info(self)
    }

    fn config(&self) -> HostConfig {
        EffectHost::config(self)
    }

    fn write_input(&mut self, pin: usize, bytes: &[u8]) -> Result<usize> {
        EffectHost::write_input(self, pin, bytes)
    }

    fn read_output(&mut self, pin: usize, buf: &mut [u8]) -> Result<usize> {
        EffectHost::read_output(self, pin, buf)
    }

    fn tick(&mut self) {
        EffectHost::tick(self);
    }

    fn call(&mut self, bytes: &[u8]) -> Result<()> {
        EffectHost::call(self, bytes)
    }

    fn telemetry(&self) -> Telemetry {
        EffectHost::telemetry(self)
    }

    fn status_updates(&self) -> u32 {
        EffectHost::status_updates(self)
    }

    fn ticks(&self) -> u64 {
        EffectHost::ticks(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apefx_core::{CallWriter, ManualClock, SetStateParams, method};
    use apefx_effects::{AEC_DESCRIPTOR, REVERB_DESCRIPTOR, WIRE_DESCRIPTOR};
    use apefx_effects::aec::{AecCall, AecMode};

    #[test]
    fn places_requested_memory() {
        let host = EffectHost::new(&AEC_DESCRIPTOR, HostConfig::default()).unwrap();
        let fast = host.placement().fast_shared.as_ref().unwrap();
        assert_eq!(fast.class(), MemoryClass::FastShared);
        assert_eq!(fast.len(), AEC_DESCRIPTOR.info.memory.fast_shared);
        assert!(host.placement().internal.is_none());
        assert_eq!(host.placement().total_bytes(), fast.len());
    }

    #[test]
    fn rejects_unknown_pins() {
        let mut host = EffectHost::new(&WIRE_DESCRIPTOR, HostConfig::default()).unwrap();
        assert!(matches!(
            host.write_input(1, &[0; 4]),
            Err(Error::UnknownPin { direction: "input", pin: 1, available: 1 })
        ));
        let mut buf = [0u8; 4];
        assert!(matches!(
            host.read_output(3, &mut buf),
            Err(Error::UnknownPin { direction: "output", .. })
        ));
    }

    #[test]
    fn write_input_stops_at_capacity() {
        let config = HostConfig {
            input_capacity: 100,
            ..HostConfig::default()
        };
        let mut host = EffectHost::new(&WIRE_DESCRIPTOR, config).unwrap();
        assert_eq!(host.write_input(0, &[1; 150]).unwrap(), 100);
        assert_eq!(host.input_free(0).unwrap(), 0);
    }

    #[test]
    fn oversized_call_is_rejected() {
        let mut host = EffectHost::new(&WIRE_DESCRIPTOR, HostConfig::default()).unwrap();
        let message = CallWriter::new(method::SET_STATE).u32(1).u32(2).finish();
        assert!(matches!(
            host.call(&message),
            Err(Error::CallTooLarge { size: 16, max: 12 })
        ));
    }

    #[test]
    fn truncated_call_is_rejected() {
        let mut host = EffectHost::new(&WIRE_DESCRIPTOR, HostConfig::default()).unwrap();
        assert!(matches!(host.call(&[1, 2, 3]), Err(Error::Call(_))));
    }

    #[test]
    fn calls_reach_the_effect() {
        let mut host = EffectHost::new(&AEC_DESCRIPTOR, HostConfig::default()).unwrap();
        host.call(&AecCall::SetMode(AecMode::Cmp as u32).encode())
            .unwrap();
        host.call(&SetStateParams::encode(apefx_core::ActivityState::Active))
            .unwrap();
        host.call(&AecCall::UpdateStatus.encode()).unwrap();
        assert_eq!(host.effect().mode(), AecMode::Cmp);
        assert!(host.telemetry().process.state.is_active());
        assert_eq!(host.status_updates(), 1);
    }

    #[test]
    fn manual_clock_drives_timing() {
        let clock = Arc::new(ManualClock::new());
        clock.set_exec_time(10);
        let mut host =
            EffectHost::with_clock(&REVERB_DESCRIPTOR, HostConfig::default(), clock).unwrap();
        host.write_input(0, &[0; 512]).unwrap();
        host.tick();
        let telemetry = host.telemetry();
        assert_eq!(telemetry.process.count, 1);
        assert_eq!(telemetry.process.time_last, 0);
        assert_eq!(host.ticks(), 1);
    }

    #[test]
    fn stream_through_trait_object() {
        let mut host: Box<dyn HostedEffect> =
            Box::new(EffectHost::new(&WIRE_DESCRIPTOR, HostConfig::default()).unwrap());
        let data: Vec<u8> = (0..2048u32).map(|i| (i % 256) as u8).collect();
        let mut accepted = 0;
        let out = host.stream(&[&data], &mut |n| accepted += n).unwrap();
        assert_eq!(out, data);
        assert_eq!(accepted, data.len());
    }
}
