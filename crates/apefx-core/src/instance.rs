//! The generic per-effect state every effect embeds.
//!
//! [`EffectInstance`] holds what all effects share: the descriptor metadata,
//! the clock, the cached telemetry copy, the shared-state handle, and the pin
//! tables. It implements the effect-agnostic lifecycle:
//!
//! ```text
//! initialize ─► [ process_start ─► effect work ─► process_end ]* ─► full_reset
//! ```
//!
//! `process_end` publishes the cached telemetry to the shared copy every
//! cycle, whether or not a duration was measured.

use alloc::sync::Arc;
use core::fmt;

use crate::plugin::{EffectInfo, Guid, InputPins, OutputPins};
use crate::ring_buffer::RingBuffer;
use crate::telemetry::{ActivityState, SharedState, Telemetry};
use crate::time::{Clock, time_diff};

/// Generic state embedded as the first field of every effect.
pub struct EffectInstance {
    info: &'static EffectInfo,
    clock: Arc<dyn Clock>,
    cached: Telemetry,
    shared: Arc<SharedState>,
    inputs: InputPins,
    outputs: OutputPins,
}

impl EffectInstance {
    /// Wires a fresh instance.
    ///
    /// The cached telemetry starts zeroed with `time_low` seeded to
    /// `u32::MAX`, and is replicated into the shared copy.
    pub fn initialize(
        info: &'static EffectInfo,
        shared: Arc<SharedState>,
        inputs: InputPins,
        outputs: OutputPins,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cached = Telemetry::seeded();
        shared.publish(&cached);
        Self {
            info,
            clock,
            cached,
            shared,
            inputs,
            outputs,
        }
    }

    /// Descriptor metadata.
    pub fn info(&self) -> &'static EffectInfo {
        self.info
    }

    /// Platform timestamps.
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Input pin `pin`, if connected.
    pub fn input(&self, pin: usize) -> Option<&RingBuffer> {
        self.inputs.get(pin)?.as_deref()
    }

    /// Output pin `pin`, if present.
    pub fn output(&self, pin: usize) -> Option<&RingBuffer> {
        self.outputs.get(pin)?.as_deref()
    }

    /// Shareable handle to output pin `pin`, for the consumer side.
    pub fn output_handle(&self, pin: usize) -> Option<Arc<RingBuffer>> {
        self.outputs.get(pin)?.clone()
    }

    /// The cached telemetry copy.
    pub fn cached(&self) -> &Telemetry {
        &self.cached
    }

    /// The cached telemetry copy, mutably.
    pub fn cached_mut(&mut self) -> &mut Telemetry {
        &mut self.cached
    }

    /// The cross-domain state handle.
    pub fn shared(&self) -> &Arc<SharedState> {
        &self.shared
    }

    /// Current activity state.
    pub fn state(&self) -> ActivityState {
        self.cached.process.state
    }

    /// Writes the activity state into both telemetry copies.
    pub fn set_state(&mut self, state: ActivityState) {
        self.cached.process.state = state;
        self.shared.update(|t| t.process.state = state);
        #[cfg(feature = "tracing")]
        tracing::debug!(effect = self.info.name, ?state, "activity state set");
    }

    /// Marks the start of a processing cycle.
    ///
    /// Records `ts_last` in both copies and returns the duration baseline.
    pub fn process_start(&mut self) -> u32 {
        let ts = self.clock.system_time_us();
        self.cached.process.ts_last = ts;
        self.shared.update(|t| t.process.ts_last = ts);
        self.clock.exec_time()
    }

    /// Marks the end of a processing cycle started at `start`.
    ///
    /// A zero baseline means no measurement: the statistics are left alone,
    /// but the cached copy is still published.
    pub fn process_end(&mut self, start: u32, period: u32) {
        if start > 0 {
            let diff = time_diff(start, self.clock.exec_time());
            self.cached.process.record(diff, period);
        }
        self.shared.publish(&self.cached);
    }

    /// Copies the per-pin counters from the cached copy to the shared copy.
    pub fn mirror_pin_counters(&self) {
        let input = self.cached.input;
        let output = self.cached.output;
        self.shared.update(|t| {
            t.input = input;
            t.output = output;
        });
    }

    /// Effect-agnostic part of a flush or reset.
    ///
    /// Returns (and logs) a summary if any cycle was measured. Every backed
    /// input pin is re-initialised, every backed output pin is re-initialised
    /// and zero-filled, and both telemetry copies are zeroed, `time_low`
    /// included.
    pub fn full_reset(&mut self) -> Option<ProcessSummary> {
        let summary = ProcessSummary::from_telemetry(self.info.id, &self.cached);
        #[cfg(feature = "tracing")]
        if let Some(summary) = &summary {
            tracing::info!(effect = self.info.name, "{summary}");
        }

        for pin in self.inputs.iter().flatten().filter(|pin| pin.is_backed()) {
            pin.reinit();
        }
        for pin in self.outputs.iter().flatten().filter(|pin| pin.is_backed()) {
            pin.reinit();
            pin.set(0, pin.capacity());
        }

        self.cached = Telemetry::zeroed();
        self.shared.publish(&self.cached);
        summary
    }
}

impl fmt::Debug for EffectInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectInstance")
            .field("effect", &self.info.name)
            .field("cached", &self.cached)
            .finish_non_exhaustive()
    }
}

/// Processing-time summary emitted by [`EffectInstance::full_reset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessSummary {
    /// Effect identity.
    pub id: Guid,
    /// Measured cycles.
    pub calls: u32,
    /// Longest cycle.
    pub high: u32,
    /// Shortest cycle.
    pub low: u32,
    /// Most recent cycle.
    pub last: u32,
    /// Sum of all cycles.
    pub total: u64,
    /// Mean cycle.
    pub average: u64,
}

impl ProcessSummary {
    fn from_telemetry(id: Guid, telemetry: &Telemetry) -> Option<Self> {
        let process = &telemetry.process;
        let average = process.average()?;
        Some(Self {
            id,
            calls: process.count,
            high: process.time_high,
            low: process.time_low,
            last: process.time_last,
            total: process.time_total,
            average,
        })
    }
}

impl fmt::Display for ProcessSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: calls {} high {} low {} last {} total {} avg {}",
            self.id, self.calls, self.high, self.low, self.last, self.total, self.average
        )
    }
}
