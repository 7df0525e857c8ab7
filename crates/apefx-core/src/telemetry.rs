//! Processing telemetry and its cross-domain mirror.
//!
//! Every effect instance keeps two copies of [`Telemetry`]. The cached copy
//! lives in the instance and is the only one mutated while processing. Once
//! per cycle it is copied wholesale into the [`SharedState`], which the far
//! side (the host) only ever reads.

use core::cell::Cell;
use core::sync::atomic::{AtomicU32, Ordering};

use critical_section::Mutex;

/// Maximum number of input pins an effect may declare.
pub const MAX_INPUT_PINS: usize = 4;

/// Maximum number of output pins an effect may declare.
pub const MAX_OUTPUT_PINS: usize = 4;

/// Generic activity state, set through the `set_state` call.
///
/// Independent of any effect-specific mode. An inactive effect still moves
/// data but skips its processing stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum ActivityState {
    /// Stages are skipped.
    #[default]
    Inactive = 0,
    /// Stages run.
    Active = 1,
}

impl ActivityState {
    /// Decodes a raw wire value. Anything other than `1` is inactive.
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            1 => ActivityState::Active,
            _ => ActivityState::Inactive,
        }
    }

    /// Returns the raw wire value.
    pub const fn as_raw(self) -> u32 {
        self as u32
    }

    /// Returns `true` for [`ActivityState::Active`].
    pub const fn is_active(self) -> bool {
        matches!(self, ActivityState::Active)
    }
}

/// Processing-time statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessTelemetry {
    /// Activity state.
    pub state: ActivityState,
    /// System time of the most recent process start (µs).
    pub ts_last: u64,
    /// Duration of the most recent measured cycle.
    pub time_last: u32,
    /// Shortest measured cycle. `u32::MAX` until the first measurement.
    pub time_low: u32,
    /// Longest measured cycle.
    pub time_high: u32,
    /// Sum of all measured cycles.
    pub time_total: u64,
    /// Number of measured cycles.
    pub count: u32,
    /// Nominal period reported with the last measurement.
    pub period: u32,
}

impl ProcessTelemetry {
    /// All zero except `time_low`, which starts at `u32::MAX` so the first
    /// measurement always sets a new low.
    pub const fn seeded() -> Self {
        Self {
            state: ActivityState::Inactive,
            ts_last: 0,
            time_last: 0,
            time_low: u32::MAX,
            time_high: 0,
            time_total: 0,
            count: 0,
            period: 0,
        }
    }

    /// Folds one measured cycle into the statistics.
    ///
    /// Extrema move on strict comparison only; ties keep the prior value.
    /// The cycle count wraps like the duration counter.
    pub fn record(&mut self, diff: u32, period: u32) {
        self.time_last = diff;
        self.time_total += u64::from(diff);
        if diff < self.time_low {
            self.time_low = diff;
        }
        if diff > self.time_high {
            self.time_high = diff;
        }
        self.count = self.count.wrapping_add(1);
        self.period = period;
    }

    /// Mean cycle duration, if any cycle was measured.
    pub fn average(&self) -> Option<u64> {
        (self.count > 0).then(|| self.time_total / u64::from(self.count))
    }
}

/// Traffic through one pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PinCounters {
    /// Bytes moved.
    pub bytes: u64,
    /// Blocks moved.
    pub frames: u32,
}

impl PinCounters {
    /// Counts one block of `bytes` bytes.
    pub fn record_block(&mut self, bytes: usize) {
        self.bytes += bytes as u64;
        self.frames += 1;
    }
}

/// The mirrored telemetry record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Telemetry {
    /// Processing statistics.
    pub process: ProcessTelemetry,
    /// Per input pin counters.
    pub input: [PinCounters; MAX_INPUT_PINS],
    /// Per output pin counters.
    pub output: [PinCounters; MAX_OUTPUT_PINS],
}

impl Telemetry {
    /// Every field zero.
    pub const fn zeroed() -> Self {
        Self {
            process: ProcessTelemetry {
                time_low: 0,
                ..ProcessTelemetry::seeded()
            },
            input: [PinCounters { bytes: 0, frames: 0 }; MAX_INPUT_PINS],
            output: [PinCounters { bytes: 0, frames: 0 }; MAX_OUTPUT_PINS],
        }
    }

    /// Zeroed, with `process.time_low` seeded to `u32::MAX`.
    pub const fn seeded() -> Self {
        Self {
            process: ProcessTelemetry::seeded(),
            ..Self::zeroed()
        }
    }
}

/// Cross-domain state published by an effect.
///
/// The effect is the single writer. Readers on the far side take
/// [`snapshot`](Self::snapshot)s.
pub struct SharedState {
    telemetry: Mutex<Cell<Telemetry>>,
    status_updates: AtomicU32,
}

impl SharedState {
    /// Creates zeroed shared state.
    pub const fn new() -> Self {
        Self {
            telemetry: Mutex::new(Cell::new(Telemetry::zeroed())),
            status_updates: AtomicU32::new(0),
        }
    }

    /// Replaces the shared telemetry with `telemetry`.
    pub fn publish(&self, telemetry: &Telemetry) {
        critical_section::with(|cs| self.telemetry.borrow(cs).set(*telemetry));
    }

    /// Returns a copy of the shared telemetry.
    pub fn snapshot(&self) -> Telemetry {
        critical_section::with(|cs| self.telemetry.borrow(cs).get())
    }

    /// Edits the shared telemetry in place.
    pub fn update(&self, f: impl FnOnce(&mut Telemetry)) {
        critical_section::with(|cs| {
            let cell = self.telemetry.borrow(cs);
            let mut telemetry = cell.get();
            f(&mut telemetry);
            cell.set(telemetry);
        });
    }

    /// Number of status updates the effect has announced.
    pub fn status_updates(&self) -> u32 {
        self.status_updates.load(Ordering::Acquire)
    }

    /// Announces a status update. Returns the new count.
    pub fn bump_status(&self) -> u32 {
        self.status_updates.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Clears the status counter.
    pub fn reset_status(&self) {
        self.status_updates.store(0, Ordering::Release);
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for SharedState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SharedState")
            .field("telemetry", &self.snapshot())
            .field("status_updates", &self.status_updates())
            .finish()
    }
}
