//! Timestamps for processing telemetry.
//!
//! The platform timer and cycle counter sit behind [`Clock`]. On the
//! co-processor the firmware implements it over its hardware counters; on a
//! host [`SystemClock`] derives both values from a monotonic [`std::time::Instant`].
//! [`ManualClock`] is a settable clock for hosts that drive simulated time and
//! for deterministic tests.

use core::cell::Cell;

use critical_section::Mutex;

/// Platform timestamp service.
pub trait Clock: Send + Sync {
    /// Monotonic time in microseconds.
    fn system_time_us(&self) -> u64;

    /// Duration counter used as the baseline for processing-time telemetry.
    ///
    /// Wraps at 32 bits; compare values with [`time_diff`].
    fn exec_time(&self) -> u32;
}

/// Rollover-safe difference between two [`Clock::exec_time`] readings.
///
/// Total over all inputs: the result is `end - start` modulo 2^32.
///
/// ```rust
/// use apefx_core::time_diff;
///
/// assert_eq!(time_diff(100, 150), 50);
/// assert_eq!(time_diff(0xFFFF_FFF0, 0x10), 0x20);
/// ```
#[inline]
pub const fn time_diff(start: u32, end: u32) -> u32 {
    end.wrapping_sub(start)
}

#[cfg(feature = "std")]
fn epoch() -> std::time::Instant {
    static EPOCH: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    *EPOCH.get_or_init(std::time::Instant::now)
}

/// Microseconds elapsed since the first timestamp taken in this process.
#[cfg(feature = "std")]
pub fn monotonic_system_time() -> u64 {
    epoch().elapsed().as_micros() as u64
}

/// Host duration counter: the system clock truncated to 32 bits.
#[cfg(feature = "std")]
pub fn monotonic_exec_time() -> u32 {
    monotonic_system_time() as u32
}

/// [`Clock`] backed by the process-wide monotonic clock.
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[cfg(feature = "std")]
impl Clock for SystemClock {
    fn system_time_us(&self) -> u64 {
        monotonic_system_time()
    }

    fn exec_time(&self) -> u32 {
        monotonic_exec_time()
    }
}

/// Settable [`Clock`].
///
/// Both counters only move when told to.
///
/// ```rust
/// use apefx_core::{Clock, ManualClock};
///
/// let clock = ManualClock::new();
/// clock.set_exec_time(10);
/// clock.advance(250);
/// assert_eq!(clock.exec_time(), 260);
/// assert_eq!(clock.system_time_us(), 250);
/// ```
pub struct ManualClock {
    system_us: Mutex<Cell<u64>>,
    exec: Mutex<Cell<u32>>,
}

impl ManualClock {
    /// Creates a clock with both counters at zero.
    pub const fn new() -> Self {
        Self {
            system_us: Mutex::new(Cell::new(0)),
            exec: Mutex::new(Cell::new(0)),
        }
    }

    /// Sets the system time.
    pub fn set_system_time_us(&self, us: u64) {
        critical_section::with(|cs| self.system_us.borrow(cs).set(us));
    }

    /// Sets the duration counter.
    pub fn set_exec_time(&self, ticks: u32) {
        critical_section::with(|cs| self.exec.borrow(cs).set(ticks));
    }

    /// Advances both counters by `us`. The duration counter wraps.
    pub fn advance(&self, us: u32) {
        critical_section::with(|cs| {
            let system = self.system_us.borrow(cs);
            system.set(system.get() + u64::from(us));
            let exec = self.exec.borrow(cs);
            exec.set(exec.get().wrapping_add(us));
        });
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ManualClock")
            .field("system_us", &self.system_time_us())
            .field("exec", &self.exec_time())
            .finish()
    }
}

impl Clock for ManualClock {
    fn system_time_us(&self) -> u64 {
        critical_section::with(|cs| self.system_us.borrow(cs).get())
    }

    fn exec_time(&self) -> u32 {
        critical_section::with(|cs| self.exec.borrow(cs).get())
    }
}
