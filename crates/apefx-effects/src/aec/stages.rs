//! Cancellation and post-filter stages.
//!
//! The echo canceller only moves blocks; the signal work happens in two
//! stages behind traits, so a platform kernel can replace the reference
//! implementations here without touching the block plumbing.
//!
//! - [`NlmsCanceller`] - normalized LMS adaptive FIR over the reference,
//!   subtracted from the echo stream
//! - [`ResidualSuppressor`] - level-tracking attenuator for the residual, with
//!   an optional low-level gate standing in for a denoiser
//!
//! Both are fixed-capacity and never allocate.

use super::params::{DEFAULT_ACTIVE_SUPPRESS_DB, DEFAULT_INACTIVE_SUPPRESS_DB, MAX_TAIL_LENGTH};
use crate::pcm::saturate;

/// Adaptive echo cancellation stage.
pub trait CancellationStage {
    /// Reconfigures for a new geometry and clears adaptation state.
    fn configure(&mut self, block_len: usize, tail_len: usize, sample_rate: u32);

    /// Writes `echo` minus the estimated echo of `reference` into `out`.
    ///
    /// All three slices have the block length.
    fn cancel(&mut self, echo: &[i16], reference: &[i16], out: &mut [i16]);
}

/// Residual echo suppression and noise reduction stage.
pub trait PostFilterStage {
    /// Reconfigures for a new geometry and clears tracking state.
    fn configure(&mut self, block_len: usize, sample_rate: u32);

    /// Processes one residual block in place.
    fn run(&mut self, buf: &mut [i16]);

    /// Enables or disables the denoiser.
    fn set_denoise(&mut self, enabled: bool);

    /// Sets residual suppression limits in dB. `0` for both disables suppression.
    fn set_echo_suppress(&mut self, inactive_db: i32, active_db: i32);
}

const NLMS_STEP_SIZE: f32 = 0.5;
const NLMS_REGULARIZATION: f32 = 1e-6;
const TAP_CAPACITY: usize = MAX_TAIL_LENGTH as usize;
const SCALE: f32 = 32768.0;

/// Normalized LMS echo canceller.
///
/// ```text
/// y[n]   = Σ w[k] * x[n-k]
/// e[n]   = d[n] - y[n]
/// w[k]  += μ / (x^T x + δ) * e[n] * x[n-k]
/// ```
///
/// `x` is the delayed reference, `d` the echo stream, `e` the output. The
/// input power `x^T x` is tracked incrementally.
#[derive(Debug, Clone)]
pub struct NlmsCanceller {
    weights: [f32; TAP_CAPACITY],
    history: [f32; TAP_CAPACITY],
    pos: usize,
    taps: usize,
    power: f32,
    step_size: f32,
}

impl Default for NlmsCanceller {
    fn default() -> Self {
        Self {
            weights: [0.0; TAP_CAPACITY],
            history: [0.0; TAP_CAPACITY],
            pos: 0,
            taps: TAP_CAPACITY / 2,
            power: 0.0,
            step_size: NLMS_STEP_SIZE,
        }
    }
}

impl NlmsCanceller {
    /// Active filter length.
    pub fn taps(&self) -> usize {
        self.taps
    }

    /// Current weights, newest tap first.
    pub fn weights(&self) -> &[f32] {
        &self.weights[..self.taps]
    }

    fn step(&mut self, reference: f32, desired: f32) -> f32 {
        let n = self.taps;
        let old = self.history[self.pos];
        self.history[self.pos] = reference;
        self.power = (self.power + reference * reference - old * old).max(0.0);

        let mut estimate = 0.0f32;
        for k in 0..n {
            estimate += self.weights[k] * self.history[(self.pos + n - k) % n];
        }
        let error = desired - estimate;

        let mu = self.step_size / (self.power + NLMS_REGULARIZATION);
        let mu_e = mu * error;
        for k in 0..n {
            self.weights[k] += mu_e * self.history[(self.pos + n - k) % n];
        }

        self.pos = (self.pos + 1) % n;
        error
    }
}

impl CancellationStage for NlmsCanceller {
    fn configure(&mut self, _block_len: usize, tail_len: usize, _sample_rate: u32) {
        self.taps = tail_len.clamp(1, TAP_CAPACITY);
        self.weights.fill(0.0);
        self.history.fill(0.0);
        self.pos = 0;
        self.power = 0.0;
    }

    fn cancel(&mut self, echo: &[i16], reference: &[i16], out: &mut [i16]) {
        for ((o, &d), &x) in out.iter_mut().zip(echo).zip(reference) {
            let e = self.step(f32::from(x) / SCALE, f32::from(d) / SCALE);
            *o = saturate(libm::roundf(e * SCALE) as i32);
        }
    }
}

/// Decay of the tracked peak block energy, per block.
const PEAK_DECAY: f32 = 0.995;
/// Energy ratio above which near-end voice is assumed active.
const ACTIVE_RATIO: f32 = 0.25;
/// Mean-square level (full scale = 1.0) below which the gate engages, about -60 dBFS.
const GATE_FLOOR: f32 = 1e-6;
/// Gate attenuation.
const GATE_GAIN: f32 = 0.5;

/// Level-tracking residual suppressor.
///
/// Tracks a slowly decaying peak of block energy. Each block is attenuated
/// by its energy ratio to that peak (in dB), floored at the active limit
/// when the ratio suggests near-end voice and at the inactive limit
/// otherwise.
#[derive(Debug, Clone)]
pub struct ResidualSuppressor {
    peak_energy: f32,
    inactive_db: i32,
    active_db: i32,
    denoise: bool,
    last_gain: f32,
}

impl Default for ResidualSuppressor {
    fn default() -> Self {
        Self {
            peak_energy: 0.0,
            inactive_db: DEFAULT_INACTIVE_SUPPRESS_DB,
            active_db: DEFAULT_ACTIVE_SUPPRESS_DB,
            denoise: true,
            last_gain: 1.0,
        }
    }
}

impl ResidualSuppressor {
    /// Gain applied to the most recent block.
    pub fn last_gain(&self) -> f32 {
        self.last_gain
    }

    /// Whether the denoiser is enabled.
    pub fn denoise(&self) -> bool {
        self.denoise
    }

    /// Current `(inactive, active)` limits in dB.
    pub fn echo_suppress(&self) -> (i32, i32) {
        (self.inactive_db, self.active_db)
    }

    fn suppression_gain(&self, energy: f32) -> f32 {
        if self.peak_energy <= f32::EPSILON || (self.inactive_db == 0 && self.active_db == 0) {
            return 1.0;
        }
        let ratio = energy / self.peak_energy;
        let limit = if ratio > ACTIVE_RATIO {
            self.active_db
        } else {
            self.inactive_db
        };
        let ratio_db = 10.0 * libm::log10f(ratio.max(1e-12));
        let gain_db = ratio_db.clamp(limit.min(0) as f32, 0.0);
        libm::powf(10.0, gain_db / 20.0)
    }
}

impl PostFilterStage for ResidualSuppressor {
    fn configure(&mut self, _block_len: usize, _sample_rate: u32) {
        self.peak_energy = 0.0;
        self.last_gain = 1.0;
    }

    fn run(&mut self, buf: &mut [i16]) {
        if buf.is_empty() {
            return;
        }
        let energy = buf
            .iter()
            .map(|&s| {
                let x = f32::from(s) / SCALE;
                x * x
            })
            .sum::<f32>()
            / buf.len() as f32;
        self.peak_energy = (self.peak_energy * PEAK_DECAY).max(energy);

        let mut gain = self.suppression_gain(energy);
        if self.denoise && energy < GATE_FLOOR {
            gain *= GATE_GAIN;
        }
        self.last_gain = gain;

        if gain < 1.0 {
            for s in buf.iter_mut() {
                *s = saturate(libm::roundf(f32::from(*s) * gain) as i32);
            }
        }
    }

    fn set_denoise(&mut self, enabled: bool) {
        self.denoise = enabled;
    }

    fn set_echo_suppress(&mut self, inactive_db: i32, active_db: i32) {
        self.inactive_db = inactive_db;
        self.active_db = active_db;
    }
}
