//! Run configuration validation.
//!
//! The effects clamp every parameter silently; validation reports the values
//! a configuration file asks for that would be clamped, so a user sees them
//! before a run instead of hearing them.
//!
//! ```rust
//! use apefx_config::{RunConfig, ValidationError};
//!
//! let mut config = RunConfig::default();
//! assert!(config.validate().is_ok());
//!
//! config.aec.filter.block_length = 4096;
//! assert!(matches!(config.validate(), Err(ValidationError::OutOfRange { .. })));
//! ```

use apefx_effects::aec::params::{
    MAX_BULK_DELAY, MAX_INPUT_CHANNELS, MAX_OUTPUT_CHANNELS, MAX_REFERENCE_CHANNELS,
    MAX_SAMPLES_PER_BLOCK, MAX_TAIL_LENGTH, MIN_SAMPLE_RATE,
};
use apefx_effects::reverb::{MAX_DELAY_SAMPLES, MAX_GAIN_Q15};
use apefx_host::EffectRegistry;
use thiserror::Error;

use crate::RunConfig;

/// Validation error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Unknown effect name.
    #[error("unknown effect type: {0}")]
    UnknownEffect(String),

    /// Value out of range.
    #[error("'{field}' value {value} out of range [{min}, {max}]")]
    OutOfRange {
        /// Dotted TOML path of the field.
        field: String,
        /// The value that was out of range.
        value: i64,
        /// Minimum allowed value.
        min: i64,
        /// Maximum allowed value.
        max: i64,
    },

    /// Fields that are inconsistent with each other.
    #[error("invalid '{field}': {reason}")]
    Inconsistent {
        /// Dotted TOML path of the field.
        field: String,
        /// What is wrong.
        reason: String,
    },

    /// Multiple validation errors.
    #[error("multiple validation errors: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

#[derive(Default)]
struct Collector(Vec<ValidationError>);

impl Collector {
    fn range(&mut self, field: &str, value: i64, min: i64, max: i64) {
        if !(min..=max).contains(&value) {
            self.0.push(ValidationError::OutOfRange {
                field: field.to_owned(),
                value,
                min,
                max,
            });
        }
    }

    fn finish(mut self) -> ValidationResult<()> {
        match self.0.len() {
            0 => Ok(()),
            1 => Err(self.0.remove(0)),
            _ => Err(ValidationError::Multiple(self.0)),
        }
    }
}

/// Validates a whole run configuration. Every problem is reported.
pub fn validate_run_config(config: &RunConfig) -> ValidationResult<()> {
    let mut errors = Collector::default();

    if EffectRegistry::new().get(&config.effect.name).is_none() {
        errors
            .0
            .push(ValidationError::UnknownEffect(config.effect.name.clone()));
    }

    let host = &config.host;
    errors.range("host.input_capacity", host.input_capacity as i64, 1, 1 << 24);
    errors.range("host.ticks_per_chunk", host.ticks_per_chunk as i64, 1, 1024);
    if host.chunk_bytes == 0 || host.chunk_bytes > host.input_capacity {
        errors.0.push(ValidationError::Inconsistent {
            field: "host.chunk_bytes".to_owned(),
            reason: format!(
                "{} must be between 1 and host.input_capacity ({})",
                host.chunk_bytes, host.input_capacity
            ),
        });
    }

    let aec = &config.aec;
    let fmt = &aec.data_format;
    errors.range(
        "aec.data_format.sample_rate",
        i64::from(fmt.sample_rate),
        i64::from(MIN_SAMPLE_RATE),
        i64::from(u32::MAX),
    );
    errors.range(
        "aec.data_format.n_input_channels",
        i64::from(fmt.n_input_channels),
        1,
        i64::from(MAX_INPUT_CHANNELS),
    );
    errors.range(
        "aec.data_format.n_output_channels",
        i64::from(fmt.n_output_channels),
        1,
        i64::from(MAX_OUTPUT_CHANNELS),
    );
    errors.range(
        "aec.data_format.n_reference_channels",
        i64::from(fmt.n_reference_channels),
        1,
        i64::from(MAX_REFERENCE_CHANNELS),
    );
    let filter = &aec.filter;
    errors.range(
        "aec.filter.block_length",
        i64::from(filter.block_length),
        1,
        i64::from(MAX_SAMPLES_PER_BLOCK),
    );
    errors.range(
        "aec.filter.tail_length",
        i64::from(filter.tail_length),
        0,
        i64::from(MAX_TAIL_LENGTH),
    );
    errors.range(
        "aec.filter.bulk_delay",
        i64::from(filter.bulk_delay),
        0,
        i64::from(MAX_BULK_DELAY),
    );
    let pp = &aec.post_proc;
    errors.range(
        "aec.post_proc.inactive_db",
        i64::from(pp.inactive_db),
        -120,
        0,
    );
    errors.range("aec.post_proc.active_db", i64::from(pp.active_db), -120, 0);

    let reverb = &config.reverb;
    errors.range(
        "reverb.delay_samples",
        i64::from(reverb.delay_samples),
        0,
        i64::from(MAX_DELAY_SAMPLES),
    );
    errors.range(
        "reverb.gain_q15",
        i64::from(reverb.gain_q15),
        0,
        i64::from(MAX_GAIN_Q15),
    );
    errors.range(
        "reverb.forward_gain_q15",
        i64::from(reverb.forward_gain_q15),
        0,
        i64::from(MAX_GAIN_Q15),
    );

    errors.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_run_config(&RunConfig::default()), Ok(()));
    }

    #[test]
    fn unknown_effect() {
        let mut config = RunConfig::default();
        config.effect.name = "chorus".into();
        assert_eq!(
            validate_run_config(&config),
            Err(ValidationError::UnknownEffect("chorus".into()))
        );
    }

    #[test]
    fn collects_every_problem() {
        let mut config = RunConfig::default();
        config.aec.filter.block_length = 0;
        config.reverb.gain_q15 = -1;
        config.host.chunk_bytes = config.host.input_capacity + 1;
        let Err(ValidationError::Multiple(errors)) = validate_run_config(&config) else {
            panic!("expected multiple errors");
        };
        assert_eq!(errors.len(), 3);
        let msg = ValidationError::Multiple(errors).to_string();
        assert!(msg.contains("aec.filter.block_length"), "got: {msg}");
        assert!(msg.contains("reverb.gain_q15"), "got: {msg}");
        assert!(msg.contains("host.chunk_bytes"), "got: {msg}");
    }

    #[test]
    fn out_of_range_display() {
        let err = ValidationError::OutOfRange {
            field: "reverb.delay_samples".into(),
            value: 50_000,
            min: 0,
            max: 48_000,
        };
        assert_eq!(
            err.to_string(),
            "'reverb.delay_samples' value 50000 out of range [0, 48000]"
        );
    }
}
