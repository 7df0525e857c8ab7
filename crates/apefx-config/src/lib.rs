//! Run configuration for apefx effects.
//!
//! A run configuration is a TOML file naming the effect to load, how the
//! host harness drives it, and the effect's parameters. It converts into the
//! host settings and into the call messages sent right after `init`.
//!
//! # Example
//!
//! ```rust
//! use apefx_config::RunConfig;
//!
//! let config = RunConfig::from_toml(
//!     r#"
//!     [effect]
//!     name = "reverb"
//!
//!     [reverb]
//!     delay_samples = 2400
//!     "#,
//! )
//! .unwrap();
//! config.validate().unwrap();
//!
//! assert_eq!(config.reverb.delay_samples, 2400);
//! assert_eq!(config.call_messages().len(), 2);
//! ```

mod error;
mod run_config;

/// Run configuration validation.
pub mod validation;

pub use error::ConfigError;
pub use run_config::{
    AecSection, DataFormatSection, EffectSection, FilterSection, HostSection, InputModeSetting,
    ModeSetting, PostProcSection, ReverbSection, RunConfig, StateSetting,
};
pub use validation::{ValidationError, ValidationResult, validate_run_config};
