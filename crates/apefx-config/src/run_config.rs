//! Run configuration file format and operations.

use std::path::Path;

use apefx_core::{ActivityState, SetStateParams};
use apefx_effects::aec::params::{
    DEFAULT_ACTIVE_SUPPRESS_DB, DEFAULT_BLOCK_LENGTH, DEFAULT_BULK_DELAY,
    DEFAULT_INACTIVE_SUPPRESS_DB, DEFAULT_SAMPLE_RATE, DEFAULT_TAIL_LENGTH, DEFAULT_WORD_LENGTH,
};
use apefx_effects::aec::{
    AecCall, AecMode, AecParams, ControlFlags, DataFormat, FilterConfig, InputMode,
    PostProcConfig,
};
use apefx_effects::reverb::{ReverbCall, ReverbParams};
use apefx_host::HostConfig;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::validation::{ValidationResult, validate_run_config};

/// Everything a run needs: which effect, how the host drives it, and the
/// effect's parameters.
///
/// Every section and field is optional; missing values take the runtime
/// defaults. Only the section of the selected effect is sent to it.
///
/// # TOML Format
///
/// ```toml
/// [effect]
/// name = "aec"
/// state = "active"
///
/// [host]
/// input_capacity = 16384
/// chunk_bytes = 512
/// ticks_per_chunk = 1
///
/// [aec]
/// mode = "active"
/// denoise = true
/// residual_suppression = true
///
/// [aec.data_format]
/// sample_rate = 16000
///
/// [aec.filter]
/// input_mode = "single-interleaved"
/// bulk_delay = 24
/// tail_length = 512
/// block_length = 128
///
/// [aec.post_proc]
/// inactive_db = -40
/// active_db = -15
///
/// [reverb]
/// delay_samples = 4500
/// gain_q15 = 24576
/// forward_gain_q15 = 16384
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunConfig {
    /// Effect selection.
    pub effect: EffectSection,
    /// Host harness settings.
    pub host: HostSection,
    /// Echo canceller parameters.
    pub aec: AecSection,
    /// Reverb parameters.
    pub reverb: ReverbSection,
}

/// Activity state requested after `init`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StateSetting {
    /// Inactive.
    Inactive,
    /// Active.
    #[default]
    Active,
}

impl From<StateSetting> for ActivityState {
    fn from(state: StateSetting) -> Self {
        match state {
            StateSetting::Inactive => ActivityState::Inactive,
            StateSetting::Active => ActivityState::Active,
        }
    }
}

/// `[effect]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EffectSection {
    /// Registry id of the effect.
    pub name: String,
    /// Activity state.
    pub state: StateSetting,
}

impl Default for EffectSection {
    fn default() -> Self {
        Self {
            name: "aec".to_owned(),
            state: StateSetting::Active,
        }
    }
}

/// `[host]` section.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HostSection {
    /// Capacity of each input pin ring in bytes.
    pub input_capacity: usize,
    /// Bytes written per input pin per round.
    pub chunk_bytes: usize,
    /// `process` calls per round.
    pub ticks_per_chunk: usize,
}

impl Default for HostSection {
    fn default() -> Self {
        let host = HostConfig::default();
        Self {
            input_capacity: host.input_capacity,
            chunk_bytes: host.chunk_bytes,
            ticks_per_chunk: host.ticks_per_chunk,
        }
    }
}

impl From<HostSection> for HostConfig {
    fn from(section: HostSection) -> Self {
        Self {
            input_capacity: section.input_capacity,
            chunk_bytes: section.chunk_bytes,
            ticks_per_chunk: section.ticks_per_chunk,
        }
    }
}

/// Echo canceller output mode.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModeSetting {
    /// Raw echo.
    Bypass,
    /// Processed output.
    #[default]
    Active,
    /// Raw input loop-back.
    Char,
    /// Processed output interleaved with raw echo.
    Cmp,
}

impl From<ModeSetting> for AecMode {
    fn from(mode: ModeSetting) -> Self {
        match mode {
            ModeSetting::Bypass => AecMode::Bypass,
            ModeSetting::Active => AecMode::Active,
            ModeSetting::Char => AecMode::Char,
            ModeSetting::Cmp => AecMode::Cmp,
        }
    }
}

/// How echo and reference reach the canceller.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum InputModeSetting {
    /// Echo and reference interleaved on pin 0.
    #[default]
    SingleInterleaved,
    /// Echo on pin 0, reference on pin 1.
    MultiPin,
}

impl From<InputModeSetting> for InputMode {
    fn from(mode: InputModeSetting) -> Self {
        match mode {
            InputModeSetting::SingleInterleaved => InputMode::SingleInterleaved,
            InputModeSetting::MultiPin => InputMode::MultiPin,
        }
    }
}

/// `[aec]` section.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AecSection {
    /// Output mode.
    pub mode: ModeSetting,
    /// Noise gate in the post-filter.
    pub denoise: bool,
    /// Residual echo suppression in the post-filter.
    pub residual_suppression: bool,
    /// `[aec.data_format]`.
    pub data_format: DataFormatSection,
    /// `[aec.filter]`.
    pub filter: FilterSection,
    /// `[aec.post_proc]`.
    pub post_proc: PostProcSection,
}

impl Default for AecSection {
    fn default() -> Self {
        Self {
            mode: ModeSetting::Active,
            denoise: true,
            residual_suppression: true,
            data_format: DataFormatSection::default(),
            filter: FilterSection::default(),
            post_proc: PostProcSection::default(),
        }
    }
}

/// `[aec.data_format]` section. The word length is always two bytes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DataFormatSection {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Echo channels.
    pub n_input_channels: u32,
    /// Output channels.
    pub n_output_channels: u32,
    /// Reference channels.
    pub n_reference_channels: u32,
}

impl Default for DataFormatSection {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            n_input_channels: 1,
            n_output_channels: 1,
            n_reference_channels: 1,
        }
    }
}

/// `[aec.filter]` section.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FilterSection {
    /// Pin layout.
    pub input_mode: InputModeSetting,
    /// Bulk reference delay per reference channel, in samples.
    pub bulk_delay: u32,
    /// Echo tail in samples. Zero selects the maximum.
    pub tail_length: u32,
    /// Samples per channel per block.
    pub block_length: u32,
}

impl Default for FilterSection {
    fn default() -> Self {
        Self {
            input_mode: InputModeSetting::SingleInterleaved,
            bulk_delay: DEFAULT_BULK_DELAY,
            tail_length: DEFAULT_TAIL_LENGTH,
            block_length: DEFAULT_BLOCK_LENGTH,
        }
    }
}

/// `[aec.post_proc]` section.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PostProcSection {
    /// Suppression while near-end voice is inactive (dB).
    pub inactive_db: i32,
    /// Suppression while near-end voice is active (dB).
    pub active_db: i32,
}

impl Default for PostProcSection {
    fn default() -> Self {
        Self {
            inactive_db: DEFAULT_INACTIVE_SUPPRESS_DB,
            active_db: DEFAULT_ACTIVE_SUPPRESS_DB,
        }
    }
}

impl AecSection {
    /// The parameter block carried by the `reset` message.
    pub fn params(&self) -> AecParams {
        let mut flags = ControlFlags::NONE;
        if !self.denoise {
            flags = flags.union(ControlFlags::DENOISE_DISABLE);
        }
        if !self.residual_suppression {
            flags = flags.union(ControlFlags::RESIDUAL_SUPPRESSION_DISABLE);
        }
        let fmt = self.data_format;
        let filter = self.filter;
        AecParams {
            flags,
            data_format: DataFormat {
                word_length: DEFAULT_WORD_LENGTH,
                sample_rate: fmt.sample_rate,
                n_input_channels: fmt.n_input_channels,
                n_output_channels: fmt.n_output_channels,
                n_reference_channels: fmt.n_reference_channels,
            },
            filter: FilterConfig {
                input_mode: filter.input_mode.into(),
                bulk_delay: filter.bulk_delay,
                tail_length: filter.tail_length,
                block_length: filter.block_length,
            },
            post_proc: PostProcConfig {
                residual_suppression_threshold_inactive: self.post_proc.inactive_db,
                residual_suppression_threshold_active: self.post_proc.active_db,
            },
        }
    }
}

/// `[reverb]` section.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReverbSection {
    /// Delay in frames.
    pub delay_samples: u32,
    /// Feedback gain, Q15.
    pub gain_q15: i32,
    /// Dry gain, Q15.
    pub forward_gain_q15: i32,
}

impl Default for ReverbSection {
    fn default() -> Self {
        let params = ReverbParams::default();
        Self {
            delay_samples: params.delay_samples,
            gain_q15: params.gain_q15,
            forward_gain_q15: params.forward_gain_q15,
        }
    }
}

impl ReverbSection {
    /// The parameters carried by the `init` message.
    pub fn params(&self) -> ReverbParams {
        ReverbParams {
            delay_samples: self.delay_samples,
            gain_q15: self.gain_q15,
            forward_gain_q15: self.forward_gain_q15,
        }
    }
}

impl RunConfig {
    /// Configuration for `effect` with every other value at its default.
    pub fn for_effect(effect: impl Into<String>) -> Self {
        Self {
            effect: EffectSection {
                name: effect.into(),
                ..EffectSection::default()
            },
            ..Self::default()
        }
    }

    /// Load a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        toml::from_str(&content).map_err(|e| ConfigError::parse(Some(path), e))
    }

    /// Load a configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| ConfigError::parse(None, e))
    }

    /// Convert the configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save the configuration to a TOML file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }
        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        Ok(())
    }

    /// Checks every value against the ranges the effects accept.
    pub fn validate(&self) -> ValidationResult<()> {
        validate_run_config(self)
    }

    /// Host harness settings.
    pub fn host_config(&self) -> HostConfig {
        self.host.into()
    }

    /// Encoded call messages that configure the selected effect after `init`.
    ///
    /// Parameters go first (a `reset` with the parameter block for the echo
    /// canceller, `init` for the reverb), then the output mode, then the
    /// activity state. A reset clears the state, so the state is last.
    pub fn call_messages(&self) -> Vec<Vec<u8>> {
        let mut messages = match self.effect.name.as_str() {
            "aec" => vec![
                AecCall::Reset(Some(self.aec.params())).encode(),
                AecCall::SetMode(AecMode::from(self.aec.mode) as u32).encode(),
            ],
            "reverb" => vec![ReverbCall::Init(self.reverb.params()).encode()],
            _ => Vec::new(),
        };
        messages.push(SetStateParams::encode(self.effect.state.into()));
        messages
    }

    /// Interleaved channels per input pin of the selected effect.
    ///
    /// The single-pin echo canceller takes (echo, reference) frames; in
    /// multi-pin mode each pin carries one channel.
    pub fn input_channels(&self) -> u16 {
        match self.effect.name.as_str() {
            "aec" => match self.aec.filter.input_mode {
                InputModeSetting::SingleInterleaved => 2,
                InputModeSetting::MultiPin => 1,
            },
            _ => 2,
        }
    }

    /// Interleaved channels on output pin 0 of the selected effect.
    pub fn output_channels(&self) -> u16 {
        match self.effect.name.as_str() {
            "aec" => match self.aec.mode {
                ModeSetting::Bypass | ModeSetting::Active => 1,
                ModeSetting::Char | ModeSetting::Cmp => 2,
            },
            _ => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apefx_core::CallMessage;

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(RunConfig::from_toml("").unwrap(), RunConfig::default());
    }

    #[test]
    fn default_aec_params_match_runtime_defaults() {
        assert_eq!(AecSection::default().params(), AecParams::default());
        assert_eq!(ReverbSection::default().params(), ReverbParams::default());
    }

    #[test]
    fn parses_partial_sections() {
        let config = RunConfig::from_toml(
            r#"
            [effect]
            name = "aec"
            state = "inactive"

            [aec]
            mode = "cmp"
            denoise = false

            [aec.filter]
            input_mode = "multi-pin"
            block_length = 64
            "#,
        )
        .unwrap();
        assert_eq!(config.effect.state, StateSetting::Inactive);
        assert_eq!(config.aec.mode, ModeSetting::Cmp);
        assert_eq!(config.aec.filter.input_mode, InputModeSetting::MultiPin);
        assert_eq!(config.aec.filter.block_length, 64);
        assert_eq!(config.aec.filter.tail_length, DEFAULT_TAIL_LENGTH);

        let params = config.aec.params();
        assert!(params.flags.contains(ControlFlags::DENOISE_DISABLE));
        assert!(!params.flags.contains(ControlFlags::RESIDUAL_SUPPRESSION_DISABLE));
        assert_eq!(params.filter.input_mode, InputMode::MultiPin);
        assert_eq!(config.input_channels(), 1);
        assert_eq!(config.output_channels(), 2);
    }

    #[test]
    fn rejects_unknown_mode() {
        let err = RunConfig::from_toml("[aec]\nmode = \"loud\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { path: None, .. }));
    }

    #[test]
    fn aec_messages_decode() {
        let mut config = RunConfig::default();
        config.aec.mode = ModeSetting::Bypass;
        let messages = config.call_messages();
        assert_eq!(messages.len(), 3);

        let decoded: Vec<_> = messages
            .iter()
            .map(|m| AecCall::decode(&CallMessage::parse(m).unwrap()).unwrap())
            .collect();
        assert_eq!(decoded[0], AecCall::Reset(Some(AecParams::default())));
        assert_eq!(decoded[1], AecCall::SetMode(AecMode::Bypass as u32));
        assert_eq!(decoded[2], AecCall::SetState(ActivityState::Active));
    }

    #[test]
    fn reverb_and_wire_messages() {
        let reverb = RunConfig::for_effect("reverb");
        let messages = reverb.call_messages();
        assert_eq!(messages.len(), 2);
        let init = ReverbCall::decode(&CallMessage::parse(&messages[0]).unwrap()).unwrap();
        assert_eq!(init, ReverbCall::Init(ReverbParams::default()));

        let wire = RunConfig::for_effect("wire");
        assert_eq!(wire.call_messages(), [SetStateParams::encode(ActivityState::Active)]);
        assert_eq!(wire.output_channels(), 2);
    }

    #[test]
    fn toml_roundtrip() {
        let mut config = RunConfig::for_effect("reverb");
        config.reverb.delay_samples = 100;
        config.host.ticks_per_chunk = 2;
        let text = config.to_toml().unwrap();
        assert_eq!(RunConfig::from_toml(&text).unwrap(), config);
    }
}
