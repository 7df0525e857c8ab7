//! Echo-canceller parameter model, limits and clamping.

/// Largest supported word length in bytes.
pub const MAX_WORD_LENGTH: u32 = 2;
/// Largest supported echo (microphone) channel count.
pub const MAX_INPUT_CHANNELS: u32 = 1;
/// Largest supported reference (far-end) channel count.
pub const MAX_REFERENCE_CHANNELS: u32 = 1;
/// Largest supported output channel count.
pub const MAX_OUTPUT_CHANNELS: u32 = 1;
/// Largest block, in samples per channel.
pub const MAX_SAMPLES_PER_BLOCK: u32 = 4 * 128;
/// Longest echo tail, in samples.
pub const MAX_TAIL_LENGTH: u32 = 1024;
/// Lowest accepted sample rate.
pub const MIN_SAMPLE_RATE: u32 = 8000;
/// Longest bulk reference delay, in samples per channel.
pub const MAX_BULK_DELAY: u32 = 1024;
/// Physical input pins: echo (or interleaved echo + reference) and reference.
pub const NUM_INPUT_PINS: usize = 2;

/// Bulk delay line capacity in samples.
pub const BULK_DELAY_CAPACITY: usize = (MAX_BULK_DELAY * MAX_REFERENCE_CHANNELS) as usize;
/// Largest input block in bytes (echo + reference).
pub const MAX_IN_BLOCK_BYTES: usize = (MAX_SAMPLES_PER_BLOCK
    * (MAX_INPUT_CHANNELS + MAX_REFERENCE_CHANNELS)
    * MAX_WORD_LENGTH) as usize;
/// Largest processed output block in bytes.
pub const MAX_OUT_BLOCK_BYTES: usize =
    (MAX_SAMPLES_PER_BLOCK * MAX_OUTPUT_CHANNELS * MAX_WORD_LENGTH) as usize;
/// Output ring size: sixteen output blocks.
pub const OUTPUT_BUFFER_SIZE: usize = MAX_OUT_BLOCK_BYTES * 16;
/// Scratch capacity in samples per stream.
pub(crate) const MAX_BLOCK_SAMPLES: usize = MAX_SAMPLES_PER_BLOCK as usize;

/// Default sample rate.
pub const DEFAULT_SAMPLE_RATE: u32 = 2 * 8000;
/// Default block length in samples.
pub const DEFAULT_BLOCK_LENGTH: u32 = 128;
/// Default echo tail in samples.
pub const DEFAULT_TAIL_LENGTH: u32 = 512;
/// Default word length in bytes.
pub const DEFAULT_WORD_LENGTH: u32 = 2;
/// Default bulk delay per reference channel.
pub const DEFAULT_BULK_DELAY: u32 = 24;
/// Default residual suppression while near-end voice is active (dB).
pub const DEFAULT_ACTIVE_SUPPRESS_DB: i32 = -15;
/// Default residual suppression while near-end voice is inactive (dB).
pub const DEFAULT_INACTIVE_SUPPRESS_DB: i32 = -40;

/// How echo and reference arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum InputMode {
    /// Echo and reference interleaved on pin 0.
    #[default]
    SingleInterleaved = 0,
    /// Echo on pin 0, reference on pin 1.
    MultiPin = 1,
}

impl InputMode {
    /// Decodes a raw wire value.
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(InputMode::SingleInterleaved),
            1 => Some(InputMode::MultiPin),
            _ => None,
        }
    }
}

/// Output-shaping mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum AecMode {
    /// Raw echo stream passed through.
    Bypass = 0,
    /// Cancellation result.
    #[default]
    Active = 1,
    /// Characterisation loopback: raw input passed through untouched.
    Char = 2,
    /// Cancellation result interleaved with the raw echo stream.
    Cmp = 3,
}

impl AecMode {
    /// Decodes a raw wire value.
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(AecMode::Bypass),
            1 => Some(AecMode::Active),
            2 => Some(AecMode::Char),
            3 => Some(AecMode::Cmp),
            _ => None,
        }
    }

    /// Mode name as used in configuration files.
    pub const fn name(self) -> &'static str {
        match self {
            AecMode::Bypass => "bypass",
            AecMode::Active => "active",
            AecMode::Char => "char",
            AecMode::Cmp => "cmp",
        }
    }
}

/// Post-filter feature switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ControlFlags(u32);

impl ControlFlags {
    /// Everything enabled.
    pub const NONE: Self = Self(0);
    /// Disable the denoiser. Bit 0 (`0x1`).
    pub const DENOISE_DISABLE: Self = Self(1 << 0);
    /// Disable residual echo suppression. Bit 1 (`0x2`).
    pub const RESIDUAL_SUPPRESSION_DISABLE: Self = Self(1 << 1);

    /// Creates flags from raw bits.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Returns the raw bits.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns `true` if every flag in `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the union of both flag sets.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Replaces the bits selected by `mask` with those of `flags`.
    ///
    /// ```rust
    /// use apefx_effects::aec::ControlFlags;
    ///
    /// let current = ControlFlags::DENOISE_DISABLE;
    /// let next = current.apply_masked(
    ///     ControlFlags::RESIDUAL_SUPPRESSION_DISABLE,
    ///     ControlFlags::RESIDUAL_SUPPRESSION_DISABLE,
    /// );
    /// assert!(next.contains(ControlFlags::DENOISE_DISABLE));
    /// assert!(next.contains(ControlFlags::RESIDUAL_SUPPRESSION_DISABLE));
    /// ```
    pub const fn apply_masked(self, flags: Self, mask: Self) -> Self {
        Self((self.0 & !mask.0) | (flags.0 & mask.0))
    }
}

/// Sample format of the streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataFormat {
    /// Bytes per sample.
    pub word_length: u32,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Echo (microphone) channels.
    pub n_input_channels: u32,
    /// Output channels.
    pub n_output_channels: u32,
    /// Reference (far-end) channels.
    pub n_reference_channels: u32,
}

/// Canceller geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterConfig {
    /// How echo and reference arrive.
    pub input_mode: InputMode,
    /// Bulk reference delay in samples (all reference channels).
    pub bulk_delay: u32,
    /// Echo tail in samples.
    pub tail_length: u32,
    /// Block length in samples per channel.
    pub block_length: u32,
}

/// Residual echo suppression thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostProcConfig {
    /// Suppression while near-end voice is inactive (dB, negative).
    pub residual_suppression_threshold_inactive: i32,
    /// Suppression while near-end voice is active (dB, negative).
    pub residual_suppression_threshold_active: i32,
}

/// Complete echo-canceller parameter block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AecParams {
    /// Post-filter feature switches.
    pub flags: ControlFlags,
    /// Stream format.
    pub data_format: DataFormat,
    /// Canceller geometry.
    pub filter: FilterConfig,
    /// Suppression thresholds.
    pub post_proc: PostProcConfig,
}

impl Default for AecParams {
    fn default() -> Self {
        Self {
            flags: ControlFlags::NONE,
            data_format: DataFormat {
                word_length: DEFAULT_WORD_LENGTH,
                sample_rate: DEFAULT_SAMPLE_RATE,
                n_input_channels: 1,
                n_output_channels: 1,
                n_reference_channels: 1,
            },
            filter: FilterConfig {
                input_mode: InputMode::SingleInterleaved,
                bulk_delay: DEFAULT_BULK_DELAY,
                tail_length: DEFAULT_TAIL_LENGTH,
                block_length: DEFAULT_BLOCK_LENGTH,
            },
            post_proc: PostProcConfig {
                residual_suppression_threshold_inactive: DEFAULT_INACTIVE_SUPPRESS_DB,
                residual_suppression_threshold_active: DEFAULT_ACTIVE_SUPPRESS_DB,
            },
        }
    }
}

/// Clamps every field of `params` into its supported range.
///
/// Never fails: out-of-range input degrades to a safe value. Idempotent.
///
/// - sample rate: at least [`MIN_SAMPLE_RATE`]
/// - word length: always [`MAX_WORD_LENGTH`] (16-bit samples only)
/// - channel counts: capped at their maximum, zero becomes one
/// - bulk delay: capped at [`BULK_DELAY_CAPACITY`]
/// - input mode: single-interleaved when only one physical pin exists
/// - block length: capped at [`MAX_SAMPLES_PER_BLOCK`]
/// - tail length: capped at [`MAX_TAIL_LENGTH`], zero becomes the maximum
pub fn verify_parameters(params: &mut AecParams) {
    let fmt = &mut params.data_format;
    fmt.sample_rate = fmt.sample_rate.max(MIN_SAMPLE_RATE);
    fmt.word_length = MAX_WORD_LENGTH;
    fmt.n_input_channels = clamp_channels(fmt.n_input_channels, MAX_INPUT_CHANNELS);
    fmt.n_output_channels = clamp_channels(fmt.n_output_channels, MAX_OUTPUT_CHANNELS);
    fmt.n_reference_channels = clamp_channels(fmt.n_reference_channels, MAX_REFERENCE_CHANNELS);

    let filter = &mut params.filter;
    filter.bulk_delay = filter.bulk_delay.min(BULK_DELAY_CAPACITY as u32);
    if NUM_INPUT_PINS == 1 {
        filter.input_mode = InputMode::SingleInterleaved;
    }
    filter.block_length = filter.block_length.min(MAX_SAMPLES_PER_BLOCK);
    filter.tail_length = match filter.tail_length {
        0 => MAX_TAIL_LENGTH,
        tail => tail.min(MAX_TAIL_LENGTH),
    };
}

fn clamp_channels(count: u32, max: u32) -> u32 {
    count.clamp(1, max)
}

/// Per-block byte counts derived from validated parameters and the mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockLengths {
    /// Echo bytes per block.
    pub echo: usize,
    /// Reference bytes per block.
    pub reference: usize,
    /// Bytes accumulated per block on each input pin.
    pub input: [usize; NUM_INPUT_PINS],
    /// Bytes produced per block.
    pub output: usize,
}

impl BlockLengths {
    /// Derives the byte counts.
    ///
    /// `char` emits the raw input (both pins in multi-pin mode); `cmp` emits
    /// the output block plus the raw echo block.
    pub fn derive(params: &AecParams, mode: AecMode) -> Self {
        let fmt = &params.data_format;
        let frame_bytes = (params.filter.block_length * fmt.word_length) as usize;
        let echo = frame_bytes * fmt.n_input_channels as usize;
        let reference = frame_bytes * fmt.n_reference_channels as usize;
        let processed = frame_bytes * fmt.n_output_channels as usize;

        let input = match params.filter.input_mode {
            InputMode::SingleInterleaved => [echo + reference, 0],
            InputMode::MultiPin => [echo, reference],
        };
        let output = match mode {
            AecMode::Char => input[0] + input[1],
            AecMode::Cmp => processed + echo,
            AecMode::Bypass | AecMode::Active => processed,
        };

        Self {
            echo,
            reference,
            input,
            output,
        }
    }
}
