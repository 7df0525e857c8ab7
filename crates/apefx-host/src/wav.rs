//! WAV file reading and writing as interleaved 16-bit PCM.

use std::path::Path;

use apefx_effects::pcm;
use hound::{SampleFormat, WavReader, WavWriter};

use crate::{Error, Result};

/// Stream layout of a PCM buffer. Samples are always 16-bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavSpec {
    /// Number of interleaved channels.
    pub channels: u16,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl Default for WavSpec {
    fn default() -> Self {
        Self {
            channels: 2,
            sample_rate: 16000,
        }
    }
}

impl From<WavSpec> for hound::WavSpec {
    fn from(spec: WavSpec) -> Self {
        hound::WavSpec {
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        }
    }
}

/// Read a WAV file as interleaved 16-bit samples.
///
/// Integer files of other depths are rescaled to 16 bits; 32-bit float files
/// are scaled and saturated.
pub fn read_wav<P: AsRef<Path>>(path: P) -> Result<(Vec<i16>, WavSpec)> {
    let reader = WavReader::open(path)?;
    let file_spec = reader.spec();
    let spec = WavSpec {
        channels: file_spec.channels,
        sample_rate: file_spec.sample_rate,
    };

    let samples = match (file_spec.sample_format, file_spec.bits_per_sample) {
        (SampleFormat::Int, 16) => reader
            .into_samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()?,
        (SampleFormat::Int, bits @ 1..=32) => reader
            .into_samples::<i32>()
            .map(|s| s.map(|v| rescale(v, bits)))
            .collect::<std::result::Result<Vec<_>, _>>()?,
        (SampleFormat::Float, 32) => reader
            .into_samples::<f32>()
            .map(|s| s.map(|v| pcm::saturate((v * 32768.0) as i32)))
            .collect::<std::result::Result<Vec<_>, _>>()?,
        (format, bits) => {
            return Err(Error::UnsupportedFormat(format!("{format:?} {bits}-bit")));
        }
    };

    Ok((samples, spec))
}

fn rescale(value: i32, bits: u16) -> i16 {
    if bits > 16 {
        (value >> (bits - 16)) as i16
    } else {
        pcm::saturate(value << (16 - bits))
    }
}

/// Write interleaved 16-bit samples to a WAV file.
pub fn write_wav<P: AsRef<Path>>(path: P, samples: &[i16], spec: WavSpec) -> Result<()> {
    let mut writer = WavWriter::create(path, hound::WavSpec::from(spec))?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Converts interleaved samples from `from` channels to `to` channels.
///
/// Mono is duplicated into every output channel; wider streams keep their
/// first `to` channels. Widening anything but mono is unsupported.
pub fn remap_channels(samples: &[i16], from: u16, to: u16) -> Result<Vec<i16>> {
    let (from, to) = (usize::from(from), usize::from(to));
    if from == 0 || to == 0 {
        return Err(Error::UnsupportedFormat(format!(
            "{from} to {to} channels"
        )));
    }
    if from == to {
        return Ok(samples.to_vec());
    }
    if from == 1 {
        return Ok(samples
            .iter()
            .flat_map(|&s| std::iter::repeat_n(s, to))
            .collect());
    }
    if from > to {
        return Ok(samples
            .chunks_exact(from)
            .flat_map(|frame| frame[..to].iter().copied())
            .collect());
    }
    Err(Error::UnsupportedFormat(format!(
        "cannot widen {from} channels to {to}"
    )))
}

/// Little-endian byte stream of `samples`.
pub fn pcm_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = vec![0u8; samples.len() * pcm::BYTES_PER_SAMPLE];
    pcm::encode_into(samples, &mut bytes);
    bytes
}

/// Samples of a little-endian byte stream. A trailing odd byte is dropped.
pub fn pcm_samples(bytes: &[u8]) -> Vec<i16> {
    let mut samples = vec![0i16; bytes.len() / pcm::BYTES_PER_SAMPLE];
    pcm::decode_into(bytes, &mut samples);
    samples
}
