//! Little-endian 16-bit PCM helpers.
//!
//! Ring buffers carry bytes; effects work on `i16` samples. Every effect in
//! this crate uses a word length of two bytes.

/// Bytes per sample.
pub const BYTES_PER_SAMPLE: usize = 2;

/// Decodes the `index`-th sample of `bytes`.
#[inline]
pub fn sample_at(bytes: &[u8], index: usize) -> i16 {
    let i = index * BYTES_PER_SAMPLE;
    i16::from_le_bytes([bytes[i], bytes[i + 1]])
}

/// Decodes as many whole samples as fit in both slices. Returns the count.
pub fn decode_into(bytes: &[u8], out: &mut [i16]) -> usize {
    let mut n = 0;
    for (dst, src) in out.iter_mut().zip(bytes.chunks_exact(BYTES_PER_SAMPLE)) {
        *dst = i16::from_le_bytes([src[0], src[1]]);
        n += 1;
    }
    n
}

/// Encodes as many samples as fit in both slices. Returns the count.
pub fn encode_into(samples: &[i16], out: &mut [u8]) -> usize {
    let mut n = 0;
    for (dst, &src) in out.chunks_exact_mut(BYTES_PER_SAMPLE).zip(samples) {
        dst.copy_from_slice(&src.to_le_bytes());
        n += 1;
    }
    n
}

/// Interleaves two sample streams frame by frame into `out` as PCM bytes.
///
/// Each frame is `a_channels` samples of `a` followed by `b_channels` samples
/// of `b`.
pub fn interleave_samples(
    out: &mut [u8],
    a: &[i16],
    a_channels: usize,
    b: &[i16],
    b_channels: usize,
    frames: usize,
) {
    let stride = a_channels + b_channels;
    for frame in 0..frames {
        let base = frame * stride;
        for ch in 0..a_channels {
            put(out, base + ch, a[frame * a_channels + ch]);
        }
        for ch in 0..b_channels {
            put(out, base + a_channels + ch, b[frame * b_channels + ch]);
        }
    }
}

/// Interleaves two PCM byte streams frame by frame.
///
/// `a_width` and `b_width` are the bytes each stream contributes per frame.
pub fn interleave_bytes(
    out: &mut [u8],
    a: &[u8],
    a_width: usize,
    b: &[u8],
    b_width: usize,
    frames: usize,
) {
    let stride = a_width + b_width;
    for frame in 0..frames {
        let dst = &mut out[frame * stride..(frame + 1) * stride];
        dst[..a_width].copy_from_slice(&a[frame * a_width..(frame + 1) * a_width]);
        dst[a_width..].copy_from_slice(&b[frame * b_width..(frame + 1) * b_width]);
    }
}

/// Saturates a wide intermediate to 16 bits.
#[inline]
pub fn saturate(value: i32) -> i16 {
    value.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

#[inline]
fn put(out: &mut [u8], index: usize, sample: i16) {
    let i = index * BYTES_PER_SAMPLE;
    out[i..i + BYTES_PER_SAMPLE].copy_from_slice(&sample.to_le_bytes());
}
