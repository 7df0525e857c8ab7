//! Bulk reference delay line.

use super::params::BULK_DELAY_CAPACITY;

/// Fixed-capacity circular sample delay with a single cursor.
///
/// Each pushed sample is written at the cursor, the cursor advances
/// (wrapping once it reaches the configured length), and the sample at the
/// advanced cursor is returned. For a length `L >= 1` the output is the
/// input delayed by `L - 1` samples; a length of 0 behaves like 1.
///
/// ```text
/// L = 3:  in  a b c d e
///         out 0 0 a b c
/// ```
#[derive(Debug, Clone)]
pub struct BulkDelayLine {
    samples: [i16; BULK_DELAY_CAPACITY],
    idx: usize,
}

impl Default for BulkDelayLine {
    fn default() -> Self {
        Self {
            samples: [0; BULK_DELAY_CAPACITY],
            idx: 0,
        }
    }
}

impl BulkDelayLine {
    /// Pushes one sample through a line of `length` slots and returns the delayed sample.
    ///
    /// `length` is capped at the capacity.
    #[inline]
    pub fn push(&mut self, sample: i16, length: usize) -> i16 {
        let length = length.min(BULK_DELAY_CAPACITY);
        self.samples[self.idx] = sample;
        self.idx += 1;
        if length <= self.idx {
            self.idx = 0;
        }
        self.samples[self.idx]
    }

    /// Current cursor.
    pub fn cursor(&self) -> usize {
        self.idx
    }

    /// Zeroes the line and rewinds the cursor.
    pub fn clear(&mut self) {
        self.samples.fill(0);
        self.idx = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_by_length_minus_one() {
        let mut line = BulkDelayLine::default();
        let out: [i16; 5] = core::array::from_fn(|i| line.push(i as i16 + 1, 3));
        assert_eq!(out, [0, 0, 1, 2, 3]);
    }

    #[test]
    fn zero_and_one_are_immediate() {
        let mut line = BulkDelayLine::default();
        assert_eq!(line.push(7, 0), 7);
        assert_eq!(line.push(8, 1), 8);
        assert_eq!(line.cursor(), 0);
    }

    #[test]
    fn clear_rewinds() {
        let mut line = BulkDelayLine::default();
        line.push(5, 10);
        line.push(6, 10);
        line.clear();
        assert_eq!(line.cursor(), 0);
        assert_eq!(line.push(1, 2), 0);
    }
}
