//! Fixed-size block pump shared by the single-pin effects.

use apefx_core::EffectInstance;

/// Accumulates input pin 0 into `N`-byte blocks and emits them on output pin 0.
#[derive(Debug, Clone)]
pub(crate) struct BlockPump<const N: usize> {
    filled: usize,
    block: [u8; N],
}

impl<const N: usize> BlockPump<N> {
    pub(crate) const fn new() -> Self {
        Self {
            filled: 0,
            block: [0; N],
        }
    }

    /// Bytes accumulated toward the next block.
    pub(crate) fn filled(&self) -> usize {
        self.filled
    }

    pub(crate) fn clear(&mut self) {
        self.filled = 0;
        self.block.fill(0);
    }

    /// Pumps as many blocks as input and output space allow.
    ///
    /// Each round drains up to one block from the input. A complete block is
    /// passed through `transform` and emitted only if the output has room
    /// for all of it. Rounds repeat while input remains and the last round
    /// produced a block. Pin counters are updated in the cached telemetry.
    /// Returns the bytes produced.
    pub(crate) fn run(
        &mut self,
        core: &mut EffectInstance,
        mut transform: impl FnMut(&mut [u8]),
    ) -> usize {
        let mut total = 0;
        loop {
            let (Some(input), Some(output)) = (core.input(0), core.output(0)) else {
                break;
            };
            let take = (N - self.filled).min(input.valid_bytes());
            input.copy_out(&mut self.block[self.filled..self.filled + take]);
            input.consume_bytes(take);
            self.filled += take;

            let mut produced = 0;
            if self.filled == N && output.bytes_free() >= N {
                transform(&mut self.block[..]);
                output.copy_in(&self.block);
                output.add_bytes(N);
                self.filled = 0;
                produced = N;
            }
            let more = input.valid_bytes() > 0;

            let cached = core.cached_mut();
            cached.input[0].bytes += take as u64;
            if produced > 0 {
                cached.output[0].record_block(produced);
            }
            total += produced;
            if !more || produced == 0 {
                break;
            }
        }
        total
    }
}
