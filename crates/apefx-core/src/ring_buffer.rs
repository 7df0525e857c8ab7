//! Single-producer/single-consumer byte ring over a [`MemoryRegion`].
//!
//! The ring is the transport between the host and an effect: the host fills
//! an effect's input pins, the effect fills its own output pins, and each side
//! drains what the other produced. It never blocks. Both sides always attempt
//! their full request and get the shortfall back as a deficit; retry or drop
//! policy belongs to the caller.
//!
//! Every method takes `&self`, so producer and consumer share one
//! `Arc<RingBuffer>`. The producer owns `write` and the consumer owns `read`;
//! `valid_bytes` is the one word both sides treat as fresh after the other's
//! last update.
//!
//! # Protocol
//!
//! ```text
//! producer                          consumer
//! --------                          --------
//! n <= bytes_free()                 n <= valid_bytes()
//! copy_in(&data[..n])               copy_out(&mut data[..n])
//! add_bytes(n)   -- publishes -->   consume_bytes(n)
//! ```

use alloc::sync::Arc;
use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::memory::{MemFlags, MemoryBlock, MemoryClass, MemoryRegion};

/// Circular byte buffer with overrun/underrun accounting.
///
/// Invariants: `read < capacity`, `write < capacity` (both 0 for a zero-size
/// region) and `valid_bytes <= capacity`. `valid_bytes` only changes through
/// [`add_bytes`](Self::add_bytes) and [`consume_bytes`](Self::consume_bytes).
#[derive(Debug)]
pub struct RingBuffer {
    region: MemoryRegion,
    read: AtomicUsize,
    write: AtomicUsize,
    valid_bytes: AtomicUsize,
}

impl RingBuffer {
    /// Creates an empty ring over `region`.
    pub fn new(region: MemoryRegion) -> Self {
        Self {
            region,
            read: AtomicUsize::new(0),
            write: AtomicUsize::new(0),
            valid_bytes: AtomicUsize::new(0),
        }
    }

    /// Places a fresh zeroed block of `capacity` bytes and wraps it.
    ///
    /// Used by hosts and tests; effects receive their blocks from the loader.
    pub fn with_capacity(class: MemoryClass, capacity: usize) -> Self {
        Self::new(MemoryRegion::new(
            MemoryBlock::shared(class, capacity),
            MemFlags::ALL_ACCESS,
        ))
    }

    /// Creates an empty ring over the first `size` bytes of `block`.
    pub fn over_block(block: Arc<MemoryBlock>, size: usize, flags: MemFlags) -> Self {
        Self::new(MemoryRegion::with_size(block, size, flags))
    }

    /// Re-initialises the ring over the same region: cursors and count zeroed.
    ///
    /// The contents are left untouched.
    pub fn reinit(&self) {
        critical_section::with(|_| {
            self.read.store(0, Ordering::Relaxed);
            self.write.store(0, Ordering::Relaxed);
            self.valid_bytes.store(0, Ordering::Release);
        });
    }

    /// Returns the region the ring is built over.
    pub fn region(&self) -> &MemoryRegion {
        &self.region
    }

    /// Returns the capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.region.size()
    }

    /// Returns `true` if memory was placed behind the ring.
    pub fn is_backed(&self) -> bool {
        self.region.is_backed()
    }

    /// Returns the consumer cursor.
    pub fn read_offset(&self) -> usize {
        self.read.load(Ordering::Acquire)
    }

    /// Returns the producer cursor.
    pub fn write_offset(&self) -> usize {
        self.write.load(Ordering::Acquire)
    }

    /// Bytes between `offset` and the end of the region.
    #[inline]
    pub fn bytes_to_end(&self, offset: usize) -> usize {
        self.capacity().saturating_sub(offset)
    }

    /// Unread bytes.
    #[inline]
    pub fn valid_bytes(&self) -> usize {
        self.valid_bytes.load(Ordering::Acquire)
    }

    /// Longest run readable without wrapping.
    #[inline]
    pub fn valid_bytes_contiguous(&self) -> usize {
        self.valid_bytes().min(self.bytes_to_end(self.read_offset()))
    }

    /// Writable bytes.
    #[inline]
    pub fn bytes_free(&self) -> usize {
        self.capacity().saturating_sub(self.valid_bytes())
    }

    /// Longest run writable without wrapping.
    #[inline]
    pub fn bytes_free_contiguous(&self) -> usize {
        self.bytes_free().min(self.bytes_to_end(self.write_offset()))
    }

    /// Copies `source` into the ring starting at the write cursor.
    ///
    /// Splits the copy at the wrap boundary. Does not move the cursor or the
    /// count; publish with [`add_bytes`](Self::add_bytes). The caller checks
    /// `source.len() <= bytes_free()` first. A length above the capacity is
    /// clamped to the capacity.
    pub fn copy_in(&self, source: &[u8]) {
        let n = self.clamp_len(source.len());
        let offset = self.write_offset();
        self.with_storage(|bytes| {
            let (first, second) = self.split_at_wrap(offset, n);
            bytes[offset..offset + first].copy_from_slice(&source[..first]);
            bytes[..second].copy_from_slice(&source[first..n]);
        });
    }

    /// Copies from the ring into `destination` starting at the read cursor.
    ///
    /// Mirror of [`copy_in`](Self::copy_in); release the bytes with
    /// [`consume_bytes`](Self::consume_bytes).
    pub fn copy_out(&self, destination: &mut [u8]) {
        let n = self.clamp_len(destination.len());
        let offset = self.read_offset();
        self.with_storage(|bytes| {
            let (first, second) = self.split_at_wrap(offset, n);
            destination[..first].copy_from_slice(&bytes[offset..offset + first]);
            destination[first..n].copy_from_slice(&bytes[..second]);
        });
    }

    /// Fills `num_bytes` bytes with `value` starting at the write cursor.
    pub fn set(&self, value: u8, num_bytes: usize) {
        let n = self.clamp_len(num_bytes);
        let offset = self.write_offset();
        self.with_storage(|bytes| {
            let (first, second) = self.split_at_wrap(offset, n);
            bytes[offset..offset + first].fill(value);
            bytes[..second].fill(value);
        });
    }

    /// Publishes up to `num_bytes` written bytes and advances the write cursor.
    ///
    /// Returns the overrun deficit: the part of the request that did not fit.
    pub fn add_bytes(&self, num_bytes: usize) -> usize {
        let size = self.capacity();
        let accepted = critical_section::with(|_| {
            let valid = self.valid_bytes.load(Ordering::Acquire);
            let accepted = num_bytes.min(size.saturating_sub(valid));
            if size > 0 {
                let write = self.write.load(Ordering::Relaxed);
                self.write.store((write + accepted) % size, Ordering::Relaxed);
            }
            self.valid_bytes.fetch_add(accepted, Ordering::Release);
            accepted
        });

        let deficit = num_bytes - accepted;
        #[cfg(feature = "tracing")]
        if deficit > 0 {
            tracing::warn!(
                deficit,
                requested = num_bytes,
                capacity = size,
                "ring buffer overrun"
            );
        }
        deficit
    }

    /// Releases up to `num_bytes` read bytes and advances the read cursor.
    ///
    /// Returns the underrun deficit: the part of the request that was not
    /// available.
    pub fn consume_bytes(&self, num_bytes: usize) -> usize {
        let size = self.capacity();
        let consumed = critical_section::with(|_| {
            let valid = self.valid_bytes.load(Ordering::Acquire);
            let consumed = num_bytes.min(valid);
            if size > 0 {
                let read = self.read.load(Ordering::Relaxed);
                self.read.store((read + consumed) % size, Ordering::Relaxed);
            }
            self.valid_bytes.fetch_sub(consumed, Ordering::Release);
            consumed
        });

        let deficit = num_bytes - consumed;
        #[cfg(feature = "tracing")]
        if deficit > 0 {
            tracing::warn!(
                deficit,
                requested = num_bytes,
                capacity = size,
                "ring buffer underrun"
            );
        }
        deficit
    }

    fn clamp_len(&self, n: usize) -> usize {
        let size = self.capacity();
        debug_assert!(n <= size, "copy of {n} bytes exceeds ring capacity {size}");
        n.min(size)
    }

    /// Splits an `n`-byte access at `offset` into the run before the wrap and
    /// the run from the start of the region.
    fn split_at_wrap(&self, offset: usize, n: usize) -> (usize, usize) {
        let first = n.min(self.bytes_to_end(offset));
        (first, n - first)
    }

    fn with_storage(&self, f: impl FnOnce(&mut [u8])) {
        match self.region.block() {
            Some(block) => block.with_bytes(|bytes| f(&mut bytes[..self.region.size()])),
            None => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    capacity = self.capacity(),
                    "copy on unbacked ring buffer ignored"
                );
            }
        }
    }
}

impl fmt::Display for RingBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ring sz: {} r: {} w: {} vb: {}",
            self.capacity(),
            self.read_offset(),
            self.write_offset(),
            self.valid_bytes()
        )
    }
}
