//! Memory blocks and the regions that describe them.
//!
//! On the co-processor every effect's memory is placed by the loader into one
//! of five classes (instance, shared, fast-shared, internal, required-internal).
//! A [`MemoryBlock`] is one such placement: a zeroed, fixed-size byte block
//! allocated once and never resized. A [`MemoryRegion`] is the immutable view
//! a [`RingBuffer`](crate::RingBuffer) is built over: which block, how many
//! bytes of it, and what access the owner granted.
//!
//! A region may be *unbacked* (no block). That is the "null address" case: the
//! pin exists in the descriptor but nothing was placed behind it, and
//! [`EffectInstance::full_reset`](crate::EffectInstance::full_reset) skips it.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec;
use core::cell::RefCell;
use core::fmt;

use critical_section::Mutex;

/// Access capability flags for a memory region.
///
/// # Example
///
/// ```rust
/// use apefx_core::MemFlags;
///
/// let flags = MemFlags::READ.union(MemFlags::WRITE);
/// assert_eq!(flags, MemFlags::ALL_ACCESS);
/// assert!(flags.contains(MemFlags::READ));
/// assert!(!MemFlags::READ.contains(MemFlags::WRITE));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MemFlags(u32);

impl MemFlags {
    /// No access granted.
    pub const NONE: Self = Self(0);
    /// The consumer side may read.
    pub const READ: Self = Self(1 << 0);
    /// The producer side may write.
    pub const WRITE: Self = Self(1 << 1);
    /// Read and write.
    pub const ALL_ACCESS: Self = Self(Self::READ.0 | Self::WRITE.0);

    /// Creates flags from raw bits.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Returns the raw bits.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns `true` if every flag in `other` is also set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the union of both flag sets.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// Memory class a block was placed in.
///
/// Mirrors the placement sections the loader understands. The class is
/// informational on a host build; on the co-processor it decides cache
/// behaviour and which side can see the memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryClass {
    /// Private instance memory (cached, co-processor only).
    Instance,
    /// Cross-processor, non-cached memory.
    Shared,
    /// Cross-processor, write-combined memory. Output rings live here.
    FastShared,
    /// Internal RAM if available, otherwise default memory.
    Internal,
    /// Internal RAM that must be internal.
    RequiredInternal,
}

impl MemoryClass {
    /// Returns the placement section name for the class.
    pub const fn section(&self) -> &'static str {
        match self {
            MemoryClass::Instance => ".dram_data",
            MemoryClass::Shared => ".dram_shared",
            MemoryClass::FastShared => ".dram_shared_wc",
            MemoryClass::Internal => ".aram_data",
            MemoryClass::RequiredInternal => ".aram_x_data",
        }
    }
}

/// A fixed-size, zero-initialised block of placed memory.
///
/// The bytes sit behind a [`critical_section::Mutex`], so a block can be
/// shared (via `Arc`) between the producer and consumer contexts without
/// `unsafe`. Access is scoped with [`with_bytes`](Self::with_bytes).
pub struct MemoryBlock {
    class: MemoryClass,
    len: usize,
    bytes: Mutex<RefCell<Box<[u8]>>>,
}

impl MemoryBlock {
    /// Places a zeroed block of `len` bytes in the given class.
    pub fn new(class: MemoryClass, len: usize) -> Self {
        Self {
            class,
            len,
            bytes: Mutex::new(RefCell::new(vec![0u8; len].into_boxed_slice())),
        }
    }

    /// Places a zeroed block and wraps it for sharing.
    pub fn shared(class: MemoryClass, len: usize) -> Arc<Self> {
        Arc::new(Self::new(class, len))
    }

    /// Returns the memory class the block was placed in.
    pub fn class(&self) -> MemoryClass {
        self.class
    }

    /// Returns the block length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` for a zero-length block.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Runs `f` with exclusive access to the block's bytes.
    ///
    /// Executes inside a critical section; keep `f` short.
    ///
    /// # Panics
    ///
    /// Panics if called re-entrantly on the same block from inside `f`.
    pub fn with_bytes<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        critical_section::with(|cs| {
            let mut bytes = self.bytes.borrow_ref_mut(cs);
            f(&mut bytes)
        })
    }

    /// Zeroes the whole block.
    pub fn clear(&self) {
        self.with_bytes(|bytes| bytes.fill(0));
    }
}

impl fmt::Debug for MemoryBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBlock")
            .field("class", &self.class)
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

/// Geometry and access flags over an optional [`MemoryBlock`].
///
/// Immutable after construction. Cloning a region shares the block.
#[derive(Debug, Clone)]
pub struct MemoryRegion {
    block: Option<Arc<MemoryBlock>>,
    size: usize,
    flags: MemFlags,
}

impl MemoryRegion {
    /// Describes the whole of `block`.
    pub fn new(block: Arc<MemoryBlock>, flags: MemFlags) -> Self {
        let size = block.len();
        Self {
            block: Some(block),
            size,
            flags,
        }
    }

    /// Describes the first `size` bytes of `block`.
    ///
    /// `size` is clamped to the block length.
    pub fn with_size(block: Arc<MemoryBlock>, size: usize, flags: MemFlags) -> Self {
        let size = size.min(block.len());
        Self {
            block: Some(block),
            size,
            flags,
        }
    }

    /// Describes a region with no memory behind it.
    pub fn unbacked(size: usize, flags: MemFlags) -> Self {
        Self {
            block: None,
            size,
            flags,
        }
    }

    /// Returns the backing block, if any.
    pub fn block(&self) -> Option<&Arc<MemoryBlock>> {
        self.block.as_ref()
    }

    /// Returns `true` if memory was placed behind the region.
    pub fn is_backed(&self) -> bool {
        self.block.is_some()
    }

    /// Returns the region size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns the access flags.
    pub fn flags(&self) -> MemFlags {
        self.flags
    }
}
