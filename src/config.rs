use std::num::NonZeroUsize;

use crate::{buffer_cache::BlockCache, device::BlockDevice, ErrorKind, Result};

/// Sizing of a [BlockCache]. All values are fixed for the lifetime of the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// The number of block slots. This is the most blocks that can be held
    /// (acquired or pinned) at once.
    pub slots: NonZeroUsize,
    /// The number of partitions. Each has its own structural lock, so more
    /// partitions means less contention between unrelated blocks.
    pub partitions: NonZeroUsize,
    /// The size of each block. Must match the device.
    pub block_size: NonZeroUsize,
}

impl CacheConfig {
    pub const DEFAULT_SLOTS: usize = 30;
    pub const DEFAULT_PARTITIONS: usize = 13;
    pub const DEFAULT_BLOCK_SIZE: usize = 1024;

    pub fn new(slots: usize, partitions: usize, block_size: usize) -> Result<Self> {
        let nonzero = |v: usize, what| NonZeroUsize::new(v).ok_or(ErrorKind::InvalidConfig(what));
        Ok(Self {
            slots: nonzero(slots, "slot count must be non-zero")?,
            partitions: nonzero(partitions, "partition count must be non-zero")?,
            block_size: nonzero(block_size, "block size must be non-zero")?,
        })
    }

    pub fn with_slots(mut self, slots: NonZeroUsize) -> Self {
        self.slots = slots;
        self
    }

    pub fn with_partitions(mut self, partitions: NonZeroUsize) -> Self {
        self.partitions = partitions;
        self
    }

    pub fn with_block_size(mut self, block_size: NonZeroUsize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Allocate every slot and build the cache on top of `device`.
    pub fn build<D>(self, device: D) -> Result<BlockCache<D>>
    where
        D: BlockDevice,
    {
        let actual = device.block_size();
        if actual != self.block_size.get() {
            return Err(ErrorKind::BlockSizeMismatch {
                expected: self.block_size.get(),
                actual,
            }
            .into());
        }
        Ok(BlockCache::new(self, device))
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new(
            Self::DEFAULT_SLOTS,
            Self::DEFAULT_PARTITIONS,
            Self::DEFAULT_BLOCK_SIZE,
        )
        .expect("default cache configuration is valid")
    }
}
