use std::fmt;

use nonmax::NonMaxUsize;

/// The address of a block: a device number and a block number on that device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId {
    pub dev: u32,
    pub blockno: u32,
}

impl BlockId {
    #[inline]
    pub const fn new(dev: u32, blockno: u32) -> Self {
        Self { dev, blockno }
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.dev, self.blockno)
    }
}

/// Stable index of a slot in the cache's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotId(pub(crate) NonMaxUsize);

impl SlotId {
    pub(crate) fn new(index: usize) -> Self {
        Self(NonMaxUsize::new(index).expect("slot index overflow"))
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0.get()
    }
}
