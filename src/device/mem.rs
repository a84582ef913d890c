use std::{
    io,
    sync::atomic::{AtomicUsize, Ordering},
};

use dashmap::{DashMap, DashSet};

use crate::{types::BlockId, Result};

use super::BlockDevice;

/// A device that keeps its blocks in memory. Blocks that were never written read
/// as zeroes.
#[derive(Debug)]
pub struct MemDevice {
    block_size: usize,
    blocks: DashMap<BlockId, Box<[u8]>>,
    failing: DashSet<BlockId>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemDevice {
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size,
            blocks: Default::default(),
            failing: Default::default(),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// The number of completed block reads.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    /// The number of completed block writes.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    /// Make every following read of `id` fail with an I/O error.
    pub fn fail_reads(&self, id: BlockId) {
        self.failing.insert(id);
    }

    pub fn heal(&self, id: BlockId) {
        self.failing.remove(&id);
    }

    /// A copy of the stored contents of `id`, bypassing any cache.
    pub fn block(&self, id: BlockId) -> Option<Vec<u8>> {
        self.blocks.get(&id).map(|b| b.to_vec())
    }
}

impl BlockDevice for MemDevice {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn read_block(&self, id: BlockId, buf: &mut [u8]) -> Result<()> {
        debug_assert_eq!(buf.len(), self.block_size);

        if self.failing.contains(&id) {
            let msg = format!("injected read failure at {}", id);
            return Err(io::Error::new(io::ErrorKind::Other, msg).into());
        }
        match self.blocks.get(&id) {
            Some(block) => buf.copy_from_slice(&block),
            None => buf.fill(0),
        }
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn write_block(&self, id: BlockId, buf: &[u8]) -> Result<()> {
        debug_assert_eq!(buf.len(), self.block_size);

        self.blocks.insert(id, buf.into());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::MemDevice;
    use crate::{device::BlockDevice, types::BlockId, ErrorKind};

    #[test]
    fn unwritten_blocks_read_as_zero() {
        let dev = MemDevice::new(16);
        let mut buf = [0xffu8; 16];
        dev.read_block(BlockId::new(1, 7), &mut buf).unwrap();
        assert_eq!(buf, [0; 16]);
        assert_eq!(dev.reads(), 1);
    }

    #[test]
    fn write_then_read() {
        let dev = MemDevice::new(4);
        let id = BlockId::new(0, 3);
        dev.write_block(id, &[1, 2, 3, 4]).unwrap();

        let mut buf = [0u8; 4];
        dev.read_block(id, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
        assert_eq!(dev.block(id).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(dev.writes(), 1);
    }

    #[test]
    fn injected_failures() {
        let dev = MemDevice::new(4);
        let id = BlockId::new(0, 1);
        dev.fail_reads(id);

        let mut buf = [0u8; 4];
        let err = dev.read_block(id, &mut buf).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::IoError(_)));
        assert_eq!(dev.reads(), 0);

        dev.heal(id);
        dev.read_block(id, &mut buf).unwrap();
    }
}
