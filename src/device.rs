//! The devices a [BlockCache](crate::BlockCache) reads blocks from and writes
//! them back to.

use crate::{types::BlockId, Result};

#[cfg(unix)]
pub use self::file::FileDevice;
pub use self::{mem::MemDevice, tracing::TracingDevice};

#[cfg(unix)]
mod file;
mod mem;
mod tracing;

/// A device transferring whole blocks synchronously.
///
/// This is responsible for only two things: reading and writing complete blocks.
/// All caching and locking is handled by the cache, which only calls into the
/// device while holding the content lock of the slot being transferred.
pub trait BlockDevice {
    /// The size of every block on this device, in bytes.
    fn block_size(&self) -> usize;

    /// Read block `id` into `buf`. `buf.len()` is always the block size.
    fn read_block(&self, id: BlockId, buf: &mut [u8]) -> Result<()>;

    /// Write `buf` to block `id`. `buf.len()` is always the block size.
    fn write_block(&self, id: BlockId, buf: &[u8]) -> Result<()>;

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}

impl<D> BlockDevice for &D
where
    D: BlockDevice + ?Sized,
{
    fn block_size(&self) -> usize {
        (**self).block_size()
    }

    fn read_block(&self, id: BlockId, buf: &mut [u8]) -> Result<()> {
        (**self).read_block(id, buf)
    }

    fn write_block(&self, id: BlockId, buf: &[u8]) -> Result<()> {
        (**self).write_block(id, buf)
    }

    fn sync(&self) -> Result<()> {
        (**self).sync()
    }
}

impl<D> BlockDevice for std::sync::Arc<D>
where
    D: BlockDevice + ?Sized,
{
    fn block_size(&self) -> usize {
        (**self).block_size()
    }

    fn read_block(&self, id: BlockId, buf: &mut [u8]) -> Result<()> {
        (**self).read_block(id, buf)
    }

    fn write_block(&self, id: BlockId, buf: &[u8]) -> Result<()> {
        (**self).write_block(id, buf)
    }

    fn sync(&self) -> Result<()> {
        (**self).sync()
    }
}
