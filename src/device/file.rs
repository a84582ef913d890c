use std::{fs::File, os::unix::fs::FileExt, path::Path};

use crate::{types::BlockId, ErrorKind, Result};

use super::BlockDevice;

/// A single device backed by a file. Block `n` lives at byte offset
/// `n * block_size`.
#[derive(Debug)]
pub struct FileDevice {
    file: File,
    dev: u32,
    block_size: usize,
}

impl FileDevice {
    pub fn from_std_file(file: File, dev: u32, block_size: usize) -> Self {
        Self {
            file,
            dev,
            block_size,
        }
    }

    pub fn open<P>(path: P, dev: u32, block_size: usize) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let file = File::options().read(true).write(true).open(path)?;
        Ok(Self::from_std_file(file, dev, block_size))
    }

    /// Reserve disk space for `blocks` blocks up front.
    pub fn allocate(&self, blocks: u64) -> Result<()> {
        use fs2::FileExt;

        Ok(self.file.allocate(blocks * self.block_size as u64)?)
    }

    fn offset(&self, id: BlockId) -> Result<u64> {
        if id.dev != self.dev {
            return Err(ErrorKind::NoDevice(id.dev).into());
        }
        Ok(u64::from(id.blockno) * self.block_size as u64)
    }
}

impl BlockDevice for FileDevice {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn read_block(&self, id: BlockId, buf: &mut [u8]) -> Result<()> {
        let offset = self.offset(id)?;
        let len = self.file.metadata()?.len();

        // Blocks past the end of the file have never been written.
        if offset >= len {
            buf.fill(0);
            return Ok(());
        }
        if offset + buf.len() as u64 > len {
            let valid = (len - offset) as usize;
            self.file.read_exact_at(&mut buf[..valid], offset)?;
            buf[valid..].fill(0);
            return Ok(());
        }
        Ok(self.file.read_exact_at(buf, offset)?)
    }

    fn write_block(&self, id: BlockId, buf: &[u8]) -> Result<()> {
        let offset = self.offset(id)?;
        Ok(self.file.write_all_at(buf, offset)?)
    }

    fn sync(&self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }
}
