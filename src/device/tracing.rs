use std::fmt::Display;

use tracing::{trace, warn};

use super::BlockDevice;
use crate::{types::BlockId, Result};

/// Logs every call made to the wrapped device.
pub struct TracingDevice<D> {
    id: String,
    inner: D,
}

impl<D> TracingDevice<D> {
    pub fn new<ID>(inner: D, id: ID) -> Self
    where
        ID: Display,
    {
        let id = id.to_string();
        Self { id, inner }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }
}

impl<D> BlockDevice for TracingDevice<D>
where
    D: BlockDevice,
{
    fn block_size(&self) -> usize {
        self.inner.block_size()
    }

    fn read_block(&self, id: BlockId, buf: &mut [u8]) -> Result<()> {
        trace!("device.read({}, {}, {})", self.id, id, buf.len());
        let res = self.inner.read_block(id, buf);
        if let Err(err) = &res {
            warn!("device.read({}, {}) failed: {}", self.id, id, err);
        }
        res
    }

    fn write_block(&self, id: BlockId, buf: &[u8]) -> Result<()> {
        trace!("device.write({}, {}, {})", self.id, id, buf.len());
        let res = self.inner.write_block(id, buf);
        if let Err(err) = &res {
            warn!("device.write({}, {}) failed: {}", self.id, id, err);
        }
        res
    }

    fn sync(&self) -> Result<()> {
        trace!("device.sync({})", self.id);
        self.inner.sync()
    }
}
