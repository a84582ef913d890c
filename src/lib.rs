#![forbid(unsafe_code)]

//! A fixed-capacity, partitioned buffer cache for device blocks.
//!
//! See [BlockCache] for the locking protocol.

use std::{io, result, sync::Arc};

use thiserror::Error;

pub mod buffer_cache;
pub mod config;
pub mod device;
mod types;
mod util;

pub use self::{
    buffer_cache::{BlockCache, BlockGuard, CacheStats, Pinned},
    config::CacheConfig,
    device::BlockDevice,
    types::{BlockId, SlotId},
};

#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error {
    // Use `Arc` here so a device error can be handed to several callers.
    kind: Arc<ErrorKind>,
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("invalid cache configuration: {0}")]
    InvalidConfig(&'static str),
    #[error("block size mismatch: cache uses {expected} bytes, device uses {actual}")]
    BlockSizeMismatch { expected: usize, actual: usize },
    #[error("no such device: {0}")]
    NoDevice(u32),
    /// The block is not currently held by any slot of the cache.
    #[error("block is not resident in the cache")]
    NotResident,
    /// An unexpected I/O error occurred.
    #[error("unexpected io error occurred: {0:?}")]
    IoError(#[from] io::Error),
}

pub type Result<T> = result::Result<T, Error>;

impl Error {
    #[inline]
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }
}

impl Clone for Error {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind.clone(),
        }
    }
}

impl<E> From<E> for Error
where
    ErrorKind: From<E>,
{
    #[inline]
    fn from(error: E) -> Self {
        Error {
            kind: Arc::new(error.into()),
        }
    }
}

impl From<io::ErrorKind> for ErrorKind {
    fn from(kind: io::ErrorKind) -> Self {
        io::Error::from(kind).into()
    }
}
