//! The session a share is reached through

use crate::compound::{CompoundRequest, FileId, SubRequest};
use crate::error::Result;
use crate::response::{ResponseBuffer, Responses};

use std::io;

/// Sends requests to the server.
///
/// The transport adds the SMB2 headers: a related sub-request gets
/// `SMB2_FLAGS_RELATED_OPERATIONS` and every header but the last one
/// gets the offset of its successor.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Sends the whole chain as one exchange.
    /// Response `i` answers sub-request `i`.
    async fn send_compound(&self, chain: &CompoundRequest) -> io::Result<Responses>;

    /// Sends one unrelated request
    async fn send(&self, rqst: &SubRequest) -> io::Result<ResponseBuffer>;

    /// Whether the session requires SMB3 encryption
    fn encryption_required(&self) -> bool {
        false
    }

    /// Takes a reference to the cached handle of the share root, if any
    fn open_cached_root(&self) -> Option<FileId> {
        None
    }

    /// Drops a reference taken by [`Transport::open_cached_root`]
    fn close_cached_root(&self) {}

    /// Takes a reference to the tree connection of the calling user
    fn acquire_link(&self) -> Result<()> {
        Ok(())
    }

    /// Drops a reference taken by [`Transport::acquire_link`]
    fn release_link(&self) {}
}

/// A reference to the cached root handle, dropped with the guard
pub(crate) struct CachedRoot<'a, T: Transport + ?Sized> {
    /// owner
    transport: &'a T,
    /// root handle
    fid: FileId,
}

impl<'a, T: Transport + ?Sized> CachedRoot<'a, T> {
    pub(crate) fn open(transport: &'a T) -> Option<Self> {
        let fid = transport.open_cached_root()?;
        Some(Self { transport, fid })
    }

    pub(crate) const fn fid(&self) -> FileId {
        self.fid
    }
}

impl<T: Transport + ?Sized> Drop for CachedRoot<'_, T> {
    fn drop(&mut self) {
        self.transport.close_cached_root();
    }
}

/// A reference to the tree connection, dropped with the guard
pub(crate) struct LinkLease<'a, T: Transport + ?Sized> {
    /// owner
    transport: &'a T,
}

impl<'a, T: Transport + ?Sized> LinkLease<'a, T> {
    pub(crate) fn acquire(transport: &'a T) -> Result<Self> {
        transport.acquire_link()?;
        Ok(Self { transport })
    }
}

impl<T: Transport + ?Sized> Drop for LinkLease<'_, T> {
    fn drop(&mut self) {
        self.transport.release_link();
    }
}
