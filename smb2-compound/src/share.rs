//! Path operations on a share, one compound exchange each

use crate::buffer_pool::BufferPool;
use crate::compound::{self, Composer, SendFlags};
use crate::config::ShareConfig;
use crate::error::{Error, Result};
use crate::info::{FileAllInfo, FileBasicInfo};
use crate::name;
use crate::ops::{OpenParams, OperationKind, Payload};
use crate::proto::{access, attr, create_options, disposition};
use crate::response::{self, Responses};
use crate::transport::{CachedRoot, LinkLease, Transport};

use tracing::{debug, warn};

/// Number of released request buffers kept for reuse
const POOL_CAPACITY: usize = 32;

/// Result of [`Share::query_path_info`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathInfo {
    /// attributes of the target
    pub info: FileAllInfo,
    /// the target is a reparse point and was opened as such
    pub symlink: bool,
    /// timestamps are in server local time (never with SMB2)
    pub adjust_tz: bool,
}

/// A share reached through a [`Transport`]
#[derive(Debug)]
pub struct Share<T> {
    /// session
    transport: T,
    /// behaviour
    config: ShareConfig,
    /// request buffers
    pool: BufferPool,
}

impl<T: Transport> Share<T> {
    #[must_use]
    pub fn new(transport: T, config: ShareConfig) -> Self {
        Self::with_pool(transport, config, BufferPool::new(POOL_CAPACITY))
    }

    #[must_use]
    pub const fn with_pool(transport: T, config: ShareConfig, pool: BufferPool) -> Self {
        Self {
            transport,
            config,
            pool,
        }
    }

    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    #[must_use]
    pub const fn config(&self) -> &ShareConfig {
        &self.config
    }

    #[must_use]
    pub const fn pool(&self) -> &BufferPool {
        &self.pool
    }

    fn send_flags(&self) -> SendFlags {
        if self.config.forces_encryption() || self.transport.encryption_required() {
            SendFlags::TRANSFORM
        } else {
            SendFlags::empty()
        }
    }

    /// Composes and sends one chain, then checks every status
    async fn exchange(
        &self,
        path: &str,
        open: OpenParams,
        kind: OperationKind,
        payload: Payload,
    ) -> Result<Responses> {
        let chain = Composer::new(&self.pool, &self.config).compose(
            path,
            open,
            kind,
            payload,
            self.send_flags(),
        )?;

        let responses = self
            .transport
            .send_compound(&chain)
            .await
            .map_err(Error::Transport)?;

        let ret = responses.check(chain.len());
        debug!(?kind, path, ok = ret.is_ok(), "compound exchange done");
        ret.map(|()| responses)
    }

    /// Runs a compound operation without output
    async fn compound_op(
        &self,
        path: &str,
        open: OpenParams,
        kind: OperationKind,
        payload: Payload,
    ) -> Result<()> {
        self.exchange(path, open, kind, payload).await.map(drop)
    }

    /// Runs a compound query of `FILE_ALL_INFORMATION`
    async fn compound_query(&self, path: &str, open: OpenParams) -> Result<FileAllInfo> {
        let kind = OperationKind::QueryInfo;
        let responses = self.exchange(path, open, kind, Payload::None).await?;
        let mut info = FileAllInfo::default();
        let rsp = responses
            .get(1)
            .ok_or(Error::InvalidArgument("query chain without query response"))?;
        response::validate_and_copy(rsp, &mut info)?;
        Ok(info)
    }

    /// Queries the share root through its cached handle, if there is one
    async fn query_cached_root(&self) -> Option<Result<FileAllInfo>> {
        if !self.config.uses_root_handle_cache() {
            return None;
        }
        let root = CachedRoot::open(&self.transport)?;
        debug!(fid = ?root.fid(), "querying cached root handle");
        Some(self.query_root_handle(root).await)
    }

    /// Single QUERY_INFO on the root handle. The reference is dropped as soon as the response arrives.
    async fn query_root_handle(&self, root: CachedRoot<'_, T>) -> Result<FileAllInfo> {
        let rqst = compound::query_all_info(&self.pool, root.fid())?;
        let rsp = self.transport.send(&rqst).await;
        drop(root);
        let rsp = rsp.map_err(Error::Transport)?;

        Error::check_status(rsp.header()?.status)?;
        let mut info = FileAllInfo::default();
        response::validate_and_copy(&rsp, &mut info)?;
        Ok(info)
    }

    /// Gets the attributes of `path`.
    ///
    /// A target that can only be opened as a reparse point is queried again
    /// as such, and reported as a symlink.
    /// # Errors
    /// Returns [`Error`]
    #[tracing::instrument(skip(self))]
    pub async fn query_path_info(&self, path: &str) -> Result<PathInfo> {
        let mut out = PathInfo::default();

        if name::is_root(path, &self.config) {
            if let Some(ret) = self.query_cached_root().await {
                out.info = ret?;
                out.info.index_number = 0;
                return Ok(out);
            }
        }

        let mut open = OperationKind::QueryInfo.open_params();
        let first = self.compound_query(path, open).await;
        let info = match first.map_err(Error::on_first_query) {
            Err(Error::Unsupported(status)) => {
                debug!(%status, "failed on a reparse point, querying it directly");
                out.symlink = true;
                open.create_options |= create_options::OPEN_REPARSE_POINT;
                self.compound_query(path, open).await?
            }
            ret => ret?,
        };

        out.info = info;
        out.info.index_number = 0;
        Ok(out)
    }

    /// Creates the directory `path`
    /// # Errors
    /// Returns [`Error`]
    #[tracing::instrument(skip(self))]
    pub async fn mkdir(&self, path: &str) -> Result<()> {
        let kind = OperationKind::Mkdir;
        self.compound_op(path, kind.open_params(), kind, Payload::None)
            .await
    }

    /// Marks a directory created by [`Share::mkdir`] read-only.
    ///
    /// Returns the new attributes on success. A failure is logged and
    /// swallowed: the directory exists either way.
    #[tracing::instrument(skip(self))]
    pub async fn mkdir_setinfo(&self, path: &str, attributes: u32) -> Option<u32> {
        let attributes = attributes | attr::READONLY;
        let info = FileBasicInfo {
            attributes,
            ..FileBasicInfo::default()
        };
        let open = OpenParams {
            desired_access: access::FILE_WRITE_ATTRIBUTES,
            disposition: disposition::FILE_OPEN,
            create_options: create_options::NOT_FILE,
        };
        let kind = OperationKind::SetInfo;
        match self
            .compound_op(path, open, kind, Payload::Basic(info))
            .await
        {
            Ok(()) => Some(attributes),
            Err(err) => {
                warn!(%err, "failed to set attributes of the new directory");
                None
            }
        }
    }

    /// Removes the empty directory `path`
    /// # Errors
    /// Returns [`Error`]
    #[tracing::instrument(skip(self))]
    pub async fn rmdir(&self, path: &str) -> Result<()> {
        let kind = OperationKind::Rmdir;
        self.compound_op(path, kind.open_params(), kind, Payload::None)
            .await
    }

    /// Removes `path`. A symlink is removed itself, not its target.
    /// # Errors
    /// Returns [`Error`]
    #[tracing::instrument(skip(self))]
    pub async fn unlink(&self, path: &str) -> Result<()> {
        let kind = OperationKind::Delete;
        self.compound_op(path, kind.open_params(), kind, Payload::None)
            .await
    }

    /// Opens `from` and sets its rename or link information to `to`
    async fn set_path_attr(
        &self,
        from: &str,
        to: &str,
        desired_access: u32,
        kind: OperationKind,
    ) -> Result<()> {
        let target = name::encode_path(to, &self.config, &self.pool)?;
        let open = OpenParams {
            desired_access,
            disposition: disposition::FILE_OPEN,
            create_options: 0,
        };
        self.compound_op(from, open, kind, Payload::Target(target))
            .await
    }

    /// Renames `from` to `to`, replacing `to` if it exists
    /// # Errors
    /// Returns [`Error`]
    #[tracing::instrument(skip(self))]
    pub async fn rename_path(&self, from: &str, to: &str) -> Result<()> {
        self.set_path_attr(from, to, access::DELETE, OperationKind::Rename)
            .await
    }

    /// Creates the hard link `to` of `from`. Fails if `to` exists.
    /// # Errors
    /// Returns [`Error`]
    #[tracing::instrument(skip(self))]
    pub async fn create_hardlink(&self, from: &str, to: &str) -> Result<()> {
        self.set_path_attr(
            from,
            to,
            access::FILE_READ_ATTRIBUTES,
            OperationKind::Hardlink,
        )
        .await
    }

    /// Truncates or extends `path` to `size` bytes
    /// # Errors
    /// Returns [`Error`]
    #[tracing::instrument(skip(self))]
    pub async fn set_path_size(&self, path: &str, size: u64) -> Result<()> {
        let kind = OperationKind::SetEof;
        self.compound_op(path, kind.open_params(), kind, Payload::EndOfFile(size))
            .await
    }

    /// Sets timestamps and attributes of `path`. Zero fields are left unchanged;
    /// an all-zero record sends nothing.
    /// # Errors
    /// Returns [`Error`]
    #[tracing::instrument(skip(self))]
    pub async fn set_file_info(&self, path: &str, info: &FileBasicInfo) -> Result<()> {
        if info.is_noop() {
            return Ok(());
        }

        let _link = LinkLease::acquire(&self.transport)?;

        let kind = OperationKind::SetInfo;
        self.compound_op(path, kind.open_params(), kind, Payload::Basic(*info))
            .await
    }
}
