//! Compound request chains: `[Open, (Middle), Close]`

use crate::buffer_pool::{Buffer, BufferPool};
use crate::config::ShareConfig;
use crate::encode::{Encode, Encoder};
use crate::error::{Error, Result};
use crate::info::{LinkInfoHeader, DELETE_PENDING};
use crate::name::{self, WireName};
use crate::ops::{Middle, OpenParams, OperationKind, Payload};
use crate::proto::{
    attr, body_size, command, create_options, share_access, structure_size,
    FILE_EOF_INFO_SIZE, IMPERSONATION_LEVEL_IMPERSONATION, INFO_TYPE_FILE, OPLOCK_LEVEL_NONE,
    QUERY_ALL_INFO_OUTPUT_LEN, SMB2_HEADER_SIZE,
};

use std::convert::TryFrom;
use std::io::IoSlice;

use bitflags::bitflags;
use smallvec::SmallVec;
use tracing::{debug, error};

/// Max number of sub-requests in a chain
pub const MAX_COMPOUND: usize = 3;

/// A genuine handle returned by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId {
    pub persistent: u64,
    pub volatile: u64,
}

/// The handle a sub-request addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleRef {
    /// The handle opened by the preceding command of the same chain
    Chained,
    /// A handle opened earlier
    Fid(FileId),
}

impl HandleRef {
    /// Wire value of [`HandleRef::Chained`]
    pub const COMPOUND_FID: u64 = u64::MAX;

    /// The file id written on the wire
    #[must_use]
    pub const fn wire_id(self) -> FileId {
        match self {
            Self::Chained => FileId {
                persistent: Self::COMPOUND_FID,
                volatile: Self::COMPOUND_FID,
            },
            Self::Fid(fid) => fid,
        }
    }
}

bitflags! {
    /// Flags of one exchange
    pub struct SendFlags: u32 {
        /// SMB3 transform (encryption) is required
        const TRANSFORM = 0x0000_0001;
    }
}

/// Commands that may appear in a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Create,
    QueryInfo,
    SetInfo,
    Close,
}

impl Command {
    /// The SMB2 command code
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::Create => command::CREATE,
            Self::QueryInfo => command::QUERY_INFO,
            Self::SetInfo => command::SET_INFO,
            Self::Close => command::CLOSE,
        }
    }
}

/// One command of a chain: a fixed body followed by its variable buffers.
/// Every buffer goes back to its pool when the sub-request is dropped.
#[derive(Debug)]
pub struct SubRequest {
    /// command
    command: Command,
    /// body, then variable buffers
    iov: SmallVec<[Buffer; 3]>,
    /// targets the handle of the preceding command
    related: bool,
}

impl SubRequest {
    #[must_use]
    pub const fn command(&self) -> Command {
        self.command
    }

    #[must_use]
    pub const fn is_related(&self) -> bool {
        self.related
    }

    /// Buffers in wire order
    #[must_use]
    pub fn iov(&self) -> &[Buffer] {
        &self.iov
    }

    /// Total size of the body and its buffers
    #[must_use]
    pub fn len(&self) -> usize {
        self.iov.iter().map(|buf| buf.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// CREATE request
    fn open(pool: &BufferPool, params: OpenParams, name: WireName) -> Result<Self> {
        let mut body = pool.acquire(body_size::CREATE_REQ)?;
        let name_len = u16::try_from(name.byte_len()).map_err(|_| Error::NameTooLong {
            len: name.byte_len() / 2,
        })?;
        let name_offset = wire_offset(body_size::CREATE_REQ);
        Encoder::new(&mut body)
            .put_u16(structure_size::CREATE_REQ)
            .put_u8(0) // security flags
            .put_u8(OPLOCK_LEVEL_NONE)
            .put_u32(IMPERSONATION_LEVEL_IMPERSONATION)
            .put_u64(0) // create flags
            .put_u64(0) // reserved
            .put_u32(params.desired_access)
            .put_u32(attr::NORMAL)
            .put_u32(share_access::FILE_SHARE_ALL)
            .put_u32(params.disposition)
            .put_u32(params.create_options)
            .put_u16(name_offset)
            .put_u16(name_len)
            .put_u32(0) // create contexts offset
            .put_u32(0); // create contexts length

        let mut iov = SmallVec::new();
        iov.push(body);
        // the buffer must not be empty, so the trailing null goes on the wire
        iov.push(name.into_buffer());
        Ok(Self {
            command: Command::Create,
            iov,
            related: false,
        })
    }

    /// QUERY_INFO request
    fn query_info(pool: &BufferPool, handle: HandleRef, class: u8, output_len: u32) -> Result<Self> {
        let mut body = pool.acquire(body_size::QUERY_INFO_REQ)?;
        let fid = handle.wire_id();
        Encoder::new(&mut body)
            .put_u16(structure_size::QUERY_INFO_REQ)
            .put_u8(INFO_TYPE_FILE)
            .put_u8(class)
            .put_u32(output_len)
            .put_u16(0) // input buffer offset
            .put_u16(0) // reserved
            .put_u32(0) // input buffer length
            .put_u32(0) // additional information
            .put_u32(0) // flags
            .put_u64(fid.persistent)
            .put_u64(fid.volatile);

        let mut iov = SmallVec::new();
        iov.push(body);
        Ok(Self {
            command: Command::QueryInfo,
            iov,
            related: handle == HandleRef::Chained,
        })
    }

    /// SET_INFO request carrying `data` as its buffer
    fn set_info(
        pool: &BufferPool,
        handle: HandleRef,
        class: u8,
        data: SmallVec<[Buffer; 2]>,
    ) -> Result<Self> {
        let mut body = pool.acquire(body_size::SET_INFO_REQ)?;
        let data_len: usize = data.iter().map(|buf| buf.len()).sum();
        let data_len = u32::try_from(data_len).map_err(|_| Error::ResourceExhausted)?;
        let fid = handle.wire_id();
        Encoder::new(&mut body)
            .put_u16(structure_size::SET_INFO_REQ)
            .put_u8(INFO_TYPE_FILE)
            .put_u8(class)
            .put_u32(data_len)
            .put_u16(wire_offset(body_size::SET_INFO_REQ))
            .put_u16(0) // reserved
            .put_u32(0) // additional information
            .put_u64(fid.persistent)
            .put_u64(fid.volatile);

        let mut iov = SmallVec::new();
        iov.push(body);
        iov.extend(data);
        Ok(Self {
            command: Command::SetInfo,
            iov,
            related: handle == HandleRef::Chained,
        })
    }

    /// CLOSE request
    fn close(pool: &BufferPool, handle: HandleRef) -> Result<Self> {
        let mut body = pool.acquire(body_size::CLOSE_REQ)?;
        let fid = handle.wire_id();
        Encoder::new(&mut body)
            .put_u16(structure_size::CLOSE_REQ)
            .put_u16(0) // flags
            .put_u32(0) // reserved
            .put_u64(fid.persistent)
            .put_u64(fid.volatile);

        let mut iov = SmallVec::new();
        iov.push(body);
        Ok(Self {
            command: Command::Close,
            iov,
            related: handle == HandleRef::Chained,
        })
    }
}

/// Offset of a body's buffer, from the start of the SMB2 header
#[allow(clippy::as_conversions, clippy::cast_possible_truncation)]
const fn wire_offset(body_len: usize) -> u16 {
    (SMB2_HEADER_SIZE + body_len) as u16
}

impl Encode for SubRequest {
    fn collect_bytes<'c, C>(&'c self, container: &mut C)
    where
        C: Extend<IoSlice<'c>>,
    {
        container.extend(self.iov.iter().map(|buf| IoSlice::new(buf)))
    }
}

/// An ordered chain of at most [`MAX_COMPOUND`] sub-requests, sent as one exchange.
/// Only [`Composer::compose`] builds one, so it always starts with an open and ends with a close.
#[derive(Debug)]
pub struct CompoundRequest {
    /// operation
    kind: OperationKind,
    /// chain
    requests: SmallVec<[SubRequest; MAX_COMPOUND]>,
    /// exchange flags
    flags: SendFlags,
}

impl CompoundRequest {
    #[must_use]
    pub(crate) fn new(kind: OperationKind, flags: SendFlags) -> Self {
        Self {
            kind,
            requests: SmallVec::new(),
            flags,
        }
    }

    /// Appends a sub-request and returns the new length
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if the chain is full
    pub(crate) fn push(&mut self, rqst: SubRequest) -> Result<usize> {
        if self.requests.len() >= MAX_COMPOUND {
            return Err(Error::InvalidArgument("compound chain is full"));
        }
        self.requests.push(rqst);
        Ok(self.requests.len())
    }

    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        self.kind
    }

    #[must_use]
    pub const fn flags(&self) -> SendFlags {
        self.flags
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    #[must_use]
    pub fn get(&self, idx: usize) -> Option<&SubRequest> {
        self.requests.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SubRequest> + '_ {
        self.requests.iter()
    }
}

/// Builds compound chains from pooled buffers
#[derive(Debug)]
pub struct Composer<'a> {
    /// request buffers
    pool: &'a BufferPool,
    /// share behaviour
    config: &'a ShareConfig,
}

impl<'a> Composer<'a> {
    #[must_use]
    pub const fn new(pool: &'a BufferPool, config: &'a ShareConfig) -> Self {
        Self { pool, config }
    }

    /// Composes `[Open, (Middle), Close]` for `kind`.
    ///
    /// On failure the sub-requests built so far are dropped, which releases exactly their buffers.
    /// # Errors
    /// + [`Error::ResourceExhausted`] if a buffer can not be acquired
    /// + [`Error::InvalidArgument`] if `payload` does not fit `kind`
    pub fn compose(
        &self,
        path: &str,
        mut open: OpenParams,
        kind: OperationKind,
        payload: Payload,
        flags: SendFlags,
    ) -> Result<CompoundRequest> {
        let name = name::encode_path(path, self.config, self.pool)?;

        if self.config.uses_backup_intent() {
            open.create_options |= create_options::OPEN_BACKUP_INTENT;
        }

        let mut chain = CompoundRequest::new(kind, flags);
        chain.push(SubRequest::open(self.pool, open, name)?)?;

        if let Some(middle) = self.middle(kind, payload)? {
            chain.push(middle)?;
        }

        let num_rqst = chain.push(SubRequest::close(self.pool, HandleRef::Chained)?)?;

        debug!(?kind, path, num_rqst, "composed compound request");
        debug_assert_eq!(num_rqst, kind.sub_request_count());
        Ok(chain)
    }

    /// Builds the sub-request between open and close
    fn middle(&self, kind: OperationKind, payload: Payload) -> Result<Option<SubRequest>> {
        let pool = self.pool;
        let handle = HandleRef::Chained;

        let rqst = match (kind.middle(), payload) {
            (None, Payload::None) => return Ok(None),
            (Some(Middle::QueryInfo(class)), Payload::None) => {
                SubRequest::query_info(pool, handle, class, QUERY_ALL_INFO_OUTPUT_LEN)?
            }
            (Some(Middle::SetInfo(class)), payload) => {
                let data = self.set_info_data(kind, payload)?;
                SubRequest::set_info(pool, handle, class, data)?
            }
            (_, payload) => {
                error!(?kind, ?payload, "invalid command");
                return Err(Error::InvalidArgument("payload does not match operation"));
            }
        };
        Ok(Some(rqst))
    }

    /// Encodes the SET_INFO buffer of `kind`
    fn set_info_data(&self, kind: OperationKind, payload: Payload) -> Result<SmallVec<[Buffer; 2]>> {
        let pool = self.pool;
        let mut data = SmallVec::new();
        match (kind, payload) {
            (OperationKind::Rmdir, Payload::None) => {
                data.push(pool.acquire_copy(&DELETE_PENDING[..1])?);
            }
            (OperationKind::SetEof, Payload::EndOfFile(eof)) => {
                let mut buf = pool.acquire(FILE_EOF_INFO_SIZE)?;
                Encoder::new(&mut buf).put_u64(eof);
                data.push(buf);
            }
            (OperationKind::SetInfo, Payload::Basic(info)) => {
                data.push(pool.acquire_copy(&info.to_bytes())?);
            }
            (OperationKind::Rename, Payload::Target(target))
            | (OperationKind::Hardlink, Payload::Target(target)) => {
                let header = LinkInfoHeader {
                    replace_if_exists: kind == OperationKind::Rename,
                    root_directory: 0,
                    file_name_length: u32::try_from(target.byte_len())
                        .map_err(|_| Error::ResourceExhausted)?,
                };
                data.push(pool.acquire_copy(&header.to_bytes())?);
                data.push(target.into_buffer());
            }
            (kind, payload) => {
                error!(?kind, ?payload, "invalid command");
                return Err(Error::InvalidArgument("payload does not match operation"));
            }
        }
        Ok(data)
    }
}

/// A single QUERY_INFO of `FILE_ALL_INFORMATION` on an open handle
/// # Errors
/// Returns [`Error::ResourceExhausted`]
pub fn query_all_info(pool: &BufferPool, fid: FileId) -> Result<SubRequest> {
    SubRequest::query_info(
        pool,
        HandleRef::Fid(fid),
        crate::proto::info_class::FILE_ALL,
        QUERY_ALL_INFO_OUTPUT_LEN,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::Decoder;
    use crate::info::FileBasicInfo;
    use crate::proto::{info_class, LINK_INFO_HEADER_SIZE};

    fn payload_for(kind: OperationKind, pool: &BufferPool) -> Payload {
        match kind {
            OperationKind::SetEof => Payload::EndOfFile(42),
            OperationKind::SetInfo => Payload::Basic(FileBasicInfo {
                attributes: attr::READONLY,
                ..FileBasicInfo::default()
            }),
            OperationKind::Rename | OperationKind::Hardlink => {
                let config = ShareConfig::default();
                Payload::Target(name::encode_path("dst", &config, pool).unwrap())
            }
            _ => Payload::None,
        }
    }

    fn compose(pool: &BufferPool, kind: OperationKind) -> Result<CompoundRequest> {
        let config = ShareConfig::default();
        let payload = payload_for(kind, pool);
        Composer::new(pool, &config).compose(
            "dir/file",
            kind.open_params(),
            kind,
            payload,
            SendFlags::empty(),
        )
    }

    #[test]
    fn chain_shape() {
        let pool = BufferPool::new(16);
        for &kind in &OperationKind::ALL {
            let chain = compose(&pool, kind).unwrap();
            assert_eq!(chain.len(), kind.sub_request_count(), "{:?}", kind);

            let first = chain.get(0).unwrap();
            assert_eq!(first.command(), Command::Create);
            assert!(!first.is_related());

            let last = chain.get(chain.len() - 1).unwrap();
            assert_eq!(last.command(), Command::Close);
            assert!(chain.iter().skip(1).all(SubRequest::is_related));
        }
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn related_commands_address_the_compound_fid() {
        let pool = BufferPool::new(16);
        let chain = compose(&pool, OperationKind::QueryInfo).unwrap();

        let query = chain.get(1).unwrap();
        let body = &query.iov()[0];
        assert_eq!(body[3], info_class::FILE_ALL);
        assert_eq!(&body[24..40], &[0xFF; 16]);

        let close = chain.get(2).unwrap();
        assert_eq!(&close.iov()[0][8..24], &[0xFF; 16]);
    }

    #[test]
    fn partial_build_releases_exactly_the_prefix() {
        // rmdir: name, open body, disposition, set-info body, close body
        for limit in 0..5 {
            let pool = BufferPool::with_limit(16, limit);
            let ret = compose(&pool, OperationKind::Rmdir);
            assert!(matches!(ret, Err(Error::ResourceExhausted)), "limit = {}", limit);
            assert_eq!(pool.outstanding(), 0, "limit = {}", limit);
            assert_eq!(pool.acquired(), limit, "limit = {}", limit);
        }
        let pool = BufferPool::with_limit(16, 5);
        drop(compose(&pool, OperationKind::Rmdir).unwrap());
        assert_eq!(pool.outstanding(), 0);

        // rename: target, name, open body, link header, set-info body, close body
        for limit in 1..6 {
            let pool = BufferPool::with_limit(16, limit);
            let config = ShareConfig::default();
            let target = name::encode_path("dst", &config, &pool).unwrap();
            let ret = Composer::new(&pool, &config).compose(
                "src",
                OperationKind::Rename.open_params(),
                OperationKind::Rename,
                Payload::Target(target),
                SendFlags::empty(),
            );
            assert!(matches!(ret, Err(Error::ResourceExhausted)), "limit = {}", limit);
            assert_eq!(pool.outstanding(), 0, "limit = {}", limit);
        }
    }

    #[test]
    fn built_chain_releases_every_buffer() {
        let pool = BufferPool::new(16);
        let chain = compose(&pool, OperationKind::SetEof).unwrap();
        // name, open body, set-info body, eof, close body
        assert_eq!(pool.outstanding(), 5);
        assert_eq!(chain.iter().map(|r| r.iov().len()).sum::<usize>(), 5);
        drop(chain);
        assert_eq!(pool.outstanding(), 0);
        assert_eq!(pool.acquired(), 5);
    }

    #[test]
    fn mismatched_payload_stops_after_open() {
        let pool = BufferPool::new(16);
        let config = ShareConfig::default();
        let ret = Composer::new(&pool, &config).compose(
            "a",
            OperationKind::Rename.open_params(),
            OperationKind::Rename,
            Payload::None,
            SendFlags::empty(),
        );
        assert!(matches!(ret, Err(Error::InvalidArgument(_))));
        assert_eq!(pool.acquired(), 2);
        assert_eq!(pool.outstanding(), 0);

        let ret = Composer::new(&pool, &config).compose(
            "a",
            OperationKind::Mkdir.open_params(),
            OperationKind::Mkdir,
            Payload::EndOfFile(1),
            SendFlags::empty(),
        );
        assert!(matches!(ret, Err(Error::InvalidArgument(_))));
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn rename_payload_layout() {
        for &len in &[0_usize, 1, 255] {
            let pool = BufferPool::new(16);
            let config = ShareConfig::default();
            let dst = "n".repeat(len);
            let target = name::encode_path(&dst, &config, &pool).unwrap();
            let chain = Composer::new(&pool, &config)
                .compose(
                    "src",
                    OperationKind::Rename.open_params(),
                    OperationKind::Rename,
                    Payload::Target(target),
                    SendFlags::empty(),
                )
                .unwrap();

            let set_info = chain.get(1).unwrap();
            let iov = set_info.iov();
            assert_eq!(iov.len(), 3);

            let header: LinkInfoHeader = Decoder::new(&iov[1]).decode().unwrap();
            assert!(header.replace_if_exists);
            assert_eq!(header.root_directory, 0);
            assert_eq!(header.file_name_length as usize, 2 * len);

            let name = &iov[2];
            assert_eq!(name.len(), 2 * len + 2);
            assert_eq!(&name[2 * len..], &[0, 0]);

            let buffer_len = u32::from_le_bytes([iov[0][4], iov[0][5], iov[0][6], iov[0][7]]);
            assert_eq!(buffer_len as usize, LINK_INFO_HEADER_SIZE + 2 * len + 2);
        }
    }

    #[test]
    fn hardlink_never_replaces() {
        let pool = BufferPool::new(16);
        let chain = compose(&pool, OperationKind::Hardlink).unwrap();
        let header: LinkInfoHeader = Decoder::new(&chain.get(1).unwrap().iov()[1])
            .decode()
            .unwrap();
        assert!(!header.replace_if_exists);
        assert_eq!(chain.get(1).unwrap().iov()[0][3], info_class::FILE_LINK);
    }

    #[test]
    fn set_eof_payload() {
        let pool = BufferPool::new(16);
        let chain = compose(&pool, OperationKind::SetEof).unwrap();
        let set_info = chain.get(1).unwrap();
        assert_eq!(set_info.iov()[0][3], info_class::FILE_END_OF_FILE);

        let eof = &set_info.iov()[1];
        assert_eq!(eof.len(), FILE_EOF_INFO_SIZE);
        assert_eq!(Decoder::new(eof).all_consuming(Decoder::fetch_u64), Ok(42));
    }

    #[test]
    fn chains_start_full_and_cap_at_three() {
        let pool = BufferPool::new(16);
        for &kind in &OperationKind::ALL {
            let mut chain = compose(&pool, kind).unwrap();
            assert!(chain.len() >= 2, "{:?}", kind);
            let extra = SubRequest::close(&pool, HandleRef::Chained).unwrap();
            if chain.len() == MAX_COMPOUND {
                assert!(matches!(chain.push(extra), Err(Error::InvalidArgument(_))));
            } else {
                assert_eq!(chain.push(extra).unwrap(), MAX_COMPOUND);
            }
        }
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn rmdir_marks_delete_pending() {
        let pool = BufferPool::new(16);
        let chain = compose(&pool, OperationKind::Rmdir).unwrap();
        let set_info = chain.get(1).unwrap();
        assert_eq!(set_info.iov()[0][3], info_class::FILE_DISPOSITION);
        assert_eq!(&*set_info.iov()[1], &[1]);
        assert_eq!(DELETE_PENDING[0], 1);
    }

    #[test]
    fn backup_intent() {
        let pool = BufferPool::new(16);
        let mut config = ShareConfig::default();
        config.backup_intent(true);
        let chain = Composer::new(&pool, &config)
            .compose(
                "a",
                OperationKind::Mkdir.open_params(),
                OperationKind::Mkdir,
                Payload::None,
                SendFlags::TRANSFORM,
            )
            .unwrap();
        let body = &chain.get(0).unwrap().iov()[0];
        let options = u32::from_le_bytes([body[40], body[41], body[42], body[43]]);
        assert_eq!(
            options,
            create_options::NOT_FILE | create_options::OPEN_BACKUP_INTENT
        );
        assert!(chain.flags().contains(SendFlags::TRANSFORM));
    }
}
