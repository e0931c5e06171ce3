use crate::conn::{self, Message, Session};
use crate::node::{self, Node, NodeData, NodeKind};

use smb2_compound::header::Smb2Header;
use smb2_compound::info::{FileBasicInfo, LinkInfoHeader};
use smb2_compound::proto::{
    access, attr, body_size, command, create_options, disposition, header_flags, info_class,
    structure_size, FILE_ALL_INFO_SIZE, INFO_TYPE_FILE, LINK_INFO_HEADER_SIZE, SMB2_HEADER_SIZE,
};
use smb2_compound::{
    BufferPool, CompoundRequest, Decoder, Encoder, FileId, HandleRef, NtStatus, ResponseBuffer,
    Responses, SendFlags, SubRequest, Transport,
};

use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicIsize, AtomicU64, AtomicUsize, Ordering};
use std::time::SystemTime;

use futures::lock::Mutex;
use tracing::{debug, trace, warn};

/// Handle of the share root, kept open by the share itself
pub const ROOT_FID: FileId = FileId {
    persistent: 1,
    volatile: 1,
};

const ROOT_INO: u64 = 1;

/// Response buffers kept for reuse
const DEFAULT_POOL_CAPACITY: usize = 16;

/// Body of a CREATE response, without create contexts
const CREATE_RSP_SIZE: usize = 88;
/// Offset of the file id in a CREATE response body
const CREATE_RSP_FID_OFFSET: usize = 64;
/// Body of a CLOSE response
const CLOSE_RSP_SIZE: usize = 60;
/// Body of a SET_INFO response
const SET_INFO_RSP_SIZE: usize = 2;

type Reply = Result<Vec<u8>, NtStatus>;

/// An open of a node through one of its names
struct Handle {
    ino: u64,
    name: String,
    access: u32,
    delete_on_close: bool,
}

/// Share tree
struct State {
    /// wire names (`\`-separated, no leading separator), root is ""
    names: BTreeMap<String, u64>,
    nodes: BTreeMap<u64, Node>,
    /// open handles by volatile id
    handles: BTreeMap<u64, Handle>,
    next_ino: u64,
    next_volatile: u64,
}

/// Parent of a wire name, `None` for the root
fn parent_of(name: &str) -> Option<&str> {
    if name.is_empty() {
        return None;
    }
    Some(name.rfind('\\').map_or("", |pos| &name[..pos]))
}

fn to_wire_name(path: &str) -> String {
    path.trim_start_matches('/').replace('/', "\\")
}

macro_rules! fetch {
    ($de:expr) => {
        $de.map_err(|_| NtStatus::INVALID_PARAMETER)?
    };
}

impl State {
    fn new(now: i64) -> Self {
        let mut state = Self {
            names: BTreeMap::new(),
            nodes: BTreeMap::new(),
            handles: BTreeMap::new(),
            next_ino: ROOT_INO,
            next_volatile: ROOT_FID.volatile.wrapping_add(1),
        };
        let root = state.insert_node(NodeData::Directory, now);
        let _ = state.names.insert(String::new(), root);
        let _ = state.handles.insert(
            ROOT_FID.volatile,
            Handle {
                ino: root,
                name: String::new(),
                access: access::FILE_READ_ATTRIBUTES,
                delete_on_close: false,
            },
        );
        state
    }

    fn insert_node(&mut self, data: NodeData, now: i64) -> u64 {
        let ino = self.next_ino;
        self.next_ino = ino.wrapping_add(1);
        let _ = self.nodes.insert(ino, Node::new(ino, data, now));
        ino
    }

    fn lookup(&self, name: &str) -> Option<&Node> {
        self.names.get(name).and_then(|ino| self.nodes.get(ino))
    }

    fn has_children(&self, name: &str) -> bool {
        if name.is_empty() {
            return self.names.len() > 1;
        }
        let prefix = format!("{}\\", name);
        self.names
            .range(prefix.clone()..)
            .next()
            .map_or(false, |(child, _)| child.starts_with(&prefix))
    }

    /// The parent of `name` must be an existing directory
    fn check_parent(&self, name: &str) -> Result<(), NtStatus> {
        let parent = parent_of(name).ok_or(NtStatus::OBJECT_NAME_COLLISION)?;
        match self.lookup(parent) {
            Some(node) if node.is_dir() => Ok(()),
            _ => Err(NtStatus::OBJECT_PATH_NOT_FOUND),
        }
    }

    /// Removes one name, and the node with its last name
    fn unlink(&mut self, name: &str) {
        let ino = match self.names.remove(name) {
            Some(ino) => ino,
            None => return,
        };
        let gone = match self.nodes.get_mut(&ino) {
            Some(node) => {
                node.nlink = node.nlink.saturating_sub(1);
                node.delete_pending = false;
                node.nlink == 0
            }
            None => false,
        };
        if gone {
            let _ = self.nodes.remove(&ino);
        }
        debug!(name, ino, gone, "unlinked");
    }

    fn add(&mut self, path: &str, data: NodeData, now: i64) -> Result<u64, NtStatus> {
        let name = to_wire_name(path);
        if self.names.contains_key(&name) {
            return Err(NtStatus::OBJECT_NAME_COLLISION);
        }
        self.check_parent(&name)?;
        let ino = self.insert_node(data, now);
        let _ = self.names.insert(name, ino);
        Ok(ino)
    }

    /// Answers every message of a chain in order
    fn execute(&mut self, messages: &[Message<'_>], now: i64) -> Vec<Vec<u8>> {
        let mut chained: Result<u64, NtStatus> = Err(NtStatus::INVALID_HANDLE);
        let mut replies = Vec::with_capacity(messages.len());

        for msg in messages {
            let header = &msg.header;
            let related = header.is_related();
            let reply = if related && header.command != command::CREATE {
                match chained {
                    Ok(volatile) => self.dispatch(msg, Some(volatile), now),
                    // a failed open fails the commands chained to it
                    Err(status) => Err(status),
                }
            } else {
                self.dispatch(msg, None, now)
            };

            if header.command == command::CREATE {
                chained = match reply {
                    Ok(ref body) => opened_handle(body),
                    Err(status) => Err(status),
                };
            }

            let (status, body) = match reply {
                Ok(body) => (NtStatus::SUCCESS, body),
                Err(status) => (status, error_body()),
            };
            trace!(command = header.command, %status);
            replies.push(response(header, status, &body));
        }
        replies
    }

    fn dispatch(&mut self, msg: &Message<'_>, chained: Option<u64>, now: i64) -> Reply {
        match msg.header.command {
            command::CREATE => self.create(msg.bytes, now),
            command::QUERY_INFO => self.query_info(msg.bytes, chained),
            command::SET_INFO => self.set_info(msg.bytes, chained, now),
            command::CLOSE => self.close(msg.bytes, chained),
            _ => Err(NtStatus::NOT_SUPPORTED),
        }
    }

    /// Resolves the volatile id addressed by a body
    fn resolve(&self, fid: FileId, chained: Option<u64>) -> Result<u64, NtStatus> {
        let volatile = if fid.volatile == HandleRef::COMPOUND_FID {
            chained.ok_or(NtStatus::INVALID_PARAMETER)?
        } else {
            fid.volatile
        };
        if self.handles.contains_key(&volatile) {
            Ok(volatile)
        } else {
            Err(NtStatus::FILE_CLOSED)
        }
    }

    fn create(&mut self, bytes: &[u8], now: i64) -> Reply {
        let mut de = Decoder::new(bytes);
        fetch!(de.skip(SMB2_HEADER_SIZE));
        if fetch!(de.fetch_u16()) != structure_size::CREATE_REQ {
            return Err(NtStatus::INVALID_PARAMETER);
        }
        fetch!(de.skip(22));
        let desired_access = fetch!(de.fetch_u32());
        let _file_attributes = fetch!(de.fetch_u32());
        let _share_access = fetch!(de.fetch_u32());
        let create_disposition = fetch!(de.fetch_u32());
        let options = fetch!(de.fetch_u32());
        let name_offset = usize::from(fetch!(de.fetch_u16()));
        let name_len = usize::from(fetch!(de.fetch_u16()));

        let name = decode_name(bytes, name_offset, name_len)?;
        debug!(%name, desired_access, create_disposition, options, "create");

        let ino = match self.names.get(&name).copied() {
            Some(ino) => {
                if create_disposition == disposition::FILE_CREATE {
                    return Err(NtStatus::OBJECT_NAME_COLLISION);
                }
                let node = self.nodes.get(&ino).ok_or(NtStatus::OBJECT_NAME_NOT_FOUND)?;
                if node.delete_pending {
                    return Err(NtStatus::DELETE_PENDING);
                }
                if node.kind() == NodeKind::SymLink
                    && options & create_options::OPEN_REPARSE_POINT == 0
                {
                    return Err(NtStatus::STOPPED_ON_SYMLINK);
                }
                if options & create_options::NOT_FILE != 0 && !node.is_dir() {
                    return Err(NtStatus::NOT_A_DIRECTORY);
                }
                ino
            }
            None => {
                self.check_parent(&name)?;
                if create_disposition != disposition::FILE_CREATE {
                    return Err(NtStatus::OBJECT_NAME_NOT_FOUND);
                }
                let data = if options & create_options::NOT_FILE == 0 {
                    NodeData::Regular(Vec::new())
                } else {
                    NodeData::Directory
                };
                let ino = self.insert_node(data, now);
                let _ = self.names.insert(name.clone(), ino);
                ino
            }
        };

        let delete_on_close = options & create_options::DELETE_ON_CLOSE != 0;
        if delete_on_close {
            self.check_deletable(&name, desired_access)?;
            let is_dir = self.lookup(&name).map_or(false, Node::is_dir);
            if is_dir && options & create_options::NOT_FILE == 0 {
                return Err(NtStatus::FILE_IS_A_DIRECTORY);
            }
        }

        let volatile = self.next_volatile;
        self.next_volatile = volatile.wrapping_add(1);
        let _ = self.handles.insert(
            volatile,
            Handle {
                ino,
                name,
                access: desired_access,
                delete_on_close,
            },
        );

        let node = self.nodes.get(&ino).ok_or(NtStatus::OBJECT_NAME_NOT_FOUND)?;
        let size = i64::try_from(node.size()).unwrap_or(i64::MAX);
        let mut body = vec![0; CREATE_RSP_SIZE];
        let _ = Encoder::new(&mut body)
            .put_u16(structure_size::CREATE_RSP)
            .put_u8(0) // oplock level
            .put_u8(0) // flags
            .put_u32(1) // create action
            .put_i64(node.basic.creation_time)
            .put_i64(node.basic.last_access_time)
            .put_i64(node.basic.last_write_time)
            .put_i64(node.basic.change_time)
            .put_i64(size)
            .put_i64(size)
            .put_u32(node.basic.attributes)
            .put_u32(0) // reserved
            .put_u64(volatile)
            .put_u64(volatile);
        Ok(body)
    }

    /// Whether the handle may mark `name` for deletion
    fn check_deletable(&self, name: &str, desired_access: u32) -> Result<(), NtStatus> {
        if desired_access & access::DELETE == 0 {
            return Err(NtStatus::ACCESS_DENIED);
        }
        if name.is_empty() {
            return Err(NtStatus::CANNOT_DELETE);
        }
        let node = self.lookup(name).ok_or(NtStatus::OBJECT_NAME_NOT_FOUND)?;
        if !node.is_dir() && node.basic.attributes & attr::READONLY != 0 {
            return Err(NtStatus::CANNOT_DELETE);
        }
        if node.is_dir() && self.has_children(name) {
            return Err(NtStatus::DIRECTORY_NOT_EMPTY);
        }
        Ok(())
    }

    fn query_info(&self, bytes: &[u8], chained: Option<u64>) -> Reply {
        let mut de = Decoder::new(bytes);
        fetch!(de.skip(SMB2_HEADER_SIZE));
        if fetch!(de.fetch_u16()) != structure_size::QUERY_INFO_REQ {
            return Err(NtStatus::INVALID_PARAMETER);
        }
        let info_type = fetch!(de.fetch_u8());
        let class = fetch!(de.fetch_u8());
        let output_len = usize::try_from(fetch!(de.fetch_u32())).unwrap_or(usize::MAX);
        fetch!(de.skip(16));
        let fid = FileId {
            persistent: fetch!(de.fetch_u64()),
            volatile: fetch!(de.fetch_u64()),
        };

        let volatile = self.resolve(fid, chained)?;
        if info_type != INFO_TYPE_FILE || class != info_class::FILE_ALL {
            return Err(NtStatus::INVALID_PARAMETER);
        }
        if output_len < FILE_ALL_INFO_SIZE {
            return Err(NtStatus::BUFFER_OVERFLOW);
        }

        let handle = self.handles.get(&volatile).ok_or(NtStatus::FILE_CLOSED)?;
        let node = self.nodes.get(&handle.ino).ok_or(NtStatus::FILE_CLOSED)?;
        let info = node.all_info(&handle.name).to_bytes();

        let mut body = vec![0; body_size::QUERY_INFO_RSP];
        let offset = SMB2_HEADER_SIZE.wrapping_add(body_size::QUERY_INFO_RSP);
        let _ = Encoder::new(&mut body)
            .put_u16(structure_size::QUERY_INFO_RSP)
            .put_u16(u16::try_from(offset).unwrap_or(u16::MAX))
            .put_u32(u32::try_from(info.len()).unwrap_or(u32::MAX));
        body.extend_from_slice(&info);
        Ok(body)
    }

    fn set_info(&mut self, bytes: &[u8], chained: Option<u64>, now: i64) -> Reply {
        let mut de = Decoder::new(bytes);
        fetch!(de.skip(SMB2_HEADER_SIZE));
        if fetch!(de.fetch_u16()) != structure_size::SET_INFO_REQ {
            return Err(NtStatus::INVALID_PARAMETER);
        }
        let info_type = fetch!(de.fetch_u8());
        let class = fetch!(de.fetch_u8());
        let buffer_len = usize::try_from(fetch!(de.fetch_u32())).unwrap_or(usize::MAX);
        let buffer_offset = usize::from(fetch!(de.fetch_u16()));
        fetch!(de.skip(6));
        let fid = FileId {
            persistent: fetch!(de.fetch_u64()),
            volatile: fetch!(de.fetch_u64()),
        };

        let volatile = self.resolve(fid, chained)?;
        if info_type != INFO_TYPE_FILE {
            return Err(NtStatus::INVALID_PARAMETER);
        }
        let buffer = buffer_offset
            .checked_add(buffer_len)
            .and_then(|end| bytes.get(buffer_offset..end))
            .ok_or(NtStatus::INVALID_PARAMETER)?;

        debug!(volatile, class, len = buffer.len(), "set info");
        match class {
            info_class::FILE_BASIC => self.set_basic(volatile, buffer, now)?,
            info_class::FILE_DISPOSITION => self.set_disposition(volatile, buffer)?,
            info_class::FILE_END_OF_FILE => self.set_eof(volatile, buffer, now)?,
            info_class::FILE_RENAME => self.set_link(volatile, buffer, true)?,
            info_class::FILE_LINK => self.set_link(volatile, buffer, false)?,
            _ => return Err(NtStatus::INVALID_PARAMETER),
        }

        let mut body = vec![0; SET_INFO_RSP_SIZE];
        let _ = Encoder::new(&mut body).put_u16(structure_size::SET_INFO_RSP);
        Ok(body)
    }

    fn handle(&self, volatile: u64) -> Result<&Handle, NtStatus> {
        self.handles.get(&volatile).ok_or(NtStatus::FILE_CLOSED)
    }

    fn node_mut(&mut self, volatile: u64) -> Result<&mut Node, NtStatus> {
        let ino = self.handle(volatile)?.ino;
        self.nodes.get_mut(&ino).ok_or(NtStatus::FILE_CLOSED)
    }

    fn set_basic(&mut self, volatile: u64, buffer: &[u8], now: i64) -> Result<(), NtStatus> {
        if self.handle(volatile)?.access & access::FILE_WRITE_ATTRIBUTES == 0 {
            return Err(NtStatus::ACCESS_DENIED);
        }
        let info: FileBasicInfo = fetch!(Decoder::new(buffer).all_consuming(|de| de.decode()));
        self.node_mut(volatile)?.apply_basic(&info, now);
        Ok(())
    }

    fn set_disposition(&mut self, volatile: u64, buffer: &[u8]) -> Result<(), NtStatus> {
        let pending = *buffer.first().ok_or(NtStatus::INVALID_PARAMETER)? != 0;
        if pending {
            let handle = self.handle(volatile)?;
            self.check_deletable(&handle.name, handle.access)?;
        }
        self.node_mut(volatile)?.delete_pending = pending;
        if let Some(handle) = self.handles.get_mut(&volatile) {
            handle.delete_on_close = pending;
        }
        Ok(())
    }

    fn set_eof(&mut self, volatile: u64, buffer: &[u8], now: i64) -> Result<(), NtStatus> {
        if self.handle(volatile)?.access & access::FILE_WRITE_DATA == 0 {
            return Err(NtStatus::ACCESS_DENIED);
        }
        let eof = fetch!(Decoder::new(buffer).all_consuming(Decoder::fetch_u64));
        let len = usize::try_from(eof).map_err(|_| NtStatus::DISK_FULL)?;
        let node = self.node_mut(volatile)?;
        if node.is_dir() {
            return Err(NtStatus::FILE_IS_A_DIRECTORY);
        }
        if !node.set_len(len, now) {
            return Err(NtStatus::INVALID_PARAMETER);
        }
        Ok(())
    }

    /// Renames the target of the handle, or gives it one more name
    fn set_link(&mut self, volatile: u64, buffer: &[u8], rename: bool) -> Result<(), NtStatus> {
        let mut de = Decoder::new(buffer);
        let header: LinkInfoHeader = fetch!(de.decode());
        debug_assert_eq!(buffer.len().saturating_sub(de.remaining()), LINK_INFO_HEADER_SIZE);
        let name_len = usize::try_from(header.file_name_length).unwrap_or(usize::MAX);
        let target = decode_name(buffer, LINK_INFO_HEADER_SIZE, name_len)?;

        let (source, ino, handle_access) = {
            let handle = self.handle(volatile)?;
            (handle.name.clone(), handle.ino, handle.access)
        };
        if rename && handle_access & access::DELETE == 0 {
            return Err(NtStatus::ACCESS_DENIED);
        }
        if source.is_empty() {
            return Err(NtStatus::ACCESS_DENIED);
        }
        if target == source {
            return Ok(());
        }
        let is_dir = self.nodes.get(&ino).map_or(false, Node::is_dir);
        if !rename && is_dir {
            return Err(NtStatus::FILE_IS_A_DIRECTORY);
        }
        if target.is_empty() || target.starts_with(&format!("{}\\", source)) {
            return Err(NtStatus::INVALID_PARAMETER);
        }
        self.check_parent(&target)?;

        if let Some(existing) = self.lookup(&target) {
            if !header.replace_if_exists {
                return Err(NtStatus::OBJECT_NAME_COLLISION);
            }
            if existing.is_dir() {
                return Err(NtStatus::ACCESS_DENIED);
            }
            if existing.ino != ino {
                self.unlink(&target);
            }
        }

        if rename {
            self.move_names(&source, &target);
            if let Some(handle) = self.handles.get_mut(&volatile) {
                handle.name = target;
            }
        } else {
            let _ = self.names.insert(target, ino);
            if let Some(node) = self.nodes.get_mut(&ino) {
                node.nlink = node.nlink.saturating_add(1);
            }
        }
        Ok(())
    }

    /// Moves `source` and every name below it under `target`
    fn move_names(&mut self, source: &str, target: &str) {
        let prefix = format!("{}\\", source);
        let moved: Vec<String> = self
            .names
            .keys()
            .filter(|name| *name == source || name.starts_with(&prefix))
            .cloned()
            .collect();
        for old in moved {
            if let Some(ino) = self.names.remove(&old) {
                let new = format!("{}{}", target, &old[source.len()..]);
                let _ = self.names.insert(new, ino);
            }
        }
        debug!(source, target, "renamed");
    }

    fn close(&mut self, bytes: &[u8], chained: Option<u64>) -> Reply {
        let mut de = Decoder::new(bytes);
        fetch!(de.skip(SMB2_HEADER_SIZE));
        if fetch!(de.fetch_u16()) != structure_size::CLOSE_REQ {
            return Err(NtStatus::INVALID_PARAMETER);
        }
        fetch!(de.skip(6));
        let fid = FileId {
            persistent: fetch!(de.fetch_u64()),
            volatile: fetch!(de.fetch_u64()),
        };

        let volatile = self.resolve(fid, chained)?;
        if volatile == ROOT_FID.volatile {
            return Err(NtStatus::INVALID_HANDLE);
        }
        let handle = self
            .handles
            .remove(&volatile)
            .ok_or(NtStatus::FILE_CLOSED)?;
        if handle.delete_on_close {
            self.unlink(&handle.name);
        }

        let mut body = vec![0; CLOSE_RSP_SIZE];
        let _ = Encoder::new(&mut body).put_u16(structure_size::CLOSE_RSP);
        Ok(body)
    }
}

/// The volatile id of a CREATE response
fn opened_handle(body: &[u8]) -> Result<u64, NtStatus> {
    let mut de = Decoder::new(body);
    fetch!(de.skip(CREATE_RSP_FID_OFFSET));
    let _persistent = fetch!(de.fetch_u64());
    Ok(fetch!(de.fetch_u64()))
}

/// Decodes a UTF-16LE name of `len` bytes at `offset`
fn decode_name(bytes: &[u8], offset: usize, len: usize) -> Result<String, NtStatus> {
    if len % 2 != 0 {
        return Err(NtStatus::OBJECT_NAME_INVALID);
    }
    let raw = offset
        .checked_add(len)
        .and_then(|end| bytes.get(offset..end))
        .ok_or(NtStatus::INVALID_PARAMETER)?;
    let units = fetch!(Decoder::new(raw).fetch_utf16(len / 2));
    String::from_utf16(&units).map_err(|_| NtStatus::OBJECT_NAME_INVALID)
}

fn error_body() -> Vec<u8> {
    let mut body = vec![0; body_size::ERROR_RSP];
    let _ = Encoder::new(&mut body).put_u16(structure_size::ERROR_RSP);
    body
}

/// A response message answering `rqst`
fn response(rqst: &Smb2Header, status: NtStatus, body: &[u8]) -> Vec<u8> {
    let header = Smb2Header {
        credit_charge: rqst.credit_charge,
        status,
        command: rqst.command,
        credit_request: rqst.credit_request,
        flags: header_flags::SERVER_TO_REDIR | (rqst.flags & header_flags::RELATED_OPERATIONS),
        next_command: 0,
        message_id: rqst.message_id,
        tree_id: rqst.tree_id,
        session_id: rqst.session_id,
    };
    let mut buf = Vec::with_capacity(SMB2_HEADER_SIZE.wrapping_add(body.len()));
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(body);
    buf
}

/// Exchange counters
#[derive(Default)]
struct Counters {
    compound: AtomicUsize,
    direct: AtomicUsize,
    encrypted: AtomicUsize,
    root_refs: AtomicIsize,
    link_refs: AtomicIsize,
    links_taken: AtomicUsize,
}

/// A snapshot of the exchange counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// chains received
    pub compound_exchanges: usize,
    /// single requests received
    pub direct_exchanges: usize,
    /// exchanges sent with the transform flag
    pub encrypted_exchanges: usize,
    /// cached root references not yet dropped
    pub root_refs: isize,
    /// tree connection references not yet dropped
    pub link_refs: isize,
    /// tree connection references ever taken
    pub links_taken: usize,
}

/// An in-memory share behind the [`Transport`] interface
pub struct MemShare {
    state: Mutex<State>,
    pool: BufferPool,
    session: Session,
    next_message_id: AtomicU64,
    counters: Counters,
    root_handle_cache: AtomicBool,
    encryption: bool,
    fail_next: AtomicBool,
}

/// Builder of [`MemShare`]
#[derive(Debug)]
pub struct MemShareBuilder {
    pool_capacity: usize,
    root_handle_cache: bool,
    encryption: bool,
    session: Session,
}

impl Default for MemShareBuilder {
    fn default() -> Self {
        Self {
            pool_capacity: DEFAULT_POOL_CAPACITY,
            root_handle_cache: true,
            encryption: false,
            session: Session {
                session_id: 1,
                tree_id: 1,
            },
        }
    }
}

impl MemShareBuilder {
    pub fn pool_capacity(&mut self, cap: usize) -> &mut Self {
        self.pool_capacity = cap;
        self
    }

    /// Whether the root handle is offered to clients
    pub fn root_handle_cache(&mut self, enabled: bool) -> &mut Self {
        self.root_handle_cache = enabled;
        self
    }

    /// Whether the session requires encryption
    pub fn encryption(&mut self, required: bool) -> &mut Self {
        self.encryption = required;
        self
    }

    pub fn session(&mut self, session: Session) -> &mut Self {
        self.session = session;
        self
    }

    pub fn build(&self) -> MemShare {
        MemShare {
            state: Mutex::new(State::new(node::nt_time(SystemTime::now()))),
            pool: BufferPool::new(self.pool_capacity),
            session: self.session,
            next_message_id: AtomicU64::new(1),
            counters: Counters::default(),
            root_handle_cache: AtomicBool::new(self.root_handle_cache),
            encryption: self.encryption,
            fail_next: AtomicBool::new(false),
        }
    }
}

impl Default for MemShare {
    fn default() -> Self {
        Self::new()
    }
}

impl MemShare {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> MemShareBuilder {
        MemShareBuilder::default()
    }

    pub fn stats(&self) -> Stats {
        let c = &self.counters;
        Stats {
            compound_exchanges: c.compound.load(Ordering::SeqCst),
            direct_exchanges: c.direct.load(Ordering::SeqCst),
            encrypted_exchanges: c.encrypted.load(Ordering::SeqCst),
            root_refs: c.root_refs.load(Ordering::SeqCst),
            link_refs: c.link_refs.load(Ordering::SeqCst),
            links_taken: c.links_taken.load(Ordering::SeqCst),
        }
    }

    /// Response buffers not yet returned by clients
    pub fn outstanding_responses(&self) -> usize {
        self.pool.outstanding()
    }

    pub fn set_root_handle_cache(&self, enabled: bool) {
        self.root_handle_cache.store(enabled, Ordering::SeqCst);
    }

    /// Makes the next exchange fail before it reaches the share
    pub fn inject_transport_error(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Number of open handles, the root handle excluded
    pub async fn open_handles(&self) -> usize {
        self.state.lock().await.handles.len().saturating_sub(1)
    }

    pub async fn add_dir(&self, path: &str) -> Result<(), NtStatus> {
        let now = node::nt_time(SystemTime::now());
        self.state
            .lock()
            .await
            .add(path, NodeData::Directory, now)
            .map(drop)
    }

    pub async fn add_file(&self, path: &str, contents: &[u8]) -> Result<(), NtStatus> {
        let now = node::nt_time(SystemTime::now());
        self.state
            .lock()
            .await
            .add(path, NodeData::Regular(contents.to_vec()), now)
            .map(drop)
    }

    pub async fn add_symlink(&self, path: &str, target: &str) -> Result<(), NtStatus> {
        let now = node::nt_time(SystemTime::now());
        self.state
            .lock()
            .await
            .add(path, NodeData::SymLink(target.to_owned()), now)
            .map(drop)
    }

    /// Kind of the node named by a local `/`-separated path
    pub async fn kind_of(&self, path: &str) -> Option<NodeKind> {
        let state = self.state.lock().await;
        state.lookup(&to_wire_name(path)).map(Node::kind)
    }

    pub async fn size_of(&self, path: &str) -> Option<u64> {
        let state = self.state.lock().await;
        state.lookup(&to_wire_name(path)).map(Node::size)
    }

    pub async fn attributes_of(&self, path: &str) -> Option<u32> {
        let state = self.state.lock().await;
        state
            .lookup(&to_wire_name(path))
            .map(|node| node.basic.attributes)
    }

    pub async fn basic_info_of(&self, path: &str) -> Option<FileBasicInfo> {
        let state = self.state.lock().await;
        state.lookup(&to_wire_name(path)).map(|node| node.basic)
    }

    pub async fn nlink_of(&self, path: &str) -> Option<u32> {
        let state = self.state.lock().await;
        state.lookup(&to_wire_name(path)).map(|node| node.nlink)
    }

    /// Every name in the share, in wire form, the root excluded
    pub async fn names(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .names
            .keys()
            .filter(|name| !name.is_empty())
            .cloned()
            .collect()
    }

    fn take_injected_failure(&self) -> io::Result<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            warn!("injected transport failure");
            return Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "injected transport failure",
            ));
        }
        Ok(())
    }

    /// Frames the requests, answers them and wraps every response
    async fn exchange(&self, rqsts: &[&SubRequest]) -> io::Result<Vec<ResponseBuffer>> {
        let count = u64::try_from(rqsts.len()).unwrap_or(u64::MAX);
        let first = self.next_message_id.fetch_add(count, Ordering::SeqCst);
        let frame = conn::frame_requests(rqsts, self.session, first)?;
        let messages = conn::split_frame(&frame)?;

        let replies = {
            let now = node::nt_time(SystemTime::now());
            let mut state = self.state.lock().await;
            state.execute(&messages, now)
        };

        Ok(replies
            .into_iter()
            .map(|reply| match self.pool.acquire_copy(&reply) {
                Ok(buf) => ResponseBuffer::Pooled(buf),
                Err(_) => ResponseBuffer::Heap(reply),
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl Transport for MemShare {
    async fn send_compound(&self, chain: &CompoundRequest) -> io::Result<Responses> {
        self.take_injected_failure()?;
        let _ = self.counters.compound.fetch_add(1, Ordering::SeqCst);
        if chain.flags().contains(SendFlags::TRANSFORM) {
            let _ = self.counters.encrypted.fetch_add(1, Ordering::SeqCst);
        }
        debug!(kind = ?chain.kind(), len = chain.len(), "compound exchange");

        let rqsts: Vec<&SubRequest> = chain.iter().collect();
        let mut responses = Responses::new();
        for (idx, buf) in self.exchange(&rqsts).await?.into_iter().enumerate() {
            responses.set(idx, buf);
        }
        Ok(responses)
    }

    async fn send(&self, rqst: &SubRequest) -> io::Result<ResponseBuffer> {
        self.take_injected_failure()?;
        let _ = self.counters.direct.fetch_add(1, Ordering::SeqCst);
        debug!(command = ?rqst.command(), "direct exchange");

        let mut responses = self.exchange(&[rqst]).await?;
        Ok(responses.pop().unwrap_or_default())
    }

    fn encryption_required(&self) -> bool {
        self.encryption
    }

    fn open_cached_root(&self) -> Option<FileId> {
        if !self.root_handle_cache.load(Ordering::SeqCst) {
            return None;
        }
        let _ = self.counters.root_refs.fetch_add(1, Ordering::SeqCst);
        Some(ROOT_FID)
    }

    fn close_cached_root(&self) {
        let _ = self.counters.root_refs.fetch_sub(1, Ordering::SeqCst);
    }

    fn acquire_link(&self) -> smb2_compound::Result<()> {
        let _ = self.counters.links_taken.fetch_add(1, Ordering::SeqCst);
        let _ = self.counters.link_refs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release_link(&self) {
        let _ = self.counters.link_refs.fetch_sub(1, Ordering::SeqCst);
    }
}
