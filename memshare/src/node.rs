//! Share node

use smb2_compound::info::{FileAllInfo, FileBasicInfo};
use smb2_compound::proto::attr;

use std::convert::TryFrom;
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds between 1601-01-01 and 1970-01-01
const NT_EPOCH_OFFSET: u64 = 11_644_473_600;

/// Allocation unit reported in `AllocationSize`
const CLUSTER_SIZE: u64 = 4096;

/// Converts a system time into 100ns intervals since 1601
pub fn nt_time(time: SystemTime) -> i64 {
    let since_unix = time.duration_since(UNIX_EPOCH).unwrap_or_default();
    let ticks = u128::from(since_unix.as_secs().wrapping_add(NT_EPOCH_OFFSET))
        .wrapping_mul(10_000_000)
        .wrapping_add(u128::from(since_unix.subsec_nanos() / 100));
    i64::try_from(ticks).unwrap_or(i64::MAX)
}

/// Node kind, as seen by tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Directory,
    Regular,
    SymLink,
}

/// Node data
pub enum NodeData {
    /// Directory, its entries are the names below its own
    Directory,
    /// Regular file
    Regular(Vec<u8>),
    /// Symbolic link (reparse point)
    SymLink(String),
}

/// Share node, reachable by one or more names
pub struct Node {
    /// i-number
    pub ino: u64,

    /// number of names
    pub nlink: u32,

    /// timestamps and attributes
    pub basic: FileBasicInfo,

    /// removed when the handle that asked for it closes
    pub delete_pending: bool,

    /// data
    pub data: NodeData,
}

impl Node {
    pub fn new(ino: u64, data: NodeData, now: i64) -> Self {
        let attributes = match data {
            NodeData::Directory => attr::DIRECTORY,
            NodeData::Regular(_) => attr::ARCHIVE,
            NodeData::SymLink(_) => attr::ARCHIVE | attr::REPARSE_POINT,
        };
        Self {
            ino,
            nlink: 1,
            basic: FileBasicInfo {
                creation_time: now,
                last_access_time: now,
                last_write_time: now,
                change_time: now,
                attributes,
            },
            delete_pending: false,
            data,
        }
    }

    pub const fn kind(&self) -> NodeKind {
        match self.data {
            NodeData::Directory => NodeKind::Directory,
            NodeData::Regular(_) => NodeKind::Regular,
            NodeData::SymLink(_) => NodeKind::SymLink,
        }
    }

    pub const fn is_dir(&self) -> bool {
        matches!(self.data, NodeData::Directory)
    }

    pub fn size(&self) -> u64 {
        match self.data {
            NodeData::Directory => 0,
            NodeData::Regular(ref bytes) => u64::try_from(bytes.len()).unwrap_or(u64::MAX),
            NodeData::SymLink(ref target) => u64::try_from(target.len()).unwrap_or(u64::MAX),
        }
    }

    /// Applies the non-zero fields of `info`
    pub fn apply_basic(&mut self, info: &FileBasicInfo, now: i64) {
        fn update(dst: &mut i64, src: i64) {
            if src != 0 {
                *dst = src;
            }
        }

        let basic = &mut self.basic;
        update(&mut basic.creation_time, info.creation_time);
        update(&mut basic.last_access_time, info.last_access_time);
        update(&mut basic.last_write_time, info.last_write_time);
        update(&mut basic.change_time, info.change_time);
        if info.attributes != 0 {
            let kind_bits = basic.attributes & (attr::DIRECTORY | attr::REPARSE_POINT);
            basic.attributes = (info.attributes & !attr::NORMAL) | kind_bits;
        }
        if info.change_time == 0 {
            basic.change_time = now;
        }
    }

    /// Truncates or extends a regular file
    pub fn set_len(&mut self, len: usize, now: i64) -> bool {
        match self.data {
            NodeData::Regular(ref mut bytes) => {
                bytes.resize(len, 0);
                self.basic.last_write_time = now;
                self.basic.change_time = now;
                true
            }
            NodeData::Directory | NodeData::SymLink(_) => false,
        }
    }

    /// `FILE_ALL_INFORMATION` of the node opened by `name`
    pub fn all_info(&self, name: &str) -> FileAllInfo {
        let size = self.size();
        let allocated = (size.wrapping_add(CLUSTER_SIZE - 1) / CLUSTER_SIZE).wrapping_mul(CLUSTER_SIZE);
        let mut file_name: Vec<u16> = vec![u16::from(b'\\')];
        file_name.extend(name.encode_utf16());
        FileAllInfo {
            basic: self.basic,
            allocation_size: i64::try_from(allocated).unwrap_or(i64::MAX),
            end_of_file: i64::try_from(size).unwrap_or(i64::MAX),
            number_of_links: self.nlink,
            delete_pending: self.delete_pending,
            directory: self.is_dir(),
            index_number: self.ino,
            file_name,
            ..FileAllInfo::default()
        }
    }
}
