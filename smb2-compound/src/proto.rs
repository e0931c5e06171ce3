//! SMB2 wire constants
//!
//! # Source
//!
//! [MS-SMB2]: <https://docs.microsoft.com/en-us/openspecs/windows_protocols/ms-smb2>
//!
//! [MS-FSCC]: <https://docs.microsoft.com/en-us/openspecs/windows_protocols/ms-fscc>
//!

#![allow(missing_docs)]

/// Size of the sync SMB2 header
pub const SMB2_HEADER_SIZE: usize = 64;

pub const SMB2_PROTOCOL_ID: [u8; 4] = [0xFE, b'S', b'M', b'B'];

/// Bound of a single RFC1001 frame
pub const MAX_RFC1001_LEN: usize = 0x7F_FFFF;

#[allow(clippy::as_conversions)]
pub const PATH_MAX: usize = libc::PATH_MAX as usize;

pub mod command {
    pub const CREATE: u16 = 0x0005;
    pub const CLOSE: u16 = 0x0006;
    pub const QUERY_INFO: u16 = 0x0010;
    pub const SET_INFO: u16 = 0x0011;
}

pub mod header_flags {
    pub const SERVER_TO_REDIR: u32 = 0x0000_0001;
    pub const RELATED_OPERATIONS: u32 = 0x0000_0004;
}

pub mod access {
    pub const FILE_WRITE_DATA: u32 = 0x0000_0002;
    pub const FILE_READ_ATTRIBUTES: u32 = 0x0000_0080;
    pub const FILE_WRITE_ATTRIBUTES: u32 = 0x0000_0100;
    pub const DELETE: u32 = 0x0001_0000;
}

pub mod disposition {
    pub const FILE_OPEN: u32 = 0x0000_0001;
    pub const FILE_CREATE: u32 = 0x0000_0002;
}

pub mod create_options {
    pub const NOT_FILE: u32 = 0x0000_0001;
    pub const DELETE_ON_CLOSE: u32 = 0x0000_1000;
    pub const OPEN_BACKUP_INTENT: u32 = 0x0000_4000;
    pub const OPEN_REPARSE_POINT: u32 = 0x0020_0000;
}

pub mod share_access {
    pub const FILE_SHARE_ALL: u32 = 0x0000_0007;
}

/// DOS attributes
pub mod attr {
    pub const READONLY: u32 = 0x0000_0001;
    pub const DIRECTORY: u32 = 0x0000_0010;
    pub const ARCHIVE: u32 = 0x0000_0020;
    pub const NORMAL: u32 = 0x0000_0080;
    pub const REPARSE_POINT: u32 = 0x0000_0400;
}

/// `SMB2_O_INFO_FILE`
pub const INFO_TYPE_FILE: u8 = 0x01;

/// File information classes
pub mod info_class {
    pub const FILE_BASIC: u8 = 4;
    pub const FILE_RENAME: u8 = 10;
    pub const FILE_LINK: u8 = 11;
    pub const FILE_DISPOSITION: u8 = 13;
    pub const FILE_ALL: u8 = 18;
    pub const FILE_END_OF_FILE: u8 = 20;
}

pub const OPLOCK_LEVEL_NONE: u8 = 0x00;
pub const IMPERSONATION_LEVEL_IMPERSONATION: u32 = 0x0000_0002;

/// Fixed body sizes, without the variable buffer
pub mod body_size {
    pub const CREATE_REQ: usize = 56;
    pub const QUERY_INFO_REQ: usize = 40;
    pub const SET_INFO_REQ: usize = 32;
    pub const CLOSE_REQ: usize = 24;
    pub const QUERY_INFO_RSP: usize = 8;
    pub const ERROR_RSP: usize = 8;
}

/// `StructureSize` fields
pub mod structure_size {
    pub const CREATE_REQ: u16 = 57;
    pub const QUERY_INFO_REQ: u16 = 41;
    pub const SET_INFO_REQ: u16 = 33;
    pub const CLOSE_REQ: u16 = 24;
    pub const CREATE_RSP: u16 = 89;
    pub const QUERY_INFO_RSP: u16 = 9;
    pub const SET_INFO_RSP: u16 = 2;
    pub const CLOSE_RSP: u16 = 60;
    pub const ERROR_RSP: u16 = 9;
}

/// Fixed part of `FILE_ALL_INFORMATION`, up to `FileNameLength` included
pub const FILE_ALL_INFO_SIZE: usize = 100;

/// `FILE_BASIC_INFORMATION`
pub const FILE_BASIC_INFO_SIZE: usize = 40;

/// Header of `FILE_RENAME_INFORMATION` and `FILE_LINK_INFORMATION`
pub const LINK_INFO_HEADER_SIZE: usize = 20;

/// `FILE_END_OF_FILE_INFORMATION`
pub const FILE_EOF_INFO_SIZE: usize = 8;

/// Output buffer requested for `FILE_ALL_INFORMATION`
#[allow(clippy::as_conversions, clippy::cast_possible_truncation)]
pub const QUERY_ALL_INFO_OUTPUT_LEN: u32 = (FILE_ALL_INFO_SIZE + PATH_MAX * 2) as u32;

#[allow(clippy::assertions_on_constants)]
#[test]
fn path_max() {
    use std::convert::TryFrom;
    assert!(usize::try_from(libc::PATH_MAX).is_ok());
    assert!(libc::PATH_MAX >= 1024 && libc::PATH_MAX <= 8192);
}
