//! Operation catalog

use crate::error::Error;
use crate::info::FileBasicInfo;
use crate::name::WireName;
use crate::proto::{access, create_options, disposition, info_class};

use std::convert::TryFrom;

/// Path operations carried out by one compound exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    QueryInfo,
    Delete,
    Mkdir,
    Rmdir,
    SetEof,
    SetInfo,
    Rename,
    Hardlink,
}

/// Create parameters of the chain's open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenParams {
    pub desired_access: u32,
    pub disposition: u32,
    pub create_options: u32,
}

/// The command between open and close
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Middle {
    /// QUERY_INFO of a file information class
    QueryInfo(u8),
    /// SET_INFO of a file information class
    SetInfo(u8),
}

/// Operation-specific input
#[derive(Debug)]
pub enum Payload {
    None,
    /// new end of file
    EndOfFile(u64),
    /// timestamps and attributes
    Basic(FileBasicInfo),
    /// new name of a rename or a hard link
    Target(WireName),
}

impl OperationKind {
    /// All kinds, in command number order
    pub const ALL: [Self; 8] = [
        Self::QueryInfo,
        Self::Mkdir,
        Self::Rename,
        Self::Delete,
        Self::Hardlink,
        Self::SetEof,
        Self::Rmdir,
        Self::SetInfo,
    ];

    /// The command number
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        match self {
            Self::QueryInfo => 2,
            Self::Mkdir => 4,
            Self::Rename => 5,
            Self::Delete => 6,
            Self::Hardlink => 7,
            Self::SetEof => 8,
            Self::Rmdir => 9,
            Self::SetInfo => 10,
        }
    }

    /// The open used by the path operation of this kind
    #[must_use]
    pub const fn open_params(self) -> OpenParams {
        let (desired_access, disposition, create_options) = match self {
            Self::QueryInfo => (access::FILE_READ_ATTRIBUTES, disposition::FILE_OPEN, 0),
            Self::Delete => (
                access::DELETE,
                disposition::FILE_OPEN,
                create_options::DELETE_ON_CLOSE | create_options::OPEN_REPARSE_POINT,
            ),
            Self::Mkdir => (
                access::FILE_WRITE_ATTRIBUTES,
                disposition::FILE_CREATE,
                create_options::NOT_FILE,
            ),
            Self::Rmdir => (
                access::DELETE,
                disposition::FILE_OPEN,
                create_options::NOT_FILE,
            ),
            Self::SetEof => (access::FILE_WRITE_DATA, disposition::FILE_OPEN, 0),
            Self::SetInfo => (access::FILE_WRITE_ATTRIBUTES, disposition::FILE_OPEN, 0),
            Self::Rename => (access::DELETE, disposition::FILE_OPEN, 0),
            Self::Hardlink => (access::FILE_READ_ATTRIBUTES, disposition::FILE_OPEN, 0),
        };
        OpenParams {
            desired_access,
            disposition,
            create_options,
        }
    }

    /// The command between open and close, if any.
    /// Mkdir is done by the open, delete by the close.
    #[must_use]
    pub const fn middle(self) -> Option<Middle> {
        match self {
            Self::QueryInfo => Some(Middle::QueryInfo(info_class::FILE_ALL)),
            Self::Delete | Self::Mkdir => None,
            Self::Rmdir => Some(Middle::SetInfo(info_class::FILE_DISPOSITION)),
            Self::SetEof => Some(Middle::SetInfo(info_class::FILE_END_OF_FILE)),
            Self::SetInfo => Some(Middle::SetInfo(info_class::FILE_BASIC)),
            Self::Rename => Some(Middle::SetInfo(info_class::FILE_RENAME)),
            Self::Hardlink => Some(Middle::SetInfo(info_class::FILE_LINK)),
        }
    }

    /// Number of sub-requests in the chain
    #[must_use]
    pub const fn sub_request_count(self) -> usize {
        match self.middle() {
            Some(_) => 3,
            None => 2,
        }
    }
}

impl TryFrom<u32> for OperationKind {
    type Error = Error;

    #[inline]
    fn try_from(raw: u32) -> Result<Self, Error> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_raw() == raw)
            .ok_or(Error::InvalidArgument("unknown operation kind"))
    }
}
