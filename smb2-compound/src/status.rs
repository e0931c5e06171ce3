//! NT status codes carried in SMB2 response headers

use std::fmt;

/// A 32-bit NT status
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct NtStatus(u32);

impl NtStatus {
    /// Wraps a raw status value
    #[must_use]
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Gets the raw status value
    #[must_use]
    #[inline]
    pub const fn as_raw(self) -> u32 {
        self.0
    }

    /// `STATUS_SUCCESS`
    #[must_use]
    #[inline]
    pub const fn is_success(self) -> bool {
        self.0 == Self::SUCCESS.0
    }
}

macro_rules! declare_statuses {
    ($($name:ident = $raw:expr => $errno:expr,)+) => {
        impl NtStatus {
            $(
                #[allow(missing_docs)]
                pub const $name: Self = Self($raw);
            )+

            /// The symbolic name of a known status
            #[must_use]
            pub fn name(self) -> Option<&'static str> {
                match self.0 {
                    $($raw => Some(concat!("STATUS_", stringify!($name))),)+
                    _ => None,
                }
            }

            /// Maps the status to a POSIX errno, `EIO` for unknown failures
            #[must_use]
            pub fn to_errno(self) -> i32 {
                match self.0 {
                    $($raw => $errno,)+
                    _ => libc::EIO,
                }
            }
        }

        #[test]
        fn distinct_values() {
            let all: &[u32] = &[$($raw,)+];
            for (i, a) in all.iter().enumerate() {
                assert!(all[i + 1..].iter().all(|b| a != b), "duplicated status {:#010x}", a);
            }
        }
    };
}

declare_statuses!(
    SUCCESS = 0x0000_0000 => 0,
    BUFFER_OVERFLOW = 0x8000_0005 => libc::EOVERFLOW,
    STOPPED_ON_SYMLINK = 0x8000_002D => libc::EOPNOTSUPP,
    INVALID_HANDLE = 0xC000_0008 => libc::EBADF,
    INVALID_PARAMETER = 0xC000_000D => libc::EINVAL,
    NO_SUCH_FILE = 0xC000_000F => libc::ENOENT,
    ACCESS_DENIED = 0xC000_0022 => libc::EACCES,
    OBJECT_NAME_INVALID = 0xC000_0033 => libc::ENOENT,
    OBJECT_NAME_NOT_FOUND = 0xC000_0034 => libc::ENOENT,
    OBJECT_NAME_COLLISION = 0xC000_0035 => libc::EEXIST,
    OBJECT_PATH_NOT_FOUND = 0xC000_003A => libc::ENOENT,
    SHARING_VIOLATION = 0xC000_0043 => libc::EBUSY,
    DELETE_PENDING = 0xC000_0056 => libc::ENOENT,
    DISK_FULL = 0xC000_007F => libc::ENOSPC,
    INSUFFICIENT_RESOURCES = 0xC000_009A => libc::EREMOTEIO,
    FILE_IS_A_DIRECTORY = 0xC000_00BA => libc::EISDIR,
    NOT_SUPPORTED = 0xC000_00BB => libc::EOPNOTSUPP,
    NOT_SAME_DEVICE = 0xC000_00D4 => libc::EXDEV,
    DIRECTORY_NOT_EMPTY = 0xC000_0101 => libc::ENOTEMPTY,
    NOT_A_DIRECTORY = 0xC000_0103 => libc::ENOTDIR,
    CANNOT_DELETE = 0xC000_0121 => libc::EACCES,
    FILE_CLOSED = 0xC000_0128 => libc::EBADF,
);

impl fmt::Debug for NtStatus {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "NtStatus({:#010x})", self.0),
        }
    }
}

impl fmt::Display for NtStatus {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
