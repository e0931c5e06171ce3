//! Errors of path operations

use crate::status::NtStatus;

use std::collections::TryReserveError;
use std::io;

/// The error type of compound path operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A local allocation failed; nothing was sent
    #[error("ResourceExhausted")]
    ResourceExhausted,

    /// The request can not be composed
    #[error("InvalidArgument: {0}")]
    InvalidArgument(&'static str),

    /// The encoded name is longer than `PATH_MAX` code units
    #[error("NameTooLong: {len} code units")]
    NameTooLong {
        /// encoded length in UTF-16 code units
        len: usize,
    },

    /// The exchange did not complete
    #[error("Transport: {0}")]
    Transport(#[source] io::Error),

    /// The server can not open the target without reparse-point semantics
    #[error("Unsupported: {0}")]
    Unsupported(NtStatus),

    /// A response declares data outside of its own buffer
    #[error("ProtocolViolation: offset = {offset}, length = {length}, available = {available}")]
    ProtocolViolation {
        /// declared offset
        offset: usize,
        /// declared length
        length: usize,
        /// actual response size
        available: usize,
    },

    /// Any other failure status returned by the server
    #[error("Status: {0}")]
    Status(NtStatus),
}

/// Result of path operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Converts a server status into a result
    /// # Errors
    /// Returns [`Error::Status`] for every failure
    #[inline]
    pub fn check_status(status: NtStatus) -> Result<()> {
        if status.is_success() {
            Ok(())
        } else {
            Err(Self::Status(status))
        }
    }

    /// Reclassifies the failure of a first query as [`Error::Unsupported`]
    /// when the status maps to `EOPNOTSUPP`
    #[must_use]
    pub fn on_first_query(self) -> Self {
        match self {
            Self::Status(status) if status.to_errno() == libc::EOPNOTSUPP => {
                Self::Unsupported(status)
            }
            err => err,
        }
    }

    /// The POSIX errno a filesystem layer reports for this error
    #[must_use]
    pub fn errno(&self) -> i32 {
        match *self {
            Self::ResourceExhausted => libc::ENOMEM,
            Self::InvalidArgument(_) | Self::ProtocolViolation { .. } => libc::EINVAL,
            Self::NameTooLong { .. } => libc::ENAMETOOLONG,
            Self::Transport(ref err) => err.raw_os_error().unwrap_or(libc::EIO),
            Self::Unsupported(_) => libc::EOPNOTSUPP,
            Self::Status(status) => status.to_errno(),
        }
    }
}

impl From<TryReserveError> for Error {
    #[inline]
    fn from(_: TryReserveError) -> Self {
        Self::ResourceExhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(Error::check_status(NtStatus::SUCCESS).is_ok());

        let err = Error::check_status(NtStatus::STOPPED_ON_SYMLINK).unwrap_err();
        assert!(matches!(err, Error::Status(NtStatus::STOPPED_ON_SYMLINK)));
        assert_eq!(err.errno(), libc::EOPNOTSUPP);
        let err = err.on_first_query();
        assert!(matches!(err, Error::Unsupported(NtStatus::STOPPED_ON_SYMLINK)));

        let err = Error::check_status(NtStatus::OBJECT_NAME_NOT_FOUND).unwrap_err();
        assert!(matches!(err, Error::Status(NtStatus::OBJECT_NAME_NOT_FOUND)));
        assert_eq!(err.errno(), libc::ENOENT);
        assert!(matches!(err.on_first_query(), Error::Status(_)));

        let err = Error::Transport(io::Error::new(io::ErrorKind::Other, "closed"));
        assert!(matches!(err.on_first_query(), Error::Transport(_)));
    }

    #[test]
    fn transport_errno() {
        let err = Error::Transport(io::Error::from_raw_os_error(libc::ECONNRESET));
        assert_eq!(err.errno(), libc::ECONNRESET);

        let err = Error::Transport(io::Error::new(io::ErrorKind::Other, "closed"));
        assert_eq!(err.errno(), libc::EIO);
    }
}
