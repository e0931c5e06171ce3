//! Responses of a compound exchange

use crate::buffer_pool::Buffer;
use crate::compound::MAX_COMPOUND;
use crate::decode::{Decode, DecodeError, Decoder};
use crate::error::{Error, Result};
use crate::header::Smb2Header;
use crate::info::FileAllInfo;
use crate::proto::{structure_size, FILE_ALL_INFO_SIZE, MAX_RFC1001_LEN, SMB2_HEADER_SIZE};

use std::fmt::{self, Debug};

use tracing::{error, trace};

/// One response message (header and body), tagged by who owns its memory
pub enum ResponseBuffer {
    /// No response was received for this position
    Empty,
    /// Allocated for this response alone
    Heap(Vec<u8>),
    /// Borrowed from the transport's receive pool
    Pooled(Buffer),
}

impl Default for ResponseBuffer {
    #[inline]
    fn default() -> Self {
        Self::Empty
    }
}

impl Debug for ResponseBuffer {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "Empty"),
            Self::Heap(buf) => write!(f, "Heap({} bytes)", buf.len()),
            Self::Pooled(buf) => write!(f, "Pooled({} bytes)", buf.len()),
        }
    }
}

impl ResponseBuffer {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Empty => &[],
            Self::Heap(buf) => buf,
            Self::Pooled(buf) => buf,
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(*self, Self::Empty)
    }

    /// Decodes the header
    /// # Errors
    /// Returns [`Error::ProtocolViolation`] if there is no valid header
    pub fn header(&self) -> Result<Smb2Header> {
        let bytes = self.as_bytes();
        Decoder::new(bytes)
            .decode()
            .map_err(|_| violation(0, SMB2_HEADER_SIZE, bytes.len()))
    }
}

const fn violation(offset: usize, length: usize, available: usize) -> Error {
    Error::ProtocolViolation {
        offset,
        length,
        available,
    }
}

/// Responses of one exchange, aligned by position with the sub-requests
#[derive(Debug, Default)]
pub struct Responses {
    /// slots
    slots: [ResponseBuffer; MAX_COMPOUND],
}

impl Responses {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the response of the sub-request at `idx`
    /// # Panics
    /// Panics if `idx` is not less than [`MAX_COMPOUND`]
    pub fn set(&mut self, idx: usize, buf: ResponseBuffer) {
        self.slots[idx] = buf;
    }

    #[must_use]
    pub fn get(&self, idx: usize) -> Option<&ResponseBuffer> {
        self.slots.get(idx)
    }

    /// Checks the statuses of the first `count` responses, in chain order
    /// # Errors
    /// + the error of the first failed command
    /// + [`Error::ProtocolViolation`] if a response is missing or malformed
    pub fn check(&self, count: usize) -> Result<()> {
        for (idx, slot) in self.slots.iter().take(count).enumerate() {
            let header = slot.header()?;
            trace!(idx, command = header.command, status = %header.status);
            Error::check_status(header.status)?;
        }
        Ok(())
    }
}

/// The fixed part of a QUERY_INFO response
#[derive(Debug)]
struct QueryInfoResponse {
    /// from the start of the SMB2 header
    output_offset: u16,
    /// bytes
    output_len: u32,
}

impl<'b> Decode<'b> for QueryInfoResponse {
    fn decode(de: &mut Decoder<'b>) -> Result<Self, DecodeError> {
        if de.fetch_u16()? != structure_size::QUERY_INFO_RSP {
            return Err(DecodeError::InvalidValue);
        }
        let output_offset = de.fetch_u16()?;
        let output_len = de.fetch_u32()?;
        Ok(Self {
            output_offset,
            output_len,
        })
    }
}

/// Copies the `FILE_ALL_INFORMATION` of a QUERY_INFO response into `dst`,
/// after checking that the declared output lies inside the response.
/// `dst` is left untouched on error.
/// # Errors
/// Returns [`Error::ProtocolViolation`]
pub fn validate_and_copy(rsp: &ResponseBuffer, dst: &mut FileAllInfo) -> Result<()> {
    let bytes = rsp.as_bytes();
    let available = bytes.len();

    let body = bytes
        .get(SMB2_HEADER_SIZE..)
        .ok_or_else(|| violation(0, SMB2_HEADER_SIZE, available))?;
    let fixed: QueryInfoResponse = Decoder::new(body)
        .decode()
        .map_err(|_| violation(SMB2_HEADER_SIZE, body.len(), available))?;

    let offset = usize::from(fixed.output_offset);
    let length = fixed.output_len as usize;

    let in_bounds = offset
        .checked_add(length)
        .map_or(false, |end| end <= available);
    if length < FILE_ALL_INFO_SIZE || length > MAX_RFC1001_LEN || !in_bounds {
        error!(offset, length, available, "bad query info output");
        return Err(violation(offset, length, available));
    }

    let info = Decoder::new(&bytes[offset..offset + length])
        .decode::<FileAllInfo>()
        .map_err(|err| {
            error!(%err, offset, length, "malformed file information");
            violation(offset, length, available)
        })?;
    *dst = info;
    Ok(())
}
