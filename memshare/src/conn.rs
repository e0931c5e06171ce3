//! SMB2 compound framing

use smb2_compound::header::Smb2Header;
use smb2_compound::proto::{header_flags, SMB2_HEADER_SIZE};
use smb2_compound::{Decoder, Encode, SubRequest};

use std::convert::TryFrom;
use std::io::{self, IoSlice};

/// Every message of a chain but the last starts at this alignment
const CHAIN_ALIGN: usize = 8;

/// Identity written into request headers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Session {
    pub session_id: u64,
    pub tree_id: u32,
}

/// A message of a compound frame
#[derive(Debug)]
pub struct Message<'a> {
    pub header: Smb2Header,
    /// header, body and padding; body offsets are relative to its start
    pub bytes: &'a [u8],
}

const fn align_up(len: usize) -> usize {
    (len + CHAIN_ALIGN - 1) & !(CHAIN_ALIGN - 1)
}

fn invalid_data<E>(err: E) -> io::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    io::Error::new(io::ErrorKind::InvalidData, err)
}

/// Prepends a header to each request and chains them into one frame
pub fn frame_requests(
    rqsts: &[&SubRequest],
    session: Session,
    first_message_id: u64,
) -> io::Result<Vec<u8>> {
    let mut frame = Vec::new();
    let mut message_id = first_message_id;
    let last = rqsts.len().saturating_sub(1);

    for (idx, rqst) in rqsts.iter().enumerate() {
        let mut slices: Vec<IoSlice<'_>> = Vec::with_capacity(3);
        rqst.collect_bytes(&mut slices);
        let msg_len = slices
            .iter()
            .map(|slice| slice.len())
            .sum::<usize>()
            .wrapping_add(SMB2_HEADER_SIZE);

        let next_command = if idx == last {
            0
        } else {
            u32::try_from(align_up(msg_len)).map_err(|_| invalid_data("message too long"))?
        };

        let flags = if rqst.is_related() {
            header_flags::RELATED_OPERATIONS
        } else {
            0
        };

        let header = Smb2Header {
            credit_charge: 1,
            command: rqst.command().code(),
            credit_request: 1,
            flags,
            next_command,
            message_id,
            tree_id: session.tree_id,
            session_id: session.session_id,
            ..Smb2Header::default()
        };
        message_id = message_id.wrapping_add(1);

        let start = frame.len();
        frame.extend_from_slice(&header.encode());
        for slice in &slices {
            frame.extend_from_slice(slice);
        }
        if idx != last {
            frame.resize(start.wrapping_add(align_up(msg_len)), 0);
        }
    }
    Ok(frame)
}

/// Splits a compound frame at its `NextCommand` offsets
pub fn split_frame(frame: &[u8]) -> io::Result<Vec<Message<'_>>> {
    let mut messages = Vec::new();
    let mut rest = frame;
    loop {
        let header: Smb2Header = Decoder::new(rest).decode().map_err(invalid_data)?;
        let next = usize::try_from(header.next_command).map_err(invalid_data)?;
        if next == 0 {
            messages.push(Message {
                header,
                bytes: rest,
            });
            return Ok(messages);
        }
        if next < SMB2_HEADER_SIZE || next > rest.len() || next % CHAIN_ALIGN != 0 {
            return Err(invalid_data(format!("bad next command offset {}", next)));
        }
        let (bytes, tail) = rest.split_at(next);
        messages.push(Message { header, bytes });
        rest = tail;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use smb2_compound::{Composer, OperationKind, Payload, SendFlags};
    use smb2_compound::{BufferPool, ShareConfig};

    #[test]
    fn chain_round_trip() {
        let pool = BufferPool::new(8);
        let config = ShareConfig::default();
        let kind = OperationKind::QueryInfo;
        let chain = Composer::new(&pool, &config)
            .compose("a/b", kind.open_params(), kind, Payload::None, SendFlags::empty())
            .unwrap();
        let rqsts: Vec<_> = chain.iter().collect();
        let session = Session {
            session_id: 7,
            tree_id: 3,
        };

        let frame = frame_requests(&rqsts, session, 10).unwrap();
        let messages = split_frame(&frame).unwrap();
        assert_eq!(messages.len(), 3);

        for (idx, (msg, rqst)) in messages.iter().zip(&rqsts).enumerate() {
            assert_eq!(msg.header.command, rqst.command().code());
            assert_eq!(msg.header.is_related(), idx > 0);
            assert_eq!(msg.header.message_id, 10 + idx as u64);
            assert_eq!(msg.header.session_id, 7);
            assert_eq!(msg.header.tree_id, 3);
            assert!(!msg.header.is_response());
            assert!(msg.bytes.len() >= SMB2_HEADER_SIZE + rqst.len());
            if idx < 2 {
                assert_eq!(msg.bytes.len() % CHAIN_ALIGN, 0);
            }
        }
        assert_eq!(messages[2].header.next_command, 0);
    }

    #[test]
    fn bad_next_command() {
        let header = Smb2Header {
            next_command: 12,
            ..Smb2Header::default()
        };
        let mut frame = header.encode().to_vec();
        frame.resize(128, 0);
        let err = split_frame(&frame).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        let err = split_frame(&[0; 10]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
