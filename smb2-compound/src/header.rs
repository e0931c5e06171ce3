//! The sync SMB2 header

use crate::decode::{Decode, DecodeError, Decoder};
use crate::encode::Encoder;
use crate::proto::{header_flags, SMB2_HEADER_SIZE, SMB2_PROTOCOL_ID};
use crate::status::NtStatus;

/// SMB2 sync header
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Smb2Header {
    pub credit_charge: u16,
    pub status: NtStatus,
    pub command: u16,
    pub credit_request: u16,
    pub flags: u32,
    /// offset of the next header in a compound chain, 0 for the last one
    pub next_command: u32,
    pub message_id: u64,
    pub tree_id: u32,
    pub session_id: u64,
}

impl Smb2Header {
    /// Whether the command targets the handle of its predecessor
    #[must_use]
    pub const fn is_related(&self) -> bool {
        self.flags & header_flags::RELATED_OPERATIONS != 0
    }

    /// Whether this is a response
    #[must_use]
    pub const fn is_response(&self) -> bool {
        self.flags & header_flags::SERVER_TO_REDIR != 0
    }

    #[must_use]
    pub fn encode(&self) -> [u8; SMB2_HEADER_SIZE] {
        let mut buf = [0; SMB2_HEADER_SIZE];
        #[allow(clippy::as_conversions, clippy::cast_possible_truncation)]
        let structure_size = SMB2_HEADER_SIZE as u16;
        Encoder::new(&mut buf)
            .put_bytes(&SMB2_PROTOCOL_ID)
            .put_u16(structure_size)
            .put_u16(self.credit_charge)
            .put_u32(self.status.as_raw())
            .put_u16(self.command)
            .put_u16(self.credit_request)
            .put_u32(self.flags)
            .put_u32(self.next_command)
            .put_u64(self.message_id)
            .put_u32(0) // reserved
            .put_u32(self.tree_id)
            .put_u64(self.session_id)
            .put_zeros(16); // signature
        buf
    }
}

impl<'b> Decode<'b> for Smb2Header {
    fn decode(de: &mut Decoder<'b>) -> Result<Self, DecodeError> {
        if de.fetch_array::<4>()? != SMB2_PROTOCOL_ID {
            return Err(DecodeError::InvalidValue);
        }
        if usize::from(de.fetch_u16()?) != SMB2_HEADER_SIZE {
            return Err(DecodeError::InvalidValue);
        }
        let credit_charge = de.fetch_u16()?;
        let status = NtStatus::from_raw(de.fetch_u32()?);
        let command = de.fetch_u16()?;
        let credit_request = de.fetch_u16()?;
        let flags = de.fetch_u32()?;
        let next_command = de.fetch_u32()?;
        let message_id = de.fetch_u64()?;
        de.skip(4)?;
        let tree_id = de.fetch_u32()?;
        let session_id = de.fetch_u64()?;
        de.skip(16)?;
        Ok(Self {
            credit_charge,
            status,
            command,
            credit_request,
            flags,
            next_command,
            message_id,
            tree_id,
            session_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::command;

    #[test]
    fn header_layout() {
        let header = Smb2Header {
            status: NtStatus::ACCESS_DENIED,
            command: command::SET_INFO,
            flags: header_flags::RELATED_OPERATIONS,
            next_command: 0x68,
            message_id: 7,
            ..Smb2Header::default()
        };
        let bytes = header.encode();
        assert_eq!(&bytes[..4], b"\xfeSMB");
        assert_eq!(&bytes[8..12], &0xC000_0022_u32.to_le_bytes());
        assert_eq!(&bytes[12..14], &[0x11, 0]);
        assert_eq!(&bytes[20..24], &[0x68, 0, 0, 0]);

        let decoded: Smb2Header = Decoder::new(&bytes).decode().unwrap();
        assert_eq!(decoded, header);
        assert!(decoded.is_related());
        assert!(!decoded.is_response());
    }

    #[test]
    fn bad_protocol_id() {
        let mut bytes = Smb2Header::default().encode();
        bytes[0] = 0xFF;
        let ret = Decoder::new(&bytes).decode::<Smb2Header>().unwrap_err();
        assert_eq!(ret, DecodeError::InvalidValue);
    }
}
