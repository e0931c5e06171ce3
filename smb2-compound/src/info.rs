//! File information records exchanged by QUERY_INFO and SET_INFO

use crate::decode::{Decode, DecodeError, Decoder};
use crate::encode::Encoder;
use crate::proto::{FILE_ALL_INFO_SIZE, FILE_BASIC_INFO_SIZE, LINK_INFO_HEADER_SIZE};

use std::convert::TryFrom;

/// `FILE_DISPOSITION_INFORMATION` with `DeletePending` set.
/// Only the first byte is sent.
pub const DELETE_PENDING: [u8; 8] = [1, 0, 0, 0, 0, 0, 0, 0];

/// `FILE_BASIC_INFORMATION`. Zero fields are left unchanged by the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileBasicInfo {
    pub creation_time: i64,
    pub last_access_time: i64,
    pub last_write_time: i64,
    pub change_time: i64,
    pub attributes: u32,
}

impl FileBasicInfo {
    /// A record with every field zero changes nothing
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.creation_time == 0
            && self.last_access_time == 0
            && self.last_write_time == 0
            && self.change_time == 0
            && self.attributes == 0
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; FILE_BASIC_INFO_SIZE] {
        let mut buf = [0; FILE_BASIC_INFO_SIZE];
        Encoder::new(&mut buf)
            .put_i64(self.creation_time)
            .put_i64(self.last_access_time)
            .put_i64(self.last_write_time)
            .put_i64(self.change_time)
            .put_u32(self.attributes)
            .put_zeros(4);
        buf
    }
}

impl<'b> Decode<'b> for FileBasicInfo {
    fn decode(de: &mut Decoder<'b>) -> Result<Self, DecodeError> {
        let info = Self {
            creation_time: de.fetch_i64()?,
            last_access_time: de.fetch_i64()?,
            last_write_time: de.fetch_i64()?,
            change_time: de.fetch_i64()?,
            attributes: de.fetch_u32()?,
        };
        de.skip(4)?;
        Ok(info)
    }
}

/// `FILE_ALL_INFORMATION`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileAllInfo {
    pub basic: FileBasicInfo,
    pub allocation_size: i64,
    pub end_of_file: i64,
    pub number_of_links: u32,
    pub delete_pending: bool,
    pub directory: bool,
    pub index_number: u64,
    pub ea_size: u32,
    pub access_flags: u32,
    pub current_byte_offset: i64,
    pub mode: u32,
    pub alignment_requirement: u32,
    /// UTF-16 code units
    pub file_name: Vec<u16>,
}

impl FileAllInfo {
    /// Encodes the record as a server would return it
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let name_len = self.file_name.len().wrapping_mul(2);
        let mut buf = vec![0; FILE_ALL_INFO_SIZE.wrapping_add(name_len)];
        let mut en = Encoder::new(&mut buf);
        en.put_bytes(&self.basic.to_bytes())
            .put_i64(self.allocation_size)
            .put_i64(self.end_of_file)
            .put_u32(self.number_of_links)
            .put_u8(u8::from(self.delete_pending))
            .put_u8(u8::from(self.directory))
            .put_zeros(2)
            .put_u64(self.index_number)
            .put_u32(self.ea_size)
            .put_u32(self.access_flags)
            .put_i64(self.current_byte_offset)
            .put_u32(self.mode)
            .put_u32(self.alignment_requirement)
            .put_u32(u32::try_from(name_len).unwrap_or(u32::MAX));
        for unit in &self.file_name {
            en.put_u16(*unit);
        }
        buf
    }
}

impl<'b> Decode<'b> for FileAllInfo {
    fn decode(de: &mut Decoder<'b>) -> Result<Self, DecodeError> {
        let basic = de.decode()?;
        let allocation_size = de.fetch_i64()?;
        let end_of_file = de.fetch_i64()?;
        let number_of_links = de.fetch_u32()?;
        let delete_pending = de.fetch_u8()? != 0;
        let directory = de.fetch_u8()? != 0;
        de.skip(2)?;
        let index_number = de.fetch_u64()?;
        let ea_size = de.fetch_u32()?;
        let access_flags = de.fetch_u32()?;
        let current_byte_offset = de.fetch_i64()?;
        let mode = de.fetch_u32()?;
        let alignment_requirement = de.fetch_u32()?;
        let name_len = usize::try_from(de.fetch_u32()?).map_err(|_| DecodeError::NumOverflow)?;
        let file_name = de.fetch_utf16(name_len / 2)?;
        Ok(Self {
            basic,
            allocation_size,
            end_of_file,
            number_of_links,
            delete_pending,
            directory,
            index_number,
            ea_size,
            access_flags,
            current_byte_offset,
            mode,
            alignment_requirement,
            file_name,
        })
    }
}

/// Header of `FILE_RENAME_INFORMATION` and `FILE_LINK_INFORMATION`.
/// The name follows it, with one null code unit not counted in `file_name_length`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkInfoHeader {
    pub replace_if_exists: bool,
    pub root_directory: u64,
    pub file_name_length: u32,
}

impl LinkInfoHeader {
    #[must_use]
    pub fn to_bytes(&self) -> [u8; LINK_INFO_HEADER_SIZE] {
        let mut buf = [0; LINK_INFO_HEADER_SIZE];
        Encoder::new(&mut buf)
            .put_u8(u8::from(self.replace_if_exists))
            .put_zeros(7)
            .put_u64(self.root_directory)
            .put_u32(self.file_name_length);
        buf
    }
}

impl<'b> Decode<'b> for LinkInfoHeader {
    fn decode(de: &mut Decoder<'b>) -> Result<Self, DecodeError> {
        let replace_if_exists = de.fetch_u8()? != 0;
        de.skip(7)?;
        let root_directory = de.fetch_u64()?;
        let file_name_length = de.fetch_u32()?;
        Ok(Self {
            replace_if_exists,
            root_directory,
            file_name_length,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_info_noop() {
        assert!(FileBasicInfo::default().is_noop());
        let info = FileBasicInfo {
            change_time: 1,
            ..FileBasicInfo::default()
        };
        assert!(!info.is_noop());
    }

    #[test]
    fn all_info_layout() {
        let info = FileAllInfo {
            end_of_file: 0x1234,
            directory: true,
            number_of_links: 1,
            file_name: vec![u16::from(b'x')],
            ..FileAllInfo::default()
        };
        let bytes = info.to_bytes();
        assert_eq!(bytes.len(), FILE_ALL_INFO_SIZE + 2);
        assert_eq!(&bytes[48..56], &0x1234_i64.to_le_bytes());
        assert_eq!(bytes[61], 1);
        assert_eq!(&bytes[96..100], &[2, 0, 0, 0]);

        let decoded: FileAllInfo = Decoder::new(&bytes).decode().unwrap();
        assert_eq!(decoded, info);
    }

    #[test]
    fn all_info_name_overrun() {
        let mut bytes = FileAllInfo::default().to_bytes();
        bytes[96] = 8;
        let ret = Decoder::new(&bytes).decode::<FileAllInfo>().unwrap_err();
        assert_eq!(ret, DecodeError::NotEnough);
    }

    #[test]
    fn link_header_layout() {
        let header = LinkInfoHeader {
            replace_if_exists: true,
            root_directory: 0,
            file_name_length: 6,
        };
        let bytes = header.to_bytes();
        assert_eq!(bytes[0], 1);
        assert!(bytes[1..16].iter().all(|&b| b == 0));
        assert_eq!(&bytes[16..], &[6, 0, 0, 0]);
    }
}
