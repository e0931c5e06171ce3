use std::convert::TryFrom;

/// Little-endian decoder over a response or request buffer
#[derive(Debug)]
pub struct Decoder<'b> {
    bytes: &'b [u8],
}

/// Failure to decode a wire structure
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("buffer ends before the structure")]
    NotEnough,

    #[error("bytes left after the structure")]
    TooMuchData,

    #[error("length does not fit in memory")]
    NumOverflow,

    #[error("field has an unexpected value")]
    InvalidValue,
}

/// A structure read from its little-endian wire form
pub trait Decode<'b>: Sized {
    fn decode(de: &mut Decoder<'b>) -> Result<Self, DecodeError>;
}

macro_rules! fetch_le {
    ($($f:ident: $t:ty,)+) => {$(
        #[inline]
        pub fn $f(&mut self) -> Result<$t, DecodeError> {
            let bytes = self.fetch_array()?;
            Ok(<$t>::from_le_bytes(bytes))
        }
    )+};
}

impl<'b> Decoder<'b> {
    #[must_use]
    pub const fn new(bytes: &'b [u8]) -> Self {
        Self { bytes }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.bytes.len()
    }

    pub fn decode<T: Decode<'b>>(&mut self) -> Result<T, DecodeError> {
        <T as Decode>::decode(self)
    }

    pub fn fetch_bytes(&mut self, len: usize) -> Result<&'b [u8], DecodeError> {
        if self.bytes.len() < len {
            return Err(DecodeError::NotEnough);
        }
        let (head, tail) = self.bytes.split_at(len);
        self.bytes = tail;
        Ok(head)
    }

    pub fn fetch_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let bytes = self.fetch_bytes(N)?;
        <[u8; N]>::try_from(bytes).map_err(|_| DecodeError::NotEnough)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), DecodeError> {
        self.fetch_bytes(len).map(drop)
    }

    fetch_le!(
        fetch_u8: u8,
        fetch_u16: u16,
        fetch_u32: u32,
        fetch_u64: u64,
        fetch_i64: i64,
    );

    /// Fetches `count` UTF-16LE code units
    pub fn fetch_utf16(&mut self, count: usize) -> Result<Vec<u16>, DecodeError> {
        let len = count.checked_mul(2).ok_or(DecodeError::NumOverflow)?;
        let bytes = self.fetch_bytes(len)?;
        Ok(bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect())
    }

    /// Runs `f` and fails if it leaves bytes behind
    pub fn all_consuming<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, DecodeError>,
    ) -> Result<T, DecodeError> {
        let ret = f(self)?;
        if !self.is_empty() {
            return Err(DecodeError::TooMuchData);
        }
        Ok(ret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn little_endian_fields() {
        let data = [0x34, 0x12, 1, 0, 0, 0, 0xFF];
        let mut de = Decoder::new(&data);

        assert_eq!(de.fetch_u16().unwrap(), 0x1234);
        assert_eq!(de.fetch_u32().unwrap(), 1);
        assert_eq!(de.remaining(), 1);

        assert_eq!(de.fetch_u64().unwrap_err(), DecodeError::NotEnough);
        assert_eq!(de.remaining(), 1);
        assert_eq!(de.fetch_u8().unwrap(), 0xFF);
        assert!(de.is_empty());
    }

    #[test]
    fn utf16_units() {
        let data = [b'a', 0, 0x3C, 0xD8, b'b', 0];
        let mut de = Decoder::new(&data);

        let units = de.fetch_utf16(3).unwrap();
        assert_eq!(units, [u16::from(b'a'), 0xD83C, u16::from(b'b')]);
        assert!(de.is_empty());

        let mut de = Decoder::new(&data[..3]);
        assert_eq!(de.fetch_utf16(2).unwrap_err(), DecodeError::NotEnough);
        assert_eq!(
            Decoder::new(&data).fetch_utf16(usize::MAX).unwrap_err(),
            DecodeError::NumOverflow
        );
    }

    #[test]
    fn trailing_bytes() {
        let data = [1, 2, 3];
        let mut de = Decoder::new(&data);
        let ret = de.all_consuming(Decoder::fetch_u16).unwrap_err();
        assert_eq!(ret, DecodeError::TooMuchData);

        let mut de = Decoder::new(&data[..2]);
        assert_eq!(de.all_consuming(Decoder::fetch_u16).unwrap(), 0x0201);
    }
}
