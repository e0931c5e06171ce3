use std::io::IoSlice;

/// Collects the outbound buffers of a message, in wire order
pub trait Encode {
    fn collect_bytes<'c, C>(&'c self, container: &mut C)
    where
        C: Extend<IoSlice<'c>>;
}

/// Little-endian writer over a fixed-size body
#[derive(Debug)]
pub struct Encoder<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

macro_rules! put_le {
    ($($f:ident: $t:ty,)+) => {$(
        #[inline]
        pub fn $f(&mut self, x: $t) -> &mut Self {
            self.put_bytes(&x.to_le_bytes())
        }
    )+};
}

impl<'a> Encoder<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// # Panics
    /// Panics if the body is too small. Body sizes are fixed by the protocol.
    pub fn put_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        let end = self.pos.wrapping_add(bytes.len());
        self.buf[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
        self
    }

    pub fn put_zeros(&mut self, len: usize) -> &mut Self {
        let end = self.pos.wrapping_add(len);
        self.buf[self.pos..end].iter_mut().for_each(|b| *b = 0);
        self.pos = end;
        self
    }

    put_le!(
        put_u8: u8,
        put_u16: u16,
        put_u32: u32,
        put_u64: u64,
        put_i64: i64,
    );
}
