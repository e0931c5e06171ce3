//! Path names in wire form (UTF-16LE, `\`-separated, relative to the share)

use crate::buffer_pool::{Buffer, BufferPool};
use crate::config::ShareConfig;
use crate::error::{Error, Result};
use crate::proto::PATH_MAX;

use std::fmt::{self, Debug};

use memchr::memchr;

/// Services for Mac remapping of characters reserved by Windows
const SFM_MAP: [(char, u16); 7] = [
    ('"', 0xF020),
    ('*', 0xF021),
    (':', 0xF022),
    ('<', 0xF023),
    ('>', 0xF024),
    ('?', 0xF025),
    ('|', 0xF027),
];

/// Services for Mac remapping of a space or period ending the name
const SFM_TRAILING_MAP: [(char, u16); 2] = [(' ', 0xF028), ('.', 0xF029)];

/// A UTF-16LE name followed by one null code unit
pub struct WireName(Buffer);

impl WireName {
    /// Encoded name without the trailing null
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        let len = self.0.len().saturating_sub(2);
        &self.0[..len]
    }

    /// Encoded name including the trailing null
    #[must_use]
    pub fn as_bytes_with_nul(&self) -> &[u8] {
        &self.0
    }

    /// Name length in bytes, excluding the trailing null
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.as_bytes().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.byte_len() == 0
    }

    pub(crate) fn into_buffer(self) -> Buffer {
        self.0
    }

    /// Decodes a wire name for display
    #[must_use]
    pub fn to_string_lossy(&self) -> String {
        let units: Vec<u16> = self
            .as_bytes()
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    }
}

impl Debug for WireName {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WireName({:?})", self.to_string_lossy())
    }
}

/// Whether `path` names the root of the share
#[must_use]
pub fn is_root(path: &str, config: &ShareConfig) -> bool {
    path.chars().all(|c| c == config.separator())
}

/// Maps one character of a local path to wire code units
fn map_char(c: char, last: bool, config: &ShareConfig, out: &mut [u16; 2]) -> usize {
    if c == config.separator() {
        out[0] = u16::from(b'\\');
        return 1;
    }
    if config.maps_reserved_chars() {
        let trailing: &[(char, u16)] = if last { &SFM_TRAILING_MAP } else { &[] };
        if let Some(&(_, unit)) = SFM_MAP.iter().chain(trailing).find(|&&(r, _)| r == c) {
            out[0] = unit;
            return 1;
        }
    }
    c.encode_utf16(out).len()
}

/// Calls `f` with the wire code units of every character of `path`
fn map_path(path: &str, config: &ShareConfig, mut f: impl FnMut(&[u16])) {
    let mut units = [0_u16; 2];
    let mut chars = path.chars().peekable();
    while let Some(c) = chars.next() {
        let last = chars.peek().is_none();
        let n = map_char(c, last, config, &mut units);
        f(&units[..n]);
    }
}

/// Converts a local path into its wire form
/// # Errors
/// + [`Error::InvalidArgument`] if `path` contains a nul byte
/// + [`Error::NameTooLong`] if the name exceeds `PATH_MAX` code units
/// + [`Error::ResourceExhausted`] if the buffer can not be allocated
pub fn encode_path(path: &str, config: &ShareConfig, pool: &BufferPool) -> Result<WireName> {
    if memchr(0, path.as_bytes()).is_some() {
        return Err(Error::InvalidArgument("path contains a nul byte"));
    }

    let path = path.trim_start_matches(config.separator());

    let mut len = 0_usize;
    map_path(path, config, |units| len += units.len());
    if len > PATH_MAX {
        return Err(Error::NameTooLong { len });
    }

    let mut buf = pool.acquire(len.wrapping_add(1).wrapping_mul(2))?;
    let mut pos = 0;
    map_path(path, config, |units| {
        for &unit in units {
            buf[pos..pos + 2].copy_from_slice(&unit.to_le_bytes());
            pos += 2;
        }
    });
    debug_assert_eq!(pos, len * 2);
    // the trailing null is already zeroed
    Ok(WireName(buf))
}
