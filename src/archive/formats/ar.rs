//! ar (Unix archive) cursor.
//!
//! The format is a global `!<arch>\n` magic followed by 60-byte ASCII entry
//! headers. Payloads are padded to even offsets. Name fields are fixed
//! width; both trailing-slash terminators (GNU) and right-padding (BSD) show
//! up in the wild, so names are trimmed of spaces and slashes on both sides.

use std::io::{self, Read};

use super::read_exact_or_eof;

pub const AR_GLOBAL_MAGIC: &[u8; 8] = b"!<arch>\n";
const AR_HEADER_LEN: usize = 60;

/// One ar entry header.
pub struct ArEntryMeta {
    /// Trimmed entry name; empty for name/symbol table pseudo-entries.
    pub name: String,
    pub size: u64,
    /// One pad byte follows odd-sized payloads.
    pub pad: u64,
}

pub enum ArNext {
    End,
    Entry(ArEntryMeta),
}

/// Sequential ar parser. The caller consumes `size + pad` bytes per entry.
pub struct ArCursor {
    started: bool,
    hdr: [u8; AR_HEADER_LEN],
    discard: [u8; 8192],
}

impl Default for ArCursor {
    fn default() -> Self {
        Self::new()
    }
}

impl ArCursor {
    pub fn new() -> Self {
        ArCursor {
            started: false,
            hdr: [0; AR_HEADER_LEN],
            discard: [0; 8192],
        }
    }

    pub fn next_entry<R: Read + ?Sized>(&mut self, input: &mut R) -> io::Result<ArNext> {
        if !self.started {
            let mut magic = [0u8; AR_GLOBAL_MAGIC.len()];
            if !read_exact_or_eof(input, &mut magic)? {
                return Ok(ArNext::End);
            }
            if &magic != AR_GLOBAL_MAGIC {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "not an ar archive",
                ));
            }
            self.started = true;
        }

        if !read_exact_or_eof(input, &mut self.hdr)? {
            return Ok(ArNext::End);
        }
        if &self.hdr[58..60] != b"`\n" {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "damaged ar entry header",
            ));
        }
        let name = String::from_utf8_lossy(&self.hdr[0..16])
            .trim_matches(|c| c == ' ' || c == '/')
            .to_string();
        let size = std::str::from_utf8(&self.hdr[48..58])
            .ok()
            .map(str::trim)
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidData, "unparseable ar entry size")
            })?;
        Ok(ArNext::Entry(ArEntryMeta {
            name,
            size,
            pad: size % 2,
        }))
    }

    /// Discards payload or padding bytes.
    pub fn skip<R: Read + ?Sized>(&mut self, input: &mut R, mut n: u64) -> io::Result<()> {
        while n > 0 {
            let step = (self.discard.len() as u64).min(n) as usize;
            let got = input.read(&mut self.discard[..step])?;
            if got == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "ar stream ended inside a payload",
                ));
            }
            n -= got as u64;
        }
        Ok(())
    }
}

/// Builds a minimal ar archive; shared with the deb scanner tests.
#[cfg(test)]
pub(crate) fn ar_fixture(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(AR_GLOBAL_MAGIC);
    for (name, data) in entries {
        let mut hdr = [b' '; AR_HEADER_LEN];
        hdr[..name.len()].copy_from_slice(name.as_bytes());
        let size = format!("{}", data.len());
        hdr[48..48 + size.len()].copy_from_slice(size.as_bytes());
        hdr[58..60].copy_from_slice(b"`\n");
        out.extend_from_slice(&hdr);
        out.extend_from_slice(data);
        if data.len() % 2 == 1 {
            out.push(b'\n');
        }
    }
    out
}
