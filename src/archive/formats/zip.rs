//! zip central-directory cursor.
//!
//! # Invariants
//! - The whole container is in memory; zip needs random access, so the
//!   scanner buffers it before parsing (which also lets the passthrough
//!   fingerprint complete independently).
//! - Entry metadata comes from the central directory; local headers are only
//!   touched to locate payload bytes. Sizes from the central directory are
//!   authoritative even when bit 3 (data descriptor) zeroed the local ones.
//!
//! # Design Notes
//! - Classic zip only. Zip64 markers surface as `Unsupported` so the
//!   scanner can skip the container with a log line instead of misreading
//!   truncated fields.

use std::fmt;
use std::io::Read;

use flate2::read::DeflateDecoder;

const EOCD_SIG: u32 = 0x0605_4b50;
const CDFH_SIG: u32 = 0x0201_4b50;
const LFH_SIG: u32 = 0x0403_4b50;
const EOCD_MIN: usize = 22;
const LFH_MIN: usize = 30;
/// EOCD scan window: max comment plus the fixed tail.
const EOCD_SCAN_MAX: usize = 64 * 1024 + EOCD_MIN;

const METHOD_STORED: u16 = 0;
const METHOD_DEFLATE: u16 = 8;
const FLAG_ENCRYPTED: u16 = 1;

/// Errors opening or reading a zip container.
#[derive(Debug)]
#[non_exhaustive]
pub enum ZipError {
    Malformed(&'static str),
    Unsupported(&'static str),
}

impl fmt::Display for ZipError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZipError::Malformed(what) => write!(f, "malformed zip: {what}"),
            ZipError::Unsupported(what) => write!(f, "unsupported zip feature: {what}"),
        }
    }
}

impl std::error::Error for ZipError {}

/// Central-directory metadata for one entry.
#[derive(Clone, Debug)]
pub struct ZipEntryMeta {
    pub name: String,
    pub method: u16,
    pub flags: u16,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub header_offset: u64,
    pub is_dir: bool,
}

impl ZipEntryMeta {
    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    pub fn compression_supported(&self) -> bool {
        matches!(self.method, METHOD_STORED | METHOD_DEFLATE)
    }
}

/// A parsed zip container over a byte buffer.
pub struct ZipArchive<'a> {
    data: &'a [u8],
    entries: Vec<ZipEntryMeta>,
}

impl<'a> ZipArchive<'a> {
    /// Locates the end-of-central-directory record and walks the directory.
    pub fn parse(data: &'a [u8]) -> Result<Self, ZipError> {
        let eocd = find_eocd(data).ok_or(ZipError::Malformed("no end-of-central-directory"))?;
        let count = read_u16(data, eocd + 10) as usize;
        let cd_offset = read_u32(data, eocd + 16) as usize;
        if read_u16(data, eocd + 10) == u16::MAX || read_u32(data, eocd + 16) == u32::MAX {
            return Err(ZipError::Unsupported("zip64"));
        }
        if cd_offset >= data.len() {
            return Err(ZipError::Malformed("central directory offset out of range"));
        }

        let mut entries = Vec::with_capacity(count);
        let mut at = cd_offset;
        for _ in 0..count {
            if at + 46 > data.len() || read_u32(data, at) != CDFH_SIG {
                return Err(ZipError::Malformed("central directory entry"));
            }
            let flags = read_u16(data, at + 8);
            let method = read_u16(data, at + 10);
            let compressed = read_u32(data, at + 20);
            let uncompressed = read_u32(data, at + 24);
            let name_len = read_u16(data, at + 28) as usize;
            let extra_len = read_u16(data, at + 30) as usize;
            let comment_len = read_u16(data, at + 32) as usize;
            let header_offset = read_u32(data, at + 42);
            if compressed == u32::MAX || uncompressed == u32::MAX || header_offset == u32::MAX {
                return Err(ZipError::Unsupported("zip64"));
            }
            let name_end = at + 46 + name_len;
            if name_end > data.len() {
                return Err(ZipError::Malformed("entry name out of range"));
            }
            let name = String::from_utf8_lossy(&data[at + 46..name_end]).into_owned();
            let is_dir = name.ends_with('/');
            entries.push(ZipEntryMeta {
                name,
                method,
                flags,
                compressed_size: u64::from(compressed),
                uncompressed_size: u64::from(uncompressed),
                header_offset: u64::from(header_offset),
                is_dir,
            });
            at = name_end + extra_len + comment_len;
        }
        Ok(ZipArchive { data, entries })
    }

    pub fn entries(&self) -> &[ZipEntryMeta] {
        &self.entries
    }

    /// Opens the decompressed payload of one entry.
    pub fn entry_reader(&self, meta: &ZipEntryMeta) -> Result<Box<dyn Read + 'a>, ZipError> {
        if meta.is_encrypted() {
            return Err(ZipError::Unsupported("encrypted entry"));
        }
        let at = meta.header_offset as usize;
        if at + LFH_MIN > self.data.len() || read_u32(self.data, at) != LFH_SIG {
            return Err(ZipError::Malformed("local file header"));
        }
        let name_len = read_u16(self.data, at + 26) as usize;
        let extra_len = read_u16(self.data, at + 28) as usize;
        let start = at + LFH_MIN + name_len + extra_len;
        let end = start
            .checked_add(meta.compressed_size as usize)
            .ok_or(ZipError::Malformed("payload length overflow"))?;
        if end > self.data.len() {
            return Err(ZipError::Malformed("payload out of range"));
        }
        let payload = &self.data[start..end];
        match meta.method {
            METHOD_STORED => Ok(Box::new(payload)),
            METHOD_DEFLATE => Ok(Box::new(DeflateDecoder::new(payload))),
            _ => Err(ZipError::Unsupported("compression method")),
        }
    }
}

fn find_eocd(data: &[u8]) -> Option<usize> {
    if data.len() < EOCD_MIN {
        return None;
    }
    let floor = data.len().saturating_sub(EOCD_SCAN_MAX);
    let mut at = data.len() - EOCD_MIN;
    loop {
        if read_u32(data, at) == EOCD_SIG {
            return Some(at);
        }
        if at == floor {
            return None;
        }
        at -= 1;
    }
}

fn read_u16(data: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([data[at], data[at + 1]])
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn zip_fixture(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut w = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let opts = zip::write::FileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        for (name, data) in entries {
            w.start_file(*name, opts).unwrap();
            w.write_all(data).unwrap();
        }
        w.finish().unwrap().into_inner()
    }

    #[test]
    fn parses_directory_and_reads_entries() {
        let data = zip_fixture(&[("a.txt", b"alpha"), ("sub/b.txt", b"beta bytes")]);
        let archive = ZipArchive::parse(&data).unwrap();
        assert_eq!(archive.entries().len(), 2);
        assert_eq!(archive.entries()[0].name, "a.txt");
        assert_eq!(archive.entries()[1].uncompressed_size, 10);

        let mut out = Vec::new();
        archive
            .entry_reader(&archive.entries()[1].clone())
            .unwrap()
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, b"beta bytes");
    }

    #[test]
    fn stored_entries_read_back() {
        let mut w = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let opts =
            zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
        w.start_file("raw.bin", opts).unwrap();
        w.write_all(b"uncompressed").unwrap();
        let data = w.finish().unwrap().into_inner();

        let archive = ZipArchive::parse(&data).unwrap();
        let mut out = Vec::new();
        archive
            .entry_reader(&archive.entries()[0].clone())
            .unwrap()
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, b"uncompressed");
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(ZipArchive::parse(b"PK not really").is_err());
        assert!(ZipArchive::parse(b"").is_err());
    }

    #[test]
    fn directory_entries_are_flagged() {
        let mut w = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        w.add_directory("dir/", zip::write::FileOptions::default())
            .unwrap();
        let data = w.finish().unwrap().into_inner();
        let archive = ZipArchive::parse(&data).unwrap();
        assert!(archive.entries()[0].is_dir);
    }
}
