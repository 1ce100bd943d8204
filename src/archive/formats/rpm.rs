//! RPM package preamble parser.
//!
//! Reads just enough of an RPM stream to reach the payload: the 96-byte
//! lead, the signature header (8-aligned), and the main header, from which
//! the payload format (tag 1124) and compression (tag 1125) are extracted.
//! The reader is left positioned at the first payload byte, which is a
//! compressed cpio stream in every RPM this tool cares about.

use std::fmt;
use std::io::{self, Read};

use super::read_exact_or_eof;

const LEAD_LEN: usize = 96;
const LEAD_MAGIC: [u8; 4] = [0xed, 0xab, 0xee, 0xdb];
const HEADER_MAGIC: [u8; 3] = [0x8e, 0xad, 0xe8];

const TAG_PAYLOAD_FORMAT: u32 = 1124;
const TAG_PAYLOAD_COMPRESSION: u32 = 1125;
const TYPE_STRING: u32 = 6;

/// Caps on header geometry; real packages stay far below these.
const MAX_INDEX_ENTRIES: u32 = 65536;
const MAX_STORE_BYTES: u32 = 256 * 1024 * 1024;

/// Errors from RPM preamble parsing.
#[derive(Debug)]
#[non_exhaustive]
pub enum RpmError {
    NotAnRpm,
    Malformed(&'static str),
    Io(io::Error),
}

impl fmt::Display for RpmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpmError::NotAnRpm => write!(f, "not an rpm package"),
            RpmError::Malformed(what) => write!(f, "malformed rpm: {what}"),
            RpmError::Io(err) => write!(f, "rpm read error: {err}"),
        }
    }
}

impl std::error::Error for RpmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RpmError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for RpmError {
    fn from(err: io::Error) -> Self {
        RpmError::Io(err)
    }
}

/// What the package headers say about the payload.
#[derive(Clone, Debug)]
pub struct RpmInfo {
    /// Payload archive format; `cpio` unless the package says otherwise.
    pub payload_format: String,
    /// Payload compression algorithm; `gzip` unless stated.
    pub payload_compression: String,
}

/// Consumes the lead and both headers, returning payload parameters.
pub fn read_rpm_preamble<R: Read + ?Sized>(input: &mut R) -> Result<RpmInfo, RpmError> {
    let mut lead = [0u8; LEAD_LEN];
    if !read_exact_or_eof(input, &mut lead)? {
        return Err(RpmError::NotAnRpm);
    }
    if lead[0..4] != LEAD_MAGIC {
        return Err(RpmError::NotAnRpm);
    }

    // Signature header, padded to 8 bytes.
    let (_, sig_store_len) = read_header_section(input, &mut Vec::new(), &mut Vec::new())?;
    let sig_pad = (8 - sig_store_len % 8) % 8;
    skip(input, u64::from(sig_pad))?;

    // Main header carries the payload tags.
    let mut index = Vec::new();
    let mut store = Vec::new();
    read_header_section(input, &mut index, &mut store)?;

    let mut info = RpmInfo {
        payload_format: "cpio".to_string(),
        payload_compression: "gzip".to_string(),
    };
    for entry in &index {
        if entry.kind != TYPE_STRING {
            continue;
        }
        match entry.tag {
            TAG_PAYLOAD_FORMAT => {
                if let Some(value) = store_string(&store, entry.offset) {
                    info.payload_format = value;
                }
            }
            TAG_PAYLOAD_COMPRESSION => {
                if let Some(value) = store_string(&store, entry.offset) {
                    info.payload_compression = value;
                }
            }
            _ => {}
        }
    }
    Ok(info)
}

struct IndexEntry {
    tag: u32,
    kind: u32,
    offset: u32,
}

/// Reads one header section: magic, index entries, and the data store.
///
/// Returns the index entry count and store length so the caller can apply
/// the signature section's alignment rule.
fn read_header_section<R: Read + ?Sized>(
    input: &mut R,
    index: &mut Vec<IndexEntry>,
    store: &mut Vec<u8>,
) -> Result<(u32, u32), RpmError> {
    let mut intro = [0u8; 16];
    if !read_exact_or_eof(input, &mut intro)? {
        return Err(RpmError::Malformed("truncated header"));
    }
    if intro[0..3] != HEADER_MAGIC {
        return Err(RpmError::Malformed("bad header magic"));
    }
    let entry_count = u32::from_be_bytes([intro[8], intro[9], intro[10], intro[11]]);
    let store_len = u32::from_be_bytes([intro[12], intro[13], intro[14], intro[15]]);
    if entry_count > MAX_INDEX_ENTRIES || store_len > MAX_STORE_BYTES {
        return Err(RpmError::Malformed("implausible header geometry"));
    }

    for _ in 0..entry_count {
        let mut raw = [0u8; 16];
        if !read_exact_or_eof(input, &mut raw)? {
            return Err(RpmError::Malformed("truncated header index"));
        }
        index.push(IndexEntry {
            tag: u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]),
            kind: u32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]),
            offset: u32::from_be_bytes([raw[8], raw[9], raw[10], raw[11]]),
        });
    }

    store.resize(store_len as usize, 0);
    if store_len > 0 && !read_exact_or_eof(input, store)? {
        return Err(RpmError::Malformed("truncated header store"));
    }
    Ok((entry_count, store_len))
}

fn store_string(store: &[u8], offset: u32) -> Option<String> {
    let start = offset as usize;
    if start >= store.len() {
        return None;
    }
    let end = store[start..].iter().position(|&b| b == 0)? + start;
    Some(String::from_utf8_lossy(&store[start..end]).into_owned())
}

fn skip<R: Read + ?Sized>(input: &mut R, mut n: u64) -> io::Result<()> {
    let mut buf = [0u8; 64];
    while n > 0 {
        let step = (buf.len() as u64).min(n) as usize;
        let got = input.read(&mut buf[..step])?;
        if got == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "rpm stream ended inside header padding",
            ));
        }
        n -= got as u64;
    }
    Ok(())
}

/// Builds a minimal rpm preamble followed by `payload`; test fixture shared
/// with the package scanner tests.
#[cfg(test)]
pub(crate) fn rpm_fixture(compression: &str, payload: &[u8]) -> Vec<u8> {
    fn header_section(entries: &[(u32, u32, &[u8])]) -> Vec<u8> {
        let mut index = Vec::new();
        let mut store = Vec::new();
        for &(tag, kind, value) in entries {
            index.extend_from_slice(&tag.to_be_bytes());
            index.extend_from_slice(&kind.to_be_bytes());
            index.extend_from_slice(&(store.len() as u32).to_be_bytes());
            index.extend_from_slice(&1u32.to_be_bytes());
            store.extend_from_slice(value);
            store.push(0);
        }
        let mut out = Vec::new();
        out.extend_from_slice(&HEADER_MAGIC);
        out.push(1);
        out.extend_from_slice(&[0u8; 4]);
        out.extend_from_slice(&(entries.len() as u32).to_be_bytes());
        out.extend_from_slice(&(store.len() as u32).to_be_bytes());
        out.extend_from_slice(&index);
        out.extend_from_slice(&store);
        out
    }

    let mut out = Vec::new();
    out.extend_from_slice(&LEAD_MAGIC);
    out.extend_from_slice(&[0u8; LEAD_LEN - 4]);
    let sig = header_section(&[]);
    out.extend_from_slice(&sig);
    // Signature store is empty here, so no alignment padding is due.
    out.extend_from_slice(&header_section(&[
        (TAG_PAYLOAD_FORMAT, TYPE_STRING, b"cpio"),
        (TAG_PAYLOAD_COMPRESSION, TYPE_STRING, compression.as_bytes()),
    ]));
    out.extend_from_slice(payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn extracts_payload_parameters() {
        let data = rpm_fixture("xz", b"PAYLOAD");
        let mut input = Cursor::new(data);
        let info = read_rpm_preamble(&mut input).unwrap();
        assert_eq!(info.payload_format, "cpio");
        assert_eq!(info.payload_compression, "xz");
        let mut rest = Vec::new();
        input.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"PAYLOAD", "reader must sit at the payload");
    }

    #[test]
    fn defaults_apply_when_tags_are_absent() {
        let mut data = Vec::new();
        data.extend_from_slice(&LEAD_MAGIC);
        data.extend_from_slice(&[0u8; LEAD_LEN - 4]);
        for _ in 0..2 {
            data.extend_from_slice(&HEADER_MAGIC);
            data.push(1);
            data.extend_from_slice(&[0u8; 4]);
            data.extend_from_slice(&0u32.to_be_bytes());
            data.extend_from_slice(&0u32.to_be_bytes());
        }
        let info = read_rpm_preamble(&mut Cursor::new(data)).unwrap();
        assert_eq!(info.payload_compression, "gzip");
        assert_eq!(info.payload_format, "cpio");
    }

    #[test]
    fn wrong_lead_magic_is_not_an_rpm() {
        let mut input = Cursor::new(vec![0u8; 200]);
        assert!(matches!(
            read_rpm_preamble(&mut input),
            Err(RpmError::NotAnRpm)
        ));
    }
}
