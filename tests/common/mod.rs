//! Fixture builders shared by the integration suites.
//!
//! Archive bytes are synthesized with minimal headers so the tests control
//! exactly what the scanners see, including deliberately damaged regions.
#![allow(dead_code)]

use std::io::Write;

pub const TAR_BLOCK: usize = 512;

/// Builds one ustar header block with a correct checksum.
pub fn tar_header(name: &str, size: u64, typeflag: u8) -> [u8; TAR_BLOCK] {
    let mut hdr = [0u8; TAR_BLOCK];
    hdr[..name.len()].copy_from_slice(name.as_bytes());
    hdr[100..107].copy_from_slice(b"0000644");
    hdr[108..115].copy_from_slice(b"0000000");
    hdr[116..123].copy_from_slice(b"0000000");
    let size_field = format!("{size:011o} ");
    hdr[124..124 + size_field.len()].copy_from_slice(size_field.as_bytes());
    hdr[136..147].copy_from_slice(b"00000000000");
    hdr[156] = typeflag;
    hdr[257..262].copy_from_slice(b"ustar");
    hdr[263..265].copy_from_slice(b"00");
    let mut sum: u64 = 0;
    for (i, &b) in hdr.iter().enumerate() {
        sum += if (148..156).contains(&i) {
            u64::from(b' ')
        } else {
            u64::from(b)
        };
    }
    let chk = format!("{sum:06o}\0 ");
    hdr[148..156].copy_from_slice(chk.as_bytes());
    hdr
}

/// Builds a tar stream of regular files, terminated by two zero blocks.
pub fn tarball(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut out = Vec::new();
    for (name, data) in entries {
        out.extend_from_slice(&tar_header(name, data.len() as u64, b'0'));
        out.extend_from_slice(data);
        let pad = (TAR_BLOCK - data.len() % TAR_BLOCK) % TAR_BLOCK;
        out.extend_from_slice(&vec![0u8; pad]);
    }
    out.extend_from_slice(&[0u8; 2 * TAR_BLOCK]);
    out
}

/// Gzip-compresses `data`.
pub fn gzipped(data: &[u8]) -> Vec<u8> {
    let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

/// Builds a zip with deflate-compressed entries.
pub fn zipball(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut w = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let opts =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, data) in entries {
        w.start_file(*name, opts).unwrap();
        w.write_all(data).unwrap();
    }
    w.finish().unwrap().into_inner()
}

/// Builds an ar archive (GNU-style slash-terminated names).
pub fn arball(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"!<arch>\n");
    for (name, data) in entries {
        let mut hdr = [b' '; 60];
        let named = format!("{name}/");
        hdr[..named.len()].copy_from_slice(named.as_bytes());
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

/// Builds a newc cpio archive of regular files.
pub fn cpioball(entries: &[(&str, &[u8])]) -> Vec<u8> {
    fn record(out: &mut Vec<u8>, name: &str, data: &[u8], mode: u32) {
        out.extend_from_slice(b"070701");
        let fields = [
            0u64,
            u64::from(mode),
            0,
            0,
            1,
            0,
            data.len() as u64,
            0,
            0,
            0,
            0,
            (name.len() + 1) as u64,
            0,
        ];
        for f in fields {
            out.extend_from_slice(format!("{f:08x}").as_bytes());
        }
        out.extend_from_slice(name.as_bytes());
        out.push(0);
        while out.len() % 4 != 0 {
            out.push(0);
        }
        out.extend_from_slice(data);
        while out.len() % 4 != 0 {
            out.push(0);
        }
    }
    let mut out = Vec::new();
    for (name, data) in entries {
        record(&mut out, name, data, 0o100644);
    }
    record(&mut out, "TRAILER!!!", b"", 0);
    out
}

/// Builds a minimal rpm: lead, empty signature header, main header naming
/// the payload compression, then the payload bytes.
pub fn rpmball(compression: &str, payload: &[u8]) -> Vec<u8> {
    fn header(entries: &[(u32, &[u8])]) -> Vec<u8> {
        let mut index = Vec::new();
        let mut store = Vec::new();
        for &(tag, value) in entries {
            index.extend_from_slice(&tag.to_be_bytes());
            index.extend_from_slice(&6u32.to_be_bytes());
            index.extend_from_slice(&(store.len() as u32).to_be_bytes());
            index.extend_from_slice(&1u32.to_be_bytes());
            store.extend_from_slice(value);
            store.push(0);
        }
        let mut out = vec![0x8e, 0xad, 0xe8, 0x01, 0, 0, 0, 0];
        out.extend_from_slice(&(entries.len() as u32).to_be_bytes());
        out.extend_from_slice(&(store.len() as u32).to_be_bytes());
        out.extend_from_slice(&index);
        out.extend_from_slice(&store);
        out
    }

    let mut out = vec![0xed, 0xab, 0xee, 0xdb];
    out.extend_from_slice(&[0u8; 92]);
    out.extend_from_slice(&header(&[]));
    out.extend_from_slice(&header(&[(1124, b"cpio"), (1125, compression.as_bytes())]));
    out.extend_from_slice(payload);
    out
}
