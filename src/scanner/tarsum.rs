//! Docker tarsum, version 1.
//!
//! Tarsum identifies a tar stream by its logical contents rather than its
//! exact bytes: each entry contributes a sha256 over selected header fields
//! plus its payload, the per-entry sums are sorted, and the final digest is
//! a sha256 over the sorted hex strings. Version 1 excludes timestamps and
//! cleans entry names, so repacking a layer does not change its tarsum.

use sha2::{Digest as _, Sha256};

use crate::archive::formats::TarEntryMeta;

/// Accumulates tarsum.v1+sha256 over a layer tar.
pub struct TarSum {
    entry_sums: Vec<String>,
    current: Option<Sha256>,
}

impl Default for TarSum {
    fn default() -> Self {
        Self::new()
    }
}

impl TarSum {
    pub fn new() -> Self {
        TarSum {
            entry_sums: Vec::new(),
            current: None,
        }
    }

    /// Starts a new entry, folding its header fields into the entry hash.
    pub fn begin_entry(&mut self, meta: &TarEntryMeta<'_>) {
        let mut hasher = Sha256::new();
        let name = clean_name(meta.name);
        let mode = meta.mode.to_string();
        let uid = meta.uid.to_string();
        let gid = meta.gid.to_string();
        let size = meta.size.to_string();
        let typeflag = [printable_typeflag(meta.typeflag)];
        let devmajor = meta.devmajor.to_string();
        let devminor = meta.devminor.to_string();
        let fields: [(&str, &[u8]); 11] = [
            ("name", &name),
            ("mode", mode.as_bytes()),
            ("uid", uid.as_bytes()),
            ("gid", gid.as_bytes()),
            ("size", size.as_bytes()),
            ("typeflag", &typeflag),
            ("linkname", meta.linkname),
            ("uname", meta.uname),
            ("gname", meta.gname),
            ("devmajor", devmajor.as_bytes()),
            ("devminor", devminor.as_bytes()),
        ];
        for (key, value) in fields {
            hasher.update(key.as_bytes());
            hasher.update(value);
        }
        self.current = Some(hasher);
    }

    /// Folds payload bytes into the current entry hash.
    pub fn append_payload(&mut self, bytes: &[u8]) {
        if let Some(hasher) = self.current.as_mut() {
            hasher.update(bytes);
        }
    }

    /// Closes the current entry.
    pub fn end_entry(&mut self) {
        if let Some(hasher) = self.current.take() {
            self.entry_sums.push(hex::encode(hasher.finalize()));
        }
    }

    /// Final rendered tarsum.
    pub fn finalize(mut self) -> String {
        self.end_entry();
        self.entry_sums.sort();
        let mut hasher = Sha256::new();
        for sum in &self.entry_sums {
            hasher.update(sum.as_bytes());
        }
        format!("tarsum.v1+sha256:{}", hex::encode(hasher.finalize()))
    }
}

/// v1 name cleaning: a leading `./` is dropped, directories keep their
/// trailing slash.
fn clean_name(name: &[u8]) -> Vec<u8> {
    let name = name.strip_prefix(b"./").unwrap_or(name);
    if name.is_empty() {
        b".".to_vec()
    } else {
        name.to_vec()
    }
}

fn printable_typeflag(flag: u8) -> u8 {
    if flag == 0 {
        b'0'
    } else {
        flag
    }
}
