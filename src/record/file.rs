//! Files and archive containment.

use serde::{Deserialize, Serialize};

use super::{FileId, FingerprintId};

/// A fingerprinted path. The path is whatever name the scanner saw: a
/// filesystem path for on-disk files, an entry name for archive members, a
/// repo-relative path for git blobs. Never mutated after interning.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct File {
    pub path: String,
    pub fingerprint: FingerprintId,
    cache_id: Option<u64>,
}

impl File {
    pub fn new(path: impl Into<String>, fingerprint: FingerprintId) -> Self {
        File {
            path: path.into(),
            fingerprint,
            cache_id: None,
        }
    }

    pub fn cache_id(&self) -> Option<u64> {
        self.cache_id
    }

    pub fn set_cache_id(&mut self, id: u64) {
        self.cache_id = Some(id);
    }
}

/// An archive and the files it directly contains, in scan order.
///
/// Entries may themselves have an ArchiveFile of their own; that nesting is
/// not recorded here, only direct containment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveFile {
    pub file: FileId,
    pub entries: Vec<FileId>,
    cache_id: Option<u64>,
}

impl ArchiveFile {
    pub fn new(file: FileId, entries: Vec<FileId>) -> Self {
        ArchiveFile {
            file,
            entries,
            cache_id: None,
        }
    }

    pub fn cache_id(&self) -> Option<u64> {
        self.cache_id
    }

    pub fn set_cache_id(&mut self, id: u64) {
        self.cache_id = Some(id);
    }
}

/// On-disk form of [`File`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SerializedFile {
    pub id: u64,
    pub path: String,
    pub fingerprint: u64,
}

/// On-disk form of [`ArchiveFile`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SerializedArchive {
    pub id: u64,
    pub file: u64,
    #[serde(default)]
    pub entries: Vec<u64>,
}
