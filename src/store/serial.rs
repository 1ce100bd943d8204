//! Store persistence.
//!
//! # Invariants
//! - The on-disk image is id-addressed: every cross-node reference is the
//!   node's arena index, recorded explicitly so the load can check it.
//!   Load order is fingerprints, files, archives, repos, stat cache.
//! - A restored store must pass `verify()`; otherwise it is discarded and
//!   the session starts empty.
//!
//! # Design Notes
//! - Two equivalent encodings are written: a Snappy-framed bincode stream
//!   (`fingerprint.gob`) and a yaml map-of-lists (`fingerprint.yaml`). The
//!   yaml form is the canonical one read back by default; only one form is
//!   consulted per session.

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::record::{
    ArchiveFile, File, FileId, FingerprintId, GitRepoSource, SerializedArchive, SerializedFile,
    SerializedRepo,
};
use crate::record::Fingerprint;

use super::{FingerprintStore, StoreError};

/// Binary image file name (Snappy stream magic, bincode payload).
pub const STORE_BIN_FILE: &str = "fingerprint.gob";
/// Textual image file name; the canonical restore source.
pub const STORE_YAML_FILE: &str = "fingerprint.yaml";

/// On-disk form of a fingerprint row.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SerializedFingerprint {
    pub id: u64,
    pub fingerprint: Fingerprint,
}

/// The whole store as a map of lists, every reference a `u64` id.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SerializedStore {
    #[serde(default)]
    pub fingerprints: Vec<SerializedFingerprint>,
    #[serde(default)]
    pub files: Vec<SerializedFile>,
    #[serde(default)]
    pub archives: Vec<SerializedArchive>,
    #[serde(default)]
    pub repos: Vec<SerializedRepo>,
    #[serde(default)]
    pub stat_cache: BTreeMap<String, u64>,
}

impl FingerprintStore {
    /// Snapshots the store into its serializable form.
    ///
    /// Takes every table lock in the canonical order for a consistent image.
    pub fn to_serialized(&self) -> SerializedStore {
        let fps = self.fingerprints.lock();
        let files = self.files.lock();
        let archives = self.archives.lock();
        let repos = self.repos.lock();
        let stat_cache = self.stat_cache.lock();

        let mut out = SerializedStore {
            fingerprints: Vec::with_capacity(fps.rows.len()),
            files: Vec::with_capacity(files.len()),
            archives: Vec::with_capacity(archives.len()),
            repos: Vec::with_capacity(repos.len()),
            stat_cache: BTreeMap::new(),
        };
        for (i, fp) in fps.rows.iter().enumerate() {
            out.fingerprints.push(SerializedFingerprint {
                id: i as u64,
                fingerprint: fp.clone(),
            });
        }
        for (i, f) in files.iter().enumerate() {
            out.files.push(SerializedFile {
                id: i as u64,
                path: f.path.clone(),
                fingerprint: f.fingerprint.0,
            });
        }
        for (i, a) in archives.iter().enumerate() {
            out.archives.push(SerializedArchive {
                id: i as u64,
                file: a.file.0,
                entries: a.entries.iter().map(|e| e.0).collect(),
            });
        }
        for (i, r) in repos.iter().enumerate() {
            out.repos.push(SerializedRepo {
                id: i as u64,
                commit: r.commit,
                branch: r.branch.clone(),
                tag: r.tag.clone(),
                url: r.url.clone(),
                files: r.files.iter().map(|f| f.0).collect(),
            });
        }
        for (key, fp_id) in stat_cache.iter() {
            out.stat_cache.insert(key.clone(), fp_id.0);
        }
        out
    }

    /// Rebuilds a store from its serialized form.
    ///
    /// Ids must equal positions and references must land inside their
    /// tables; any violation is a [`StoreError`] and the image is rejected.
    pub fn from_serialized(image: SerializedStore) -> Result<FingerprintStore, StoreError> {
        let store = FingerprintStore::new();
        {
            let mut fps = store.fingerprints.lock();
            for (i, row) in image.fingerprints.into_iter().enumerate() {
                if row.id != i as u64 {
                    return Err(StoreError::InconsistentId {
                        table: "fingerprint",
                        index: i as u64,
                        found: Some(row.id),
                    });
                }
                let mut fp = row.fingerprint;
                fp.set_cache_id(row.id);
                fps.index_git(fp.git_sha, row.id);
                fps.rows.push(fp);
            }
            let fp_len = fps.rows.len();

            let mut files = store.files.lock();
            for (i, row) in image.files.into_iter().enumerate() {
                if row.id != i as u64 {
                    return Err(StoreError::InconsistentId {
                        table: "file",
                        index: i as u64,
                        found: Some(row.id),
                    });
                }
                if row.fingerprint as usize >= fp_len {
                    return Err(StoreError::DanglingReference {
                        table: "fingerprint",
                        id: row.fingerprint,
                        len: fp_len,
                    });
                }
                let mut file = File::new(row.path, FingerprintId(row.fingerprint));
                file.set_cache_id(row.id);
                files.push(file);
            }
            let file_len = files.len();

            let mut archives = store.archives.lock();
            for (i, row) in image.archives.into_iter().enumerate() {
                if row.id != i as u64 {
                    return Err(StoreError::InconsistentId {
                        table: "archive",
                        index: i as u64,
                        found: Some(row.id),
                    });
                }
                for reference in std::iter::once(row.file).chain(row.entries.iter().copied()) {
                    if reference as usize >= file_len {
                        return Err(StoreError::DanglingReference {
                            table: "file",
                            id: reference,
                            len: file_len,
                        });
                    }
                }
                let mut archive = ArchiveFile::new(
                    FileId(row.file),
                    row.entries.into_iter().map(FileId).collect(),
                );
                archive.set_cache_id(row.id);
                archives.push(archive);
            }

            let mut repos = store.repos.lock();
            for (i, row) in image.repos.into_iter().enumerate() {
                if row.id != i as u64 {
                    return Err(StoreError::InconsistentId {
                        table: "repo",
                        index: i as u64,
                        found: Some(row.id),
                    });
                }
                for &reference in &row.files {
                    if reference as usize >= file_len {
                        return Err(StoreError::DanglingReference {
                            table: "file",
                            id: reference,
                            len: file_len,
                        });
                    }
                }
                let mut source = GitRepoSource::default();
                source.commit = row.commit;
                source.branch = row.branch;
                source.tag = row.tag;
                source.url = row.url;
                source.files = row.files.into_iter().map(FileId).collect();
                source.set_cache_id(row.id);
                repos.push(source);
            }

            let mut stat_cache = store.stat_cache.lock();
            for (key, fp_id) in image.stat_cache {
                if fp_id as usize >= fp_len {
                    return Err(StoreError::DanglingReference {
                        table: "fingerprint",
                        id: fp_id,
                        len: fp_len,
                    });
                }
                stat_cache.put(key, FingerprintId(fp_id));
            }
        }
        Ok(store)
    }

    /// Writes both on-disk forms into `dir`.
    ///
    /// Refuses to write anything when `verify()` fails.
    pub fn persist_remembered_objects(&self, dir: &Path) -> Result<(), StoreError> {
        self.verify()?;
        let image = self.to_serialized();

        let bin = fs::File::create(dir.join(STORE_BIN_FILE))?;
        let mut snappy = snap::write::FrameEncoder::new(BufWriter::new(bin));
        bincode::serialize_into(&mut snappy, &image)
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        snappy
            .into_inner()
            .map_err(|e| StoreError::Decode(e.to_string()))?
            .flush()?;

        let yaml = fs::File::create(dir.join(STORE_YAML_FILE))?;
        let mut yaml = BufWriter::new(yaml);
        serde_yaml::to_writer(&mut yaml, &image).map_err(|e| StoreError::Decode(e.to_string()))?;
        yaml.flush()?;
        Ok(())
    }
}

/// Decodes the binary image from a Snappy-framed bincode stream.
pub fn read_bin_image(r: impl Read) -> Result<SerializedStore, StoreError> {
    let decoder = snap::read::FrameDecoder::new(r);
    bincode::deserialize_from(decoder).map_err(|e| StoreError::Decode(e.to_string()))
}

/// Decodes the textual image.
pub fn read_yaml_image(r: impl Read) -> Result<SerializedStore, StoreError> {
    serde_yaml::from_reader(r).map_err(|e| StoreError::Decode(e.to_string()))
}

/// Which persisted form to read back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestoreSource {
    Yaml,
    Bin,
}

/// Loads a previously persisted store from `dir`.
///
/// Returns `None` (and logs why) when nothing usable is on disk; a restored
/// image that fails `verify()` is discarded the same way.
pub fn restore_remembered_objects(dir: &Path, source: RestoreSource) -> Option<FingerprintStore> {
    let (path, image) = match source {
        RestoreSource::Yaml => {
            let path = dir.join(STORE_YAML_FILE);
            let file = match fs::File::open(&path) {
                Ok(f) => f,
                Err(err) => {
                    info!(path = %path.display(), %err, "no persisted store to restore");
                    return None;
                }
            };
            (path, read_yaml_image(BufReader::new(file)))
        }
        RestoreSource::Bin => {
            let path = dir.join(STORE_BIN_FILE);
            let file = match fs::File::open(&path) {
                Ok(f) => f,
                Err(err) => {
                    info!(path = %path.display(), %err, "no persisted store to restore");
                    return None;
                }
            };
            (path, read_bin_image(BufReader::new(file)))
        }
    };
    let image = match image {
        Ok(image) => image,
        Err(err) => {
            warn!(path = %path.display(), %err, "could not decode persisted store");
            return None;
        }
    };
    let store = match FingerprintStore::from_serialized(image) {
        Ok(store) => store,
        Err(err) => {
            warn!(path = %path.display(), %err, "persisted store is inconsistent; starting empty");
            return None;
        }
    };
    if let Err(err) = store.verify() {
        warn!(path = %path.display(), %err, "restored store failed verification; starting empty");
        return None;
    }
    Some(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ArchiveFile;
    use std::io::Cursor;

    fn populated_store() -> FingerprintStore {
        let store = FingerprintStore::new();
        let mut fp_a = Fingerprint::default();
        fp_a.calculate_sums(&mut Cursor::new(b"first blob".to_vec()), 10)
            .unwrap();
        let mut fp_b = Fingerprint::default();
        fp_b.calculate_sums(&mut Cursor::new(b"second blob".to_vec()), 11)
            .unwrap();
        let a = store.put_fingerprint(fp_a);
        let b = store.put_fingerprint(fp_b);
        let container = store.put_file(File::new("bundle.tar", a));
        let entry = store.put_file(File::new("lib/util.c", b));
        store.put_archive_file(ArchiveFile::new(container, vec![entry]));
        let mut repo = GitRepoSource::default();
        repo.commit = store.fingerprint(b).git_sha;
        repo.branch = "master".into();
        repo.record_blob(entry);
        store.put_git_source(repo);
        store
    }

    fn assert_equivalent(restored: &FingerprintStore, original: &FingerprintStore) {
        assert_eq!(restored.fingerprint_count(), original.fingerprint_count());
        assert_eq!(restored.file_count(), original.file_count());
        assert_eq!(restored.archive_count(), original.archive_count());
        assert_eq!(restored.repo_count(), original.repo_count());
        assert!(restored.verify().is_ok());
        // Cross-digest lookup still works after the round trip.
        for i in 0..original.fingerprint_count() {
            let fp = original.fingerprint(crate::record::FingerprintId(i as u64));
            assert!(restored.get_fingerprint_by_git_sha(fp.git_sha).is_some());
        }
    }

    #[test]
    fn yaml_round_trip() {
        let store = populated_store();
        let mut buf = Vec::new();
        serde_yaml::to_writer(&mut buf, &store.to_serialized()).unwrap();
        let image = read_yaml_image(Cursor::new(buf)).unwrap();
        let restored = FingerprintStore::from_serialized(image).unwrap();
        assert_equivalent(&restored, &store);
    }

    #[test]
    fn bin_round_trip_with_snappy_magic() {
        let store = populated_store();
        let mut buf = Vec::new();
        {
            let mut enc = snap::write::FrameEncoder::new(&mut buf);
            bincode::serialize_into(&mut enc, &store.to_serialized()).unwrap();
        }
        assert_eq!(&buf[..10], b"\xff\x06\x00\x00sNaPpY");
        let image = read_bin_image(Cursor::new(buf)).unwrap();
        let restored = FingerprintStore::from_serialized(image).unwrap();
        assert_equivalent(&restored, &store);
    }

    #[test]
    fn persist_and_restore_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = populated_store();
        store.persist_remembered_objects(dir.path()).unwrap();
        assert!(dir.path().join(STORE_BIN_FILE).exists());
        assert!(dir.path().join(STORE_YAML_FILE).exists());
        let restored = restore_remembered_objects(dir.path(), RestoreSource::Yaml).unwrap();
        assert_equivalent(&restored, &store);
        let restored_bin = restore_remembered_objects(dir.path(), RestoreSource::Bin).unwrap();
        assert_equivalent(&restored_bin, &store);
    }

    #[test]
    fn restore_of_missing_dir_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(restore_remembered_objects(dir.path(), RestoreSource::Yaml).is_none());
    }

    #[test]
    fn mismatched_ids_reject_the_image() {
        let store = populated_store();
        let mut image = store.to_serialized();
        image.files[0].id = 42;
        assert!(FingerprintStore::from_serialized(image).is_err());
    }

    #[test]
    fn dangling_references_reject_the_image() {
        let store = populated_store();
        let mut image = store.to_serialized();
        image.archives[0].entries.push(999);
        assert!(FingerprintStore::from_serialized(image).is_err());
    }

    #[test]
    fn stat_cache_entries_survive_the_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let probe = dir.path().join("probe");
        std::fs::write(&probe, b"first blob").unwrap();
        let meta = std::fs::metadata(&probe).unwrap();

        let store = populated_store();
        store.put_stat_fingerprint(&meta, crate::record::FingerprintId(0));
        let image = store.to_serialized();
        assert_eq!(image.stat_cache.len(), 1);
        let restored = FingerprintStore::from_serialized(image).unwrap();
        assert_eq!(
            restored.get_stat_fingerprint(&meta),
            Some(crate::record::FingerprintId(0))
        );
    }
}
