//! Content-addressed graph store.
//!
//! # Invariants
//! - The store owns every interned node; everything else holds typed ids.
//! - Interning is insert-or-merge: the first of two equal fingerprints wins
//!   and later observations fill its missing digests. Ids are stable for the
//!   life of the store and equal to the arena index.
//! - Multi-table operations take the table locks in the fixed order
//!   fingerprints -> files -> archives -> repos.
//!
//! # Design Notes
//! - The git-sha index answers the hottest lookup; a Bloom filter in front
//!   of it makes the common miss cheap.
//! - The stat cache maps `<size>,<inode>,<mtime-ns>` (base 36) to an
//!   interned fingerprint so unchanged files are never re-hashed.

pub mod serial;

use std::fs;

use ahash::AHashMap;
use lru::LruCache;
use parking_lot::Mutex;
use std::fmt;
use std::num::NonZeroUsize;

use crate::hash::GitSha;
use crate::record::{
    ArchiveFile, ArchiveId, File, FileId, Fingerprint, FingerprintId, GitRepoSource, RepoId,
};
use crate::stdx::{base36, BloomFilter};

/// Initial arena capacity for fingerprints and files.
const ARENA_CAPACITY: usize = 1024;
/// Expected git-sha population; sizes the exact index and the Bloom filter.
const GIT_INDEX_CAPACITY: usize = 100 * 1024;
/// Bloom filter false-positive target.
const GIT_FILTER_FPR: f64 = 1e-6;
/// Stat-cache entry bound.
const STAT_CACHE_CAPACITY: usize = 1 << 20;

/// Store consistency violations.
#[derive(Debug)]
#[non_exhaustive]
pub enum StoreError {
    /// An arena slot's recorded id does not match its index.
    InconsistentId {
        table: &'static str,
        index: u64,
        found: Option<u64>,
    },
    /// A serialized reference points outside the table it indexes.
    DanglingReference {
        table: &'static str,
        id: u64,
        len: usize,
    },
    /// The on-disk image could not be decoded.
    Decode(String),
    Io(std::io::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::InconsistentId {
                table,
                index,
                found,
            } => write!(
                f,
                "incorrect id on {table} entry: expected {index}, found {found:?}"
            ),
            StoreError::DanglingReference { table, id, len } => {
                write!(f, "{table} reference {id} outside table of {len}")
            }
            StoreError::Decode(what) => write!(f, "could not decode store image: {what}"),
            StoreError::Io(err) => write!(f, "store I/O error: {err}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err)
    }
}

struct FingerprintTable {
    rows: Vec<Fingerprint>,
    git_index: AHashMap<GitSha, u64>,
    git_filter: BloomFilter,
}

impl FingerprintTable {
    fn new() -> Self {
        FingerprintTable {
            rows: Vec::with_capacity(ARENA_CAPACITY),
            git_index: AHashMap::with_capacity(GIT_INDEX_CAPACITY),
            git_filter: BloomFilter::optimal(GIT_INDEX_CAPACITY, GIT_FILTER_FPR),
        }
    }

    /// Filter-fronted exact lookup. Zero shas are never indexed.
    fn lookup_git(&self, sha: &GitSha) -> Option<u64> {
        if sha.is_zero() || !self.git_filter.contains(sha) {
            return None;
        }
        self.git_index.get(sha).copied()
    }

    fn index_git(&mut self, sha: GitSha, id: u64) {
        if !sha.is_zero() {
            self.git_index.insert(sha, id);
            self.git_filter.insert(&sha);
        }
    }

    /// Insert-or-merge. Returns the canonical id for `fp`.
    fn intern(&mut self, mut fp: Fingerprint) -> u64 {
        if let Some(id) = fp.cache_id() {
            return id;
        }
        let existing = self
            .lookup_git(&fp.git_sha)
            .or_else(|| {
                self.rows
                    .iter()
                    .position(|row| row.is(&fp))
                    .map(|i| i as u64)
            });
        if let Some(id) = existing {
            let row = &mut self.rows[id as usize];
            let had_git = !row.git_sha.is_zero();
            row.update_with(&fp);
            if !had_git {
                let sha = row.git_sha;
                self.index_git(sha, id);
            }
            return id;
        }
        let id = self.rows.len() as u64;
        fp.set_cache_id(id);
        self.index_git(fp.git_sha, id);
        self.rows.push(fp);
        id
    }
}

/// In-memory store for one scan session, shareable across scan workers.
pub struct FingerprintStore {
    fingerprints: Mutex<FingerprintTable>,
    files: Mutex<Vec<File>>,
    archives: Mutex<Vec<ArchiveFile>>,
    repos: Mutex<Vec<GitRepoSource>>,
    stat_cache: Mutex<LruCache<String, FingerprintId>>,
}

impl Default for FingerprintStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FingerprintStore {
    pub fn new() -> Self {
        FingerprintStore {
            fingerprints: Mutex::new(FingerprintTable::new()),
            files: Mutex::new(Vec::with_capacity(ARENA_CAPACITY)),
            archives: Mutex::new(Vec::new()),
            repos: Mutex::new(Vec::new()),
            stat_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(STAT_CACHE_CAPACITY).expect("nonzero capacity"),
            )),
        }
    }

    /// Interns `fp`, merging into an equivalent fingerprint when one exists.
    ///
    /// Callers must use the returned id (or re-read the row) afterwards; the
    /// canonical node may be an older observation of the same blob.
    pub fn put_fingerprint(&self, fp: Fingerprint) -> FingerprintId {
        FingerprintId(self.fingerprints.lock().intern(fp))
    }

    /// A copy of the interned row.
    pub fn fingerprint(&self, id: FingerprintId) -> Fingerprint {
        self.fingerprints.lock().rows[id.index()].clone()
    }

    pub fn get_fingerprint_by_git_sha(&self, sha: GitSha) -> Option<FingerprintId> {
        self.fingerprints
            .lock()
            .lookup_git(&sha)
            .map(FingerprintId)
    }

    /// Linear scan for the first fingerprint the predicate accepts.
    pub fn find_matching_fingerprint<P>(&self, matches: P) -> Option<FingerprintId>
    where
        P: Fn(&Fingerprint) -> bool,
    {
        let table = self.fingerprints.lock();
        table
            .rows
            .iter()
            .position(|fp| matches(fp))
            .map(|i| FingerprintId(i as u64))
    }

    pub fn fingerprint_count(&self) -> usize {
        self.fingerprints.lock().rows.len()
    }

    /// Interns a file, deduplicating on (path, fingerprint equivalence).
    pub fn put_file(&self, file: File) -> FileId {
        if let Some(id) = file.cache_id() {
            return FileId(id);
        }
        let fps = self.fingerprints.lock();
        let mut files = self.files.lock();
        let target = &fps.rows[file.fingerprint.index()];
        for existing in files.iter() {
            if existing.path != file.path {
                continue;
            }
            if existing.fingerprint == file.fingerprint
                || fps.rows[existing.fingerprint.index()].is(target)
            {
                return FileId(existing.cache_id().expect("interned file has an id"));
            }
        }
        let id = files.len() as u64;
        let mut file = file;
        file.set_cache_id(id);
        files.push(file);
        FileId(id)
    }

    pub fn file(&self, id: FileId) -> File {
        self.files.lock()[id.index()].clone()
    }

    pub fn file_count(&self) -> usize {
        self.files.lock().len()
    }

    pub fn get_file_by_name_and_git_sha(&self, path: &str, sha: GitSha) -> Option<FileId> {
        let fps = self.fingerprints.lock();
        let files = self.files.lock();
        files
            .iter()
            .find(|f| f.path == path && fps.rows[f.fingerprint.index()].git_sha == sha)
            .and_then(|f| f.cache_id())
            .map(FileId)
    }

    /// Every file observed with this fingerprint.
    ///
    /// The argument is normalized to an interned identity first: by git-sha
    /// when it has one, by its own cache id otherwise.
    pub fn find_files_with_fingerprint(&self, fp: &Fingerprint) -> Vec<FileId> {
        let Some(id) = self.resolve_fingerprint(fp) else {
            return Vec::new();
        };
        self.files
            .lock()
            .iter()
            .filter(|f| f.fingerprint == id)
            .filter_map(|f| f.cache_id())
            .map(FileId)
            .collect()
    }

    fn resolve_fingerprint(&self, fp: &Fingerprint) -> Option<FingerprintId> {
        self.get_fingerprint_by_git_sha(fp.git_sha)
            .or_else(|| fp.cache_id().map(FingerprintId))
    }

    /// Interns an archive; the key is the interned container file.
    pub fn put_archive_file(&self, archive: ArchiveFile) -> ArchiveId {
        if let Some(id) = archive.cache_id() {
            return ArchiveId(id);
        }
        let mut archives = self.archives.lock();
        if let Some(existing) = archives.iter().find(|a| a.file == archive.file) {
            return ArchiveId(existing.cache_id().expect("interned archive has an id"));
        }
        let id = archives.len() as u64;
        let mut archive = archive;
        archive.set_cache_id(id);
        archives.push(archive);
        ArchiveId(id)
    }

    pub fn archive(&self, id: ArchiveId) -> ArchiveFile {
        self.archives.lock()[id.index()].clone()
    }

    pub fn archive_count(&self) -> usize {
        self.archives.lock().len()
    }

    pub fn get_archive_file(&self, file: FileId) -> Option<ArchiveId> {
        self.archives
            .lock()
            .iter()
            .find(|a| a.file == file)
            .and_then(|a| a.cache_id())
            .map(ArchiveId)
    }

    /// Archives that directly contain a file with this fingerprint.
    // TODO: transitive containment (archives reached through nested archives).
    pub fn find_archives_containing_fingerprint(&self, fp: &Fingerprint) -> Vec<ArchiveId> {
        let files = self.find_files_with_fingerprint(fp);
        if files.is_empty() {
            return Vec::new();
        }
        let archives = self.archives.lock();
        let mut hits = Vec::new();
        for archive in archives.iter() {
            if archive.entries.iter().any(|e| files.contains(e)) {
                hits.extend(archive.cache_id().map(ArchiveId));
            }
        }
        hits
    }

    /// Interns a repo source, deduplicating on the URN.
    pub fn put_git_source(&self, source: GitRepoSource) -> RepoId {
        if let Some(id) = source.cache_id() {
            return RepoId(id);
        }
        let mut repos = self.repos.lock();
        let urn = source.urn();
        if let Some(existing) = repos.iter().find(|r| r.urn() == urn) {
            return RepoId(existing.cache_id().expect("interned repo has an id"));
        }
        let id = repos.len() as u64;
        let mut source = source;
        source.set_cache_id(id);
        repos.push(source);
        RepoId(id)
    }

    pub fn repo(&self, id: RepoId) -> GitRepoSource {
        self.repos.lock()[id.index()].clone()
    }

    pub fn repo_count(&self) -> usize {
        self.repos.lock().len()
    }

    pub fn find_git_source_by_urn(&self, urn: &str) -> Option<RepoId> {
        self.repos
            .lock()
            .iter()
            .find(|r| r.urn() == urn)
            .and_then(|r| r.cache_id())
            .map(RepoId)
    }

    /// Repo sources containing a file with this fingerprint.
    pub fn find_git_sources_containing_fingerprint(&self, fp: &Fingerprint) -> Vec<RepoId> {
        let Some(id) = self.resolve_fingerprint(fp) else {
            return Vec::new();
        };
        let files = self.files.lock();
        let repos = self.repos.lock();
        let mut hits = Vec::new();
        for repo in repos.iter() {
            let contains = repo
                .files
                .iter()
                .any(|&fid| files[fid.index()].fingerprint == id);
            if contains {
                hits.extend(repo.cache_id().map(RepoId));
            }
        }
        hits
    }

    pub fn get_stat_fingerprint(&self, meta: &fs::Metadata) -> Option<FingerprintId> {
        self.stat_cache
            .lock()
            .get(&stat_fingerprint_key(meta))
            .copied()
    }

    pub fn put_stat_fingerprint(&self, meta: &fs::Metadata, id: FingerprintId) {
        self.stat_cache.lock().put(stat_fingerprint_key(meta), id);
    }

    /// Checks that iteration order matches recorded ids in every arena.
    ///
    /// Runs before persistence (failure aborts the persist) and after a
    /// restore (failure discards the restored state).
    pub fn verify(&self) -> Result<(), StoreError> {
        let fps = self.fingerprints.lock();
        let files = self.files.lock();
        let archives = self.archives.lock();
        let repos = self.repos.lock();
        for (i, row) in fps.rows.iter().enumerate() {
            if row.cache_id() != Some(i as u64) {
                return Err(StoreError::InconsistentId {
                    table: "fingerprint",
                    index: i as u64,
                    found: row.cache_id(),
                });
            }
        }
        for (i, row) in files.iter().enumerate() {
            if row.cache_id() != Some(i as u64) {
                return Err(StoreError::InconsistentId {
                    table: "file",
                    index: i as u64,
                    found: row.cache_id(),
                });
            }
        }
        for (i, row) in archives.iter().enumerate() {
            if row.cache_id() != Some(i as u64) {
                return Err(StoreError::InconsistentId {
                    table: "archive",
                    index: i as u64,
                    found: row.cache_id(),
                });
            }
        }
        for (i, row) in repos.iter().enumerate() {
            if row.cache_id() != Some(i as u64) {
                return Err(StoreError::InconsistentId {
                    table: "repo",
                    index: i as u64,
                    found: row.cache_id(),
                });
            }
        }
        Ok(())
    }

    /// Total size of all fingerprinted blobs.
    pub fn total_blob_bytes(&self) -> i64 {
        self.fingerprints
            .lock()
            .rows
            .iter()
            .map(|fp| fp.size)
            .sum()
    }

    /// Lists root archives (not contained in any other archive) recursively,
    /// then summary totals.
    pub fn dump(&self, out: &mut dyn std::io::Write) -> std::io::Result<()> {
        let fps = self.fingerprints.lock();
        let files = self.files.lock();
        let archives = self.archives.lock();
        let roots: Vec<&ArchiveFile> = archives
            .iter()
            .filter(|a| {
                !archives
                    .iter()
                    .any(|other| other.entries.contains(&a.file))
            })
            .collect();
        for root in roots {
            dump_archive(out, 0, root, &archives, &files, &fps.rows)?;
        }
        let total: i64 = fps.rows.iter().map(|fp| fp.size).sum();
        writeln!(
            out,
            "Fingerprints: {}\nFiles: {}\nArchives: {}\nBytes: {}",
            fps.rows.len(),
            files.len(),
            archives.len(),
            total
        )
    }
}

fn dump_archive(
    out: &mut dyn std::io::Write,
    level: usize,
    archive: &ArchiveFile,
    archives: &[ArchiveFile],
    files: &[File],
    fps: &[Fingerprint],
) -> std::io::Result<()> {
    let file = &files[archive.file.index()];
    let fp = &fps[file.fingerprint.index()];
    writeln!(
        out,
        "{}{}:         ({}, {})",
        "  ".repeat(level),
        file.path,
        fp.sha256.hex(),
        fp.git_sha.hex()
    )?;
    for entry in &archive.entries {
        if let Some(nested) = archives.iter().find(|a| a.file == *entry) {
            dump_archive(out, level + 1, nested, archives, files, fps)?;
        }
    }
    Ok(())
}

/// Builds the stat-cache key `<size>,<inode>,<mtime-ns>` in base 36.
pub fn stat_fingerprint_key(meta: &fs::Metadata) -> String {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        let nanos = meta
            .mtime()
            .saturating_mul(1_000_000_000)
            .saturating_add(meta.mtime_nsec());
        format!(
            "{},{},{}",
            base36(meta.size() as i64),
            base36(meta.ino() as i64),
            base36(nanos)
        )
    }
    #[cfg(not(unix))]
    {
        use std::time::UNIX_EPOCH;
        let nanos = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0);
        format!("{},0,{}", base36(meta.len() as i64), base36(nanos))
    }
}
