//! Plain file identification.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::OnceLock;

use tracing::debug;

use crate::record::{File, FileId, Fingerprint};
use crate::store::FingerprintStore;

use super::error::ScanError;

/// Fingerprints one on-disk file, consulting the stat cache first.
pub fn identify_file(store: &FingerprintStore, path: &Path) -> Result<FileId, ScanError> {
    let meta = fs::metadata(path)?;
    identify_file_with_stat(store, path, &meta)
}

/// Fingerprints one on-disk file with already-fetched metadata.
///
/// A stat-cache hit reuses the interned fingerprint without opening the
/// file; otherwise the file is streamed through the full pipeline and the
/// stat key is recorded for next time.
pub fn identify_file_with_stat(
    store: &FingerprintStore,
    path: &Path,
    meta: &fs::Metadata,
) -> Result<FileId, ScanError> {
    let name = path.to_string_lossy().into_owned();
    if let Some(fp_id) = store.get_stat_fingerprint(meta) {
        debug!(file = %name, "stat cache hit");
        return Ok(store.put_file(File::new(name, fp_id)));
    }

    let mut handle = fs::File::open(path)?;
    let mut fp = Fingerprint::default();
    fp.calculate_sums(&mut handle, meta.len() as i64)?;
    let fp_id = store.put_fingerprint(fp);
    store.put_stat_fingerprint(meta, fp_id);
    Ok(store.put_file(File::new(name, fp_id)))
}

/// Fingerprint of the running executable, computed once per process.
pub fn self_fingerprint() -> io::Result<Fingerprint> {
    static SELF_FP: OnceLock<Fingerprint> = OnceLock::new();
    if let Some(fp) = SELF_FP.get() {
        return Ok(fp.clone());
    }
    let exe = std::env::current_exe()?;
    let meta = fs::metadata(&exe)?;
    let mut handle = fs::File::open(&exe)?;
    let mut fp = Fingerprint::default();
    fp.calculate_sums(&mut handle, meta.len() as i64)?;
    Ok(SELF_FP.get_or_init(|| fp).clone())
}
