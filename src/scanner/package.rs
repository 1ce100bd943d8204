//! Package scanning (rpm, deb).
//!
//! Packages follow the same per-container protocol as archives; the formats
//! just wrap other containers. An rpm is headers followed by a compressed
//! cpio payload, a deb is an ar archive whose members are tarballs (which
//! recurse as ordinary nested archives, not as one combined unit).

use std::fs;

use tracing::debug;

use crate::archive::decompress;
use crate::archive::detect_package;
use crate::archive::formats::read_rpm_preamble;
use crate::archive::PackageKind;
use crate::record::{ArchiveFile, ArchiveId, File, FileId};
use crate::store::FingerprintStore;

use super::archive::{scan_ar_entries, scan_cpio_entries, stat_cached_archive};
use super::error::ScanError;
use super::passthrough::{Passthrough, ScanRead};

/// True when the name's suffix maps to a supported package format.
pub fn is_scannable_package(name: &str) -> bool {
    detect_package(name).is_some()
}

/// Recursively scans one package and interns everything found.
pub fn identify_package_contents(
    store: &FingerprintStore,
    name: &str,
    size: Option<u64>,
    meta: Option<&fs::Metadata>,
    body: Option<&mut dyn ScanRead>,
    depth: usize,
    limit: usize,
) -> Result<(FileId, ArchiveId), ScanError> {
    let kind = detect_package(name).ok_or_else(|| ScanError::NotScannable {
        path: name.to_string(),
    })?;

    if let Some(meta) = meta {
        if let Some(hit) = stat_cached_archive(store, meta) {
            debug!(package = name, "stat cache hit; skipping rescan");
            return Ok(hit);
        }
    }

    let declared = size.or_else(|| meta.map(|m| m.len()));
    let mut opened;
    let body: &mut dyn ScanRead = match body {
        Some(body) => body,
        None => {
            opened = fs::File::open(name)?;
            &mut opened
        }
    };

    let mut tee = Passthrough::new(body, declared)?;
    let entries = match kind {
        PackageKind::Deb => scan_ar_entries(store, &mut tee, depth, limit)?,
        PackageKind::Rpm => {
            let info = read_rpm_preamble(&mut tee)?;
            debug!(
                package = name,
                compression = %info.payload_compression,
                format = %info.payload_format,
                "rpm payload"
            );
            let mut payload = decompress(&info.payload_compression, &mut tee)?;
            scan_cpio_entries(store, &mut *payload, depth, limit)?
        }
    };
    let (fp, partial) = tee.finish()?;
    if partial {
        return Err(ScanError::PartialFingerprint {
            path: name.to_string(),
        });
    }

    let fp_id = store.put_fingerprint(fp);
    let file_id = store.put_file(File::new(name, fp_id));
    let archive_id = store.put_archive_file(ArchiveFile::new(file_id, entries));
    if let Some(meta) = meta {
        store.put_stat_fingerprint(meta, fp_id);
    }
    Ok((file_id, archive_id))
}
