//! Recursive archive scanning.
//!
//! # Protocol (per container)
//! 1. Set up a passthrough tee over the container body.
//! 2. Iterate entries with the format cursor, skipping directories.
//! 3. For each regular entry, either recurse (the entry itself looks like an
//!    archive or package and the depth budget allows it) or run the hash
//!    pipeline over its body and intern Fingerprint + File.
//! 4. Drain the tee so the container fingerprint covers trailing bytes.
//! 5. Intern the ArchiveFile joining the container file to its entries.
//!
//! # Error policy
//! A damaged tar or cpio header restarts the cursor and continues (logged).
//! A failed entry is logged and skipped; its bytes are discarded so the
//! container scan stays aligned. Unsupported compression skips the
//! container. Everything else aborts the container scan.

use std::fs;
use std::io::{Read, Write};

use tracing::{debug, warn};

use crate::archive::formats::{
    ArCursor, ArNext, CpioCursor, CpioNext, LimitedRead, TarCursor, TarNext, ZipArchive, ZipError,
};
use crate::archive::{decompress, detect_archive, ArchiveKind};
use crate::hash::{HashPipeline, ALL_DIGEST_KINDS};
use crate::record::{ArchiveFile, ArchiveId, File, FileId, Fingerprint};
use crate::store::FingerprintStore;

use super::error::ScanError;
use super::package::{identify_package_contents, is_scannable_package};
use super::passthrough::{Passthrough, ScanRead};

/// Default recursion budget for nested containers.
pub const DEFAULT_DEPTH_LIMIT: usize = 10;

/// True when the name's suffix maps to a supported archive format.
pub fn is_scannable_archive(name: &str) -> bool {
    detect_archive(name).is_some()
}

/// Recursively scans one archive and interns everything found.
///
/// `body` is the container byte stream when the caller already has one (an
/// entry inside an outer container); otherwise the named file is opened.
/// `meta` enables the stat-cache fast path and, on success, the stat-cache
/// write-back.
pub fn identify_archive_contents(
    store: &FingerprintStore,
    name: &str,
    size: Option<u64>,
    meta: Option<&fs::Metadata>,
    body: Option<&mut dyn ScanRead>,
    depth: usize,
    limit: usize,
) -> Result<(FileId, ArchiveId), ScanError> {
    let kind = detect_archive(name).ok_or_else(|| ScanError::NotScannable {
        path: name.to_string(),
    })?;

    if let Some(meta) = meta {
        if let Some(hit) = stat_cached_archive(store, meta) {
            debug!(archive = name, "stat cache hit; skipping rescan");
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
    let entries = scan_container(store, kind, &mut tee, depth, limit)?;
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

/// Stat-cache fast path: a known fingerprint whose file already has an
/// ArchiveFile means the container was fully scanned before.
pub(crate) fn stat_cached_archive(
    store: &FingerprintStore,
    meta: &fs::Metadata,
) -> Option<(FileId, ArchiveId)> {
    let fp_id = store.get_stat_fingerprint(meta)?;
    let fp = store.fingerprint(fp_id);
    for file_id in store.find_files_with_fingerprint(&fp) {
        if let Some(archive_id) = store.get_archive_file(file_id) {
            return Some((file_id, archive_id));
        }
    }
    None
}

fn scan_container(
    store: &FingerprintStore,
    kind: ArchiveKind,
    tee: &mut Passthrough<'_>,
    depth: usize,
    limit: usize,
) -> Result<Vec<FileId>, ScanError> {
    match kind {
        ArchiveKind::Tar => scan_tar_entries(store, tee, depth, limit),
        ArchiveKind::TarGz
        | ArchiveKind::TarBz2
        | ArchiveKind::TarXz
        | ArchiveKind::TarLzma
        | ArchiveKind::TarSnappy => {
            let codec = kind.codec().expect("compressed tar kinds carry a codec");
            let mut decoded = decompress(codec, &mut *tee)?;
            scan_tar_entries(store, &mut *decoded, depth, limit)
        }
        ArchiveKind::Zip => scan_zip_entries(store, tee, depth, limit),
        ArchiveKind::Ar => scan_ar_entries(store, tee, depth, limit),
        ArchiveKind::Cpio => scan_cpio_entries(store, tee, depth, limit),
    }
}

/// Hashes or recurses into one container entry, interning the File.
///
/// Recursion applies when the entry name itself looks like an archive or a
/// package and the depth budget allows; otherwise the body is hashed as a
/// plain blob with its header-declared size.
pub(crate) fn fingerprint_entry(
    store: &FingerprintStore,
    name: &str,
    size: u64,
    body: &mut dyn ScanRead,
    depth: usize,
    limit: usize,
) -> Result<FileId, ScanError> {
    if is_scannable_archive(name) && depth < limit {
        let (file_id, _) =
            identify_archive_contents(store, name, Some(size), None, Some(body), depth + 1, limit)?;
        return Ok(file_id);
    }
    if is_scannable_package(name) && depth < limit {
        let (file_id, _) =
            identify_package_contents(store, name, Some(size), None, Some(body), depth + 1, limit)?;
        return Ok(file_id);
    }

    let mut pipe = HashPipeline::new(&ALL_DIGEST_KINDS, Some(size))?;
    let mut scratch = [0u8; 16 * 1024];
    loop {
        let n = body.read(&mut scratch)?;
        if n == 0 {
            break;
        }
        pipe.write_all(&scratch[..n])?;
    }
    let outcome = pipe.finish();
    if outcome.partial {
        return Err(ScanError::PartialFingerprint {
            path: name.to_string(),
        });
    }
    let mut fp = Fingerprint::default();
    fp.size = size as i64;
    for digest in outcome.digests {
        fp.set_digest(digest);
    }
    let fp_id = store.put_fingerprint(fp);
    Ok(store.put_file(File::new(name, fp_id)))
}

pub(crate) fn scan_tar_entries(
    store: &FingerprintStore,
    input: &mut dyn Read,
    depth: usize,
    limit: usize,
) -> Result<Vec<FileId>, ScanError> {
    let mut cursor = TarCursor::new();
    let mut entries = Vec::new();
    loop {
        let (name, size, pad, regular) = match cursor.next_entry(input)? {
            TarNext::End => break,
            TarNext::BadHeader => {
                warn!("damaged tar header; restarting at the next block");
                continue;
            }
            TarNext::Entry(meta) => (
                String::from_utf8_lossy(meta.name).into_owned(),
                meta.size,
                meta.pad,
                meta.is_regular() && !meta.is_dir(),
            ),
        };
        if !regular {
            cursor.skip(input, size + pad)?;
            continue;
        }
        let mut body = LimitedRead::new(input, size);
        match fingerprint_entry(store, &name, size, &mut body, depth, limit) {
            Ok(file_id) => entries.push(file_id),
            Err(err) => warn!(entry = %name, %err, "could not fingerprint tar entry"),
        }
        let leftover = body.remaining();
        cursor.skip(input, leftover + pad)?;
    }
    Ok(entries)
}

fn scan_zip_entries(
    store: &FingerprintStore,
    tee: &mut Passthrough<'_>,
    depth: usize,
    limit: usize,
) -> Result<Vec<FileId>, ScanError> {
    // zip needs random access; buffer the container through the tee so the
    // container fingerprint completes regardless of how parsing goes.
    let mut buffer = Vec::new();
    tee.read_to_end(&mut buffer)?;
    let archive = ZipArchive::parse(&buffer)?;

    let mut entries = Vec::new();
    for meta in archive.entries().to_vec() {
        if meta.is_dir {
            continue;
        }
        if meta.is_encrypted() {
            warn!(entry = %meta.name, "skipping encrypted zip entry");
            continue;
        }
        if !meta.compression_supported() {
            warn!(entry = %meta.name, method = meta.method, "skipping zip entry with unsupported compression");
            continue;
        }
        let mut body: Box<dyn Read> = match archive.entry_reader(&meta) {
            Ok(reader) => reader,
            Err(err @ ZipError::Unsupported(_)) => {
                warn!(entry = %meta.name, %err, "skipping zip entry");
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        match fingerprint_entry(
            store,
            &meta.name,
            meta.uncompressed_size,
            &mut body,
            depth,
            limit,
        ) {
            Ok(file_id) => entries.push(file_id),
            Err(err) => warn!(entry = %meta.name, %err, "could not fingerprint zip entry"),
        }
    }
    Ok(entries)
}

pub(crate) fn scan_ar_entries(
    store: &FingerprintStore,
    input: &mut dyn Read,
    depth: usize,
    limit: usize,
) -> Result<Vec<FileId>, ScanError> {
    let mut cursor = ArCursor::new();
    let mut entries = Vec::new();
    loop {
        let meta = match cursor.next_entry(input)? {
            ArNext::End => break,
            ArNext::Entry(meta) => meta,
        };
        if meta.name.is_empty() {
            // Name and symbol tables, not payload members.
            cursor.skip(input, meta.size + meta.pad)?;
            continue;
        }
        let mut body = LimitedRead::new(input, meta.size);
        match fingerprint_entry(store, &meta.name, meta.size, &mut body, depth, limit) {
            Ok(file_id) => entries.push(file_id),
            Err(err) => warn!(entry = %meta.name, %err, "could not fingerprint ar entry"),
        }
        let leftover = body.remaining();
        cursor.skip(input, leftover + meta.pad)?;
    }
    Ok(entries)
}

pub(crate) fn scan_cpio_entries(
    store: &FingerprintStore,
    input: &mut dyn Read,
    depth: usize,
    limit: usize,
) -> Result<Vec<FileId>, ScanError> {
    let mut cursor = CpioCursor::new();
    let mut entries = Vec::new();
    loop {
        let meta = match cursor.next_entry(input)? {
            CpioNext::End => break,
            CpioNext::BadHeader => {
                warn!("damaged cpio header; restarting past it");
                continue;
            }
            CpioNext::Entry(meta) => meta,
        };
        if !meta.is_regular() {
            cursor.skip(input, meta.size + meta.pad)?;
            continue;
        }
        let mut body = LimitedRead::new(input, meta.size);
        match fingerprint_entry(store, &meta.name, meta.size, &mut body, depth, limit) {
            Ok(file_id) => entries.push(file_id),
            Err(err) => warn!(entry = %meta.name, %err, "could not fingerprint cpio entry"),
        }
        let leftover = body.remaining();
        cursor.skip(input, leftover + meta.pad)?;
    }
    Ok(entries)
}
