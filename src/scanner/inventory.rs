//! Inventory driver.
//!
//! Walks a directory tree, classifies what it finds, and drives the
//! scanners: plain files are hashed inline (cheap, stat-cache backed), git
//! repos scan on the driver thread (libgit2 pins walks to one OS thread),
//! and archives/packages fan out to a small worker pool since each one can
//! expand into a deep recursive scan.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::bounded;
use tracing::{debug, info, warn};

use crate::store::FingerprintStore;

use super::archive::{identify_archive_contents, is_scannable_archive, DEFAULT_DEPTH_LIMIT};
use super::error::ScanError;
use super::file::identify_file_with_stat;
use super::git::scan_git_repo;
use super::package::{identify_package_contents, is_scannable_package};

/// Driver tuning.
#[derive(Clone, Debug)]
pub struct InventoryConfig {
    /// Concurrent archive/package scan workers.
    pub workers: usize,
    /// Recursion budget for nested containers.
    pub depth_limit: usize,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        InventoryConfig {
            workers: 3,
            depth_limit: DEFAULT_DEPTH_LIMIT,
        }
    }
}

/// Counters from one inventory run.
#[derive(Clone, Copy, Debug, Default)]
pub struct InventoryStats {
    pub files: u64,
    pub repos: u64,
    pub archives: u64,
    pub packages: u64,
    pub errors: u64,
}

/// True when the name resolves to something the path scanner can take:
/// a directory or a regular file.
pub fn is_scannable_path(name: &str) -> bool {
    fs::metadata(name)
        .map(|meta| meta.is_dir() || meta.file_type().is_file())
        .unwrap_or(false)
}

struct PathEntry {
    path: PathBuf,
    meta: fs::Metadata,
}

/// Recursively scans everything under `root`.
///
/// `.git` directories become repo scans (their subtrees are not walked as
/// plain files); names matching the archive or package suffix tables get the
/// recursive container treatment; everything else is fingerprinted as a
/// plain file.
pub fn scan_and_inventory_path(
    store: &FingerprintStore,
    root: &Path,
    config: &InventoryConfig,
) -> InventoryStats {
    let mut stats = InventoryStats::default();
    let mut plain: Vec<PathEntry> = Vec::new();
    let mut repos: Vec<PathBuf> = Vec::new();
    let mut archives: Vec<PathEntry> = Vec::new();
    let mut packages: Vec<PathEntry> = Vec::new();

    walk(
        root,
        &mut stats,
        &mut |path, meta| {
            let name = path.to_string_lossy();
            let entry = PathEntry {
                path: path.to_path_buf(),
                meta,
            };
            if is_scannable_archive(&name) {
                archives.push(entry);
            } else if is_scannable_package(&name) {
                packages.push(entry);
            } else {
                plain.push(entry);
            }
        },
        &mut |git_dir| repos.push(git_dir.to_path_buf()),
    );

    info!(
        files = plain.len(),
        repos = repos.len(),
        archives = archives.len(),
        packages = packages.len(),
        "inventory classified"
    );

    for entry in &plain {
        match identify_file_with_stat(store, &entry.path, &entry.meta) {
            Ok(_) => stats.files += 1,
            Err(err) => {
                warn!(file = %entry.path.display(), %err, "could not fingerprint file");
                stats.errors += 1;
            }
        }
    }

    for repo in &repos {
        match scan_git_repo(store, repo) {
            Ok(sources) => stats.repos += sources.len() as u64,
            Err(err) => {
                warn!(repo = %repo.display(), %err, "could not scan repository");
                stats.errors += 1;
            }
        }
    }

    stats.archives = run_deep_scans(store, archives, config, DeepKind::Archive, &mut stats.errors);
    stats.packages = run_deep_scans(store, packages, config, DeepKind::Package, &mut stats.errors);
    stats
}

#[derive(Clone, Copy)]
enum DeepKind {
    Archive,
    Package,
}

/// Fans container scans out to `config.workers` threads.
fn run_deep_scans(
    store: &FingerprintStore,
    work: Vec<PathEntry>,
    config: &InventoryConfig,
    kind: DeepKind,
    errors: &mut u64,
) -> u64 {
    if work.is_empty() {
        return 0;
    }
    let done = AtomicU64::new(0);
    let failed = AtomicU64::new(0);
    let (tx, rx) = bounded::<PathEntry>(work.len());
    for entry in work {
        tx.send(entry).expect("queue sized for all work");
    }
    drop(tx);

    let workers = config.workers.max(1);
    std::thread::scope(|scope| {
        for _ in 0..workers {
            let rx = rx.clone();
            let done = &done;
            let failed = &failed;
            scope.spawn(move || {
                for entry in rx.iter() {
                    let name = entry.path.to_string_lossy().into_owned();
                    let result = match kind {
                        DeepKind::Archive => identify_archive_contents(
                            store,
                            &name,
                            Some(entry.meta.len()),
                            Some(&entry.meta),
                            None,
                            0,
                            config.depth_limit,
                        ),
                        DeepKind::Package => identify_package_contents(
                            store,
                            &name,
                            Some(entry.meta.len()),
                            Some(&entry.meta),
                            None,
                            0,
                            config.depth_limit,
                        ),
                    };
                    match result {
                        Ok(_) => {
                            done.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(err) => {
                            warn!(container = %name, %err, "container scan failed");
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            });
        }
    });
    *errors += failed.load(Ordering::Relaxed);
    done.load(Ordering::Relaxed)
}

/// Depth-first walk classifying regular files and `.git` directories.
///
/// Symlinks are resolved with a follow-up stat; anything that still is not a
/// regular file or directory is skipped. Walk errors are counted, logged,
/// and do not stop the walk.
fn walk(
    root: &Path,
    stats: &mut InventoryStats,
    on_file: &mut dyn FnMut(&Path, fs::Metadata),
    on_repo: &mut dyn FnMut(&Path),
) {
    let meta = match fs::symlink_metadata(root) {
        Ok(meta) => meta,
        Err(err) => {
            warn!(path = %root.display(), %err, "could not stat path");
            stats.errors += 1;
            return;
        }
    };

    if meta.file_type().is_symlink() {
        match fs::metadata(root) {
            Ok(resolved) if resolved.is_file() => {
                on_file(root, resolved);
                return;
            }
            Ok(_) | Err(_) => {
                debug!(path = %root.display(), "skipping symlink");
                return;
            }
        }
    }

    if meta.is_file() {
        on_file(root, meta);
        return;
    }
    if !meta.is_dir() {
        return;
    }
    if root.file_name().map(|n| n == ".git").unwrap_or(false) {
        on_repo(root);
        return;
    }

    let entries = match fs::read_dir(root) {
        Ok(rd) => rd,
        Err(err) => {
            warn!(path = %root.display(), %err, "could not read directory");
            stats.errors += 1;
            return;
        }
    };
    for entry in entries {
        match entry {
            Ok(entry) => walk(&entry.path(), stats, on_file, on_repo),
            Err(err) => {
                warn!(path = %root.display(), %err, "could not read directory entry");
                stats.errors += 1;
            }
        }
    }
}
