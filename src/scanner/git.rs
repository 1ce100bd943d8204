//! Git repository scanning.
//!
//! # Ref selection
//! A ref is "interesting" when it is the HEAD branch, a tag, a local branch
//! named `master` or `HEAD`, or a remote ref under `origin/`. Annex and
//! pull-request plumbing refs are rejected outright, as are all other
//! remote refs.
//!
//! # Blob ingestion
//! Each selected ref peels to a commit (the source identity) and a tree.
//! The tree walk collects blobs in traversal order. The blob id from the
//! object database is the canonical git-sha, so a blob whose sha is already
//! interned never gets re-read; unknown blobs are read once and run through
//! the full pipeline with their size declared.
//!
//! libgit2 pins its walks to the calling OS thread, so repo scanning stays
//! on the driver thread while archive workers run elsewhere.

use std::path::Path;
use std::sync::OnceLock;

use git2::{ObjectType, Reference, Repository, TreeWalkMode};
use regex::Regex;
use tracing::{debug, warn};

use crate::hash::GitSha;
use crate::record::{File, FileId, Fingerprint, GitRepoSource, RepoId};
use crate::store::FingerprintStore;

use super::error::ScanError;

fn rejected_ref() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new("remotes/annex|git-annex|remotes/pull").expect("ref rejection regex")
    })
}

/// Scans every interesting ref of the repository at `path`.
pub fn scan_git_repo(store: &FingerprintStore, path: &Path) -> Result<Vec<RepoId>, ScanError> {
    let repo = Repository::open(path)?;
    let mut out = Vec::new();
    for name in interesting_ref_names(&repo)? {
        let reference = match repo.find_reference(&name) {
            Ok(r) => r,
            Err(err) => {
                warn!(reference = %name, %err, "ref vanished during scan");
                continue;
            }
        };
        match repo_source_from_ref(store, &repo, &reference) {
            Ok(Some(id)) => out.push(id),
            Ok(None) => {}
            Err(err) => warn!(reference = %name, %err, "could not scan ref"),
        }
    }
    Ok(out)
}

/// Names of the refs worth scanning, in iteration order.
pub fn interesting_ref_names(repo: &Repository) -> Result<Vec<String>, ScanError> {
    let head_name = repo
        .head()
        .ok()
        .and_then(|head| head.name().map(String::from));
    let mut names = Vec::new();
    for reference in repo.references()? {
        let reference = match reference {
            Ok(r) => r,
            Err(err) => {
                warn!(%err, "unreadable ref");
                continue;
            }
        };
        let Some(name) = reference.name() else {
            continue;
        };
        let shorthand = reference.shorthand().unwrap_or("");

        // The checked-out branch is always in.
        if reference.is_branch() && Some(name) == head_name.as_deref() {
            names.push(name.to_string());
            continue;
        }
        if rejected_ref().is_match(name) {
            continue;
        }
        if reference.is_remote() {
            if shorthand.starts_with("origin") {
                names.push(name.to_string());
            }
            continue;
        }
        if reference.is_tag() || shorthand == "master" || shorthand == "HEAD" {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

/// Builds (or finds) the GitRepoSource for one ref.
fn repo_source_from_ref(
    store: &FingerprintStore,
    repo: &Repository,
    reference: &Reference<'_>,
) -> Result<Option<RepoId>, ScanError> {
    let shorthand = reference.shorthand().unwrap_or("").to_string();
    let mut src = GitRepoSource::default();
    if reference.is_tag() {
        src.tag = shorthand;
    } else {
        src.branch = shorthand;
    }

    let commit = reference.peel_to_commit()?;
    let Some(commit_sha) = GitSha::from_slice(commit.id().as_bytes()) else {
        warn!(reference = ?reference.name(), "non-sha1 object ids are not supported");
        return Ok(None);
    };
    src.commit = commit_sha;

    if let Some(existing) = store.find_git_source_by_urn(&src.urn()) {
        debug!(urn = %src.urn(), "repo source already recorded");
        return Ok(Some(existing));
    }

    let tree = reference.peel_to_tree()?;
    let mut blobs: Vec<(String, git2::Oid)> = Vec::new();
    tree.walk(TreeWalkMode::PreOrder, |root, entry| {
        if entry.kind() == Some(ObjectType::Blob) {
            let name = String::from_utf8_lossy(entry.name_bytes());
            blobs.push((format!("{root}{name}"), entry.id()));
        }
        0
    })?;

    debug!(
        reference = ?reference.name(),
        blobs = blobs.len(),
        "walking tree"
    );
    for (path, oid) in blobs {
        match file_from_blob(store, repo, &path, oid) {
            Ok(file_id) => src.record_blob(file_id),
            Err(err) => warn!(blob = %path, %err, "could not ingest blob"),
        }
    }
    Ok(Some(store.put_git_source(src)))
}

/// Interns one blob as a File, avoiding a read when the sha is known.
fn file_from_blob(
    store: &FingerprintStore,
    repo: &Repository,
    path: &str,
    oid: git2::Oid,
) -> Result<FileId, ScanError> {
    let Some(sha) = GitSha::from_slice(oid.as_bytes()) else {
        return Err(ScanError::NotScannable {
            path: path.to_string(),
        });
    };

    if let Some(fp_id) = store.get_fingerprint_by_git_sha(sha) {
        if let Some(file_id) = store.get_file_by_name_and_git_sha(path, sha) {
            return Ok(file_id);
        }
        return Ok(store.put_file(File::new(path, fp_id)));
    }

    let blob = repo.find_blob(oid)?;
    let size = blob.size() as i64;
    let mut fp = Fingerprint::from_git_sha(sha, size);
    let mut content = blob.content();
    fp.calculate_sums(&mut content, size)?;
    let fp_id = store.put_fingerprint(fp);
    Ok(store.put_file(File::new(path, fp_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn commit_files(repo: &Repository, files: &[(&str, &[u8])]) -> git2::Oid {
        let workdir = repo.workdir().unwrap().to_path_buf();
        let mut index = repo.index().unwrap();
        for (name, data) in files {
            let path = workdir.join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(&path, data).unwrap();
            index.add_path(Path::new(name)).unwrap();
        }
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = git2::Signature::now("tester", "tester@example.com").unwrap();
        let parent = repo
            .head()
            .ok()
            .and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, "scan me", &tree, &parents)
            .unwrap()
    }

    #[test]
    fn scans_head_and_interns_blobs() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        commit_files(
            &repo,
            &[("src/lib.rs", b"pub fn one() {}\n"), ("README", b"hi\n")],
        );

        let store = FingerprintStore::new();
        let sources = scan_git_repo(&store, dir.path()).unwrap();
        assert_eq!(sources.len(), 1);
        let src = store.repo(sources[0]);
        assert_eq!(src.files.len(), 2);
        assert!(!src.commit.is_zero());
        assert!(src.urn().starts_with("urn:x-fp:git:"));

        // Blob ids act as git shas: look one up through the store.
        let file = store.file(src.files[0]);
        let fp = store.fingerprint(file.fingerprint);
        assert_eq!(store.get_fingerprint_by_git_sha(fp.git_sha), Some(file.fingerprint));
        assert_eq!(fp.populated().count(), 9, "slow path fills all digests");
    }

    #[test]
    fn rescanning_the_same_commit_reuses_the_source() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        commit_files(&repo, &[("f", b"data")]);

        let store = FingerprintStore::new();
        let first = scan_git_repo(&store, dir.path()).unwrap();
        let second = scan_git_repo(&store, dir.path()).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.repo_count(), 1);
    }

    #[test]
    fn blob_contents_hash_like_git_hash_object() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        commit_files(&repo, &[("hello.txt", b"hello\n")]);

        let store = FingerprintStore::new();
        scan_git_repo(&store, dir.path()).unwrap();
        let expected =
            GitSha::from_slice(&hex::decode("ce013625030ba8dba906f756967f9e9ca394464a").unwrap())
                .unwrap();
        let hit = store.get_fingerprint_by_git_sha(expected);
        assert!(hit.is_some(), "blob sha must match git hash-object");
        let fp = store.fingerprint(hit.unwrap());
        assert_eq!(fp.size, 6);
    }
}
