//! Persistence and query scenarios over a store populated by real scans.

mod common;

use std::fs;

use blobprint::hash::DigestMatcher;
use blobprint::record::Fingerprint;
use blobprint::scanner::{find_matching_fingerprint, identify_archive_contents, identify_file};
use blobprint::store::serial::{
    restore_remembered_objects, RestoreSource, STORE_BIN_FILE, STORE_YAML_FILE,
};
use blobprint::store::FingerprintStore;

use common::tarball;

fn fingerprint_of(data: &[u8]) -> Fingerprint {
    let mut fp = Fingerprint::default();
    fp.calculate_sums(&mut std::io::Cursor::new(data.to_vec()), data.len() as i64)
        .unwrap();
    fp
}

fn populate(dir: &std::path::Path) -> FingerprintStore {
    let store = FingerprintStore::new();
    let plain = dir.join("standalone.bin");
    fs::write(&plain, b"standalone blob").unwrap();
    identify_file(&store, &plain).unwrap();

    let tar_path = dir.join("things.tar");
    fs::write(
        &tar_path,
        tarball(&[("inside/a.conf", b"a conf"), ("inside/b.conf", b"b conf")]),
    )
    .unwrap();
    let name = tar_path.to_string_lossy().into_owned();
    identify_archive_contents(&store, &name, None, None, None, 0, 10).unwrap();
    store
}

#[test]
fn persisted_store_answers_the_same_queries_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let store = populate(dir.path());
    assert!(store.verify().is_ok());
    store.persist_remembered_objects(dir.path()).unwrap();
    assert!(dir.path().join(STORE_BIN_FILE).exists());
    assert!(dir.path().join(STORE_YAML_FILE).exists());
    drop(store);

    let restored = restore_remembered_objects(dir.path(), RestoreSource::Yaml).unwrap();
    assert!(restored.verify().is_ok());

    let a_fp = fingerprint_of(b"a conf");
    let files = restored.find_files_with_fingerprint(&a_fp);
    assert_eq!(files.len(), 1);
    assert_eq!(restored.file(files[0]).path, "inside/a.conf");

    let archives = restored.find_archives_containing_fingerprint(&a_fp);
    assert_eq!(archives.len(), 1);
    assert!(restored
        .file(restored.archive(archives[0]).file)
        .path
        .ends_with("things.tar"));

    // Cross-digest lookup: the restored git-sha index still answers.
    assert!(restored.get_fingerprint_by_git_sha(a_fp.git_sha).is_some());
}

#[test]
fn binary_and_textual_forms_restore_equivalently() {
    let dir = tempfile::tempdir().unwrap();
    let store = populate(dir.path());
    store.persist_remembered_objects(dir.path()).unwrap();

    let from_yaml = restore_remembered_objects(dir.path(), RestoreSource::Yaml).unwrap();
    let from_bin = restore_remembered_objects(dir.path(), RestoreSource::Bin).unwrap();
    assert_eq!(from_yaml.fingerprint_count(), from_bin.fingerprint_count());
    assert_eq!(from_yaml.file_count(), from_bin.file_count());
    assert_eq!(from_yaml.archive_count(), from_bin.archive_count());

    let b_fp = fingerprint_of(b"b conf");
    assert_eq!(
        from_yaml.find_files_with_fingerprint(&b_fp).len(),
        from_bin.find_files_with_fingerprint(&b_fp).len()
    );
}

#[test]
fn corrupt_yaml_restores_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(STORE_YAML_FILE), b"{{{{ not yaml").unwrap();
    assert!(restore_remembered_objects(dir.path(), RestoreSource::Yaml).is_none());
}

#[test]
fn matcher_prefix_finds_interned_fingerprints() {
    let dir = tempfile::tempdir().unwrap();
    let store = populate(dir.path());

    let target = fingerprint_of(b"a conf");
    let prefix = &target.sha256.hex()[..8];
    let matcher = DigestMatcher::parse(&format!("sha256:{prefix}")).unwrap();
    let hit = find_matching_fingerprint(&store, &matcher).expect("prefix must resolve");
    assert_eq!(store.fingerprint(hit).sha256, target.sha256);

    // A git-typed pattern only consults git shas.
    let matcher = DigestMatcher::parse(&format!("git:{prefix}")).unwrap();
    if !target.git_sha.hex().starts_with(prefix) {
        assert!(find_matching_fingerprint(&store, &matcher).is_none());
    }
}

#[test]
fn matcher_survives_persistence() {
    let dir = tempfile::tempdir().unwrap();
    let store = populate(dir.path());
    store.persist_remembered_objects(dir.path()).unwrap();
    let restored = restore_remembered_objects(dir.path(), RestoreSource::Yaml).unwrap();

    let target = fingerprint_of(b"standalone blob");
    let matcher =
        DigestMatcher::parse(&format!("git:{}", target.git_sha.hex())).unwrap();
    let hit = find_matching_fingerprint(&restored, &matcher).expect("full git sha resolves");
    assert_eq!(restored.fingerprint(hit).size, 15);
}
