//! Docker save-stream scenarios against a stubbed daemon.

mod common;

use std::io::Cursor;

use blobprint::record::Fingerprint;
use blobprint::scanner::{
    is_scannable_image, scan_image_save_stream, ImageDaemon, ImageInspect, ScanError,
};
use blobprint::store::FingerprintStore;

use common::tarball;

const CONFIG_ID: &str = "1111111111111111111111111111111111111111111111111111111111111111";
const LAYER_ID: &str = "2222222222222222222222222222222222222222222222222222222222222222";

struct StubDaemon;

impl ImageDaemon for StubDaemon {
    fn save(&self, _names: &[String]) -> Result<Box<dyn std::io::Read>, ScanError> {
        Ok(Box::new(Cursor::new(save_stream())))
    }

    fn inspect(&self, name: &str) -> Result<ImageInspect, ScanError> {
        if name == "example:latest" {
            Ok(ImageInspect {
                id: format!("sha256:{CONFIG_ID}"),
                repo_digests: vec![format!("example@sha256:{LAYER_ID}")],
            })
        } else {
            Err(ScanError::Daemon(format!("no such image: {name}")))
        }
    }
}

fn layer_tar() -> Vec<u8> {
    tarball(&[
        ("bin/busybox", b"busybox bytes"),
        ("etc/passwd", b"root:x:0:0\n"),
    ])
}

fn save_stream() -> Vec<u8> {
    let manifest = format!(
        r#"[{{"Config":"{CONFIG_ID}.json","RepoTags":["example:latest"],"Layers":["{LAYER_ID}/layer.tar"]}}]"#
    );
    let repositories = format!(r#"{{"example":{{"latest":"{LAYER_ID}"}}}}"#);
    let config = r#"{"architecture":"amd64","config":{}}"#;
    let layer_json = format!(r#"{{"id":"{LAYER_ID}"}}"#);
    let layer = layer_tar();
    tarball(&[
        (&format!("{CONFIG_ID}.json"), config.as_bytes()),
        (&format!("{LAYER_ID}/json"), layer_json.as_bytes()),
        (&format!("{LAYER_ID}/layer.tar"), &layer),
        ("manifest.json", manifest.as_bytes()),
        ("repositories", repositories.as_bytes()),
    ])
}

#[test]
fn assembles_images_in_manifest_order() {
    let store = FingerprintStore::new();
    let names = vec!["example:latest".to_string()];
    let mut stream = Cursor::new(save_stream());
    let images = scan_image_save_stream(&store, &StubDaemon, &names, &mut stream).unwrap();

    assert_eq!(images.len(), 1);
    let image = &images[0];
    assert_eq!(image.name, "example:latest");
    assert_eq!(image.image_id, format!("{CONFIG_ID}.json"));
    assert_eq!(image.repo_digests, vec![format!("example@sha256:{LAYER_ID}")]);
    assert_eq!(image.layers.len(), 1);
}

#[test]
fn layers_carry_fingerprint_tarsum_and_files() {
    let store = FingerprintStore::new();
    let names = vec!["example:latest".to_string()];
    let mut stream = Cursor::new(save_stream());
    let images = scan_image_save_stream(&store, &StubDaemon, &names, &mut stream).unwrap();

    let layer = &images[0].layers[0];
    assert_eq!(layer.name, LAYER_ID);
    assert!(layer.tarsum.starts_with("tarsum.v1+sha256:"));
    assert_eq!(layer.files.len(), 2);
    assert_eq!(store.file(layer.files[0]).path, "bin/busybox");

    // The layer fingerprint is the multi-hash of the layer tar bytes.
    let mut expected = Fingerprint::default();
    let bytes = layer_tar();
    expected
        .calculate_sums(&mut Cursor::new(bytes.clone()), bytes.len() as i64)
        .unwrap();
    let actual = store.fingerprint(layer.fingerprint);
    assert_eq!(actual.sha256, expected.sha256);
    assert_eq!(actual.size, bytes.len() as i64);
}

#[test]
fn layer_files_dedup_against_other_observations() {
    let store = FingerprintStore::new();

    // Intern the busybox payload first, as though seen in a tarball.
    let mut prior = Fingerprint::default();
    prior
        .calculate_sums(&mut Cursor::new(b"busybox bytes".to_vec()), 13)
        .unwrap();
    let prior_id = store.put_fingerprint(prior.clone());

    let names = vec!["example:latest".to_string()];
    let mut stream = Cursor::new(save_stream());
    let images = scan_image_save_stream(&store, &StubDaemon, &names, &mut stream).unwrap();

    let busybox = store.file(images[0].layers[0].files[0]);
    assert_eq!(busybox.fingerprint, prior_id, "equal blobs collapse");
}

#[test]
fn tarsum_is_stable_across_identical_streams() {
    let store = FingerprintStore::new();
    let names = vec!["example:latest".to_string()];
    let a = scan_image_save_stream(&store, &StubDaemon, &names, &mut Cursor::new(save_stream()))
        .unwrap();
    let b = scan_image_save_stream(&store, &StubDaemon, &names, &mut Cursor::new(save_stream()))
        .unwrap();
    assert_eq!(a[0].layers[0].tarsum, b[0].layers[0].tarsum);
}

#[test]
fn scannable_image_asks_the_daemon() {
    assert!(is_scannable_image(&StubDaemon, "example:latest"));
    assert!(!is_scannable_image(&StubDaemon, "missing:tag"));
}
