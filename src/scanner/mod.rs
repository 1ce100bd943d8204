//! Scanners: everything that turns bytes on disk (or from a daemon) into
//! interned graph nodes.
//!
//! The pieces compose around two ideas. The passthrough tee lets one pass of
//! a container stream feed both its own fingerprint pipeline and the format
//! cursor iterating its entries. And every scanner talks to the same
//! [`crate::store::FingerprintStore`], so equal blobs collapse to one node
//! no matter where they were seen.

pub mod archive;
pub mod docker;
pub mod error;
pub mod file;
pub mod git;
pub mod inventory;
pub mod package;
pub mod passthrough;
pub mod tarsum;

pub use archive::{identify_archive_contents, is_scannable_archive, DEFAULT_DEPTH_LIMIT};
pub use docker::{
    dump_docker_image, is_scannable_image, scan_docker_images, scan_image_save_stream, DockerCli,
    ImageDaemon, ImageInspect,
};
pub use error::ScanError;
pub use file::{identify_file, identify_file_with_stat, self_fingerprint};
pub use git::{interesting_ref_names, scan_git_repo};
pub use inventory::{
    is_scannable_path, scan_and_inventory_path, InventoryConfig, InventoryStats,
};
pub use package::{identify_package_contents, is_scannable_package};
pub use passthrough::{Passthrough, ScanRead};
pub use tarsum::TarSum;

use crate::hash::DigestMatcher;
use crate::record::FingerprintId;
use crate::store::FingerprintStore;

/// Finds the first interned fingerprint a matcher accepts.
///
/// A full-length `git:`/`gitsha:` pattern resolves through the git-sha index
/// without scanning; everything else is a linear probe. Wildcard patterns
/// compare against every populated digest.
pub fn find_matching_fingerprint(
    store: &FingerprintStore,
    matcher: &DigestMatcher,
) -> Option<FingerprintId> {
    use crate::hash::MatcherAlgo;

    if matcher.algo == MatcherAlgo::GitSha {
        if let Some(bytes) = &matcher.bytes {
            if bytes.len() == 20 {
                let sha = crate::hash::GitSha::from_slice(bytes).expect("20 byte slice");
                return store.get_fingerprint_by_git_sha(sha);
            }
        }
    }

    store.find_matching_fingerprint(|fp| match matcher.algo {
        MatcherAlgo::Any => fp.populated().any(|d| matcher.matches_digest(&d)),
        MatcherAlgo::GitSha => {
            let d = fp.digest(crate::hash::DigestKind::GitSha);
            !d.is_zero() && matcher.matches_digest(&d)
        }
        MatcherAlgo::Sha1 => {
            let d = fp.digest(crate::hash::DigestKind::Sha1);
            !d.is_zero() && matcher.matches_digest(&d)
        }
        MatcherAlgo::Sha256 => {
            let d = fp.digest(crate::hash::DigestKind::Sha256);
            !d.is_zero() && matcher.matches_digest(&d)
        }
        MatcherAlgo::Sha384 => {
            let d = fp.digest(crate::hash::DigestKind::Sha384);
            !d.is_zero() && matcher.matches_digest(&d)
        }
        MatcherAlgo::Sha512 => {
            let d = fp.digest(crate::hash::DigestKind::Sha512);
            !d.is_zero() && matcher.matches_digest(&d)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Fingerprint;
    use std::io::Cursor;

    fn interned(store: &FingerprintStore, data: &[u8]) -> Fingerprint {
        let mut fp = Fingerprint::default();
        fp.calculate_sums(&mut Cursor::new(data.to_vec()), data.len() as i64)
            .unwrap();
        let id = store.put_fingerprint(fp);
        store.fingerprint(id)
    }

    #[test]
    fn prefix_search_by_sha256() {
        let store = FingerprintStore::new();
        let fp = interned(&store, b"searchable blob");
        let prefix = &fp.sha256.hex()[..4];
        let matcher = DigestMatcher::parse(&format!("sha256:{prefix}")).unwrap();
        let hit = find_matching_fingerprint(&store, &matcher);
        assert_eq!(hit, fp.cache_id().map(crate::record::FingerprintId));
    }

    #[test]
    fn git_prefix_does_not_match_other_digests() {
        let store = FingerprintStore::new();
        let fp = interned(&store, b"searchable blob");
        let prefix = &fp.sha256.hex()[..4];
        let matcher = DigestMatcher::parse(&format!("git:{prefix}")).unwrap();
        // The sha256 prefix is astronomically unlikely to also prefix the
        // git sha; when it does not, the matcher must return nothing.
        if !fp.git_sha.hex().starts_with(prefix) {
            assert_eq!(find_matching_fingerprint(&store, &matcher), None);
        }
    }

    #[test]
    fn full_git_sha_uses_the_index() {
        let store = FingerprintStore::new();
        let fp = interned(&store, b"indexed blob");
        let matcher = DigestMatcher::parse(&format!("git:{}", fp.git_sha.hex())).unwrap();
        let hit = find_matching_fingerprint(&store, &matcher);
        assert_eq!(hit, fp.cache_id().map(crate::record::FingerprintId));
    }

    #[test]
    fn wildcard_probes_every_digest() {
        let store = FingerprintStore::new();
        let fp = interned(&store, b"wildcard blob");
        let prefix = &fp.hwy256.hex()[..6];
        let matcher = DigestMatcher::parse(&format!("*:{prefix}")).unwrap();
        assert!(find_matching_fingerprint(&store, &matcher).is_some());
    }
}
