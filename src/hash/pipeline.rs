//! Multi-hash fan-out pipeline.
//!
//! # Invariants
//! - Every hasher sees the same byte stream in the same order.
//! - Channels are bounded, so a slow hasher exerts backpressure on the
//!   producer instead of buffering the blob.
//! - Closing the sink is what lets hashers finalize; `finish` joins them all.
//!
//! # Algorithm
//! One worker thread per requested digest, each draining its own bounded
//! channel of shared chunks. The sink copies each written slice into an
//! `Arc<[u8]>` once and clones the handle to every feed.
//!
//! # Design Notes
//! - A git digest is only scheduled when the payload length is declared;
//!   without it the git slot stays zero, matching the merge-fill contract.
//! - An early close (written != declared) marks the outcome partial. Partial
//!   outcomes carry whatever digests completed but must not be interned.

use std::io::{self, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Sender};
use tracing::{debug, warn};

use super::digest::{Digest, DigestKind};
use super::hasher::{new_hasher, HashError};

/// Chunks in flight per hasher before the producer blocks.
const FEED_DEPTH: usize = 16;

/// Completed digests plus stream accounting from one pipeline run.
pub struct HashOutcome {
    /// One digest per scheduled hasher; invalid ones are zero.
    pub digests: Vec<Digest>,
    /// Bytes written through the sink.
    pub written: u64,
    /// True when a declared length was not met; do not intern.
    pub partial: bool,
}

/// Fan-out sink computing several digests over one pass of a byte stream.
pub struct HashPipeline {
    feeds: Vec<Sender<Arc<[u8]>>>,
    workers: Vec<JoinHandle<Digest>>,
    declared: Option<u64>,
    written: u64,
}

impl HashPipeline {
    /// Spawns one hasher per requested kind.
    ///
    /// `declared_size` is the expected stream length when known. The git
    /// hasher is skipped (left zero) when it is not.
    pub fn new(kinds: &[DigestKind], declared_size: Option<u64>) -> Result<Self, HashError> {
        let mut feeds = Vec::with_capacity(kinds.len());
        let mut workers = Vec::with_capacity(kinds.len());
        for &kind in kinds {
            if kind == DigestKind::GitSha && declared_size.is_none() {
                debug!("skipping git digest: stream length unknown");
                continue;
            }
            let hasher = new_hasher(kind, declared_size)?;
            let (tx, rx) = bounded::<Arc<[u8]>>(FEED_DEPTH);
            let worker = thread::Builder::new()
                .name(format!("hash-{}", kind.name()))
                .spawn(move || {
                    let mut hasher = hasher;
                    for chunk in rx {
                        hasher.update(&chunk);
                    }
                    hasher.finalize()
                })
                .expect("spawn hasher thread");
            feeds.push(tx);
            workers.push(worker);
        }
        Ok(Self {
            feeds,
            workers,
            declared: declared_size,
            written: 0,
        })
    }

    /// Bytes accepted so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Closes the sink, joins every hasher, and harvests the digests.
    pub fn finish(mut self) -> HashOutcome {
        self.feeds.clear();
        let mut digests = Vec::with_capacity(self.workers.len());
        for worker in self.workers.drain(..) {
            match worker.join() {
                Ok(digest) => digests.push(digest),
                Err(_) => warn!("hasher thread panicked; digest dropped"),
            }
        }
        let partial = self.declared.map_or(false, |d| d != self.written);
        HashOutcome {
            digests,
            written: self.written,
            partial,
        }
    }
}

impl Write for HashPipeline {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let chunk: Arc<[u8]> = Arc::from(buf);
        for feed in &self.feeds {
            if feed.send(chunk.clone()).is_err() {
                return Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "hasher stopped accepting input",
                ));
            }
        }
        self.written += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::digest::ALL_DIGEST_KINDS;

    fn digest_hex(outcome: &HashOutcome, kind: DigestKind) -> Option<String> {
        outcome
            .digests
            .iter()
            .find(|d| d.kind() == kind)
            .map(|d| d.hex())
    }

    #[test]
    fn all_digests_over_one_pass() {
        let mut pipe = HashPipeline::new(&ALL_DIGEST_KINDS, Some(3)).unwrap();
        pipe.write_all(b"abc").unwrap();
        let outcome = pipe.finish();
        assert!(!outcome.partial);
        assert_eq!(outcome.written, 3);
        assert_eq!(outcome.digests.len(), ALL_DIGEST_KINDS.len());
        assert_eq!(
            digest_hex(&outcome, DigestKind::Md5).unwrap(),
            "900150983cd24fb0d6963f7d28e17f72"
        );
        assert_eq!(
            digest_hex(&outcome, DigestKind::Sha1).unwrap(),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
        assert!(!outcome
            .digests
            .iter()
            .find(|d| d.kind() == DigestKind::Hwy256)
            .unwrap()
            .is_zero());
    }

    #[test]
    fn git_skipped_without_declared_size() {
        let mut pipe = HashPipeline::new(&ALL_DIGEST_KINDS, None).unwrap();
        pipe.write_all(b"anything").unwrap();
        let outcome = pipe.finish();
        assert!(!outcome.partial);
        assert_eq!(outcome.digests.len(), ALL_DIGEST_KINDS.len() - 1);
        assert!(digest_hex(&outcome, DigestKind::GitSha).is_none());
    }

    #[test]
    fn early_close_marks_partial_and_nulls_git() {
        let mut pipe =
            HashPipeline::new(&[DigestKind::GitSha, DigestKind::Sha256], Some(10)).unwrap();
        pipe.write_all(b"abc").unwrap();
        let outcome = pipe.finish();
        assert!(outcome.partial);
        let git = outcome
            .digests
            .iter()
            .find(|d| d.kind() == DigestKind::GitSha)
            .unwrap();
        assert!(git.is_zero());
        // Other digests still complete over the truncated stream.
        assert_eq!(
            digest_hex(&outcome, DigestKind::Sha256).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn chunked_writes_match_oneshot() {
        let mut a = HashPipeline::new(&[DigestKind::Sha512], None).unwrap();
        a.write_all(b"hello ").unwrap();
        a.write_all(b"world").unwrap();
        let mut b = HashPipeline::new(&[DigestKind::Sha512], None).unwrap();
        b.write_all(b"hello world").unwrap();
        assert_eq!(a.finish().digests, b.finish().digests);
    }
}
