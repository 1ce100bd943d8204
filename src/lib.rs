//! Forensic fingerprinting for build artifacts.
//!
//! blobprint identifies every byte-blob it can reach in file trees, archive
//! files, git checkouts, and docker images, and records three things about
//! each one:
//! - a multi-algorithm content fingerprint (nine digests over one pass),
//! - the containment relationships around it (archive > entry, commit >
//!   file, image > layer > file),
//! - a persistent deduplicated graph of all observations.
//!
//! The payoff is traceability: a blob referenced later by *any* supported
//! digest resolves to every place it has been seen.
//!
//! High-level flow (one scan session):
//! restore store -> classify targets -> scan (files / repos / archives /
//! packages / images) -> verify -> persist.
//!
//! The interesting machinery lives in three places. [`hash`] computes the
//! nine digests concurrently while a container parser consumes the same
//! stream ([`scanner::Passthrough`]). [`scanner::archive`] walks nested
//! containers to a depth budget, pairing each container's fingerprint with
//! its entries'. [`store`] is the dedup-on-insert graph with cross-digest
//! lookup and an id-addressed on-disk form.

pub mod archive;
pub mod hash;
pub mod record;
pub mod scanner;
pub mod stdx;
pub mod store;

pub use hash::{Digest, DigestKind, DigestMatcher};
pub use record::Fingerprint;
pub use store::FingerprintStore;
