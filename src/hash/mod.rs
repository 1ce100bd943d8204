//! Digest primitives and the multi-hash pipeline.
//!
//! Nine digest algorithms are supported: md5, sha1, sha256, sha384, sha512,
//! git (SHA-1 over the Git blob framing), and keyed HighwayHash at 64, 128,
//! and 256 bits. [`pipeline::HashPipeline`] computes any subset concurrently
//! over a single pass of the input.

pub mod digest;
pub mod hasher;
pub mod matcher;
pub mod pipeline;

pub use digest::{Digest, DigestBytes, DigestKind, ALL_DIGEST_KINDS};
pub use hasher::{new_hasher, new_hasher_by_name, DigestHasher, HashError, HIGHWAY_KEY};
pub use matcher::{DigestMatcher, MatcherAlgo, MatcherParseError};
pub use pipeline::{HashOutcome, HashPipeline};

/// A git-framed SHA-1, the canonical identity for blobs that came from git.
pub type GitSha = DigestBytes<20>;
