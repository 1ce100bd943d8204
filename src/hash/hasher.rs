//! Streaming hashers behind a uniform trait.
//!
//! # Invariants
//! - A hasher consumes bytes in order and finalizes exactly once.
//! - The git hasher must know the payload length up front; if the bytes
//!   written do not match the declared length it yields the zero digest
//!   rather than a wrong one.
//!
//! # Design Notes
//! - Construction is by [`DigestKind`] or by algorithm name through
//!   [`new_hasher_by_name`]; the pipeline spawns one hasher per kind.
//! - HighwayHash runs keyed with the fixed fleet-wide salt so equal blobs
//!   hash equally across machines and runs.

use std::fmt;

use highway::{HighwayHash, HighwayHasher, Key};
use md5::Digest as _;
use md5::Md5;
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};
use tracing::warn;

use super::digest::{Digest, DigestBytes, DigestKind};

/// Keyed salt for every HighwayHash digest this tool produces.
pub const HIGHWAY_KEY: [u8; 32] = [
    0xed, 0x73, 0xad, 0xab, 0x57, 0x0d, 0x4f, 0x16, 0xc8, 0xd0, 0xa8, 0xac, 0x81, 0x47, 0x4a,
    0xe3, 0xd5, 0xf8, 0x7f, 0x08, 0x7d, 0xfd, 0xcb, 0x91, 0x90, 0x94, 0x3a, 0x66, 0xfd, 0xf0,
    0x40, 0xd6,
];

/// Errors from hasher construction.
#[derive(Debug)]
#[non_exhaustive]
pub enum HashError {
    /// The algorithm name is not one of the nine supported digests.
    UnsupportedAlgorithm(String),
    /// The git hasher needs the payload length before streaming begins.
    GitSizeRequired,
}

impl fmt::Display for HashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashError::UnsupportedAlgorithm(name) => write!(f, "unsupported hash {name}"),
            HashError::GitSizeRequired => {
                write!(f, "git digest requires the input length up front")
            }
        }
    }
}

impl std::error::Error for HashError {}

/// An incremental hasher that finalizes into a [`Digest`].
pub trait DigestHasher: Send {
    fn kind(&self) -> DigestKind;
    fn update(&mut self, bytes: &[u8]);
    fn finalize(self: Box<Self>) -> Digest;
}

/// Creates a hasher for `kind`. `declared_size` is required for git.
pub fn new_hasher(
    kind: DigestKind,
    declared_size: Option<u64>,
) -> Result<Box<dyn DigestHasher>, HashError> {
    Ok(match kind {
        DigestKind::Md5 => Box::new(Md5Hasher(Md5::new())),
        DigestKind::Sha1 => Box::new(Sha1Hasher(Sha1::new())),
        DigestKind::Sha256 => Box::new(Sha256Hasher(Sha256::new())),
        DigestKind::Sha384 => Box::new(Sha384Hasher(Sha384::new())),
        DigestKind::Sha512 => Box::new(Sha512Hasher(Sha512::new())),
        DigestKind::GitSha => Box::new(GitShaHasher::new(
            declared_size.ok_or(HashError::GitSizeRequired)?,
        )),
        DigestKind::Hwy64 => Box::new(HighwayHasher64(keyed_highway())),
        DigestKind::Hwy128 => Box::new(HighwayHasher128(keyed_highway())),
        DigestKind::Hwy256 => Box::new(HighwayHasher256(keyed_highway())),
    })
}

/// Creates a hasher by algorithm name (`gitsha` aliases `git`).
pub fn new_hasher_by_name(
    name: &str,
    declared_size: Option<u64>,
) -> Result<Box<dyn DigestHasher>, HashError> {
    let kind = DigestKind::from_name(name)
        .ok_or_else(|| HashError::UnsupportedAlgorithm(name.to_string()))?;
    new_hasher(kind, declared_size)
}

fn keyed_highway() -> HighwayHasher {
    let k = |i: usize| {
        u64::from_le_bytes(HIGHWAY_KEY[i * 8..(i + 1) * 8].try_into().expect("8 bytes"))
    };
    HighwayHasher::new(Key([k(0), k(1), k(2), k(3)]))
}

fn finalized<const N: usize>(out: &[u8]) -> DigestBytes<N> {
    DigestBytes::from_slice(out).expect("digest width matches kind")
}

struct Md5Hasher(Md5);

impl DigestHasher for Md5Hasher {
    fn kind(&self) -> DigestKind {
        DigestKind::Md5
    }
    fn update(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }
    fn finalize(self: Box<Self>) -> Digest {
        Digest::Md5(finalized(&self.0.finalize()))
    }
}

struct Sha1Hasher(Sha1);

impl DigestHasher for Sha1Hasher {
    fn kind(&self) -> DigestKind {
        DigestKind::Sha1
    }
    fn update(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }
    fn finalize(self: Box<Self>) -> Digest {
        Digest::Sha1(finalized(&self.0.finalize()))
    }
}

struct Sha256Hasher(Sha256);

impl DigestHasher for Sha256Hasher {
    fn kind(&self) -> DigestKind {
        DigestKind::Sha256
    }
    fn update(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }
    fn finalize(self: Box<Self>) -> Digest {
        Digest::Sha256(finalized(&self.0.finalize()))
    }
}

struct Sha384Hasher(Sha384);

impl DigestHasher for Sha384Hasher {
    fn kind(&self) -> DigestKind {
        DigestKind::Sha384
    }
    fn update(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }
    fn finalize(self: Box<Self>) -> Digest {
        Digest::Sha384(finalized(&self.0.finalize()))
    }
}

struct Sha512Hasher(Sha512);

impl DigestHasher for Sha512Hasher {
    fn kind(&self) -> DigestKind {
        DigestKind::Sha512
    }
    fn update(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }
    fn finalize(self: Box<Self>) -> Digest {
        Digest::Sha512(finalized(&self.0.finalize()))
    }
}

/// SHA-1 over the Git blob object framing.
///
/// Git frames every hashed object as `<type> SP <decimal-length> NUL <data>`;
/// for our purposes the type is always `blob`. The frame makes the digest
/// length-dependent, so the hasher tracks the byte count and refuses to
/// produce a digest for a stream that did not match the declared length.
struct GitShaHasher {
    inner: Sha1,
    declared: u64,
    written: u64,
}

impl GitShaHasher {
    fn new(declared: u64) -> Self {
        let mut inner = Sha1::new();
        inner.update(format!("blob {declared}").as_bytes());
        inner.update([0u8]);
        Self {
            inner,
            declared,
            written: 0,
        }
    }
}

impl DigestHasher for GitShaHasher {
    fn kind(&self) -> DigestKind {
        DigestKind::GitSha
    }
    fn update(&mut self, bytes: &[u8]) {
        self.written += bytes.len() as u64;
        self.inner.update(bytes);
    }
    fn finalize(self: Box<Self>) -> Digest {
        if self.written != self.declared {
            warn!(
                declared = self.declared,
                hashed = self.written,
                "discarding git digest for length mismatch"
            );
            return Digest::zero(DigestKind::GitSha);
        }
        Digest::GitSha(finalized(&self.inner.finalize()))
    }
}

struct HighwayHasher64(HighwayHasher);

impl DigestHasher for HighwayHasher64 {
    fn kind(&self) -> DigestKind {
        DigestKind::Hwy64
    }
    fn update(&mut self, bytes: &[u8]) {
        self.0.append(bytes);
    }
    fn finalize(self: Box<Self>) -> Digest {
        Digest::Hwy64(DigestBytes::from_raw(self.0.finalize64().to_le_bytes()))
    }
}

struct HighwayHasher128(HighwayHasher);

impl DigestHasher for HighwayHasher128 {
    fn kind(&self) -> DigestKind {
        DigestKind::Hwy128
    }
    fn update(&mut self, bytes: &[u8]) {
        self.0.append(bytes);
    }
    fn finalize(self: Box<Self>) -> Digest {
        let lanes = self.0.finalize128();
        let mut out = [0u8; 16];
        out[..8].copy_from_slice(&lanes[0].to_le_bytes());
        out[8..].copy_from_slice(&lanes[1].to_le_bytes());
        Digest::Hwy128(DigestBytes::from_raw(out))
    }
}

struct HighwayHasher256(HighwayHasher);

impl DigestHasher for HighwayHasher256 {
    fn kind(&self) -> DigestKind {
        DigestKind::Hwy256
    }
    fn update(&mut self, bytes: &[u8]) {
        self.0.append(bytes);
    }
    fn finalize(self: Box<Self>) -> Digest {
        let lanes = self.0.finalize256();
        let mut out = [0u8; 32];
        for (i, lane) in lanes.iter().enumerate() {
            out[i * 8..(i + 1) * 8].copy_from_slice(&lane.to_le_bytes());
        }
        Digest::Hwy256(DigestBytes::from_raw(out))
    }
}
