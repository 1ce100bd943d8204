//! Multi-digest blob identity.
//!
//! # Invariants
//! - At most one digest per algorithm; the zero value means "not computed".
//! - Two fingerprints sharing any populated digest of the same kind with
//!   equal bytes denote the same blob.
//! - Merging fills zero slots only; a populated digest is never overwritten.

use std::fmt;
use std::io::{self, Read};

use serde::{Deserialize, Serialize};

use crate::hash::{Digest, DigestBytes, DigestKind, HashPipeline, ALL_DIGEST_KINDS};

/// The fingerprint of a blob: every digest we managed to compute plus the
/// blob length. Sufficiently populated, it is a universally unique identity.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    #[serde(default)]
    pub git_sha: DigestBytes<20>,
    #[serde(default)]
    pub md5: DigestBytes<16>,
    #[serde(default)]
    pub sha1: DigestBytes<20>,
    #[serde(default)]
    pub sha256: DigestBytes<32>,
    #[serde(default)]
    pub sha384: DigestBytes<48>,
    #[serde(default)]
    pub sha512: DigestBytes<64>,
    #[serde(default)]
    pub hwy64: DigestBytes<8>,
    #[serde(default)]
    pub hwy128: DigestBytes<16>,
    #[serde(default)]
    pub hwy256: DigestBytes<32>,
    #[serde(default)]
    pub size: i64,
    #[serde(skip)]
    cache_id: Option<u64>,
}

impl Fingerprint {
    /// Builds a fingerprint that knows only the blob's git identity and size.
    pub fn from_git_sha(git_sha: DigestBytes<20>, size: i64) -> Self {
        Fingerprint {
            git_sha,
            size,
            ..Fingerprint::default()
        }
    }

    /// The interned id, when this value has been interned.
    pub fn cache_id(&self) -> Option<u64> {
        self.cache_id
    }

    pub fn set_cache_id(&mut self, id: u64) {
        self.cache_id = Some(id);
    }

    /// The digest of `kind`, zero when not computed.
    pub fn digest(&self, kind: DigestKind) -> Digest {
        match kind {
            DigestKind::Md5 => Digest::Md5(self.md5),
            DigestKind::Sha1 => Digest::Sha1(self.sha1),
            DigestKind::Sha256 => Digest::Sha256(self.sha256),
            DigestKind::Sha384 => Digest::Sha384(self.sha384),
            DigestKind::Sha512 => Digest::Sha512(self.sha512),
            DigestKind::GitSha => Digest::GitSha(self.git_sha),
            DigestKind::Hwy64 => Digest::Hwy64(self.hwy64),
            DigestKind::Hwy128 => Digest::Hwy128(self.hwy128),
            DigestKind::Hwy256 => Digest::Hwy256(self.hwy256),
        }
    }

    /// Stores `digest` into its slot, replacing whatever was there.
    pub fn set_digest(&mut self, digest: Digest) {
        match digest {
            Digest::Md5(d) => self.md5 = d,
            Digest::Sha1(d) => self.sha1 = d,
            Digest::Sha256(d) => self.sha256 = d,
            Digest::Sha384(d) => self.sha384 = d,
            Digest::Sha512(d) => self.sha512 = d,
            Digest::GitSha(d) => self.git_sha = d,
            Digest::Hwy64(d) => self.hwy64 = d,
            Digest::Hwy128(d) => self.hwy128 = d,
            Digest::Hwy256(d) => self.hwy256 = d,
        }
    }

    /// Digests that have actually been computed.
    pub fn populated(&self) -> impl Iterator<Item = Digest> + '_ {
        ALL_DIGEST_KINDS
            .iter()
            .map(|&k| self.digest(k))
            .filter(|d| !d.is_zero())
    }

    /// Equivalence: any shared populated digest of the same kind.
    ///
    /// A size disagreement (both known, different) is a cheap negative.
    pub fn is(&self, other: &Fingerprint) -> bool {
        if self.size != 0 && other.size != 0 && self.size != other.size {
            return false;
        }
        ALL_DIGEST_KINDS.iter().any(|&k| {
            let mine = self.digest(k);
            !mine.is_zero() && mine == other.digest(k)
        })
    }

    /// Copies digests `other` has and `self` lacks. Returns the fill count.
    pub fn update_with(&mut self, other: &Fingerprint) -> usize {
        let mut updates = 0;
        if self.size == 0 && other.size != 0 {
            self.size = other.size;
            updates += 1;
        }
        for kind in ALL_DIGEST_KINDS {
            let theirs = other.digest(kind);
            if self.digest(kind).is_zero() && !theirs.is_zero() {
                self.set_digest(theirs);
                updates += 1;
            }
        }
        updates
    }

    /// Space-joined Subresource Integrity values for the digests a consumer
    /// of SRI strings can be expected to verify, in fixed order. Missing
    /// digests still render their prefix so field positions are stable.
    pub fn sri(&self) -> String {
        [
            Digest::Md5(self.md5),
            Digest::Sha1(self.sha1),
            Digest::Sha256(self.sha256),
            Digest::Sha384(self.sha384),
            Digest::Sha512(self.sha512),
        ]
        .iter()
        .map(Digest::sri)
        .collect::<Vec<_>>()
        .join(" ")
    }

    /// Computes every digest that is still zero by streaming `data` once.
    ///
    /// `size` is the expected length; it seeds the stored size when unset and
    /// drives the git blob framing. Populated digests are left untouched and
    /// are not verified against the stream.
    pub fn calculate_sums(&mut self, data: &mut dyn Read, size: i64) -> io::Result<()> {
        if self.size == 0 && size != 0 {
            self.size = size;
        }
        let missing: Vec<DigestKind> = ALL_DIGEST_KINDS
            .iter()
            .copied()
            .filter(|&k| self.digest(k).is_zero())
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        let declared = u64::try_from(self.size).ok();
        let mut pipe = HashPipeline::new(&missing, declared)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        io::copy(data, &mut pipe)?;
        let outcome = pipe.finish();
        for digest in outcome.digests {
            if self.digest(digest.kind()).is_zero() {
                self.set_digest(digest);
            }
        }
        Ok(())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for digest in self.populated() {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{}:{}", digest.kind().name(), digest.hex())?;
            first = false;
        }
        Ok(())
    }
}
