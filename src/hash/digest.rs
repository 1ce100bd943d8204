//! Finalized digest values.
//!
//! # Invariants
//! - A digest is a fixed-width byte array; the all-zero value means "not
//!   computed" and is never a legitimate checksum for our purposes.
//! - Rendering is deterministic: lowercase hex, standard base64.
//!
//! # Design Notes
//! - `DigestBytes<N>` carries the storage and the encodings; the [`Digest`]
//!   enum adds the algorithm tag for dynamic dispatch (factory construction,
//!   matcher comparisons, CLI output).
//! - Serde output is format-aware: hex strings for human-readable encoders
//!   (yaml), raw bytes for binary encoders (the snappy-framed store image).

use std::fmt;

use base64::prelude::{Engine as _, BASE64_STANDARD};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The nine supported digest algorithms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DigestKind {
    Md5,
    Sha1,
    Sha256,
    Sha384,
    Sha512,
    /// SHA-1 over the Git blob framing `"blob" SP <len> NUL <data>`.
    GitSha,
    Hwy64,
    Hwy128,
    Hwy256,
}

/// All kinds, in the canonical order used by fingerprint rendering.
pub const ALL_DIGEST_KINDS: [DigestKind; 9] = [
    DigestKind::GitSha,
    DigestKind::Md5,
    DigestKind::Sha1,
    DigestKind::Sha256,
    DigestKind::Sha384,
    DigestKind::Sha512,
    DigestKind::Hwy64,
    DigestKind::Hwy128,
    DigestKind::Hwy256,
];

impl DigestKind {
    /// Canonical lowercase name, as accepted and printed by the CLI.
    pub fn name(self) -> &'static str {
        match self {
            DigestKind::Md5 => "md5",
            DigestKind::Sha1 => "sha1",
            DigestKind::Sha256 => "sha256",
            DigestKind::Sha384 => "sha384",
            DigestKind::Sha512 => "sha512",
            DigestKind::GitSha => "git",
            DigestKind::Hwy64 => "hwy64",
            DigestKind::Hwy128 => "hwy128",
            DigestKind::Hwy256 => "hwy256",
        }
    }

    /// Digest width in bytes.
    pub fn width(self) -> usize {
        match self {
            DigestKind::Md5 => 16,
            DigestKind::Sha1 => 20,
            DigestKind::Sha256 => 32,
            DigestKind::Sha384 => 48,
            DigestKind::Sha512 => 64,
            DigestKind::GitSha => 20,
            DigestKind::Hwy64 => 8,
            DigestKind::Hwy128 => 16,
            DigestKind::Hwy256 => 32,
        }
    }

    /// Parses an algorithm name. `gitsha` is an accepted alias for `git`.
    pub fn from_name(name: &str) -> Option<DigestKind> {
        Some(match name {
            "md5" => DigestKind::Md5,
            "sha1" => DigestKind::Sha1,
            "sha256" => DigestKind::Sha256,
            "sha384" => DigestKind::Sha384,
            "sha512" => DigestKind::Sha512,
            "git" | "gitsha" => DigestKind::GitSha,
            "hwy64" => DigestKind::Hwy64,
            "hwy128" => DigestKind::Hwy128,
            "hwy256" => DigestKind::Hwy256,
            _ => return None,
        })
    }
}

impl fmt::Display for DigestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fixed-width finalized checksum storage.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DigestBytes<const N: usize>([u8; N]);

impl<const N: usize> Default for DigestBytes<N> {
    fn default() -> Self {
        DigestBytes([0u8; N])
    }
}

impl<const N: usize> DigestBytes<N> {
    pub const WIDTH: usize = N;

    pub fn from_raw(raw: [u8; N]) -> Self {
        DigestBytes(raw)
    }

    /// Copies from a slice; `None` when the length does not match.
    pub fn from_slice(raw: &[u8]) -> Option<Self> {
        let mut out = [0u8; N];
        if raw.len() != N {
            return None;
        }
        out.copy_from_slice(raw);
        Some(DigestBytes(out))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_raw(self) -> [u8; N] {
        self.0
    }

    /// True for the zero value, meaning the digest was never computed.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; N]
    }

    pub fn hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn base64(&self) -> String {
        BASE64_STANDARD.encode(self.0)
    }
}

impl<const N: usize> fmt::Display for DigestBytes<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex())
    }
}

impl<const N: usize> fmt::Debug for DigestBytes<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DigestBytes<{N}>({})", self.hex())
    }
}

impl<const N: usize> Serialize for DigestBytes<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.hex())
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

struct DigestBytesVisitor<const N: usize>;

impl<'de, const N: usize> Visitor<'de> for DigestBytesVisitor<N> {
    type Value = DigestBytes<N>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{N} raw bytes or {} hex characters", 2 * N)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        let raw = hex::decode(v).map_err(E::custom)?;
        DigestBytes::from_slice(&raw)
            .ok_or_else(|| E::invalid_length(raw.len(), &self))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
        DigestBytes::from_slice(v).ok_or_else(|| E::invalid_length(v.len(), &self))
    }

    fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut out = [0u8; N];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = seq
                .next_element()?
                .ok_or_else(|| de::Error::invalid_length(i, &self))?;
        }
        Ok(DigestBytes(out))
    }
}

impl<'de, const N: usize> Deserialize<'de> for DigestBytes<N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            deserializer.deserialize_str(DigestBytesVisitor::<N>)
        } else {
            deserializer.deserialize_bytes(DigestBytesVisitor::<N>)
        }
    }
}

/// A finalized digest together with its algorithm.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Digest {
    Md5(DigestBytes<16>),
    Sha1(DigestBytes<20>),
    Sha256(DigestBytes<32>),
    Sha384(DigestBytes<48>),
    Sha512(DigestBytes<64>),
    GitSha(DigestBytes<20>),
    Hwy64(DigestBytes<8>),
    Hwy128(DigestBytes<16>),
    Hwy256(DigestBytes<32>),
}

impl Digest {
    pub fn kind(&self) -> DigestKind {
        match self {
            Digest::Md5(_) => DigestKind::Md5,
            Digest::Sha1(_) => DigestKind::Sha1,
            Digest::Sha256(_) => DigestKind::Sha256,
            Digest::Sha384(_) => DigestKind::Sha384,
            Digest::Sha512(_) => DigestKind::Sha512,
            Digest::GitSha(_) => DigestKind::GitSha,
            Digest::Hwy64(_) => DigestKind::Hwy64,
            Digest::Hwy128(_) => DigestKind::Hwy128,
            Digest::Hwy256(_) => DigestKind::Hwy256,
        }
    }

    /// The zero ("not computed") digest of the given kind.
    pub fn zero(kind: DigestKind) -> Digest {
        match kind {
            DigestKind::Md5 => Digest::Md5(DigestBytes::default()),
            DigestKind::Sha1 => Digest::Sha1(DigestBytes::default()),
            DigestKind::Sha256 => Digest::Sha256(DigestBytes::default()),
            DigestKind::Sha384 => Digest::Sha384(DigestBytes::default()),
            DigestKind::Sha512 => Digest::Sha512(DigestBytes::default()),
            DigestKind::GitSha => Digest::GitSha(DigestBytes::default()),
            DigestKind::Hwy64 => Digest::Hwy64(DigestBytes::default()),
            DigestKind::Hwy128 => Digest::Hwy128(DigestBytes::default()),
            DigestKind::Hwy256 => Digest::Hwy256(DigestBytes::default()),
        }
    }

    pub fn size(&self) -> usize {
        self.kind().width()
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            Digest::Md5(d) => d.as_bytes(),
            Digest::Sha1(d) => d.as_bytes(),
            Digest::Sha256(d) => d.as_bytes(),
            Digest::Sha384(d) => d.as_bytes(),
            Digest::Sha512(d) => d.as_bytes(),
            Digest::GitSha(d) => d.as_bytes(),
            Digest::Hwy64(d) => d.as_bytes(),
            Digest::Hwy128(d) => d.as_bytes(),
            Digest::Hwy256(d) => d.as_bytes(),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.bytes().iter().all(|&b| b == 0)
    }

    pub fn hex(&self) -> String {
        hex::encode(self.bytes())
    }

    pub fn base64(&self) -> String {
        BASE64_STANDARD.encode(self.bytes())
    }

    /// Subresource Integrity rendering: `<algo>-<base64>`.
    ///
    /// A zero digest renders as the prefix with an empty base64 payload, so
    /// field order and presence stay fixed for consumers that split on space.
    pub fn sri(&self) -> String {
        if self.is_zero() {
            format!("{}-", self.kind().name())
        } else {
            format!("{}-{}", self.kind().name(), self.base64())
        }
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_round_trip() {
        for kind in ALL_DIGEST_KINDS {
            assert_eq!(DigestKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(DigestKind::from_name("gitsha"), Some(DigestKind::GitSha));
        assert_eq!(DigestKind::from_name("sha3"), None);
    }

    #[test]
    fn zero_value_semantics() {
        let zero: DigestBytes<20> = DigestBytes::default();
        assert!(zero.is_zero());
        let nonzero = DigestBytes::from_raw([1u8; 20]);
        assert!(!nonzero.is_zero());
        assert_eq!(zero.hex().len(), 40);
    }

    #[test]
    fn sri_renders_prefix_for_zero_digest() {
        assert_eq!(Digest::zero(DigestKind::Md5).sri(), "md5-");
        let d = Digest::Sha256(DigestBytes::from_raw([0xab; 32]));
        assert!(d.sri().starts_with("sha256-"));
        assert!(d.sri().len() > "sha256-".len());
    }

    #[test]
    fn hex_is_lowercase() {
        let d = DigestBytes::from_raw([0xAB, 0xCD, 0xEF, 0x01]);
        assert_eq!(d.hex(), "abcdef01");
    }

    #[test]
    fn serde_yaml_uses_hex_strings() {
        let d = DigestBytes::from_raw([0x0f, 0x10]);
        let text = serde_yaml::to_string(&d).unwrap();
        assert!(text.contains("0f10"));
        let back: DigestBytes<2> = serde_yaml::from_str(&text).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn serde_bincode_uses_raw_bytes() {
        let d = DigestBytes::from_raw([7u8; 32]);
        let bytes = bincode::serialize(&d).unwrap();
        let back: DigestBytes<32> = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, d);
    }
}
