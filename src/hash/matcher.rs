//! Digest search patterns.
//!
//! A pattern is `<algo>:<hex>` where the hex part may be a prefix of the full
//! digest. Even-length hex decodes to bytes and compares as a byte prefix
//! against the raw digest; odd-length hex falls back to a string-prefix
//! comparison of the rendered form. The `*` algorithm compares against every
//! populated digest and cannot use any index.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use super::digest::Digest;

/// Algorithms a matcher may name. `Any` is the `*` wildcard.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatcherAlgo {
    Any,
    GitSha,
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl MatcherAlgo {
    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "*" => MatcherAlgo::Any,
            "git" | "gitsha" => MatcherAlgo::GitSha,
            "sha1" => MatcherAlgo::Sha1,
            "sha256" => MatcherAlgo::Sha256,
            "sha384" => MatcherAlgo::Sha384,
            "sha512" => MatcherAlgo::Sha512,
            _ => return None,
        })
    }
}

/// Error for patterns that do not parse.
#[derive(Debug)]
pub struct MatcherParseError(pub String);

impl fmt::Display for MatcherParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid digest pattern: {}", self.0)
    }
}

impl std::error::Error for MatcherParseError {}

/// A parsed digest comparison operand.
#[derive(Clone, Debug)]
pub struct DigestMatcher {
    pub algo: MatcherAlgo,
    /// Lowercased hex pattern as given.
    pub pattern: String,
    /// Decoded byte prefix; only present for even-length hex.
    pub bytes: Option<Vec<u8>>,
}

fn pattern_format() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\*|git|gitsha|sha1|sha256|sha384|sha512):([0-9a-fA-F]+)$")
            .expect("matcher pattern regex")
    })
}

impl DigestMatcher {
    /// Parses `<algo>:<hex>`.
    pub fn parse(pat: &str) -> Result<DigestMatcher, MatcherParseError> {
        let caps = pattern_format()
            .captures(pat)
            .ok_or_else(|| MatcherParseError(pat.to_string()))?;
        let algo = MatcherAlgo::parse(&caps[1]).ok_or_else(|| MatcherParseError(pat.to_string()))?;
        let pattern = caps[2].to_ascii_lowercase();
        let bytes = if pattern.len() % 2 == 0 {
            hex::decode(&pattern).ok()
        } else {
            None
        };
        Ok(DigestMatcher {
            algo,
            pattern,
            bytes,
        })
    }

    /// True when the matcher names a single algorithm (not the wildcard).
    pub fn is_exact(&self) -> bool {
        self.algo != MatcherAlgo::Any
    }

    /// Compares the matcher against one finalized digest.
    pub fn matches_digest(&self, digest: &Digest) -> bool {
        if let Some(bytes) = &self.bytes {
            if bytes.len() > digest.size() {
                return false;
            }
            return digest.bytes().starts_with(bytes);
        }
        digest.hex().starts_with(&self.pattern)
    }
}

impl fmt::Display for DigestMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "algo: {:?}, pattern: {}, exact: {}, byte-optimized: {}",
            self.algo,
            self.pattern,
            self.is_exact(),
            self.bytes.is_some()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::digest::DigestBytes;

    fn sha256_of_raw(first: &[u8]) -> Digest {
        let mut raw = [0u8; 32];
        raw[..first.len()].copy_from_slice(first);
        Digest::Sha256(DigestBytes::from_raw(raw))
    }

    #[test]
    fn parse_accepts_known_algos() {
        assert!(DigestMatcher::parse("sha256:9f86").is_ok());
        assert!(DigestMatcher::parse("git:abcd").is_ok());
        assert!(DigestMatcher::parse("gitsha:abcd").is_ok());
        assert!(DigestMatcher::parse("*:00ff").is_ok());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(DigestMatcher::parse("md5").is_err());
        assert!(DigestMatcher::parse("sha256:zzzz").is_err());
        assert!(DigestMatcher::parse("crc32:abcd").is_err());
        assert!(DigestMatcher::parse("").is_err());
    }

    #[test]
    fn even_hex_compares_byte_prefix() {
        let m = DigestMatcher::parse("sha256:9f86").unwrap();
        assert!(m.bytes.is_some());
        assert!(m.matches_digest(&sha256_of_raw(&[0x9f, 0x86, 0x01])));
        assert!(!m.matches_digest(&sha256_of_raw(&[0x9f, 0x87])));
    }

    #[test]
    fn odd_hex_compares_rendered_prefix() {
        let m = DigestMatcher::parse("sha256:9f8").unwrap();
        assert!(m.bytes.is_none());
        assert!(m.matches_digest(&sha256_of_raw(&[0x9f, 0x86])));
        assert!(!m.matches_digest(&sha256_of_raw(&[0x9a, 0x86])));
    }

    #[test]
    fn uppercase_patterns_are_normalized() {
        let m = DigestMatcher::parse("sha256:9F8").unwrap();
        assert!(m.matches_digest(&sha256_of_raw(&[0x9f, 0x86])));
    }

    #[test]
    fn over_long_pattern_never_matches() {
        let m = DigestMatcher::parse(&format!("sha256:{}", "ab".repeat(33))).unwrap();
        assert!(!m.matches_digest(&sha256_of_raw(&[0xab; 32])));
    }
}
