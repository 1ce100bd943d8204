//! Fingerprint passthrough tee.
//!
//! # Invariants
//! - The consumer sees exactly the bytes of the wrapped reader, in order;
//!   every byte it reads is also fed to the hash pipeline.
//! - `finish` drains whatever the consumer left unread, so the container
//!   fingerprint always covers the whole stream.
//! - A tee never wraps another tee. That would hash the same bytes once per
//!   layer of wrapping; construction fails fast instead.

use std::fs;
use std::io::{self, Read, Write};

use crate::archive::formats::LimitedRead;
use crate::hash::{HashPipeline, ALL_DIGEST_KINDS};
use crate::record::Fingerprint;

use super::error::ScanError;

/// Marker trait for readers the scanner threads through containers.
///
/// The only question it answers is "is this already a passthrough tee",
/// which lets [`Passthrough::new`] reject accidental double wrapping even
/// through trait objects.
pub trait ScanRead: Read {
    fn is_passthrough(&self) -> bool {
        false
    }
}

impl ScanRead for fs::File {}
impl ScanRead for LimitedRead<'_> {}
impl ScanRead for io::Cursor<Vec<u8>> {}
impl<'a> ScanRead for Box<dyn Read + 'a> {}

impl<T: ScanRead + ?Sized> ScanRead for &mut T {
    fn is_passthrough(&self) -> bool {
        (**self).is_passthrough()
    }
}

impl<'a> ScanRead for Box<dyn ScanRead + 'a> {
    fn is_passthrough(&self) -> bool {
        (**self).is_passthrough()
    }
}

/// Reader adapter forking a byte stream to a consumer and a hash pipeline.
pub struct Passthrough<'a> {
    inner: &'a mut dyn ScanRead,
    pipe: HashPipeline,
    declared: Option<u64>,
}

impl<'a> std::fmt::Debug for Passthrough<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Passthrough")
            .field("declared", &self.declared)
            .finish_non_exhaustive()
    }
}

impl<'a> Passthrough<'a> {
    /// Wraps `inner`, scheduling all nine digests over its bytes.
    ///
    /// `declared` is the expected stream length when known; it gates the git
    /// digest and the partial check in [`Passthrough::finish`].
    pub fn new(inner: &'a mut dyn ScanRead, declared: Option<u64>) -> Result<Self, ScanError> {
        if inner.is_passthrough() {
            return Err(ScanError::NestedTee);
        }
        let pipe = HashPipeline::new(&ALL_DIGEST_KINDS, declared)?;
        Ok(Passthrough {
            inner,
            pipe,
            declared,
        })
    }

    /// Drains the rest of the stream, closes the pipeline, and returns the
    /// fingerprint plus a partial flag. Partial fingerprints (stream shorter
    /// or longer than declared) must not be interned.
    pub fn finish(mut self) -> Result<(Fingerprint, bool), ScanError> {
        let mut scratch = [0u8; 16 * 1024];
        loop {
            let n = self.inner.read(&mut scratch)?;
            if n == 0 {
                break;
            }
            self.pipe.write_all(&scratch[..n])?;
        }
        let outcome = self.pipe.finish();
        let mut fp = Fingerprint::default();
        fp.size = self.declared.unwrap_or(outcome.written) as i64;
        for digest in outcome.digests {
            fp.set_digest(digest);
        }
        Ok((fp, outcome.partial))
    }
}

impl Read for Passthrough<'_> {
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(dst)?;
        if n > 0 {
            self.pipe.write_all(&dst[..n])?;
        }
        Ok(n)
    }
}

impl ScanRead for Passthrough<'_> {
    fn is_passthrough(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consumer_sees_the_exact_stream() {
        let mut src = io::Cursor::new(b"forwarded bytes".to_vec());
        let mut tee = Passthrough::new(&mut src, Some(15)).unwrap();
        let mut seen = Vec::new();
        tee.read_to_end(&mut seen).unwrap();
        assert_eq!(seen, b"forwarded bytes");
        let (fp, partial) = tee.finish().unwrap();
        assert!(!partial);
        assert_eq!(fp.size, 15);
        assert_eq!(fp.populated().count(), 9);
    }

    #[test]
    fn finish_drains_what_the_consumer_skipped() {
        let data = b"0123456789".to_vec();
        let mut src = io::Cursor::new(data.clone());
        let mut tee = Passthrough::new(&mut src, Some(10)).unwrap();
        let mut first = [0u8; 4];
        tee.read_exact(&mut first).unwrap();
        let (fp, partial) = tee.finish().unwrap();
        assert!(!partial);

        let mut reference = Fingerprint::default();
        reference
            .calculate_sums(&mut io::Cursor::new(data), 10)
            .unwrap();
        assert_eq!(fp.sha256, reference.sha256);
        assert_eq!(fp.git_sha, reference.git_sha);
    }

    #[test]
    fn nested_tee_is_rejected() {
        let mut src = io::Cursor::new(b"x".to_vec());
        let mut tee = Passthrough::new(&mut src, None).unwrap();
        let err = Passthrough::new(&mut tee, None).unwrap_err();
        assert!(matches!(err, ScanError::NestedTee));
    }

    #[test]
    fn declared_mismatch_is_partial() {
        let mut src = io::Cursor::new(b"abc".to_vec());
        let tee = Passthrough::new(&mut src, Some(100)).unwrap();
        let (fp, partial) = tee.finish().unwrap();
        assert!(partial);
        assert!(fp.git_sha.is_zero());
        assert!(!fp.sha256.is_zero());
    }
}
