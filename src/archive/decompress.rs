//! Compression codec dispatch.
//!
//! Container parsing is ours; the codecs are library-backed. An algorithm
//! name outside the table is a [`DecompressError::Unsupported`], which the
//! scanner treats as "skip this container, log, continue".

use std::fmt;
use std::io::{self, Read};

use bzip2::read::BzDecoder;
use flate2::read::MultiGzDecoder;

/// Errors from codec selection and setup.
#[derive(Debug)]
#[non_exhaustive]
pub enum DecompressError {
    /// Unknown or unhandled compression algorithm name.
    Unsupported(String),
    /// Decoder construction failed.
    Io(io::Error),
}

impl fmt::Display for DecompressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecompressError::Unsupported(algo) => write!(f, "unsupported compression: {algo}"),
            DecompressError::Io(err) => write!(f, "could not open decompressor: {err}"),
        }
    }
}

impl std::error::Error for DecompressError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DecompressError::Io(err) => Some(err),
            _ => None,
        }
    }
}

/// Wraps `input` in a streaming decoder for `algo`.
///
/// Accepted names: `gz`/`gzip`, `bz2`/`bzip2`, `xz`, `lzma`, `sz`/`snappy`.
/// These cover the tar suffix table and the payload compressions RPM
/// declares in practice.
pub fn decompress<'a, R: Read + 'a>(
    algo: &str,
    input: R,
) -> Result<Box<dyn Read + 'a>, DecompressError> {
    match algo {
        "gz" | "gzip" => Ok(Box::new(MultiGzDecoder::new(input))),
        "bz2" | "bzip2" => Ok(Box::new(BzDecoder::new(input))),
        "xz" => Ok(Box::new(xz2::read::XzDecoder::new(input))),
        "lzma" => {
            let stream = xz2::stream::Stream::new_lzma_decoder(u64::MAX)
                .map_err(|e| DecompressError::Io(io::Error::new(io::ErrorKind::Other, e)))?;
            Ok(Box::new(xz2::read::XzDecoder::new_stream(input, stream)))
        }
        "sz" | "snappy" => Ok(Box::new(snap::read::FrameDecoder::new(input))),
        _ => Err(DecompressError::Unsupported(algo.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn gzip_round_trip() {
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(b"round trip payload").unwrap();
        let compressed = enc.finish().unwrap();
        let mut out = Vec::new();
        decompress("gzip", &compressed[..])
            .unwrap()
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, b"round trip payload");
    }

    #[test]
    fn snappy_round_trip() {
        let mut enc = snap::write::FrameEncoder::new(Vec::new());
        enc.write_all(b"snappy payload").unwrap();
        let compressed = enc.into_inner().unwrap();
        let mut out = Vec::new();
        decompress("snappy", &compressed[..])
            .unwrap()
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, b"snappy payload");
    }

    #[test]
    fn bzip2_round_trip() {
        let mut enc = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
        enc.write_all(b"bz payload").unwrap();
        let compressed = enc.finish().unwrap();
        let mut out = Vec::new();
        decompress("bz2", &compressed[..])
            .unwrap()
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, b"bz payload");
    }

    #[test]
    fn xz_round_trip() {
        let mut enc = xz2::write::XzEncoder::new(Vec::new(), 3);
        enc.write_all(b"xz payload").unwrap();
        let compressed = enc.finish().unwrap();
        let mut out = Vec::new();
        decompress("xz", &compressed[..])
            .unwrap()
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, b"xz payload");
    }

    #[test]
    fn unknown_algorithm_is_rejected() {
        assert!(matches!(
            decompress("zstd", &b""[..]),
            Err(DecompressError::Unsupported(_))
        ));
    }
}
