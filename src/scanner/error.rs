//! Scanner error taxonomy.
//!
//! Errors are typed at component boundaries and recovered at unit-of-work
//! boundaries: a failed entry is logged and skipped by its container scan, a
//! failed container is logged and skipped by the inventory driver, and only
//! the CLI root turns an error into an exit code.

use std::fmt;
use std::io;

use crate::archive::formats::{RpmError, ZipError};
use crate::archive::DecompressError;
use crate::hash::HashError;
use crate::store::StoreError;

#[derive(Debug)]
#[non_exhaustive]
pub enum ScanError {
    Io(io::Error),
    Hash(HashError),
    Decompress(DecompressError),
    Zip(ZipError),
    Rpm(RpmError),
    Git(git2::Error),
    Store(StoreError),
    /// The byte stream ended before its declared length; the fingerprint is
    /// unusable and was not interned.
    PartialFingerprint { path: String },
    /// The name matches no scannable format.
    NotScannable { path: String },
    /// A passthrough tee was asked to wrap another passthrough tee.
    NestedTee,
    /// The container daemon (or its CLI) failed us.
    Daemon(String),
    /// Nothing on the command line was scannable. Not a usage error.
    NoTargets,
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanError::Io(err) => write!(f, "I/O error: {err}"),
            ScanError::Hash(err) => write!(f, "{err}"),
            ScanError::Decompress(err) => write!(f, "{err}"),
            ScanError::Zip(err) => write!(f, "{err}"),
            ScanError::Rpm(err) => write!(f, "{err}"),
            ScanError::Git(err) => write!(f, "git error: {err}"),
            ScanError::Store(err) => write!(f, "{err}"),
            ScanError::PartialFingerprint { path } => {
                write!(f, "incomplete byte stream for {path}; fingerprint discarded")
            }
            ScanError::NotScannable { path } => write!(f, "not a scannable format: {path}"),
            ScanError::NestedTee => write!(f, "refusing to nest fingerprint passthroughs"),
            ScanError::Daemon(what) => write!(f, "image daemon: {what}"),
            ScanError::NoTargets => write!(f, "no scannable targets found"),
        }
    }
}

impl std::error::Error for ScanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScanError::Io(err) => Some(err),
            ScanError::Hash(err) => Some(err),
            ScanError::Decompress(err) => Some(err),
            ScanError::Zip(err) => Some(err),
            ScanError::Rpm(err) => Some(err),
            ScanError::Git(err) => Some(err),
            ScanError::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ScanError {
    fn from(err: io::Error) -> Self {
        ScanError::Io(err)
    }
}

impl From<HashError> for ScanError {
    fn from(err: HashError) -> Self {
        ScanError::Hash(err)
    }
}

impl From<DecompressError> for ScanError {
    fn from(err: DecompressError) -> Self {
        ScanError::Decompress(err)
    }
}

impl From<ZipError> for ScanError {
    fn from(err: ZipError) -> Self {
        ScanError::Zip(err)
    }
}

impl From<RpmError> for ScanError {
    fn from(err: RpmError) -> Self {
        ScanError::Rpm(err)
    }
}

impl From<git2::Error> for ScanError {
    fn from(err: git2::Error) -> Self {
        ScanError::Git(err)
    }
}

impl From<StoreError> for ScanError {
    fn from(err: StoreError) -> Self {
        ScanError::Store(err)
    }
}
