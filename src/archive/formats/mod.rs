//! Streaming container cursors.
//!
//! Each cursor yields entry metadata and leaves payload consumption to the
//! caller, which must read or skip exactly the payload (plus padding) before
//! asking for the next entry.

pub mod ar;
pub mod cpio;
pub mod rpm;
pub mod tar;
pub mod zip;

pub use ar::{ArCursor, ArEntryMeta, ArNext};
pub use cpio::{CpioCursor, CpioEntryMeta, CpioNext};
pub use rpm::{read_rpm_preamble, RpmError, RpmInfo};
pub use tar::{TarCursor, TarEntryMeta, TarNext, TAR_BLOCK_LEN};
pub use zip::{ZipArchive, ZipEntryMeta, ZipError};

use std::io::{self, Read};

/// Reads exactly `dst.len()` bytes, or reports a clean EOF at offset zero.
///
/// Returns `Ok(false)` when the source ended exactly at the boundary,
/// `Err(UnexpectedEof)` when it ended mid-record.
pub(crate) fn read_exact_or_eof<R: Read + ?Sized>(r: &mut R, dst: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < dst.len() {
        let n = r.read(&mut dst[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "source ended inside a record",
            ));
        }
        filled += n;
    }
    Ok(true)
}

/// A byte-bounded view over another reader.
///
/// Used to hand a single entry's payload to nested scanners without letting
/// them run past the entry boundary. `remaining()` after use tells the outer
/// cursor how much is left to discard.
pub struct LimitedRead<'a> {
    inner: &'a mut dyn Read,
    remaining: u64,
}

impl<'a> LimitedRead<'a> {
    pub fn new(inner: &'a mut dyn Read, limit: u64) -> Self {
        LimitedRead {
            inner,
            remaining: limit,
        }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl Read for LimitedRead<'_> {
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Ok(0);
        }
        let cap = dst.len().min(self.remaining.min(usize::MAX as u64) as usize);
        let n = self.inner.read(&mut dst[..cap])?;
        self.remaining -= n as u64;
        Ok(n)
    }
}
