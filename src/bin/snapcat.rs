//! snapcat: Snappy auto-detect cat.
//!
//! Reads stdin and writes stdout. Input that starts with the Snappy stream
//! magic is decompressed; anything else is compressed. Feeding data through
//! twice therefore recovers the original bytes.

use std::io::{self, Read, Write};
use std::process::ExitCode;

/// Magic prefix of every framed Snappy stream.
const SNAPPY_MAGIC: &[u8] = b"\xff\x06\x00\x00sNaPpY";

/// Reads up to `len` bytes and returns them plus a reader that replays the
/// peeked prefix ahead of the rest of the input.
fn peek<R: Read>(mut input: R, len: usize) -> io::Result<(Vec<u8>, impl Read)> {
    let mut header = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        let n = input.read(&mut header[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    header.truncate(filled);
    let replay = io::Cursor::new(header.clone()).chain(input);
    Ok((header, replay))
}

/// Compresses or decompresses `input` into `output` by sniffing the magic.
fn snapcat<R: Read, W: Write>(input: R, output: W) -> io::Result<()> {
    let (header, input) = peek(input, SNAPPY_MAGIC.len())?;
    if header == SNAPPY_MAGIC {
        let mut decoder = snap::read::FrameDecoder::new(input);
        let mut output = output;
        io::copy(&mut decoder, &mut output)?;
        output.flush()
    } else {
        let mut encoder = snap::write::FrameEncoder::new(output);
        let mut input = input;
        io::copy(&mut input, &mut encoder)?;
        encoder.flush()
    }
}

fn main() -> ExitCode {
    let stdin = io::stdin().lock();
    let stdout = io::stdout().lock();
    match snapcat(stdin, stdout) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("snapcat: {err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        snapcat(data, &mut out).unwrap();
        out
    }

    #[test]
    fn twice_through_recovers_the_input() {
        let data: Vec<u8> = (0..64 * 1024).map(|i| (i % 251) as u8).collect();
        let compressed = run(&data);
        assert!(compressed.starts_with(SNAPPY_MAGIC));
        assert_eq!(run(&compressed), data);
    }

    #[test]
    fn plain_input_is_compressed() {
        let out = run(b"plain text input");
        assert!(out.starts_with(SNAPPY_MAGIC));
    }

    #[test]
    fn short_input_still_works() {
        let out = run(b"ab");
        assert_eq!(run(&out), b"ab");
    }

    #[test]
    fn empty_input_round_trips() {
        let out = run(b"");
        assert_eq!(run(&out), b"");
    }
}
