//! # Stream Access
//!
//! Command-aware wrappers around [`InputStream`] reads. Every blocking read
//! a plugin performs must go through these so that a pending stop or seek
//! reaches a worker stuck waiting on a slow source.
//!
//! All three functions report end of stream, I/O errors and interruption
//! the same way (0 / `false`); check [`DecoderClient::command`] afterwards
//! to tell them apart.

use crate::client::DecoderClient;
use crate::input::InputStream;
use std::io;
use tracing::{trace, warn};

const SKIP_BUFFER_SIZE: usize = 1024;

/// Read up to `buf.len()` bytes.
///
/// Returns 0 on end of stream, on error, or when a command became pending.
pub fn read(client: &mut dyn DecoderClient, input: &mut dyn InputStream, buf: &mut [u8]) -> usize {
    if buf.is_empty() {
        return 0;
    }

    loop {
        if !client.wait_for_input(input) {
            trace!(uri = input.uri(), "Read interrupted by command");
            return 0;
        }

        match input.read(buf) {
            Ok(n) => return n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(uri = input.uri(), error = %e, "Input read failed");
                return 0;
            }
        }
    }
}

/// Fill `buf` completely.
///
/// Returns `false` if the stream ended, failed or was interrupted before
/// the buffer was full. The buffer contents are unspecified in that case.
pub fn read_full(
    client: &mut dyn DecoderClient,
    input: &mut dyn InputStream,
    buf: &mut [u8],
) -> bool {
    let mut filled = 0;
    while filled < buf.len() {
        let n = read(client, input, &mut buf[filled..]);
        if n == 0 {
            return false;
        }
        filled += n;
    }
    true
}

/// Discard `len` bytes.
///
/// Same interruption contract as [`read_full`].
pub fn skip(client: &mut dyn DecoderClient, input: &mut dyn InputStream, len: u64) -> bool {
    let mut scratch = [0u8; SKIP_BUFFER_SIZE];
    let mut remaining = len;

    while remaining > 0 {
        let want = remaining.min(SKIP_BUFFER_SIZE as u64) as usize;
        let n = read(client, input, &mut scratch[..want]);
        if n == 0 {
            return false;
        }
        remaining -= n as u64;
    }
    true
}
