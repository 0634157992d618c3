//! Byte-stream framing with resynchronization.
//!
//! Serial links deliver an unaligned byte stream: reads split frames at
//! arbitrary points and line noise corrupts single bytes. [`FrameAssembler`]
//! accumulates bytes and yields aligned, footer-checked frames.
//!
//! # Resync rules
//! - No header in the buffer: keep only the last `HEADER.len() - 1` bytes
//!   (a header may straddle the next read).
//! - Header found, frame incomplete: discard what precedes the header and
//!   wait for more bytes.
//! - Header found, full candidate without footer: drop the candidate's first
//!   byte and rescan. A later valid frame overlapping the candidate is never
//!   lost.

use crate::frame::{FOOTER, FRAME_LEN, HEADER};
use tracing::trace;

/// Accumulates raw bytes and extracts aligned frames.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buf: Vec<u8>,
    /// Bytes thrown away while hunting for alignment
    discarded: u64,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes from the stream.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Next aligned frame, if one is complete. Call repeatedly after each
    /// [`push`](Self::push) until it returns `None`.
    pub fn next_frame(&mut self) -> Option<[u8; FRAME_LEN]> {
        loop {
            let Some(idx) = find_header(&self.buf) else {
                let keep = HEADER.len() - 1;
                if self.buf.len() > keep {
                    self.discard(self.buf.len() - keep);
                }
                return None;
            };

            if self.buf.len() < idx + FRAME_LEN {
                self.discard(idx);
                return None;
            }

            let candidate = &self.buf[idx..idx + FRAME_LEN];
            if candidate.ends_with(&FOOTER) {
                let mut frame = [0u8; FRAME_LEN];
                frame.copy_from_slice(candidate);
                self.discard(idx);
                self.buf.drain(..FRAME_LEN);
                return Some(frame);
            }

            trace!(offset = idx, "frame footer mismatch, resyncing");
            self.discard(idx + 1);
        }
    }

    /// Bytes currently buffered.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Total bytes dropped during resynchronization.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    fn discard(&mut self, n: usize) {
        if n > 0 {
            self.buf.drain(..n);
            self.discarded += n as u64;
        }
    }
}

fn find_header(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER.len()).position(|w| w == HEADER)
}
