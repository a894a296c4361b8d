//! Cuts the received byte stream into frames
//!
//! A frame ends when:
//! - the line has been idle for the frame gap,
//! - the configured suffix arrives after at least one byte past the prefix
//!   and, with checksums configured, the bytes before it verify,
//! - the buffer reaches its maximum length.
//!
//! With a prefix configured, bytes that cannot begin the prefix are dropped.

use std::time::{Duration, Instant};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::checksum::ChecksumEngine;
use crate::constants::{FRAME_GAP_CHARS, MAX_FRAME_LEN, MIN_FRAME_GAP_MS};

/// Idle gap for a line running at `baud_rate` with `bits_per_char` bits on the wire
pub fn frame_gap(baud_rate: u32, bits_per_char: u32) -> Duration {
    let char_time = f64::from(bits_per_char) / f64::from(baud_rate.max(1));
    let gap = Duration::from_secs_f64(char_time * FRAME_GAP_CHARS);
    gap.max(Duration::from_millis(MIN_FRAME_GAP_MS))
}

/// Receive-side frame splitter
#[derive(Debug)]
pub struct FrameAssembler {
    prefix: Bytes,
    suffix: Bytes,
    checksum: ChecksumEngine,
    gap: Duration,
    max_len: usize,
    buf: BytesMut,
    last_byte_at: Option<Instant>,
    discarded: u64,
}

impl FrameAssembler {
    pub fn new(gap: Duration) -> Self {
        Self {
            prefix: Bytes::new(),
            suffix: Bytes::new(),
            checksum: ChecksumEngine::default(),
            gap,
            max_len: MAX_FRAME_LEN,
            buf: BytesMut::with_capacity(MAX_FRAME_LEN),
            last_byte_at: None,
            discarded: 0,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<Bytes>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_suffix(mut self, suffix: impl Into<Bytes>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// Checksums a suffix-terminated frame must carry to close early
    pub fn with_checksum(mut self, checksum: ChecksumEngine) -> Self {
        self.checksum = checksum;
        self
    }

    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len.max(1);
        self
    }

    pub fn gap(&self) -> Duration {
        self.gap
    }

    /// Bytes waiting for the end of their frame
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Noise bytes dropped since the last call
    pub fn take_discarded(&mut self) -> u64 {
        std::mem::take(&mut self.discarded)
    }

    /// Feed bytes read at `now`, returning every frame they complete
    pub fn push(&mut self, data: &[u8], now: Instant) -> Vec<Bytes> {
        let mut frames = Vec::new();

        // Bytes after a gap start a new frame
        if let Some(frame) = self.flush_idle(now) {
            frames.push(frame);
        }

        for &byte in data {
            self.buf.put_u8(byte);

            if self.buf.len() <= self.prefix.len() {
                self.resync();
                continue;
            }

            if self.suffix_complete() || self.buf.len() >= self.max_len {
                frames.push(self.buf.split().freeze());
            }
        }

        if !data.is_empty() {
            self.last_byte_at = Some(now);
        }

        frames
    }

    /// Close the pending frame if the line has been idle long enough
    pub fn flush_idle(&mut self, now: Instant) -> Option<Bytes> {
        if self.buf.is_empty() {
            return None;
        }
        let last = self.last_byte_at?;
        if now.saturating_duration_since(last) < self.gap {
            return None;
        }

        if self.buf.len() <= self.prefix.len() {
            // A lone prefix carries nothing
            self.discarded += self.buf.len() as u64;
            self.buf.clear();
            return None;
        }

        let frame = self.buf.split().freeze();
        trace!(len = frame.len(), "Frame closed by idle gap");
        Some(frame)
    }

    fn resync(&mut self) {
        while !self.prefix.starts_with(&self.buf) {
            self.buf.advance(1);
            self.discarded += 1;
        }
    }

    // A suffix value inside the payload or checksum must not cut the frame
    fn suffix_complete(&self) -> bool {
        let overhead = self.prefix.len() + self.checksum.len() + self.suffix.len();
        if self.suffix.is_empty() || self.buf.len() <= overhead || !self.buf.ends_with(&self.suffix) {
            return false;
        }
        if self.checksum.is_empty() {
            return true;
        }

        let body_end = self.buf.len() - self.suffix.len();
        let checksum_start = body_end - self.checksum.len();
        self.checksum
            .verify(&self.buf[..checksum_start], &self.buf[checksum_start..body_end])
    }
}
