//! Outgoing frame layout
//!
//! ```text
//! ┌──────────┬───────────┬──────────┬──────────┬──────────┐
//! │  Prefix  │  Payload  │   ck1    │   ck2    │  Suffix  │
//! │ 0..N B   │  N bytes  │ 0/1 byte │ 0/1 byte │  0..N B  │
//! └──────────┴───────────┴──────────┴──────────┴──────────┘
//! ```
//!
//! Received frames are not unframed: devices match raw offsets. `verify` is
//! only used when rx checksum checking is switched on.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

use crate::checksum::ChecksumEngine;

/// Builds frames for one bus
#[derive(Clone, Default)]
pub struct FrameBuilder {
    prefix: Bytes,
    suffix: Bytes,
    checksum: ChecksumEngine,
}

impl FrameBuilder {
    /// Create a builder with no prefix, suffix or checksum
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(mut self, prefix: impl Into<Bytes>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_suffix(mut self, suffix: impl Into<Bytes>) -> Self {
        self.suffix = suffix.into();
        self
    }

    pub fn with_checksum(mut self, checksum: ChecksumEngine) -> Self {
        self.checksum = checksum;
        self
    }

    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    pub fn suffix(&self) -> &[u8] {
        &self.suffix
    }

    pub fn checksum(&self) -> &ChecksumEngine {
        &self.checksum
    }

    /// Bytes a frame adds around its payload
    pub fn overhead(&self) -> usize {
        self.prefix.len() + self.checksum.len() + self.suffix.len()
    }

    /// Assemble `prefix ++ payload ++ checksums ++ suffix`
    ///
    /// # Examples
    ///
    /// ```
    /// use rs485_core::{FrameBuilder, ChecksumEngine, Checksum, Checksum2};
    ///
    /// let builder = FrameBuilder::new()
    ///     .with_prefix(vec![0xF7])
    ///     .with_suffix(vec![0xEE])
    ///     .with_checksum(ChecksumEngine::new(Checksum::Xor, Checksum2::None));
    ///
    /// let frame = builder.build(&[0x0E, 0x11]);
    /// assert_eq!(frame.as_ref(), &[0xF7, 0x0E, 0x11, 0xF7 ^ 0x0E ^ 0x11, 0xEE]);
    /// ```
    pub fn build(&self, payload: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(payload.len() + self.overhead());

        buf.put_slice(&self.prefix);
        buf.put_slice(payload);

        // Checksums cover everything written so far
        let trailer = self.checksum.trailer(&buf);
        buf.put_slice(&trailer);

        buf.put_slice(&self.suffix);

        buf.freeze()
    }

    /// Check prefix, suffix and checksum bytes of a received frame
    pub fn verify(&self, frame: &[u8]) -> bool {
        if frame.len() < self.overhead() {
            return false;
        }
        if !frame.starts_with(&self.prefix) || !frame.ends_with(&self.suffix) {
            return false;
        }

        let body_end = frame.len() - self.suffix.len();
        let checksum_start = body_end - self.checksum.len();

        self.checksum
            .verify(&frame[..checksum_start], &frame[checksum_start..body_end])
    }

    /// Payload of a well-formed frame
    pub fn payload<'a>(&self, frame: &'a [u8]) -> Option<&'a [u8]> {
        if !self.verify(frame) {
            return None;
        }
        let end = frame.len() - self.suffix.len() - self.checksum.len();
        Some(&frame[self.prefix.len()..end])
    }
}

impl fmt::Debug for FrameBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuilder")
            .field("prefix", &hex::encode_upper(&self.prefix))
            .field("suffix", &hex::encode_upper(&self.suffix))
            .field("checksum", &self.checksum.primary())
            .field("checksum2", &self.checksum.secondary())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::{Checksum, Checksum2, add8, xor8};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn wallpad_builder() -> FrameBuilder {
        FrameBuilder::new()
            .with_prefix(vec![0xF7])
            .with_suffix(vec![0xEE])
            .with_checksum(ChecksumEngine::new(Checksum::Xor, Checksum2::Add))
    }

    #[test]
    fn test_build_bare() {
        let frame = FrameBuilder::new().build(&[0x01, 0x02]);
        assert_eq!(frame.as_ref(), &[0x01, 0x02]);
    }

    #[test]
    fn test_build_full_layout() {
        let builder = wallpad_builder();
        let frame = builder.build(&[0x0E, 0x11, 0x41]);

        let head = [0xF7, 0x0E, 0x11, 0x41];
        let ck1 = xor8(&head);
        let ck2 = add8(&head).wrapping_add(ck1);

        assert_eq!(frame.as_ref(), &[0xF7, 0x0E, 0x11, 0x41, ck1, ck2, 0xEE]);
        assert_eq!(frame.len(), 3 + builder.overhead());
    }

    #[test]
    fn test_verify_detects_corruption() {
        let builder = wallpad_builder();
        let mut frame = builder.build(&[0x0E, 0x11, 0x41]).to_vec();
        assert!(builder.verify(&frame));

        frame[2] ^= 0x01;
        assert!(!builder.verify(&frame));
    }

    #[test]
    fn test_verify_rejects_bad_framing() {
        let builder = wallpad_builder();
        assert!(!builder.verify(&[]));
        assert!(!builder.verify(&[0xF7, 0xEE]));
        assert!(!builder.verify(&[0xF6, 0x00, 0xF6, 0xEC, 0xEE]));
    }

    #[test]
    fn test_payload() {
        let builder = wallpad_builder();
        let frame = builder.build(&[0x0E, 0x11]);
        assert_eq!(builder.payload(&frame), Some(&[0x0E, 0x11][..]));
    }

    proptest! {
        #[test]
        fn prop_round_trip(payload in proptest::collection::vec(any::<u8>(), 0..200)) {
            let builder = wallpad_builder();
            let frame = builder.build(&payload);

            let head_len = 1 + payload.len();
            let engine = builder.checksum();
            let ck1 = engine.compute(&frame[..head_len]);
            let ck2 = engine.compute2(&frame[..head_len], ck1.unwrap_or(0));

            prop_assert_eq!(Some(frame[head_len]), ck1);
            prop_assert_eq!(Some(frame[head_len + 1]), ck2);
            prop_assert!(builder.verify(&frame));
            prop_assert_eq!(builder.payload(&frame), Some(payload.as_slice()));
        }
    }
}
