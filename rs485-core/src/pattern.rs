//! Byte-pattern matching against received frames
//!
//! One matcher serves state detection, ack detection, monitor filters and the
//! state-response slot. A pattern never matches a buffer that ends before the
//! pattern does, whatever its `inverted` flag says.

use bytes::Bytes;
use std::fmt;

use crate::{
    constants::{MAX_FRAME_LEN, MAX_STATE_OFFSET},
    error::{Error, Result},
};

/// Expected bytes at a fixed offset of a frame
///
/// # Matching
///
/// ```text
/// for i in 0..data.len():
///     mask = and_operator ? data[i] : 0xFF
///     ok  &= (frame[offset + i] & mask) == data[i]
/// result = ok XOR inverted
/// ```
///
/// With `and_operator` the pattern bytes act as a bitmask: every bit set in the
/// pattern must also be set in the frame.
///
/// # Examples
///
/// ```
/// use rs485_core::BytePattern;
///
/// let pattern = BytePattern::new(1, vec![0x10]);
/// assert!(pattern.matches(&[0x02, 0x10, 0xFF]));
/// assert!(!pattern.matches(&[0x02, 0x11]));
/// assert!(!pattern.matches(&[0x02])); // too short
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BytePattern {
    /// Position of the first pattern byte in the frame
    pub offset: usize,

    /// Expected bytes
    pub data: Bytes,

    /// Treat pattern bytes as a bitmask
    pub and_operator: bool,

    /// Negate the result (short frames still never match)
    pub inverted: bool,
}

impl BytePattern {
    /// Create an exact-match pattern at `offset`
    pub fn new(offset: usize, data: impl Into<Bytes>) -> Self {
        Self {
            offset,
            data: data.into(),
            and_operator: false,
            inverted: false,
        }
    }

    /// Create an exact-match pattern at offset 0
    pub fn exact(data: impl Into<Bytes>) -> Self {
        Self::new(0, data)
    }

    /// Set bitmask matching
    pub fn with_and_operator(mut self, and_operator: bool) -> Self {
        self.and_operator = and_operator;
        self
    }

    /// Set result inversion
    pub fn with_inverted(mut self, inverted: bool) -> Self {
        self.inverted = inverted;
        self
    }

    /// Number of frame bytes the pattern needs
    pub fn span(&self) -> usize {
        self.offset + self.data.len()
    }

    /// Check the pattern fits the frame limits
    pub fn validate(&self) -> Result<()> {
        if self.data.is_empty() {
            return Err(Error::InvalidPattern("pattern data is empty".into()));
        }
        if self.offset > MAX_STATE_OFFSET {
            return Err(Error::InvalidPattern(format!(
                "offset {} exceeds {}",
                self.offset, MAX_STATE_OFFSET
            )));
        }
        if self.span() > MAX_FRAME_LEN {
            return Err(Error::InvalidPattern(format!(
                "span {} exceeds frame limit {}",
                self.span(),
                MAX_FRAME_LEN
            )));
        }
        Ok(())
    }

    /// Fail with `ShortFrame` if `buf` ends before the pattern does
    pub fn check_span(&self, buf: &[u8]) -> Result<()> {
        if buf.len() < self.span() {
            return Err(Error::ShortFrame {
                required: self.span(),
                actual: buf.len(),
            });
        }
        Ok(())
    }

    /// Test the pattern against a received buffer
    pub fn matches(&self, buf: &[u8]) -> bool {
        if self.check_span(buf).is_err() {
            return false;
        }

        let window = &buf[self.offset..self.span()];
        let hit = window.iter().zip(self.data.iter()).all(|(&rx, &expected)| {
            let mask = if self.and_operator { expected } else { 0xFF };
            rx & mask == expected
        });

        hit ^ self.inverted
    }
}

impl fmt::Debug for BytePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BytePattern")
            .field("offset", &self.offset)
            .field("data", &hex::encode_upper(&self.data))
            .field("and_operator", &self.and_operator)
            .field("inverted", &self.inverted)
            .finish()
    }
}

impl fmt::Display for BytePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", hex::encode_upper(&self.data), self.offset)?;
        if self.and_operator {
            write!(f, " and")?;
        }
        if self.inverted {
            write!(f, " inverted")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_exact_match() {
        let pattern = BytePattern::new(2, vec![0xAA, 0xBB]);

        assert!(pattern.matches(&[0x00, 0x00, 0xAA, 0xBB]));
        assert!(pattern.matches(&[0x00, 0x00, 0xAA, 0xBB, 0xCC]));
        assert!(!pattern.matches(&[0x00, 0x00, 0xAA, 0xBC]));
        assert!(!pattern.matches(&[0xAA, 0xBB, 0x00, 0x00]));
    }

    #[test]
    fn test_and_operator() {
        // Bit 0x01 must be set, other bits are ignored
        let pattern = BytePattern::new(0, vec![0x01]).with_and_operator(true);

        assert!(pattern.matches(&[0x01]));
        assert!(pattern.matches(&[0x81]));
        assert!(pattern.matches(&[0xFF]));
        assert!(!pattern.matches(&[0x80]));
        assert!(!pattern.matches(&[0x00]));
    }

    #[test]
    fn test_inverted() {
        let pattern = BytePattern::exact(vec![0x01]).with_inverted(true);

        assert!(!pattern.matches(&[0x01]));
        assert!(pattern.matches(&[0x02]));
    }

    #[test]
    fn test_short_frame_never_matches() {
        let pattern = BytePattern::new(3, vec![0x01]);
        assert!(!pattern.matches(&[0x01, 0x01, 0x01]));
        assert!(!pattern.clone().with_inverted(true).matches(&[0x01, 0x01, 0x01]));
        assert!(!pattern.matches(&[]));

        assert!(matches!(
            pattern.check_span(&[0x00]),
            Err(Error::ShortFrame { required: 4, actual: 1 })
        ));
    }

    #[test]
    fn test_validate() {
        assert!(BytePattern::new(128, vec![0x01]).validate().is_ok());
        assert!(BytePattern::new(129, vec![0x01]).validate().is_err());
        assert!(BytePattern::new(0, Vec::new()).validate().is_err());
        assert!(BytePattern::new(128, vec![0u8; 200]).validate().is_err());
    }

    #[test]
    fn test_display() {
        let pattern = BytePattern::new(1, vec![0x0A, 0xFF]).with_inverted(true);
        assert_eq!(pattern.to_string(), "0AFF@1 inverted");
    }

    proptest! {
        #[test]
        fn prop_reflexive(
            buf in proptest::collection::vec(any::<u8>(), 1..64),
            start in 0usize..64,
            len in 1usize..8,
        ) {
            let start = start % buf.len();
            let end = (start + len).min(buf.len());
            let pattern = BytePattern::new(start, buf[start..end].to_vec());
            prop_assert!(pattern.matches(&buf));
        }

        #[test]
        fn prop_inversion_law(
            buf in proptest::collection::vec(any::<u8>(), 0..32),
            offset in 0usize..16,
            data in proptest::collection::vec(any::<u8>(), 1..4),
            and_operator in any::<bool>(),
        ) {
            let plain = BytePattern::new(offset, data).with_and_operator(and_operator);
            let inverted = plain.clone().with_inverted(true);
            if buf.len() >= plain.span() {
                prop_assert_eq!(inverted.matches(&buf), !plain.matches(&buf));
            } else {
                prop_assert!(!plain.matches(&buf));
                prop_assert!(!inverted.matches(&buf));
            }
        }
    }
}
