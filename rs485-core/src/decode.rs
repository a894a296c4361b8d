//! Numeric state fields
//!
//! A field is `length` bytes at `offset`, read as an unsigned integer and
//! scaled down by `10^precision`. Frames too short for the field yield
//! `ShortFrame`; callers keep the previous value.

use std::fmt;
use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::{
    constants::{MAX_STATE_OFFSET, limits},
    error::{Error, Result},
};

/// Byte order of a numeric field
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    #[default]
    Big,
    Little,
}

/// Fixed-layout numeric field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumericSpec {
    pub offset: usize,
    pub length: usize,
    pub precision: u8,
    pub endian: Endian,
}

impl NumericSpec {
    /// Create a big-endian field
    ///
    /// # Errors
    ///
    /// Fails if `length` is outside 1..=4, `precision` outside 0..=5 or
    /// `offset` above 128.
    pub fn new(offset: usize, length: usize, precision: u8) -> Result<Self> {
        let spec = Self {
            offset,
            length,
            precision,
            endian: Endian::Big,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Read the field as little-endian instead
    pub fn little_endian(mut self) -> Self {
        self.endian = Endian::Little;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let (min_len, max_len) = limits::NUMERIC_LENGTH;
        if self.length < min_len || self.length > max_len {
            return Err(Error::InvalidNumericSpec(format!(
                "length {} not in {}..={}",
                self.length, min_len, max_len
            )));
        }
        let (min_p, max_p) = limits::NUMERIC_PRECISION;
        if self.precision > max_p {
            return Err(Error::InvalidNumericSpec(format!(
                "precision {} not in {}..={}",
                self.precision, min_p, max_p
            )));
        }
        if self.offset > MAX_STATE_OFFSET {
            return Err(Error::InvalidNumericSpec(format!(
                "offset {} exceeds {}",
                self.offset, MAX_STATE_OFFSET
            )));
        }
        Ok(())
    }

    /// Decode the field from a frame
    ///
    /// # Examples
    ///
    /// ```
    /// use rs485_core::NumericSpec;
    ///
    /// let spec = NumericSpec::new(2, 2, 1).unwrap();
    /// let value = spec.decode(&[0xF7, 0x01, 0x1F, 0x40]).unwrap();
    /// assert_eq!(value, 800.0);
    /// ```
    pub fn decode(&self, frame: &[u8]) -> Result<f64> {
        let end = self.offset + self.length;
        if frame.len() < end {
            return Err(Error::ShortFrame {
                required: end,
                actual: frame.len(),
            });
        }

        let raw = &frame[self.offset..end];
        let value = match self.endian {
            Endian::Big => BigEndian::read_uint(raw, self.length),
            Endian::Little => LittleEndian::read_uint(raw, self.length),
        };

        Ok(value as f64 / 10f64.powi(i32::from(self.precision)))
    }
}

/// User function decoding a value from a whole frame
pub type DecodeFn = Arc<dyn Fn(&[u8]) -> Option<f64> + Send + Sync>;

/// How a device turns a frame into a number
#[derive(Clone)]
pub enum NumericDecoder {
    Static(NumericSpec),
    Dynamic(DecodeFn),
}

impl NumericDecoder {
    /// Wrap a user decode function
    pub fn dynamic(f: impl Fn(&[u8]) -> Option<f64> + Send + Sync + 'static) -> Self {
        Self::Dynamic(Arc::new(f))
    }

    /// Decode, returning `None` when the frame carries no usable value
    pub fn decode(&self, frame: &[u8]) -> Option<f64> {
        match self {
            Self::Static(spec) => spec.decode(frame).ok(),
            Self::Dynamic(f) => f(frame),
        }
    }
}

impl From<NumericSpec> for NumericDecoder {
    fn from(spec: NumericSpec) -> Self {
        Self::Static(spec)
    }
}

impl fmt::Debug for NumericDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(spec) => f.debug_tuple("Static").field(spec).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(<fn>)"),
        }
    }
}
