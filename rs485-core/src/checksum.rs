//! Frame checksums
//!
//! A frame carries up to two checksum bytes after the payload:
//!
//! ```text
//! ck1 = primary(prefix ++ payload)
//! ck2 = secondary(prefix ++ payload, ck1)
//! ```
//!
//! Built-in defaults are XOR-8 for the primary and ADD-8 (including `ck1`) for
//! the secondary. Either slot can hold a user function instead.

use std::fmt;
use std::sync::Arc;

use tracing::trace;

/// User function for the primary checksum
pub type ChecksumFn = Arc<dyn Fn(&[u8]) -> u8 + Send + Sync>;

/// User function for the secondary checksum, chained on the primary
pub type Checksum2Fn = Arc<dyn Fn(&[u8], u8) -> u8 + Send + Sync>;

/// Primary checksum slot
#[derive(Clone, Default)]
pub enum Checksum {
    /// No checksum byte
    #[default]
    None,
    /// XOR of all bytes
    Xor,
    /// 8-bit wrapping sum of all bytes
    Add,
    /// User function
    Custom(ChecksumFn),
}

/// Secondary checksum slot
#[derive(Clone, Default)]
pub enum Checksum2 {
    /// No second byte
    #[default]
    None,
    /// XOR of all bytes and the primary checksum
    Xor,
    /// 8-bit wrapping sum of all bytes and the primary checksum
    Add,
    /// User function
    Custom(Checksum2Fn),
}

impl Checksum {
    /// Wrap a user function
    pub fn custom(f: impl Fn(&[u8]) -> u8 + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::None)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Xor => "xor",
            Self::Add => "add",
            Self::Custom(_) => "custom",
        }
    }
}

impl Checksum2 {
    /// Wrap a user function
    pub fn custom(f: impl Fn(&[u8], u8) -> u8 + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::None)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Xor => "xor",
            Self::Add => "add",
            Self::Custom(_) => "custom",
        }
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Debug for Checksum2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// XOR of all bytes
pub fn xor8(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc ^ b)
}

/// Wrapping 8-bit sum of all bytes
pub fn add8(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Checksum calculator for one bus
#[derive(Debug, Clone, Default)]
pub struct ChecksumEngine {
    primary: Checksum,
    secondary: Checksum2,
}

impl ChecksumEngine {
    pub fn new(primary: Checksum, secondary: Checksum2) -> Self {
        Self { primary, secondary }
    }

    pub fn primary(&self) -> &Checksum {
        &self.primary
    }

    pub fn secondary(&self) -> &Checksum2 {
        &self.secondary
    }

    /// Number of checksum bytes appended to each frame
    pub fn len(&self) -> usize {
        usize::from(self.primary.is_enabled()) + usize::from(self.secondary.is_enabled())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Primary checksum over `data`, `None` when disabled
    pub fn compute(&self, data: &[u8]) -> Option<u8> {
        let checksum = match &self.primary {
            Checksum::None => return None,
            Checksum::Xor => xor8(data),
            Checksum::Add => add8(data),
            Checksum::Custom(f) => f(data),
        };

        trace!(
            len = data.len(),
            checksum = format!("0x{:02X}", checksum),
            "Calculated checksum"
        );

        Some(checksum)
    }

    /// Secondary checksum over `data` chained on `checksum1`, `None` when disabled
    pub fn compute2(&self, data: &[u8], checksum1: u8) -> Option<u8> {
        let checksum = match &self.secondary {
            Checksum2::None => return None,
            Checksum2::Xor => xor8(data) ^ checksum1,
            Checksum2::Add => add8(data).wrapping_add(checksum1),
            Checksum2::Custom(f) => f(data, checksum1),
        };

        trace!(
            len = data.len(),
            checksum1 = format!("0x{:02X}", checksum1),
            checksum2 = format!("0x{:02X}", checksum),
            "Calculated checksum2"
        );

        Some(checksum)
    }

    /// Both checksum bytes in frame order
    pub fn trailer(&self, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(2);
        let checksum1 = self.compute(data);
        if let Some(c) = checksum1 {
            out.push(c);
        }
        if let Some(c) = self.compute2(data, checksum1.unwrap_or(0)) {
            out.push(c);
        }
        out
    }

    /// Verify received checksum bytes against `data`
    pub fn verify(&self, data: &[u8], received: &[u8]) -> bool {
        self.trailer(data) == received
    }
}
