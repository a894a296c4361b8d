//! Serial line settings

use std::fmt;

use crate::error::{Error, Result};

/// Accepted baud rates
pub const BAUD_RATE_RANGE: (u32, u32) = (1, 115_200);

/// Accepted data bit counts
pub const DATA_BITS_RANGE: (u8, u8) = (1, 32);

/// Parity, with the numeric codes used in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Parity {
    #[default]
    None = 0,
    Even = 2,
    Odd = 3,
}

impl TryFrom<u8> for Parity {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Self::None),
            2 => Ok(Self::Even),
            3 => Ok(Self::Odd),
            other => Err(Error::Parse(format!("unknown parity code {}", other))),
        }
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            Self::None => 'N',
            Self::Even => 'E',
            Self::Odd => 'O',
        };
        write!(f, "{}", letter)
    }
}

/// Stop bits; configuration code `1` is one stop bit, `0` is two
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopBits {
    #[default]
    One,
    Two,
}

impl StopBits {
    pub fn count(self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
        }
    }
}

impl TryFrom<u8> for StopBits {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            1 => Ok(Self::One),
            0 => Ok(Self::Two),
            other => Err(Error::Parse(format!("unknown stop bits code {}", other))),
        }
    }
}

/// Line settings of the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialSettings {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

impl SerialSettings {
    /// 8N1 at `baud_rate`
    pub fn new(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }

    pub fn with_data_bits(mut self, data_bits: u8) -> Self {
        self.data_bits = data_bits;
        self
    }

    pub fn with_parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    pub fn with_stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.stop_bits = stop_bits;
        self
    }

    /// Bits one character occupies on the wire (start + data + parity + stop)
    pub fn bits_per_char(&self) -> u32 {
        let parity = u32::from(self.parity != Parity::None);
        1 + u32::from(self.data_bits) + parity + u32::from(self.stop_bits.count())
    }

    pub fn validate(&self) -> Result<()> {
        let (min, max) = BAUD_RATE_RANGE;
        if self.baud_rate < min || self.baud_rate > max {
            return Err(Error::Validation(format!(
                "baud_rate {} outside {}..={}",
                self.baud_rate, min, max
            )));
        }

        let (min, max) = DATA_BITS_RANGE;
        if self.data_bits < min || self.data_bits > max {
            return Err(Error::Validation(format!(
                "data_bits {} outside {}..={}",
                self.data_bits, min, max
            )));
        }

        Ok(())
    }
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self::new(9600)
    }
}

impl fmt::Display for SerialSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}{}{}",
            self.baud_rate,
            self.data_bits,
            self.parity,
            self.stop_bits.count()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parity_codes() {
        assert_eq!(Parity::try_from(0).unwrap(), Parity::None);
        assert_eq!(Parity::try_from(2).unwrap(), Parity::Even);
        assert_eq!(Parity::try_from(3).unwrap(), Parity::Odd);
        assert!(Parity::try_from(1).is_err());
        assert_eq!(Parity::Odd as u8, 3);
    }

    #[test]
    fn test_stop_bits_codes() {
        assert_eq!(StopBits::try_from(1).unwrap(), StopBits::One);
        assert_eq!(StopBits::try_from(0).unwrap(), StopBits::Two);
        assert!(StopBits::try_from(2).is_err());
    }

    #[test]
    fn test_display_and_bits() {
        let settings = SerialSettings::new(9600).with_parity(Parity::Even);
        assert_eq!(settings.to_string(), "9600 8E1");
        assert_eq!(settings.bits_per_char(), 11);
        assert_eq!(SerialSettings::default().bits_per_char(), 10);
    }

    #[test]
    fn test_validate_ranges() {
        assert!(SerialSettings::new(115_200).validate().is_ok());
        assert!(SerialSettings::new(0).validate().is_err());
        assert!(SerialSettings::new(230_400).validate().is_err());
        assert!(SerialSettings::new(9600).with_data_bits(0).validate().is_err());
        assert!(SerialSettings::new(9600).with_data_bits(32).validate().is_ok());
    }
}
