//! Error types for rs485-core

/// Result type alias for rs485 core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core protocol errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Buffer does not reach the end of a pattern or field
    #[error("Frame too short: need {required} bytes, got {actual} bytes")]
    ShortFrame {
        required: usize,
        actual: usize,
    },

    /// Pattern does not fit the frame limits
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    /// Numeric field outside the supported length/precision
    #[error("Invalid numeric field: {0}")]
    InvalidNumericSpec(String),

    /// Configuration value outside its accepted range
    #[error("{field} out of range: {value} (allowed {min}..={max})")]
    OutOfRange {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    /// Two configuration keys that cannot be combined
    #[error("Configuration conflict: {0}")]
    ConfigurationConflict(String),

    /// Write gave up after every attempt timed out
    #[error("Write {id} failed: no ack after {attempts} attempts")]
    RetriesExhausted {
        id: u64,
        attempts: u32,
    },
}

impl Error {
    /// Check if the bus can carry on after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ShortFrame { .. } | Self::RetriesExhausted { .. }
        )
    }

    /// Check if error comes from configuration rather than traffic
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidPattern(_)
                | Self::InvalidNumericSpec(_)
                | Self::OutOfRange { .. }
                | Self::ConfigurationConflict(_)
        )
    }
}

/// Check `value` against an inclusive range, naming the field on failure
pub fn check_range(field: &'static str, value: u64, (min, max): (u64, u64)) -> Result<()> {
    if value < min || value > max {
        return Err(Error::OutOfRange { field, value, min, max });
    }
    Ok(())
}
