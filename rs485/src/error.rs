//! High-level error types

use rs485_core::WriteId;

use crate::device::DeviceId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Core protocol error: {0}")]
    Core(#[from] rs485_core::Error),

    #[error("Driver error: {0}")]
    Transport(#[from] rs485_transport::Error),

    #[error("Type error: {0}")]
    Types(#[from] rs485_types::Error),

    #[error("Unknown device: {0}")]
    UnknownDevice(DeviceId),

    #[error("Device '{device}' has no '{command}' command")]
    UnsupportedCommand { device: String, command: String },

    #[error("Write {0} was cancelled")]
    Cancelled(WriteId),

    #[error("Bus is not running")]
    BusStopped,
}

impl Error {
    /// Check if error comes from configuration rather than traffic
    pub fn is_config_error(&self) -> bool {
        match self {
            Self::Core(e) => e.is_config_error(),
            Self::Types(_) => true,
            _ => false,
        }
    }

    /// Retries ran out for a write
    pub fn is_write_failure(&self) -> bool {
        matches!(self, Self::Core(rs485_core::Error::RetriesExhausted { .. }))
    }
}
