//! Type definitions for rs485

pub mod error;
pub mod record;
pub mod serial;
pub mod state;

pub use error::{Error, Result};
pub use record::PacketRecord;
pub use serial::{Parity, SerialSettings, StopBits};
pub use state::StateValue;
