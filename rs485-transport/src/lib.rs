//! Line drivers for rs485
//!
//! Provides serial, TCP gateway and in-memory access to the shared bus.

pub mod error;
pub mod memory;
pub mod serial;
pub mod tcp;

pub use error::{Error, Result};
pub use memory::{MemoryDriver, MemoryPeer};
pub use serial::{DirectionControl, SerialDriver};
pub use tcp::TcpDriver;

use bytes::BytesMut;
use rs485_core::Line;

/// Byte-level access to the bus
///
/// Drivers never block: `read_available` returns whatever is buffered and is
/// called again on the next tick.
pub trait Driver: Line + Send {
    /// Append buffered bytes to `buf`, returning how many were read
    fn read_available(&mut self, buf: &mut BytesMut) -> Result<usize>;

    /// Port or peer the driver talks to
    fn name(&self) -> String;
}

impl<D: Driver + ?Sized> Driver for Box<D> {
    fn read_available(&mut self, buf: &mut BytesMut) -> Result<usize> {
        (**self).read_available(buf)
    }

    fn name(&self) -> String {
        (**self).name()
    }
}
