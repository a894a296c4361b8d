//! Transmit side of the physical line

use std::io;

/// Transceiver direction on a half-duplex line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Receive,
    Transmit,
}

impl Direction {
    /// Logic level of an active-high direction pin
    pub fn level(self) -> bool {
        matches!(self, Self::Transmit)
    }
}

/// What the sequencer needs from a driver to put a frame on the wire
pub trait Line {
    /// Write a complete frame
    fn transmit(&mut self, frame: &[u8]) -> io::Result<()>;

    /// Switch the transceiver direction (no-op on lines without direction control)
    fn set_direction(&mut self, _direction: Direction) -> io::Result<()> {
        Ok(())
    }
}

impl<L: Line + ?Sized> Line for Box<L> {
    fn transmit(&mut self, frame: &[u8]) -> io::Result<()> {
        (**self).transmit(frame)
    }

    fn set_direction(&mut self, direction: Direction) -> io::Result<()> {
        (**self).set_direction(direction)
    }
}
