//! In-memory line for tests and simulations
//!
//! A [`MemoryDriver`] and its [`MemoryPeer`] share one buffer pair. The peer
//! plays the devices on the bus: it injects traffic, inspects what the bus
//! transmitted and can answer frames automatically.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use bytes::BytesMut;
use parking_lot::Mutex;
use rs485_core::{Direction, Line};

use crate::{Driver, error::Result};

type Responder = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>> + Send>;

#[derive(Default)]
struct Shared {
    rx: VecDeque<u8>,
    transmitted: Vec<Vec<u8>>,
    directions: Vec<Direction>,
    responder: Option<Responder>,
    fail_transmit: bool,
}

/// Driver side of the in-memory line
#[derive(Clone, Default)]
pub struct MemoryDriver {
    shared: Arc<Mutex<Shared>>,
}

/// Device side of the in-memory line
#[derive(Clone)]
pub struct MemoryPeer {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for the devices' end of the line
    pub fn peer(&self) -> MemoryPeer {
        MemoryPeer {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl MemoryPeer {
    /// Put bytes on the line for the bus to read
    pub fn inject(&self, data: &[u8]) {
        self.shared.lock().rx.extend(data.iter().copied());
    }

    /// Frames transmitted so far
    pub fn transmitted(&self) -> Vec<Vec<u8>> {
        self.shared.lock().transmitted.clone()
    }

    /// Drain the transmitted frames
    pub fn take_transmitted(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.shared.lock().transmitted)
    }

    /// Direction changes requested by the bus, in order
    pub fn directions(&self) -> Vec<Direction> {
        self.shared.lock().directions.clone()
    }

    /// Answer every transmitted frame for which `f` returns a reply
    pub fn respond_with(&self, f: impl FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static) {
        self.shared.lock().responder = Some(Box::new(f));
    }

    /// Make transmissions fail until reset
    pub fn set_fail_transmit(&self, fail: bool) {
        self.shared.lock().fail_transmit = fail;
    }
}

impl Line for MemoryDriver {
    fn transmit(&mut self, frame: &[u8]) -> io::Result<()> {
        let mut shared = self.shared.lock();
        if shared.fail_transmit {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "memory line down"));
        }

        shared.transmitted.push(frame.to_vec());

        let reply = shared.responder.as_mut().and_then(|respond| respond(frame));
        if let Some(reply) = reply {
            shared.rx.extend(reply);
        }
        Ok(())
    }

    fn set_direction(&mut self, direction: Direction) -> io::Result<()> {
        self.shared.lock().directions.push(direction);
        Ok(())
    }
}

impl Driver for MemoryDriver {
    fn read_available(&mut self, buf: &mut BytesMut) -> Result<usize> {
        let mut shared = self.shared.lock();
        let n = shared.rx.len();
        buf.extend(shared.rx.drain(..));
        Ok(n)
    }

    fn name(&self) -> String {
        "memory".to_string()
    }
}

impl std::fmt::Debug for MemoryDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.shared.lock();
        f.debug_struct("MemoryDriver")
            .field("pending_rx", &shared.rx.len())
            .field("transmitted", &shared.transmitted.len())
            .finish()
    }
}

impl std::fmt::Debug for MemoryPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPeer").finish_non_exhaustive()
    }
}
