//! Packet monitor records

use std::fmt;

use chrono::{DateTime, Utc};

/// A received frame captured by the packet monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketRecord {
    /// Time the frame was closed
    pub timestamp: DateTime<Utc>,

    /// Raw frame bytes
    pub data: Vec<u8>,

    /// Indices of the filters that matched (empty when recording everything)
    pub filters: Vec<usize>,
}

impl PacketRecord {
    pub fn new(data: impl Into<Vec<u8>>, filters: Vec<usize>) -> Self {
        Self {
            timestamp: Utc::now(),
            data: data.into(),
            filters,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn hex(&self) -> String {
        hex::encode_upper(&self.data)
    }
}

impl fmt::Display for PacketRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}",
            self.timestamp.format("%H:%M:%S%.3f"),
            self.hex()
        )?;
        if !self.filters.is_empty() {
            write!(f, " filters={:?}", self.filters)?;
        }
        Ok(())
    }
}
