//! # rs485-core
//!
//! Transport-independent engine for RS-485 style shared-bus protocols.
//!
//! This crate provides the protocol primitives:
//! - Byte pattern matching with AND masks and inversion
//! - Frame building and checksum verification
//! - Receive-side frame assembly from a byte stream
//! - Numeric field decoding
//! - Command/ack sequencing with retries
//! - Packet monitor filters
//!
//! Nothing here performs I/O on its own. Time is passed in explicitly and the
//! line is reached through the [`Line`] trait.

pub mod assembler;
pub mod checksum;
pub mod command;
pub mod constants;
pub mod decode;
pub mod error;
pub mod frame;
pub mod line;
pub mod monitor;
pub mod pattern;
pub mod sequencer;

pub use assembler::{FrameAssembler, frame_gap};
pub use checksum::{Checksum, Checksum2, Checksum2Fn, ChecksumEngine, ChecksumFn};
pub use command::{Command, CommandFn, CommandInput, CommandTemplate};
pub use decode::{DecodeFn, Endian, NumericDecoder, NumericSpec};
pub use error::{Error, Result};
pub use frame::FrameBuilder;
pub use line::{Direction, Line};
pub use monitor::PacketMonitor;
pub use pattern::BytePattern;
pub use sequencer::{Sequencer, SequencerConfig, SequencerEvent, SequencerState, WriteId};
