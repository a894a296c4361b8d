//! # rs485
//!
//! Device protocol engine for half-duplex RS-485 shared buses.
//!
//! ## Features
//!
//! - Byte-pattern device recognition with AND masks and inversion
//! - Prefix/suffix framing with XOR/ADD or custom checksums
//! - Command/ack sequencing with retries, turnaround and spacing delays
//! - Numeric state fields and on/off state with change notification
//! - Packet monitor for reverse engineering unknown devices
//! - Async handle over a tokio task, or a plain `tick(now)` loop
//!
//! ## Quick Start
//!
//! ```no_run
//! use rs485::{Bus, BusConfig, BytePattern, Command, DeviceCommand, DeviceDescriptor, SerialDriver};
//!
//! #[tokio::main]
//! async fn main() -> rs485::Result<()> {
//!     let config = BusConfig::new(9600).with_rx_wait(std::time::Duration::from_millis(50));
//!     let driver = SerialDriver::open("/dev/ttyUSB0", &config.serial)?;
//!
//!     let mut bus = Bus::new(config, driver)?;
//!     let light = bus.register(
//!         DeviceDescriptor::new("light", BytePattern::exact(vec![0x0E, 0x1F]))
//!             .with_state_on(BytePattern::new(2, vec![0x01]))
//!             .with_state_off(BytePattern::new(2, vec![0x00]))
//!             .with_command_on(Command::new(vec![0x0E, 0x1F, 0x01]).with_ack(vec![0x0E, 0x9F])),
//!     )?;
//!     bus.register_listener(light, |name: &str, value: &rs485::StateValue| {
//!         println!("{} is now {}", name, value);
//!     })?;
//!
//!     let (handle, task) = bus.start();
//!     handle.command(light, DeviceCommand::On).await?;
//!
//!     let _ = task.await;
//!     Ok(())
//! }
//! ```

pub mod bus;
pub mod config;
pub mod device;
pub mod error;
pub mod handle;
pub mod registry;

// Re-exports
pub use bus::{Bus, BusEvent, BusStats};
pub use config::BusConfig;
pub use device::{Device, DeviceCommand, DeviceDescriptor, DeviceId, StateListener};
pub use error::{Error, Result};
pub use handle::BusHandle;
pub use registry::{Dispatch, Registry};

// Re-export protocol types
pub use rs485_core::{
    BytePattern, Checksum, Checksum2, Command, CommandInput, CommandTemplate, Direction, Endian,
    NumericDecoder, NumericSpec, WriteId,
};
pub use rs485_transport::{
    DirectionControl, Driver, MemoryDriver, MemoryPeer, SerialDriver, TcpDriver,
};
pub use rs485_types::{PacketRecord, Parity, SerialSettings, StateValue, StopBits};
