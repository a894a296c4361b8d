//! Serial port driver

use std::io::{self, Read, Write};
use std::time::Duration;

use bytes::BytesMut;
use rs485_core::{Direction, Line};
use rs485_types::{Parity, SerialSettings, StopBits};
use serialport::SerialPort;
use tracing::{debug, trace};

use crate::{
    Driver,
    error::{Error, Result},
};

/// Modem line wired to the transceiver's driver-enable input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DirectionControl {
    /// Transceiver switches on its own
    #[default]
    None,
    Rts,
    Dtr,
}

/// RS-485 adapter on an OS serial port
pub struct SerialDriver {
    path: String,
    port: Box<dyn SerialPort>,
    direction_control: DirectionControl,
    inverted: bool,
    scratch: Vec<u8>,
}

impl SerialDriver {
    /// Open `path` with the given line settings
    ///
    /// # Errors
    ///
    /// Fails if the port cannot be opened or the settings cannot be
    /// represented by the OS (data bits outside 5..=8).
    pub fn open(path: impl Into<String>, settings: &SerialSettings) -> Result<Self> {
        let path = path.into();

        let data_bits = match settings.data_bits {
            5 => serialport::DataBits::Five,
            6 => serialport::DataBits::Six,
            7 => serialport::DataBits::Seven,
            8 => serialport::DataBits::Eight,
            other => {
                return Err(Error::Unsupported(format!("{} data bits", other)));
            }
        };

        let stop_bits = match settings.stop_bits {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
        };

        let parity = match settings.parity {
            Parity::None => serialport::Parity::None,
            Parity::Even => serialport::Parity::Even,
            Parity::Odd => serialport::Parity::Odd,
        };

        debug!("Opening {} ({})", path, settings);

        let port = serialport::new(&path, settings.baud_rate)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(parity)
            .flow_control(serialport::FlowControl::None)
            .timeout(Duration::from_millis(1))
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => Error::PortNotFound(path.clone()),
                _ => Error::Serial(e),
            })?;

        Ok(Self {
            path,
            port,
            direction_control: DirectionControl::None,
            inverted: false,
            scratch: vec![0u8; 1024],
        })
    }

    /// Drive the transceiver direction from a modem line
    pub fn with_direction_control(mut self, control: DirectionControl, inverted: bool) -> Self {
        self.direction_control = control;
        self.inverted = inverted;
        self
    }

    /// Names of the serial ports present on this machine
    pub fn list_ports() -> Result<Vec<String>> {
        Ok(serialport::available_ports()?
            .into_iter()
            .map(|info| info.port_name)
            .collect())
    }
}

impl Line for SerialDriver {
    fn transmit(&mut self, frame: &[u8]) -> io::Result<()> {
        trace!(port = %self.path, frame = %hex::encode_upper(frame), "TX");
        self.port.write_all(frame)?;
        self.port.flush()
    }

    fn set_direction(&mut self, direction: Direction) -> io::Result<()> {
        let level = direction.level() != self.inverted;
        match self.direction_control {
            DirectionControl::None => Ok(()),
            DirectionControl::Rts => self.port.write_request_to_send(level).map_err(io::Error::from),
            DirectionControl::Dtr => self
                .port
                .write_data_terminal_ready(level)
                .map_err(io::Error::from),
        }
    }
}

impl Driver for SerialDriver {
    fn read_available(&mut self, buf: &mut BytesMut) -> Result<usize> {
        let pending = self.port.bytes_to_read()? as usize;
        if pending == 0 {
            return Ok(0);
        }

        let want = pending.min(self.scratch.len());
        match self.port.read(&mut self.scratch[..want]) {
            Ok(n) => {
                buf.extend_from_slice(&self.scratch[..n]);
                Ok(n)
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn name(&self) -> String {
        self.path.clone()
    }
}

impl std::fmt::Debug for SerialDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialDriver")
            .field("path", &self.path)
            .field("direction_control", &self.direction_control)
            .field("inverted", &self.inverted)
            .finish()
    }
}
