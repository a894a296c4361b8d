//! TCP driver for RS-485 to Ethernet gateways

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use bytes::BytesMut;
use rs485_core::Line;
use tracing::{debug, trace, warn};

use crate::{
    Driver,
    error::{Error, Result},
};

/// Raw TCP socket bridged to the bus by a gateway
#[derive(Debug)]
pub struct TcpDriver {
    addr: String,
    port: u16,
    socket_addr: Option<SocketAddr>,
    stream: Option<TcpStream>,
    connect_timeout: Duration,
    write_timeout: Duration,
}

impl TcpDriver {
    /// Create an unconnected driver
    pub fn new(addr: impl Into<String>, port: u16) -> Self {
        Self {
            addr: addr.into(),
            port,
            socket_addr: None,
            stream: None,
            connect_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(1),
        }
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set timeout for a single frame write
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    fn resolve_addr(&mut self) -> Result<SocketAddr> {
        if let Some(addr) = self.socket_addr {
            return Ok(addr);
        }

        let addr_str = format!("{}:{}", self.addr, self.port);

        let addr = addr_str
            .to_socket_addrs()
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", addr_str, e)))?
            .next()
            .ok_or_else(|| Error::InvalidAddress(format!("No addresses found for {}", addr_str)))?;

        self.socket_addr = Some(addr);
        Ok(addr)
    }

    /// Connect to the gateway
    pub fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        let addr = self.resolve_addr()?;

        debug!("Connecting to {}...", addr);

        let stream = TcpStream::connect_timeout(&addr, self.connect_timeout).map_err(|e| {
            if e.kind() == io::ErrorKind::TimedOut {
                Error::ConnectionTimeout
            } else {
                Error::Io(e)
            }
        })?;

        // Frames are small and latency matters more than throughput
        stream.set_nodelay(true)?;
        stream.set_write_timeout(Some(self.write_timeout))?;
        stream.set_nonblocking(true)?;

        debug!("Connected to {}", addr);

        self.stream = Some(stream);
        Ok(())
    }

    /// Close the connection
    pub fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            debug!("Disconnecting from {}...", self.name());
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

impl Line for TcpDriver {
    fn transmit(&mut self, frame: &[u8]) -> io::Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "not connected"))?;

        trace!(peer = %self.addr, frame = %hex::encode_upper(frame), "TX");

        // Writes block up to the write timeout so a frame goes out whole
        stream.set_nonblocking(false)?;
        let result = stream.write_all(frame).and_then(|()| stream.flush());
        stream.set_nonblocking(true)?;
        result
    }
}

impl Driver for TcpDriver {
    fn read_available(&mut self, buf: &mut BytesMut) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        let mut chunk = [0u8; 512];
        let mut total = 0;

        loop {
            match stream.read(&mut chunk) {
                Ok(0) => {
                    self.stream = None;
                    return Err(Error::ConnectionClosed);
                }
                Ok(n) => {
                    buf.extend_from_slice(&chunk[..n]);
                    total += n;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }

        Ok(total)
    }

    fn name(&self) -> String {
        self.socket_addr
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| format!("{}:{}", self.addr, self.port))
    }
}

impl Drop for TcpDriver {
    fn drop(&mut self) {
        if self.is_connected() {
            warn!("TCP driver dropped while still connected");
        }
    }
}
