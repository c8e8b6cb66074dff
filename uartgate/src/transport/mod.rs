//! Host serial transport.
//!
//! This module separates the core from the operating system's serial layer.
//! A [`SerialBackend`] enumerates ports and opens them; an open port is a
//! [`SerialLink`] that moves raw bytes with no protocol knowledge. The
//! native backend talks to real hardware, and tests substitute the mock.

use serde::{Deserialize, Serialize};
use std::{io, time::Duration};

use crate::error::Result;

pub mod native;

#[cfg(test)]
pub(crate) mod mock;

pub use native::NativeBackend;

/// One serial port as reported by enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PortDescriptor {
    /// OS device identifier (`/dev/ttyUSB0`, `COM3`, ...)
    pub device: String,
    /// Human-readable description, usually manufacturer and product
    pub description: String,
    /// Hardware ID (`USB VID:PID=1A86:7523 SER=...`)
    pub hwid: String,
}

impl PortDescriptor {
    pub fn new(
        device: impl Into<String>,
        description: impl Into<String>,
        hwid: impl Into<String>,
    ) -> Self {
        Self {
            device: device.into(),
            description: description.into(),
            hwid: hwid.into(),
        }
    }
}

/// Access to the host's serial ports.
pub trait SerialBackend: Send + Sync + 'static {
    /// Handle type returned by [`SerialBackend::open`].
    type Link: SerialLink;

    /// List every serial port the host currently exposes, in OS order.
    fn available_ports(&self) -> Result<Vec<PortDescriptor>>;

    /// Open `port` at `baud_rate`, 8N1, no flow control.
    ///
    /// `timeout` bounds individual blocking reads and writes on the handle.
    fn open(&self, port: &str, baud_rate: u32, timeout: Duration) -> Result<Self::Link>;
}

/// An open serial connection.
///
/// The handle is closed when dropped; [`SerialLink::close`] makes the point
/// of closing explicit.
pub trait SerialLink: Send + 'static {
    /// Port this handle was opened on.
    fn name(&self) -> &str;

    /// Write all of `bytes` and flush.
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Number of received bytes waiting to be read.
    fn bytes_available(&mut self) -> io::Result<usize>;

    /// Read pending bytes into `buf`, returning how many were read.
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Release the port.
    fn close(self)
    where
        Self: Sized,
    {
        drop(self);
    }
}
