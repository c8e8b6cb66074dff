//! Native serial backend.
//!
//! Uses the blocking `serialport` API that `tokio-serial` re-exports. The
//! core's waits are blocking by nature, so the async stream types are not
//! needed here; the HTTP layer moves calls onto blocking threads instead.

use std::{
    io::{self, Read, Write},
    time::Duration,
};
use tokio_serial::{
    DataBits, FlowControl, Parity, SerialPort, SerialPortInfo, SerialPortType, StopBits,
};

use super::{PortDescriptor, SerialBackend, SerialLink};
use crate::{
    error::{Error, Result},
    tracing::prelude::*,
};

/// Backend over the operating system's serial ports.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeBackend;

impl NativeBackend {
    pub fn new() -> Self {
        Self
    }
}

impl SerialBackend for NativeBackend {
    type Link = NativeLink;

    fn available_ports(&self) -> Result<Vec<PortDescriptor>> {
        let ports = tokio_serial::available_ports()?;
        Ok(ports.into_iter().map(describe).collect())
    }

    fn open(&self, port: &str, baud_rate: u32, timeout: Duration) -> Result<NativeLink> {
        let handle = tokio_serial::new(port, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(timeout)
            .open()
            .map_err(|e| Error::open_failed(port, e))?;

        trace!(port = %port, baud_rate, "Opened serial port");
        Ok(NativeLink {
            name: port.to_string(),
            port: handle,
        })
    }
}

/// Open handle on a native serial port.
pub struct NativeLink {
    name: String,
    port: Box<dyn SerialPort>,
}

impl SerialLink for NativeLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        let pending = self.port.bytes_to_read()?;
        Ok(pending as usize)
    }

    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

fn describe(info: SerialPortInfo) -> PortDescriptor {
    let (description, hwid) = match info.port_type {
        SerialPortType::UsbPort(usb) => (
            usb_description(usb.manufacturer.as_deref(), usb.product.as_deref()),
            usb_hwid(usb.vid, usb.pid, usb.serial_number.as_deref()),
        ),
        SerialPortType::PciPort => ("PCI".to_string(), "PCI".to_string()),
        SerialPortType::BluetoothPort => ("Bluetooth".to_string(), "BLUETOOTH".to_string()),
        SerialPortType::Unknown => ("n/a".to_string(), "n/a".to_string()),
    };

    PortDescriptor {
        device: info.port_name,
        description,
        hwid,
    }
}

// Bridge chips often identify themselves only through the manufacturer
// ("FTDI") while the product is generic ("FT232R USB UART"), so both are kept.
fn usb_description(manufacturer: Option<&str>, product: Option<&str>) -> String {
    let parts: Vec<&str> = [manufacturer, product]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if parts.is_empty() {
        "n/a".to_string()
    } else {
        parts.join(" ")
    }
}

fn usb_hwid(vid: u16, pid: u16, serial_number: Option<&str>) -> String {
    match serial_number {
        Some(serial) if !serial.is_empty() => {
            format!("USB VID:PID={vid:04X}:{pid:04X} SER={serial}")
        }
        _ => format!("USB VID:PID={vid:04X}:{pid:04X}"),
    }
}
