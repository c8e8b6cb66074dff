//! The single serial connection to the microcontroller.
//!
//! [`LinkManager`] owns at most one open handle and remembers the last port
//! that opened successfully. Every operation that touches the link (open,
//! close, write, the read loop, and the fixed waits in between) runs while
//! holding one mutex, so a connect can never land in the middle of an
//! exchange and two exchanges can never interleave their bytes.
//!
//! All waits are blocking. Async callers should move calls onto a blocking
//! thread (`tokio::task::spawn_blocking`).

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    fmt, io, thread,
    time::{Duration, Instant},
};

use crate::{
    config::{Config, FaultPolicy, Timings},
    error::{ExchangeError, Result},
    resolver::PortResolver,
    tracing::prelude::*,
    transport::{PortDescriptor, SerialBackend, SerialLink},
};

/// Command byte that switches the output on.
pub const CMD_ON: u8 = b'1';

/// Command byte that switches the output off.
pub const CMD_OFF: u8 = b'0';

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkPhase {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Snapshot of the link for status reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Status {
    pub connected: bool,
    /// Last port that opened successfully, even if now closed
    pub port: Option<String>,
    pub phase: LinkPhase,
}

/// Outcome of an exchange that reached the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Trimmed text the device sent back
    Text(String),
    /// Command written, nothing readable came back within the read window
    Accepted,
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Text(text) => f.write_str(text),
            Reply::Accepted => f.write_str("Command sent"),
        }
    }
}

struct LinkState<L> {
    remembered: Option<String>,
    link: Option<L>,
}

/// Owner of the connection and the exchange primitive.
pub struct LinkManager<B: SerialBackend> {
    backend: B,
    resolver: PortResolver,
    baud_rate: u32,
    timings: Timings,
    fault_policy: FaultPolicy,
    state: Mutex<LinkState<B::Link>>,
    // Kept apart from `state` so status reads never wait behind an exchange.
    status: Mutex<Status>,
}

impl<B: SerialBackend> LinkManager<B> {
    pub fn new(backend: B, config: &Config) -> Self {
        Self {
            backend,
            resolver: PortResolver::new(config),
            baud_rate: config.serial.baud_rate,
            timings: config.timings,
            fault_policy: config.serial.fault_policy,
            state: Mutex::new(LinkState {
                remembered: None,
                link: None,
            }),
            status: Mutex::new(Status::default()),
        }
    }

    pub fn resolver(&self) -> &PortResolver {
        &self.resolver
    }

    /// Run port discovery. Serialized with all other link I/O.
    pub fn discover_port(&self) -> Result<String> {
        let _state = self.state.lock();
        self.resolver.discover_port(&self.backend)
    }

    /// Enumerate ports without opening any.
    pub fn list_available_ports(&self) -> Vec<PortDescriptor> {
        self.resolver.list_available_ports(&self.backend)
    }

    pub fn current_status(&self) -> Status {
        self.status.lock().clone()
    }

    /// Make sure a connection is open, reconnecting or discovering as needed.
    ///
    /// Tries the remembered port first. If that fails the remembered port is
    /// forgotten and discovery runs. Returns `false` when no port could be
    /// opened; that is a normal outcome, reported by the caller.
    pub fn ensure_connected(&self) -> bool {
        let mut state = self.state.lock();
        if state.link.is_some() {
            return true;
        }

        if let Some(port) = state.remembered.clone() {
            match self.open(&mut state, &port) {
                Ok(()) => return true,
                Err(e) => {
                    warn!(port = %port, error = %e, "Remembered port failed, rediscovering");
                    state.remembered = None;
                    self.publish(LinkPhase::Disconnected, None);
                }
            }
        }

        let port = match self.resolver.discover_port(&self.backend) {
            Ok(port) => port,
            Err(e) => {
                warn!(error = %e, "No device port available");
                return false;
            }
        };

        match self.open(&mut state, &port) {
            Ok(()) => true,
            Err(e) => {
                warn!(port = %port, error = %e, "Discovered port failed to open");
                false
            }
        }
    }

    /// Connect to `port`, closing any current connection first.
    ///
    /// The open failure, with its original cause, is returned to the caller.
    pub fn connect_to(&self, port: &str) -> Result<()> {
        let mut state = self.state.lock();
        self.close(&mut state);
        self.open(&mut state, port)
    }

    /// Close the current connection, if any. The port stays remembered.
    pub fn disconnect(&self) {
        let mut state = self.state.lock();
        self.close(&mut state);
    }

    /// Write one command byte and collect whatever the device answers.
    ///
    /// Holds the link for the whole write/wait/read cycle. Any byte is sent
    /// as-is; [`CMD_ON`] and [`CMD_OFF`] are just the common ones.
    pub fn exchange(&self, command: u8) -> std::result::Result<Reply, ExchangeError> {
        let mut state = self.state.lock();
        let Some(link) = state.link.as_mut() else {
            debug!(command = %char::from(command), "Exchange while disconnected");
            return Err(ExchangeError::NotConnected);
        };

        match self.transact(link, command) {
            Ok(reply) => {
                debug!(command = %char::from(command), reply = %reply, "Exchange complete");
                Ok(reply)
            }
            Err(e) => {
                error!(command = %char::from(command), error = %e, "Exchange failed");
                if self.fault_policy == FaultPolicy::Disconnect {
                    self.close(&mut state);
                }
                Err(ExchangeError::Io(e))
            }
        }
    }

    fn transact(&self, link: &mut B::Link, command: u8) -> io::Result<Reply> {
        link.write_all(&[command])?;
        pause(self.timings.post_write_delay);

        // There is no terminator: the first quiet poll after any data ends
        // the reply.
        let mut received = Vec::new();
        let mut buf = [0u8; 64];
        let started = Instant::now();
        while started.elapsed() < self.timings.read_window {
            let pending = link.bytes_available()?;
            if pending > 0 {
                let want = pending.min(buf.len());
                let n = link.read_available(&mut buf[..want])?;
                received.extend_from_slice(&buf[..n]);
            } else {
                pause(self.timings.poll_interval);
                if !received.is_empty() {
                    break;
                }
            }
        }

        let text = String::from_utf8_lossy(&received);
        let text = text.trim();
        if text.is_empty() {
            Ok(Reply::Accepted)
        } else {
            Ok(Reply::Text(text.to_string()))
        }
    }

    fn open(&self, state: &mut LinkState<B::Link>, port: &str) -> Result<()> {
        self.publish(LinkPhase::Connecting, state.remembered.clone());

        let link = match self
            .backend
            .open(port, self.baud_rate, self.timings.link_timeout)
        {
            Ok(link) => link,
            Err(e) => {
                self.publish(LinkPhase::Disconnected, state.remembered.clone());
                return Err(e);
            }
        };

        // Opening the port resets most boards; give the firmware time to boot.
        pause(self.timings.settle_delay);

        state.link = Some(link);
        state.remembered = Some(port.to_string());
        self.publish(LinkPhase::Connected, state.remembered.clone());
        info!(port = %port, baud_rate = self.baud_rate, "Connected");
        Ok(())
    }

    fn close(&self, state: &mut LinkState<B::Link>) {
        if let Some(link) = state.link.take() {
            info!(port = %link.name(), "Closing connection");
            link.close();
        }
        self.publish(LinkPhase::Disconnected, state.remembered.clone());
    }

    fn publish(&self, phase: LinkPhase, port: Option<String>) {
        *self.status.lock() = Status {
            connected: phase == LinkPhase::Connected,
            port,
            phase,
        };
    }
}

fn pause(duration: Duration) {
    if !duration.is_zero() {
        thread::sleep(duration);
    }
}
