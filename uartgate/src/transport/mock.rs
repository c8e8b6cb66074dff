//! In-memory serial backend for tests.
//!
//! The mock records every backend and link call in order so tests can check
//! what hit the wire and when. A responder function plays the firmware: it
//! sees each write and returns the bytes the device would send back. A reply
//! schedule instead releases chunks at fixed offsets after each write, for
//! tests that depend on when bytes arrive.

use parking_lot::Mutex;
use std::{
    collections::HashSet,
    io,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use super::{PortDescriptor, SerialBackend, SerialLink};
use crate::error::{Error, Result};

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Open { port: String, timeout: Duration },
    OpenRefused { port: String },
    Close { port: String },
    Write { port: String, bytes: Vec<u8> },
    Read { port: String, bytes: Vec<u8> },
}

type Responder = dyn Fn(&[u8]) -> Vec<u8> + Send + Sync;

struct Inner {
    ports: Vec<PortDescriptor>,
    openable: HashSet<String>,
    events: Vec<Event>,
    responder: Arc<Responder>,
    schedule: Vec<(Duration, Vec<u8>)>,
    write_delay: Duration,
    fail_io: bool,
}

/// Shared-handle mock; clones observe and control the same state.
#[derive(Clone)]
pub struct MockBackend {
    inner: Arc<Mutex<Inner>>,
}

impl MockBackend {
    /// Backend with no ports and a device that never answers.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                ports: Vec::new(),
                openable: HashSet::new(),
                events: Vec::new(),
                responder: Arc::new(|_| Vec::new()),
                schedule: Vec::new(),
                write_delay: Duration::ZERO,
                fail_io: false,
            })),
        }
    }

    /// Add an enumerated port; `openable` controls whether open succeeds.
    pub fn with_port(self, device: &str, description: &str, openable: bool) -> Self {
        {
            let mut inner = self.inner.lock();
            inner
                .ports
                .push(PortDescriptor::new(device, description, "n/a"));
            if openable {
                inner.openable.insert(device.to_string());
            }
        }
        self
    }

    /// Make `device` openable (or not) without listing it in enumeration.
    pub fn set_openable(&self, device: &str, openable: bool) {
        let mut inner = self.inner.lock();
        if openable {
            inner.openable.insert(device.to_string());
        } else {
            inner.openable.remove(device);
        }
    }

    pub fn with_responder<F>(self, responder: F) -> Self
    where
        F: Fn(&[u8]) -> Vec<u8> + Send + Sync + 'static,
    {
        self.inner.lock().responder = Arc::new(responder);
        self
    }

    /// After every write, release each chunk once its offset has elapsed.
    pub fn with_reply_schedule(self, chunks: &[(Duration, &[u8])]) -> Self {
        self.inner.lock().schedule = chunks
            .iter()
            .map(|(offset, bytes)| (*offset, bytes.to_vec()))
            .collect();
        self
    }

    /// Sleep inside every write, widening any race between callers.
    pub fn with_write_delay(self, delay: Duration) -> Self {
        self.inner.lock().write_delay = delay;
        self
    }

    /// Make every subsequent link write and read fail.
    pub fn set_fail_io(&self, fail: bool) {
        self.inner.lock().fail_io = fail;
    }

    pub fn events(&self) -> Vec<Event> {
        self.inner.lock().events.clone()
    }

    pub fn clear_events(&self) {
        self.inner.lock().events.clear();
    }

    /// All bytes written to any port, in order.
    pub fn written(&self) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Write { bytes, .. } => Some(bytes),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Ports opened successfully, in order, probes included.
    pub fn opened(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Open { port, .. } => Some(port),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: Event) {
        self.inner.lock().events.push(event);
    }
}

impl SerialBackend for MockBackend {
    type Link = MockLink;

    fn available_ports(&self) -> Result<Vec<PortDescriptor>> {
        Ok(self.inner.lock().ports.clone())
    }

    fn open(&self, port: &str, _baud_rate: u32, timeout: Duration) -> Result<MockLink> {
        let mut inner = self.inner.lock();
        if !inner.openable.contains(port) {
            inner.events.push(Event::OpenRefused {
                port: port.to_string(),
            });
            return Err(Error::open_failed(port, "No such file or directory"));
        }
        inner.events.push(Event::Open {
            port: port.to_string(),
            timeout,
        });
        drop(inner);

        Ok(MockLink {
            name: port.to_string(),
            backend: self.clone(),
            pending: Vec::new(),
            scheduled: Vec::new(),
        })
    }
}

/// Open mock port. Replies queue up in `pending` until read; scheduled
/// chunks move there when due.
pub struct MockLink {
    name: String,
    backend: MockBackend,
    pending: Vec<u8>,
    scheduled: Vec<(Instant, Vec<u8>)>,
}

impl MockLink {
    fn check_fault(&self) -> io::Result<()> {
        if self.backend.inner.lock().fail_io {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"))
        } else {
            Ok(())
        }
    }

    fn release_due(&mut self) {
        let now = Instant::now();
        let (due, later): (Vec<_>, Vec<_>) = self
            .scheduled
            .drain(..)
            .partition(|(at, _)| *at <= now);
        self.scheduled = later;
        for (_, bytes) in due {
            self.pending.extend(bytes);
        }
    }
}

impl SerialLink for MockLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.check_fault()?;
        self.backend.record(Event::Write {
            port: self.name.clone(),
            bytes: bytes.to_vec(),
        });

        let (responder, schedule, delay) = {
            let inner = self.backend.inner.lock();
            (
                Arc::clone(&inner.responder),
                inner.schedule.clone(),
                inner.write_delay,
            )
        };
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        self.pending.extend(responder(bytes));
        let written_at = Instant::now();
        self.scheduled.extend(
            schedule
                .into_iter()
                .map(|(offset, chunk)| (written_at + offset, chunk)),
        );
        Ok(())
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        self.check_fault()?;
        self.release_due();
        Ok(self.pending.len())
    }

    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.check_fault()?;
        self.release_due();
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        self.backend.record(Event::Read {
            port: self.name.clone(),
            bytes: buf[..n].to_vec(),
        });
        Ok(n)
    }

    fn close(self) {
        self.backend.record(Event::Close {
            port: self.name.clone(),
        });
    }
}
