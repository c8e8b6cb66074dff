//! Configuration management for uartgate.
//!
//! Every setting has a built-in default matching a typical Arduino-class
//! board at 9600 baud. Any of them can be overridden through `UARTGATE_*`
//! environment variables, which is how the daemon is configured under
//! systemd.

use std::{fmt, str::FromStr, time::Duration};

use crate::error::{Error, Result};

/// Description keywords identifying common USB-serial bridge chips.
pub const DEFAULT_KEYWORDS: &[&str] = &["arduino", "ch340", "cp210", "ftdi"];

/// Main configuration structure for the gateway.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Serial link configuration
    pub serial: SerialConfig,

    /// Fixed waits and polling windows used by discovery and exchanges
    pub timings: Timings,

    /// API server configuration
    pub api: ApiConfig,

    /// Log level used when RUST_LOG is not set
    pub log_level: LogLevel,
}

/// Serial link configuration.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Baud rate for probing and for the live connection
    pub baud_rate: u32,

    /// Lowercase keywords matched against port descriptions
    pub keywords: Vec<String>,

    /// What to do with the connection after an I/O fault mid-exchange
    pub fault_policy: FaultPolicy,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            keywords: DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            fault_policy: FaultPolicy::default(),
        }
    }
}

/// Named durations for every blocking wait in the core.
///
/// None of these are early-exit conditions: settle and post-write delays are
/// always waited in full, and only the read window bounds a polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Port timeout while probing keyword candidates
    pub candidate_probe_timeout: Duration,

    /// Port timeout while probing every port as a fallback
    pub fallback_probe_timeout: Duration,

    /// Port timeout on the live connection
    pub link_timeout: Duration,

    /// Wait after opening, while the microcontroller resets and boots
    pub settle_delay: Duration,

    /// Wait between writing a command and starting to read
    pub post_write_delay: Duration,

    /// Upper bound on the read polling loop
    pub read_window: Duration,

    /// Sleep between polls when no input is pending
    pub poll_interval: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            candidate_probe_timeout: Duration::from_secs(2),
            fallback_probe_timeout: Duration::from_secs(1),
            link_timeout: Duration::from_secs(1),
            settle_delay: Duration::from_secs(2),
            post_write_delay: Duration::from_millis(200),
            read_window: Duration::from_secs(1),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl Timings {
    /// All waits collapsed to zero, with a short read window.
    #[cfg(test)]
    pub(crate) fn immediate() -> Self {
        Self {
            candidate_probe_timeout: Duration::ZERO,
            fallback_probe_timeout: Duration::ZERO,
            link_timeout: Duration::ZERO,
            settle_delay: Duration::ZERO,
            post_write_delay: Duration::ZERO,
            read_window: Duration::from_millis(50),
            poll_interval: Duration::from_millis(1),
        }
    }
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Listen address
    pub listen: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:5000".to_string(),
        }
    }
}

/// Connection handling after an I/O fault during an exchange.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FaultPolicy {
    /// Close the handle; the next connect attempt reopens the remembered port.
    #[default]
    Disconnect,
    /// Leave the handle open and let the next exchange try again.
    KeepOpen,
}

impl FromStr for FaultPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disconnect" => Ok(Self::Disconnect),
            "keep-open" | "keep_open" | "keepopen" => Ok(Self::KeepOpen),
            other => Err(Error::Config(format!("unknown fault policy '{other}'"))),
        }
    }
}

impl fmt::Display for FaultPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnect => f.write_str("disconnect"),
            Self::KeepOpen => f.write_str("keep-open"),
        }
    }
}

/// Log level name, validated when read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLevel(String);

impl Default for LogLevel {
    fn default() -> Self {
        Self("info".to_string())
    }
}

impl LogLevel {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Config {
    /// Load configuration from defaults plus process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from defaults plus whatever `lookup` returns for
    /// each `UARTGATE_*` key.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("UARTGATE_BAUD_RATE") {
            config.serial.baud_rate = parse_number("UARTGATE_BAUD_RATE", &v)?;
        }
        if let Some(v) = lookup("UARTGATE_KEYWORDS") {
            let keywords: Vec<String> = v
                .split(',')
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect();
            if keywords.is_empty() {
                return Err(Error::Config("UARTGATE_KEYWORDS is empty".to_string()));
            }
            config.serial.keywords = keywords;
        }
        if let Some(v) = lookup("UARTGATE_FAULT_POLICY") {
            config.serial.fault_policy = v.parse()?;
        }

        let t = &mut config.timings;
        for (key, slot) in [
            ("UARTGATE_PROBE_MS", &mut t.candidate_probe_timeout),
            ("UARTGATE_FALLBACK_PROBE_MS", &mut t.fallback_probe_timeout),
            ("UARTGATE_LINK_TIMEOUT_MS", &mut t.link_timeout),
            ("UARTGATE_SETTLE_MS", &mut t.settle_delay),
            ("UARTGATE_POST_WRITE_MS", &mut t.post_write_delay),
            ("UARTGATE_READ_WINDOW_MS", &mut t.read_window),
            ("UARTGATE_POLL_MS", &mut t.poll_interval),
        ] {
            if let Some(v) = lookup(key) {
                *slot = Duration::from_millis(parse_number(key, &v)?);
            }
        }

        if let Some(v) = lookup("UARTGATE_LISTEN") {
            config.api.listen = v.trim().to_string();
        }
        if let Some(v) = lookup("UARTGATE_LOG_LEVEL") {
            if crate::tracing::parse_level(&v).is_none() {
                return Err(Error::Config(format!("unknown log level '{v}'")));
            }
            config.log_level = LogLevel(v.trim().to_lowercase());
        }

        Ok(config)
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{key}: '{value}' is not a valid number")))
}
