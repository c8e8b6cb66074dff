//! Serial port discovery.
//!
//! USB-serial adapters vary by vendor and their description strings are an
//! unreliable signal, so discovery works in two passes:
//!
//! 1. Ports whose description names a known bridge chip (see
//!    [`DEFAULT_KEYWORDS`](crate::config::DEFAULT_KEYWORDS)) are probed first,
//!    in enumeration order.
//! 2. If none of them opens, every enumerated port is probed with a shorter
//!    timeout.
//!
//! A probe opens the port and closes it straight away; a port that opens is
//! reachable. Nothing here keeps a handle open.

use std::time::Duration;

use crate::{
    config::Config,
    error::{Error, Result},
    tracing::prelude::*,
    transport::{PortDescriptor, SerialBackend, SerialLink},
};

/// Keyword classifier plus probe settings.
#[derive(Debug, Clone)]
pub struct PortResolver {
    keywords: Vec<String>,
    baud_rate: u32,
    candidate_probe_timeout: Duration,
    fallback_probe_timeout: Duration,
}

impl PortResolver {
    pub fn new(config: &Config) -> Self {
        Self {
            keywords: config
                .serial
                .keywords
                .iter()
                .map(|k| k.to_lowercase())
                .collect(),
            baud_rate: config.serial.baud_rate,
            candidate_probe_timeout: config.timings.candidate_probe_timeout,
            fallback_probe_timeout: config.timings.fallback_probe_timeout,
        }
    }

    /// Whether `description` names one of the known bridge chips.
    pub fn is_candidate(&self, description: &str) -> bool {
        let description = description.to_lowercase();
        self.keywords.iter().any(|k| description.contains(k.as_str()))
    }

    /// Keyword matches among `ports`, enumeration order preserved.
    pub fn candidates<'a>(&self, ports: &'a [PortDescriptor]) -> Vec<&'a PortDescriptor> {
        ports
            .iter()
            .filter(|p| self.is_candidate(&p.description))
            .collect()
    }

    /// Every port the host exposes. Enumeration failures yield an empty list.
    pub fn list_available_ports<B: SerialBackend>(&self, backend: &B) -> Vec<PortDescriptor> {
        match backend.available_ports() {
            Ok(ports) => ports,
            Err(e) => {
                warn!(error = %e, "Failed to enumerate serial ports");
                Vec::new()
            }
        }
    }

    /// Find a port that opens, preferring keyword candidates.
    pub fn discover_port<B: SerialBackend>(&self, backend: &B) -> Result<String> {
        let ports = self.list_available_ports(backend);
        if ports.is_empty() {
            info!("No serial ports found");
            return Err(Error::NoPortsFound);
        }

        let candidates = self.candidates(&ports);
        for port in &ports {
            debug!(
                port = %port.device,
                description = %port.description,
                hwid = %port.hwid,
                candidate = self.is_candidate(&port.description),
                "Found serial port"
            );
        }

        for port in &candidates {
            if self.probe(backend, &port.device, self.candidate_probe_timeout) {
                info!(port = %port.device, "Candidate port is reachable");
                return Ok(port.device.clone());
            }
        }

        debug!(
            candidates = candidates.len(),
            "No candidate port opened, probing all ports"
        );
        for port in &ports {
            if self.probe(backend, &port.device, self.fallback_probe_timeout) {
                info!(port = %port.device, "Port is reachable");
                return Ok(port.device.clone());
            }
        }

        warn!(ports = ports.len(), "No serial port could be opened");
        Err(Error::NoReachablePort)
    }

    fn probe<B: SerialBackend>(&self, backend: &B, port: &str, timeout: Duration) -> bool {
        match backend.open(port, self.baud_rate, timeout) {
            Ok(link) => {
                link.close();
                true
            }
            Err(e) => {
                debug!(port = %port, error = %e, "Probe failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Timings,
        transport::mock::{Event, MockBackend},
    };
    use test_case::test_case;

    fn resolver() -> PortResolver {
        let mut config = Config::default();
        config.timings = Timings {
            candidate_probe_timeout: Duration::from_millis(2),
            fallback_probe_timeout: Duration::from_millis(1),
            ..Timings::immediate()
        };
        PortResolver::new(&config)
    }

    #[test_case("Arduino Uno (COM3)", true ; "arduino")]
    #[test_case("USB-SERIAL CH340", true ; "ch340 upper case")]
    #[test_case("Silicon Labs CP2102 USB to UART Bridge", true ; "cp2102")]
    #[test_case("Prolific PL2303", false ; "unlisted bridge")]
    #[test_case("FTDI FT232R USB UART", true ; "ftdi")]
    #[test_case("ttyS0", false ; "builtin uart")]
    #[test_case("n/a", false ; "no description")]
    fn classifies_descriptions(description: &str, expected: bool) {
        assert_eq!(resolver().is_candidate(description), expected);
    }

    #[test]
    fn no_ports_found() {
        let backend = MockBackend::new();
        let result = resolver().discover_port(&backend);
        assert!(matches!(result, Err(Error::NoPortsFound)));
        assert!(backend.events().is_empty());
    }

    #[test]
    fn keyword_match_wins_over_earlier_ports() {
        let backend = MockBackend::new()
            .with_port("/dev/ttyS0", "n/a", true)
            .with_port("/dev/ttyS1", "n/a", true)
            .with_port("/dev/ttyUSB0", "QinHeng USB Serial CH340", true);

        let port = resolver().discover_port(&backend).unwrap();

        assert_eq!(port, "/dev/ttyUSB0");
        assert_eq!(backend.opened(), vec!["/dev/ttyUSB0"]);
    }

    #[test]
    fn candidates_are_probed_with_candidate_timeout() {
        let backend = MockBackend::new().with_port("/dev/ttyACM0", "Arduino Uno", true);

        resolver().discover_port(&backend).unwrap();

        assert_eq!(
            backend.events(),
            vec![
                Event::Open {
                    port: "/dev/ttyACM0".into(),
                    timeout: Duration::from_millis(2),
                },
                Event::Close {
                    port: "/dev/ttyACM0".into(),
                },
            ]
        );
    }

    #[test]
    fn first_openable_candidate_wins() {
        let backend = MockBackend::new()
            .with_port("/dev/ttyUSB0", "FTDI FT232R", false)
            .with_port("/dev/ttyUSB1", "CP210x UART Bridge", true)
            .with_port("/dev/ttyACM0", "Arduino Mega", true);

        assert_eq!(resolver().discover_port(&backend).unwrap(), "/dev/ttyUSB1");
    }

    #[test]
    fn falls_back_to_full_scan() {
        let backend = MockBackend::new()
            .with_port("/dev/ttyS0", "n/a", false)
            .with_port("/dev/ttyS1", "n/a", false)
            .with_port("/dev/ttyUSB0", "USB2.0-Serial", true)
            .with_port("/dev/ttyUSB1", "USB2.0-Serial", true);

        let port = resolver().discover_port(&backend).unwrap();

        assert_eq!(port, "/dev/ttyUSB0");
        assert_eq!(backend.opened(), vec!["/dev/ttyUSB0"]);
        let refused: Vec<Event> = backend
            .events()
            .into_iter()
            .filter(|e| matches!(e, Event::OpenRefused { .. }))
            .collect();
        assert_eq!(refused.len(), 2);
    }

    #[test]
    fn full_scan_retries_unreachable_candidates_with_short_timeout() {
        let backend = MockBackend::new().with_port("/dev/ttyUSB0", "CH340", false);

        let result = resolver().discover_port(&backend);

        assert!(matches!(result, Err(Error::NoReachablePort)));
        assert_eq!(
            backend.events(),
            vec![
                Event::OpenRefused {
                    port: "/dev/ttyUSB0".into()
                },
                Event::OpenRefused {
                    port: "/dev/ttyUSB0".into()
                },
            ]
        );
    }

    #[test]
    fn custom_keywords_replace_defaults() {
        let mut config = Config::default();
        config.serial.keywords = vec!["Pico".to_string()];
        let resolver = PortResolver::new(&config);

        assert!(resolver.is_candidate("Raspberry Pi Pico"));
        assert!(!resolver.is_candidate("Arduino Uno"));
    }

    #[test]
    fn candidates_keep_enumeration_order() {
        let ports = vec![
            PortDescriptor::new("/dev/ttyACM1", "Arduino Nano", "n/a"),
            PortDescriptor::new("/dev/ttyS0", "n/a", "n/a"),
            PortDescriptor::new("/dev/ttyACM0", "Arduino Uno", "n/a"),
        ];
        let resolver = resolver();
        let names: Vec<&str> = resolver
            .candidates(&ports)
            .into_iter()
            .map(|p| p.device.as_str())
            .collect();
        assert_eq!(names, vec!["/dev/ttyACM1", "/dev/ttyACM0"]);
    }
}
