//! Web-controlled gateway to a microcontroller on a USB serial link.
//!
//! The core is two pieces: [`resolver`] finds a plausible serial port
//! without prior knowledge, and [`link`] owns the single connection and
//! performs write-then-read exchanges with the device. [`api`] exposes them
//! over HTTP; [`api_client`] is the matching client.

pub mod api;
pub mod api_client;
pub mod config;
pub mod error;
pub mod link;
pub mod resolver;
pub mod tracing;
pub mod transport;
