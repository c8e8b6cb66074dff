//! Logging setup for the gateway daemon and CLI.
//!
//! Binaries call [`init_journald_or_stdout`] once at startup. Library code
//! uses `use crate::tracing::prelude::*` for the level macros, so every log
//! line goes through the same subscriber regardless of which module emits it.

use std::env;
use time::OffsetDateTime;
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt::{format::Writer, time::FormatTime},
    prelude::*,
};

pub mod prelude {
    #[allow(unused_imports)]
    pub use tracing::{debug, error, info, trace, warn};
}

use prelude::*;

/// Install the global subscriber.
///
/// Under systemd (`JOURNAL_STREAM` set) events go to journald, otherwise to
/// stdout. `default_level` applies when `RUST_LOG` is unset or unparsable.
pub fn init_journald_or_stdout(default_level: LevelFilter) {
    if env::var("JOURNAL_STREAM").is_ok() {
        match tracing_journald::layer() {
            Ok(layer) => tracing_subscriber::registry()
                .with(env_filter(default_level))
                .with(layer)
                .init(),
            Err(e) => {
                use_stdout(default_level);
                error!(error = %e, "Failed to initialize journald logging, using stdout.");
            }
        }
    } else {
        use_stdout(default_level);
    }
}

/// Parse a level name as used in configuration (`"info"`, `"debug"`, ...).
pub fn parse_level(name: &str) -> Option<LevelFilter> {
    name.trim().parse().ok()
}

fn env_filter(default_level: LevelFilter) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(default_level.into())
        .with_env_var("RUST_LOG")
        .from_env_lossy()
}

fn use_stdout(default_level: LevelFilter) {
    tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(tracing_subscriber::fmt::layer().with_timer(LocalTimer))
        .init();
}

// Local wall-clock time to the millisecond; exchange timing is in the
// hundreds of milliseconds so whole seconds hide too much.
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        let stamp = now
            .format(time::macros::format_description!(
                "[hour]:[minute]:[second].[subsecond digits:3]"
            ))
            .map_err(|_| std::fmt::Error)?;
        write!(w, "{stamp}")
    }
}
