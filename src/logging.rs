//! Logging initialization.
//!
//! The library only emits `tracing` events; embedders (and the inspection
//! binary) decide where they go.

use std::io::IsTerminal;
use std::sync::Once;

use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install a global fmt subscriber on stderr.
///
/// `RUST_LOG` wins over `default_filter` when set.
///
/// # Errors
///
/// Fails if the filter does not parse or a global subscriber is already set.
pub fn init_logging(default_filter: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_filter))?;

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_ansi(std::io::stderr().is_terminal());

    tracing::subscriber::set_global_default(
        tracing_subscriber::registry().with(env_filter).with(fmt_layer),
    )?;
    Ok(())
}

/// Route events to the test harness output, once per process.
pub fn init_test_logging() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("memostore=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}
