//! Tracing subscriber setup.
//!
//! Logs go to stderr so that stdout carries only command output (JSON
//! results, prompts, completion scripts). The level comes from `RUST_LOG`
//! when set, otherwise from `default_level`.

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber. `json` switches to one JSON object per line.
pub fn init_logging(json: bool, default_level: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let (plain, json) = if json {
        let layer = fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_writer(std::io::stderr);
        (None, Some(layer))
    } else {
        let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
        (Some(layer), None)
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(plain)
        .with(json)
        .try_init()
        .map_err(|e| anyhow!("failed to initialise logging: {}", e))
}
