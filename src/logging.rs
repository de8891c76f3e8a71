//! Logging bootstrap.
//!
//! Butler normally runs as a sidecar under a supervisor, so JSON output
//! is the default and `--pretty` (or an interactive terminal) switches
//! to human-readable output for local runs. Sync-pipeline log lines gain
//! their `manager`/`run_id` context from tracing spans, not from the
//! subscriber configuration here.

use std::io::IsTerminal;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::LogLevel;

/// Install the global subscriber. `--json` wins over `--pretty`, which
/// wins over TTY detection.
pub fn init(level: &LogLevel, pretty: bool, json: bool) {
    let filter =
        tracing_subscriber::filter::Targets::new().with_default(level.to_tracing_level());
    let registry = tracing_subscriber::registry().with(filter);

    if !json && (pretty || std::io::stdout().is_terminal()) {
        registry.with(fmt::layer().pretty()).init();
    } else {
        registry.with(fmt::layer().json().with_target(false)).init();
    }
}
