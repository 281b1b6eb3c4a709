// src/logging.rs
//! Leveled logging with optional stack capture, and structured dumps of
//! arbitrary values as indented JSON.
//!
//! Built on `tracing` + `tracing-subscriber`; there is no bespoke
//! logging crate here, only a thin init helper and a dump function
//! layered on top.

use serde::Serialize;
use tracing_subscriber::EnvFilter;

/// Install a process-wide `tracing` subscriber.
///
/// Honors `RUST_LOG` if set; otherwise defaults to `info`, or `debug`
/// when `verbose` is true (the `-v` CLI flag).
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Dump an arbitrary serializable value as indented JSON at debug level.
///
/// For ad hoc debug visibility into values that aren't themselves the
/// point of a log line — an action's config at the moment it's run, say
/// — rather than the `-show` CLI flag, which prints to stdout via
/// [`print_json`] below.
pub fn dump_json<T: Serialize>(label: &str, value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(rendered) => tracing::debug!("{label}:\n{rendered}"),
        Err(err) => tracing::warn!("failed to render {label} as JSON: {err}"),
    }
}

/// Render a value as indented JSON and print it to stdout, for `-show`.
pub fn print_json<T: Serialize>(value: &T) -> crate::error::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
