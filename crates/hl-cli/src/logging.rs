//! Tracing subscriber setup.

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::LogFormat;

/// Filter from `RUST_LOG` when set, else `fallback`.
///
/// # Errors
/// Fails when the chosen directive does not parse.
pub fn filter(fallback: &str) -> Result<EnvFilter> {
    match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directive) if !directive.trim().is_empty() => EnvFilter::try_new(&directive)
            .with_context(|| format!("invalid RUST_LOG directive {directive:?}")),
        _ => EnvFilter::try_new(fallback)
            .with_context(|| format!("invalid log filter {fallback:?}")),
    }
}

/// Install the global subscriber. Logs go to stderr; stdout carries
/// command output.
///
/// # Errors
/// Fails on an invalid filter or when a subscriber is already installed.
pub fn init(format: LogFormat, fallback: &str) -> Result<()> {
    let filter = filter(fallback)?;
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(false)
                    .flatten_event(true),
            )
            .try_init(),
    }
    .context("failed to install tracing subscriber")
}
