//! `heartlink` command-line entry point.
//!
//! One binary plays either side of the link: the reporter publishes the
//! device position, the observer follows it live. Everything is wired from
//! a [`config::HeartlinkConfig`] into explicit handles; nothing is global.

#![forbid(unsafe_code)]

pub mod commands;
pub mod config;
pub mod logging;
pub mod status;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result, bail};
use hl_gemini::GeminiClient;
use hl_safety::SafetyAnnotator;
use hl_store::StoreHandle;
use hl_sync::{GpsdSource, PositionSource, PresenceClient, ReplaySource, WatchOptions};
use tracing::info;

use crate::config::{HeartlinkConfig, SourceKind};

/// Resolved configuration plus where it came from.
#[derive(Debug, Clone, Default)]
pub struct AppContext {
    pub config: HeartlinkConfig,
    pub config_path: Option<PathBuf>,
}

impl AppContext {
    #[must_use]
    pub const fn new(config: HeartlinkConfig, config_path: Option<PathBuf>) -> Self {
        Self {
            config,
            config_path,
        }
    }

    /// Store handle; unconfigured when credentials are missing.
    ///
    /// # Errors
    /// Fails when credentials are present but unusable.
    pub fn store(&self) -> Result<StoreHandle> {
        StoreHandle::from_config(&self.config.store, &self.config.realtime)
            .context("failed to set up the location store")
    }

    /// Presence client for the configured subject over `store`.
    #[must_use]
    pub fn presence(&self, store: StoreHandle) -> PresenceClient {
        PresenceClient::new(store, self.config.subject_id.clone())
    }

    /// Safety annotator; returns the fallback note when no API key is set.
    ///
    /// # Errors
    /// Fails when the key is present but the client cannot be built.
    pub fn annotator(&self) -> Result<SafetyAnnotator> {
        let safety = &self.config.safety;
        let Some(gemini) = safety.gemini() else {
            info!("no generator API key; safety notes use the fallback text");
            return Ok(SafetyAnnotator::unconfigured());
        };
        let client = GeminiClient::new(&gemini).context("failed to set up the Gemini client")?;
        let annotator = SafetyAnnotator::new(Arc::new(client));
        Ok(if safety.timeout_ms == 0 {
            annotator
        } else {
            annotator.with_timeout(Duration::from_millis(safety.timeout_ms))
        })
    }

    /// Position source selected by `[reporter]`.
    ///
    /// # Errors
    /// Fails when the replay source lacks a path or has a zero interval.
    pub fn source(&self) -> Result<Arc<dyn PositionSource>> {
        let reporter = &self.config.reporter;
        match reporter.source {
            SourceKind::Gpsd => Ok(Arc::new(GpsdSource::new(reporter.gpsd_addr.clone()))),
            SourceKind::Replay => {
                let Some(path) = &reporter.replay_path else {
                    bail!("reporter.source is \"replay\" but reporter.replay_path is not set");
                };
                self.replay(path.clone())
            }
        }
    }

    /// Replay source over `path` with the configured pacing.
    ///
    /// # Errors
    /// Fails when `reporter.replay_interval_ms` is zero.
    pub fn replay(&self, path: PathBuf) -> Result<Arc<dyn PositionSource>> {
        let reporter = &self.config.reporter;
        if reporter.replay_interval_ms == 0 {
            bail!("reporter.replay_interval_ms must be greater than zero");
        }
        Ok(Arc::new(
            ReplaySource::new(path)
                .with_interval(Duration::from_millis(reporter.replay_interval_ms))
                .with_repeat(reporter.replay_repeat),
        ))
    }

    #[must_use]
    pub fn watch_options(&self) -> WatchOptions {
        let reporter = &self.config.reporter;
        let options = WatchOptions::default().with_high_accuracy(reporter.high_accuracy);
        if reporter.capture_timeout_ms == 0 {
            options
        } else {
            options.with_timeout(Duration::from_millis(reporter.capture_timeout_ms))
        }
    }
}
