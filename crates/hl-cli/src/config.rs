//! Layered configuration.
//!
//! Precedence, lowest to highest: built-in defaults, the TOML config file,
//! environment variables, command-line flags. Flags are applied by the
//! caller after [`load`] returns.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use hl_core::{ApplyPolicy, SubjectId};
use hl_gemini::{DEFAULT_BASE_URL, DEFAULT_MODEL, GeminiConfig};
use hl_store::{RealtimeConfig, StoreConfig};
use hl_sync::PresenceOptions;
use serde::{Deserialize, Serialize};

/// Env var naming the config file.
pub const CONFIG_ENV: &str = "HEARTLINK_CONFIG";

const REDACTED: &str = "[REDACTED]";

/// Effective configuration of one process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HeartlinkConfig {
    pub subject_id: SubjectId,
    pub store: StoreConfig,
    pub realtime: RealtimeConfig,
    pub reporter: ReporterConfig,
    pub presence: PresenceConfig,
    pub safety: SafetyConfig,
    pub logging: LoggingConfig,
}

/// Where the reporter takes positions from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Gpsd,
    Replay,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReporterConfig {
    pub source: SourceKind,
    pub gpsd_addr: String,
    pub replay_path: Option<PathBuf>,
    pub replay_interval_ms: u64,
    pub replay_repeat: bool,
    pub high_accuracy: bool,
    /// Report a capture timeout after this long without a fix. `0` disables.
    pub capture_timeout_ms: u64,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::Gpsd,
            gpsd_addr: hl_sync::position::DEFAULT_GPSD_ADDR.to_string(),
            replay_path: None,
            replay_interval_ms: 1_000,
            replay_repeat: false,
            high_accuracy: true,
            capture_timeout_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    pub apply_policy: ApplyPolicy,
    /// Periodic re-read interval. `0` disables.
    pub resync_interval_secs: u64,
    /// Age after which a position is shown as stale.
    pub stale_after_secs: u64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            apply_policy: ApplyPolicy::LastArrival,
            resync_interval_secs: 0,
            stale_after_secs: 300,
        }
    }
}

impl PresenceConfig {
    #[must_use]
    pub fn options(&self) -> PresenceOptions {
        let options = PresenceOptions::default().with_policy(self.apply_policy);
        if self.resync_interval_secs == 0 {
            options
        } else {
            options.with_resync_interval(Duration::from_secs(self.resync_interval_secs))
        }
    }

    #[must_use]
    pub const fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    /// Client-side limit on one annotation. `0` waits for the HTTP timeout.
    pub timeout_ms: u64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_ms: 15_000,
        }
    }
}

impl SafetyConfig {
    /// Gemini settings, or `None` when no API key is configured.
    #[must_use]
    pub fn gemini(&self) -> Option<GeminiConfig> {
        let key = self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())?;
        Some(
            GeminiConfig::new(key)
                .with_base_url(self.base_url.clone())
                .with_model(self.model.clone()),
        )
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            filter: "info".to_string(),
        }
    }
}

impl HeartlinkConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    ///
    /// # Errors
    /// Fails on invalid TOML, unknown top-level keys or invalid values.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid configuration")
    }

    /// Overlay environment variables read through `env`.
    ///
    /// `HEARTLINK_*` names win over the hosted-product names
    /// (`SUPABASE_URL`, `SUPABASE_ANON_KEY`, `API_KEY`).
    ///
    /// # Errors
    /// Fails when `HEARTLINK_SUBJECT_ID` is not a valid subject id.
    pub fn apply_env(&mut self, env: &impl Fn(&str) -> Option<String>) -> Result<()> {
        let first = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| env(name).filter(|v| !v.trim().is_empty()))
        };

        if let Some(subject) = first(&["HEARTLINK_SUBJECT_ID"]) {
            self.subject_id = SubjectId::parse(subject.trim())
                .context("HEARTLINK_SUBJECT_ID is not a valid subject id")?;
        }
        if let Some(url) = first(&["HEARTLINK_STORE_URL", "SUPABASE_URL"]) {
            self.store.url = Some(url);
        }
        if let Some(key) = first(&["HEARTLINK_STORE_ANON_KEY", "SUPABASE_ANON_KEY"]) {
            self.store.anon_key = Some(key);
        }
        if let Some(key) = first(&["HEARTLINK_GEMINI_API_KEY", "API_KEY"]) {
            self.safety.api_key = Some(key);
        }
        Ok(())
    }

    /// Copy safe to print: keys are masked.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mask = |v: &Option<String>| v.as_ref().map(|_| REDACTED.to_string());
        let mut copy = self.clone();
        copy.store.anon_key = mask(&self.store.anon_key);
        copy.safety.api_key = mask(&self.safety.api_key);
        copy
    }

    /// Render as TOML.
    ///
    /// # Errors
    /// Fails only if a value cannot be represented in TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to render configuration")
    }
}

/// Default config file location: `<config_dir>/heartlink/config.toml`.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("heartlink").join("config.toml"))
}

/// Resolve which config file to read.
///
/// An explicit path or `$HEARTLINK_CONFIG` must exist; the default location
/// is used only when present.
///
/// # Errors
/// Fails when an explicitly named file does not exist.
pub fn resolve_config_path(
    explicit: Option<&Path>,
    env: &impl Fn(&str) -> Option<String>,
    default: Option<PathBuf>,
) -> Result<Option<PathBuf>> {
    let named = explicit
        .map(Path::to_path_buf)
        .or_else(|| env(CONFIG_ENV).filter(|v| !v.trim().is_empty()).map(PathBuf::from));
    if let Some(path) = named {
        if !path.is_file() {
            bail!("config file {} does not exist", path.display());
        }
        return Ok(Some(path));
    }
    Ok(default.filter(|p| p.is_file()))
}

/// Load defaults, then the config file, then the environment.
///
/// # Errors
/// Fails when a named config file is missing or unreadable, the file is
/// invalid, or an environment value is invalid.
pub fn load(
    explicit: Option<&Path>,
    env: &impl Fn(&str) -> Option<String>,
    default: Option<PathBuf>,
) -> Result<(HeartlinkConfig, Option<PathBuf>)> {
    let path = resolve_config_path(explicit, env, default)?;
    let mut config = match &path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            HeartlinkConfig::from_toml(&text)
                .with_context(|| format!("in config file {}", path.display()))?
        }
        None => HeartlinkConfig::default(),
    };
    config.apply_env(env)?;
    Ok((config, path))
}
