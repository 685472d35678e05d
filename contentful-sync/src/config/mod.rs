//! Sync configuration with builder pattern
//!
//! Values come from `config.toml` in the user config directory, then
//! `CONTENTFUL_SYNC_*` environment variables, then command line flags.

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::api::locale::DEFAULT_LOCALE;
use crate::api::metadata::ContentTypes;
use crate::graph::BuildOptions;

/// Operations per batch when nothing else is configured
pub const DEFAULT_RATE_LIMIT: usize = 4;

const ENV_LOCALE: &str = "CONTENTFUL_SYNC_LOCALE";
const ENV_DEFAULT_LOCALE: &str = "CONTENTFUL_SYNC_DEFAULT_LOCALE";
const ENV_RATE_LIMIT: &str = "CONTENTFUL_SYNC_RATE_LIMIT";
const ENV_SHOULD_DELETE: &str = "CONTENTFUL_SYNC_SHOULD_DELETE";

/// How operations are replayed against the Management API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum operations in flight at once
    pub rate_limit: usize,
    /// Execute dereference operations as deletes
    pub should_delete: bool,
    /// Run creates and updates level by level, children first
    pub respect_dependencies: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            rate_limit: DEFAULT_RATE_LIMIT,
            should_delete: false,
            respect_dependencies: false,
        }
    }
}

impl BatchConfig {
    /// Batch size actually used; zero would never make progress
    pub fn batch_size(&self) -> usize {
        self.rate_limit.max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Locale the in-memory entries are expressed in
    pub locale: String,
    /// Locale non-localized fields are stored under
    pub default_locale: String,
    pub batch: BatchConfig,
    /// Refuse to save when the remote root moved past the diffed version
    pub check_version: bool,
    /// Look up content types before diffing instead of relying on structure
    pub fetch_content_types: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            locale: DEFAULT_LOCALE.to_string(),
            default_locale: DEFAULT_LOCALE.to_string(),
            batch: BatchConfig::default(),
            check_version: true,
            fetch_content_types: false,
        }
    }
}

impl SyncConfig {
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::new()
    }

    /// Default location: `<config dir>/contentful-sync/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("contentful-sync").join("config.toml"))
    }

    /// Read the config file. A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) => path,
                None => {
                    warn!("No config directory on this platform, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: SyncConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Apply `CONTENTFUL_SYNC_*` overrides resolved through `lookup`
    pub fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(locale) = lookup(ENV_LOCALE) {
            self.locale = locale;
        }
        if let Some(locale) = lookup(ENV_DEFAULT_LOCALE) {
            self.default_locale = locale;
        }
        if let Some(raw) = lookup(ENV_RATE_LIMIT) {
            self.batch.rate_limit = raw
                .trim()
                .parse()
                .with_context(|| format!("{} must be a positive integer, got '{}'", ENV_RATE_LIMIT, raw))?;
        }
        if let Some(raw) = lookup(ENV_SHOULD_DELETE) {
            self.batch.should_delete = parse_flag(&raw)
                .with_context(|| format!("{} must be true or false, got '{}'", ENV_SHOULD_DELETE, raw))?;
        }
        Ok(self)
    }

    /// Apply overrides from the process environment
    pub fn with_env_overrides(self) -> Result<Self> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Options for the graph builder
    pub fn build_options(&self, content_types: ContentTypes) -> BuildOptions {
        BuildOptions::new(self.locale.clone())
            .with_default_locale(self.default_locale.clone())
            .with_content_types(content_types)
    }
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("not a boolean"),
    }
}

/// Builder for [`SyncConfig`]
#[derive(Debug, Clone, Default)]
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.config.locale = locale.into();
        self
    }

    pub fn default_locale(mut self, locale: impl Into<String>) -> Self {
        self.config.default_locale = locale.into();
        self
    }

    pub fn rate_limit(mut self, rate_limit: usize) -> Self {
        self.config.batch.rate_limit = rate_limit;
        self
    }

    pub fn should_delete(mut self, enabled: bool) -> Self {
        self.config.batch.should_delete = enabled;
        self
    }

    pub fn respect_dependencies(mut self, enabled: bool) -> Self {
        self.config.batch.respect_dependencies = enabled;
        self
    }

    pub fn check_version(mut self, enabled: bool) -> Self {
        self.config.check_version = enabled;
        self
    }

    pub fn fetch_content_types(mut self, enabled: bool) -> Self {
        self.config.fetch_content_types = enabled;
        self
    }

    pub fn build(self) -> SyncConfig {
        self.config
    }
}
