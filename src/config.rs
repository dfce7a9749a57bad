//! Agent configuration.
//!
//! Loaded from a TOML file with `HOSTWATCH_` environment overrides, using
//! `__` to separate nested keys:
//!
//! ```toml
//! refresh = 2
//! history_size = 1200
//! listen = "127.0.0.1:61209"
//!
//! [plugins.fs]
//! shape = "keyed_list"
//! key = "mnt_point"
//! source = "/run/hostwatch/fs.json"
//! fields = [
//!     { name = "mnt_point", kind = "text" },
//!     { name = "percent", kind = "number" },
//! ]
//! fs_percent_careful = 50
//! fs_percent_warning = 70
//! fs_percent_critical = 90
//! ```
//!
//! `HOSTWATCH_PLUGINS__FS__FS_PERCENT_WARNING=75` overrides one threshold.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use hostwatch_core::{
    ConfigError, PluginLimits, RawLimit, StatsRegistry, DEFAULT_HISTORY_SIZE, DEFAULT_MAX_ALERTS,
};
use hostwatch_types::{FieldSpec, PluginSchema, Shape};
use serde::Deserialize;

fn default_refresh() -> u64 {
    2
}

fn default_history_size() -> usize {
    DEFAULT_HISTORY_SIZE
}

fn default_max_alerts() -> usize {
    DEFAULT_MAX_ALERTS
}

/// Top-level agent settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Collection interval in seconds.
    #[serde(default = "default_refresh")]
    pub refresh: u64,

    /// History depth for plugins that do not set their own.
    #[serde(default = "default_history_size")]
    pub history_size: usize,

    /// Alert records retained.
    #[serde(default = "default_max_alerts")]
    pub max_alerts: usize,

    /// Query server address (host:port).
    #[serde(default)]
    pub listen: Option<String>,

    #[serde(default)]
    pub plugins: BTreeMap<String, PluginConfig>,
}

/// One `[plugins.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginConfig {
    pub shape: Shape,

    /// Key field, keyed lists only.
    #[serde(default)]
    pub key: Option<String>,

    #[serde(default)]
    pub fields: Vec<FieldSpec>,

    /// JSON document holding the plugin's latest snapshot.
    #[serde(default)]
    pub source: Option<PathBuf>,

    /// `history_size`, `disable` and `<plugin>_<field>_<suffix>` keys.
    #[serde(flatten)]
    pub limits: BTreeMap<String, RawLimit>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            refresh: default_refresh(),
            history_size: default_history_size(),
            max_alerts: default_max_alerts(),
            listen: None,
            plugins: BTreeMap::new(),
        }
    }
}

impl AgentConfig {
    /// Load the configuration file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path))
            .add_source(
                Environment::with_prefix("HOSTWATCH")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("Failed to load config from {}", path.display()))?;

        config
            .try_deserialize()
            .with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Schema declared by a plugin section.
    pub fn schema(name: &str, plugin: &PluginConfig) -> PluginSchema {
        PluginSchema {
            name: name.to_string(),
            shape: plugin.shape,
            key: plugin.key.clone(),
            fields: plugin.fields.clone(),
        }
    }

    /// Validate every plugin section and build the registry.
    pub fn registry(&self) -> Result<StatsRegistry, ConfigError> {
        let mut builder = StatsRegistry::builder().max_alerts(self.max_alerts);
        for (name, plugin) in &self.plugins {
            let limits = PluginLimits::from_entries(name, self.history_size, plugin.limits.clone())?;
            builder = builder.plugin(Self::schema(name, plugin), limits);
        }
        builder.build()
    }
}
