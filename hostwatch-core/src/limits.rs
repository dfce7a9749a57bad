//! Threshold configuration: per-field limit sets and per-plugin settings.
//!
//! Limits are written glances-style, one flat key per setting:
//!
//! ```text
//! history_size = 1200
//! cpu_total_careful = 50
//! cpu_total_warning = 70
//! cpu_total_critical = 90
//! cpu_total_log = true
//! cpu_steal_disable = true
//! ```
//!
//! [`PluginLimits::from_entries`] parses and validates such keys so a
//! malformed threshold is rejected at load time, never during evaluation.

use std::collections::BTreeMap;

use hostwatch_types::Severity;
use serde::Deserialize;
use serde_json::{json, Map, Value as JsonValue};

use crate::error::ConfigError;

/// Default number of history samples kept per field.
pub const DEFAULT_HISTORY_SIZE: usize = 1200;

/// Thresholds for one monitored field.
///
/// All thresholds are "exceeds-above": a value reaches a tier when it is
/// greater than or equal to that tier's threshold.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LimitSet {
    pub careful: Option<f64>,
    pub warning: Option<f64>,
    pub critical: Option<f64>,
    /// Suppress evaluation of this field.
    pub disabled: bool,
    /// Write alert transitions for this field to the log.
    pub log: bool,
}

impl LimitSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn careful(mut self, value: f64) -> Self {
        self.careful = Some(value);
        self
    }

    pub fn warning(mut self, value: f64) -> Self {
        self.warning = Some(value);
        self
    }

    pub fn critical(mut self, value: f64) -> Self {
        self.critical = Some(value);
        self
    }

    pub fn log(mut self, log: bool) -> Self {
        self.log = log;
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Threshold configured for a tier.
    pub fn threshold(&self, tier: Severity) -> Option<f64> {
        match tier {
            Severity::Ok => None,
            Severity::Careful => self.careful,
            Severity::Warning => self.warning,
            Severity::Critical => self.critical,
        }
    }

    /// True if at least one tier is configured.
    pub fn is_configured(&self) -> bool {
        Severity::TIERS.iter().any(|t| self.threshold(*t).is_some())
    }

    /// The lowest configured threshold; falling below it ends an alert.
    pub fn lowest(&self) -> Option<f64> {
        Severity::TIERS.iter().find_map(|t| self.threshold(*t))
    }

    /// Highest tier reached by `value`, checking tiers from critical down.
    pub fn classify(&self, value: f64) -> Severity {
        Severity::TIERS
            .iter()
            .rev()
            .copied()
            .find(|tier| self.threshold(*tier).is_some_and(|t| value >= t))
            .unwrap_or(Severity::Ok)
    }

    fn validate(&self, plugin: &str, field: &str) -> Result<(), ConfigError> {
        let configured: Vec<f64> = Severity::TIERS
            .iter()
            .filter_map(|t| self.threshold(*t))
            .collect();

        if let Some(bad) = configured.iter().find(|v| !v.is_finite()) {
            return Err(ConfigError::NotANumber {
                plugin: plugin.to_string(),
                key: format!("{}_{}", plugin, field),
                value: bad.to_string(),
            });
        }

        if configured.windows(2).any(|w| w[0] > w[1]) {
            return Err(ConfigError::UnorderedThresholds {
                plugin: plugin.to_string(),
                field: field.to_string(),
            });
        }
        Ok(())
    }
}

/// A raw configuration value, before validation.
///
/// Environment overrides arrive as strings, so numbers and booleans are
/// also accepted in text form.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawLimit {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl RawLimit {
    fn as_number(&self) -> Option<f64> {
        match self {
            RawLimit::Number(n) => Some(*n),
            RawLimit::Text(s) => s.trim().parse().ok(),
            RawLimit::Bool(_) => None,
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match self {
            RawLimit::Bool(b) => Some(*b),
            RawLimit::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            RawLimit::Number(_) => None,
        }
    }

    fn display(&self) -> String {
        match self {
            RawLimit::Bool(b) => b.to_string(),
            RawLimit::Number(n) => n.to_string(),
            RawLimit::Text(s) => s.clone(),
        }
    }
}

impl From<f64> for RawLimit {
    fn from(v: f64) -> Self {
        RawLimit::Number(v)
    }
}

impl From<bool> for RawLimit {
    fn from(v: bool) -> Self {
        RawLimit::Bool(v)
    }
}

impl From<&str> for RawLimit {
    fn from(v: &str) -> Self {
        RawLimit::Text(v.to_string())
    }
}

/// Per-plugin configuration: history depth, plugin switch and field limits.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginLimits {
    /// Samples kept per field; 0 disables history for the plugin.
    pub history_size: usize,
    /// Suppress threshold evaluation for the whole plugin.
    pub disabled: bool,
    fields: BTreeMap<String, LimitSet>,
}

impl Default for PluginLimits {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SIZE)
    }
}

impl PluginLimits {
    pub fn new(history_size: usize) -> Self {
        Self {
            history_size,
            disabled: false,
            fields: BTreeMap::new(),
        }
    }

    /// Add limits for a field.
    pub fn with_field(mut self, field: impl Into<String>, limits: LimitSet) -> Self {
        self.fields.insert(field.into(), limits);
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn field(&self, field: &str) -> Option<&LimitSet> {
        self.fields.get(field)
    }

    /// Configured fields, sorted by name.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &LimitSet)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Parse glances-style limit keys for `plugin`.
    ///
    /// `history_size` and `disable` configure the plugin itself; every other
    /// key must be `<plugin>_<field>_<suffix>` where the suffix is one of
    /// `careful`, `warning`, `critical`, `log` or `disable`.
    pub fn from_entries<I, K>(
        plugin: &str,
        default_history_size: usize,
        entries: I,
    ) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, RawLimit)>,
        K: AsRef<str>,
    {
        let mut limits = PluginLimits::new(default_history_size);

        for (key, raw) in entries {
            let key = key.as_ref();
            match key {
                "history_size" => {
                    limits.history_size = raw
                        .as_number()
                        .filter(|n| n.is_finite() && *n >= 0.0 && n.fract() == 0.0)
                        .map(|n| n as usize)
                        .ok_or_else(|| ConfigError::InvalidHistorySize {
                            plugin: plugin.to_string(),
                            value: raw.display(),
                        })?;
                }
                "disable" => limits.disabled = parse_bool(plugin, key, &raw)?,
                _ => limits.apply_field_key(plugin, key, &raw)?,
            }
        }

        limits.validate(plugin)?;
        Ok(limits)
    }

    fn apply_field_key(&mut self, plugin: &str, key: &str, raw: &RawLimit) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey {
            plugin: plugin.to_string(),
            key: key.to_string(),
        };

        let rest = key
            .strip_prefix(plugin)
            .and_then(|r| r.strip_prefix('_'))
            .ok_or_else(unknown)?;
        if rest == "disable" {
            self.disabled = parse_bool(plugin, key, raw)?;
            return Ok(());
        }

        let (field, suffix) = rest
            .rsplit_once('_')
            .filter(|(field, _)| !field.is_empty())
            .ok_or_else(unknown)?;
        let set = self.fields.entry(field.to_string()).or_default();
        match suffix {
            "careful" => set.careful = Some(parse_number(plugin, key, raw)?),
            "warning" => set.warning = Some(parse_number(plugin, key, raw)?),
            "critical" => set.critical = Some(parse_number(plugin, key, raw)?),
            "log" => set.log = parse_bool(plugin, key, raw)?,
            "disable" => set.disabled = parse_bool(plugin, key, raw)?,
            _ => return Err(unknown()),
        }
        Ok(())
    }

    /// Check tier ordering for every field.
    pub fn validate(&self, plugin: &str) -> Result<(), ConfigError> {
        self.fields
            .iter()
            .try_for_each(|(field, set)| set.validate(plugin, field))
    }

    /// Flat key/value view, in the same key format the configuration uses.
    pub fn to_json(&self, plugin: &str) -> Map<String, JsonValue> {
        let mut map = Map::new();
        map.insert("history_size".to_string(), json!(self.history_size));
        if self.disabled {
            map.insert(format!("{}_disable", plugin), json!(true));
        }

        for (field, set) in &self.fields {
            for tier in Severity::TIERS {
                if let Some(threshold) = set.threshold(tier) {
                    map.insert(
                        format!("{}_{}_{}", plugin, field, tier.limit_suffix()),
                        json!(threshold),
                    );
                }
            }
            if set.log {
                map.insert(format!("{}_{}_log", plugin, field), json!(true));
            }
            if set.disabled {
                map.insert(format!("{}_{}_disable", plugin, field), json!(true));
            }
        }
        map
    }
}

fn parse_number(plugin: &str, key: &str, raw: &RawLimit) -> Result<f64, ConfigError> {
    raw.as_number()
        .filter(|n| n.is_finite())
        .ok_or_else(|| ConfigError::NotANumber {
            plugin: plugin.to_string(),
            key: key.to_string(),
            value: raw.display(),
        })
}

fn parse_bool(plugin: &str, key: &str, raw: &RawLimit) -> Result<bool, ConfigError> {
    raw.as_bool().ok_or_else(|| ConfigError::NotABool {
        plugin: plugin.to_string(),
        key: key.to_string(),
        value: raw.display(),
    })
}
