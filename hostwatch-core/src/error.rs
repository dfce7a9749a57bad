//! Error types for the registry, configuration and query layers.

use hostwatch_types::SchemaError;
use thiserror::Error;

/// Errors returned by [`StatsRegistry::publish`](crate::StatsRegistry::publish).
#[derive(Debug, Error)]
pub enum PublishError {
    /// The plugin was never registered.
    #[error("unknown plugin: {0}")]
    UnknownPlugin(String),

    /// The snapshot does not conform to the plugin's schema.
    #[error("snapshot for {plugin} rejected: {source}")]
    Schema {
        plugin: String,
        #[source]
        source: SchemaError,
    },

    /// The registry has been closed for shutdown.
    #[error("registry is closed")]
    Closed,
}

/// Errors detected while loading plugin and limit configuration.
///
/// These are raised at load time so evaluation can assume validated input.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// A threshold value is not a finite number.
    #[error("{plugin}: {key} is not a number: {value}")]
    NotANumber {
        plugin: String,
        key: String,
        value: String,
    },

    /// A flag value is not a boolean.
    #[error("{plugin}: {key} is not a boolean: {value}")]
    NotABool {
        plugin: String,
        key: String,
        value: String,
    },

    /// `history_size` is not a non-negative integer.
    #[error("{plugin}: invalid history_size: {value}")]
    InvalidHistorySize { plugin: String, value: String },

    /// The key does not follow `<plugin>_<field>_<tier|log|disable>`.
    #[error("{plugin}: unknown limit key: {key}")]
    UnknownKey { plugin: String, key: String },

    /// Tiers are configured out of order.
    #[error("{plugin}.{field}: thresholds must satisfy careful <= warning <= critical")]
    UnorderedThresholds { plugin: String, field: String },

    /// A limit targets a field the plugin does not declare.
    #[error("{plugin}: limit on undeclared field: {field}")]
    UnknownField { plugin: String, field: String },

    #[error("invalid schema for {plugin}: {source}")]
    Schema {
        plugin: String,
        #[source]
        source: SchemaError,
    },

    #[error("limits for unregistered plugin: {0}")]
    UnknownPlugin(String),

    #[error("plugin registered twice: {0}")]
    DuplicatePlugin(String),

    /// The plugin name collides with a top-level route.
    #[error("plugin name is reserved: {0}")]
    ReservedPlugin(String),
}

/// Errors returned by the query resolver.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Unknown plugin, unknown field, or a history request on a plugin
    /// that does not keep history.
    #[error("not found: {0}")]
    NotFound(String),

    /// The plugin is registered but has not completed a first cycle.
    #[error("no data available yet for plugin {0}")]
    Unavailable(String),

    #[error("failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),
}

impl QueryError {
    pub(crate) fn not_found(what: impl std::fmt::Display) -> Self {
        QueryError::NotFound(what.to_string())
    }
}
