//! Path grammar for queries.
//!
//! ```text
//! pluginslist                     plugin names
//! all                             every plugin's snapshot
//! all/limits                      every plugin's limits
//! status                          liveness
//! alert                           alert log
//! <plugin>                        snapshot
//! <plugin>/limits                 limits
//! <plugin>/history[/<N>]          all series
//! <plugin>/<field>                field projection
//! <plugin>/<field>/history[/<N>]  one series
//! <plugin>/<field>/<value>        items whose field matches value
//! ```

use std::fmt;

use crate::error::QueryError;

/// A parsed query path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    PluginsList,
    All,
    AllLimits,
    Status,
    Alerts,
    Plugin(String),
    Limits(String),
    History {
        plugin: String,
        field: Option<String>,
        limit: Option<usize>,
    },
    Field {
        plugin: String,
        field: String,
    },
    Value {
        plugin: String,
        field: String,
        value: String,
    },
}

impl Route {
    /// Parse a path.
    ///
    /// A leading slash and empty trailing segments are ignored. The value
    /// segment is taken verbatim and may contain slashes, so
    /// `fs/mnt_point//` addresses the item mounted at `/`.
    pub fn parse(path: &str) -> Result<Route, QueryError> {
        let path = path.trim();
        let path = path.strip_prefix('/').unwrap_or(path);
        if path.is_empty() {
            return Err(QueryError::not_found("empty path"));
        }

        let mut parts = path.splitn(3, '/');
        let plugin = parts.next().unwrap_or_default();
        let second = parts.next().filter(|s| !s.is_empty());
        let rest = parts.next().filter(|s| !s.is_empty());

        let route = match (plugin, second, rest) {
            ("pluginslist", None, None) => Route::PluginsList,
            ("all", None, None) => Route::All,
            ("all", Some("limits"), None) => Route::AllLimits,
            ("status", None, None) => Route::Status,
            ("alert", None, None) => Route::Alerts,
            (plugin, None, None) => Route::Plugin(plugin.to_string()),
            (plugin, Some("limits"), None) => Route::Limits(plugin.to_string()),
            (plugin, Some("history"), limit) => Route::History {
                plugin: plugin.to_string(),
                field: None,
                limit: parse_limit(path, limit)?,
            },
            (plugin, Some(field), None) => Route::Field {
                plugin: plugin.to_string(),
                field: field.to_string(),
            },
            (plugin, Some(field), Some(rest)) => match rest.split_once('/') {
                Some(("history", limit)) => Route::History {
                    plugin: plugin.to_string(),
                    field: Some(field.to_string()),
                    limit: parse_limit(path, Some(limit))?,
                },
                None if rest == "history" => Route::History {
                    plugin: plugin.to_string(),
                    field: Some(field.to_string()),
                    limit: None,
                },
                _ => Route::Value {
                    plugin: plugin.to_string(),
                    field: field.to_string(),
                    value: trim_value(rest).to_string(),
                },
            },
            (_, None, Some(_)) => return Err(QueryError::not_found(path)),
        };

        if route.plugin().is_some_and(str::is_empty) {
            return Err(QueryError::not_found(path));
        }
        Ok(route)
    }

    /// Plugin addressed by the route, if any.
    pub fn plugin(&self) -> Option<&str> {
        match self {
            Route::Plugin(plugin) | Route::Limits(plugin) => Some(plugin),
            Route::History { plugin, .. }
            | Route::Field { plugin, .. }
            | Route::Value { plugin, .. } => Some(plugin),
            _ => None,
        }
    }
}

/// Drop one trailing slash, except from a value that is only `/`.
fn trim_value(value: &str) -> &str {
    match value.strip_suffix('/') {
        Some(trimmed) if !trimmed.is_empty() => trimmed,
        _ => value,
    }
}

fn parse_limit(path: &str, segment: Option<&str>) -> Result<Option<usize>, QueryError> {
    match segment.map(|s| s.trim_end_matches('/')) {
        None | Some("") => Ok(None),
        Some(n) => n
            .parse()
            .map(Some)
            .map_err(|_| QueryError::not_found(path)),
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::PluginsList => f.write_str("pluginslist"),
            Route::All => f.write_str("all"),
            Route::AllLimits => f.write_str("all/limits"),
            Route::Status => f.write_str("status"),
            Route::Alerts => f.write_str("alert"),
            Route::Plugin(plugin) => f.write_str(plugin),
            Route::Limits(plugin) => write!(f, "{}/limits", plugin),
            Route::History {
                plugin,
                field,
                limit,
            } => {
                f.write_str(plugin)?;
                if let Some(field) = field {
                    write!(f, "/{}", field)?;
                }
                f.write_str("/history")?;
                if let Some(limit) = limit {
                    write!(f, "/{}", limit)?;
                }
                Ok(())
            }
            Route::Field { plugin, field } => write!(f, "{}/{}", plugin, field),
            Route::Value {
                plugin,
                field,
                value,
            } => write!(f, "{}/{}/{}", plugin, field, value),
        }
    }
}
