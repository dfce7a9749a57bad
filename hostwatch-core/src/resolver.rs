//! Read projections over the registry, history and alert log.
//!
//! Every operation returns a `serde_json::Value` ready for the transport
//! layer. Nothing here mutates state.

use hostwatch_types::{PluginSchema, Shape, Snapshot};
use serde_json::{json, Map, Value as JsonValue};

use crate::error::QueryError;
use crate::extract::lookup;
use crate::registry::StatsRegistry;
use crate::route::Route;

/// A resolver request: plugin plus optional field, value filter and
/// history depth.
///
/// ```
/// use hostwatch_core::Query;
///
/// let q = Query::plugin("fs").field("mnt_point").value("/");
/// assert_eq!(q.value.as_deref(), Some("/"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub plugin: String,
    pub field: Option<String>,
    pub value: Option<String>,
    pub history: bool,
    pub limit: Option<usize>,
}

impl Query {
    pub fn plugin(plugin: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            ..Self::default()
        }
    }

    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Ask for history, optionally only the most recent `limit` samples.
    pub fn history(mut self, limit: Option<usize>) -> Self {
        self.history = true;
        self.limit = limit;
        self
    }
}

/// Stateless query layer over a [`StatsRegistry`].
#[derive(Debug, Clone, Copy)]
pub struct QueryResolver<'a> {
    registry: &'a StatsRegistry,
}

impl<'a> QueryResolver<'a> {
    pub fn new(registry: &'a StatsRegistry) -> Self {
        Self { registry }
    }

    /// Registered plugin names, in registration order.
    pub fn list_plugins(&self) -> Vec<String> {
        self.registry.list_plugins().to_vec()
    }

    /// Resolve a [`Query`].
    pub fn resolve(&self, query: &Query) -> Result<JsonValue, QueryError> {
        match (&query.field, &query.value, query.history) {
            (field, None, true) => self.history(&query.plugin, field.as_deref(), query.limit),
            (_, Some(_), true) => Err(QueryError::not_found("history of a value filter")),
            (Some(field), Some(value), false) => self.value(&query.plugin, field, value),
            (None, Some(_), false) => Err(QueryError::not_found("value filter without a field")),
            (Some(field), None, false) => self.field(&query.plugin, field),
            (None, None, false) => self.plugin(&query.plugin),
        }
    }

    /// Resolve a parsed path.
    ///
    /// `status` resolves to `null`; the transport answers it without a body.
    pub fn route(&self, route: &Route) -> Result<JsonValue, QueryError> {
        match route {
            Route::PluginsList => Ok(json!(self.list_plugins())),
            Route::All => self.all(),
            Route::AllLimits => self.limits(None),
            Route::Status => Ok(JsonValue::Null),
            Route::Alerts => self.alerts(),
            Route::Plugin(plugin) => self.plugin(plugin),
            Route::Limits(plugin) => self.limits(Some(plugin)),
            Route::History {
                plugin,
                field,
                limit,
            } => self.history(plugin, field.as_deref(), *limit),
            Route::Field { plugin, field } => self.field(plugin, field),
            Route::Value {
                plugin,
                field,
                value,
            } => self.value(plugin, field, value),
        }
    }

    /// The full current snapshot, as stored.
    pub fn plugin(&self, plugin: &str) -> Result<JsonValue, QueryError> {
        let published = self.registry.read(plugin)?;
        Ok(serde_json::to_value(&*published.snapshot)?)
    }

    /// Project one field: `{field: value}` for scalar and single plugins,
    /// `{field: [value per item]}` for keyed lists.
    pub fn field(&self, plugin: &str, field: &str) -> Result<JsonValue, QueryError> {
        let schema = self.schema(plugin)?;
        if !is_declared(schema, field) {
            return Err(QueryError::not_found(format_args!("{}/{}", plugin, field)));
        }

        let published = self.registry.read(plugin)?;
        let projected = match &*published.snapshot {
            Snapshot::Scalar(value) => serde_json::to_value(value)?,
            Snapshot::Single(record) => {
                let value = lookup(record, field)
                    .ok_or_else(|| QueryError::not_found(format_args!("{}/{}", plugin, field)))?;
                serde_json::to_value(value)?
            }
            Snapshot::KeyedList { items, .. } => {
                let values = items
                    .iter()
                    .map(|item| lookup(item, field).map_or(Ok(JsonValue::Null), serde_json::to_value))
                    .collect::<Result<Vec<_>, _>>()?;
                JsonValue::Array(values)
            }
        };
        Ok(single_entry(field, projected))
    }

    /// Items of a keyed list whose `field` matches `value`, as
    /// `{value: [items]}`. No match is an empty list, not an error.
    pub fn value(&self, plugin: &str, field: &str, value: &str) -> Result<JsonValue, QueryError> {
        let schema = self.schema(plugin)?;
        if schema.shape != Shape::KeyedList || !is_declared(schema, field) {
            return Err(QueryError::not_found(format_args!(
                "{}/{}/{}",
                plugin, field, value
            )));
        }

        let published = self.registry.read(plugin)?;
        let Snapshot::KeyedList { items, .. } = &*published.snapshot else {
            return Err(QueryError::not_found(plugin));
        };
        let matching: Vec<_> = items
            .iter()
            .filter(|item| lookup(item, field).is_some_and(|v| v.matches_text(value)))
            .collect();
        Ok(single_entry(value, serde_json::to_value(matching)?))
    }

    /// Recorded history as `{field: [[timestamp, value], ...]}`.
    ///
    /// NotFound when the plugin keeps no history or the field is not
    /// declared; a declared field without samples yields an empty series.
    pub fn history(
        &self,
        plugin: &str,
        field: Option<&str>,
        limit: Option<usize>,
    ) -> Result<JsonValue, QueryError> {
        let schema = self.schema(plugin)?;
        let history = self.registry.history();
        if !history.is_enabled(plugin) {
            return Err(QueryError::not_found(format_args!("{}/history", plugin)));
        }

        let Some(field) = field else {
            return Ok(serde_json::to_value(history.query(plugin, None, limit))?);
        };
        if !is_declared(schema, field) {
            return Err(QueryError::not_found(format_args!(
                "{}/{}/history",
                plugin, field
            )));
        }

        // Scalar series are recorded under the plugin name.
        let series_name = match schema.shape {
            Shape::Scalar => plugin,
            Shape::Single | Shape::KeyedList => field,
        };
        let series = history
            .query(plugin, Some(series_name), limit)
            .remove(series_name)
            .unwrap_or_default();
        Ok(single_entry(field, serde_json::to_value(series)?))
    }

    /// Limits of one plugin as flat configuration keys, or of every plugin
    /// keyed by name.
    pub fn limits(&self, plugin: Option<&str>) -> Result<JsonValue, QueryError> {
        let engine = self.registry.engine();
        match plugin {
            Some(plugin) => {
                self.schema(plugin)?;
                let limits = engine.limits(plugin).unwrap_or_default();
                Ok(JsonValue::Object(limits.to_json(plugin)))
            }
            None => {
                let all: Map<String, JsonValue> = self
                    .registry
                    .list_plugins()
                    .iter()
                    .map(|name| {
                        let limits = engine.limits(name).unwrap_or_default();
                        (name.clone(), JsonValue::Object(limits.to_json(name)))
                    })
                    .collect();
                Ok(JsonValue::Object(all))
            }
        }
    }

    /// Every plugin's current snapshot, keyed by name; `null` for plugins
    /// without data yet.
    ///
    /// Materializes and encodes every snapshot on each call. Meant for
    /// diagnostics, not for polling.
    pub fn all(&self) -> Result<JsonValue, QueryError> {
        let mut all = Map::new();
        for name in self.registry.list_plugins() {
            let value = match self.registry.read(name) {
                Ok(published) => serde_json::to_value(&*published.snapshot)?,
                Err(QueryError::Unavailable(_)) => JsonValue::Null,
                Err(e) => return Err(e),
            };
            all.insert(name.clone(), value);
        }
        Ok(JsonValue::Object(all))
    }

    /// The alert log, oldest first.
    pub fn alerts(&self) -> Result<JsonValue, QueryError> {
        Ok(serde_json::to_value(self.registry.engine().current_alerts())?)
    }

    /// Whether the plugin's latest collection failed and its current
    /// snapshot is the retained previous one.
    pub fn is_stale(&self, plugin: &str) -> bool {
        self.registry.read(plugin).is_ok_and(|published| published.stale)
    }

    /// Worst active alert severity.
    pub fn status(&self) -> JsonValue {
        json!({ "alert": self.registry.engine().global_status() })
    }

    fn schema(&self, plugin: &str) -> Result<&'a PluginSchema, QueryError> {
        self.registry
            .schema(plugin)
            .ok_or_else(|| QueryError::not_found(plugin))
    }
}

/// Whether `field` is addressable: declared, the child of a declared map,
/// or the plugin name itself for scalars.
fn is_declared(schema: &PluginSchema, field: &str) -> bool {
    match schema.shape {
        Shape::Scalar => field == schema.name || schema.has_field(field),
        Shape::Single | Shape::KeyedList => {
            schema.has_field(field)
                || field
                    .split_once('.')
                    .is_some_and(|(parent, _)| schema.has_field(parent))
        }
    }
}

fn single_entry(key: &str, value: JsonValue) -> JsonValue {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    JsonValue::Object(map)
}
