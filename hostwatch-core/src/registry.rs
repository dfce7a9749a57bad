//! The registry of current plugin snapshots.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Local;
use hostwatch_types::{PluginSchema, Shape, Snapshot};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::engine::{ThresholdEngine, DEFAULT_MAX_ALERTS};
use crate::error::{ConfigError, PublishError, QueryError};
use crate::history::{HistoryStore, Timestamp};
use crate::limits::PluginLimits;
use crate::process::ProcessLookup;

/// Plugin names that collide with top-level query routes.
pub const RESERVED_PLUGINS: [&str; 4] = ["all", "pluginslist", "status", "alert"];

/// A published snapshot as seen by readers.
#[derive(Debug, Clone)]
pub struct Published {
    pub snapshot: Arc<Snapshot>,
    pub published_at: Timestamp,
    /// Set when the latest collection failed and this is the previous
    /// snapshot, retained.
    pub stale: bool,
}

impl Published {
    pub fn shape(&self) -> Shape {
        self.snapshot.shape()
    }
}

#[derive(Debug)]
struct PluginSlot {
    schema: PluginSchema,
    current: RwLock<Option<Arc<Published>>>,
    /// Serializes publishes for this plugin.
    publish_lock: Mutex<()>,
}

/// Latest snapshot per plugin, plus the history and alert state derived
/// from them.
///
/// Publishing swaps an `Arc` under a short write lock, so readers holding
/// the previous snapshot are never affected and never see a partial one.
/// History and thresholds are applied before `publish` returns.
#[derive(Debug)]
pub struct StatsRegistry {
    order: Vec<String>,
    slots: HashMap<String, PluginSlot>,
    history: HistoryStore,
    engine: ThresholdEngine,
    closed: AtomicBool,
}

impl StatsRegistry {
    /// Start building a registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Publish a snapshot stamped with the current local time.
    pub fn publish(&self, plugin: &str, snapshot: Snapshot) -> Result<(), PublishError> {
        self.publish_at(plugin, snapshot, Local::now())
    }

    /// Publish a snapshot with an explicit timestamp.
    pub fn publish_at(
        &self,
        plugin: &str,
        snapshot: Snapshot,
        timestamp: Timestamp,
    ) -> Result<(), PublishError> {
        let slot = self
            .slots
            .get(plugin)
            .ok_or_else(|| PublishError::UnknownPlugin(plugin.to_string()))?;

        let _guard = slot.publish_lock.lock();
        if self.closed.load(Ordering::Acquire) {
            return Err(PublishError::Closed);
        }

        if let Err(source) = slot.schema.check(&snapshot) {
            warn!("Rejected snapshot for {}: {}", plugin, source);
            return Err(PublishError::Schema {
                plugin: plugin.to_string(),
                source,
            });
        }

        let published = Arc::new(Published {
            snapshot: Arc::new(snapshot),
            published_at: timestamp,
            stale: false,
        });
        *slot.current.write() = Some(published.clone());

        self.history.append(plugin, &published.snapshot, timestamp);
        self.engine.evaluate(plugin, &published.snapshot, timestamp);
        Ok(())
    }

    /// Record a failed collection: the previous snapshot stays readable but
    /// is flagged stale. Returns false when there was nothing to flag.
    pub fn mark_failed(&self, plugin: &str) -> bool {
        let Some(slot) = self.slots.get(plugin) else {
            return false;
        };
        let _guard = slot.publish_lock.lock();

        let mut current = slot.current.write();
        match current.as_ref() {
            Some(published) if !published.stale => {
                *current = Some(Arc::new(Published {
                    stale: true,
                    ..(**published).clone()
                }));
                debug!("Marked {} stale", plugin);
                true
            }
            _ => false,
        }
    }

    /// Latest snapshot of a plugin.
    pub fn read(&self, plugin: &str) -> Result<Arc<Published>, QueryError> {
        let slot = self
            .slots
            .get(plugin)
            .ok_or_else(|| QueryError::not_found(plugin))?;
        slot.current
            .read()
            .clone()
            .ok_or_else(|| QueryError::Unavailable(plugin.to_string()))
    }

    pub fn schema(&self, plugin: &str) -> Option<&PluginSchema> {
        self.slots.get(plugin).map(|s| &s.schema)
    }

    /// Registered plugins, in registration order.
    pub fn list_plugins(&self) -> &[String] {
        &self.order
    }

    pub fn contains(&self, plugin: &str) -> bool {
        self.slots.contains_key(plugin)
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn engine(&self) -> &ThresholdEngine {
        &self.engine
    }

    /// Replace a plugin's limits at runtime.
    ///
    /// Applies the new history size immediately. Alerts that are open stay
    /// open even if their field is now disabled.
    pub fn configure_limits(&self, plugin: &str, limits: PluginLimits) -> Result<(), ConfigError> {
        let slot = self
            .slots
            .get(plugin)
            .ok_or_else(|| ConfigError::UnknownPlugin(plugin.to_string()))?;
        check_limits(&slot.schema, &limits)?;
        self.history.configure(plugin, limits.history_size);
        self.engine.set_limits(plugin, limits);
        Ok(())
    }

    /// Reject further publishes, waiting for any publish in progress.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        for plugin in &self.order {
            if let Some(slot) = self.slots.get(plugin) {
                drop(slot.publish_lock.lock());
            }
        }
        info!("Stats registry closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Builder for [`StatsRegistry`]. Plugins are fixed once built.
#[derive(Debug)]
pub struct RegistryBuilder {
    plugins: Vec<(PluginSchema, PluginLimits)>,
    max_alerts: usize,
    lookup: Option<Arc<dyn ProcessLookup>>,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self {
            plugins: Vec::new(),
            max_alerts: DEFAULT_MAX_ALERTS,
            lookup: None,
        }
    }
}

impl RegistryBuilder {
    /// Register a plugin with its limits.
    pub fn plugin(mut self, schema: PluginSchema, limits: PluginLimits) -> Self {
        self.plugins.push((schema, limits));
        self
    }

    /// Maximum number of alert records retained.
    pub fn max_alerts(mut self, max_alerts: usize) -> Self {
        self.max_alerts = max_alerts;
        self
    }

    /// Attach process attribution for CPU and memory alerts.
    pub fn process_lookup(mut self, lookup: Arc<dyn ProcessLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Validate every schema and limit set, then build the registry.
    pub fn build(self) -> Result<StatsRegistry, ConfigError> {
        let mut engine = ThresholdEngine::new(self.max_alerts);
        if let Some(lookup) = self.lookup {
            engine = engine.with_process_lookup(lookup);
        }
        let history = HistoryStore::new();
        let mut order = Vec::with_capacity(self.plugins.len());
        let mut slots = HashMap::with_capacity(self.plugins.len());

        for (schema, limits) in self.plugins {
            let name = schema.name.clone();
            if RESERVED_PLUGINS.contains(&name.as_str()) {
                return Err(ConfigError::ReservedPlugin(name));
            }
            if slots.contains_key(&name) {
                return Err(ConfigError::DuplicatePlugin(name));
            }
            schema.validate().map_err(|source| ConfigError::Schema {
                plugin: name.clone(),
                source,
            })?;
            check_limits(&schema, &limits)?;

            history.configure(&name, limits.history_size);
            engine.set_limits(&name, limits);
            info!("Registered plugin {} ({})", name, schema.shape);

            order.push(name.clone());
            slots.insert(
                name,
                PluginSlot {
                    schema,
                    current: RwLock::new(None),
                    publish_lock: Mutex::new(()),
                },
            );
        }

        Ok(StatsRegistry {
            order,
            slots,
            history,
            engine,
            closed: AtomicBool::new(false),
        })
    }
}

/// Every limit must target a declared field (or a child of a declared
/// map field). Scalar plugins take limits under the plugin name.
fn check_limits(schema: &PluginSchema, limits: &PluginLimits) -> Result<(), ConfigError> {
    limits.validate(&schema.name)?;
    for (field, _) in limits.fields() {
        let declared = match schema.shape {
            Shape::Scalar => field == schema.name,
            Shape::Single | Shape::KeyedList => {
                schema.has_field(field)
                    || field
                        .split_once('.')
                        .is_some_and(|(parent, _)| schema.has_field(parent))
            }
        };
        if !declared {
            return Err(ConfigError::UnknownField {
                plugin: schema.name.clone(),
                field: field.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::LimitSet;
    use chrono::TimeZone;
    use hostwatch_types::{FieldKind, SchemaError, Severity};
    use std::thread;

    fn ts(secs: i64) -> Timestamp {
        Local.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn cpu_schema() -> PluginSchema {
        PluginSchema::single("cpu")
            .with_field("total", FieldKind::Number)
            .with_field("user", FieldKind::Number)
    }

    fn fs_schema() -> PluginSchema {
        PluginSchema::keyed_list("fs", "mnt_point")
            .with_field("mnt_point", FieldKind::Text)
            .with_field("percent", FieldKind::Number)
    }

    fn registry() -> StatsRegistry {
        StatsRegistry::builder()
            .plugin(
                cpu_schema(),
                PluginLimits::new(10).with_field("total", LimitSet::new().warning(70.0)),
            )
            .plugin(fs_schema(), PluginLimits::new(10))
            .build()
            .unwrap()
    }

    #[test]
    fn read_before_first_publish_is_unavailable() {
        let registry = registry();
        assert!(matches!(registry.read("cpu"), Err(QueryError::Unavailable(_))));
        assert!(matches!(registry.read("gpu"), Err(QueryError::NotFound(_))));
    }

    #[test]
    fn publish_applies_history_and_thresholds() {
        let registry = registry();
        registry
            .publish_at("cpu", Snapshot::single().field("total", 80.0).build(), ts(0))
            .unwrap();

        let published = registry.read("cpu").unwrap();
        assert_eq!(published.published_at, ts(0));
        assert!(!published.stale);
        assert_eq!(registry.history().query("cpu", Some("total"), None)["total"].len(), 1);
        assert_eq!(registry.engine().global_status(), Severity::Warning);
    }

    #[test]
    fn readers_keep_the_snapshot_they_hold() {
        let registry = registry();
        registry
            .publish("cpu", Snapshot::single().field("total", 1.0).build())
            .unwrap();
        let before = registry.read("cpu").unwrap();

        registry
            .publish("cpu", Snapshot::single().field("total", 2.0).build())
            .unwrap();

        assert_eq!(*before.snapshot, Snapshot::single().field("total", 1.0).build());
        assert_eq!(
            *registry.read("cpu").unwrap().snapshot,
            Snapshot::single().field("total", 2.0).build()
        );
    }

    #[test]
    fn duplicate_item_keys_are_rejected() {
        let registry = registry();
        let snapshot = Snapshot::keyed("mnt_point")
            .item(|i| i.field("mnt_point", "/").field("percent", 10.0))
            .item(|i| i.field("mnt_point", "/").field("percent", 20.0))
            .build();

        let err = registry.publish("fs", snapshot).unwrap_err();
        assert!(matches!(
            err,
            PublishError::Schema {
                source: SchemaError::DuplicateKey(_),
                ..
            }
        ));
        assert!(matches!(registry.read("fs"), Err(QueryError::Unavailable(_))));
    }

    #[test]
    fn unknown_plugin_publish_fails() {
        let registry = registry();
        let err = registry.publish("gpu", Snapshot::scalar(1)).unwrap_err();
        assert!(matches!(err, PublishError::UnknownPlugin(_)));
    }

    #[test]
    fn failed_cycle_keeps_previous_snapshot_stale() {
        let registry = registry();
        assert!(!registry.mark_failed("cpu"));

        registry
            .publish_at("cpu", Snapshot::single().field("total", 80.0).build(), ts(0))
            .unwrap();
        assert!(registry.mark_failed("cpu"));

        let published = registry.read("cpu").unwrap();
        assert!(published.stale);
        assert_eq!(published.published_at, ts(0));
        assert_eq!(registry.history().query("cpu", Some("total"), None)["total"].len(), 1);
        assert_eq!(registry.engine().current_alerts()[0].count, 1);
    }

    #[test]
    fn plugins_keep_registration_order() {
        let registry = registry();
        assert_eq!(registry.list_plugins(), ["cpu".to_string(), "fs".to_string()]);
    }

    #[test]
    fn build_rejects_bad_registrations() {
        let reserved = StatsRegistry::builder()
            .plugin(PluginSchema::single("all"), PluginLimits::default())
            .build();
        assert!(matches!(reserved, Err(ConfigError::ReservedPlugin(_))));

        let duplicate = StatsRegistry::builder()
            .plugin(cpu_schema(), PluginLimits::default())
            .plugin(cpu_schema(), PluginLimits::default())
            .build();
        assert!(matches!(duplicate, Err(ConfigError::DuplicatePlugin(_))));

        let no_key = StatsRegistry::builder()
            .plugin(
                PluginSchema::new("fs", Shape::KeyedList, None),
                PluginLimits::default(),
            )
            .build();
        assert!(matches!(no_key, Err(ConfigError::Schema { .. })));

        let undeclared = StatsRegistry::builder()
            .plugin(
                cpu_schema(),
                PluginLimits::default().with_field("steal", LimitSet::new().warning(5.0)),
            )
            .build();
        assert!(matches!(undeclared, Err(ConfigError::UnknownField { .. })));
    }

    #[test]
    fn closed_registry_rejects_publish() {
        let registry = registry();
        registry.close();
        let err = registry
            .publish("cpu", Snapshot::single().field("total", 1.0).build())
            .unwrap_err();
        assert!(matches!(err, PublishError::Closed));
    }

    #[test]
    fn concurrent_publish_and_read_never_tear() {
        let registry = Arc::new(registry());
        let writer = {
            let registry = registry.clone();
            thread::spawn(move || {
                for i in 0..200 {
                    let v = i as f64;
                    registry
                        .publish(
                            "cpu",
                            Snapshot::single().field("total", v).field("user", v).build(),
                        )
                        .unwrap();
                }
            })
        };

        for _ in 0..200 {
            if let Ok(published) = registry.read("cpu") {
                if let Snapshot::Single(record) = &*published.snapshot {
                    assert_eq!(record.get("total"), record.get("user"));
                }
            }
        }
        writer.join().unwrap();
    }

    #[test]
    fn concurrent_publishes_to_one_plugin_are_serialized() {
        let registry = Arc::new(
            StatsRegistry::builder()
                .plugin(
                    cpu_schema(),
                    PluginLimits::new(500).with_field("total", LimitSet::new().warning(70.0)),
                )
                .max_alerts(500)
                .build()
                .unwrap(),
        );

        let publishers: Vec<_> = [80.0, 20.0]
            .into_iter()
            .map(|total| {
                let registry = registry.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        registry
                            .publish("cpu", Snapshot::single().field("total", total).build())
                            .unwrap();
                    }
                })
            })
            .collect();
        for publisher in publishers {
            publisher.join().unwrap();
        }

        let series = &registry.history().query("cpu", Some("total"), None)["total"];
        assert_eq!(series.len(), 200);
        assert!(series.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

        // Every publish above the threshold was folded into exactly one record.
        let alerts = registry.engine().current_alerts();
        assert!(alerts.iter().filter(|a| a.is_active()).count() <= 1);
        assert_eq!(alerts.iter().map(|a| a.count).sum::<u64>(), 100);
    }

    #[test]
    fn reconfigured_history_size_applies() {
        let registry = registry();
        registry.configure_limits("cpu", PluginLimits::new(0)).unwrap();
        assert!(!registry.history().is_enabled("cpu"));
    }
}
