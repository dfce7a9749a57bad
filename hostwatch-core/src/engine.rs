//! Threshold evaluation and the alert lifecycle.
//!
//! For every configured field the engine classifies the published value
//! into a [`Severity`] tier and drives one alert record per
//! (plugin, field):
//!
//! ```text
//!   value < lowest tier          value >= some tier
//!  ┌──────────────┐  opens   ┌─────────────────────┐
//!  │  no record   │─────────▶│ ACTIVE (end = -1)   │◀─┐ refreshed while
//!  └──────────────┘          └──────────┬──────────┘──┘ above lowest tier
//!                                       │ value < lowest configured tier
//!                                       ▼
//!                            ┌─────────────────────┐
//!                            │ CLOSED (immutable)  │
//!                            └─────────────────────┘
//! ```
//!
//! Tier changes while active (WARNING → CRITICAL or back) update the same
//! record; only dropping below the lowest configured tier closes it.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use hostwatch_types::{Severity, Snapshot};
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::alert::AlertRecord;
use crate::extract::current_value;
use crate::history::Timestamp;
use crate::limits::{LimitSet, PluginLimits};
use crate::process::{NoProcessLookup, ProcessLookup, Resource};

/// Default number of alert records retained.
pub const DEFAULT_MAX_ALERTS: usize = 10;

type FieldId = (String, String);

#[derive(Debug, Default)]
struct AlertLog {
    records: VecDeque<AlertRecord>,
    /// Id of the active record per field.
    open: HashMap<FieldId, u64>,
    /// Last computed tier per field.
    status: HashMap<FieldId, Severity>,
    next_id: u64,
}

impl AlertLog {
    fn record_mut(&mut self, id: u64) -> Option<&mut AlertRecord> {
        self.records.iter_mut().find(|r| r.id == id)
    }

    /// Drop the oldest closed records until the log fits. Active records
    /// are never dropped.
    fn enforce_retention(&mut self, max: usize) {
        while self.records.len() > max {
            let Some(pos) = self.records.iter().position(|r| !r.is_active()) else {
                break;
            };
            self.records.remove(pos);
        }
    }
}

/// Evaluates snapshots against per-plugin limits and owns the alert log.
#[derive(Debug)]
pub struct ThresholdEngine {
    limits: RwLock<HashMap<String, PluginLimits>>,
    log: RwLock<AlertLog>,
    lookup: Arc<dyn ProcessLookup>,
    max_alerts: usize,
}

impl Default for ThresholdEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ALERTS)
    }
}

impl ThresholdEngine {
    /// Create an engine retaining at most `max_alerts` records.
    pub fn new(max_alerts: usize) -> Self {
        Self {
            limits: RwLock::new(HashMap::new()),
            log: RwLock::new(AlertLog::default()),
            lookup: Arc::new(NoProcessLookup),
            max_alerts,
        }
    }

    /// Use `lookup` to attach process ids to CPU and memory alerts.
    pub fn with_process_lookup(mut self, lookup: Arc<dyn ProcessLookup>) -> Self {
        self.lookup = lookup;
        self
    }

    /// Replace a plugin's limits.
    ///
    /// Open alerts are left untouched: disabling a field only stops future
    /// evaluation, it does not close its record.
    pub fn set_limits(&self, plugin: &str, limits: PluginLimits) {
        self.limits.write().insert(plugin.to_string(), limits);
    }

    /// Current limits of a plugin.
    pub fn limits(&self, plugin: &str) -> Option<PluginLimits> {
        self.limits.read().get(plugin).cloned()
    }

    /// Evaluate a freshly published snapshot.
    ///
    /// Fields without limits, disabled fields, and fields whose value is
    /// missing or null are skipped without touching their alert.
    pub fn evaluate(&self, plugin: &str, snapshot: &Snapshot, timestamp: Timestamp) {
        let checks: Vec<(String, LimitSet)> = {
            let limits = self.limits.read();
            let Some(plugin_limits) = limits.get(plugin) else {
                return;
            };
            if plugin_limits.disabled {
                return;
            }
            plugin_limits
                .fields()
                .filter(|(_, set)| !set.disabled && set.is_configured())
                .map(|(field, set)| (field.to_string(), set.clone()))
                .collect()
        };

        for (field, set) in checks {
            let Some((value, item)) = current_value(snapshot, &field, plugin) else {
                continue;
            };
            let severity = set.classify(value);
            self.apply(plugin, &field, &set, severity, value, item, timestamp);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn apply(
        &self,
        plugin: &str,
        field: &str,
        set: &LimitSet,
        severity: Severity,
        value: f64,
        item: Option<String>,
        timestamp: Timestamp,
    ) {
        // Resolve processes before taking the log lock.
        let pids = match Resource::for_plugin(plugin) {
            Some(resource) if severity.is_alert() => self.lookup.top_processes(resource),
            _ => Vec::new(),
        };

        let id: FieldId = (plugin.to_string(), field.to_string());
        let mut log = self.log.write();
        log.status.insert(id.clone(), severity);

        match (log.open.get(&id).copied(), severity.is_alert()) {
            (None, false) => {}
            (None, true) => {
                log.next_id += 1;
                let record_id = log.next_id;
                let mut record =
                    AlertRecord::open(record_id, plugin, field, severity, value, item, timestamp);
                record.link_processes(pids);
                if set.log {
                    warn!("Alert opened: {}", record.description);
                }
                log.records.push_back(record);
                log.open.insert(id, record_id);
                log.enforce_retention(self.max_alerts);
            }
            (Some(record_id), true) => {
                if let Some(record) = log.record_mut(record_id) {
                    let previous = record.severity;
                    record.update(severity, value, item);
                    record.link_processes(pids);
                    if set.log && previous != severity {
                        warn!(
                            "Alert {} changed from {} to {}: {}",
                            record_id, previous, severity, record.description
                        );
                    }
                }
            }
            (Some(record_id), false) => {
                if let Some(record) = log.record_mut(record_id) {
                    record.close(timestamp);
                    if set.log {
                        info!(
                            "Alert {} closed: {}.{} back to {}",
                            record_id, plugin, field, value
                        );
                    }
                }
                log.open.remove(&id);
                log.enforce_retention(self.max_alerts);
            }
        }
    }

    /// All retained records, active and closed, oldest first.
    ///
    /// Ordered by begin time, then id, so repeated reads are stable.
    pub fn current_alerts(&self) -> Vec<AlertRecord> {
        let mut records: Vec<AlertRecord> = self.log.read().records.iter().cloned().collect();
        records.sort_by(|a, b| a.begin.cmp(&b.begin).then(a.id.cmp(&b.id)));
        records
    }

    /// Worst severity across active records; OK when none is active.
    pub fn global_status(&self) -> Severity {
        self.log
            .read()
            .records
            .iter()
            .filter(|r| r.is_active())
            .map(|r| r.severity)
            .max()
            .unwrap_or(Severity::Ok)
    }

    /// Tier computed for a field at its last evaluation.
    pub fn field_status(&self, plugin: &str, field: &str) -> Severity {
        self.log
            .read()
            .status
            .get(&(plugin.to_string(), field.to_string()))
            .copied()
            .unwrap_or(Severity::Ok)
    }

    /// Drop every closed record. Returns how many were removed.
    pub fn clear_closed(&self) -> usize {
        let mut log = self.log.write();
        let before = log.records.len();
        log.records.retain(AlertRecord::is_active);
        before - log.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use hostwatch_types::Value;

    fn ts(secs: i64) -> Timestamp {
        Local.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn cpu(total: impl Into<Value>) -> Snapshot {
        Snapshot::single().field("total", total).build()
    }

    fn engine() -> ThresholdEngine {
        let engine = ThresholdEngine::new(DEFAULT_MAX_ALERTS);
        engine.set_limits(
            "cpu",
            PluginLimits::default()
                .with_field("total", LimitSet::new().warning(70.0).critical(90.0)),
        );
        engine
    }

    #[derive(Debug)]
    struct FixedLookup(Vec<u32>);

    impl ProcessLookup for FixedLookup {
        fn top_processes(&self, _resource: Resource) -> Vec<u32> {
            self.0.clone()
        }
    }

    #[test]
    fn warning_escalates_then_closes_in_one_record() {
        let engine = engine();
        for (i, v) in [50.0, 75.0, 95.0, 60.0].into_iter().enumerate() {
            engine.evaluate("cpu", &cpu(v), ts(i as i64));

            let alerts = engine.current_alerts();
            match i {
                0 => assert!(alerts.is_empty()),
                1 => {
                    assert_eq!(alerts.len(), 1);
                    assert_eq!(alerts[0].severity, Severity::Warning);
                    assert_eq!(alerts[0].begin, ts(1));
                    assert!(alerts[0].is_active());
                }
                2 => {
                    assert_eq!(alerts.len(), 1);
                    assert_eq!(alerts[0].severity, Severity::Critical);
                }
                _ => {}
            }
        }

        let alerts = engine.current_alerts();
        assert_eq!(alerts.len(), 1);
        let alert = &alerts[0];
        assert_eq!(alert.end, Some(ts(3)));
        assert_eq!(alert.peak, Severity::Critical);
        assert_eq!(alert.min, 75.0);
        assert_eq!(alert.max, 95.0);
        assert_eq!(alert.mean, 85.0);
        assert_eq!(alert.count, 2);
        assert_eq!(engine.global_status(), Severity::Ok);
    }

    #[test]
    fn dropping_to_a_lower_tier_keeps_the_alert_open() {
        let engine = engine();
        engine.evaluate("cpu", &cpu(95.0), ts(0));
        engine.evaluate("cpu", &cpu(75.0), ts(1));

        let alerts = engine.current_alerts();
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].is_active());
        assert_eq!(alerts[0].severity, Severity::Warning);
        assert_eq!(engine.global_status(), Severity::Warning);
    }

    #[test]
    fn alert_closes_only_below_lowest_tier() {
        let engine = ThresholdEngine::default();
        engine.set_limits(
            "mem",
            PluginLimits::default().with_field(
                "percent",
                LimitSet::new().careful(50.0).warning(70.0).critical(90.0),
            ),
        );
        let mem = |v: f64| Snapshot::single().field("percent", v).build();

        engine.evaluate("mem", &mem(80.0), ts(0));
        engine.evaluate("mem", &mem(55.0), ts(1));
        assert!(engine.current_alerts()[0].is_active());
        assert_eq!(engine.field_status("mem", "percent"), Severity::Careful);

        engine.evaluate("mem", &mem(49.9), ts(2));
        assert!(!engine.current_alerts()[0].is_active());
        assert_eq!(engine.field_status("mem", "percent"), Severity::Ok);
    }

    #[test]
    fn reentering_opens_a_new_record() {
        let engine = engine();
        for (i, v) in [80.0, 10.0, 85.0].into_iter().enumerate() {
            engine.evaluate("cpu", &cpu(v), ts(i as i64));
        }

        let alerts = engine.current_alerts();
        assert_eq!(alerts.len(), 2);
        assert!(!alerts[0].is_active());
        assert!(alerts[1].is_active());
        assert!(alerts[0].begin < alerts[1].begin);
    }

    #[test]
    fn missing_value_is_skipped() {
        let engine = engine();
        engine.evaluate("cpu", &cpu(80.0), ts(0));
        engine.evaluate("cpu", &cpu(Value::Null), ts(1));
        engine.evaluate("cpu", &Snapshot::single().build(), ts(2));

        let alerts = engine.current_alerts();
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].is_active());
        assert_eq!(alerts[0].count, 1);
    }

    #[test]
    fn disabling_a_field_keeps_open_alert() {
        let engine = engine();
        engine.evaluate("cpu", &cpu(95.0), ts(0));

        engine.set_limits(
            "cpu",
            PluginLimits::default().with_field(
                "total",
                LimitSet::new().warning(70.0).critical(90.0).disabled(true),
            ),
        );
        engine.evaluate("cpu", &cpu(10.0), ts(1));

        let alerts = engine.current_alerts();
        assert!(alerts[0].is_active());
        assert_eq!(alerts[0].count, 1);
    }

    #[test]
    fn disabled_plugin_is_not_evaluated() {
        let engine = ThresholdEngine::default();
        engine.set_limits(
            "cpu",
            PluginLimits::default()
                .disabled(true)
                .with_field("total", LimitSet::new().warning(70.0)),
        );
        engine.evaluate("cpu", &cpu(99.0), ts(0));
        assert!(engine.current_alerts().is_empty());
    }

    #[test]
    fn cpu_alerts_link_top_processes() {
        let engine = engine().with_process_lookup(Arc::new(FixedLookup(vec![42, 7])));
        engine.evaluate("cpu", &cpu(75.0), ts(0));
        engine.evaluate("cpu", &cpu(76.0), ts(1));

        let alert = &engine.current_alerts()[0];
        assert_eq!(alert.linked_process_ids.iter().copied().collect::<Vec<_>>(), vec![7, 42]);
    }

    #[test]
    fn non_resource_plugins_link_no_processes() {
        let engine = ThresholdEngine::default().with_process_lookup(Arc::new(FixedLookup(vec![1])));
        engine.set_limits(
            "fs",
            PluginLimits::default().with_field("percent", LimitSet::new().warning(80.0)),
        );
        let fs = Snapshot::keyed("mnt_point")
            .item(|i| i.field("mnt_point", "/").field("percent", 40.0))
            .item(|i| i.field("mnt_point", "/data").field("percent", 91.0))
            .build();
        engine.evaluate("fs", &fs, ts(0));

        let alert = &engine.current_alerts()[0];
        assert!(alert.linked_process_ids.is_empty());
        assert_eq!(alert.item.as_deref(), Some("/data"));
        assert_eq!(alert.current, 91.0);
    }

    #[test]
    fn retention_evicts_oldest_closed_records() {
        let engine = ThresholdEngine::new(2);
        engine.set_limits(
            "cpu",
            PluginLimits::default()
                .with_field("total", LimitSet::new().warning(70.0))
                .with_field("iowait", LimitSet::new().warning(20.0)),
        );
        let snap = |total: f64, iowait: f64| {
            Snapshot::single()
                .field("total", total)
                .field("iowait", iowait)
                .build()
        };

        engine.evaluate("cpu", &snap(80.0, 0.0), ts(0)); // total opens (id 1)
        engine.evaluate("cpu", &snap(10.0, 0.0), ts(1)); // total closes
        engine.evaluate("cpu", &snap(10.0, 30.0), ts(2)); // iowait opens (id 2)
        engine.evaluate("cpu", &snap(90.0, 30.0), ts(3)); // total reopens (id 3), id 1 evicted

        let alerts = engine.current_alerts();
        let ids: Vec<u64> = alerts.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert!(alerts.iter().all(AlertRecord::is_active));
    }

    #[test]
    fn active_records_are_never_evicted() {
        let engine = ThresholdEngine::new(1);
        engine.set_limits(
            "cpu",
            PluginLimits::default()
                .with_field("total", LimitSet::new().warning(70.0))
                .with_field("iowait", LimitSet::new().warning(20.0)),
        );
        let snapshot = Snapshot::single()
            .field("total", 80.0)
            .field("iowait", 30.0)
            .build();
        engine.evaluate("cpu", &snapshot, ts(0));

        assert_eq!(engine.current_alerts().len(), 2);
    }

    #[test]
    fn clear_closed_keeps_active() {
        let engine = engine();
        engine.evaluate("cpu", &cpu(80.0), ts(0));
        engine.evaluate("cpu", &cpu(10.0), ts(1));
        engine.evaluate("cpu", &cpu(80.0), ts(2));

        assert_eq!(engine.clear_closed(), 1);
        let alerts = engine.current_alerts();
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].is_active());
    }

    #[test]
    fn global_status_is_worst_active_severity() {
        let engine = ThresholdEngine::default();
        engine.set_limits(
            "cpu",
            PluginLimits::default().with_field("total", LimitSet::new().warning(70.0).critical(90.0)),
        );
        engine.set_limits(
            "mem",
            PluginLimits::default().with_field("percent", LimitSet::new().careful(50.0)),
        );

        engine.evaluate("mem", &Snapshot::single().field("percent", 60.0).build(), ts(0));
        assert_eq!(engine.global_status(), Severity::Careful);

        engine.evaluate("cpu", &cpu(92.0), ts(1));
        assert_eq!(engine.global_status(), Severity::Critical);
    }
}
