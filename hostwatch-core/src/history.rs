//! Bounded per-field time series.
//!
//! Each plugin has one buffer per numeric field. Buffers are FIFO rings
//! holding at most the plugin's `history_size` samples; once full, every
//! append evicts the oldest sample.

use std::collections::{BTreeMap, HashMap, VecDeque};

use chrono::{DateTime, Local};
use hostwatch_types::Snapshot;
use parking_lot::RwLock;
use serde::ser::SerializeTuple;
use serde::{Serialize, Serializer};
use tracing::debug;

use crate::extract::numeric_fields;

/// Wall-clock instant attached to samples, snapshots and alerts.
pub type Timestamp = DateTime<Local>;

/// ISO-8601 local time with microsecond precision, e.g. `2024-05-01T10:20:30.123456`.
pub fn format_timestamp(ts: &Timestamp) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

pub(crate) fn serialize_timestamp<S: Serializer>(ts: &Timestamp, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format_timestamp(ts))
}

/// One recorded value.
///
/// Serializes as a `[timestamp, value]` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct HistorySample {
    pub timestamp: Timestamp,
    pub value: f64,
}

impl Serialize for HistorySample {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&format_timestamp(&self.timestamp))?;
        tuple.serialize_element(&self.value)?;
        tuple.end()
    }
}

#[derive(Debug)]
struct PluginHistory {
    capacity: usize,
    fields: BTreeMap<String, VecDeque<HistorySample>>,
}

impl PluginHistory {
    fn push(&mut self, field: String, sample: HistorySample) {
        let capacity = self.capacity;
        let buffer = self.fields.entry(field).or_default();

        // Keep timestamps non-decreasing even if the wall clock steps back.
        let sample = match buffer.back() {
            Some(last) if sample.timestamp < last.timestamp => HistorySample {
                timestamp: last.timestamp,
                value: sample.value,
            },
            _ => sample,
        };

        buffer.push_back(sample);
        while buffer.len() > capacity {
            buffer.pop_front();
        }
    }
}

/// History buffers for every history-enabled plugin.
///
/// Appends take the write lock for the whole snapshot, so a reader never
/// observes half of a cycle.
#[derive(Debug, Default)]
pub struct HistoryStore {
    plugins: RwLock<HashMap<String, PluginHistory>>,
}

impl HistoryStore {
    /// Create an empty store. Plugins must be configured before they record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a plugin's capacity. `0` disables history and drops its buffers;
    /// shrinking keeps the most recent samples.
    pub fn configure(&self, plugin: &str, capacity: usize) {
        let mut plugins = self.plugins.write();
        if capacity == 0 {
            plugins.remove(plugin);
            return;
        }

        let history = plugins
            .entry(plugin.to_string())
            .or_insert_with(|| PluginHistory {
                capacity,
                fields: BTreeMap::new(),
            });
        history.capacity = capacity;
        for buffer in history.fields.values_mut() {
            while buffer.len() > capacity {
                buffer.pop_front();
            }
        }
    }

    /// Whether the plugin keeps history.
    pub fn is_enabled(&self, plugin: &str) -> bool {
        self.plugins.read().contains_key(plugin)
    }

    /// Configured capacity, or `None` when history is disabled.
    pub fn capacity(&self, plugin: &str) -> Option<usize> {
        self.plugins.read().get(plugin).map(|h| h.capacity)
    }

    /// Append one sample per numeric field of `snapshot`.
    ///
    /// Keyed lists append one sample per field, the largest value across
    /// items. Returns the number of samples appended (0 when the
    /// plugin does not keep history).
    pub fn append(&self, plugin: &str, snapshot: &Snapshot, timestamp: Timestamp) -> usize {
        let mut plugins = self.plugins.write();
        let Some(history) = plugins.get_mut(plugin) else {
            return 0;
        };

        let fields = numeric_fields(snapshot, plugin);
        let appended = fields.len();
        for (field, value) in fields {
            history.push(field, HistorySample { timestamp, value });
        }
        debug!("Recorded {} history samples for {}", appended, plugin);
        appended
    }

    /// Recorded series for a plugin.
    ///
    /// With `field`, only that series is returned (empty if nothing was
    /// recorded). `limit` keeps the most recent N samples of each series.
    pub fn query(
        &self,
        plugin: &str,
        field: Option<&str>,
        limit: Option<usize>,
    ) -> BTreeMap<String, Vec<HistorySample>> {
        let plugins = self.plugins.read();
        let Some(history) = plugins.get(plugin) else {
            return field
                .map(|f| BTreeMap::from([(f.to_string(), Vec::new())]))
                .unwrap_or_default();
        };

        let tail = |buffer: &VecDeque<HistorySample>| -> Vec<HistorySample> {
            let skip = limit.map_or(0, |n| buffer.len().saturating_sub(n));
            buffer.iter().skip(skip).cloned().collect()
        };

        match field {
            Some(f) => {
                let samples = history.fields.get(f).map(tail).unwrap_or_default();
                BTreeMap::from([(f.to_string(), samples)])
            }
            None => history
                .fields
                .iter()
                .map(|(name, buffer)| (name.clone(), tail(buffer)))
                .collect(),
        }
    }

    /// Whether a series exists for the field.
    pub fn is_tracked(&self, plugin: &str, field: &str) -> bool {
        self.plugins
            .read()
            .get(plugin)
            .is_some_and(|h| h.fields.contains_key(field))
    }
}
