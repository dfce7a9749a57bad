//! Alert records.

use std::collections::BTreeSet;

use hostwatch_types::Severity;
use serde::{Serialize, Serializer};

use crate::history::{format_timestamp, serialize_timestamp, Timestamp};

/// One excursion of a field above its thresholds.
///
/// A record is ACTIVE while `end` is `None` and is refreshed on every
/// evaluation; once closed it never changes again.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRecord {
    /// Unique, increasing id.
    pub id: u64,
    #[serde(serialize_with = "serialize_timestamp")]
    pub begin: Timestamp,
    /// Closing time; serialized as `-1` while the alert is active.
    #[serde(serialize_with = "serialize_end")]
    pub end: Option<Timestamp>,
    /// Current tier.
    pub severity: Severity,
    /// Highest tier reached since `begin`.
    pub peak: Severity,
    pub plugin: String,
    pub field: String,
    /// Key of the keyed-list item that holds the current value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<String>,
    pub current: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Number of evaluations folded into this record.
    pub count: u64,
    /// Top processes seen while the alert was active.
    pub linked_process_ids: BTreeSet<u32>,
    pub description: String,
    #[serde(skip)]
    sum: f64,
}

fn serialize_end<S: Serializer>(end: &Option<Timestamp>, s: S) -> Result<S::Ok, S::Error> {
    match end {
        Some(ts) => s.serialize_str(&format_timestamp(ts)),
        None => s.serialize_i64(-1),
    }
}

impl AlertRecord {
    pub(crate) fn open(
        id: u64,
        plugin: &str,
        field: &str,
        severity: Severity,
        value: f64,
        item: Option<String>,
        begin: Timestamp,
    ) -> Self {
        let mut record = Self {
            id,
            begin,
            end: None,
            severity,
            peak: severity,
            plugin: plugin.to_string(),
            field: field.to_string(),
            item,
            current: value,
            min: value,
            max: value,
            mean: value,
            count: 1,
            linked_process_ids: BTreeSet::new(),
            description: String::new(),
            sum: value,
        };
        record.describe();
        record
    }

    /// True until the record is closed.
    pub fn is_active(&self) -> bool {
        self.end.is_none()
    }

    /// Fold one more evaluation into the record.
    pub(crate) fn update(&mut self, severity: Severity, value: f64, item: Option<String>) {
        self.severity = severity;
        self.peak = self.peak.max(severity);
        self.current = value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum += value;
        self.count += 1;
        self.mean = self.sum / self.count as f64;
        self.item = item;
        self.describe();
    }

    pub(crate) fn link_processes(&mut self, pids: impl IntoIterator<Item = u32>) {
        self.linked_process_ids.extend(pids);
    }

    pub(crate) fn close(&mut self, end: Timestamp) {
        self.end = Some(end);
    }

    fn describe(&mut self) {
        self.description = match &self.item {
            Some(item) => format!(
                "{} {}.{} on {} ({})",
                self.severity, self.plugin, self.field, item, self.current
            ),
            None => format!(
                "{} {}.{} ({})",
                self.severity, self.plugin, self.field, self.current
            ),
        };
    }
}
