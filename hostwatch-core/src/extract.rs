//! Numeric field extraction from snapshots.
//!
//! Nested mappings are flattened one level deep using dotted names
//! (`"quicklook.cpu"`); deeper nesting is ignored.

use hostwatch_types::{Record, Snapshot, Value};

/// Every numeric field of `snapshot`, each name at most once.
///
/// Keyed lists report the largest value across items for each field, the
/// same aggregate thresholds are evaluated against. A numeric scalar is
/// reported under `scalar_name`.
pub(crate) fn numeric_fields(snapshot: &Snapshot, scalar_name: &str) -> Vec<(String, f64)> {
    let mut out = Vec::new();
    match snapshot {
        Snapshot::Scalar(value) => {
            if let Some(v) = value.as_f64() {
                out.push((scalar_name.to_string(), v));
            }
        }
        Snapshot::Single(record) => collect_record(record, &mut out),
        Snapshot::KeyedList { items, .. } => {
            let mut per_item = Vec::new();
            for item in items {
                collect_record(item, &mut per_item);
            }
            for (name, v) in per_item {
                match out.iter_mut().find(|(seen, _)| *seen == name) {
                    Some((_, best)) if *best < v => *best = v,
                    Some(_) => {}
                    None => out.push((name, v)),
                }
            }
        }
    }
    out
}

fn collect_record(record: &Record, out: &mut Vec<(String, f64)>) {
    for (name, value) in record {
        match value {
            Value::Map(nested) => {
                for (child, child_value) in nested {
                    if let Some(v) = child_value.as_f64() {
                        out.push((format!("{}.{}", name, child), v));
                    }
                }
            }
            other => {
                if let Some(v) = other.as_f64() {
                    out.push((name.clone(), v));
                }
            }
        }
    }
}

/// Look up a possibly dotted field name in a record.
pub(crate) fn lookup<'a>(record: &'a Record, field: &str) -> Option<&'a Value> {
    match record.get(field) {
        Some(value) => Some(value),
        None => {
            let (parent, child) = field.split_once('.')?;
            record.get(parent)?.as_map()?.get(child)
        }
    }
}

/// The value a threshold is evaluated against for one field.
///
/// For keyed lists this is the largest value across items, together with
/// the key of the item holding it. Missing and null values yield `None`.
pub(crate) fn current_value(
    snapshot: &Snapshot,
    field: &str,
    scalar_name: &str,
) -> Option<(f64, Option<String>)> {
    match snapshot {
        Snapshot::Scalar(value) => {
            if field == scalar_name {
                value.as_f64().map(|v| (v, None))
            } else {
                None
            }
        }
        Snapshot::Single(record) => lookup(record, field)?.as_f64().map(|v| (v, None)),
        Snapshot::KeyedList { key, items } => items
            .iter()
            .filter_map(|item| {
                let v = lookup(item, field)?.as_f64()?;
                let item_key = item.get(key).map(|k| k.to_string());
                Some((v, item_key))
            })
            .fold(None, |best: Option<(f64, Option<String>)>, candidate| match best {
                Some(b) if b.0 >= candidate.0 => Some(b),
                _ => Some(candidate),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_fields_are_flattened_one_level() {
        let snapshot = Snapshot::single()
            .field("total", 27.3)
            .field("name", "cpu")
            .field(
                "nested",
                Value::Map(
                    hostwatch_types::RecordBuilder::new()
                        .field("a", 1)
                        .field("label", "x")
                        .build(),
                ),
            )
            .build();

        let fields = numeric_fields(&snapshot, "cpu");
        assert_eq!(
            fields,
            vec![("nested.a".to_string(), 1.0), ("total".to_string(), 27.3)]
        );
    }

    #[test]
    fn keyed_list_yields_largest_value_per_field() {
        let snapshot = Snapshot::keyed("interface_name")
            .item(|i| i.field("interface_name", "lo").field("rx", 3).field("tx", 8))
            .item(|i| i.field("interface_name", "eth0").field("rx", 10).field("tx", 2))
            .build();

        let fields = numeric_fields(&snapshot, "network");
        assert_eq!(
            fields,
            vec![("rx".to_string(), 10.0), ("tx".to_string(), 8.0)]
        );
    }

    #[test]
    fn numeric_scalar_uses_given_name() {
        let fields = numeric_fields(&Snapshot::scalar(4), "processcount");
        assert_eq!(fields, vec![("processcount".to_string(), 4.0)]);
        assert!(numeric_fields(&Snapshot::scalar("up"), "uptime").is_empty());
    }

    #[test]
    fn current_value_takes_worst_item() {
        let snapshot = Snapshot::keyed("mnt_point")
            .item(|i| i.field("mnt_point", "/").field("percent", 40.0))
            .item(|i| i.field("mnt_point", "/data").field("percent", 93.0))
            .item(|i| i.field("mnt_point", "/boot").field("percent", Value::Null))
            .build();

        assert_eq!(
            current_value(&snapshot, "percent", "fs"),
            Some((93.0, Some("/data".to_string())))
        );
        assert_eq!(current_value(&snapshot, "size", "fs"), None);
    }

    #[test]
    fn null_value_is_absent() {
        let snapshot = Snapshot::single().field("percent", Value::Null).build();
        assert_eq!(current_value(&snapshot, "percent", "mem"), None);
    }
}
