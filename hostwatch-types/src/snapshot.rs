//! Snapshot - the latest values published by one plugin.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::{Record, RecordBuilder, SchemaError, Value};

/// Data shape of a plugin, fixed at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Shape {
    /// A single primitive (or list of primitives), e.g. uptime.
    Scalar,
    /// One mapping describing one entity, e.g. memory state.
    Single,
    /// A list of mappings sharing a schema, each identified by a key field.
    KeyedList,
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Shape::Scalar => "scalar",
            Shape::Single => "single",
            Shape::KeyedList => "keyed_list",
        })
    }
}

/// The full set of values one plugin produced in one collection cycle.
///
/// # Example
///
/// ```rust
/// use hostwatch_types::{Shape, Snapshot};
///
/// let mem = Snapshot::single()
///     .field("total", 16_000_000_000u64)
///     .field("percent", 63.2)
///     .build();
///
/// assert_eq!(mem.shape(), Shape::Single);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Scalar(Value),
    Single(Record),
    KeyedList {
        /// Field whose value identifies each item.
        key: String,
        items: Vec<Record>,
    },
}

impl Snapshot {
    /// Create a scalar snapshot.
    pub fn scalar(value: impl Into<Value>) -> Self {
        Snapshot::Scalar(value.into())
    }

    /// Create a builder for a single-mapping snapshot.
    pub fn single() -> SingleBuilder {
        SingleBuilder::default()
    }

    /// Create a builder for a keyed-list snapshot.
    pub fn keyed(key: impl Into<String>) -> KeyedListBuilder {
        KeyedListBuilder {
            key: key.into(),
            items: Vec::new(),
        }
    }

    /// Shape tag of this snapshot.
    pub fn shape(&self) -> Shape {
        match self {
            Snapshot::Scalar(_) => Shape::Scalar,
            Snapshot::Single(_) => Shape::Single,
            Snapshot::KeyedList { .. } => Shape::KeyedList,
        }
    }

    /// Key field name, for keyed lists.
    pub fn key(&self) -> Option<&str> {
        match self {
            Snapshot::KeyedList { key, .. } => Some(key),
            _ => None,
        }
    }

    /// Number of entities in the snapshot (items for keyed lists, 1 otherwise).
    pub fn len(&self) -> usize {
        match self {
            Snapshot::KeyedList { items, .. } => items.len(),
            _ => 1,
        }
    }

    /// True for a keyed list with no items.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shape a dynamically typed value (e.g. parsed JSON) into a snapshot.
    ///
    /// The value must already have the expected structure: a mapping for
    /// `Single`, a list of mappings for `KeyedList`. No schema check is
    /// performed here; see [`PluginSchema::check`](crate::PluginSchema::check).
    pub fn from_value(shape: Shape, key: Option<&str>, value: Value) -> Result<Self, SchemaError> {
        match shape {
            Shape::Scalar => Ok(Snapshot::Scalar(value)),
            Shape::Single => match value {
                Value::Map(record) => Ok(Snapshot::Single(record)),
                other => Err(SchemaError::UnexpectedValue {
                    expected: "map",
                    found: other.kind_name(),
                }),
            },
            Shape::KeyedList => {
                let key = key.ok_or(SchemaError::MissingKeyField)?;
                let Value::List(values) = value else {
                    return Err(SchemaError::UnexpectedValue {
                        expected: "list",
                        found: value.kind_name(),
                    });
                };
                let items = values
                    .into_iter()
                    .map(|v| match v {
                        Value::Map(record) => Ok(record),
                        other => Err(SchemaError::UnexpectedValue {
                            expected: "map",
                            found: other.kind_name(),
                        }),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Snapshot::KeyedList {
                    key: key.into(),
                    items,
                })
            }
        }
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Snapshot {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Snapshot::Scalar(value) => value.serialize(serializer),
            Snapshot::Single(record) => record.serialize(serializer),
            Snapshot::KeyedList { items, .. } => items.serialize(serializer),
        }
    }
}

/// Builder for single-mapping snapshots.
#[derive(Debug, Default)]
pub struct SingleBuilder {
    record: RecordBuilder,
}

impl SingleBuilder {
    /// Set a field.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.record = self.record.field(name, value);
        self
    }

    /// Build the snapshot.
    pub fn build(self) -> Snapshot {
        Snapshot::Single(self.record.build())
    }
}

/// Builder for keyed-list snapshots.
#[derive(Debug)]
pub struct KeyedListBuilder {
    key: String,
    items: Vec<Record>,
}

impl KeyedListBuilder {
    /// Add an item built using a closure.
    pub fn item<F>(mut self, f: F) -> Self
    where
        F: FnOnce(RecordBuilder) -> RecordBuilder,
    {
        self.items.push(f(RecordBuilder::new()).build());
        self
    }

    /// Add a pre-built item.
    pub fn record(mut self, record: Record) -> Self {
        self.items.push(record);
        self
    }

    /// Build the snapshot.
    pub fn build(self) -> Snapshot {
        Snapshot::KeyedList {
            key: self.key,
            items: self.items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn builders_produce_tagged_shapes() {
        let scalar = Snapshot::scalar("3 days, 2:14:07");
        let single = Snapshot::single().field("total", 27.3).build();
        let list = Snapshot::keyed("interface_name")
            .item(|i| i.field("interface_name", "eth0").field("rx", 10))
            .build();

        assert_eq!(scalar.shape(), Shape::Scalar);
        assert_eq!(single.shape(), Shape::Single);
        assert_eq!(list.shape(), Shape::KeyedList);
        assert_eq!(list.key(), Some("interface_name"));
        assert_eq!(single.key(), None);
    }

    #[test]
    fn empty_keyed_list_is_empty() {
        let list = Snapshot::keyed("name").build();
        assert!(list.is_empty());
        assert!(!Snapshot::scalar(1).is_empty());
    }

    #[test]
    fn from_value_shapes_a_list_of_maps() {
        let item = RecordBuilder::new().field("mnt_point", "/").build();
        let value = Value::List(vec![Value::Map(item.clone())]);

        let snapshot = Snapshot::from_value(Shape::KeyedList, Some("mnt_point"), value).unwrap();
        assert_eq!(
            snapshot,
            Snapshot::KeyedList {
                key: "mnt_point".into(),
                items: vec![item],
            }
        );
    }

    #[test]
    fn from_value_rejects_wrong_structure() {
        let err = Snapshot::from_value(Shape::Single, None, Value::Int(1)).unwrap_err();
        assert_eq!(
            err,
            SchemaError::UnexpectedValue {
                expected: "map",
                found: "int"
            }
        );

        let err =
            Snapshot::from_value(Shape::KeyedList, None, Value::List(Vec::new())).unwrap_err();
        assert_eq!(err, SchemaError::MissingKeyField);

        let err = Snapshot::from_value(
            Shape::KeyedList,
            Some("name"),
            Value::List(vec![Value::from("x")]),
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::UnexpectedValue { expected: "map", .. }));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn keyed_list_serializes_as_plain_sequence() {
        let list = Snapshot::keyed("mnt_point")
            .item(|i| i.field("mnt_point", "/").field("percent", 42.5))
            .build();

        let json = serde_json::to_value(&list).unwrap();
        assert_eq!(json, serde_json::json!([{"mnt_point": "/", "percent": 42.5}]));
    }
}
