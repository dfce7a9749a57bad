//! Plugin schemas - declared fields checked at registration and publish.

use alloc::collections::BTreeSet;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;

use crate::{Record, Shape, Snapshot, Value};

/// Path segments with a fixed meaning in the query grammar.
pub const RESERVED_FIELDS: [&str; 2] = ["history", "limits"];

/// Kind of value a declared field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FieldKind {
    Number,
    Text,
    Bool,
    List,
    Map,
    Any,
}

impl FieldKind {
    /// Whether a value is acceptable for this kind. Null is always accepted.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) | (FieldKind::Any, _) => true,
            (FieldKind::Number, Value::Int(_) | Value::Float(_)) => true,
            (FieldKind::Text, Value::Str(_)) => true,
            (FieldKind::Bool, Value::Bool(_)) => true,
            (FieldKind::List, Value::List(_)) => true,
            (FieldKind::Map, Value::Map(_)) => true,
            _ => false,
        }
    }
}

/// A declared field.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
}

/// Declared layout of one plugin's snapshots.
///
/// Field order is the declaration order and is preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginSchema {
    pub name: String,
    pub shape: Shape,
    /// Key field, required for keyed lists and forbidden otherwise.
    pub key: Option<String>,
    pub fields: Vec<FieldSpec>,
}

impl PluginSchema {
    /// Schema for a scalar plugin. A scalar may declare at most one field,
    /// under which its value is addressable.
    pub fn scalar(name: impl Into<String>) -> Self {
        Self::new(name, Shape::Scalar, None)
    }

    /// Schema for a single-mapping plugin.
    pub fn single(name: impl Into<String>) -> Self {
        Self::new(name, Shape::Single, None)
    }

    /// Schema for a keyed-list plugin. The key field must also be declared.
    pub fn keyed_list(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self::new(name, Shape::KeyedList, Some(key.into()))
    }

    /// Create a schema from its parts.
    pub fn new(name: impl Into<String>, shape: Shape, key: Option<String>) -> Self {
        Self {
            name: name.into(),
            shape,
            key,
            fields: Vec::new(),
        }
    }

    /// Declare a field.
    pub fn with_field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind,
        });
        self
    }

    /// Look up a declared field.
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Declared field names, in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Validate the schema itself. Called once at registration.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.name.is_empty() || self.name.contains('/') {
            return Err(SchemaError::InvalidName(self.name.clone()));
        }

        let mut seen = BTreeSet::new();
        for field in &self.fields {
            if field.name.is_empty() || field.name.contains('/') {
                return Err(SchemaError::InvalidName(field.name.clone()));
            }
            if RESERVED_FIELDS.contains(&field.name.as_str()) {
                return Err(SchemaError::ReservedField(field.name.clone()));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField(field.name.clone()));
            }
        }

        match (self.shape, &self.key) {
            (Shape::KeyedList, None) => Err(SchemaError::MissingKeyField),
            (Shape::KeyedList, Some(key)) if !self.has_field(key) => {
                Err(SchemaError::UndeclaredField(key.clone()))
            }
            (Shape::Scalar | Shape::Single, Some(_)) => Err(SchemaError::UnexpectedKey),
            (Shape::Scalar, None) if self.fields.len() > 1 => Err(SchemaError::TooManyFields),
            _ => Ok(()),
        }
    }

    /// Check a snapshot against this schema. Called on every publish.
    ///
    /// Declared fields may be missing from a snapshot; undeclared fields,
    /// values of the wrong kind, and missing or duplicate item keys are
    /// rejected.
    pub fn check(&self, snapshot: &Snapshot) -> Result<(), SchemaError> {
        if snapshot.shape() != self.shape {
            return Err(SchemaError::ShapeMismatch {
                expected: self.shape,
                found: snapshot.shape(),
            });
        }

        match snapshot {
            Snapshot::Scalar(value) => match self.fields.first() {
                Some(spec) => self.check_value(spec, value),
                None => Ok(()),
            },
            Snapshot::Single(record) => self.check_record(record),
            Snapshot::KeyedList { key, items } => {
                if self.key.as_deref() != Some(key.as_str()) {
                    return Err(SchemaError::KeyMismatch {
                        expected: self.key.clone().unwrap_or_default(),
                        found: key.clone(),
                    });
                }

                let mut seen = BTreeSet::new();
                for (index, item) in items.iter().enumerate() {
                    self.check_record(item)?;
                    let key_value = item
                        .get(key)
                        .filter(|v| v.is_primitive())
                        .ok_or(SchemaError::MissingKey { index })?;
                    if !seen.insert(key_identity(key_value)) {
                        return Err(SchemaError::DuplicateKey(key_value.to_string()));
                    }
                }
                Ok(())
            }
        }
    }

    fn check_record(&self, record: &Record) -> Result<(), SchemaError> {
        for (name, value) in record {
            let spec = self
                .field(name)
                .ok_or_else(|| SchemaError::UndeclaredField(name.clone()))?;
            self.check_value(spec, value)?;
        }
        Ok(())
    }

    fn check_value(&self, spec: &FieldSpec, value: &Value) -> Result<(), SchemaError> {
        if spec.kind.accepts(value) {
            Ok(())
        } else {
            Err(SchemaError::KindMismatch {
                field: spec.name.clone(),
                expected: spec.kind,
                found: value.kind_name(),
            })
        }
    }
}

/// Identity of a primitive key value. Kinds are kept apart so that the
/// string `"1"` and the integer `1` are distinct keys.
fn key_identity(value: &Value) -> String {
    match value {
        Value::Str(s) => format!("s:{}", s),
        Value::Int(i) => format!("i:{}", i),
        Value::Float(f) => format!("f:{}", f.to_bits()),
        Value::Bool(b) => format!("b:{}", b),
        other => format!("?:{}", other),
    }
}

/// Errors raised by schema validation or by checking a snapshot against a schema.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaError {
    /// Plugin or field name is empty or contains `/`.
    InvalidName(String),
    /// Field name collides with a query grammar keyword.
    ReservedField(String),
    DuplicateField(String),
    /// Keyed list declared without a key field.
    MissingKeyField,
    /// Key declared on a scalar or single plugin.
    UnexpectedKey,
    /// Scalar plugin declared more than one field.
    TooManyFields,
    UndeclaredField(String),
    ShapeMismatch { expected: Shape, found: Shape },
    KeyMismatch { expected: String, found: String },
    /// Item at `index` has no primitive key value.
    MissingKey { index: usize },
    DuplicateKey(String),
    KindMismatch {
        field: String,
        expected: FieldKind,
        found: &'static str,
    },
    /// Raw value does not have the structure the shape requires.
    UnexpectedValue {
        expected: &'static str,
        found: &'static str,
    },
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaError::InvalidName(name) => write!(f, "invalid name: {:?}", name),
            SchemaError::ReservedField(name) => write!(f, "field name is reserved: {}", name),
            SchemaError::DuplicateField(name) => write!(f, "duplicate field: {}", name),
            SchemaError::MissingKeyField => write!(f, "keyed list has no key field"),
            SchemaError::UnexpectedKey => write!(f, "only keyed lists declare a key field"),
            SchemaError::TooManyFields => write!(f, "scalar plugins declare at most one field"),
            SchemaError::UndeclaredField(name) => write!(f, "undeclared field: {}", name),
            SchemaError::ShapeMismatch { expected, found } => {
                write!(f, "expected {} snapshot, got {}", expected, found)
            }
            SchemaError::KeyMismatch { expected, found } => {
                write!(f, "expected key field {}, got {}", expected, found)
            }
            SchemaError::MissingKey { index } => write!(f, "item {} has no key value", index),
            SchemaError::DuplicateKey(key) => write!(f, "duplicate item key: {}", key),
            SchemaError::KindMismatch {
                field,
                expected,
                found,
            } => write!(f, "field {} expects {:?}, got {}", field, expected, found),
            SchemaError::UnexpectedValue { expected, found } => {
                write!(f, "expected {}, got {}", expected, found)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SchemaError {}
