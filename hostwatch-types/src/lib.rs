//! # hostwatch-types
//!
//! Core types for host observability. This crate defines the data model
//! every hostwatch plugin publishes: a per-plugin [`Snapshot`] in one of
//! three shapes, the [`PluginSchema`] it is checked against, and the
//! [`Severity`] scale used by threshold evaluation.
//!
//! ## Design Goals
//!
//! - **Zero required dependencies**: Core types work without any serialization framework
//! - **Optional serialization**: Enable `serde` to encode snapshots as plain JSON shapes
//! - **Tagged shapes**: Scalar, single mapping and keyed list are variants of one enum,
//!   so every consumer matches them exhaustively
//! - **Checked field access**: Plugins declare their fields up front; snapshots are
//!   validated against the declaration before anyone reads them
//!
//! ## Features
//!
//! - `std` (default): Standard library support
//! - `serde`: JSON/MessagePack/etc. serialization via serde
//!
//! ## Example
//!
//! ```rust
//! use hostwatch_types::{FieldKind, PluginSchema, Snapshot};
//!
//! let schema = PluginSchema::keyed_list("fs", "mnt_point")
//!     .with_field("mnt_point", FieldKind::Text)
//!     .with_field("percent", FieldKind::Number);
//!
//! let snapshot = Snapshot::keyed("mnt_point")
//!     .item(|i| i.field("mnt_point", "/").field("percent", 42.5))
//!     .item(|i| i.field("mnt_point", "/home").field("percent", 71.0))
//!     .build();
//!
//! assert!(schema.check(&snapshot).is_ok());
//! assert_eq!(snapshot.len(), 2);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod schema;
mod severity;
mod snapshot;
mod value;

pub use schema::*;
pub use severity::*;
pub use snapshot::*;
pub use value::*;
