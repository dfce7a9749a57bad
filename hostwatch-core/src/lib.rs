//! # hostwatch-core
//!
//! Stats registry, history store, threshold engine and query resolver for
//! hostwatch.
//!
//! Producers publish one snapshot per plugin per cycle into a
//! [`StatsRegistry`]. Publishing appends the snapshot's numeric fields to
//! the [`HistoryStore`] and evaluates them against the plugin's limits in
//! the [`ThresholdEngine`], all before `publish` returns. The
//! [`QueryResolver`] reads the result at any time.
//!
//! ## Quick Start
//!
//! ```rust
//! use hostwatch_core::{LimitSet, PluginLimits, QueryResolver, Route, StatsRegistry};
//! use hostwatch_types::{FieldKind, PluginSchema, Severity, Snapshot};
//!
//! let registry = StatsRegistry::builder()
//!     .plugin(
//!         PluginSchema::keyed_list("fs", "mnt_point")
//!             .with_field("mnt_point", FieldKind::Text)
//!             .with_field("percent", FieldKind::Number),
//!         PluginLimits::default()
//!             .with_field("percent", LimitSet::new().warning(80.0).critical(95.0)),
//!     )
//!     .build()
//!     .unwrap();
//!
//! registry
//!     .publish(
//!         "fs",
//!         Snapshot::keyed("mnt_point")
//!             .item(|i| i.field("mnt_point", "/").field("percent", 42.0))
//!             .item(|i| i.field("mnt_point", "/data").field("percent", 88.5))
//!             .build(),
//!     )
//!     .unwrap();
//!
//! let resolver = QueryResolver::new(&registry);
//! let root = resolver.route(&Route::parse("fs/mnt_point//").unwrap()).unwrap();
//! assert_eq!(root["/"][0]["percent"], 42.0);
//! assert_eq!(registry.engine().global_status(), Severity::Warning);
//! ```
//!
//! ## Features
//!
//! - `tokio` (default): the [`Collector`] scheduler

mod alert;
mod engine;
mod error;
mod extract;
mod history;
mod limits;
mod process;
mod registry;
mod resolver;
mod route;

#[cfg(feature = "tokio")]
mod collector;

pub use alert::AlertRecord;
pub use engine::{ThresholdEngine, DEFAULT_MAX_ALERTS};
pub use error::{ConfigError, PublishError, QueryError};
pub use history::{format_timestamp, HistorySample, HistoryStore, Timestamp};
pub use limits::{LimitSet, PluginLimits, RawLimit, DEFAULT_HISTORY_SIZE};
pub use process::{NoProcessLookup, ProcessLookup, Resource};
pub use registry::{Published, RegistryBuilder, StatsRegistry, RESERVED_PLUGINS};
pub use resolver::{Query, QueryResolver};
pub use route::Route;

#[cfg(feature = "tokio")]
pub use collector::{BoxError, Collector, CollectorHandle, CycleStats, Producer};

// Re-export types for convenience
pub use hostwatch_types::{PluginSchema, Severity, Shape, Snapshot};
