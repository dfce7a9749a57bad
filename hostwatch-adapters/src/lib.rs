//! # hostwatch-adapters
//!
//! Snapshot producers for hostwatch plugins.
//!
//! ## Producers
//!
//! - [`FileProducer`] - reads a plugin's snapshot from a JSON file written
//!   by an external collector
//! - [`ContainersProducer`] - aggregates one or more container engines into
//!   the `containers` keyed list
//!
//! Both implement [`hostwatch_core::Producer`] and plug into a
//! [`hostwatch_core::Collector`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hostwatch_adapters::FileProducer;
//! use hostwatch_types::{FieldKind, PluginSchema};
//!
//! let schema = PluginSchema::single("mem").with_field("percent", FieldKind::Number);
//! let mut producer = FileProducer::new("/run/hostwatch/mem.json", &schema);
//!
//! let snapshot = producer.read()?;
//! println!("Read {} snapshot", snapshot.shape());
//! # Ok::<(), hostwatch_adapters::AdapterError>(())
//! ```

pub mod containers;
pub mod error;
pub mod file;

pub use containers::{ContainerEngine, ContainerInfo, ContainerWatcher, ContainersProducer};
pub use error::AdapterError;
pub use file::FileProducer;
