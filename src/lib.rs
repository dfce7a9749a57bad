//! # hostwatch
//!
//! A host observability agent: plugins publish snapshots of host state,
//! the agent keeps bounded per-field history, evaluates threshold limits
//! into an alert log and answers path-addressed queries.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           Agent                              │
//! │  ┌───────────┐    ┌──────────────────────────────┐           │
//! │  │ Collector │───▶│        StatsRegistry         │           │
//! │  │ (per      │    │  ┌──────────┐ ┌───────────┐  │           │
//! │  │  plugin)  │    │  │ History  │ │ Threshold │  │           │
//! │  └─────▲─────┘    │  │  Store   │ │  Engine   │  │           │
//! │        │          │  └──────────┘ └───────────┘  │           │
//! │  FileProducer     └──────────────▲───────────────┘           │
//! │  Containers                      │                           │
//! │  (closures)              ┌───────┴───────┐    ┌───────────┐  │
//! │                          │ QueryResolver │◀───│  server   │◀─┼── TCP
//! │                          └───────────────┘    └───────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`config`]**: TOML configuration with `HOSTWATCH_` environment
//!   overrides, turned into a validated [`StatsRegistry`]
//! - **[`agent`]**: wires producers to the registry and runs the collector
//!   and query server until shutdown
//! - **[`server`]**: newline-delimited query protocol over TCP
//!
//! The engine lives in [`hostwatch_core`], the data model in
//! [`hostwatch_types`] and the producers in [`hostwatch_adapters`].
//!
//! ## Usage
//!
//! ```bash
//! # Run the agent with a query server
//! hostwatch --config hostwatch.toml --listen 127.0.0.1:61209
//!
//! # Collect once and print one query
//! hostwatch --config hostwatch.toml --query fs/mnt_point//
//! ```
//!
//! ### As a library
//!
//! ```no_run
//! use std::path::Path;
//! use hostwatch::{Agent, AgentConfig};
//!
//! # tokio_test::block_on(async {
//! let config = AgentConfig::load(Path::new("hostwatch.toml"))?;
//! let response = Agent::new(config)?.query_once("pluginslist").await;
//! println!("{}", response);
//! # Ok::<(), anyhow::Error>(())
//! # });
//! ```

pub mod agent;
pub mod config;
pub mod server;

pub use agent::Agent;
pub use config::{AgentConfig, PluginConfig};
pub use server::QueryServer;

pub use hostwatch_core::StatsRegistry;
