//! Agent wiring: registry, producers, collector and query server.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use hostwatch_adapters::FileProducer;
use hostwatch_core::{Collector, Producer, StatsRegistry};
use serde_json::Value as JsonValue;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::AgentConfig;
use crate::server::{self, QueryServer};

/// A configured agent.
///
/// Plugins with a `source` get a [`FileProducer`]; other producers are
/// attached with [`Agent::producer`]. Plugins left without a producer stay
/// registered and answer queries with "no data yet".
pub struct Agent {
    config: AgentConfig,
    registry: Arc<StatsRegistry>,
    producers: BTreeMap<String, Box<dyn Producer>>,
}

impl Agent {
    /// Validate the configuration and build the registry.
    pub fn new(config: AgentConfig) -> Result<Self> {
        let registry = config.registry().context("Invalid plugin configuration")?;
        let mut producers: BTreeMap<String, Box<dyn Producer>> = BTreeMap::new();

        for (name, plugin) in &config.plugins {
            if let Some(source) = &plugin.source {
                let schema = AgentConfig::schema(name, plugin);
                producers.insert(name.clone(), Box::new(FileProducer::new(source, &schema)));
            }
        }

        info!(
            "Configured {} plugins ({} with file sources)",
            config.plugins.len(),
            producers.len()
        );

        Ok(Self {
            config,
            registry: Arc::new(registry),
            producers,
        })
    }

    /// Attach a producer, replacing any file source for the plugin.
    pub fn producer(mut self, plugin: impl Into<String>, producer: impl Producer) -> Result<Self> {
        let plugin = plugin.into();
        if !self.registry.contains(&plugin) {
            anyhow::bail!("No plugin named {} is configured", plugin);
        }
        self.producers.insert(plugin, Box::new(producer));
        Ok(self)
    }

    pub fn registry(&self) -> &Arc<StatsRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    fn collector(&mut self) -> Collector {
        for name in self.registry.list_plugins() {
            if !self.producers.contains_key(name) {
                warn!("Plugin {} has no producer and will never publish", name);
            }
        }

        let interval = Duration::from_secs(self.config.refresh);
        std::mem::take(&mut self.producers)
            .into_iter()
            .fold(
                Collector::new(self.registry.clone()).interval(interval),
                |collector, (plugin, producer)| collector.boxed_producer(plugin, producer),
            )
    }

    /// Run one collection round, then resolve `path`.
    pub async fn query_once(mut self, path: &str) -> JsonValue {
        let published = self.collector().run_once().await;
        info!("Collected {} plugins", published);
        server::respond(&self.registry, path)
    }

    /// Collect and serve until `shutdown` completes, then drain.
    pub async fn run<F>(mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let server = match &self.config.listen {
            Some(addr) => Some(
                QueryServer::bind(addr, self.registry.clone())
                    .await
                    .with_context(|| format!("Failed to bind query server on {}", addr))?,
            ),
            None => None,
        };

        let (stop_tx, stop_rx) = watch::channel(false);
        let server_task = server.map(|server| tokio::spawn(server.serve(stop_rx)));
        let collector = self.collector().start();
        info!("Agent started (refresh {}s)", self.config.refresh);

        shutdown.await;
        info!("Shutting down");

        let _ = stop_tx.send(true);
        if let Some(task) = server_task {
            task.await.context("Query server task failed")?;
        }

        for (plugin, stats) in collector.shutdown().await {
            info!(
                "Plugin {}: {} cycles, {} failures, {} skipped ticks",
                plugin, stats.cycles, stats.failures, stats.skipped
            );
        }
        Ok(())
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("plugins", &self.registry.list_plugins())
            .field("producers", &self.producers.keys().collect::<Vec<_>>())
            .field("refresh", &self.config.refresh)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PluginConfig;
    use hostwatch_core::{BoxError, RawLimit, Severity, Shape, Snapshot};
    use hostwatch_types::{FieldKind, FieldSpec};
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn field(name: &str, kind: FieldKind) -> FieldSpec {
        FieldSpec {
            name: name.to_string(),
            kind,
        }
    }

    fn mem_plugin(source: Option<&std::path::Path>) -> PluginConfig {
        PluginConfig {
            shape: Shape::Single,
            key: None,
            fields: vec![
                field("total", FieldKind::Number),
                field("percent", FieldKind::Number),
            ],
            source: source.map(|p| p.to_path_buf()),
            limits: BTreeMap::from([(
                "mem_percent_warning".to_string(),
                RawLimit::Number(60.0),
            )]),
        }
    }

    fn uptime_plugin() -> PluginConfig {
        PluginConfig {
            shape: Shape::Scalar,
            key: None,
            fields: Vec::new(),
            source: None,
            limits: BTreeMap::new(),
        }
    }

    fn config(plugins: Vec<(&str, PluginConfig)>) -> AgentConfig {
        AgentConfig {
            plugins: plugins
                .into_iter()
                .map(|(name, plugin)| (name.to_string(), plugin))
                .collect(),
            ..AgentConfig::default()
        }
    }

    #[tokio::test]
    async fn query_once_reads_file_sources() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"total": 2048, "percent": 71.5}}"#).unwrap();

        let agent = Agent::new(config(vec![("mem", mem_plugin(Some(file.path())))])).unwrap();
        let registry = agent.registry().clone();

        let response = agent.query_once("mem/percent").await;
        assert_eq!(response, json!({ "status": 200, "body": { "percent": 71.5 } }));
        assert_eq!(registry.engine().global_status(), Severity::Warning);
    }

    #[tokio::test]
    async fn plugin_without_producer_is_unavailable() {
        let agent = Agent::new(config(vec![("uptime", uptime_plugin())])).unwrap();
        let response = agent.query_once("uptime").await;
        assert_eq!(response["status"], 503);
    }

    #[tokio::test]
    async fn attached_producer_replaces_file_source() {
        let agent = Agent::new(config(vec![(
            "mem",
            mem_plugin(Some(std::path::Path::new("/nonexistent/mem.json"))),
        )]))
        .unwrap()
        .producer("mem", || -> Result<Snapshot, BoxError> {
            Ok(Snapshot::single()
                .field("total", 4096)
                .field("percent", 12.0)
                .build())
        })
        .unwrap();

        let response = agent.query_once("mem").await;
        assert_eq!(response["body"], json!({ "total": 4096, "percent": 12.0 }));
    }

    #[test]
    fn producer_for_unknown_plugin_is_rejected() {
        let agent = Agent::new(config(vec![("uptime", uptime_plugin())])).unwrap();
        let result = agent.producer("nope", || -> Result<Snapshot, BoxError> {
            Ok(Snapshot::scalar(1))
        });
        assert!(result.is_err());
    }

    #[test]
    fn invalid_limits_fail_construction() {
        let mut plugin = mem_plugin(None);
        plugin
            .limits
            .insert("mem_percent_critical".to_string(), RawLimit::Number(10.0));
        assert!(Agent::new(config(vec![("mem", plugin)])).is_err());
    }

    #[tokio::test]
    async fn run_drains_and_closes_registry() {
        let agent = Agent::new(AgentConfig {
            listen: Some("127.0.0.1:0".to_string()),
            ..config(vec![("uptime", uptime_plugin())])
        })
        .unwrap()
        .producer("uptime", || -> Result<Snapshot, BoxError> {
            Ok(Snapshot::scalar(3600))
        })
        .unwrap();
        let registry = agent.registry().clone();

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let run = tokio::spawn(agent.run(async {
            let _ = rx.await;
        }));

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(()).unwrap();
        run.await.unwrap().unwrap();

        assert!(registry.is_closed());
        assert!(registry.read("uptime").is_ok());
    }
}
