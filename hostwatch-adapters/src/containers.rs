//! Container engines and the `containers` plugin producer.
//!
//! Each [`ContainerEngine`] wraps a connection to one container runtime
//! (Docker, Podman, ...). The [`ContainersProducer`] polls every engine,
//! keeps one [`ContainerWatcher`] per running container, and merges all
//! engines into a single keyed list keyed by container `name`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::{Duration, Instant};

use hostwatch_core::{BoxError, Producer};
use hostwatch_types::{FieldKind, PluginSchema, Record, Snapshot, Value};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::AdapterError;

/// Plugin name of the containers producer.
pub const PLUGIN: &str = "containers";

/// Key field of the containers keyed list.
pub const KEY: &str = "name";

/// Minimum time between two version fetches of an engine.
pub const VERSION_UPDATE_INTERVAL: Duration = Duration::from_secs(300);

/// A container as listed by its engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    /// Static attributes: image, status, command, ...
    #[serde(default)]
    pub fields: Record,
}

/// Background collection of one container's activity.
pub trait ContainerWatcher: Send {
    /// Latest activity stats (cpu, memory, io, network).
    fn activity(&mut self) -> Record;

    /// Stop watching. Called once, when the container disappears or the
    /// producer terminates.
    fn stop(&mut self);
}

/// Connection to one container runtime.
pub trait ContainerEngine: Send {
    /// Engine name, unique per kind of engine.
    fn engine(&self) -> &str;

    /// Version information of the connected engine.
    fn version(&mut self) -> Result<Record, AdapterError>;

    /// Current containers; stopped ones only when `all_containers` is set.
    fn list(&mut self, all_containers: bool) -> Result<Vec<ContainerInfo>, AdapterError>;

    /// Start watching a container's activity.
    fn watch(&mut self, container: &ContainerInfo) -> Box<dyn ContainerWatcher>;

    /// Close the connection.
    fn terminate(&mut self);
}

/// Schema of the `containers` plugin.
pub fn schema() -> PluginSchema {
    PluginSchema::keyed_list(PLUGIN, KEY)
        .with_field("name", FieldKind::Text)
        .with_field("id", FieldKind::Text)
        .with_field("engine", FieldKind::Text)
        .with_field("image", FieldKind::Any)
        .with_field("status", FieldKind::Text)
        .with_field("created", FieldKind::Text)
        .with_field("uptime", FieldKind::Text)
        .with_field("command", FieldKind::Any)
        .with_field("ports", FieldKind::Any)
        .with_field("cpu", FieldKind::Map)
        .with_field("memory", FieldKind::Map)
        .with_field("io", FieldKind::Map)
        .with_field("network", FieldKind::Map)
}

struct EngineState {
    engine: Box<dyn ContainerEngine>,
    watchers: HashMap<String, Box<dyn ContainerWatcher>>,
    version: Record,
    last_version_fetch: Option<Instant>,
}

impl EngineState {
    fn name(&self) -> String {
        self.engine.engine().to_string()
    }

    fn update_version(&mut self, now: Instant, interval: Duration) {
        let due = self
            .last_version_fetch
            .map_or(true, |last| now.duration_since(last) >= interval);
        if !due {
            return;
        }

        self.version = match self.engine.version() {
            Ok(version) => version,
            Err(e) => {
                error!("{} version update failed ({})", self.name(), e);
                Record::new()
            }
        };
        self.last_version_fetch = Some(now);
    }

    /// List containers, starting watchers for new ones and stopping those
    /// of containers that are gone. A failed listing yields nothing.
    fn fetch_containers(&mut self, all_containers: bool) -> Vec<ContainerInfo> {
        let containers = match self.engine.list(all_containers) {
            Ok(containers) => containers,
            Err(e) => {
                error!("{} can't get containers list ({})", self.name(), e);
                return Vec::new();
            }
        };

        for container in &containers {
            if !self.watchers.contains_key(&container.id) {
                debug!("{} watching container {}", self.name(), short_id(&container.id));
                let watcher = self.engine.watch(container);
                self.watchers.insert(container.id.clone(), watcher);
            }
        }

        let present: HashSet<&str> = containers.iter().map(|c| c.id.as_str()).collect();
        let absent: Vec<String> = self
            .watchers
            .keys()
            .filter(|id| !present.contains(id.as_str()))
            .cloned()
            .collect();
        for id in absent {
            if let Some(mut watcher) = self.watchers.remove(&id) {
                debug!("{} stopped watching container {}", self.name(), short_id(&id));
                watcher.stop();
            }
        }

        containers
    }

    fn terminate(&mut self) {
        for (_, mut watcher) in self.watchers.drain() {
            watcher.stop();
        }
        self.engine.terminate();
    }
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

/// Producer for the `containers` plugin over any number of engines.
pub struct ContainersProducer {
    engines: Vec<EngineState>,
    all_containers: bool,
    version_interval: Duration,
}

impl std::fmt::Debug for ContainersProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainersProducer")
            .field("engines", &self.engines.iter().map(|e| e.name()).collect::<Vec<_>>())
            .field("all_containers", &self.all_containers)
            .finish()
    }
}

impl Default for ContainersProducer {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainersProducer {
    pub fn new() -> Self {
        Self {
            engines: Vec::new(),
            all_containers: false,
            version_interval: VERSION_UPDATE_INTERVAL,
        }
    }

    /// Add a connected engine.
    pub fn engine(mut self, engine: impl ContainerEngine + 'static) -> Self {
        self.engines.push(EngineState {
            engine: Box::new(engine),
            watchers: HashMap::new(),
            version: Record::new(),
            last_version_fetch: None,
        });
        self
    }

    /// Also list stopped containers.
    pub fn all_containers(mut self, all: bool) -> Self {
        self.all_containers = all;
        self
    }

    /// Override the version refresh interval.
    pub fn version_interval(mut self, interval: Duration) -> Self {
        self.version_interval = interval;
        self
    }

    /// Last fetched version information per engine.
    pub fn versions(&self) -> BTreeMap<String, Record> {
        self.engines
            .iter()
            .map(|e| (e.name(), e.version.clone()))
            .collect()
    }

    /// Number of active watchers across engines.
    pub fn watcher_count(&self) -> usize {
        self.engines.iter().map(|e| e.watchers.len()).sum()
    }

    /// Poll every engine and merge their containers into one keyed list.
    ///
    /// Container names must be unique across engines; later duplicates
    /// are dropped.
    pub fn stats(&mut self) -> Snapshot {
        let now = Instant::now();
        let mut seen = HashSet::new();
        let mut builder = Snapshot::keyed(KEY);

        for state in &mut self.engines {
            state.update_version(now, self.version_interval);
            let engine = state.name();

            for container in state.fetch_containers(self.all_containers) {
                if !seen.insert(container.name.clone()) {
                    warn!("{} container {} shadows an earlier one", engine, container.name);
                    continue;
                }

                let mut item = container.fields;
                if let Some(watcher) = state.watchers.get_mut(&container.id) {
                    item.extend(watcher.activity());
                }
                item.insert("id".to_string(), Value::from(container.id));
                item.insert("name".to_string(), Value::from(container.name));
                item.insert("engine".to_string(), Value::from(engine.as_str()));
                builder = builder.record(item);
            }
        }

        builder.build()
    }

    /// Stop every watcher and close every engine.
    pub fn terminate(&mut self) {
        for state in &mut self.engines {
            state.terminate();
        }
    }
}

impl Producer for ContainersProducer {
    fn collect(&mut self) -> Result<Snapshot, BoxError> {
        Ok(self.stats())
    }
}
