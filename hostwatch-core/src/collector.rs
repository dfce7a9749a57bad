//! Periodic collection: one task per plugin feeding the registry.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hostwatch_types::Snapshot;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::PublishError;
use crate::registry::StatsRegistry;

/// Error type producers may return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Source of one plugin's snapshots.
///
/// `collect` may block on OS calls; it runs on the blocking thread pool.
pub trait Producer: Send + 'static {
    fn collect(&mut self) -> Result<Snapshot, BoxError>;
}

impl<F> Producer for F
where
    F: FnMut() -> Result<Snapshot, BoxError> + Send + 'static,
{
    fn collect(&mut self) -> Result<Snapshot, BoxError> {
        self()
    }
}

type SharedProducer = Arc<Mutex<Box<dyn Producer>>>;

/// Per-plugin collection counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    /// Snapshots published.
    pub cycles: u64,
    /// Collections that failed or were rejected.
    pub failures: u64,
    /// Ticks dropped because a collection was still running.
    pub skipped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    cycles: AtomicU64,
    failures: AtomicU64,
    skipped: AtomicU64,
}

impl Counters {
    fn load(&self) -> CycleStats {
        CycleStats {
            cycles: self.cycles.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

struct Entry {
    plugin: String,
    producer: SharedProducer,
    counters: Arc<Counters>,
}

/// Drives producers on a fixed cadence.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use hostwatch_core::{BoxError, Collector, PluginLimits, StatsRegistry};
/// use hostwatch_types::{FieldKind, PluginSchema, Snapshot};
///
/// #[tokio::main]
/// async fn main() {
///     let registry = Arc::new(
///         StatsRegistry::builder()
///             .plugin(
///                 PluginSchema::single("load").with_field("min1", FieldKind::Number),
///                 PluginLimits::default(),
///             )
///             .build()
///             .unwrap(),
///     );
///
///     let handle = Collector::new(registry.clone())
///         .interval(Duration::from_secs(2))
///         .producer("load", || -> Result<Snapshot, BoxError> {
///             Ok(Snapshot::single().field("min1", 0.42).build())
///         })
///         .start();
///
///     tokio::time::sleep(Duration::from_secs(5)).await;
///     handle.shutdown().await;
/// }
/// ```
pub struct Collector {
    registry: Arc<StatsRegistry>,
    entries: Vec<Entry>,
    interval: Duration,
}

impl std::fmt::Debug for Collector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector")
            .field("plugins", &self.entries.iter().map(|e| &e.plugin).collect::<Vec<_>>())
            .field("interval", &self.interval)
            .finish()
    }
}

impl Collector {
    /// Create a collector with a 2 second interval.
    pub fn new(registry: Arc<StatsRegistry>) -> Self {
        Self {
            registry,
            entries: Vec::new(),
            interval: Duration::from_secs(2),
        }
    }

    /// Set the collection interval.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Add the producer for a plugin.
    pub fn producer(self, plugin: impl Into<String>, producer: impl Producer) -> Self {
        self.boxed_producer(plugin, Box::new(producer))
    }

    /// Add an already boxed producer.
    pub fn boxed_producer(mut self, plugin: impl Into<String>, producer: Box<dyn Producer>) -> Self {
        self.entries.push(Entry {
            plugin: plugin.into(),
            producer: Arc::new(Mutex::new(producer)),
            counters: Arc::new(Counters::default()),
        });
        self
    }

    /// Run every producer once, concurrently, and wait for all publishes.
    /// Returns the number of plugins published.
    pub async fn run_once(&self) -> usize {
        let mut set = JoinSet::new();
        for entry in &self.entries {
            set.spawn(run_cycle(
                self.registry.clone(),
                entry.plugin.clone(),
                entry.producer.clone(),
                entry.counters.clone(),
            ));
        }

        let mut published = 0;
        while let Some(result) = set.join_next().await {
            if matches!(result, Ok(true)) {
                published += 1;
            }
        }
        published
    }

    /// Start one background task per plugin.
    ///
    /// Each task waits for its own collection before taking the next tick,
    /// so a slow producer skips ticks instead of piling up collections.
    pub fn start(self) -> CollectorHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let interval = self.interval;
        let mut tasks = Vec::with_capacity(self.entries.len());
        let mut counters = BTreeMap::new();

        for entry in self.entries {
            counters.insert(entry.plugin.clone(), entry.counters.clone());
            let registry = self.registry.clone();
            let mut stop_rx = stop_rx.clone();

            tasks.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    tokio::select! {
                        biased;

                        changed = stop_rx.changed() => {
                            if changed.is_err() || *stop_rx.borrow() {
                                break;
                            }
                        }
                        _ = ticker.tick() => {
                            let started = Instant::now();
                            run_cycle(
                                registry.clone(),
                                entry.plugin.clone(),
                                entry.producer.clone(),
                                entry.counters.clone(),
                            )
                            .await;

                            let elapsed = started.elapsed();
                            if elapsed > interval {
                                let missed = (elapsed.as_nanos() / interval.as_nanos()) as u64;
                                entry.counters.skipped.fetch_add(missed, Ordering::Relaxed);
                                debug!(
                                    "Collection of {} took {:?}, skipped {} cycles",
                                    entry.plugin, elapsed, missed
                                );
                            }
                        }
                    }
                }
                debug!("Collector for {} stopped", entry.plugin);
            }));
        }

        info!(
            "Collector started for {} plugins every {:?}",
            tasks.len(),
            interval
        );
        CollectorHandle {
            stop_tx,
            tasks,
            counters,
            registry: self.registry,
        }
    }
}

/// Collect one snapshot and publish it. Returns true when published.
async fn run_cycle(
    registry: Arc<StatsRegistry>,
    plugin: String,
    producer: SharedProducer,
    counters: Arc<Counters>,
) -> bool {
    let collected = tokio::task::spawn_blocking(move || producer.lock().collect()).await;

    let failure = match collected {
        Ok(Ok(snapshot)) => match registry.publish(&plugin, snapshot) {
            Ok(()) => {
                counters.cycles.fetch_add(1, Ordering::Relaxed);
                return true;
            }
            Err(PublishError::Closed) => return false,
            Err(e) => e.to_string(),
        },
        Ok(Err(e)) => e.to_string(),
        Err(e) => {
            error!("Producer for {} panicked: {}", plugin, e);
            e.to_string()
        }
    };

    counters.failures.fetch_add(1, Ordering::Relaxed);
    if registry.mark_failed(&plugin) {
        warn!("Collection failed for {}, keeping stale snapshot: {}", plugin, failure);
    } else {
        warn!("Collection failed for {}: {}", plugin, failure);
    }
    false
}

/// Handle to running collection tasks.
///
/// Dropping the handle stops the tasks without waiting for them; call
/// [`shutdown`](Self::shutdown) to drain.
#[derive(Debug)]
pub struct CollectorHandle {
    stop_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    counters: BTreeMap<String, Arc<Counters>>,
    registry: Arc<StatsRegistry>,
}

impl CollectorHandle {
    /// Counters per plugin.
    pub fn stats(&self) -> BTreeMap<String, CycleStats> {
        self.counters
            .iter()
            .map(|(plugin, c)| (plugin.clone(), c.load()))
            .collect()
    }

    /// Stop every task, let in-flight publishes finish, then close the
    /// registry.
    pub async fn shutdown(self) -> BTreeMap<String, CycleStats> {
        let _ = self.stop_tx.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                error!("Collector task failed: {}", e);
            }
        }
        self.registry.close();

        self.counters
            .iter()
            .map(|(plugin, c)| (plugin.clone(), c.load()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::PluginLimits;
    use hostwatch_types::{FieldKind, PluginSchema};
    use std::sync::atomic::AtomicUsize;

    fn registry() -> Arc<StatsRegistry> {
        Arc::new(
            StatsRegistry::builder()
                .plugin(
                    PluginSchema::single("cpu").with_field("total", FieldKind::Number),
                    PluginLimits::default(),
                )
                .plugin(
                    PluginSchema::single("mem").with_field("percent", FieldKind::Number),
                    PluginLimits::default(),
                )
                .build()
                .unwrap(),
        )
    }

    fn cpu(total: f64) -> Snapshot {
        Snapshot::single().field("total", total).build()
    }

    #[tokio::test]
    async fn run_once_publishes_every_plugin() {
        let registry = registry();
        let collector = Collector::new(registry.clone())
            .producer("cpu", || -> Result<Snapshot, BoxError> { Ok(cpu(12.0)) })
            .producer("mem", || -> Result<Snapshot, BoxError> {
                Ok(Snapshot::single().field("percent", 40.0).build())
            });

        assert_eq!(collector.run_once().await, 2);
        assert!(registry.read("cpu").is_ok());
        assert!(registry.read("mem").is_ok());
    }

    #[tokio::test]
    async fn failing_producer_leaves_stale_snapshot() {
        let registry = registry();
        let mut calls = 0;
        let collector = Collector::new(registry.clone()).producer(
            "cpu",
            move || -> Result<Snapshot, BoxError> {
                calls += 1;
                if calls == 1 {
                    Ok(cpu(5.0))
                } else {
                    Err("sensor read failed".into())
                }
            },
        );

        collector.run_once().await;
        assert_eq!(collector.run_once().await, 0);

        let published = registry.read("cpu").unwrap();
        assert!(published.stale);
        assert_eq!(*published.snapshot, cpu(5.0));
        assert_eq!(registry.history().query("cpu", Some("total"), None)["total"].len(), 1);
    }

    #[tokio::test]
    async fn rejected_snapshot_counts_as_failure() {
        let registry = registry();
        let collector = Collector::new(registry.clone()).producer(
            "mem",
            || -> Result<Snapshot, BoxError> { Ok(Snapshot::scalar(1)) },
        );

        assert_eq!(collector.run_once().await, 0);
        assert!(registry.read("mem").is_err());
    }

    #[tokio::test]
    async fn slow_producer_never_overlaps() {
        let registry = registry();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let producer = {
            let running = running.clone();
            let peak = peak.clone();
            move || -> Result<Snapshot, BoxError> {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(30));
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(cpu(1.0))
            }
        };

        let handle = Collector::new(registry.clone())
            .interval(Duration::from_millis(10))
            .producer("cpu", producer)
            .start();
        tokio::time::sleep(Duration::from_millis(200)).await;
        let stats = handle.shutdown().await;

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        let cpu_stats = stats["cpu"];
        assert!(cpu_stats.cycles >= 2);
        assert!(cpu_stats.skipped > 0);
    }

    #[tokio::test]
    async fn shutdown_drains_in_flight_publish() {
        let registry = registry();
        let handle = Collector::new(registry.clone())
            .interval(Duration::from_secs(60))
            .producer("cpu", || -> Result<Snapshot, BoxError> {
                std::thread::sleep(Duration::from_millis(50));
                Ok(cpu(99.0))
            })
            .start();

        tokio::time::sleep(Duration::from_millis(10)).await;
        let stats = handle.shutdown().await;

        assert_eq!(stats["cpu"].cycles, 1);
        assert!(registry.read("cpu").is_ok());
        assert!(registry.is_closed());
    }
}
