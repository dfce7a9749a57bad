//! File-based producer.
//!
//! Reads one plugin's snapshot from a JSON document on disk.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use hostwatch_core::{BoxError, Producer};
use hostwatch_types::{PluginSchema, Shape, Snapshot, Value};
use tracing::debug;

use crate::AdapterError;

/// A producer that reads snapshots from a JSON file.
///
/// Some external collector writes the file; this producer shapes it with
/// the plugin's schema every cycle. The document is only re-read when the
/// file's modification time changes.
#[derive(Debug)]
pub struct FileProducer {
    path: PathBuf,
    description: String,
    shape: Shape,
    key: Option<String>,
    last_modified: Option<SystemTime>,
    cached_snapshot: Option<Snapshot>,
}

impl FileProducer {
    /// Create a producer for `path`, shaped for `schema`.
    pub fn new<P: AsRef<Path>>(path: P, schema: &PluginSchema) -> Self {
        let path = path.as_ref().to_path_buf();
        let description = format!("file: {}", path.display());
        Self {
            path,
            description,
            shape: schema.shape,
            key: schema.key.clone(),
            last_modified: None,
            cached_snapshot: None,
        }
    }

    /// Returns the path being read.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Read the file and shape it into a snapshot.
    ///
    /// A missing or unreadable file is an error even when an earlier read
    /// succeeded; the previous snapshot is only reused while the file is
    /// unchanged.
    pub fn read(&mut self) -> Result<Snapshot, AdapterError> {
        let modified = fs::metadata(&self.path)?.modified().ok();

        if let (Some(cached), Some(last), Some(current)) =
            (&self.cached_snapshot, self.last_modified, modified)
        {
            if current <= last {
                return Ok(cached.clone());
            }
        }

        let content = fs::read_to_string(&self.path)?;
        let value: Value = serde_json::from_str(&content)?;
        let snapshot = Snapshot::from_value(self.shape, self.key.as_deref(), value)?;
        debug!("Read {} from {}", snapshot.shape(), self.description);

        self.last_modified = modified;
        self.cached_snapshot = Some(snapshot.clone());
        Ok(snapshot)
    }
}

impl Producer for FileProducer {
    fn collect(&mut self) -> Result<Snapshot, BoxError> {
        Ok(self.read()?)
    }
}
