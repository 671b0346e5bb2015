//! JSON document store over a data directory
//!
//! Every governance component keeps its whole state in one JSON document and
//! re-reads it on every call. Writes go to a uniquely named sibling file which
//! is then renamed over the target, so readers always observe a complete
//! document. There is no locking: two concurrent read-modify-write cycles can
//! race and the last rename wins.

use crate::error::{Result, SwifterError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Tools configuration override document
pub const TOOLS_CONFIG_FILE: &str = "tools-config.json";

/// Reliability metrics and alert trail
pub const TOOL_METRICS_FILE: &str = "tool-metrics.json";

/// Monthly usage ledger
pub const USAGE_FILE: &str = "usage.json";

/// Payment orders used for premium detection
pub const ORDERS_FILE: &str = "orders.json";

/// Store of JSON documents rooted at a data directory
#[derive(Debug, Clone)]
pub struct JsonStore {
    root: PathBuf,
}

impl JsonStore {
    /// Create a store rooted at `root`. The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Data directory of this store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full path of a named document
    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Read the raw text of a document.
    ///
    /// Returns `None` when the document does not exist or cannot be read.
    pub async fn read_raw(&self, name: &str) -> Option<String> {
        let path = self.path(name);
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => Some(raw),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read document");
                None
            }
        }
    }

    /// Read and parse a document as an untyped JSON value.
    pub async fn read_value(&self, name: &str) -> Option<serde_json::Value> {
        let raw = self.read_raw(name).await?;
        if raw.trim().is_empty() {
            return None;
        }
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(document = name, error = %e, "ignoring unparsable document");
                None
            }
        }
    }

    /// Read a typed document, falling back to `T::default()` when the
    /// document is missing, empty or unparsable.
    pub async fn read<T>(&self, name: &str) -> T
    where
        T: DeserializeOwned + Default,
    {
        let Some(raw) = self.read_raw(name).await else {
            return T::default();
        };
        if raw.trim().is_empty() {
            return T::default();
        }
        match serde_json::from_str(&raw) {
            Ok(value) => {
                tracing::debug!(document = name, "loaded document");
                value
            }
            Err(e) => {
                tracing::warn!(document = name, error = %e, "ignoring unparsable document");
                T::default()
            }
        }
    }

    /// Serialize `value` and atomically replace the named document.
    ///
    /// # Errors
    ///
    /// Returns [`SwifterError::Persistence`] if the directory cannot be
    /// created or the document cannot be written or renamed into place.
    pub async fn write_atomic<T>(&self, name: &str, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let path = self.path(name);
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| SwifterError::Persistence {
                path: self.root.clone(),
                source,
            })?;

        let payload = serde_json::to_vec_pretty(value)?;

        // Unique per writer so concurrent processes never share a temp file.
        let mut pending = PendingWrite::new(
            self.root
                .join(format!("{}.{}.tmp", name, Uuid::new_v4().simple())),
        );
        tokio::fs::write(pending.path(), payload)
            .await
            .map_err(|source| SwifterError::Persistence {
                path: pending.path().to_path_buf(),
                source,
            })?;

        let renamed = tokio::fs::rename(pending.path(), &path).await;
        if let Err(source) = renamed {
            return Err(SwifterError::Persistence { path, source });
        }
        pending.commit();

        tracing::debug!(document = name, "wrote document");
        Ok(())
    }
}

/// Temp file that is removed on drop unless committed.
///
/// Covers failed writes, failed renames and a write future dropped midway.
#[derive(Debug)]
struct PendingWrite {
    path: PathBuf,
    committed: bool,
}

impl PendingWrite {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            committed: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn commit(&mut self) {
        self.committed = true;
    }
}

impl Drop for PendingWrite {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "removed temp file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove temp file")
            }
        }
    }
}
