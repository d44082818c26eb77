//! Persistence gateway: moves store snapshots to and from JSON files.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::entity::{NamedEntity, Scope};
use crate::error::StoreError;

/// Full store contents: scope → entities sorted by case-folded name.
pub type Snapshot = BTreeMap<Scope, Vec<NamedEntity>>;

/// Something a gateway can pull the current state from while it holds its
/// file lock.
pub trait SnapshotSource {
    fn snapshot(&self) -> Snapshot;
    fn scope_snapshot(&self, scope: &Scope) -> Vec<NamedEntity>;
}

/// Reads and writes a store's backing file(s).
///
/// `load_all` never fails: a missing file is empty and a corrupt one is
/// logged and treated as empty. Writes to one file are serialized.
pub trait PersistenceGateway: Send + Sync {
    /// Load every scope, dropping entities that are already expired.
    fn load_all(&self) -> Snapshot;

    /// Load a single scope, if this gateway stores scopes separately.
    fn load_scope(&self, scope: &Scope) -> Option<Vec<NamedEntity>> {
        let _ = scope;
        None
    }

    /// Entities dropped as expired by loads since the last call.
    fn take_expired(&self) -> Vec<(Scope, NamedEntity)> {
        Vec::new()
    }

    /// Replace the persisted state with `snapshot`.
    fn save_all(&self, snapshot: &Snapshot) -> Result<(), StoreError>;

    /// Persist the files backing `scopes`. The state is read from `source`
    /// after the file lock is taken, so the last writer always writes the
    /// newest state.
    fn persist(&self, scopes: &[Scope], source: &dyn SnapshotSource) -> Result<(), StoreError>;

    /// Human-readable location, for logs.
    fn describe(&self) -> String;
}

/// Read and parse a JSON file. Missing → `None`; unreadable or corrupt →
/// logged, `None`.
pub(crate) fn read_document<T: DeserializeOwned>(path: &Path) -> Option<T> {
    if !path.exists() {
        return None;
    }
    match fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(doc) => Some(doc),
            Err(e) => {
                warn!("Failed to parse {}: {e}; treating as empty", path.display());
                None
            }
        },
        Err(e) => {
            warn!("Failed to read {}: {e}; treating as empty", path.display());
            None
        }
    }
}

/// Serialize `value` and replace `path` with it via a sibling temp file, so
/// a reader sees either the old or the new document.
pub(crate) fn write_document<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(value).map_err(|source| StoreError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    let io_err = |source| StoreError::Persistence {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
    }
    let tmp = temp_path(path);
    fs::write(&tmp, json).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(|source| {
        fs::remove_file(&tmp).ok();
        io_err(source)
    })
}

/// Remove a file if present.
pub(crate) fn remove_document(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(StoreError::Persistence {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("allay_gateway_{}", rand::random::<u64>()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn write_then_read() {
        let dir = temp_dir();
        let path = dir.join("nested").join("doc.json");
        let mut doc = HashMap::new();
        doc.insert("a".to_string(), 1);
        write_document(&path, &doc).unwrap();

        let loaded: HashMap<String, i32> = read_document(&path).unwrap();
        assert_eq!(loaded["a"], 1);
        assert!(!dir.join("nested").join("doc.json.tmp").exists());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_and_corrupt_read_as_none() {
        let dir = temp_dir();
        let path = dir.join("doc.json");
        assert!(read_document::<HashMap<String, i32>>(&path).is_none());

        fs::write(&path, "{ \"a\": ").unwrap();
        assert!(read_document::<HashMap<String, i32>>(&path).is_none());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn remove_missing_is_ok() {
        let dir = temp_dir();
        assert!(remove_document(&dir.join("nothing.json")).is_ok());
        fs::remove_dir_all(&dir).ok();
    }
}
