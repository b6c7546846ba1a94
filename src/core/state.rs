//! LZ-011: Partition lock files — load, save (atomic), path derivation.

use super::error::StateError;
use super::events::now_iso8601;
use super::types::{Partition, PartitionLock};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "state.lock.yaml";

/// Lock file path for a partition within the state directory.
pub fn lock_file_path(state_dir: &Path, partition: &Partition) -> PathBuf {
    state_dir.join(partition.dir_name()).join(LOCK_FILE)
}

/// Write a file atomically: temp file in the same directory, then rename.
pub fn write_atomic(path: &Path, content: &str) -> Result<(), StateError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| StateError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, content).map_err(|source| StateError::Io {
        path: tmp.clone(),
        source,
    })?;
    std::fs::rename(&tmp, path).map_err(|source| StateError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_lock_file(path: &Path) -> Result<PartitionLock, StateError> {
    let content = std::fs::read_to_string(path).map_err(|source| StateError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml_ng::from_str(&content).map_err(|e| StateError::Parse {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

/// Load a partition's lock. Returns None if the file doesn't exist.
pub fn load_lock(state_dir: &Path, partition: &Partition) -> Result<Option<PartitionLock>, StateError> {
    let path = lock_file_path(state_dir, partition);
    if !path.exists() {
        return Ok(None);
    }
    read_lock_file(&path).map(Some)
}

/// Load the locks of the given partitions that have one.
pub fn load_locks<'a>(
    state_dir: &Path,
    partitions: impl IntoIterator<Item = &'a Partition>,
) -> Result<HashMap<Partition, PartitionLock>, StateError> {
    let mut locks = HashMap::new();
    for partition in partitions {
        if let Some(lock) = load_lock(state_dir, partition)? {
            locks.insert(partition.clone(), lock);
        }
    }
    Ok(locks)
}

/// Every lock under the state directory, sorted by partition.
pub fn list_locks(state_dir: &Path) -> Result<Vec<PartitionLock>, StateError> {
    if !state_dir.exists() {
        return Ok(Vec::new());
    }
    let entries = std::fs::read_dir(state_dir).map_err(|source| StateError::Io {
        path: state_dir.to_path_buf(),
        source,
    })?;
    let mut locks = Vec::new();
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path().join(LOCK_FILE);
        if path.is_file() {
            locks.push(read_lock_file(&path)?);
        }
    }
    locks.sort_by_key(|l| l.partition());
    Ok(locks)
}

/// Save a lock atomically.
pub fn save_lock(state_dir: &Path, lock: &PartitionLock) -> Result<(), StateError> {
    let path = lock_file_path(state_dir, &lock.partition());
    let yaml = serde_yaml_ng::to_string(lock).map_err(|e| StateError::Serialize(e.to_string()))?;
    write_atomic(&path, &yaml)
}

/// Create an empty lock for a partition.
pub fn new_lock(partition: &Partition) -> PartitionLock {
    PartitionLock {
        schema: "1.0".to_string(),
        account: partition.account.clone(),
        region: partition.region.clone(),
        generated_at: now_iso8601(),
        generator: format!("lzp {}", env!("CARGO_PKG_VERSION")),
        nodes: indexmap::IndexMap::new(),
    }
}
