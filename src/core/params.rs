//! LZ-014: Parameter registry for emitted identifiers.
//!
//! Emitted identifiers are published under well-known names such as
//! `/accelerator/network/transitGateways/{name}/id`, scoped to the partition
//! they were provisioned in, so later stages can look them up.

use super::error::StateError;
use super::state::write_atomic;
use super::types::Partition;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Parameter name → value, for one partition.
pub type Parameters = BTreeMap<String, String>;

/// Receives the parameters of each emitted partition.
pub trait ParameterSink {
    fn publish(&mut self, partition: &Partition, parameters: &Parameters) -> Result<(), StateError>;
}

/// In-memory parameter registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryParameters {
    values: BTreeMap<Partition, Parameters>,
}

impl MemoryParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, partition: &Partition, name: &str) -> Option<&str> {
        self.values
            .get(partition)
            .and_then(|p| p.get(name))
            .map(String::as_str)
    }

    pub fn partition(&self, partition: &Partition) -> Option<&Parameters> {
        self.values.get(partition)
    }
}

impl ParameterSink for MemoryParameters {
    fn publish(&mut self, partition: &Partition, parameters: &Parameters) -> Result<(), StateError> {
        self.values
            .entry(partition.clone())
            .or_default()
            .extend(parameters.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }
}

/// Parameters stored as `state/{account}-{region}/parameters.yaml`.
#[derive(Debug, Clone)]
pub struct FileParameterStore {
    state_dir: PathBuf,
}

impl FileParameterStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    pub fn path(&self, partition: &Partition) -> PathBuf {
        parameters_path(&self.state_dir, partition)
    }

    /// Load a partition's parameters; empty when none were published.
    pub fn load(&self, partition: &Partition) -> Result<Parameters, StateError> {
        let path = self.path(partition);
        if !path.exists() {
            return Ok(Parameters::new());
        }
        let content = std::fs::read_to_string(&path).map_err(|source| StateError::Io {
            path: path.clone(),
            source,
        })?;
        serde_yaml_ng::from_str(&content).map_err(|e| StateError::Parse {
            path,
            detail: e.to_string(),
        })
    }
}

impl ParameterSink for FileParameterStore {
    fn publish(&mut self, partition: &Partition, parameters: &Parameters) -> Result<(), StateError> {
        let mut current = self.load(partition)?;
        current.extend(parameters.iter().map(|(k, v)| (k.clone(), v.clone())));
        let yaml =
            serde_yaml_ng::to_string(&current).map_err(|e| StateError::Serialize(e.to_string()))?;
        write_atomic(&self.path(partition), &yaml)
    }
}

/// Parameter file path for a partition.
pub fn parameters_path(state_dir: &Path, partition: &Partition) -> PathBuf {
    state_dir.join(partition.dir_name()).join("parameters.yaml")
}
