//! Node-wide engine configuration
//!
//! These are the tunable constants of the engine, fixed at process startup.
//! Every component reads them through the context object that owns them; no
//! global state.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Engine constants for one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Rows per I/O item (the unit of work the master hands out)
    pub io_item_size: i64,

    /// Rows per evaluator invocation inside the eval stages
    pub work_item_size: i64,

    /// Context rows fed to stateful evaluators ahead of each item but not emitted
    pub warmup_size: i64,

    /// Threads in the load stage pool
    pub load_workers_per_node: usize,

    /// Processing units on this node; each owns a pre/eval/post thread triple
    pub pus_per_node: usize,

    /// Threads in the save stage pool
    pub save_workers_per_node: usize,

    /// In-flight item budget per processing unit
    pub tasks_in_queue_per_pu: usize,

    /// Local GPU device ids available to device-typed evaluators
    pub gpu_device_ids: Vec<i32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            io_item_size: 64,
            work_item_size: 8,
            warmup_size: 0,
            load_workers_per_node: 2,
            pus_per_node: 1,
            save_workers_per_node: 2,
            tasks_in_queue_per_pu: 4,
            gpu_device_ids: vec![0],
        }
    }
}

impl EngineConfig {
    /// Load configuration from a YAML manifest; missing fields keep defaults
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Maximum accepted-but-not-retired items a worker keeps in flight
    #[must_use]
    pub fn in_flight_limit(&self) -> usize {
        self.pus_per_node * self.tasks_in_queue_per_pu
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_in_flight_limit() {
        let config = EngineConfig::default();
        assert_eq!(
            config.in_flight_limit(),
            config.pus_per_node * config.tasks_in_queue_per_pu
        );
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "io_item_size: 16\npus_per_node: 2").unwrap();

        let config = EngineConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.io_item_size, 16);
        assert_eq!(config.pus_per_node, 2);
        assert_eq!(config.work_item_size, EngineConfig::default().work_item_size);
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "io_item_size: [not a number").unwrap();
        assert!(EngineConfig::from_yaml_file(file.path()).is_err());
    }
}
