//! Runtime configuration, loaded from an optional `cellmesh.toml` layered
//! under built-in defaults and `CELLMESH_*` environment overrides.
//!
//! Grounded on the layering precedence (defaults, then file, then
//! environment) the teacher's own config crate uses, but implemented
//! directly against `toml`/`serde` rather than pulling in a dedicated
//! layered-config crate — this workspace's dependency table doesn't
//! carry one, and hand-rolling three flat string lookups is simpler
//! than adding a dependency for it (see DESIGN.md).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RuntimeError};

/// Top-level runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub node: NodeConfig,
    pub invocation: InvocationConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),
            invocation: InvocationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub bind_address: String,
    pub worker_threads: usize,
    pub queue_capacity: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:7000".to_string(),
            worker_threads: std::thread::available_parallelism()
                .map_or(1, std::num::NonZero::get),
            queue_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InvocationConfig {
    pub try_count: u64,
    pub try_pause_millis: u64,
    pub default_call_timeout_millis: i64,
    pub backup_timeout_millis: i64,
    pub monitor_interval_millis: u64,
}

impl Default for InvocationConfig {
    fn default() -> Self {
        Self {
            try_count: 250,
            try_pause_millis: 500,
            default_call_timeout_millis: 60_000,
            backup_timeout_millis: 5_000,
            monitor_interval_millis: 1_000,
        }
    }
}

impl InvocationConfig {
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_millis)
    }
}

impl RuntimeConfig {
    /// Loads from `path` if it exists, falling back to defaults
    /// otherwise, then applies `CELLMESH_*` environment overrides.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path).map_err(|source| RuntimeError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str(&text).map_err(|source| RuntimeError::Parse {
                path: path.to_path_buf(),
                source: Box::new(source),
            })?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(bind) = std::env::var("CELLMESH_NODE_BIND_ADDRESS") {
            self.node.bind_address = bind;
        }
        if let Ok(threads) = std::env::var("CELLMESH_NODE_WORKER_THREADS") {
            if let Ok(threads) = threads.parse() {
                self.node.worker_threads = threads;
            }
        }
        if let Ok(try_count) = std::env::var("CELLMESH_INVOCATION_TRY_COUNT") {
            if let Ok(try_count) = try_count.parse() {
                self.invocation.try_count = try_count;
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.node.worker_threads == 0 {
            return Err(RuntimeError::Validation(
                "node.worker_threads must be positive".to_string(),
            ));
        }
        if self.node.queue_capacity == 0 {
            return Err(RuntimeError::Validation(
                "node.queue_capacity must be positive".to_string(),
            ));
        }
        if self.invocation.try_count == 0 {
            return Err(RuntimeError::Validation(
                "invocation.try_count must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn defaults_are_valid() {
        let config = RuntimeConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test_case(0, 1024, 1; "zero worker threads")]
    #[test_case(1, 0, 1; "zero queue capacity")]
    #[test_case(1, 1024, 0; "zero try count")]
    fn invalid_values_fail_validation(worker_threads: usize, queue_capacity: usize, try_count: u64) {
        let mut config = RuntimeConfig::default();
        config.node.worker_threads = worker_threads;
        config.node.queue_capacity = queue_capacity;
        config.invocation.try_count = try_count;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = RuntimeConfig::load_from_file("/nonexistent/cellmesh.toml").unwrap();
        assert_eq!(config.node.bind_address, "127.0.0.1:7000");
    }

    #[test]
    fn loads_overrides_from_a_real_file() {
        let dir = std::env::temp_dir().join(format!(
            "cellmesh-runtime-config-test-{:?}",
            std::thread::current().id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("cellmesh.toml");
        std::fs::write(
            &path,
            r#"
[node]
bind_address = "0.0.0.0:9000"

[invocation]
try_count = 10
"#,
        )
        .unwrap();

        let config = RuntimeConfig::load_from_file(&path).unwrap();
        assert_eq!(config.node.bind_address, "0.0.0.0:9000");
        assert_eq!(config.invocation.try_count, 10);
        assert_eq!(config.invocation.try_pause_millis, 500);

        std::fs::remove_file(&path).ok();
    }
}
