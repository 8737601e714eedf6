use crate::ServerError;
use kestrel_core::EngineConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_LISTEN: &str = "127.0.0.1:8480";
pub const DEFAULT_WORKERS: usize = 4;

/// Server configuration file.
///
/// ```toml
/// listen = "0.0.0.0:8480"
/// workers = 8
/// scenario_file = "/etc/kestrel/scenarios.toml"
/// journal_dir = "/var/lib/kestrel"
/// provisioner_url = "http://127.0.0.1:9000/v1/network-setup"
///
/// [engine]
/// network_timeout_ms = 10000
/// max_retries = 1
/// terminal_policy = "new-generation"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub listen: String,
    /// HTTP worker threads.
    pub workers: usize,
    /// Scenarios loaded on top of the built-in ones.
    pub scenario_file: Option<PathBuf>,
    /// Journal directory; records are kept in memory only when unset.
    pub journal_dir: Option<PathBuf>,
    /// Network subsystem endpoint; requests are only logged when unset.
    pub provisioner_url: Option<String>,
    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_owned(),
            workers: DEFAULT_WORKERS,
            scenario_file: None,
            journal_dir: None,
            provisioner_url: None,
            engine: EngineConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ServerError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        if self.workers == 0 {
            return Err(ServerError::InvalidConfig(
                "workers must be at least 1".to_owned(),
            ));
        }
        self.engine.validate()?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ServerError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}
