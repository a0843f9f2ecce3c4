//! Configuration loading from disk.

use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use crate::config::error::ConfigError;
use crate::config::schema::OrchestratorConfig;
use crate::config::validation::validate_config;

/// Load and validate configuration from a YAML file.
pub fn load_config(path: &Path) -> Result<OrchestratorConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

/// Parse and validate configuration from YAML text.
pub fn parse_config(content: &str) -> Result<OrchestratorConfig, ConfigError> {
    let config: OrchestratorConfig = serde_yaml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Command-line values that win over the file on every load and reload.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub bind_address: Option<SocketAddr>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut OrchestratorConfig) {
        if let Some(addr) = self.bind_address {
            config.server.bind_address = addr.to_string();
        }
    }
}
