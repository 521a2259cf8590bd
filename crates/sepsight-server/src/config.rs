//! Server configuration
//!
//! Read from a YAML file when one exists, otherwise defaults. Command line
//! flags override file values.

use sepsight_models::ModelsConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub models: ModelsConfig,
}

/// Command line values that override the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub address: Option<String>,
    pub port: Option<u16>,
    pub predictor_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Load the file at `path` if present and apply overrides
    pub fn load(path: &Path, overrides: &Overrides) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_yaml::from_str(&content)?
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Self::default()
        };

        if let Some(address) = &overrides.address {
            config.server.address = address.clone();
        }

        if let Some(port) = overrides.port {
            config.server.port = port;
        }

        if let Some(dir) = &overrides.predictor_dir {
            config.models.predictor.dir = dir.clone();
        }

        Ok(config)
    }
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_address")]
    pub address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Allow cross-origin requests from anywhere instead of local dev origins
    #[serde(default)]
    pub allow_any_origin: bool,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.address, self.port).parse()?)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            allow_any_origin: false,
        }
    }
}

fn default_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}
