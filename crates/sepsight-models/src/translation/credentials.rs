//! API key lookup for the remote translator
//!
//! The environment variable wins; YAML secrets files are consulted only when
//! the variable is unset or blank, the project file before the one in the
//! user's home directory. A missing key is not an error.

use crate::config::TranslationConfig;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Where to look for the translation API key
#[derive(Debug, Clone)]
pub struct CredentialSource {
    env_var: String,
    secrets_files: Vec<PathBuf>,
}

impl CredentialSource {
    pub fn new(env_var: impl Into<String>) -> Self {
        Self {
            env_var: env_var.into(),
            secrets_files: Vec::new(),
        }
    }

    /// Add a secrets file, consulted after those already added
    pub fn with_secrets_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.secrets_files.push(path.into());
        self
    }

    pub fn from_config(config: &TranslationConfig) -> Self {
        let mut source =
            Self::new(config.credential_env.clone()).with_secrets_file(config.secrets_path.clone());
        if config.secrets_path.is_relative() {
            if let Some(home) = dirs::home_dir() {
                source = source.with_secrets_file(home.join(&config.secrets_path));
            }
        }
        source
    }

    /// Resolve the key, if one is configured anywhere
    pub fn resolve(&self) -> Option<String> {
        if let Some(key) = std::env::var(&self.env_var).ok().and_then(non_blank) {
            return Some(key);
        }
        self.secrets_files
            .iter()
            .find_map(|path| self.read_secrets_file(path))
    }

    fn read_secrets_file(&self, path: &Path) -> Option<String> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                debug!("No secrets file at {}: {}", path.display(), e);
                return None;
            }
        };

        let secrets: BTreeMap<String, serde_yaml::Value> = match serde_yaml::from_str(&content) {
            Ok(secrets) => secrets,
            Err(e) => {
                warn!("Ignoring unreadable secrets file {}: {}", path.display(), e);
                return None;
            }
        };

        secrets
            .get(&self.env_var)
            .and_then(serde_yaml::Value::as_str)
            .and_then(|s| non_blank(s.to_string()))
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
