//! DIRECTIVE: Deployment configuration
//!
//! Per-deployment knobs for the planning engine: which encoder wraps the
//! transport boundary, the default obfuscator, jitter bounds and the
//! untrusted-agent policy.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors in configuration systems
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("DATA LINK ERROR: {0}")]
    Io(#[from] std::io::Error),

    #[error("DECODE FAILED: {0}")]
    Json(#[from] serde_json::Error),

    #[error("DIRECTIVE NOT FOUND: {0}")]
    NotFound(PathBuf),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Deployment-wide engine parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Data encoder applied to payloads crossing the transport boundary
    #[serde(default = "default_encoder")]
    pub encoder: String,
    /// Default obfuscator for new operations
    #[serde(default = "default_obfuscator")]
    pub obfuscator: String,
    /// Default jitter bounds in seconds (min, max)
    #[serde(default = "default_jitter")]
    pub jitter: (u64, u64),
    /// Whether untrusted agents may receive links by default
    #[serde(default)]
    pub allow_untrusted: bool,
    /// Bounded backoff while an operation sits paused, seconds
    #[serde(default = "default_pause_backoff")]
    pub pause_backoff_secs: u64,
}

fn default_encoder() -> String {
    "base64".to_string()
}

fn default_obfuscator() -> String {
    "plain-text".to_string()
}

fn default_jitter() -> (u64, u64) {
    (2, 8)
}

fn default_pause_backoff() -> u64 {
    5
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            encoder: default_encoder(),
            obfuscator: default_obfuscator(),
            jitter: default_jitter(),
            allow_untrusted: false,
            pause_backoff_secs: default_pause_backoff(),
        }
    }
}

impl DeployConfig {
    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        debug!("Loaded deploy config from {}", path.display());
        Ok(config)
    }

    /// Load from a JSON file, falling back to defaults when missing
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Using default deploy config: {}", e);
                Self::default()
            }
        }
    }

    /// Save to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DeployConfig::default();
        assert_eq!(config.encoder, "base64");
        assert_eq!(config.obfuscator, "plain-text");
        assert_eq!(config.jitter, (2, 8));
        assert!(!config.allow_untrusted);
        assert_eq!(config.pause_backoff_secs, 5);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: DeployConfig = serde_json::from_str(r#"{"obfuscator":"base64"}"#).unwrap();
        assert_eq!(config.obfuscator, "base64");
        assert_eq!(config.encoder, "base64");
        assert_eq!(config.jitter, (2, 8));
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let result = DeployConfig::load("/nonexistent/deploy.json");
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_or_default_on_missing() {
        let config = DeployConfig::load_or_default("/nonexistent/deploy.json");
        assert_eq!(config.encoder, "base64");
    }
}
