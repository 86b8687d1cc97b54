//! Configuration file support for research-crawler.
//!
//! # Configuration File Format
//!
//! ```toml
//! [client]
//! contact_email = "lab@example.org"
//! timeout_secs = 30
//!
//! [api_keys]
//! pubmed = "your-ncbi-api-key"
//!
//! [endpoints]
//! pubmed = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils"
//!
//! [rate_limits]
//! default_requests_per_second = 1.0
//!
//! [[rate_limits.sources]]
//! source = "pubmed"
//! requests_per_second = 10.0
//!
//! [retry]
//! max_attempts = 3
//! initial_delay_ms = 1000
//! max_delay_ms = 10000
//!
//! [batch_sizes]
//! pubmed = 200
//!
//! [matching]
//! case_sensitive = false
//! mode = "all_terms"
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```

use std::path::{Path, PathBuf};

use super::Config;

/// File name looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "research-crawler.toml";

/// Errors raised while loading or saving configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialize error: {0}")]
    Serialize(String),

    #[error("Configuration error: {0}")]
    Layered(#[from] config::ConfigError),
}

impl Config {
    /// Parse a TOML document; omitted keys take their defaults
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Load from a TOML file without environment overrides
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Save to a TOML file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_toml_string()?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Candidate config file locations, highest priority first
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("research-crawler").join("config.toml"));
    }
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".research-crawler.toml"));
    }
    paths
}

/// First existing config file from [`default_config_paths`]
pub fn find_config_file() -> Option<PathBuf> {
    default_config_paths().into_iter().find(|p| p.is_file())
}
