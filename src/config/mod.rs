//! Configuration management.
//!
//! Settings are layered: serde defaults, then an optional TOML file, then
//! `RESEARCH_CRAWLER__SECTION__KEY` environment variables.

mod file_config;

pub use file_config::{default_config_paths, find_config_file, ConfigError};

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::models::{MatchPolicy, Provider};

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "RESEARCH_CRAWLER";

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// HTTP client settings
    #[serde(default)]
    pub client: ClientConfig,

    /// API keys for providers that accept them
    #[serde(default)]
    pub api_keys: ApiKeys,

    /// Provider base URLs
    #[serde(default)]
    pub endpoints: Endpoints,

    /// Rate limiting settings
    #[serde(default)]
    pub rate_limits: RateLimitConfig,

    /// Retry policy for transient network faults
    #[serde(default)]
    pub retry: RetrySettings,

    /// Identifiers per fetch call
    #[serde(default)]
    pub batch_sizes: BatchSizes,

    /// Local matching for providers without keyword search
    #[serde(default)]
    pub matching: MatchPolicy,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Descriptive client identifier sent as User-Agent
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Contact address sent to providers that ask for one
    #[serde(default)]
    pub contact_email: Option<String>,

    /// Tool name reported to NCBI E-utilities
    #[serde(default = "default_tool_name")]
    pub tool_name: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            contact_email: std::env::var("RESEARCH_CRAWLER_CONTACT_EMAIL").ok(),
            tool_name: default_tool_name(),
            timeout_secs: default_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl ClientConfig {
    /// User-Agent including the contact address when one is configured
    pub fn full_user_agent(&self) -> String {
        match &self.contact_email {
            Some(email) if !email.trim().is_empty() => {
                format!("{} (+mailto:{})", self.user_agent, email.trim())
            }
            _ => self.user_agent.clone(),
        }
    }
}

fn default_user_agent() -> String {
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_tool_name() -> String {
    env!("CARGO_PKG_NAME").to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

/// API keys for external services
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKeys {
    /// NCBI E-utilities API key (optional, raises the PubMed rate limit)
    #[serde(default)]
    pub pubmed: Option<String>,
}

impl Default for ApiKeys {
    fn default() -> Self {
        Self {
            pubmed: std::env::var("NCBI_API_KEY").ok(),
        }
    }
}

/// Provider base URLs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoints {
    #[serde(default = "default_pubmed_url")]
    pub pubmed: String,

    #[serde(default = "default_arxiv_url")]
    pub arxiv: String,

    /// Shared by bioRxiv and medRxiv
    #[serde(default = "default_biorxiv_url")]
    pub biorxiv: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            pubmed: default_pubmed_url(),
            arxiv: default_arxiv_url(),
            biorxiv: default_biorxiv_url(),
        }
    }
}

fn default_pubmed_url() -> String {
    "https://eutils.ncbi.nlm.nih.gov/entrez/eutils".to_string()
}

fn default_arxiv_url() -> String {
    "https://export.arxiv.org/api/query".to_string()
}

fn default_biorxiv_url() -> String {
    "https://api.biorxiv.org".to_string()
}

/// Per-source rate limit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRate {
    pub source: String,
    pub requests_per_second: f64,
}

/// Rate limiting configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Rate for providers without an entry in `sources`
    #[serde(default = "default_rps")]
    pub default_requests_per_second: f64,

    /// Documented limits of each provider
    #[serde(default = "default_source_rates")]
    pub sources: Vec<SourceRate>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_requests_per_second: default_rps(),
            sources: default_source_rates(),
        }
    }
}

impl RateLimitConfig {
    /// Configured rate for a provider
    pub fn rate_for(&self, provider: Provider) -> f64 {
        self.sources
            .iter()
            .find(|s| s.source.eq_ignore_ascii_case(provider.id()))
            .map(|s| s.requests_per_second)
            .unwrap_or(self.default_requests_per_second)
    }
}

fn default_rps() -> f64 {
    1.0
}

fn default_source_rates() -> Vec<SourceRate> {
    [
        (Provider::PubMed, 3.0),
        (Provider::Arxiv, 1.0),
        (Provider::BioRxiv, 2.0),
        (Provider::MedRxiv, 2.0),
    ]
    .into_iter()
    .map(|(provider, rate)| SourceRate {
        source: provider.id().to_string(),
        requests_per_second: rate,
    })
    .collect()
}

/// Retry policy settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

/// Identifiers fetched per request batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSizes {
    #[serde(default = "default_pubmed_batch")]
    pub pubmed: usize,

    #[serde(default = "default_arxiv_batch")]
    pub arxiv: usize,

    /// Shared by bioRxiv and medRxiv
    #[serde(default = "default_biorxiv_batch")]
    pub biorxiv: usize,
}

impl Default for BatchSizes {
    fn default() -> Self {
        Self {
            pubmed: default_pubmed_batch(),
            arxiv: default_arxiv_batch(),
            biorxiv: default_biorxiv_batch(),
        }
    }
}

impl BatchSizes {
    pub fn for_provider(&self, provider: Provider) -> usize {
        match provider {
            Provider::PubMed => self.pubmed,
            Provider::Arxiv => self.arxiv,
            Provider::BioRxiv | Provider::MedRxiv => self.biorxiv,
        }
    }
}

fn default_pubmed_batch() -> usize {
    200
}

fn default_arxiv_batch() -> usize {
    100
}

fn default_biorxiv_batch() -> usize {
    100
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Load configuration from a file, with environment overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::from(path))
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?;

    Ok(settings.try_deserialize()?)
}

/// Load configuration from environment overrides only
pub fn get_config() -> Result<Config, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?;

    Ok(settings.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.rate_limits.rate_for(Provider::PubMed), 3.0);
        assert_eq!(config.rate_limits.rate_for(Provider::Arxiv), 1.0);
        assert_eq!(config.rate_limits.rate_for(Provider::MedRxiv), 2.0);
        assert_eq!(config.batch_sizes.for_provider(Provider::PubMed), 200);
        assert_eq!(config.batch_sizes.for_provider(Provider::BioRxiv), 100);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.client.timeout_secs, 30);
        assert_eq!(config.logging.format, LogFormat::Text);
        assert!(!config.matching.case_sensitive);
    }

    #[test]
    fn test_unknown_provider_rate_falls_back_to_default() {
        let config = RateLimitConfig {
            default_requests_per_second: 0.5,
            sources: Vec::new(),
        };
        assert_eq!(config.rate_for(Provider::Arxiv), 0.5);
    }

    #[test]
    fn test_full_user_agent() {
        let mut client = ClientConfig {
            user_agent: "research-crawler/0.1.0".to_string(),
            contact_email: None,
            ..ClientConfig::default()
        };
        assert_eq!(client.full_user_agent(), "research-crawler/0.1.0");

        client.contact_email = Some("lab@example.org".to_string());
        assert_eq!(
            client.full_user_agent(),
            "research-crawler/0.1.0 (+mailto:lab@example.org)"
        );
    }
}
