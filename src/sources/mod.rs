//! Source adapters with a shared, trait-based crawl pipeline.
//!
//! This module defines the [`Source`] trait that every metadata provider
//! implements. An adapter supplies three operations and inherits the crawl
//! orchestration from the provided [`Source::crawl`] method:
//!
//! - [`Source::search`] turns a query and [`FilterCriteria`] into an ordered
//!   list of provider-native identifiers
//! - [`Source::fetch`] retrieves the raw records for one batch of identifiers
//! - [`Source::parse`] maps one raw record into a [`Paper`]
//!
//! Adapters never talk to the network directly; they go through a shared
//! [`HttpClient`](crate::utils::HttpClient) and must acquire the shared
//! [`RateLimiter`](crate::utils::RateLimiter) before every request.
//!
//! # Feature Flags
//!
//! Individual sources can be disabled at compile time using Cargo features:
//!
//! - `pubmed` - Enable PubMed source (default: enabled)
//! - `arxiv` - Enable arXiv source (default: enabled)
//! - `biorxiv` - Enable bioRxiv and medRxiv sources (default: enabled)
//!
//! # Feature Groups
//!
//! - `preprints` - arxiv, biorxiv
//! - `full` - All sources (default)

#[cfg(feature = "source-arxiv")]
pub mod arxiv;
#[cfg(feature = "source-biorxiv")]
pub mod biorxiv;
#[cfg(feature = "source-pubmed")]
pub mod pubmed;

pub mod mock;
mod registry;

pub use mock::MockSource;
pub use registry::{Crawler, SourceRegistry};

#[cfg(feature = "source-arxiv")]
pub use arxiv::ArxivSource;
#[cfg(feature = "source-biorxiv")]
pub use biorxiv::{BiorxivSource, ServerType};
#[cfg(feature = "source-pubmed")]
pub use pubmed::PubMedSource;

use async_trait::async_trait;
use std::time::Duration;

use crate::models::{FilterCriteria, Paper, Provider};
use crate::utils::{streaming, CrawlStream, HttpClient, HttpResponse, RateLimiter};

/// The Source trait defines the interface for all metadata provider adapters.
///
/// # Implementing a New Source
///
/// 1. Pick the raw record type `fetch` produces (an XML element, a feed entry,
///    a deserialized JSON struct)
/// 2. Implement `search`, `fetch` and `parse`
/// 3. Register the adapter with [`SourceRegistry`]
#[async_trait]
pub trait Source: Send + Sync + std::fmt::Debug {
    /// Provider-native record as returned by `fetch`
    type RawRecord: Send + Sync;

    /// Which provider this adapter talks to
    fn provider(&self) -> Provider;

    /// Maximum identifiers per `fetch` call
    fn batch_size(&self) -> usize;

    /// Resolve a query into an ordered list of identifiers, at most
    /// `filters.max_results` long
    async fn search(&self, query: &str, filters: &FilterCriteria)
        -> Result<Vec<String>, SourceError>;

    /// Retrieve raw records for up to `batch_size` identifiers
    async fn fetch(&self, ids: &[String]) -> Result<Vec<Self::RawRecord>, SourceError>;

    /// Map one raw record into a normalized paper.
    ///
    /// Sparse records yield best-effort defaults; only a record without a
    /// resolvable identity is an error.
    fn parse(&self, raw: &Self::RawRecord) -> Result<Paper, SourceError>;

    /// Run the search, batch, fetch and parse pipeline as a lazy stream
    fn crawl<'a>(&'a self, query: &str, filters: &FilterCriteria) -> CrawlStream<'a>
    where
        Self: Sized,
    {
        streaming::crawl(self, query, filters)
    }
}

/// Errors that can occur when talking to a provider
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Request to {provider} timed out: {message}")]
    Timeout { provider: String, message: String },

    #[error("Connection to {provider} failed: {message}")]
    Connection { provider: String, message: String },

    #[error("Rate limit exceeded for {provider}, retry after {}s", .retry_after.as_secs())]
    RateLimited {
        provider: String,
        retry_after: Duration,
    },

    #[error("Source {provider} is unavailable (HTTP {status})")]
    Unavailable { provider: String, status: u16 },

    #[error("Request to {provider} failed: {message}")]
    RequestFailed {
        provider: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl SourceError {
    /// Whether the retrying executor should try again
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Timeout { .. } | SourceError::Connection { .. })
    }

    /// Short machine-readable kind, used in crawl reports
    pub fn kind(&self) -> &'static str {
        match self {
            SourceError::Timeout { .. } => "timeout",
            SourceError::Connection { .. } => "connection",
            SourceError::RateLimited { .. } => "rate_limited",
            SourceError::Unavailable { .. } => "unavailable",
            SourceError::RequestFailed { .. } => "request_failed",
            SourceError::InvalidQuery(_) => "invalid_query",
            SourceError::Parse(_) => "parse",
            SourceError::Config(_) => "config",
            SourceError::NotFound(_) => "not_found",
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(format!("JSON error: {}", err))
    }
}

impl From<quick_xml::Error> for SourceError {
    fn from(err: quick_xml::Error) -> Self {
        SourceError::Parse(format!("XML error: {}", err))
    }
}

impl From<url::ParseError> for SourceError {
    fn from(err: url::ParseError) -> Self {
        SourceError::Config(format!("Invalid URL: {}", err))
    }
}

#[cfg(feature = "source-arxiv")]
impl From<feed_rs::parser::ParseFeedError> for SourceError {
    fn from(err: feed_rs::parser::ParseFeedError) -> Self {
        SourceError::Parse(format!("Feed error: {}", err))
    }
}

/// Acquire a permit, issue a GET, and feed any advertised rate back to the limiter
pub(crate) async fn rate_limited_get(
    limiter: &RateLimiter,
    client: &HttpClient,
    provider: Provider,
    url: &str,
) -> Result<HttpResponse, SourceError> {
    limiter.acquire(provider).await;
    let response = client.get(provider.id(), url).await?;
    limiter.observe_advertised_rate(provider, response.advertised_rate);
    Ok(response)
}
