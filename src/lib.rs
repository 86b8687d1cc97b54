//! # Research Crawler
//!
//! A federated crawler that retrieves bibliographic records from PubMed,
//! arXiv, bioRxiv and medRxiv and normalizes them into one [`Paper`] model.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`]: Core data structures (Paper, FilterCriteria, MatchPolicy)
//! - [`sources`]: Provider adapters behind the [`Source`] trait, and the registry
//! - [`utils`]: Rate limiter, retrying HTTP executor, XML tree, crawl stream
//! - [`config`]: Layered configuration
//!
//! ## Example
//!
//! ```rust,no_run
//! use futures_util::StreamExt;
//! use research_crawler::config::Config;
//! use research_crawler::models::{FilterCriteria, Provider};
//! use research_crawler::SourceRegistry;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = SourceRegistry::from_config(&Config::default())?;
//! let filters = FilterCriteria::new().years(2020, 2023).max_results(50);
//!
//! let mut stream = registry.crawl(Provider::PubMed, "crispr", &filters)?;
//! while let Some(result) = stream.next().await {
//!     let paper = result?;
//!     println!("{} {}", paper.id, paper.title);
//! }
//! println!("{:?}", stream.report());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod models;
pub mod sources;
pub mod utils;

// Re-export commonly used types
pub use models::{FilterCriteria, Paper};
pub use sources::{Source, SourceError, SourceRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
