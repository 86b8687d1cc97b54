//! Utility modules supporting the crawl pipeline.
//!
//! - [`RateLimiter`]: per-provider token buckets shared by all adapters
//! - [`HttpClient`]: the retrying request executor that classifies responses
//! - [`RetryConfig`] / [`with_retry`]: exponential backoff for transient faults
//! - [`xml`]: an owned XML element tree for mixed-content records
//! - [`CrawlStream`]: the lazy search, batch, fetch and parse pipeline
//!
//! # Rate limiting
//!
//! ```rust,no_run
//! use research_crawler::utils::RateLimiter;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let limiter = RateLimiter::with_rates([("pubmed", 3.0), ("arxiv", 1.0)]);
//! let waited = limiter.acquire("pubmed").await;
//! assert!(waited.is_zero());
//! # }
//! ```

mod http;
mod rate_limit;
mod retry;
pub mod streaming;
pub mod xml;

pub use http::{HttpClient, HttpResponse, DEFAULT_RETRY_AFTER, RATE_LIMIT_HEADER};
pub use rate_limit::{RateLimiter, TokenBucket, DEFAULT_RATE};
pub use retry::{with_retry, RetryConfig, TransientError};
pub use streaming::{
    CrawlReport, CrawlReportHandle, CrawlState, CrawlStream, PaperStream, SkippedBatch,
    SkippedRecord,
};
