//! Core data models for normalized records and crawl requests.

mod paper;
mod search;

pub use paper::{Author, Paper, PaperBuilder, Provider, RecordType};
pub use search::{FilterCriteria, MatchMode, MatchPolicy, DEFAULT_MAX_RESULTS};
