//! Filter criteria describing a single crawl request.

use serde::{Deserialize, Serialize};

use super::RecordType;
use crate::sources::SourceError;

/// Default cap on the number of identifiers a crawl requests
pub const DEFAULT_MAX_RESULTS: usize = 1000;

/// Immutable description of what a crawl should retrieve.
///
/// Built once by the caller and only read by the pipeline. Everything except
/// `exclude_preprints` is translated into the provider's own query grammar;
/// `exclude_preprints` is applied after parsing and never sent upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCriteria {
    /// Inclusive lower bound on publication year
    pub year_start: Option<i32>,

    /// Inclusive upper bound on publication year
    pub year_end: Option<i32>,

    /// Affiliation countries to restrict to
    pub countries: Vec<String>,

    /// Desired publication types
    pub record_types: Vec<RecordType>,

    /// ISO 639-1 language allow-list
    pub languages: Vec<String>,

    /// Hard cap on identifiers requested from the provider
    pub max_results: usize,

    /// Drop preprints from the output stream
    pub exclude_preprints: bool,
}

impl Default for FilterCriteria {
    fn default() -> Self {
        Self {
            year_start: None,
            year_end: None,
            countries: Vec::new(),
            record_types: Vec::new(),
            languages: vec!["en".to_string()],
            max_results: DEFAULT_MAX_RESULTS,
            exclude_preprints: false,
        }
    }
}

impl FilterCriteria {
    /// Create default criteria
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to an inclusive year range
    pub fn years(mut self, start: i32, end: i32) -> Self {
        self.year_start = Some(start);
        self.year_end = Some(end);
        self
    }

    pub fn year_start(mut self, year: i32) -> Self {
        self.year_start = Some(year);
        self
    }

    pub fn year_end(mut self, year: i32) -> Self {
        self.year_end = Some(year);
        self
    }

    pub fn country(mut self, country: impl Into<String>) -> Self {
        self.countries.push(country.into());
        self
    }

    pub fn record_type(mut self, record_type: RecordType) -> Self {
        self.record_types.push(record_type);
        self
    }

    /// Replace the language allow-list
    pub fn languages(mut self, languages: Vec<String>) -> Self {
        self.languages = languages;
        self
    }

    pub fn max_results(mut self, max: usize) -> Self {
        self.max_results = max;
        self
    }

    pub fn exclude_preprints(mut self, exclude: bool) -> Self {
        self.exclude_preprints = exclude;
        self
    }

    /// Reject criteria no provider could satisfy
    pub fn validate(&self) -> Result<(), SourceError> {
        if let (Some(start), Some(end)) = (self.year_start, self.year_end) {
            if start > end {
                return Err(SourceError::InvalidQuery(format!(
                    "year range is inverted: {} > {}",
                    start, end
                )));
            }
        }
        if self.max_results == 0 {
            return Err(SourceError::InvalidQuery(
                "max_results must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// How free-text terms are matched against fetched text by providers that
/// lack a keyword-search endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// The whole query must appear as one substring
    #[default]
    Phrase,
    /// Every whitespace-separated term must appear somewhere
    AllTerms,
}

/// Local text-matching policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MatchPolicy {
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub mode: MatchMode,
}

impl MatchPolicy {
    /// Whether `query` matches any of `fields`. An empty query matches everything.
    pub fn matches(&self, query: &str, fields: &[&str]) -> bool {
        let query = query.trim();
        if query.is_empty() {
            return true;
        }

        let fold = |s: &str| {
            if self.case_sensitive {
                s.to_string()
            } else {
                s.to_lowercase()
            }
        };
        let haystack = fields.iter().map(|f| fold(*f)).collect::<Vec<_>>().join("\n");
        let needle = fold(query);

        match self.mode {
            MatchMode::Phrase => haystack.contains(&needle),
            MatchMode::AllTerms => needle.split_whitespace().all(|term| haystack.contains(term)),
        }
    }
}
