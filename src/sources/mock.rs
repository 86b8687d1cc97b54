//! Scripted source for exercising the crawl pipeline without a network.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::models::{FilterCriteria, Paper, PaperBuilder, Provider, RecordType};
use crate::sources::{Source, SourceError};

/// Failure a [`MockSource`] can be told to produce
#[derive(Debug, Clone, PartialEq)]
pub enum MockFailure {
    RateLimited(Duration),
    Unavailable(u16),
    Timeout,
    InvalidQuery(String),
}

impl MockFailure {
    fn to_error(&self, provider: Provider) -> SourceError {
        let provider = provider.id().to_string();
        match self {
            MockFailure::RateLimited(retry_after) => SourceError::RateLimited {
                provider,
                retry_after: *retry_after,
            },
            MockFailure::Unavailable(status) => SourceError::Unavailable {
                provider,
                status: *status,
            },
            MockFailure::Timeout => SourceError::Timeout {
                provider,
                message: "mock timeout".to_string(),
            },
            MockFailure::InvalidQuery(message) => SourceError::InvalidQuery(message.clone()),
        }
    }
}

/// Raw record produced by [`MockSource::fetch`]
#[derive(Debug, Clone, PartialEq)]
pub struct MockRecord {
    pub id: String,
    pub title: String,
    pub preprint: bool,
}

#[derive(Debug, Default)]
struct MockState {
    search_results: Vec<String>,
    search_failure: Option<MockFailure>,
    fetch_failures: HashMap<usize, MockFailure>,
    unparseable: HashSet<String>,
    preprints: HashSet<String>,
    reverse_fetch_order: bool,
    search_calls: usize,
    fetch_calls: Vec<Vec<String>>,
}

/// A mock source that returns scripted identifiers and records, and records
/// every call made to it.
#[derive(Debug)]
pub struct MockSource {
    provider: Provider,
    batch_size: usize,
    state: Mutex<MockState>,
}

impl MockSource {
    /// Create a new mock source.
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            batch_size: 100,
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the identifiers `search` returns.
    pub fn set_search_results(&self, ids: Vec<String>) {
        self.state().search_results = ids;
    }

    /// Make `search` fail.
    pub fn fail_search(&self, failure: MockFailure) {
        self.state().search_failure = Some(failure);
    }

    /// Make the `call`-th (0-based) `fetch` call fail.
    pub fn fail_fetch_call(&self, call: usize, failure: MockFailure) {
        self.state().fetch_failures.insert(call, failure);
    }

    /// Identifiers whose raw records have no identity.
    pub fn set_unparseable(&self, ids: Vec<String>) {
        self.state().unparseable = ids.into_iter().collect();
    }

    /// Identifiers whose records are preprints.
    pub fn set_preprints(&self, ids: Vec<String>) {
        self.state().preprints = ids.into_iter().collect();
    }

    /// Return each batch's records in reverse identifier order.
    pub fn set_reverse_fetch_order(&self, reverse: bool) {
        self.state().reverse_fetch_order = reverse;
    }

    pub fn search_calls(&self) -> usize {
        self.state().search_calls
    }

    /// Every batch `fetch` was called with, in call order.
    pub fn fetch_calls(&self) -> Vec<Vec<String>> {
        self.state().fetch_calls.clone()
    }
}

#[async_trait]
impl Source for MockSource {
    type RawRecord = MockRecord;

    fn provider(&self) -> Provider {
        self.provider
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn search(
        &self,
        _query: &str,
        filters: &FilterCriteria,
    ) -> Result<Vec<String>, SourceError> {
        let mut state = self.state();
        state.search_calls += 1;
        if let Some(failure) = &state.search_failure {
            return Err(failure.to_error(self.provider));
        }
        Ok(state
            .search_results
            .iter()
            .take(filters.max_results)
            .cloned()
            .collect())
    }

    async fn fetch(&self, ids: &[String]) -> Result<Vec<MockRecord>, SourceError> {
        let mut state = self.state();
        let call = state.fetch_calls.len();
        state.fetch_calls.push(ids.to_vec());
        if let Some(failure) = state.fetch_failures.get(&call) {
            return Err(failure.to_error(self.provider));
        }

        let mut records: Vec<MockRecord> = ids
            .iter()
            .map(|id| MockRecord {
                id: if state.unparseable.contains(id) {
                    String::new()
                } else {
                    id.clone()
                },
                title: format!("Record {}", id),
                preprint: state.preprints.contains(id),
            })
            .collect();
        if state.reverse_fetch_order {
            records.reverse();
        }
        Ok(records)
    }

    fn parse(&self, raw: &MockRecord) -> Result<Paper, SourceError> {
        let record_type = if raw.preprint {
            RecordType::Preprint
        } else {
            RecordType::ResearchArticle
        };
        PaperBuilder::new(raw.id.clone(), self.provider)
            .title(raw.title.clone())
            .record_type(record_type)
            .build()
    }
}
