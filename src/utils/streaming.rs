//! Crawl orchestration as a lazy, pull-driven stream.
//!
//! [`crawl`] runs `search` once, splits the identifiers into batches and then,
//! only as the consumer asks for more records, fetches and parses one batch at
//! a time. Nothing is prefetched: dropping the stream stops all further
//! network activity for that crawl.
//!
//! Failures are isolated at the smallest unit that makes sense. A failed
//! batch or an unparseable record is logged, recorded in the [`CrawlReport`]
//! and skipped. Only a failure to obtain the identifier list ends the crawl,
//! and it is yielded to the consumer as a single `Err`.

use async_stream::stream;
use futures_util::stream::Stream;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use crate::models::{FilterCriteria, Paper, Provider};
use crate::sources::{Source, SourceError};

/// Boxed stream of crawl results
pub type PaperStream<'a> = Pin<Box<dyn Stream<Item = Result<Paper, SourceError>> + Send + 'a>>;

/// Where a crawl currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlState {
    Idle,
    Searching,
    Batching,
    Fetching,
    Parsing,
    Done,
    Failed,
}

/// A batch that was dropped because `fetch` failed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedBatch {
    pub index: usize,
    pub ids: Vec<String>,
    pub kind: &'static str,
    pub reason: String,
}

/// A raw record that could not be parsed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRecord {
    pub batch: usize,
    pub kind: &'static str,
    pub reason: String,
}

/// Running account of what a crawl did and skipped
#[derive(Debug, Clone, Serialize)]
pub struct CrawlReport {
    pub provider: Provider,
    pub state: CrawlState,
    pub identifiers_found: usize,
    pub batches_total: usize,
    pub batches_fetched: usize,
    pub records_yielded: usize,
    /// Records dropped by run-time filters such as `exclude_preprints`
    pub records_filtered: usize,
    pub skipped_batches: Vec<SkippedBatch>,
    pub skipped_records: Vec<SkippedRecord>,
    /// Identifiers that were fetched but produced no record
    pub missing_ids: Vec<String>,
    /// Why the crawl failed, when it did
    pub error: Option<String>,
}

impl CrawlReport {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            state: CrawlState::Idle,
            identifiers_found: 0,
            batches_total: 0,
            batches_fetched: 0,
            records_yielded: 0,
            records_filtered: 0,
            skipped_batches: Vec::new(),
            skipped_records: Vec::new(),
            missing_ids: Vec::new(),
            error: None,
        }
    }

    /// Whether anything was skipped along the way
    pub fn is_partial(&self) -> bool {
        !self.skipped_batches.is_empty()
            || !self.skipped_records.is_empty()
            || !self.missing_ids.is_empty()
    }
}

/// Shared handle to a crawl's report
pub type CrawlReportHandle = Arc<Mutex<CrawlReport>>;

/// The record stream of one crawl, with access to its report
pub struct CrawlStream<'a> {
    inner: PaperStream<'a>,
    report: CrawlReportHandle,
}

impl<'a> CrawlStream<'a> {
    /// Snapshot of the crawl report so far
    pub fn report(&self) -> CrawlReport {
        snapshot(&self.report)
    }

    /// Handle that outlives the stream, for reading the final report
    pub fn report_handle(&self) -> CrawlReportHandle {
        Arc::clone(&self.report)
    }
}

impl std::fmt::Debug for CrawlStream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrawlStream")
            .field("report", &self.report())
            .finish_non_exhaustive()
    }
}

impl Stream for CrawlStream<'_> {
    type Item = Result<Paper, SourceError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

/// Read a report handle without propagating lock poisoning
pub fn snapshot(report: &CrawlReportHandle) -> CrawlReport {
    report.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

fn update(report: &CrawlReportHandle, f: impl FnOnce(&mut CrawlReport)) {
    let mut guard = report.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut guard);
}

/// Run `search → batch → fetch → parse` for one source as a lazy stream
pub fn crawl<'a, S>(source: &'a S, query: &str, filters: &FilterCriteria) -> CrawlStream<'a>
where
    S: Source + 'a,
{
    let query = query.to_string();
    let filters = filters.clone();
    let provider = source.provider();
    let report: CrawlReportHandle = Arc::new(Mutex::new(CrawlReport::new(provider)));
    let handle = Arc::clone(&report);

    let inner = stream! {
        update(&report, |r| r.state = CrawlState::Searching);
        tracing::info!(%provider, query = %query, max_results = filters.max_results, "Starting crawl");

        let search_result = match filters.validate() {
            Ok(()) => source.search(&query, &filters).await,
            Err(e) => Err(e),
        };
        let mut ids = match search_result {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!(%provider, error = %e, "Search failed, aborting crawl");
                update(&report, |r| {
                    r.state = CrawlState::Failed;
                    r.error = Some(e.to_string());
                });
                yield Err(e);
                return;
            }
        };
        ids.truncate(filters.max_results);

        update(&report, |r| r.state = CrawlState::Batching);
        let batch_size = source.batch_size().max(1);
        let batches: Vec<Vec<String>> = ids.chunks(batch_size).map(|c| c.to_vec()).collect();
        update(&report, |r| {
            r.identifiers_found = ids.len();
            r.batches_total = batches.len();
        });
        tracing::debug!(%provider, identifiers = ids.len(), batches = batches.len(), batch_size, "Search complete");

        for (index, batch) in batches.into_iter().enumerate() {
            update(&report, |r| r.state = CrawlState::Fetching);
            let raw = match source.fetch(&batch).await {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(
                        %provider,
                        batch = index,
                        ids = ?batch,
                        error = %e,
                        "Batch fetch failed, skipping"
                    );
                    update(&report, |r| r.skipped_batches.push(SkippedBatch {
                        index,
                        ids: batch,
                        kind: e.kind(),
                        reason: e.to_string(),
                    }));
                    continue;
                }
            };

            update(&report, |r| {
                r.batches_fetched += 1;
                r.state = CrawlState::Parsing;
            });

            let mut parsed = Vec::with_capacity(raw.len());
            for (position, record) in raw.iter().enumerate() {
                match source.parse(record) {
                    Ok(paper) => parsed.push(paper),
                    Err(e) => {
                        tracing::warn!(%provider, batch = index, position, error = %e, "Skipping unparseable record");
                        update(&report, |r| r.skipped_records.push(SkippedRecord {
                            batch: index,
                            kind: e.kind(),
                            reason: e.to_string(),
                        }));
                    }
                }
            }
            drop(raw);

            let (papers, missing) = order_by_identifiers(&batch, parsed);
            if !missing.is_empty() {
                tracing::debug!(%provider, batch = index, missing = ?missing, "Identifiers without records");
                update(&report, |r| r.missing_ids.extend(missing));
            }

            for paper in papers {
                if filters.exclude_preprints && paper.is_preprint() {
                    update(&report, |r| r.records_filtered += 1);
                    continue;
                }
                update(&report, |r| r.records_yielded += 1);
                yield Ok(paper);
            }
        }

        let summary = snapshot(&report);
        update(&report, |r| r.state = CrawlState::Done);
        tracing::info!(
            %provider,
            yielded = summary.records_yielded,
            skipped_batches = summary.skipped_batches.len(),
            skipped_records = summary.skipped_records.len(),
            "Crawl finished"
        );
    };

    CrawlStream {
        inner: Box::pin(inner),
        report: handle,
    }
}

/// Sort papers into the order their identifiers appear in `ids`.
///
/// Papers whose id is not in `ids` keep their relative order at the end.
/// Also returns the identifiers that produced no paper.
fn order_by_identifiers(ids: &[String], mut papers: Vec<Paper>) -> (Vec<Paper>, Vec<String>) {
    let mut position: HashMap<&str, usize> = HashMap::with_capacity(ids.len());
    for (i, id) in ids.iter().enumerate() {
        position.entry(id.as_str()).or_insert(i);
    }
    papers.sort_by_key(|p| position.get(p.id.as_str()).copied().unwrap_or(usize::MAX));

    let missing = {
        let found: HashSet<&str> = papers.iter().map(|p| p.id.as_str()).collect();
        ids.iter()
            .filter(|id| !found.contains(id.as_str()))
            .cloned()
            .collect()
    };
    (papers, missing)
}
