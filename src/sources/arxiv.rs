//! arXiv source implementation.
//!
//! The export API answers both searches and id lookups with an Atom feed,
//! parsed here with `feed-rs`.

use async_trait::async_trait;
use chrono::Datelike;
use feed_rs::model::Entry;
use feed_rs::parser;
use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use url::Url;

use crate::config::Config;
use crate::models::{Author, FilterCriteria, Paper, PaperBuilder, Provider, RecordType};
use crate::sources::{rate_limited_get, Source, SourceError};
use crate::utils::{HttpClient, RateLimiter};

/// Base URL for arXiv abstract pages
const ARXIV_ABS_URL: &str = "https://arxiv.org/abs";
/// Base URL for arXiv PDFs
const ARXIV_PDF_URL: &str = "https://arxiv.org/pdf";

/// Largest page the export API serves comfortably
const SEARCH_PAGE_SIZE: usize = 100;

/// First year with arXiv submissions
const ARXIV_FIRST_YEAR: i32 = 1991;

/// arXiv source
///
/// Every record is a preprint.
#[derive(Debug, Clone)]
pub struct ArxivSource {
    client: HttpClient,
    limiter: Arc<RateLimiter>,
    base_url: String,
    batch_size: usize,
    search_page_size: usize,
}

impl ArxivSource {
    /// Create an arXiv source with default endpoint and batch size
    pub fn new(client: HttpClient, limiter: Arc<RateLimiter>) -> Self {
        let defaults = Config::default();
        Self {
            client,
            limiter,
            base_url: defaults.endpoints.arxiv,
            batch_size: defaults.batch_sizes.arxiv,
            search_page_size: SEARCH_PAGE_SIZE,
        }
    }

    pub fn from_config(config: &Config, client: HttpClient, limiter: Arc<RateLimiter>) -> Self {
        Self {
            client,
            limiter,
            base_url: config.endpoints.arxiv.clone(),
            batch_size: config.batch_sizes.for_provider(Provider::Arxiv),
            search_page_size: SEARCH_PAGE_SIZE,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set the number of entries requested per search page
    pub fn with_search_page_size(mut self, page_size: usize) -> Self {
        self.search_page_size = page_size.max(1);
        self
    }

    /// Build the `search_query` expression
    ///
    /// A query without a field prefix (`ti:`, `au:`, `abs:` ...) is searched
    /// across all fields. A year range becomes a `submittedDate` clause; an
    /// open bound falls back to the first arXiv year or the current year.
    pub fn build_search_query(query: &str, filters: &FilterCriteria) -> String {
        let mut parts = Vec::new();

        let query = query.trim();
        if !query.is_empty() {
            if has_field_prefix(query) {
                let dated = filters.year_start.is_some() || filters.year_end.is_some();
                if dated && query.contains(char::is_whitespace) {
                    parts.push(format!("({})", query));
                } else {
                    parts.push(query.to_string());
                }
            } else {
                parts.push(format!("all:{}", query));
            }
        }

        if filters.year_start.is_some() || filters.year_end.is_some() {
            let start = filters.year_start.unwrap_or(ARXIV_FIRST_YEAR);
            let end = filters
                .year_end
                .unwrap_or_else(|| chrono::Utc::now().year());
            parts.push(format!(
                "submittedDate:[{}01010000 TO {}12312359]",
                start, end
            ));
        }

        parts.join(" AND ")
    }

    /// Split an Atom entry id such as `http://arxiv.org/abs/2301.12345v2`
    /// into the bare arXiv id and its version
    pub fn parse_id(raw: &str) -> (String, Option<String>) {
        let raw = raw.trim();
        let id = raw
            .rsplit_once("/abs/")
            .map(|(_, id)| id)
            .unwrap_or(raw)
            .trim_matches('/');

        match id.rsplit_once('v') {
            Some((base, version))
                if !base.is_empty()
                    && !version.is_empty()
                    && version.chars().all(|c| c.is_ascii_digit()) =>
            {
                (base.to_string(), Some(version.to_string()))
            }
            _ => (id.to_string(), None),
        }
    }

    /// Map one Atom entry to a paper
    pub fn parse_entry(entry: &Entry) -> Result<Paper, SourceError> {
        let (id, version) = Self::parse_id(&entry.id);

        let title = entry
            .title
            .as_ref()
            .map(|t| collapse_whitespace(&t.content))
            .unwrap_or_default();
        let summary = entry
            .summary
            .as_ref()
            .map(|s| collapse_whitespace(&s.content))
            .unwrap_or_default();

        let authors: Vec<Author> = entry
            .authors
            .iter()
            .map(|a| a.name.trim())
            .filter(|name| !name.is_empty())
            .map(Author::new)
            .collect();

        // arXiv lists the primary category first
        let mut categories: Vec<String> = Vec::new();
        for category in &entry.categories {
            let term = category.term.trim();
            if !term.is_empty() && !categories.iter().any(|c| c == term) {
                categories.push(term.to_string());
            }
        }

        let doi = entry
            .links
            .iter()
            .find(|l| l.title.as_deref() == Some("doi"))
            .map(|l| match l.href.split_once("doi.org/") {
                Some((_, doi)) => doi.to_string(),
                None => l.href.clone(),
            });

        let pdf_url = entry
            .links
            .iter()
            .find(|l| {
                l.media_type.as_deref() == Some("application/pdf")
                    || l.title.as_deref() == Some("pdf")
            })
            .map(|l| l.href.clone())
            .unwrap_or_else(|| format!("{}/{}", ARXIV_PDF_URL, id));

        let landing_url = entry
            .links
            .iter()
            .find(|l| l.rel.as_deref() == Some("alternate"))
            .map(|l| l.href.clone())
            .unwrap_or_else(|| format!("{}/{}", ARXIV_ABS_URL, id));

        let mut builder = PaperBuilder::new(id.clone(), Provider::Arxiv)
            .title(title)
            .abstract_text(summary)
            .authors(authors)
            .subject_categories(categories)
            .record_type(RecordType::Preprint)
            .landing_url(landing_url)
            .pdf_url(pdf_url)
            .raw("arxiv_id", id);

        if let Some(doi) = doi {
            builder = builder.doi(doi);
        }
        if let Some(published) = entry.published {
            builder = builder.publication_date(published.date_naive());
        }
        if let Some(updated) = entry.updated {
            builder = builder.raw("updated", updated.to_rfc3339());
        }
        if let Some(version) = version {
            builder = builder.raw("version", version);
        }

        builder.build()
    }

    async fn get_feed(&self, url: &Url) -> Result<Vec<Entry>, SourceError> {
        let response =
            rate_limited_get(&self.limiter, &self.client, Provider::Arxiv, url.as_str()).await?;
        let feed = parser::parse(response.body.as_bytes())?;

        // The API reports bad queries as a single entry under /api/errors
        if let Some(error) = feed.entries.iter().find(|e| e.id.contains("/api/errors")) {
            let message = error
                .summary
                .as_ref()
                .map(|s| collapse_whitespace(&s.content))
                .unwrap_or_else(|| error.id.clone());
            return Err(SourceError::InvalidQuery(format!(
                "arXiv rejected query: {}",
                message
            )));
        }

        Ok(feed.entries)
    }
}

#[async_trait]
impl Source for ArxivSource {
    type RawRecord = Entry;

    fn provider(&self) -> Provider {
        Provider::Arxiv
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn search(
        &self,
        query: &str,
        filters: &FilterCriteria,
    ) -> Result<Vec<String>, SourceError> {
        let search_query = Self::build_search_query(query, filters);
        if search_query.is_empty() {
            return Err(SourceError::InvalidQuery(
                "arXiv requires a query or a year range".to_string(),
            ));
        }
        tracing::info!(query = %search_query, max_results = filters.max_results, "Searching arXiv");

        let mut ids: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut offset = 0usize;
        while ids.len() < filters.max_results {
            let page_size = (filters.max_results - ids.len()).min(self.search_page_size);
            let url = Url::parse_with_params(
                &self.base_url,
                &[
                    ("search_query", search_query.clone()),
                    ("start", offset.to_string()),
                    ("max_results", page_size.to_string()),
                    ("sortBy", "submittedDate".to_string()),
                    ("sortOrder", "descending".to_string()),
                ],
            )?;

            let entries = match self.get_feed(&url).await {
                Ok(entries) => entries,
                Err(e) if offset == 0 => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        start = offset,
                        error = %e,
                        "arXiv search page failed, keeping identifiers gathered so far"
                    );
                    break;
                }
            };
            let received = entries.len();
            offset += received;
            for entry in entries {
                let (id, _) = Self::parse_id(&entry.id);
                if !id.is_empty() && seen.insert(id.clone()) {
                    ids.push(id);
                }
            }

            if received < page_size {
                break;
            }
        }

        ids.truncate(filters.max_results);
        tracing::info!(found = ids.len(), "arXiv search complete");
        Ok(ids)
    }

    async fn fetch(&self, ids: &[String]) -> Result<Vec<Entry>, SourceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let url = Url::parse_with_params(
            &self.base_url,
            &[
                ("id_list", ids.join(",")),
                ("max_results", ids.len().to_string()),
            ],
        )?;

        tracing::debug!(count = ids.len(), "Fetching arXiv entries");
        let entries = self.get_feed(&url).await?;
        tracing::debug!(requested = ids.len(), received = entries.len(), "Fetched arXiv entries");
        Ok(entries)
    }

    fn parse(&self, raw: &Entry) -> Result<Paper, SourceError> {
        Self::parse_entry(raw)
    }
}

fn field_prefix_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:^|[\s(])(?:ti|au|abs|co|jr|cat|rn|id|all|submittedDate|lastUpdatedDate):").ok()
    })
    .as_ref()
}

/// Whether the query already uses arXiv field syntax such as `ti:` or `au:`
fn has_field_prefix(query: &str) -> bool {
    field_prefix_regex().is_some_and(|re| re.is_match(query))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
