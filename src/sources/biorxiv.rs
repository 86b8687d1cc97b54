//! bioRxiv/medRxiv source implementation.
//!
//! Both servers share one API with a different server segment. The API has
//! no keyword search: `search` pages through the date-range listing and
//! matches title and abstract locally with the configured [`MatchPolicy`].

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::Config;
use crate::models::{
    Author, FilterCriteria, MatchPolicy, Paper, PaperBuilder, Provider, RecordType,
};
use crate::sources::{rate_limited_get, Source, SourceError};
use crate::utils::{HttpClient, RateLimiter};

/// Server type for bioRxiv/medRxiv
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerType {
    BioRxiv,
    MedRxiv,
}

impl ServerType {
    /// Path segment used by the API and the web site
    pub fn name(&self) -> &'static str {
        match self {
            ServerType::BioRxiv => "biorxiv",
            ServerType::MedRxiv => "medrxiv",
        }
    }

    pub fn provider(&self) -> Provider {
        match self {
            ServerType::BioRxiv => Provider::BioRxiv,
            ServerType::MedRxiv => Provider::MedRxiv,
        }
    }

    /// First year the server accepted submissions
    pub fn launch_year(&self) -> i32 {
        match self {
            ServerType::BioRxiv => 2013,
            ServerType::MedRxiv => 2019,
        }
    }

    fn content_url(&self, doi: &str, version: &str) -> String {
        if version.is_empty() {
            format!("https://www.{}.org/content/{}", self.name(), doi)
        } else {
            format!("https://www.{}.org/content/{}v{}", self.name(), doi, version)
        }
    }
}

/// One entry of a `details` collection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BiorxivRecord {
    pub doi: String,
    pub title: String,
    /// `;`-separated author list
    pub authors: String,
    pub author_corresponding: String,
    pub author_corresponding_institution: String,
    pub date: String,
    #[serde(deserialize_with = "string_or_number")]
    pub version: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub license: String,
    pub category: String,
    pub jatsxml: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    /// DOI of the journal version, or `NA`
    pub published: String,
    pub published_journal: Option<String>,
    pub server: String,
}

impl BiorxivRecord {
    fn version_number(&self) -> u32 {
        self.version.trim().parse().unwrap_or(0)
    }

    fn published_doi(&self) -> Option<&str> {
        let published = self.published.trim();
        (!published.is_empty() && !published.eq_ignore_ascii_case("NA")).then_some(published)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DetailsResponse {
    messages: Vec<DetailsMessage>,
    collection: Vec<BiorxivRecord>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DetailsMessage {
    status: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    total: String,
}

impl DetailsResponse {
    fn total(&self) -> usize {
        self.messages
            .first()
            .and_then(|m| m.total.trim().parse().ok())
            .unwrap_or(0)
    }
}

/// The API reports counts and versions as either strings or numbers
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

/// bioRxiv or medRxiv source
#[derive(Debug, Clone)]
pub struct BiorxivSource {
    client: HttpClient,
    limiter: Arc<RateLimiter>,
    server: ServerType,
    base_url: String,
    match_policy: MatchPolicy,
    batch_size: usize,
}

impl BiorxivSource {
    fn with_server(server: ServerType, client: HttpClient, limiter: Arc<RateLimiter>) -> Self {
        let defaults = Config::default();
        Self {
            client,
            limiter,
            server,
            base_url: defaults.endpoints.biorxiv,
            match_policy: defaults.matching,
            batch_size: defaults.batch_sizes.biorxiv,
        }
    }

    /// Create a bioRxiv source
    pub fn biorxiv(client: HttpClient, limiter: Arc<RateLimiter>) -> Self {
        Self::with_server(ServerType::BioRxiv, client, limiter)
    }

    /// Create a medRxiv source
    pub fn medrxiv(client: HttpClient, limiter: Arc<RateLimiter>) -> Self {
        Self::with_server(ServerType::MedRxiv, client, limiter)
    }

    pub fn from_config(
        config: &Config,
        server: ServerType,
        client: HttpClient,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            client,
            limiter,
            server,
            base_url: config.endpoints.biorxiv.clone(),
            match_policy: config.matching,
            batch_size: config.batch_sizes.for_provider(server.provider()),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_match_policy(mut self, policy: MatchPolicy) -> Self {
        self.match_policy = policy;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn server(&self) -> ServerType {
        self.server
    }

    /// Inclusive `YYYY-MM-DD` interval searched for the given filters
    pub fn date_range(&self, filters: &FilterCriteria) -> (String, String) {
        let start = filters.year_start.unwrap_or(self.server.launch_year());
        let end = filters
            .year_end
            .unwrap_or_else(|| chrono::Utc::now().year());
        (format!("{}-01-01", start), format!("{}-12-31", end))
    }

    fn details_url(&self, tail: &str) -> String {
        format!(
            "{}/details/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.server.name(),
            tail
        )
    }

    async fn get_details(&self, url: &str) -> Result<DetailsResponse, SourceError> {
        let response =
            rate_limited_get(&self.limiter, &self.client, self.server.provider(), url).await?;
        Ok(serde_json::from_str(&response.body)?)
    }

    /// Latest version of one preprint, or `None` when the server has no record
    async fn fetch_one(&self, doi: &str) -> Result<Option<BiorxivRecord>, SourceError> {
        let details = self.get_details(&self.details_url(doi)).await?;
        Ok(details
            .collection
            .into_iter()
            .max_by_key(|r| r.version_number()))
    }

    /// Map one record to a paper
    pub fn parse_record(&self, record: &BiorxivRecord) -> Result<Paper, SourceError> {
        let doi = record.doi.trim();

        let corresponding = record.author_corresponding.trim();
        let institution = record.author_corresponding_institution.trim();
        let authors: Vec<Author> = record
            .authors
            .split(';')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| {
                let author = Author::new(name);
                if !institution.is_empty() && same_person(name, corresponding) {
                    author.with_affiliation(institution)
                } else {
                    author
                }
            })
            .collect();

        let categories = match record.category.trim() {
            "" => Vec::new(),
            category => vec![category.to_string()],
        };

        let version = record.version.trim();
        let landing_url = self.server.content_url(doi, version);

        let mut builder = PaperBuilder::new(doi, self.server.provider())
            .doi(doi)
            .title(record.title.trim())
            .abstract_text(record.abstract_text.trim())
            .authors(authors)
            .subject_categories(categories)
            .record_type(RecordType::Preprint)
            .pdf_url(format!("{}.full.pdf", landing_url))
            .landing_url(landing_url)
            .raw("server", self.server.name())
            .raw("version", version)
            .raw("type", record.record_type.as_str())
            .raw("license", record.license.as_str())
            .raw("jatsxml", record.jatsxml.as_str());

        if let Ok(date) = NaiveDate::parse_from_str(record.date.trim(), "%Y-%m-%d") {
            builder = builder.publication_date(date);
        }
        if let Some(published) = record.published_doi() {
            builder = builder.secondary_id(published);
        }
        if let Some(journal) = &record.published_journal {
            builder = builder.journal(journal.as_str());
        }

        builder.build()
    }
}

/// Whether an entry of the author list names the corresponding author.
///
/// The list uses `Surname, Initials` while the corresponding author is given
/// as a full name, so fall back to comparing surnames.
fn same_person(listed: &str, corresponding: &str) -> bool {
    if corresponding.is_empty() {
        return false;
    }
    if listed.eq_ignore_ascii_case(corresponding) {
        return true;
    }
    let surname = listed.split(',').next().unwrap_or(listed).trim();
    corresponding
        .split_whitespace()
        .last()
        .is_some_and(|last| !surname.is_empty() && last.eq_ignore_ascii_case(surname))
}

#[async_trait]
impl Source for BiorxivSource {
    type RawRecord = BiorxivRecord;

    fn provider(&self) -> Provider {
        self.server.provider()
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn search(
        &self,
        query: &str,
        filters: &FilterCriteria,
    ) -> Result<Vec<String>, SourceError> {
        let provider = self.server.provider();
        let (start, end) = self.date_range(filters);
        tracing::info!(
            provider = provider.id(),
            start = %start,
            end = %end,
            query,
            "Scanning preprint listing"
        );

        let mut ids: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut cursor = 0usize;

        while ids.len() < filters.max_results {
            let url = self.details_url(&format!("{}/{}/{}", start, end, cursor));
            let page = match self.get_details(&url).await {
                Ok(page) => page,
                Err(e) if cursor == 0 => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        provider = provider.id(),
                        cursor,
                        error = %e,
                        "Listing page failed, keeping identifiers gathered so far"
                    );
                    break;
                }
            };

            if page.collection.is_empty() {
                if let Some(status) = page.messages.first().and_then(|m| m.status.as_deref()) {
                    tracing::debug!(provider = provider.id(), cursor, status, "Empty listing page");
                }
                break;
            }

            for record in &page.collection {
                if ids.len() >= filters.max_results {
                    break;
                }
                let doi = record.doi.trim();
                if doi.is_empty() || seen.contains(doi) {
                    continue;
                }
                if self
                    .match_policy
                    .matches(query, &[&record.title, &record.abstract_text])
                {
                    seen.insert(doi.to_string());
                    ids.push(doi.to_string());
                }
            }

            cursor += page.collection.len();
            if cursor >= page.total() {
                break;
            }
        }

        tracing::info!(provider = provider.id(), found = ids.len(), scanned = cursor, "Preprint scan complete");
        Ok(ids)
    }

    async fn fetch(&self, ids: &[String]) -> Result<Vec<BiorxivRecord>, SourceError> {
        let provider = self.server.provider();
        let mut records = Vec::with_capacity(ids.len());
        let mut last_error = None;

        for doi in ids {
            match self.fetch_one(doi).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {
                    tracing::debug!(provider = provider.id(), doi = %doi, "No record for DOI");
                }
                Err(e @ SourceError::RateLimited { .. }) => {
                    tracing::warn!(provider = provider.id(), doi = %doi, error = %e, "Rate limited, ending batch early");
                    if records.is_empty() {
                        return Err(e);
                    }
                    break;
                }
                Err(e) => {
                    tracing::warn!(provider = provider.id(), doi = %doi, error = %e, "Failed to fetch DOI");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if records.is_empty() => Err(e),
            _ => Ok(records),
        }
    }

    fn parse(&self, raw: &BiorxivRecord) -> Result<Paper, SourceError> {
        self.parse_record(raw)
    }
}
