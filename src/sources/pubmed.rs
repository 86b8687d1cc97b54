//! PubMed source implementation using the NCBI E-utilities API.
//!
//! `esearch` (JSON) resolves a query into PMIDs; `efetch` (XML) returns full
//! `PubmedArticle` records for a comma-separated batch of PMIDs.

use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, OnceLock};
use url::Url;

use crate::config::Config;
use crate::models::{Author, FilterCriteria, Paper, PaperBuilder, Provider, RecordType};
use crate::sources::{rate_limited_get, Source, SourceError};
use crate::utils::xml::{parse_document, XmlElement, XmlNode};
use crate::utils::{HttpClient, RateLimiter};

/// PubMed web pages
const PUBMED_WEB_URL: &str = "https://pubmed.ncbi.nlm.nih.gov";
/// PubMed Central article pages
const PMC_ARTICLE_URL: &str = "https://www.ncbi.nlm.nih.gov/pmc/articles";

/// Largest `retmax` esearch accepts
const ESEARCH_PAGE_LIMIT: usize = 10_000;

/// esearch only serves the first 9,999 identifiers of a result set;
/// any `retstart` past 9998 is rejected
const ESEARCH_RETRIEVAL_LIMIT: usize = 9_999;

/// Raw record type: one `<PubmedArticle>` element
pub type PubmedArticle = XmlElement;

/// PubMed source
///
/// Uses NCBI E-utilities for searching and fetching PubMed records.
#[derive(Debug, Clone)]
pub struct PubMedSource {
    client: HttpClient,
    limiter: Arc<RateLimiter>,
    base_url: String,
    api_key: Option<String>,
    email: Option<String>,
    tool: String,
    batch_size: usize,
    search_page_size: usize,
}

impl PubMedSource {
    /// Create a PubMed source with default endpoint and batch size
    pub fn new(client: HttpClient, limiter: Arc<RateLimiter>) -> Self {
        let defaults = Config::default();
        Self {
            client,
            limiter,
            base_url: defaults.endpoints.pubmed,
            api_key: None,
            email: None,
            tool: defaults.client.tool_name,
            batch_size: defaults.batch_sizes.pubmed,
            search_page_size: ESEARCH_PAGE_LIMIT,
        }
    }

    /// Create from application configuration
    pub fn from_config(config: &Config, client: HttpClient, limiter: Arc<RateLimiter>) -> Self {
        Self {
            client,
            limiter,
            base_url: config.endpoints.pubmed.clone(),
            api_key: config.api_keys.pubmed.clone(),
            email: config.client.contact_email.clone(),
            tool: config.client.tool_name.clone(),
            batch_size: config.batch_sizes.for_provider(Provider::PubMed),
            search_page_size: ESEARCH_PAGE_LIMIT,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_contact_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set the esearch `retmax` used per page
    pub fn with_search_page_size(mut self, page_size: usize) -> Self {
        self.search_page_size = page_size.clamp(1, ESEARCH_PAGE_LIMIT);
        self
    }

    fn endpoint(&self, utility: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), utility)
    }

    /// Parameters NCBI asks every client to send
    fn common_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("db", "pubmed".to_string()), ("tool", self.tool.clone())];
        if let Some(email) = &self.email {
            params.push(("email", email.clone()));
        }
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }
        params
    }

    /// Build the esearch `term`, translating filters into PubMed field tags
    pub fn build_term(query: &str, filters: &FilterCriteria) -> String {
        let mut clauses = Vec::new();

        match (filters.year_start, filters.year_end) {
            (Some(start), Some(end)) => clauses.push(format!("{}:{}[pdat]", start, end)),
            (Some(start), None) => clauses.push(format!("{}:3000[pdat]", start)),
            (None, Some(end)) => clauses.push(format!("1800:{}[pdat]", end)),
            (None, None) => {}
        }

        let languages: Vec<String> = filters
            .languages
            .iter()
            .map(|code| format!("{}[la]", pubmed_language(code)))
            .collect();
        if !languages.is_empty() {
            clauses.push(format!("({})", languages.join(" OR ")));
        }

        let types: Vec<&str> = filters
            .record_types
            .iter()
            .filter_map(|t| publication_type_tag(*t))
            .collect();
        if !types.is_empty() {
            clauses.push(format!("({})", types.join(" OR ")));
        }

        let countries: Vec<String> = filters
            .countries
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(|c| format!("{}[ad]", c))
            .collect();
        if !countries.is_empty() {
            clauses.push(format!("({})", countries.join(" OR ")));
        }

        let query = query.trim();
        match (query.is_empty(), clauses.is_empty()) {
            (_, true) => query.to_string(),
            (true, false) => clauses.join(" AND "),
            (false, false) => format!("({}) AND {}", query, clauses.join(" AND ")),
        }
    }

    /// Map one `<PubmedArticle>` to a paper
    pub fn parse_article(article: &XmlElement) -> Result<Paper, SourceError> {
        let pmid = article
            .text_at("MedlineCitation/PMID")
            .ok_or_else(|| SourceError::Parse("PubMed article has no PMID".to_string()))?;

        let citation = article.child("MedlineCitation");
        let empty = XmlElement::default();
        let art = citation.and_then(|c| c.child("Article")).unwrap_or(&empty);

        let title = art
            .text_at("ArticleTitle")
            .or_else(|| art.text_at("VernacularTitle"))
            .unwrap_or_default();

        let publication_types: Vec<String> = art
            .find_all("PublicationTypeList/PublicationType")
            .iter()
            .map(|e| e.text())
            .filter(|t| !t.is_empty())
            .collect();

        let doi = article_id(article, "doi").or_else(|| {
            art.children_named("ELocationID")
                .find(|e| e.attr("EIdType") == Some("doi"))
                .map(|e| e.text())
                .filter(|t| !t.is_empty())
        });
        let pmc_id = article_id(article, "pmc");

        let keywords: Vec<String> = citation
            .map(|c| c.descendants("Keyword").iter().map(|k| k.text()).collect::<Vec<_>>())
            .unwrap_or_default()
            .into_iter()
            .filter(|k| !k.is_empty())
            .collect();

        let mesh_terms: Vec<String> = citation
            .map(|c| {
                c.find_all("MeshHeadingList/MeshHeading")
                    .iter()
                    .filter_map(|h| h.text_at("DescriptorName"))
                    .collect()
            })
            .unwrap_or_default();

        let mut builder = PaperBuilder::new(pmid.clone(), Provider::PubMed)
            .title(title)
            .abstract_text(parse_abstract(art))
            .authors(parse_authors(art))
            .keywords(keywords)
            .controlled_terms(mesh_terms)
            .record_type(classify_publication_types(&publication_types))
            .landing_url(format!("{}/{}/", PUBMED_WEB_URL, pmid))
            .raw("pmid", pmid.clone())
            .raw("publication_types", publication_types);

        if let Some(doi) = doi {
            builder = builder.doi(doi);
        }
        if let Some(pmc) = pmc_id {
            builder = builder
                .pdf_url(format!("{}/{}/pdf/", PMC_ARTICLE_URL, pmc))
                .secondary_id(pmc);
        }
        if let Some(journal) = art.text_at("Journal/Title") {
            builder = builder.journal(journal);
        }
        if let Some(abbrev) = art.text_at("Journal/ISOAbbreviation") {
            builder = builder.raw("journal_abbreviation", abbrev);
        }
        if let Some(volume) = art.text_at("Journal/JournalIssue/Volume") {
            builder = builder.volume(volume);
        }
        if let Some(issue) = art.text_at("Journal/JournalIssue/Issue") {
            builder = builder.issue(issue);
        }
        if let Some(pages) = art.text_at("Pagination/MedlinePgn") {
            builder = builder.pages(pages);
        }
        if let Some(language) = art.text_at("Language") {
            builder = builder.language(language);
        }
        match parse_date(art) {
            Some(PublicationDate::Full(date)) => builder = builder.publication_date(date),
            Some(PublicationDate::Year(year)) => builder = builder.year(year),
            None => {}
        }

        builder.build()
    }
}

#[derive(Debug, Deserialize)]
struct EsearchResponse {
    esearchresult: EsearchResult,
}

#[derive(Debug, Deserialize)]
struct EsearchResult {
    #[serde(default)]
    count: Option<String>,
    #[serde(default)]
    idlist: Vec<String>,
    #[serde(rename = "ERROR", default)]
    error: Option<String>,
}

/// One esearch page of identifiers, with the reported result-set size
struct EsearchPage {
    ids: Vec<String>,
    total: usize,
}

impl PubMedSource {
    async fn search_page(
        &self,
        term: &str,
        retstart: usize,
        remaining: usize,
    ) -> Result<EsearchPage, SourceError> {
        let retmax = remaining.min(self.search_page_size);
        let mut params = self.common_params();
        params.push(("term", term.to_string()));
        params.push(("retmode", "json".to_string()));
        params.push(("retmax", retmax.to_string()));
        params.push(("retstart", retstart.to_string()));

        let url = Url::parse_with_params(&self.endpoint("esearch.fcgi"), &params)?;
        let response =
            rate_limited_get(&self.limiter, &self.client, Provider::PubMed, url.as_str()).await?;
        let result = serde_json::from_str::<EsearchResponse>(&response.body)?.esearchresult;

        if let Some(error) = result.error {
            return Err(SourceError::InvalidQuery(format!(
                "PubMed rejected query: {}",
                error
            )));
        }

        let total = result
            .count
            .and_then(|c| c.parse::<usize>().ok())
            .unwrap_or(0);
        Ok(EsearchPage {
            ids: result.idlist,
            total,
        })
    }
}

#[async_trait]
impl Source for PubMedSource {
    type RawRecord = PubmedArticle;

    fn provider(&self) -> Provider {
        Provider::PubMed
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn search(
        &self,
        query: &str,
        filters: &FilterCriteria,
    ) -> Result<Vec<String>, SourceError> {
        let term = Self::build_term(query, filters);
        if term.is_empty() {
            return Err(SourceError::InvalidQuery(
                "PubMed requires a query or at least one filter".to_string(),
            ));
        }
        tracing::info!(term = %term, max_results = filters.max_results, "Searching PubMed");

        let limit = filters.max_results.min(ESEARCH_RETRIEVAL_LIMIT);
        if filters.max_results > limit {
            tracing::warn!(
                requested = filters.max_results,
                limit,
                "esearch cannot page past its retrieval limit, capping identifiers"
            );
        }

        let mut ids: Vec<String> = Vec::new();
        while ids.len() < limit {
            let retstart = ids.len();
            let page = match self.search_page(&term, retstart, limit - retstart).await {
                Ok(page) => page,
                Err(e) if retstart == 0 => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        retstart,
                        error = %e,
                        "esearch page failed, keeping identifiers gathered so far"
                    );
                    break;
                }
            };

            let page_len = page.ids.len();
            ids.extend(page.ids);
            if page_len == 0 || ids.len() >= page.total {
                break;
            }
        }

        ids.truncate(limit);
        tracing::info!(found = ids.len(), "PubMed search complete");
        Ok(ids)
    }

    async fn fetch(&self, ids: &[String]) -> Result<Vec<PubmedArticle>, SourceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut params = self.common_params();
        params.push(("id", ids.join(",")));
        params.push(("retmode", "xml".to_string()));

        let url = Url::parse_with_params(&self.endpoint("efetch.fcgi"), &params)?;
        tracing::debug!(count = ids.len(), "Fetching PubMed articles");
        let response =
            rate_limited_get(&self.limiter, &self.client, Provider::PubMed, url.as_str()).await?;

        let root = parse_document(&response.body)?;
        if root.name != "PubmedArticleSet" {
            let message = root
                .text_at("ERROR")
                .unwrap_or_else(|| format!("unexpected <{}> response", root.name));
            return Err(SourceError::RequestFailed {
                provider: Provider::PubMed.id().to_string(),
                status: Some(response.status),
                message,
            });
        }

        let articles: Vec<PubmedArticle> = root
            .children
            .into_iter()
            .filter_map(|node| match node {
                XmlNode::Element(e) if e.name == "PubmedArticle" => Some(e),
                _ => None,
            })
            .collect();

        tracing::debug!(requested = ids.len(), received = articles.len(), "Fetched PubMed articles");
        Ok(articles)
    }

    fn parse(&self, raw: &PubmedArticle) -> Result<Paper, SourceError> {
        Self::parse_article(raw)
    }
}

/// Labelled sections render as `LABEL: text`, separated by blank lines
fn parse_abstract(article: &XmlElement) -> String {
    let Some(abstract_el) = article.child("Abstract") else {
        return String::new();
    };

    abstract_el
        .children_named("AbstractText")
        .filter_map(|section| {
            let text = section.text();
            if text.is_empty() {
                return None;
            }
            Some(match section.attr("Label") {
                Some(label) if !label.trim().is_empty() => format!("{}: {}", label.trim(), text),
                _ => text,
            })
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn parse_authors(article: &XmlElement) -> Vec<Author> {
    article
        .find_all("AuthorList/Author")
        .into_iter()
        .filter_map(|el| {
            let name = match el.text_at("LastName") {
                Some(last) => {
                    let fore = el.text_at("ForeName").or_else(|| el.text_at("Initials"));
                    match fore {
                        Some(fore) => format!("{} {}", fore, last),
                        None => last,
                    }
                }
                None => el.text_at("CollectiveName")?,
            };

            let mut author = Author::new(name);
            if let Some(affiliation) = el.text_at("AffiliationInfo/Affiliation") {
                if let Some(email) = email_in(&affiliation) {
                    author = author.with_email(email);
                }
                if let Some(country) = country_from_affiliation(&affiliation) {
                    author = author.with_country(country);
                }
                author = author.with_affiliation(affiliation);
            }
            let orcid = el
                .children_named("Identifier")
                .find(|i| i.attr("Source") == Some("ORCID"))
                .map(|i| normalize_orcid(&i.text()))
                .filter(|o| !o.is_empty());
            if let Some(orcid) = orcid {
                author = author.with_identifier(orcid);
            }
            Some(author)
        })
        .collect()
}

fn normalize_orcid(raw: &str) -> String {
    raw.trim()
        .trim_start_matches("https://orcid.org/")
        .trim_start_matches("http://orcid.org/")
        .to_string()
}

fn article_id(article: &XmlElement, id_type: &str) -> Option<String> {
    article
        .find_all("PubmedData/ArticleIdList/ArticleId")
        .into_iter()
        .find(|e| e.attr("IdType") == Some(id_type))
        .map(|e| e.text())
        .filter(|t| !t.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PublicationDate {
    Full(NaiveDate),
    Year(i32),
}

/// Electronic ArticleDate first, then the journal issue PubDate
fn parse_date(article: &XmlElement) -> Option<PublicationDate> {
    if let Some(date) = article.child("ArticleDate").and_then(|d| {
        let year = d.text_at("Year")?.parse().ok()?;
        let month = d.text_at("Month").and_then(|m| parse_month(&m)).unwrap_or(1);
        let day = d.text_at("Day").and_then(|d| d.parse().ok()).unwrap_or(1);
        NaiveDate::from_ymd_opt(year, month, day)
    }) {
        return Some(PublicationDate::Full(date));
    }

    let pub_date = article.find("Journal/JournalIssue/PubDate")?;
    if let Some(year) = pub_date.text_at("Year").and_then(|y| y.parse::<i32>().ok()) {
        let month = pub_date
            .text_at("Month")
            .and_then(|m| parse_month(&m))
            .unwrap_or(1);
        let day = pub_date
            .text_at("Day")
            .and_then(|d| d.parse().ok())
            .unwrap_or(1);
        return Some(
            NaiveDate::from_ymd_opt(year, month, day)
                .or_else(|| NaiveDate::from_ymd_opt(year, month, 1))
                .map(PublicationDate::Full)
                .unwrap_or(PublicationDate::Year(year)),
        );
    }

    // e.g. "1998 Dec-1999 Jan"
    pub_date
        .text_at("MedlineDate")
        .and_then(|text| {
            text.split(|c: char| !c.is_ascii_digit())
                .find(|part| part.len() == 4)
                .and_then(|y| y.parse().ok())
        })
        .map(PublicationDate::Year)
}

fn parse_month(value: &str) -> Option<u32> {
    let value = value.trim();
    if let Ok(n) = value.parse::<u32>() {
        return (1..=12).contains(&n).then_some(n);
    }
    const MONTHS: [&str; 12] = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    let prefix: String = value.chars().take(3).collect::<String>().to_lowercase();
    MONTHS
        .iter()
        .position(|m| *m == prefix)
        .map(|i| i as u32 + 1)
}

/// Most specific publication type wins
fn classify_publication_types(types: &[String]) -> RecordType {
    const PRIORITY: &[(&str, RecordType)] = &[
        ("meta-analysis", RecordType::MetaAnalysis),
        ("systematic review", RecordType::SystematicReview),
        ("randomized controlled trial", RecordType::RandomizedControlledTrial),
        ("clinical trial", RecordType::ClinicalTrial),
        ("observational study", RecordType::ObservationalStudy),
        ("case reports", RecordType::CaseReport),
        ("review", RecordType::Review),
        ("editorial", RecordType::Editorial),
        ("letter", RecordType::Letter),
        ("comment", RecordType::Commentary),
        ("preprint", RecordType::Preprint),
        ("journal article", RecordType::ResearchArticle),
    ];

    let lowered: Vec<String> = types.iter().map(|t| t.to_lowercase()).collect();
    PRIORITY
        .iter()
        .find(|(tag, _)| lowered.iter().any(|t| t.starts_with(tag)))
        .map(|(_, record_type)| *record_type)
        .unwrap_or_default()
}

fn publication_type_tag(record_type: RecordType) -> Option<&'static str> {
    match record_type {
        RecordType::ResearchArticle => Some("journal article[pt]"),
        RecordType::Review => Some("review[pt]"),
        RecordType::SystematicReview => Some("systematic review[pt]"),
        RecordType::MetaAnalysis => Some("meta-analysis[pt]"),
        RecordType::CaseReport => Some("case reports[pt]"),
        RecordType::ClinicalTrial => Some("clinical trial[pt]"),
        RecordType::RandomizedControlledTrial => Some("randomized controlled trial[pt]"),
        RecordType::ObservationalStudy => Some("observational study[pt]"),
        RecordType::Editorial => Some("editorial[pt]"),
        RecordType::Letter => Some("letter[pt]"),
        RecordType::Commentary => Some("comment[pt]"),
        RecordType::Preprint => Some("preprint[pt]"),
        _ => None,
    }
}

/// ISO 639-1 code to the language name PubMed indexes under
fn pubmed_language(code: &str) -> String {
    let name = match code.trim().to_lowercase().as_str() {
        "en" => "english",
        "de" => "german",
        "fr" => "french",
        "es" => "spanish",
        "it" => "italian",
        "pt" => "portuguese",
        "nl" => "dutch",
        "ru" => "russian",
        "ja" => "japanese",
        "zh" => "chinese",
        "ko" => "korean",
        "sv" => "swedish",
        "pl" => "polish",
        other => return other.to_string(),
    };
    name.to_string()
}

const COUNTRY_ALIASES: &[(&str, &str)] = &[
    ("usa", "USA"),
    ("u.s.a", "USA"),
    ("united states", "USA"),
    ("united states of america", "USA"),
    ("uk", "GBR"),
    ("united kingdom", "GBR"),
    ("england", "GBR"),
    ("scotland", "GBR"),
    ("wales", "GBR"),
    ("germany", "DEU"),
    ("china", "CHN"),
    ("japan", "JPN"),
    ("india", "IND"),
    ("france", "FRA"),
    ("italy", "ITA"),
    ("spain", "ESP"),
    ("canada", "CAN"),
    ("australia", "AUS"),
    ("brazil", "BRA"),
    ("korea", "KOR"),
    ("south korea", "KOR"),
    ("republic of korea", "KOR"),
    ("netherlands", "NLD"),
    ("the netherlands", "NLD"),
    ("sweden", "SWE"),
    ("switzerland", "CHE"),
];

fn email_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(?:\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}").ok())
        .as_ref()
}

fn email_in(affiliation: &str) -> Option<String> {
    email_regex()?
        .find(affiliation)
        .map(|m| m.as_str().to_string())
}

/// Best-effort ISO alpha-3 code from the trailing segment of an affiliation
fn country_from_affiliation(affiliation: &str) -> Option<String> {
    let without_email = match email_regex() {
        Some(re) => re.replace_all(affiliation, "").into_owned(),
        None => affiliation.to_string(),
    };
    let cleaned = without_email.replace("Electronic address:", "");

    let last = cleaned
        .split([',', ';'])
        .map(|s| s.trim_matches(|c: char| c == '.' || c.is_whitespace()))
        .filter(|s| !s.is_empty())
        .last()?
        .to_lowercase();

    COUNTRY_ALIASES
        .iter()
        .find(|(alias, _)| last == *alias || last.ends_with(&format!(" {}", alias)))
        .map(|(_, code)| code.to_string())
}
