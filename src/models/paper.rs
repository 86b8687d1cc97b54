//! Paper model: the normalized record every source adapter produces.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::sources::SourceError;

/// The metadata provider a record was retrieved from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    PubMed,
    Arxiv,
    BioRxiv,
    MedRxiv,
}

impl Provider {
    /// All known providers, in registration order
    pub const ALL: [Provider; 4] = [
        Provider::PubMed,
        Provider::Arxiv,
        Provider::BioRxiv,
        Provider::MedRxiv,
    ];

    /// Returns the display name of the provider
    pub fn name(&self) -> &'static str {
        match self {
            Provider::PubMed => "PubMed",
            Provider::Arxiv => "arXiv",
            Provider::BioRxiv => "bioRxiv",
            Provider::MedRxiv => "medRxiv",
        }
    }

    /// Returns the stable identifier used in configuration and rate-limit keys
    pub fn id(&self) -> &'static str {
        match self {
            Provider::PubMed => "pubmed",
            Provider::Arxiv => "arxiv",
            Provider::BioRxiv => "biorxiv",
            Provider::MedRxiv => "medrxiv",
        }
    }
}

impl AsRef<str> for Provider {
    fn as_ref(&self) -> &str {
        self.id()
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Provider {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pubmed" => Ok(Provider::PubMed),
            "arxiv" => Ok(Provider::Arxiv),
            "biorxiv" => Ok(Provider::BioRxiv),
            "medrxiv" => Ok(Provider::MedRxiv),
            other => Err(SourceError::NotFound(format!("Unknown provider '{}'", other))),
        }
    }
}

/// Publication type of a record.
///
/// Adapters assign a type only when the provider states it explicitly;
/// everything else stays [`RecordType::Unknown`] for downstream classifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    ResearchArticle,
    Review,
    SystematicReview,
    MetaAnalysis,
    CaseReport,
    CaseSeries,
    ClinicalTrial,
    RandomizedControlledTrial,
    ObservationalStudy,
    CohortStudy,
    Editorial,
    Letter,
    Commentary,
    Preprint,
    ConferencePaper,
    BookChapter,
    Thesis,
    #[default]
    Unknown,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::ResearchArticle => "research_article",
            RecordType::Review => "review",
            RecordType::SystematicReview => "systematic_review",
            RecordType::MetaAnalysis => "meta_analysis",
            RecordType::CaseReport => "case_report",
            RecordType::CaseSeries => "case_series",
            RecordType::ClinicalTrial => "clinical_trial",
            RecordType::RandomizedControlledTrial => "randomized_controlled_trial",
            RecordType::ObservationalStudy => "observational_study",
            RecordType::CohortStudy => "cohort_study",
            RecordType::Editorial => "editorial",
            RecordType::Letter => "letter",
            RecordType::Commentary => "commentary",
            RecordType::Preprint => "preprint",
            RecordType::ConferencePaper => "conference_paper",
            RecordType::BookChapter => "book_chapter",
            RecordType::Thesis => "thesis",
            RecordType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        let record_type = match normalized.as_str() {
            "research_article" | "article" => RecordType::ResearchArticle,
            "review" => RecordType::Review,
            "systematic_review" => RecordType::SystematicReview,
            "meta_analysis" => RecordType::MetaAnalysis,
            "case_report" => RecordType::CaseReport,
            "case_series" => RecordType::CaseSeries,
            "clinical_trial" => RecordType::ClinicalTrial,
            "randomized_controlled_trial" | "rct" => RecordType::RandomizedControlledTrial,
            "observational_study" => RecordType::ObservationalStudy,
            "cohort_study" => RecordType::CohortStudy,
            "editorial" => RecordType::Editorial,
            "letter" => RecordType::Letter,
            "commentary" | "comment" => RecordType::Commentary,
            "preprint" => RecordType::Preprint,
            "conference_paper" => RecordType::ConferencePaper,
            "book_chapter" => RecordType::BookChapter,
            "thesis" => RecordType::Thesis,
            "unknown" => RecordType::Unknown,
            _ => {
                return Err(SourceError::InvalidQuery(format!(
                    "Unknown record type '{}'",
                    s
                )))
            }
        };
        Ok(record_type)
    }
}

/// One author of a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub affiliation: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    /// Persistent author identifier such as an ORCID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Author {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            affiliation: None,
            country: None,
            identifier: None,
            email: None,
        }
    }

    pub fn with_affiliation(mut self, affiliation: impl Into<String>) -> Self {
        self.affiliation = Some(affiliation.into());
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// A bibliographic record normalized across providers.
///
/// Adapters construct papers through [`PaperBuilder::build`], which rejects
/// an empty `id`. The fields are public, so a struct literal bypasses that
/// check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    /// Provider-native identifier (PMID, arXiv id, preprint DOI)
    pub id: String,

    pub doi: Option<String>,

    pub provider: Provider,

    pub title: String,

    #[serde(rename = "abstract")]
    pub r#abstract: String,

    pub authors: Vec<Author>,

    pub keywords: Vec<String>,

    pub journal: Option<String>,
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub pages: Option<String>,

    pub publication_date: Option<NaiveDate>,

    /// Publication year, derived from `publication_date` when one is known
    pub year: Option<i32>,

    pub record_type: RecordType,

    /// Provider-specific subject tags (arXiv categories, bioRxiv collections)
    pub subject_categories: Vec<String>,

    /// Controlled vocabulary terms such as MeSH descriptors
    pub controlled_terms: Vec<String>,

    pub landing_url: Option<String>,
    pub pdf_url: Option<String>,

    /// Identifier in a secondary repository (PMC id, published-version DOI)
    pub secondary_id: Option<String>,

    pub language: Option<String>,

    /// Author countries in order of first appearance
    pub countries: Vec<String>,

    /// Provider payload fragments kept for debugging and enrichment
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub raw_payload: HashMap<String, serde_json::Value>,
}

impl Paper {
    /// Primary author name, if any
    pub fn first_author(&self) -> Option<&str> {
        self.authors.first().map(|a| a.name.as_str())
    }

    pub fn is_preprint(&self) -> bool {
        self.record_type == RecordType::Preprint
    }
}

/// Builder for creating Paper instances
#[derive(Debug, Clone)]
pub struct PaperBuilder {
    paper: Paper,
}

impl PaperBuilder {
    /// Create a new builder with the identity fields
    pub fn new(id: impl Into<String>, provider: Provider) -> Self {
        Self {
            paper: Paper {
                id: id.into().trim().to_string(),
                doi: None,
                provider,
                title: String::new(),
                r#abstract: String::new(),
                authors: Vec::new(),
                keywords: Vec::new(),
                journal: None,
                volume: None,
                issue: None,
                pages: None,
                publication_date: None,
                year: None,
                record_type: RecordType::Unknown,
                subject_categories: Vec::new(),
                controlled_terms: Vec::new(),
                landing_url: None,
                pdf_url: None,
                secondary_id: None,
                language: None,
                countries: Vec::new(),
                raw_payload: HashMap::new(),
            },
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.paper.title = title.into();
        self
    }

    pub fn abstract_text(mut self, abstract_text: impl Into<String>) -> Self {
        self.paper.r#abstract = abstract_text.into();
        self
    }

    /// Set DOI; blank values are ignored
    pub fn doi(mut self, doi: impl Into<String>) -> Self {
        self.paper.doi = non_empty(doi.into());
        self
    }

    pub fn authors(mut self, authors: Vec<Author>) -> Self {
        self.paper.authors = authors;
        self
    }

    pub fn author(mut self, author: Author) -> Self {
        self.paper.authors.push(author);
        self
    }

    pub fn keywords(mut self, keywords: Vec<String>) -> Self {
        self.paper.keywords = keywords;
        self
    }

    pub fn journal(mut self, journal: impl Into<String>) -> Self {
        self.paper.journal = non_empty(journal.into());
        self
    }

    pub fn volume(mut self, volume: impl Into<String>) -> Self {
        self.paper.volume = non_empty(volume.into());
        self
    }

    pub fn issue(mut self, issue: impl Into<String>) -> Self {
        self.paper.issue = non_empty(issue.into());
        self
    }

    pub fn pages(mut self, pages: impl Into<String>) -> Self {
        self.paper.pages = non_empty(pages.into());
        self
    }

    /// Set the publication date; also sets `year`
    pub fn publication_date(mut self, date: NaiveDate) -> Self {
        self.paper.publication_date = Some(date);
        self.paper.year = Some(date.year());
        self
    }

    /// Set the year when no full date is known
    pub fn year(mut self, year: i32) -> Self {
        self.paper.year = Some(year);
        self
    }

    pub fn record_type(mut self, record_type: RecordType) -> Self {
        self.paper.record_type = record_type;
        self
    }

    pub fn subject_categories(mut self, categories: Vec<String>) -> Self {
        self.paper.subject_categories = categories;
        self
    }

    pub fn controlled_terms(mut self, terms: Vec<String>) -> Self {
        self.paper.controlled_terms = terms;
        self
    }

    pub fn landing_url(mut self, url: impl Into<String>) -> Self {
        self.paper.landing_url = non_empty(url.into());
        self
    }

    pub fn pdf_url(mut self, url: impl Into<String>) -> Self {
        self.paper.pdf_url = non_empty(url.into());
        self
    }

    pub fn secondary_id(mut self, id: impl Into<String>) -> Self {
        self.paper.secondary_id = non_empty(id.into());
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.paper.language = non_empty(language.into());
        self
    }

    /// Attach a provider payload fragment
    pub fn raw(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.paper.raw_payload.insert(key.into(), value.into());
        self
    }

    /// Build the paper, rejecting records without an identity
    pub fn build(mut self) -> Result<Paper, SourceError> {
        if self.paper.id.is_empty() {
            return Err(SourceError::Parse(format!(
                "{} record has no identifier",
                self.paper.provider.name()
            )));
        }

        let mut countries: Vec<String> = Vec::new();
        for country in self.paper.authors.iter().filter_map(|a| a.country.as_ref()) {
            if !countries.contains(country) {
                countries.push(country.clone());
            }
        }
        self.paper.countries = countries;

        Ok(self.paper)
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
