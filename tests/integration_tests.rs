//! Integration tests for the crawl pipeline.
//!
//! Each test stands up a mock provider with mockito and runs a full
//! search, batch, fetch and parse crawl against it.

use futures_util::StreamExt;
use mockito::{Matcher, Server};
use research_crawler::config::{Config, RetrySettings, SourceRate};
use research_crawler::models::{FilterCriteria, Paper, Provider};
use research_crawler::utils::{CrawlReport, CrawlState, CrawlStream, HttpClient, RateLimiter, RetryConfig};
use research_crawler::SourceError;
use std::sync::Arc;
use std::time::Duration;

fn fast_client() -> HttpClient {
    HttpClient::new().unwrap().with_retry_config(RetryConfig {
        max_attempts: 2,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        backoff_multiplier: 2.0,
    })
}

fn fast_limiter() -> Arc<RateLimiter> {
    Arc::new(RateLimiter::with_rates(
        Provider::ALL.iter().map(|p| (p.id(), 1000.0)),
    ))
}

/// Drain a crawl, returning the records and the final report
async fn collect(mut stream: CrawlStream<'_>) -> (Vec<Result<Paper, SourceError>>, CrawlReport) {
    let mut items = Vec::new();
    while let Some(item) = stream.next().await {
        items.push(item);
    }
    (items, stream.report())
}

fn ids(items: &[Result<Paper, SourceError>]) -> Vec<String> {
    items
        .iter()
        .filter_map(|r| r.as_ref().ok())
        .map(|p| p.id.clone())
        .collect()
}

#[cfg(feature = "source-pubmed")]
mod pubmed {
    use super::*;
    use research_crawler::sources::{PubMedSource, Source, SourceRegistry};

    fn article(pmid: &str, title: &str) -> String {
        format!(
            r#"<PubmedArticle>
  <MedlineCitation>
    <PMID Version="1">{pmid}</PMID>
    <Article>
      <Journal><JournalIssue><PubDate><Year>2021</Year><Month>Mar</Month><Day>02</Day></PubDate></JournalIssue><Title>Cell</Title></Journal>
      <ArticleTitle>{title}</ArticleTitle>
      <PublicationTypeList><PublicationType>Journal Article</PublicationType></PublicationTypeList>
    </Article>
  </MedlineCitation>
</PubmedArticle>"#
        )
    }

    fn article_set(articles: &[String]) -> String {
        format!(
            "<?xml version=\"1.0\"?>\n<PubmedArticleSet>{}</PubmedArticleSet>",
            articles.join("\n")
        )
    }

    fn esearch_body(ids: &[&str]) -> String {
        serde_json::json!({
            "header": {"type": "esearch", "version": "0.3"},
            "esearchresult": {
                "count": ids.len().to_string(),
                "retmax": ids.len().to_string(),
                "retstart": "0",
                "idlist": ids,
            }
        })
        .to_string()
    }

    fn source(server: &Server, batch_size: usize) -> PubMedSource {
        PubMedSource::new(fast_client(), fast_limiter())
            .with_base_url(server.url())
            .with_batch_size(batch_size)
    }

    #[tokio::test]
    async fn test_crawl_through_registry_orders_records() {
        let mut server = Server::new_async().await;
        let search = server
            .mock("GET", "/esearch.fcgi")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("db".into(), "pubmed".into()),
                Matcher::UrlEncoded("retmode".into(), "json".into()),
                Matcher::UrlEncoded("retstart".into(), "0".into()),
                Matcher::UrlEncoded(
                    "term".into(),
                    "(crispr) AND 2020:2022[pdat] AND (english[la])".into(),
                ),
            ]))
            .with_header("content-type", "application/json")
            .with_header("x-ratelimit-limit", "10")
            .with_body(esearch_body(&["101", "102", "103"]))
            .expect(1)
            .create_async()
            .await;
        // Out of order, and 102 is missing
        let fetch = server
            .mock("GET", "/efetch.fcgi")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("id".into(), "101,102,103".into()),
                Matcher::UrlEncoded("retmode".into(), "xml".into()),
            ]))
            .with_body(article_set(&[
                article("103", "Third"),
                article("101", "First"),
            ]))
            .expect(1)
            .create_async()
            .await;

        let mut config = Config::default();
        config.endpoints.pubmed = server.url();
        config.rate_limits.sources = vec![SourceRate {
            source: "pubmed".to_string(),
            requests_per_second: 1000.0,
        }];
        config.retry = RetrySettings {
            max_attempts: 2,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            backoff_multiplier: 2.0,
        };
        let registry = SourceRegistry::from_config(&config).unwrap();

        let filters = FilterCriteria::new().years(2020, 2022);
        let stream = registry.crawl(Provider::PubMed, "crispr", &filters).unwrap();
        let (items, report) = collect(stream).await;

        assert_eq!(ids(&items), vec!["101", "103"]);
        let first = items[0].as_ref().unwrap();
        assert_eq!(first.title, "First");
        assert_eq!(first.journal.as_deref(), Some("Cell"));
        assert_eq!(first.year, Some(2021));

        assert_eq!(report.state, CrawlState::Done);
        assert_eq!(report.identifiers_found, 3);
        assert_eq!(report.batches_total, 1);
        assert_eq!(report.records_yielded, 2);
        assert_eq!(report.missing_ids, vec!["102"]);
        assert!(report.is_partial());

        // The advertised rate replaced the configured one
        assert_eq!(registry.limiter().rate(Provider::PubMed), Some(10.0));

        search.assert_async().await;
        fetch.assert_async().await;
    }

    #[tokio::test]
    async fn test_rate_limited_batch_is_skipped() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/esearch.fcgi")
            .match_query(Matcher::Any)
            .with_body(esearch_body(&["1", "2", "3", "4"]))
            .create_async()
            .await;
        let limited = server
            .mock("GET", "/efetch.fcgi")
            .match_query(Matcher::UrlEncoded("id".into(), "1,2".into()))
            .with_status(429)
            .with_header("retry-after", "30")
            .expect(1)
            .create_async()
            .await;
        server
            .mock("GET", "/efetch.fcgi")
            .match_query(Matcher::UrlEncoded("id".into(), "3,4".into()))
            .with_body(article_set(&[article("3", "C"), article("4", "D")]))
            .create_async()
            .await;

        let source = source(&server, 2);
        let (items, report) = collect(source.crawl("q", &FilterCriteria::new())).await;

        assert_eq!(ids(&items), vec!["3", "4"]);
        assert_eq!(report.state, CrawlState::Done);
        assert_eq!(report.batches_total, 2);
        assert_eq!(report.batches_fetched, 1);
        assert_eq!(report.skipped_batches.len(), 1);
        let skipped = &report.skipped_batches[0];
        assert_eq!(skipped.index, 0);
        assert_eq!(skipped.ids, vec!["1", "2"]);
        assert_eq!(skipped.kind, "rate_limited");
        assert!(skipped.reason.contains("retry after 30s"));

        // A 429 is surfaced, never retried
        limited.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_error_is_not_retried() {
        let mut server = Server::new_async().await;
        let down = server
            .mock("GET", "/esearch.fcgi")
            .match_query(Matcher::Any)
            .with_status(503)
            .expect(1)
            .create_async()
            .await;

        let source = source(&server, 200);
        let (items, report) = collect(source.crawl("q", &FilterCriteria::new())).await;

        assert_eq!(items.len(), 1);
        assert!(matches!(
            items[0],
            Err(SourceError::Unavailable { status: 503, .. })
        ));
        assert_eq!(report.state, CrawlState::Failed);
        down.assert_async().await;
    }

    #[tokio::test]
    async fn test_esearch_error_is_invalid_query() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/esearch.fcgi")
            .match_query(Matcher::Any)
            .with_body(r#"{"esearchresult": {"ERROR": "Invalid query syntax"}}"#)
            .create_async()
            .await;

        let result = source(&server, 200)
            .search("((", &FilterCriteria::new())
            .await;
        assert!(matches!(result, Err(SourceError::InvalidQuery(_))));
    }

    #[tokio::test]
    async fn test_max_results_limits_fetch() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/esearch.fcgi")
            .match_query(Matcher::UrlEncoded("retmax".into(), "5".into()))
            .with_body(esearch_body(&["1", "2", "3", "4", "5"]))
            .create_async()
            .await;
        let fetch = server
            .mock("GET", "/efetch.fcgi")
            .match_query(Matcher::UrlEncoded("id".into(), "1,2,3,4,5".into()))
            .with_body(article_set(&[
                article("1", "a"),
                article("2", "b"),
                article("3", "c"),
                article("4", "d"),
                article("5", "e"),
            ]))
            .expect(1)
            .create_async()
            .await;

        let filters = FilterCriteria::new().max_results(5);
        let (items, report) = collect(source(&server, 200).crawl("q", &filters)).await;

        assert_eq!(items.len(), 5);
        assert_eq!(report.identifiers_found, 5);
        fetch.assert_async().await;
    }

    #[tokio::test]
    async fn test_early_stop_fetches_no_further_batches() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/esearch.fcgi")
            .match_query(Matcher::Any)
            .with_body(esearch_body(&["1", "2", "3", "4"]))
            .create_async()
            .await;
        let first = server
            .mock("GET", "/efetch.fcgi")
            .match_query(Matcher::UrlEncoded("id".into(), "1,2".into()))
            .with_body(article_set(&[article("1", "a"), article("2", "b")]))
            .expect(1)
            .create_async()
            .await;
        let second = server
            .mock("GET", "/efetch.fcgi")
            .match_query(Matcher::UrlEncoded("id".into(), "3,4".into()))
            .with_body(article_set(&[article("3", "c"), article("4", "d")]))
            .expect(0)
            .create_async()
            .await;

        let source = source(&server, 2);
        let mut stream = source.crawl("q", &FilterCriteria::new());
        let paper = stream.next().await.unwrap().unwrap();
        assert_eq!(paper.id, "1");
        drop(stream);

        first.assert_async().await;
        second.assert_async().await;
    }

    fn esearch_page(ids: &[&str], count: usize) -> String {
        serde_json::json!({
            "esearchresult": {
                "count": count.to_string(),
                "idlist": ids,
            }
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_search_pages_by_retstart() {
        let mut server = Server::new_async().await;
        let first = server
            .mock("GET", "/esearch.fcgi")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("retstart".into(), "0".into()),
                Matcher::UrlEncoded("retmax".into(), "2".into()),
            ]))
            .with_body(esearch_page(&["11", "12"], 3))
            .expect(1)
            .create_async()
            .await;
        let second = server
            .mock("GET", "/esearch.fcgi")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("retstart".into(), "2".into()),
                Matcher::UrlEncoded("retmax".into(), "2".into()),
            ]))
            .with_body(esearch_page(&["13"], 3))
            .expect(1)
            .create_async()
            .await;

        let ids = source(&server, 200)
            .with_search_page_size(2)
            .search("q", &FilterCriteria::new())
            .await
            .unwrap();

        assert_eq!(ids, vec!["11", "12", "13"]);
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn test_large_request_is_capped_and_later_page_failure_keeps_ids() {
        let mut server = Server::new_async().await;
        let first = server
            .mock("GET", "/esearch.fcgi")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("retstart".into(), "0".into()),
                Matcher::UrlEncoded("retmax".into(), "9999".into()),
            ]))
            .with_body(esearch_page(&["1", "2", "3"], 25_000))
            .expect(1)
            .create_async()
            .await;
        let rejected = server
            .mock("GET", "/esearch.fcgi")
            .match_query(Matcher::UrlEncoded("retstart".into(), "3".into()))
            .with_body(
                r#"{"esearchresult": {"ERROR": "Search Backend failed: 'retstart' cannot be larger than 9998."}}"#,
            )
            .expect(1)
            .create_async()
            .await;
        server
            .mock("GET", "/efetch.fcgi")
            .match_query(Matcher::UrlEncoded("id".into(), "1,2,3".into()))
            .with_body(article_set(&[article("1", "a"), article("2", "b"), article("3", "c")]))
            .create_async()
            .await;

        let filters = FilterCriteria::new().max_results(20_000);
        let (items, report) = collect(source(&server, 200).crawl("q", &filters)).await;

        assert_eq!(ids(&items), vec!["1", "2", "3"]);
        assert_eq!(report.identifiers_found, 3);
        assert_ne!(report.state, CrawlState::Failed);
        first.assert_async().await;
        rejected.assert_async().await;
    }

    #[tokio::test]
    async fn test_first_page_error_still_fails_search() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/esearch.fcgi")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body("bad request")
            .create_async()
            .await;

        let filters = FilterCriteria::new().max_results(10);
        let (items, report) = collect(source(&server, 200).crawl("q", &filters)).await;

        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(SourceError::RequestFailed { .. })));
        assert_eq!(report.state, CrawlState::Failed);
    }
}

#[cfg(feature = "source-arxiv")]
mod arxiv {
    use super::*;
    use research_crawler::models::RecordType;
    use research_crawler::sources::{ArxivSource, Source};

    fn entry(id: &str, title: &str) -> String {
        format!(
            r#"<entry>
    <id>http://arxiv.org/abs/{id}v1</id>
    <published>2024-02-01T00:00:00Z</published>
    <updated>2024-02-01T00:00:00Z</updated>
    <title>{title}</title>
    <summary>Abstract of {title}</summary>
    <author><name>A. Author</name></author>
    <category term="cs.AI" scheme="http://arxiv.org/schemas/atom"/>
  </entry>"#
        )
    }

    fn feed(entries: &[String]) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <id>http://arxiv.org/api/query</id>
  <title>ArXiv Query</title>
  <updated>2024-02-02T00:00:00Z</updated>
  {}
</feed>"#,
            entries.join("\n")
        )
    }

    #[tokio::test]
    async fn test_search_and_fetch() {
        let mut server = Server::new_async().await;
        let search = server
            .mock("GET", "/api/query")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("search_query".into(), "all:agents".into()),
                Matcher::UrlEncoded("start".into(), "0".into()),
                Matcher::UrlEncoded("max_results".into(), "2".into()),
                Matcher::UrlEncoded("sortBy".into(), "submittedDate".into()),
            ]))
            .with_header("content-type", "application/atom+xml")
            .with_body(feed(&[entry("2402.00002", "B"), entry("2402.00001", "A")]))
            .expect(1)
            .create_async()
            .await;
        let fetch = server
            .mock("GET", "/api/query")
            .match_query(Matcher::UrlEncoded(
                "id_list".into(),
                "2402.00002,2402.00001".into(),
            ))
            .with_header("content-type", "application/atom+xml")
            .with_body(feed(&[entry("2402.00001", "A"), entry("2402.00002", "B")]))
            .expect(1)
            .create_async()
            .await;

        let source = ArxivSource::new(fast_client(), fast_limiter())
            .with_base_url(format!("{}/api/query", server.url()));
        let filters = FilterCriteria::new().max_results(2);
        let (items, report) = collect(source.crawl("agents", &filters)).await;

        assert_eq!(ids(&items), vec!["2402.00002", "2402.00001"]);
        let paper = items[0].as_ref().unwrap();
        assert_eq!(paper.title, "B");
        assert_eq!(paper.record_type, RecordType::Preprint);
        assert_eq!(paper.subject_categories, vec!["cs.AI"]);
        assert_eq!(report.records_yielded, 2);

        search.assert_async().await;
        fetch.assert_async().await;
    }

    #[tokio::test]
    async fn test_search_pages_by_start_offset() {
        let mut server = Server::new_async().await;
        // The duplicate still advances the offset
        let first = server
            .mock("GET", "/api/query")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("start".into(), "0".into()),
                Matcher::UrlEncoded("max_results".into(), "2".into()),
            ]))
            .with_header("content-type", "application/atom+xml")
            .with_body(feed(&[entry("2402.00001", "A"), entry("2402.00001", "A")]))
            .expect(1)
            .create_async()
            .await;
        let second = server
            .mock("GET", "/api/query")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("start".into(), "2".into()),
                Matcher::UrlEncoded("max_results".into(), "2".into()),
            ]))
            .with_header("content-type", "application/atom+xml")
            .with_body(feed(&[entry("2402.00002", "B")]))
            .expect(1)
            .create_async()
            .await;

        let source = ArxivSource::new(fast_client(), fast_limiter())
            .with_base_url(format!("{}/api/query", server.url()))
            .with_search_page_size(2);
        let ids = source
            .search("agents", &FilterCriteria::new().max_results(10))
            .await
            .unwrap();

        assert_eq!(ids, vec!["2402.00001", "2402.00002"]);
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn test_field_prefixed_query_is_sent_unchanged() {
        let mut server = Server::new_async().await;
        let search = server
            .mock("GET", "/api/query")
            .match_query(Matcher::UrlEncoded(
                "search_query".into(),
                "ti:transformer AND au:smith".into(),
            ))
            .with_header("content-type", "application/atom+xml")
            .with_body(feed(&[]))
            .expect(1)
            .create_async()
            .await;

        let source = ArxivSource::new(fast_client(), fast_limiter())
            .with_base_url(format!("{}/api/query", server.url()));
        let ids = source
            .search("ti:transformer AND au:smith", &FilterCriteria::new())
            .await
            .unwrap();

        assert!(ids.is_empty());
        search.assert_async().await;
    }

    #[tokio::test]
    async fn test_exclude_preprints_drops_everything() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/query")
            .match_query(Matcher::UrlEncoded("start".into(), "0".into()))
            .with_body(feed(&[entry("2402.00001", "A")]))
            .create_async()
            .await;
        server
            .mock("GET", "/api/query")
            .match_query(Matcher::UrlEncoded("id_list".into(), "2402.00001".into()))
            .with_body(feed(&[entry("2402.00001", "A")]))
            .create_async()
            .await;

        let source = ArxivSource::new(fast_client(), fast_limiter())
            .with_base_url(format!("{}/api/query", server.url()));
        let filters = FilterCriteria::new().exclude_preprints(true);
        let (items, report) = collect(source.crawl("x", &filters)).await;

        assert!(items.is_empty());
        assert_eq!(report.records_filtered, 1);
        assert_eq!(report.state, CrawlState::Done);
    }
}

#[cfg(feature = "source-biorxiv")]
mod biorxiv {
    use super::*;
    use research_crawler::models::{MatchMode, MatchPolicy};
    use research_crawler::sources::{BiorxivSource, Source};

    fn record(doi: &str, title: &str, version: u32) -> serde_json::Value {
        serde_json::json!({
            "doi": doi,
            "title": title,
            "authors": "Doe, J.; Roe, R.",
            "author_corresponding": "Jane Doe",
            "author_corresponding_institution": "EMBL",
            "date": "2020-06-01",
            "version": version.to_string(),
            "type": "new results",
            "license": "cc_by",
            "category": "zoology",
            "abstract": "Limb regeneration.",
            "published": "NA",
            "server": "bioRxiv"
        })
    }

    fn page(total: serde_json::Value, records: Vec<serde_json::Value>) -> String {
        serde_json::json!({
            "messages": [{"status": "ok", "total": total, "count": records.len()}],
            "collection": records,
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_paged_listing_with_local_matching() {
        let mut server = Server::new_async().await;
        let first_page = server
            .mock("GET", "/details/biorxiv/2020-01-01/2020-12-31/0")
            .match_query(Matcher::Any)
            .with_body(page(
                serde_json::json!("3"),
                vec![
                    record("10.1101/a", "Axolotl limb atlas", 1),
                    record("10.1101/b", "Yeast metabolism", 1),
                ],
            ))
            .expect(1)
            .create_async()
            .await;
        let second_page = server
            .mock("GET", "/details/biorxiv/2020-01-01/2020-12-31/2")
            .match_query(Matcher::Any)
            .with_body(page(
                serde_json::json!(3),
                vec![record("10.1101/c", "AXOLOTL regeneration", 1)],
            ))
            .expect(1)
            .create_async()
            .await;
        server
            .mock("GET", "/details/biorxiv/10.1101/a")
            .match_query(Matcher::Any)
            .with_body(page(
                serde_json::json!(2),
                vec![
                    record("10.1101/a", "Axolotl limb atlas", 1),
                    record("10.1101/a", "Axolotl limb atlas (revised)", 2),
                ],
            ))
            .create_async()
            .await;
        let failing = server
            .mock("GET", "/details/biorxiv/10.1101/c")
            .match_query(Matcher::Any)
            .with_status(500)
            .expect(1)
            .create_async()
            .await;

        let source = BiorxivSource::biorxiv(fast_client(), fast_limiter())
            .with_base_url(server.url());
        let filters = FilterCriteria::new().years(2020, 2020);
        let (items, report) = collect(source.crawl("axolotl", &filters)).await;

        assert_eq!(ids(&items), vec!["10.1101/a"]);
        let paper = items[0].as_ref().unwrap();
        assert_eq!(paper.title, "Axolotl limb atlas (revised)");
        assert_eq!(paper.provider, Provider::BioRxiv);
        assert_eq!(paper.authors[0].affiliation.as_deref(), Some("EMBL"));
        assert_eq!(
            paper.landing_url.as_deref(),
            Some("https://www.biorxiv.org/content/10.1101/av2")
        );

        assert_eq!(report.identifiers_found, 2);
        assert!(report.skipped_batches.is_empty());
        assert_eq!(report.missing_ids, vec!["10.1101/c"]);

        first_page.assert_async().await;
        second_page.assert_async().await;
        failing.assert_async().await;
    }

    #[tokio::test]
    async fn test_all_terms_policy_and_failed_batch() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/details/medrxiv/2021-01-01/2021-12-31/0")
            .match_query(Matcher::Any)
            .with_body(page(
                serde_json::json!(2),
                vec![
                    record("10.1101/m1", "Vaccine uptake in rural clinics", 1),
                    record("10.1101/m2", "Clinics and staffing", 1),
                ],
            ))
            .create_async()
            .await;
        server
            .mock("GET", "/details/medrxiv/10.1101/m1")
            .match_query(Matcher::Any)
            .with_status(502)
            .create_async()
            .await;

        let source = BiorxivSource::medrxiv(fast_client(), fast_limiter())
            .with_base_url(server.url())
            .with_match_policy(MatchPolicy {
                case_sensitive: false,
                mode: MatchMode::AllTerms,
            });
        let filters = FilterCriteria::new().years(2021, 2021);
        let (items, report) = collect(source.crawl("clinics vaccine", &filters)).await;

        // Every DOI in the batch failed, so the whole batch is reported
        assert!(items.is_empty());
        assert_eq!(report.identifiers_found, 1);
        assert_eq!(report.skipped_batches.len(), 1);
        assert_eq!(report.skipped_batches[0].kind, "unavailable");
        assert_eq!(report.skipped_batches[0].ids, vec!["10.1101/m1"]);
    }

    #[tokio::test]
    async fn test_first_page_failure_fails_search() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/details/biorxiv/2022-01-01/2022-12-31/0")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let source = BiorxivSource::biorxiv(fast_client(), fast_limiter())
            .with_base_url(server.url());
        let result = source
            .search("anything", &FilterCriteria::new().years(2022, 2022))
            .await;
        assert!(matches!(result, Err(SourceError::Unavailable { .. })));
    }
}
