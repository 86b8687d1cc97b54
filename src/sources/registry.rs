//! Registry of configured provider adapters.

use std::collections::HashMap;
use std::sync::Arc;

use super::{Source, SourceError};
use crate::config::Config;
use crate::models::{FilterCriteria, Provider};
use crate::utils::{CrawlStream, HttpClient, RateLimiter, RetryConfig};

#[cfg(feature = "source-arxiv")]
use super::arxiv::ArxivSource;
#[cfg(feature = "source-biorxiv")]
use super::biorxiv::{BiorxivSource, ServerType};
#[cfg(feature = "source-pubmed")]
use super::pubmed::PubMedSource;

/// Object-safe view of a [`Source`], so adapters with different raw record
/// types can live in one registry.
pub trait Crawler: Send + Sync + std::fmt::Debug {
    /// Provider the adapter talks to
    fn target(&self) -> Provider;

    /// Identifiers per fetch call
    fn crawl_batch_size(&self) -> usize;

    /// Start a lazy crawl
    fn start_crawl<'a>(&'a self, query: &str, filters: &FilterCriteria) -> CrawlStream<'a>;
}

impl<S: Source> Crawler for S {
    fn target(&self) -> Provider {
        self.provider()
    }

    fn crawl_batch_size(&self) -> usize {
        self.batch_size()
    }

    fn start_crawl<'a>(&'a self, query: &str, filters: &FilterCriteria) -> CrawlStream<'a> {
        self.crawl(query, filters)
    }
}

/// Registry for all available provider adapters
///
/// Every adapter built by [`SourceRegistry::from_config`] shares one HTTP
/// client and one [`RateLimiter`], so concurrent crawls of the same provider
/// draw from the same bucket.
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    sources: HashMap<Provider, Arc<dyn Crawler>>,
    limiter: Arc<RateLimiter>,
}

impl SourceRegistry {
    /// Create an empty registry around a limiter
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self {
            sources: HashMap::new(),
            limiter,
        }
    }

    /// Create a registry with every compiled-in source, configured from `config`
    pub fn from_config(config: &Config) -> Result<Self, SourceError> {
        let client = HttpClient::from_config(&config.client, RetryConfig::from(&config.retry))?;
        let limiter = Arc::new(RateLimiter::from_config(&config.rate_limits));
        Ok(Self::with_parts(config, client, limiter))
    }

    /// Create a registry with every compiled-in source from explicit parts
    #[allow(unused_variables, unused_mut)]
    pub fn with_parts(config: &Config, client: HttpClient, limiter: Arc<RateLimiter>) -> Self {
        let mut registry = Self::new(Arc::clone(&limiter));

        #[cfg(feature = "source-pubmed")]
        registry.register(Arc::new(PubMedSource::from_config(
            config,
            client.clone(),
            Arc::clone(&limiter),
        )));

        #[cfg(feature = "source-arxiv")]
        registry.register(Arc::new(ArxivSource::from_config(
            config,
            client.clone(),
            Arc::clone(&limiter),
        )));

        #[cfg(feature = "source-biorxiv")]
        {
            registry.register(Arc::new(BiorxivSource::from_config(
                config,
                ServerType::BioRxiv,
                client.clone(),
                Arc::clone(&limiter),
            )));
            registry.register(Arc::new(BiorxivSource::from_config(
                config,
                ServerType::MedRxiv,
                client.clone(),
                Arc::clone(&limiter),
            )));
        }

        registry
    }

    /// Register a source, replacing any adapter for the same provider
    pub fn register(&mut self, source: Arc<dyn Crawler>) {
        self.sources.insert(source.target(), source);
    }

    /// Get a source by provider
    pub fn get(&self, provider: Provider) -> Option<&Arc<dyn Crawler>> {
        self.sources.get(&provider)
    }

    /// Get a source by provider, returning an error if not registered
    pub fn get_required(&self, provider: Provider) -> Result<&Arc<dyn Crawler>, SourceError> {
        self.get(provider).ok_or_else(|| {
            SourceError::NotFound(format!("Source '{}' is not enabled", provider.id()))
        })
    }

    /// Get all registered sources
    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn Crawler>> {
        self.sources.values()
    }

    /// Registered providers in canonical order
    pub fn providers(&self) -> Vec<Provider> {
        Provider::ALL
            .into_iter()
            .filter(|p| self.sources.contains_key(p))
            .collect()
    }

    /// Check if a source exists
    pub fn has(&self, provider: Provider) -> bool {
        self.sources.contains_key(&provider)
    }

    /// Get the number of registered sources
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Limiter shared by the registered sources
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Start a crawl against one provider
    pub fn crawl(
        &self,
        provider: Provider,
        query: &str,
        filters: &FilterCriteria,
    ) -> Result<CrawlStream<'_>, SourceError> {
        Ok(self.get_required(provider)?.start_crawl(query, filters))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::mock::MockSource;
    use futures_util::StreamExt;

    #[test]
    fn test_registry_from_default_config() {
        let registry = SourceRegistry::from_config(&Config::default()).unwrap();

        #[cfg(all(
            feature = "source-pubmed",
            feature = "source-arxiv",
            feature = "source-biorxiv"
        ))]
        {
            assert_eq!(registry.len(), 4);
            assert_eq!(registry.providers(), Provider::ALL.to_vec());
            assert_eq!(
                registry.get(Provider::PubMed).unwrap().crawl_batch_size(),
                200
            );
            assert_eq!(registry.get(Provider::MedRxiv).unwrap().target(), Provider::MedRxiv);
        }

        assert_eq!(registry.limiter().rate(Provider::PubMed), Some(3.0));
    }

    #[test]
    fn test_registry_applies_configured_batch_sizes_and_rates() {
        let mut config = Config::default();
        config.batch_sizes.biorxiv = 7;
        config.rate_limits.default_requests_per_second = 0.5;
        config.rate_limits.sources.retain(|s| s.source != "arxiv");

        let registry = SourceRegistry::from_config(&config).unwrap();

        #[cfg(feature = "source-biorxiv")]
        assert_eq!(registry.get(Provider::MedRxiv).unwrap().crawl_batch_size(), 7);
        assert_eq!(registry.limiter().rate(Provider::Arxiv), Some(0.5));
        assert_eq!(registry.limiter().rate(Provider::BioRxiv), Some(2.0));
    }

    #[test]
    fn test_get_missing_source() {
        let registry = SourceRegistry::new(Arc::new(RateLimiter::new()));
        assert!(registry.is_empty());
        assert!(!registry.has(Provider::Arxiv));
        assert!(matches!(
            registry.get_required(Provider::Arxiv),
            Err(SourceError::NotFound(_))
        ));
        assert!(registry
            .crawl(Provider::Arxiv, "q", &FilterCriteria::new())
            .is_err());
    }

    #[tokio::test]
    async fn test_crawl_through_registry() {
        let mock = MockSource::new(Provider::BioRxiv).with_batch_size(2);
        mock.set_search_results(vec!["a".into(), "b".into(), "c".into()]);

        let mut registry = SourceRegistry::new(Arc::new(RateLimiter::new()));
        registry.register(Arc::new(mock));
        assert_eq!(registry.providers(), vec![Provider::BioRxiv]);

        let stream = registry
            .crawl(Provider::BioRxiv, "anything", &FilterCriteria::new())
            .unwrap();
        let ids: Vec<String> = stream.map(|r| r.unwrap().id).collect().await;
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
