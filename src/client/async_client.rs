//! Async client facade

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::pipeline::Pipeline;
use super::{ClientConfig, ValidationStage};
use crate::config::Config;
use crate::error::Result;
use crate::models::{ProxyFilter, ProxyRecord};
use crate::proxy::probe::Prober;
use crate::proxy::rotation::Rotator;
use crate::proxy::validator::Validator;
use crate::source::{HttpSource, ProxySource};

#[async_trait]
impl ValidationStage for Validator {
    async fn run(
        &self,
        records: Vec<ProxyRecord>,
        budget: Option<Duration>,
    ) -> Result<Vec<ProxyRecord>> {
        Ok(match budget {
            Some(budget) => self.validate_within(records, budget).await,
            None => self.validate(records).await,
        })
    }
}

/// Proxy pool client for async callers
pub struct ProxyClient {
    pipeline: Pipeline<Validator>,
}

impl ProxyClient {
    pub fn new(source: Arc<dyn ProxySource>, config: ClientConfig) -> Result<Self> {
        let validator = Validator::new(config.validator.clone())?;
        Ok(Self::assemble(source, validator, &config))
    }

    /// Create a client that validates with a custom prober
    pub fn with_prober(
        source: Arc<dyn ProxySource>,
        config: ClientConfig,
        prober: Arc<dyn Prober>,
    ) -> Result<Self> {
        let validator = Validator::with_prober(config.validator.clone(), prober)?;
        Ok(Self::assemble(source, validator, &config))
    }

    /// Create a client backed by the HTTP source named in `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        let source = HttpSource::new(&config.source.url, config.source.request_timeout)?;
        Self::new(Arc::new(source), ClientConfig::from(config))
    }

    fn assemble(source: Arc<dyn ProxySource>, validator: Validator, config: &ClientConfig) -> Self {
        Self {
            pipeline: Pipeline::new(
                source,
                validator,
                config.source_timeout,
                config.validation_budget,
            ),
        }
    }

    /// Fetch proxies matching `filter` without probing them
    pub async fn get_proxies(&self, filter: Option<&ProxyFilter>) -> Result<Vec<ProxyRecord>> {
        self.pipeline.get_proxies(filter).await
    }

    pub async fn get_proxies_by_country(
        &self,
        code: &str,
        filter: Option<&ProxyFilter>,
    ) -> Result<Vec<ProxyRecord>> {
        self.pipeline.get_proxies_by_country(code, filter).await
    }

    /// Fetch, probe and return only working proxies matching `filter`
    pub async fn get_working_proxies(
        &self,
        filter: Option<&ProxyFilter>,
    ) -> Result<Vec<ProxyRecord>> {
        self.pipeline.get_working_proxies(filter).await
    }

    /// Fetch several countries concurrently, one result per code
    pub async fn get_multiple_countries(
        &self,
        codes: &[&str],
        filter: Option<&ProxyFilter>,
    ) -> Result<Vec<Result<Vec<ProxyRecord>>>> {
        self.pipeline.get_multiple_countries(codes, filter).await
    }

    pub async fn get_proxy_urls(&self, filter: Option<&ProxyFilter>) -> Result<Vec<String>> {
        self.pipeline.get_proxy_urls(filter).await
    }

    /// Build a rotator over the working proxies matching `filter`
    pub async fn get_rotator(&self, filter: Option<&ProxyFilter>) -> Result<Rotator> {
        self.pipeline.get_rotator(filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PoolError;
    use crate::models::ProxyProtocol;
    use crate::proxy::validator::tests::DelayProber;
    use crate::source::{RawProxyRecord, SourceQuery, StaticSource};

    /// Source that honours the country hint and fails for one country
    struct CountrySource {
        broken: &'static str,
    }

    #[async_trait]
    impl ProxySource for CountrySource {
        async fn fetch(&self, query: &SourceQuery) -> Result<Vec<RawProxyRecord>> {
            let country = query.country.clone().unwrap_or_default();
            if country == self.broken {
                return Err(PoolError::Source(format!("{} is unavailable", country)));
            }
            Ok(vec![
                RawProxyRecord::new("10.2.0.1", 10, "http").with_country(&country),
                RawProxyRecord::new("10.2.0.2", 10, "socks5").with_country(&country),
            ])
        }

        fn name(&self) -> &'static str {
            "country"
        }
    }

    struct SlowSource;

    #[async_trait]
    impl ProxySource for SlowSource {
        async fn fetch(&self, _query: &SourceQuery) -> Result<Vec<RawProxyRecord>> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(Vec::new())
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    fn test_config() -> ClientConfig {
        ClientConfig {
            source_timeout: Duration::from_secs(5),
            validation_budget: None,
            validator: crate::proxy::validator::ValidatorConfig {
                timeout: Duration::from_millis(500),
                test_url: "http://probe.test/".to_string(),
                concurrency: 4,
            },
        }
    }

    fn static_source() -> Arc<dyn ProxySource> {
        Arc::new(StaticSource::new(vec![
            RawProxyRecord::new("1.2.3.4", 8080, "http").with_country("US"),
            RawProxyRecord::new("5.6.7.8", 1080, "socks5").with_country("DE"),
            RawProxyRecord::new("9.9.9.9", 3128, "https").with_country("us"),
            // Same endpoint as the first entry with a different country
            RawProxyRecord::new("1.2.3.4", 8080, "http").with_country("FR"),
            RawProxyRecord::new("", 80, "http"),
            RawProxyRecord::new("4.4.4.4", 99_999, "http"),
            RawProxyRecord::new("3.3.3.3", 80, "gopher"),
        ]))
    }

    fn client(prober: DelayProber) -> ProxyClient {
        ProxyClient::with_prober(static_source(), test_config(), Arc::new(prober)).unwrap()
    }

    #[tokio::test]
    async fn test_get_proxies_normalizes_and_dedupes() {
        let proxies = client(DelayProber::quick(&[])).get_proxies(None).await.unwrap();
        let addresses: Vec<&str> = proxies.iter().map(|p| p.address()).collect();
        assert_eq!(addresses, vec!["1.2.3.4", "5.6.7.8", "9.9.9.9"]);
        assert_eq!(proxies[0].country(), Some("US"));
        assert!(proxies.iter().all(|p| p.is_working().is_none()));
    }

    #[tokio::test]
    async fn test_get_proxies_by_country_is_case_insensitive() {
        let proxies = client(DelayProber::quick(&[]))
            .get_proxies_by_country("us", None)
            .await
            .unwrap();
        let addresses: Vec<&str> = proxies.iter().map(|p| p.address()).collect();
        assert_eq!(addresses, vec!["1.2.3.4", "9.9.9.9"]);
    }

    #[tokio::test]
    async fn test_get_working_proxies_probes_candidates_only() {
        let prober = DelayProber::quick(&["9.9.9.9"]);
        let client = client(prober);

        let filter = ProxyFilter::new().country("US");
        let working = client.get_working_proxies(Some(&filter)).await.unwrap();

        assert_eq!(working.len(), 1);
        assert_eq!(working[0].address(), "1.2.3.4");
        assert_eq!(working[0].is_working(), Some(true));
        assert!(working[0].timeout_ms().is_some());
    }

    #[tokio::test]
    async fn test_get_working_proxies_applies_limit_after_validation() {
        let client = client(DelayProber::quick(&["1.2.3.4"]));
        let filter = ProxyFilter::new().limit(1);
        let working = client.get_working_proxies(Some(&filter)).await.unwrap();
        assert_eq!(working.len(), 1);
        assert_eq!(working[0].address(), "5.6.7.8");
    }

    #[tokio::test]
    async fn test_invalid_filter_fails_before_fetch() {
        let client = client(DelayProber::quick(&[]));
        let filter = ProxyFilter::new().min_timeout_ms(500).max_timeout_ms(100);
        assert!(client
            .get_proxies(Some(&filter))
            .await
            .unwrap_err()
            .is_configuration());
        assert!(client
            .get_working_proxies(Some(&filter))
            .await
            .unwrap_err()
            .is_configuration());
    }

    #[tokio::test]
    async fn test_get_multiple_countries_keeps_per_country_results() {
        let client = ProxyClient::with_prober(
            Arc::new(CountrySource { broken: "DE" }),
            test_config(),
            Arc::new(DelayProber::quick(&[])),
        )
        .unwrap();

        let filter = ProxyFilter::new().protocol(ProxyProtocol::Http);
        let results = client
            .get_multiple_countries(&["US", "DE", "JP"], Some(&filter))
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        let us = results[0].as_ref().unwrap();
        assert_eq!(us.len(), 1);
        assert_eq!(us[0].country(), Some("US"));
        assert!(results[1].as_ref().unwrap_err().is_source());
        assert_eq!(results[2].as_ref().unwrap()[0].country(), Some("JP"));
    }

    #[tokio::test]
    async fn test_get_proxy_urls() {
        let urls = client(DelayProber::quick(&[]))
            .get_proxy_urls(Some(&ProxyFilter::new().protocol(ProxyProtocol::Socks5)))
            .await
            .unwrap();
        assert_eq!(urls, vec!["socks5://5.6.7.8:1080"]);
    }

    #[tokio::test]
    async fn test_get_rotator_over_working_set() {
        let client = client(DelayProber::quick(&["5.6.7.8"]));
        let mut rotator = client.get_rotator(None).await.unwrap();

        assert_eq!(rotator.size(), 2);
        assert_eq!(rotator.next_proxy().unwrap().address(), "1.2.3.4");
        assert_eq!(rotator.next_proxy().unwrap().address(), "9.9.9.9");
        assert_eq!(rotator.next_proxy().unwrap().address(), "1.2.3.4");
    }

    #[tokio::test]
    async fn test_source_timeout_is_source_error() {
        let mut config = test_config();
        config.source_timeout = Duration::from_millis(50);
        let client = ProxyClient::with_prober(
            Arc::new(SlowSource),
            config,
            Arc::new(DelayProber::quick(&[])),
        )
        .unwrap();

        assert!(client.get_proxies(None).await.unwrap_err().is_source());
    }

    #[tokio::test]
    async fn test_get_working_proxies_from_spawned_task() {
        let mut config = test_config();
        config.validation_budget = Some(Duration::from_secs(5));
        let client = Arc::new(
            ProxyClient::with_prober(static_source(), config, Arc::new(DelayProber::quick(&[])))
                .unwrap(),
        );

        let task = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.get_working_proxies(None).await }
        });

        let working = task.await.unwrap().unwrap();
        let addresses: Vec<&str> = working.iter().map(|p| p.address()).collect();
        assert_eq!(addresses, vec!["1.2.3.4", "5.6.7.8", "9.9.9.9"]);
        assert!(working.iter().all(|p| p.is_working() == Some(true)));
    }

    #[tokio::test]
    async fn test_validator_as_validation_stage() {
        let validator = Validator::with_prober(
            test_config().validator,
            Arc::new(DelayProber::quick(&["10.3.0.2"])),
        )
        .unwrap();
        let stage: &dyn ValidationStage = &validator;

        let records = vec![
            ProxyRecord::new("10.3.0.1", 80, ProxyProtocol::Http).unwrap(),
            ProxyRecord::new("10.3.0.2", 80, ProxyProtocol::Http).unwrap(),
        ];
        let results = stage
            .run(records, Some(Duration::from_secs(5)))
            .await
            .unwrap();

        assert_eq!(results[0].is_working(), Some(true));
        assert_eq!(results[1].is_working(), Some(false));
    }

    #[test]
    fn test_invalid_validator_config_is_rejected() {
        let mut config = test_config();
        config.validator.concurrency = 0;
        assert!(ProxyClient::new(static_source(), config)
            .err()
            .unwrap()
            .is_configuration());
    }
}
