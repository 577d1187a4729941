//! Blocking client facade
//!
//! Drives the shared pipeline on an owned single-threaded runtime. Validation
//! runs on [`BlockingValidator`] worker threads rather than as async tasks.
//! Must not be called from inside an async runtime.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::runtime::{Builder, Runtime};

use super::pipeline::Pipeline;
use super::{ClientConfig, ValidationStage};
use crate::config::Config;
use crate::error::{PoolError, Result};
use crate::models::{ProxyFilter, ProxyRecord};
use crate::proxy::blocking::BlockingValidator;
use crate::proxy::probe::Prober;
use crate::proxy::rotation::Rotator;
use crate::source::{HttpSource, ProxySource};

/// Runs the thread-based validator off the driver runtime
struct ThreadedStage {
    validator: Arc<BlockingValidator>,
}

#[async_trait]
impl ValidationStage for ThreadedStage {
    async fn run(
        &self,
        records: Vec<ProxyRecord>,
        budget: Option<Duration>,
    ) -> Result<Vec<ProxyRecord>> {
        let validator = Arc::clone(&self.validator);
        tokio::task::spawn_blocking(move || match budget {
            Some(budget) => validator.validate_within(records, budget),
            None => validator.validate(records),
        })
        .await
        .map_err(|e| PoolError::Internal(format!("validation task failed: {}", e)))?
    }
}

/// Proxy pool client for synchronous callers
pub struct BlockingProxyClient {
    runtime: Runtime,
    pipeline: Pipeline<ThreadedStage>,
}

impl BlockingProxyClient {
    pub fn new(source: Arc<dyn ProxySource>, config: ClientConfig) -> Result<Self> {
        let validator = BlockingValidator::new(config.validator.clone())?;
        Self::assemble(source, validator, &config)
    }

    /// Create a client that validates with a custom prober
    pub fn with_prober(
        source: Arc<dyn ProxySource>,
        config: ClientConfig,
        prober: Arc<dyn Prober>,
    ) -> Result<Self> {
        let validator = BlockingValidator::with_prober(config.validator.clone(), prober)?;
        Self::assemble(source, validator, &config)
    }

    /// Create a client backed by the HTTP source named in `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        let source = HttpSource::new(&config.source.url, config.source.request_timeout)?;
        Self::new(Arc::new(source), ClientConfig::from(config))
    }

    fn assemble(
        source: Arc<dyn ProxySource>,
        validator: BlockingValidator,
        config: &ClientConfig,
    ) -> Result<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| PoolError::Internal(format!("failed to start client runtime: {}", e)))?;

        let stage = ThreadedStage {
            validator: Arc::new(validator),
        };

        Ok(Self {
            runtime,
            pipeline: Pipeline::new(
                source,
                stage,
                config.source_timeout,
                config.validation_budget,
            ),
        })
    }

    /// Fetch proxies matching `filter` without probing them
    pub fn get_proxies(&self, filter: Option<&ProxyFilter>) -> Result<Vec<ProxyRecord>> {
        self.runtime.block_on(self.pipeline.get_proxies(filter))
    }

    pub fn get_proxies_by_country(
        &self,
        code: &str,
        filter: Option<&ProxyFilter>,
    ) -> Result<Vec<ProxyRecord>> {
        self.runtime
            .block_on(self.pipeline.get_proxies_by_country(code, filter))
    }

    /// Fetch, probe and return only working proxies matching `filter`
    pub fn get_working_proxies(&self, filter: Option<&ProxyFilter>) -> Result<Vec<ProxyRecord>> {
        self.runtime
            .block_on(self.pipeline.get_working_proxies(filter))
    }

    /// Fetch several countries, one result per code
    pub fn get_multiple_countries(
        &self,
        codes: &[&str],
        filter: Option<&ProxyFilter>,
    ) -> Result<Vec<Result<Vec<ProxyRecord>>>> {
        self.runtime
            .block_on(self.pipeline.get_multiple_countries(codes, filter))
    }

    pub fn get_proxy_urls(&self, filter: Option<&ProxyFilter>) -> Result<Vec<String>> {
        self.runtime.block_on(self.pipeline.get_proxy_urls(filter))
    }

    /// Build a rotator over the working proxies matching `filter`
    pub fn get_rotator(&self, filter: Option<&ProxyFilter>) -> Result<Rotator> {
        self.runtime.block_on(self.pipeline.get_rotator(filter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProxyProtocol;
    use crate::proxy::validator::tests::DelayProber;
    use crate::proxy::validator::ValidatorConfig;
    use crate::source::{RawProxyRecord, StaticSource};

    fn test_config() -> ClientConfig {
        ClientConfig {
            source_timeout: Duration::from_secs(5),
            validation_budget: None,
            validator: ValidatorConfig {
                timeout: Duration::from_millis(500),
                test_url: "http://probe.test/".to_string(),
                concurrency: 2,
            },
        }
    }

    fn client(prober: DelayProber) -> BlockingProxyClient {
        let source = StaticSource::new(vec![
            RawProxyRecord::new("1.1.1.1", 8080, "http")
                .with_country("US")
                .with_timeout_ms(300),
            RawProxyRecord::new("2.2.2.2", 1080, "socks4").with_country("BR"),
            RawProxyRecord::new("3.3.3.3", 3128, "http").with_country("US"),
            RawProxyRecord::new("3.3.3.3", 3128, "http").with_country("CA"),
        ]);
        BlockingProxyClient::with_prober(Arc::new(source), test_config(), Arc::new(prober))
            .unwrap()
    }

    #[test]
    fn test_get_proxies_with_filter() {
        let client = client(DelayProber::quick(&[]));

        let all = client.get_proxies(None).unwrap();
        assert_eq!(all.len(), 3);

        let filter = ProxyFilter::new().max_timeout_ms(500);
        let fast = client.get_proxies(Some(&filter)).unwrap();
        assert_eq!(fast.len(), 1);
        assert_eq!(fast[0].address(), "1.1.1.1");
    }

    #[test]
    fn test_get_working_proxies_uses_fresh_measurements() {
        let client = client(DelayProber::quick(&["1.1.1.1"]));

        let working = client.get_working_proxies(None).unwrap();
        let addresses: Vec<&str> = working.iter().map(|p| p.address()).collect();
        assert_eq!(addresses, vec!["2.2.2.2", "3.3.3.3"]);
        assert!(working.iter().all(|p| p.is_working() == Some(true)));
    }

    #[test]
    fn test_get_proxies_by_country_and_urls() {
        let client = client(DelayProber::quick(&[]));

        let us = client.get_proxies_by_country("US", None).unwrap();
        assert_eq!(us.len(), 2);

        let urls = client
            .get_proxy_urls(Some(&ProxyFilter::new().protocol(ProxyProtocol::Socks4)))
            .unwrap();
        assert_eq!(urls, vec!["socks4://2.2.2.2:1080"]);
    }

    #[test]
    fn test_get_multiple_countries_in_order() {
        let client = client(DelayProber::quick(&[]));
        let results = client.get_multiple_countries(&["BR", "US", "ZZ"], None).unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().len(), 1);
        assert_eq!(results[1].as_ref().unwrap().len(), 2);
        assert!(results[2].as_ref().unwrap().is_empty());
    }

    #[test]
    fn test_get_rotator() {
        let client = client(DelayProber::quick(&["2.2.2.2"]));
        let mut rotator = client.get_rotator(None).unwrap();
        assert_eq!(rotator.size(), 2);
        assert_eq!(rotator.next_proxy().unwrap().address(), "1.1.1.1");
    }

    #[test]
    fn test_invalid_filter_is_configuration_error() {
        let client = client(DelayProber::quick(&[]));
        let filter = ProxyFilter::new().country("  ");
        assert!(client
            .get_working_proxies(Some(&filter))
            .unwrap_err()
            .is_configuration());
    }
}
