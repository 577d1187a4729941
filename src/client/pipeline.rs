//! Fetch, filter and validate pipeline shared by both client facades

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::timeout;
use tracing::{debug, info, instrument};

use super::ValidationStage;
use crate::error::{PoolError, Result};
use crate::filter;
use crate::format;
use crate::models::{ProxyFilter, ProxyRecord};
use crate::proxy::rotation::Rotator;
use crate::source::{normalize, ProxySource, SourceQuery};

pub(crate) struct Pipeline<V> {
    source: Arc<dyn ProxySource>,
    stage: V,
    source_timeout: Duration,
    validation_budget: Option<Duration>,
}

impl<V: ValidationStage> Pipeline<V> {
    pub(crate) fn new(
        source: Arc<dyn ProxySource>,
        stage: V,
        source_timeout: Duration,
        validation_budget: Option<Duration>,
    ) -> Self {
        Self {
            source,
            stage,
            source_timeout,
            validation_budget,
        }
    }

    /// Fetch and normalize one batch from the source
    #[instrument(skip(self), fields(source = self.source.name()))]
    pub(crate) async fn fetch(&self, query: &SourceQuery) -> Result<Vec<ProxyRecord>> {
        let raw = timeout(self.source_timeout, self.source.fetch(query))
            .await
            .map_err(|_| {
                PoolError::Source(format!(
                    "{} source did not answer within {:?}",
                    self.source.name(),
                    self.source_timeout
                ))
            })??;

        let normalized = normalize(raw);
        info!(
            records = normalized.records.len(),
            skipped = normalized.skipped.len(),
            duplicates = normalized.duplicates,
            "Loaded proxies from source"
        );
        Ok(normalized.records)
    }

    pub(crate) async fn get_proxies(&self, filter: Option<&ProxyFilter>) -> Result<Vec<ProxyRecord>> {
        let filter = filter.cloned().unwrap_or_default();
        filter.validate()?;

        let records = self.fetch(&query_for(&filter)).await?;
        filter::apply(records, &filter)
    }

    pub(crate) async fn get_proxies_by_country(
        &self,
        code: &str,
        filter: Option<&ProxyFilter>,
    ) -> Result<Vec<ProxyRecord>> {
        let filter = filter.cloned().unwrap_or_default().for_country(code);
        self.get_proxies(Some(&filter)).await
    }

    /// Fetch, narrow on identity, probe, then apply the full filter
    pub(crate) async fn get_working_proxies(
        &self,
        filter: Option<&ProxyFilter>,
    ) -> Result<Vec<ProxyRecord>> {
        let filter = filter.cloned().unwrap_or_default().for_working();
        filter.validate()?;

        let records = self.fetch(&query_for(&filter)).await?;
        let candidates = filter::apply(records, &filter.identity_only())?;
        debug!(candidates = candidates.len(), "Validating candidate proxies");

        let validated = self.stage.run(candidates, self.validation_budget).await?;
        filter::apply(validated, &filter)
    }

    /// Run one country-scoped fetch per code concurrently
    ///
    /// The outer result fails only for an invalid base filter; each slot holds
    /// its own country's outcome, in the order of `codes`.
    pub(crate) async fn get_multiple_countries(
        &self,
        codes: &[&str],
        filter: Option<&ProxyFilter>,
    ) -> Result<Vec<Result<Vec<ProxyRecord>>>> {
        if let Some(filter) = filter {
            filter.validate()?;
        }

        let fetches = codes
            .iter()
            .map(|code| self.get_proxies_by_country(code, filter));
        Ok(join_all(fetches).await)
    }

    pub(crate) async fn get_proxy_urls(&self, filter: Option<&ProxyFilter>) -> Result<Vec<String>> {
        let records = self.get_proxies(filter).await?;
        Ok(format::to_url_list(&records))
    }

    pub(crate) async fn get_rotator(&self, filter: Option<&ProxyFilter>) -> Result<Rotator> {
        let records = self.get_working_proxies(filter).await?;
        Ok(Rotator::new(records))
    }
}

fn query_for(filter: &ProxyFilter) -> SourceQuery {
    SourceQuery {
        country: filter.country.clone(),
        protocol: filter.protocol,
    }
}
