use serde::{Deserialize, Serialize};

use super::ProxyProtocol;
use crate::error::{PoolError, Result};

/// Declarative proxy filter
///
/// Every field is optional; an absent field places no constraint on that
/// dimension. Filters are checked with [`ProxyFilter::validate`] before any
/// record is scanned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProxyFilter {
    /// ISO country code (case-insensitive)
    pub country: Option<String>,
    /// Required protocol
    pub protocol: Option<ProxyProtocol>,
    /// Minimum observed latency in milliseconds (inclusive)
    pub min_timeout_ms: Option<u64>,
    /// Maximum observed latency in milliseconds (inclusive)
    pub max_timeout_ms: Option<u64>,
    /// Only keep proxies whose last probe succeeded
    pub working_only: bool,
    /// Truncate the result to the first `limit` matches
    pub limit: Option<usize>,
}

impl ProxyFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn protocol(mut self, protocol: ProxyProtocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    pub fn min_timeout_ms(mut self, ms: u64) -> Self {
        self.min_timeout_ms = Some(ms);
        self
    }

    pub fn max_timeout_ms(mut self, ms: u64) -> Self {
        self.max_timeout_ms = Some(ms);
        self
    }

    pub fn working_only(mut self) -> Self {
        self.working_only = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Reject filters that cannot be applied
    pub fn validate(&self) -> Result<()> {
        if let Some(country) = &self.country {
            if country.trim().is_empty() {
                return Err(PoolError::Configuration(
                    "country filter must not be empty".into(),
                ));
            }
        }

        if let (Some(min), Some(max)) = (self.min_timeout_ms, self.max_timeout_ms) {
            if min > max {
                return Err(PoolError::Configuration(format!(
                    "min_timeout_ms ({}) is greater than max_timeout_ms ({})",
                    min, max
                )));
            }
        }

        if self.limit == Some(0) {
            return Err(PoolError::Configuration(
                "limit must be a positive integer".into(),
            ));
        }

        Ok(())
    }

    /// Keep only the constraints that do not depend on probe results
    ///
    /// Used to narrow a candidate set before validation, so that latency and
    /// liveness constraints are evaluated against fresh measurements.
    pub fn identity_only(&self) -> Self {
        Self {
            country: self.country.clone(),
            protocol: self.protocol,
            ..Self::default()
        }
    }

    /// Same filter scoped to a single country
    pub fn for_country(&self, code: &str) -> Self {
        Self {
            country: Some(code.to_string()),
            ..self.clone()
        }
    }

    /// Same filter with the working-only constraint forced on
    pub fn for_working(&self) -> Self {
        Self {
            working_only: true,
            ..self.clone()
        }
    }

    /// Check if no constraint is present
    pub fn is_unconstrained(&self) -> bool {
        *self == Self::default()
    }
}
