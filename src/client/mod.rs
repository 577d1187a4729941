//! Client facades
//!
//! [`ProxyClient`] and [`BlockingProxyClient`] expose the same operations over
//! one orchestration core. They differ only in how the validation stage is
//! scheduled.

mod async_client;
mod blocking;
mod pipeline;

pub use async_client::ProxyClient;
pub use blocking::BlockingProxyClient;

use async_trait::async_trait;
use std::time::Duration;

use crate::config::Config;
use crate::error::Result;
use crate::models::ProxyRecord;
use crate::proxy::validator::ValidatorConfig;

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Upper bound on a single source fetch
    pub source_timeout: Duration,
    /// Deadline for the whole validation step, if any
    pub validation_budget: Option<Duration>,
    pub validator: ValidatorConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            source_timeout: Duration::from_secs(30),
            validation_budget: None,
            validator: ValidatorConfig::default(),
        }
    }
}

impl From<&Config> for ClientConfig {
    fn from(config: &Config) -> Self {
        Self {
            source_timeout: config.source.request_timeout,
            validation_budget: None,
            validator: ValidatorConfig {
                timeout: config.validation.timeout,
                test_url: config.validation.test_url.clone(),
                concurrency: config.validation.concurrency,
            },
        }
    }
}

/// Validation step plugged into the orchestration core
#[async_trait]
pub trait ValidationStage: Send + Sync {
    /// Probe `records`, returning one record per input in input order
    async fn run(
        &self,
        records: Vec<ProxyRecord>,
        budget: Option<Duration>,
    ) -> Result<Vec<ProxyRecord>>;
}
