//! Concurrent proxy validation
//!
//! Probes a batch of proxies with at most `concurrency` probes in flight and an
//! independent timeout per probe. Results land in slots indexed by input
//! position, so output order never depends on completion order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::time::timeout;
use tracing::{debug, info, instrument};

use super::probe::{HttpProber, ProbeTarget, Prober};
use crate::error::{PoolError, Result};
use crate::models::{Liveness, ProxyRecord};

/// Validator configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorConfig {
    /// Timeout for each probe
    pub timeout: Duration,
    /// URL requested through each proxy
    pub test_url: String,
    /// Maximum number of probes in flight
    pub concurrency: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            test_url: "http://httpbin.org/ip".to_string(),
            concurrency: 10,
        }
    }
}

impl ValidatorConfig {
    /// Check the configuration and parse the test URL
    pub fn validate(&self) -> Result<ProbeTarget> {
        if self.concurrency == 0 {
            return Err(PoolError::Configuration(
                "validation concurrency must be at least 1".into(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(PoolError::Configuration(
                "validation timeout must be greater than zero".into(),
            ));
        }
        ProbeTarget::parse(&self.test_url)
    }
}

/// Probe one record under its own timeout
///
/// Never fails: every probe error, including timeout expiry, becomes a
/// `Failing` record.
pub(crate) async fn probe_record(
    prober: &dyn Prober,
    record: &ProxyRecord,
    target: &ProbeTarget,
    limit: Duration,
) -> ProxyRecord {
    let started = Instant::now();
    let outcome = match timeout(limit, prober.probe(record, target)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(PoolError::Timeout),
    };

    match outcome {
        Ok(()) => {
            let elapsed = started.elapsed();
            debug!(proxy = %record.url(), elapsed_ms = elapsed.as_millis() as u64, "Proxy is working");
            record.with_probe_result(Some(elapsed))
        }
        Err(e) => {
            debug!(proxy = %record.url(), error = %e, "Proxy probe failed");
            record.with_probe_result(None)
        }
    }
}

/// Merge indexed probe results back over the input
///
/// Slots left empty (probe never completed) keep the input record unchanged.
pub(crate) fn merge_slots(
    records: Vec<ProxyRecord>,
    slots: Vec<Option<ProxyRecord>>,
) -> Vec<ProxyRecord> {
    records
        .into_iter()
        .zip(slots)
        .map(|(original, probed)| probed.unwrap_or(original))
        .collect()
}

/// Asynchronous proxy validator
///
/// Holds no state across calls.
#[derive(Clone)]
pub struct Validator {
    config: ValidatorConfig,
    target: ProbeTarget,
    prober: Arc<dyn Prober>,
}

impl Validator {
    /// Create a validator that probes with real HTTP requests
    pub fn new(config: ValidatorConfig) -> Result<Self> {
        Self::with_prober(config, Arc::new(HttpProber::new()?))
    }

    pub fn with_prober(config: ValidatorConfig, prober: Arc<dyn Prober>) -> Result<Self> {
        let target = config.validate()?;
        Ok(Self {
            config,
            target,
            prober,
        })
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Probe every record
    ///
    /// Returns one record per input, in input order, with liveness and latency
    /// filled in. Failing proxies are kept.
    pub async fn validate(&self, records: Vec<ProxyRecord>) -> Vec<ProxyRecord> {
        self.run(records, None).await
    }

    /// Probe every record, giving up on the whole batch after `budget`
    ///
    /// Probes still outstanding at the deadline are cancelled; their records
    /// come back unchanged. Completed results are kept.
    pub async fn validate_within(
        &self,
        records: Vec<ProxyRecord>,
        budget: Duration,
    ) -> Vec<ProxyRecord> {
        self.run(records, Some(budget)).await
    }

    /// Probe every record and keep only the working ones
    pub async fn validate_all(&self, records: Vec<ProxyRecord>) -> Vec<ProxyRecord> {
        self.validate(records)
            .await
            .into_iter()
            .filter(|r| r.liveness() == Liveness::Working)
            .collect()
    }

    /// Probe a single record
    pub async fn validate_one(&self, record: &ProxyRecord) -> bool {
        probe_record(self.prober.as_ref(), record, &self.target, self.config.timeout)
            .await
            .liveness()
            == Liveness::Working
    }

    #[instrument(skip(self, records), fields(total = records.len(), concurrency = self.config.concurrency))]
    async fn run(&self, records: Vec<ProxyRecord>, budget: Option<Duration>) -> Vec<ProxyRecord> {
        if records.is_empty() {
            return records;
        }

        let total = records.len();
        let mut slots: Vec<Option<ProxyRecord>> = vec![None; total];

        // Owned items keep the probe futures free of borrows from `records`
        let mut probes = futures::stream::iter(records.clone().into_iter().enumerate())
            .map(|(index, record)| async move {
                let probed = probe_record(
                    self.prober.as_ref(),
                    &record,
                    &self.target,
                    self.config.timeout,
                )
                .await;
                (index, probed)
            })
            .buffer_unordered(self.config.concurrency.min(total));

        let drive = async {
            while let Some((index, probed)) = probes.next().await {
                slots[index] = Some(probed);
            }
        };

        let timed_out = match budget {
            Some(budget) => timeout(budget, drive).await.is_err(),
            None => {
                drive.await;
                false
            }
        };
        // Dropping the stream cancels whatever is still in flight
        drop(probes);

        let completed = slots.iter().filter(|s| s.is_some()).count();
        let working = slots
            .iter()
            .flatten()
            .filter(|r| r.liveness() == Liveness::Working)
            .count();
        let results = merge_slots(records, slots);

        info!(
            completed,
            working,
            timed_out,
            "Validation complete: {} working, {} failing",
            working,
            completed - working
        );

        results
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::ProxyProtocol;

    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fake prober: sleeps for `delay` (or `port` milliseconds when unset), fails
    /// addresses in `failing`, and tracks how many probes run at once.
    #[derive(Default)]
    pub(crate) struct DelayProber {
        pub delay: Option<Duration>,
        pub failing: HashSet<String>,
        pub in_flight: AtomicUsize,
        pub max_in_flight: AtomicUsize,
        pub calls: AtomicUsize,
    }

    impl DelayProber {
        pub fn failing(addresses: &[&str]) -> Self {
            Self {
                failing: addresses.iter().map(|a| a.to_string()).collect(),
                ..Self::default()
            }
        }

        /// Answer every probe after a few milliseconds, regardless of port
        pub fn quick(failing: &[&str]) -> Self {
            Self {
                delay: Some(Duration::from_millis(5)),
                ..Self::failing(failing)
            }
        }
    }

    #[async_trait]
    impl Prober for DelayProber {
        async fn probe(&self, proxy: &ProxyRecord, _target: &ProbeTarget) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let delay = self
                .delay
                .unwrap_or_else(|| Duration::from_millis(proxy.port() as u64));
            tokio::time::sleep(delay).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.failing.contains(proxy.address()) {
                Err(PoolError::ProbeFailed("refused".to_string()))
            } else {
                Ok(())
            }
        }
    }

    pub(crate) fn delayed(address: &str, delay_ms: u16) -> ProxyRecord {
        ProxyRecord::new(address, delay_ms, ProxyProtocol::Http).unwrap()
    }

    fn config(concurrency: usize, timeout_ms: u64) -> ValidatorConfig {
        ValidatorConfig {
            timeout: Duration::from_millis(timeout_ms),
            test_url: "http://probe.test/".to_string(),
            concurrency,
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(ValidatorConfig::default().validate().is_ok());
        assert!(config(0, 100).validate().unwrap_err().is_configuration());
        assert!(config(1, 0).validate().unwrap_err().is_configuration());

        let mut bad_url = config(1, 100);
        bad_url.test_url = "nope".to_string();
        assert!(bad_url.validate().unwrap_err().is_configuration());
    }

    #[tokio::test]
    async fn test_validate_marks_liveness_and_latency() {
        let prober = Arc::new(DelayProber::failing(&["10.0.0.2"]));
        let validator = Validator::with_prober(config(4, 1_000), prober).unwrap();

        let records = vec![delayed("10.0.0.1", 10), delayed("10.0.0.2", 10)];
        let results = validator.validate(records).await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].is_working(), Some(true));
        assert!(results[0].timeout_ms().unwrap() >= 10);
        assert_eq!(results[1].is_working(), Some(false));
        assert_eq!(results[1].timeout_ms(), None);
    }

    #[tokio::test]
    async fn test_validate_empty_batch() {
        let validator =
            Validator::with_prober(config(2, 100), Arc::new(DelayProber::default())).unwrap();
        assert!(validator.validate(Vec::new()).await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let prober = Arc::new(DelayProber::default());
        let validator = Validator::with_prober(config(3, 5_000), prober.clone()).unwrap();

        let records: Vec<ProxyRecord> = (0..12)
            .map(|i| delayed(&format!("10.0.1.{}", i), 30))
            .collect();
        let results = validator.validate(records).await;

        assert_eq!(results.len(), 12);
        assert_eq!(prober.calls.load(Ordering::SeqCst), 12);
        let max = prober.max_in_flight.load(Ordering::SeqCst);
        assert!(max >= 1 && max <= 3, "max in flight was {}", max);
    }

    #[tokio::test]
    async fn test_order_is_preserved_under_reverse_completion() {
        let prober = Arc::new(DelayProber::default());
        let validator = Validator::with_prober(config(8, 5_000), prober).unwrap();

        // Earlier inputs take longer, so completions arrive in reverse
        let records: Vec<ProxyRecord> = (0..8u16)
            .map(|i| delayed(&format!("10.0.2.{}", i), 10 + (8 - i) * 15))
            .collect();
        let expected: Vec<String> = records.iter().map(|r| r.address().to_string()).collect();

        let results = validator.validate(records).await;
        let actual: Vec<String> = results.iter().map(|r| r.address().to_string()).collect();
        assert_eq!(actual, expected);
        assert!(results.iter().all(|r| r.is_working() == Some(true)));
    }

    #[tokio::test]
    async fn test_slow_probe_times_out_without_blocking_others() {
        let prober = Arc::new(DelayProber::default());
        let validator = Validator::with_prober(config(1, 100), prober).unwrap();

        let started = Instant::now();
        let results = validator
            .validate(vec![delayed("10.0.3.1", 5_000), delayed("10.0.3.2", 5)])
            .await;

        assert_eq!(results[0].is_working(), Some(false));
        assert_eq!(results[1].is_working(), Some(true));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_validate_within_keeps_completed_results() {
        let prober = Arc::new(DelayProber::default());
        let validator = Validator::with_prober(config(4, 10_000), prober).unwrap();

        let started = Instant::now();
        let results = validator
            .validate_within(
                vec![
                    delayed("10.0.4.1", 5),
                    delayed("10.0.4.2", 8_000),
                    delayed("10.0.4.3", 5),
                ],
                Duration::from_millis(300),
            )
            .await;

        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(results[0].is_working(), Some(true));
        assert_eq!(results[1].is_working(), None);
        assert_eq!(results[2].is_working(), Some(true));
    }

    #[tokio::test]
    async fn test_validate_all_and_validate_one() {
        let prober = Arc::new(DelayProber::failing(&["10.0.5.2"]));
        let validator = Validator::with_prober(config(2, 1_000), prober).unwrap();

        let working = validator
            .validate_all(vec![
                delayed("10.0.5.1", 5),
                delayed("10.0.5.2", 5),
                delayed("10.0.5.3", 5),
            ])
            .await;
        let addresses: Vec<&str> = working.iter().map(|r| r.address()).collect();
        assert_eq!(addresses, vec!["10.0.5.1", "10.0.5.3"]);

        assert!(validator.validate_one(&delayed("10.0.5.1", 5)).await);
        assert!(!validator.validate_one(&delayed("10.0.5.2", 5)).await);
    }
}
