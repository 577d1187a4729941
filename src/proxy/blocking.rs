//! Thread-based proxy validation
//!
//! Runs probes on a fixed set of scoped worker threads for callers that have no
//! async runtime. Each worker owns a single-threaded tokio runtime and pulls
//! input indices from a shared counter until the batch is exhausted.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::runtime::{Builder, Runtime};
use tokio::time::timeout;
use tracing::{debug, info};

use super::probe::{HttpProber, ProbeTarget, Prober};
use super::validator::{merge_slots, probe_record, ValidatorConfig};
use crate::error::{PoolError, Result};
use crate::models::{Liveness, ProxyRecord};

/// Blocking proxy validator
///
/// Same contract as [`super::validator::Validator`]: one result per input, in
/// input order, at most `concurrency` probes in flight.
#[derive(Clone)]
pub struct BlockingValidator {
    config: ValidatorConfig,
    target: ProbeTarget,
    prober: Arc<dyn Prober>,
}

impl BlockingValidator {
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
    pub fn validate(&self, records: Vec<ProxyRecord>) -> Result<Vec<ProxyRecord>> {
        self.run(records, None)
    }

    /// Probe every record, stopping once `budget` has elapsed
    ///
    /// Workers stop pulling new records at the deadline and abandon the probe
    /// they are running. Records never probed come back unchanged.
    pub fn validate_within(
        &self,
        records: Vec<ProxyRecord>,
        budget: Duration,
    ) -> Result<Vec<ProxyRecord>> {
        self.run(records, Some(Instant::now() + budget))
    }

    /// Probe every record and keep only the working ones
    pub fn validate_all(&self, records: Vec<ProxyRecord>) -> Result<Vec<ProxyRecord>> {
        Ok(self
            .validate(records)?
            .into_iter()
            .filter(|r| r.liveness() == Liveness::Working)
            .collect())
    }

    /// Probe a single record on the calling thread
    pub fn validate_one(&self, record: &ProxyRecord) -> Result<bool> {
        let runtime = probe_runtime()?;
        let probed = runtime.block_on(probe_record(
            self.prober.as_ref(),
            record,
            &self.target,
            self.config.timeout,
        ));
        Ok(probed.liveness() == Liveness::Working)
    }

    fn run(
        &self,
        records: Vec<ProxyRecord>,
        deadline: Option<Instant>,
    ) -> Result<Vec<ProxyRecord>> {
        if records.is_empty() {
            return Ok(records);
        }

        let total = records.len();
        let workers = self.config.concurrency.min(total);
        let next_index = AtomicUsize::new(0);
        let slots: Mutex<Vec<Option<ProxyRecord>>> = Mutex::new(vec![None; total]);

        debug!(total, workers, "Starting probe workers");

        thread::scope(|scope| -> Result<()> {
            let mut handles = Vec::with_capacity(workers);
            for id in 0..workers {
                let handle = thread::Builder::new()
                    .name(format!("proxy-probe-{}", id))
                    .spawn_scoped(scope, || {
                        self.work(&records, &next_index, &slots, deadline)
                    })
                    .map_err(|e| {
                        PoolError::Internal(format!("failed to spawn probe worker: {}", e))
                    })?;
                handles.push(handle);
            }

            for handle in handles {
                handle
                    .join()
                    .map_err(|_| PoolError::Internal("probe worker panicked".to_string()))??;
            }
            Ok(())
        })?;

        let slots = slots.into_inner();
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
            "Validation complete: {} working, {} failing",
            working,
            completed - working
        );

        Ok(results)
    }

    /// Worker loop: claim an index, probe it, store the result
    fn work(
        &self,
        records: &[ProxyRecord],
        next_index: &AtomicUsize,
        slots: &Mutex<Vec<Option<ProxyRecord>>>,
        deadline: Option<Instant>,
    ) -> Result<()> {
        let runtime = probe_runtime()?;

        loop {
            let remaining = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        break;
                    }
                    Some(remaining)
                }
                None => None,
            };

            let index = next_index.fetch_add(1, Ordering::SeqCst);
            let Some(record) = records.get(index) else {
                break;
            };

            let probe = probe_record(
                self.prober.as_ref(),
                record,
                &self.target,
                self.config.timeout,
            );
            let probed = match remaining {
                Some(remaining) => {
                    match runtime.block_on(async { timeout(remaining, probe).await }) {
                        Ok(probed) => probed,
                        Err(_) => {
                            debug!(proxy = %record.url(), "Validation deadline reached");
                            break;
                        }
                    }
                }
                None => runtime.block_on(probe),
            };

            slots.lock()[index] = Some(probed);
        }

        Ok(())
    }
}

fn probe_runtime() -> Result<Runtime> {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| PoolError::Internal(format!("failed to start probe runtime: {}", e)))
}
