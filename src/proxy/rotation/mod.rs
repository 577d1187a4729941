//! Proxy rotation
//!
//! A [`Rotator`] owns an ordered working set and hands out proxies either in
//! round-robin order or uniformly at random.

mod cursor;

pub use cursor::cursor_after_removal;

use rand::seq::SliceRandom;
use std::sync::Arc;
use tracing::debug;

use crate::error::{PoolError, Result};
use crate::models::ProxyRecord;

/// Strategy types for proxy rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationStrategy {
    #[default]
    Random,
    RoundRobin,
}

impl RotationStrategy {
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "round_robin" | "roundrobin" | "round-robin" => Self::RoundRobin,
            _ => Self::Random,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::RoundRobin => "round_robin",
        }
    }
}

/// Ordered working set with a round-robin cursor
///
/// Not synchronized: selection and removal take `&mut self`. Callers sharing a
/// rotator across tasks wrap it in their own lock.
#[derive(Debug, Clone, Default)]
pub struct Rotator {
    proxies: Vec<Arc<ProxyRecord>>,
    cursor: usize,
}

impl Rotator {
    pub fn new(proxies: Vec<ProxyRecord>) -> Self {
        Self {
            proxies: proxies.into_iter().map(Arc::new).collect(),
            cursor: 0,
        }
    }

    /// Create a rotator whose first round-robin pick is `proxies[start]`
    pub fn with_cursor(proxies: Vec<ProxyRecord>, start: usize) -> Result<Self> {
        if !proxies.is_empty() && start >= proxies.len() {
            return Err(PoolError::Configuration(format!(
                "rotation start index {} is out of range for {} proxies",
                start,
                proxies.len()
            )));
        }
        if proxies.is_empty() && start != 0 {
            return Err(PoolError::Configuration(
                "rotation start index must be 0 for an empty set".into(),
            ));
        }

        let mut rotator = Self::new(proxies);
        rotator.cursor = start;
        Ok(rotator)
    }

    /// Return the proxy under the cursor and advance the cursor
    pub fn next_proxy(&mut self) -> Result<Arc<ProxyRecord>> {
        let proxy = self
            .proxies
            .get(self.cursor)
            .cloned()
            .ok_or(PoolError::EmptySet)?;
        self.cursor = cursor::advance(self.cursor, self.proxies.len());
        Ok(proxy)
    }

    /// Pick a proxy uniformly at random without touching the cursor
    pub fn random_pick(&self) -> Result<Arc<ProxyRecord>> {
        let mut rng = rand::thread_rng();
        self.proxies
            .choose(&mut rng)
            .cloned()
            .ok_or(PoolError::EmptySet)
    }

    /// Select a proxy with the given strategy
    pub fn select(&mut self, strategy: RotationStrategy) -> Result<Arc<ProxyRecord>> {
        match strategy {
            RotationStrategy::RoundRobin => self.next_proxy(),
            RotationStrategy::Random => self.random_pick(),
        }
    }

    /// Remove the first proxy matching `record`'s identity
    ///
    /// Returns false when no such proxy is in the set.
    pub fn remove(&mut self, record: &ProxyRecord) -> bool {
        let Some(index) = self.proxies.iter().position(|p| p.same_proxy(record)) else {
            return false;
        };

        let old_len = self.proxies.len();
        self.proxies.remove(index);
        self.cursor = cursor_after_removal(self.cursor, index, old_len);
        debug!(proxy = %record, remaining = self.proxies.len(), "Removed proxy from rotation");
        true
    }

    pub fn size(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn proxies(&self) -> &[Arc<ProxyRecord>] {
        &self.proxies
    }
}

impl FromIterator<ProxyRecord> for Rotator {
    fn from_iter<I: IntoIterator<Item = ProxyRecord>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
