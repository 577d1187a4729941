//! Filter engine
//!
//! Evaluates a [`ProxyFilter`] against a sequence of records. Evaluation is a
//! stable AND over the constraints present in the filter; `limit` truncates the
//! survivors last.

use tracing::debug;

use crate::error::Result;
use crate::models::{Liveness, ProxyFilter, ProxyRecord};

/// Apply a filter, preserving input order
///
/// The filter is validated before any record is scanned.
pub fn apply(records: Vec<ProxyRecord>, filter: &ProxyFilter) -> Result<Vec<ProxyRecord>> {
    filter.validate()?;

    let total = records.len();
    let matching = records.into_iter().filter(|record| matches(record, filter));
    let result: Vec<ProxyRecord> = match filter.limit {
        Some(limit) => matching.take(limit).collect(),
        None => matching.collect(),
    };

    debug!(
        total,
        kept = result.len(),
        "Applied proxy filter"
    );
    Ok(result)
}

/// Check whether a single record satisfies every constraint of the filter
///
/// Cheap equality checks run first, then latency ranges, then liveness.
/// `limit` is not a per-record constraint and is ignored here.
pub fn matches(record: &ProxyRecord, filter: &ProxyFilter) -> bool {
    if let Some(protocol) = filter.protocol {
        if record.protocol() != protocol {
            return false;
        }
    }

    if let Some(country) = &filter.country {
        match record.country() {
            Some(c) if c.eq_ignore_ascii_case(country.trim()) => {}
            _ => return false,
        }
    }

    // An unmeasured proxy cannot satisfy a latency bound
    if filter.min_timeout_ms.is_some() || filter.max_timeout_ms.is_some() {
        let Some(timeout_ms) = record.timeout_ms() else {
            return false;
        };
        if filter.min_timeout_ms.is_some_and(|min| timeout_ms < min) {
            return false;
        }
        if filter.max_timeout_ms.is_some_and(|max| timeout_ms > max) {
            return false;
        }
    }

    if filter.working_only && record.liveness() != Liveness::Working {
        return false;
    }

    true
}
