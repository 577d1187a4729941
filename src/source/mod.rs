//! Proxy sources
//!
//! A source returns raw, possibly duplicated or malformed, proxy entries. The
//! normalizer turns them into [`ProxyRecord`]s, skipping entries that cannot be
//! mapped and collapsing duplicates on `(address, port, protocol)`.

pub mod http;

pub use http::HttpSource;

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::warn;

use crate::error::Result;
use crate::models::{Liveness, ProxyKey, ProxyProtocol, ProxyRecord};

/// Hints a source may use to narrow what it returns
///
/// Sources are free to ignore them; the filter engine applies the same
/// constraints afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceQuery {
    pub country: Option<String>,
    pub protocol: Option<ProxyProtocol>,
}

impl SourceQuery {
    pub fn all() -> Self {
        Self::default()
    }
}

/// Trait for proxy list providers
#[async_trait]
pub trait ProxySource: Send + Sync {
    /// Fetch raw proxy entries
    ///
    /// Returns `PoolError::Source` when the provider is unreachable or its
    /// payload cannot be parsed as a whole.
    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<RawProxyRecord>>;

    /// Get the source name (for logging)
    fn name(&self) -> &'static str;
}

/// Proxy entry as delivered by a source, before normalization
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RawProxyRecord {
    #[serde(alias = "ip", alias = "host")]
    pub address: Option<String>,
    #[serde(deserialize_with = "lenient_port")]
    pub port: Option<i64>,
    #[serde(alias = "type", alias = "scheme")]
    pub protocol: Option<String>,
    #[serde(alias = "country_code")]
    pub country: Option<String>,
    #[serde(alias = "latency", alias = "timeout")]
    pub timeout_ms: Option<i64>,
    #[serde(alias = "working", alias = "alive")]
    pub is_working: Option<bool>,
}

impl RawProxyRecord {
    pub fn new(address: &str, port: i64, protocol: &str) -> Self {
        Self {
            address: Some(address.to_string()),
            port: Some(port),
            protocol: Some(protocol.to_string()),
            ..Self::default()
        }
    }

    pub fn with_country(mut self, country: &str) -> Self {
        self.country = Some(country.to_string());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: i64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_working(mut self, working: bool) -> Self {
        self.is_working = Some(working);
        self
    }

    /// Map this entry onto a record, or explain why it cannot be mapped
    pub fn normalize(&self) -> std::result::Result<ProxyRecord, MalformedRecord> {
        let raw_address = self
            .address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .ok_or(MalformedRecord::MissingAddress)?;

        let (address, port) = match self.port {
            Some(port) => (raw_address.to_string(), port),
            None => split_host_port(raw_address).ok_or(MalformedRecord::MissingPort)?,
        };

        let port = u16::try_from(port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or(MalformedRecord::PortOutOfRange(port))?;

        let token = self
            .protocol
            .as_deref()
            .ok_or(MalformedRecord::MissingProtocol)?;
        let protocol = ProxyProtocol::from_str(token)
            .ok_or_else(|| MalformedRecord::InvalidProtocol(token.to_string()))?;

        let record = ProxyRecord::new(address, port, protocol)
            .map_err(|_| MalformedRecord::MissingAddress)?
            .with_country(self.country.as_deref())
            .with_timeout_ms(self.timeout_ms.and_then(|t| u64::try_from(t).ok()))
            .with_liveness(Liveness::from_flag(self.is_working));

        Ok(record)
    }
}

/// Reason a raw entry was dropped during normalization
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedRecord {
    #[error("missing address")]
    MissingAddress,

    #[error("missing port")]
    MissingPort,

    #[error("port {0} is out of range")]
    PortOutOfRange(i64),

    #[error("missing protocol")]
    MissingProtocol,

    #[error("invalid protocol token: {0}")]
    InvalidProtocol(String),

    #[error("unparseable entry: {0}")]
    Unparseable(String),
}

/// A dropped entry and its position in the source batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    pub index: usize,
    pub reason: MalformedRecord,
}

/// Outcome of normalizing a source batch
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    pub records: Vec<ProxyRecord>,
    pub skipped: Vec<SkippedRecord>,
    pub duplicates: usize,
}

/// Normalize and deduplicate a raw batch
///
/// Malformed entries are logged and skipped; the first occurrence of each
/// `(address, port, protocol)` key wins.
pub fn normalize(raw: Vec<RawProxyRecord>) -> Normalized {
    let mut out = Normalized::default();
    let mut seen: HashSet<ProxyKey> = HashSet::with_capacity(raw.len());

    for (index, entry) in raw.into_iter().enumerate() {
        match entry.normalize() {
            Ok(record) => {
                if seen.insert(record.key()) {
                    out.records.push(record);
                } else {
                    out.duplicates += 1;
                }
            }
            Err(reason) => {
                warn!(index, %reason, "Skipping malformed proxy entry");
                out.skipped.push(SkippedRecord { index, reason });
            }
        }
    }

    out
}

/// Split `host:port`, accepting bracketed IPv6 like `[::1]:8080`
fn split_host_port(addr: &str) -> Option<(String, i64)> {
    let (host, port) = addr.rsplit_once(':')?;
    let port = port.parse::<i64>().ok()?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if host.is_empty() {
        return None;
    }
    Some((host.to_string(), port))
}

/// Accept ports given either as JSON numbers or numeric strings
fn lenient_port<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortRepr {
        Number(i64),
        Text(String),
    }

    match Option::<PortRepr>::deserialize(deserializer)? {
        None => Ok(None),
        Some(PortRepr::Number(n)) => Ok(Some(n)),
        Some(PortRepr::Text(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid port: {}", s))),
    }
}

/// In-memory source serving a fixed batch
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    records: Vec<RawProxyRecord>,
}

impl StaticSource {
    pub fn new(records: Vec<RawProxyRecord>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl ProxySource for StaticSource {
    async fn fetch(&self, _query: &SourceQuery) -> Result<Vec<RawProxyRecord>> {
        Ok(self.records.clone())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}
