use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PoolError, Result};

/// Proxy protocol type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyProtocol {
    Http,
    Https,
    Socks4,
    Socks5,
}

impl ProxyProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyProtocol::Http => "http",
            ProxyProtocol::Https => "https",
            ProxyProtocol::Socks4 => "socks4",
            ProxyProtocol::Socks5 => "socks5",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "http" => Some(ProxyProtocol::Http),
            "https" => Some(ProxyProtocol::Https),
            "socks4" => Some(ProxyProtocol::Socks4),
            "socks5" => Some(ProxyProtocol::Socks5),
            _ => None,
        }
    }

    pub fn is_socks(&self) -> bool {
        matches!(self, ProxyProtocol::Socks4 | ProxyProtocol::Socks5)
    }

    pub fn is_http(&self) -> bool {
        matches!(self, ProxyProtocol::Http | ProxyProtocol::Https)
    }
}

impl std::fmt::Display for ProxyProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Observed liveness of a proxy
///
/// `Unknown` means the proxy has never been probed. It is deliberately distinct
/// from `Failing` so that working-only queries can exclude unprobed proxies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    #[default]
    Unknown,
    Working,
    Failing,
}

impl Liveness {
    pub fn from_flag(flag: Option<bool>) -> Self {
        match flag {
            None => Liveness::Unknown,
            Some(true) => Liveness::Working,
            Some(false) => Liveness::Failing,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Liveness::Unknown => None,
            Liveness::Working => Some(true),
            Liveness::Failing => Some(false),
        }
    }
}

/// Identity of a logical proxy: two records are the same proxy iff their keys match
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyKey {
    pub address: String,
    pub port: u16,
    pub protocol: ProxyProtocol,
}

/// Proxy record
///
/// Records are immutable once built; probing produces a new record through
/// [`ProxyRecord::with_probe_result`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyRecord {
    address: String,
    port: u16,
    protocol: ProxyProtocol,
    #[serde(skip_serializing_if = "Option::is_none")]
    country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout_ms: Option<u64>,
    liveness: Liveness,
}

impl ProxyRecord {
    /// Create a record with unknown liveness and no latency measurement
    pub fn new(address: impl Into<String>, port: u16, protocol: ProxyProtocol) -> Result<Self> {
        let address = address.into().trim().to_string();
        if address.is_empty() {
            return Err(PoolError::InvalidProxyAddress("address is empty".to_string()));
        }
        if port == 0 {
            return Err(PoolError::InvalidProxyAddress(format!(
                "port 0 is not valid for {}",
                address
            )));
        }

        Ok(Self {
            address,
            port,
            protocol,
            country: None,
            timeout_ms: None,
            liveness: Liveness::Unknown,
        })
    }

    pub fn with_country(mut self, country: Option<&str>) -> Self {
        self.country = country
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: Option<u64>) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_liveness(mut self, liveness: Liveness) -> Self {
        self.liveness = liveness;
        self
    }

    /// Produce the record that replaces this one after a probe
    ///
    /// A successful probe stores the observed latency; a failed one clears it.
    pub fn with_probe_result(&self, latency: Option<Duration>) -> Self {
        let mut next = self.clone();
        match latency {
            Some(elapsed) => {
                next.liveness = Liveness::Working;
                next.timeout_ms = Some(elapsed.as_millis() as u64);
            }
            None => {
                next.liveness = Liveness::Failing;
                next.timeout_ms = None;
            }
        }
        next
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn protocol(&self) -> ProxyProtocol {
        self.protocol
    }

    pub fn country(&self) -> Option<&str> {
        self.country.as_deref()
    }

    pub fn timeout_ms(&self) -> Option<u64> {
        self.timeout_ms
    }

    pub fn liveness(&self) -> Liveness {
        self.liveness
    }

    pub fn is_working(&self) -> Option<bool> {
        self.liveness.as_flag()
    }

    pub fn key(&self) -> ProxyKey {
        ProxyKey {
            address: self.address.clone(),
            port: self.port,
            protocol: self.protocol,
        }
    }

    /// Check whether both records describe the same logical proxy
    pub fn same_proxy(&self, other: &ProxyRecord) -> bool {
        self.port == other.port && self.protocol == other.protocol && self.address == other.address
    }

    /// `host:port` form, bracketing bare IPv6 literals
    pub fn authority(&self) -> String {
        if self.address.contains(':') && !self.address.starts_with('[') {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }

    /// Get proxy URL
    pub fn url(&self) -> String {
        format!("{}://{}", self.protocol.as_str(), self.authority())
    }

    /// Mapping suitable for HTTP clients that take one proxy per target scheme
    pub fn proxy_mapping(&self) -> ProxyMapping {
        let url = self.url();
        ProxyMapping {
            http: url.clone(),
            https: url,
        }
    }
}

impl std::fmt::Display for ProxyRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.authority())
    }
}

/// Per-scheme proxy URLs for HTTP client consumption
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyMapping {
    pub http: String,
    pub https: String,
}
