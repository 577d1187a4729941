//! Liveness probes
//!
//! A probe sends one request through a candidate proxy to a known test URL.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{CONNECTION, HOST, USER_AGENT};
use http_body_util::Empty;
use hyper::{Method, Request, StatusCode};
use rustls::ClientConfig;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::TlsConnector;
use tracing::{debug, instrument};
use url::Url;

use super::transport::{format_authority, ProxyTransport};
use crate::error::{PoolError, Result};
use crate::models::ProxyRecord;
use crate::tls;

const PROBE_USER_AGENT: &str = concat!("proxy-pool/", env!("CARGO_PKG_VERSION"));

/// Parsed test URL a probe is aimed at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    url: Url,
    host: String,
    port: u16,
    secure: bool,
}

impl ProbeTarget {
    pub fn parse(test_url: &str) -> Result<Self> {
        let url = Url::parse(test_url)?;

        let secure = match url.scheme() {
            "http" => false,
            "https" => true,
            other => {
                return Err(PoolError::Configuration(format!(
                    "test URL has unsupported scheme: {}",
                    other
                )))
            }
        };

        let host = url
            .host_str()
            .ok_or_else(|| PoolError::Configuration("test URL must include a host".into()))?;
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host)
            .to_string();

        let port = url
            .port_or_known_default()
            .ok_or_else(|| PoolError::Configuration("test URL has no usable port".into()))?;

        Ok(Self {
            url,
            host,
            port,
            secure,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// Request target for a request sent over an established tunnel
    fn origin_form(&self) -> String {
        match self.url.query() {
            Some(query) => format!("{}?{}", self.url.path(), query),
            None => self.url.path().to_string(),
        }
    }

    /// `Host` header value; the port is omitted when it is the scheme default
    fn host_header(&self) -> String {
        match self.url.port() {
            Some(port) => format_authority(&self.host, port),
            None if self.host.contains(':') => format!("[{}]", self.host),
            None => self.host.clone(),
        }
    }
}

/// Trait for liveness probes
///
/// Implementations report success with `Ok(())`. Timeouts are enforced by the
/// caller, so a probe may simply await network I/O.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, proxy: &ProxyRecord, target: &ProbeTarget) -> Result<()>;
}

/// Probe that issues a real `GET` through the proxy
///
/// HTTP proxies receive an absolute-form request for `http` test URLs. SOCKS
/// proxies, and every proxy when the test URL is `https`, tunnel to the target
/// first; `https` targets then get a TLS handshake before the request.
#[derive(Clone)]
pub struct HttpProber {
    tls: TlsConnector,
}

impl HttpProber {
    /// Create a prober trusting the bundled webpki roots
    pub fn new() -> Result<Self> {
        Ok(Self::with_tls_config(tls::client_config()?))
    }

    pub fn with_tls_config(config: Arc<ClientConfig>) -> Self {
        Self {
            tls: TlsConnector::from(config),
        }
    }
}

#[async_trait]
impl Prober for HttpProber {
    #[instrument(skip(self, target), fields(proxy = %proxy.url()))]
    async fn probe(&self, proxy: &ProxyRecord, target: &ProbeTarget) -> Result<()> {
        let host = target.host_header();

        let status = if target.is_secure() {
            let tunnel = ProxyTransport::connect(proxy, target.host(), target.port()).await?;
            let stream = self
                .tls
                .connect(tls::server_name(target.host())?, tunnel)
                .await
                .map_err(|e| PoolError::ProbeFailed(format!("TLS handshake failed: {}", e)))?;
            debug!("TLS session to {} established", target.host());
            send_get(stream, &target.origin_form(), &host).await?
        } else if proxy.protocol().is_http() {
            let stream = ProxyTransport::open(proxy).await?;
            send_get(stream, target.as_str(), &host).await?
        } else {
            let stream = ProxyTransport::connect(proxy, target.host(), target.port()).await?;
            send_get(stream, &target.origin_form(), &host).await?
        };

        if status != StatusCode::OK {
            return Err(PoolError::ProbeFailed(format!(
                "unexpected status {}",
                status
            )));
        }

        debug!("Probe succeeded");
        Ok(())
    }
}

/// Send a bodiless `GET` over an established stream and return the status
async fn send_get<S>(stream: S, request_target: &str, host: &str) -> Result<StatusCode>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let request = Request::builder()
        .method(Method::GET)
        .uri(request_target)
        .header(HOST, host)
        .header(USER_AGENT, PROBE_USER_AGENT)
        .header(CONNECTION, "close")
        .body(Empty::<Bytes>::new())
        .map_err(|e| PoolError::Http(format!("failed to build probe request: {}", e)))?;

    let io = hyper_util::rt::TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| PoolError::ProbeFailed(format!("handshake failed: {}", e)))?;

    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!("Probe connection ended: {}", e);
        }
    });

    let response = sender
        .send_request(request)
        .await
        .map_err(|e| PoolError::ProbeFailed(format!("request failed: {}", e)))?;

    Ok(response.status())
}
