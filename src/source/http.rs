//! HTTP(S) JSON proxy source

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::Uri;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde_json::Value;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::{MalformedRecord, ProxySource, RawProxyRecord, SourceQuery};
use crate::error::{PoolError, Result};
use crate::tls;

/// Fetches a JSON proxy list over HTTP or HTTPS
///
/// The payload may be a top-level array or an object holding the list under
/// `proxies` or `data`.
pub struct HttpSource {
    url: Url,
    request_timeout: Duration,
    client: Client<HttpsConnector<HttpConnector>, Empty<Bytes>>,
}

impl HttpSource {
    pub fn new(url: &str, request_timeout: Duration) -> Result<Self> {
        let url = Url::parse(url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(PoolError::Configuration(format!(
                "proxy source must be an http:// or https:// URL, got {}",
                url.scheme()
            )));
        }
        if url.host_str().is_none() {
            return Err(PoolError::Configuration(
                "proxy source URL must include a host".into(),
            ));
        }

        let connector = HttpsConnectorBuilder::new()
            .with_tls_config((*tls::client_config()?).clone())
            .https_or_http()
            .enable_http1()
            .build();

        Ok(Self {
            url,
            request_timeout,
            client: Client::builder(TokioExecutor::new()).build(connector),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    fn request_uri(&self, query: &SourceQuery) -> Result<Uri> {
        let mut url = self.url.clone();
        if query.country.is_some() || query.protocol.is_some() {
            let mut pairs = url.query_pairs_mut();
            if let Some(country) = &query.country {
                pairs.append_pair("country", country);
            }
            if let Some(protocol) = query.protocol {
                pairs.append_pair("protocol", protocol.as_str());
            }
        }

        url.as_str()
            .parse::<Uri>()
            .map_err(|e| PoolError::Configuration(format!("invalid source URI: {}", e)))
    }
}

#[async_trait]
impl ProxySource for HttpSource {
    #[instrument(skip(self), fields(source = %self.url))]
    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<RawProxyRecord>> {
        let uri = self.request_uri(query)?;
        debug!("Requesting proxy list from {}", uri);

        let response = timeout(self.request_timeout, self.client.get(uri))
            .await
            .map_err(|_| PoolError::Source("request timed out".to_string()))?
            .map_err(|e| PoolError::Source(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PoolError::Source(format!(
                "source responded with status {}",
                status
            )));
        }

        let body = timeout(self.request_timeout, response.into_body().collect())
            .await
            .map_err(|_| PoolError::Source("reading response timed out".to_string()))?
            .map_err(|e| PoolError::Source(format!("failed to read response: {}", e)))?
            .to_bytes();

        let records = parse_payload(&body)?;
        info!("Fetched {} proxy entries", records.len());
        Ok(records)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Parse a source payload into raw entries
///
/// A payload that is not JSON, or that carries no list, fails the whole fetch.
/// Individual entries that do not fit the raw record shape are skipped.
pub fn parse_payload(body: &[u8]) -> Result<Vec<RawProxyRecord>> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| PoolError::Source(format!("unparseable payload: {}", e)))?;

    let entries = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("proxies").or_else(|| map.remove("data")) {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(PoolError::Source(
                    "payload object has no `proxies` or `data` list".to_string(),
                ))
            }
        },
        _ => {
            return Err(PoolError::Source(
                "payload is neither a list nor an object".to_string(),
            ))
        }
    };

    let mut records = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value::<RawProxyRecord>(entry) {
            Ok(raw) => records.push(raw),
            Err(e) => {
                let reason = MalformedRecord::Unparseable(e.to_string());
                warn!(index, %reason, "Skipping malformed proxy entry");
            }
        }
    }

    Ok(records)
}
