//! TLS client settings shared by probes and the HTTP source

use std::sync::{Arc, OnceLock};

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};

use crate::error::{PoolError, Result};

/// Client config trusting the bundled webpki roots
///
/// Built once per process and shared.
pub fn client_config() -> Result<Arc<ClientConfig>> {
    static CONFIG: OnceLock<std::result::Result<Arc<ClientConfig>, String>> = OnceLock::new();

    CONFIG
        .get_or_init(|| {
            let roots: RootCertStore = webpki_roots::TLS_SERVER_ROOTS.iter().cloned().collect();
            build_config(roots).map_err(|e| e.to_string())
        })
        .clone()
        .map_err(|e| PoolError::Internal(format!("failed to build TLS config: {}", e)))
}

/// Client config trusting only `roots`
pub fn client_config_with_roots(roots: RootCertStore) -> Result<Arc<ClientConfig>> {
    build_config(roots).map_err(|e| PoolError::Internal(format!("failed to build TLS config: {}", e)))
}

fn build_config(roots: RootCertStore) -> std::result::Result<Arc<ClientConfig>, rustls::Error> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

/// Server name presented in the TLS handshake for `host`
pub fn server_name(host: &str) -> Result<ServerName<'static>> {
    ServerName::try_from(host.to_string())
        .map_err(|e| PoolError::Configuration(format!("invalid TLS server name {}: {}", host, e)))
}
