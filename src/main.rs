//! Proxy Pool - Entry Point
//!
//! Fetches the configured proxy list, validates it and prints the working
//! proxies as CSV on stdout.

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use proxy_pool::config::{Config, LogFormat};
use proxy_pool::{format, ProxyClient};

#[tokio::main]
async fn main() -> proxy_pool::Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("proxy_pool={}", config.log.level).into());
    let registry = tracing_subscriber::registry().with(filter);
    match config.log.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }

    info!(source = %config.source.url, "Fetching working proxies");

    let client = ProxyClient::from_config(&config)?;
    let proxies = match client.get_working_proxies(None).await {
        Ok(proxies) => proxies,
        Err(e) => {
            error!("Failed to load proxies: {}", e);
            return Err(e);
        }
    };

    info!("Found {} working proxies", proxies.len());
    print!("{}", format::to_csv(&proxies, true)?);

    Ok(())
}
