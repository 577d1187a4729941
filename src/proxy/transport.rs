//! Proxy transport layer for HTTP and SOCKS protocols
//!
//! Handles establishing connections through candidate proxies.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_socks::tcp::{Socks4Stream, Socks5Stream};
use tracing::{debug, instrument};

use crate::error::{PoolError, Result};
use crate::models::{ProxyProtocol, ProxyRecord};

/// Proxy transport handler
///
/// Opens plain connections to a proxy, or tunnels through it to a target.
pub struct ProxyTransport;

impl ProxyTransport {
    /// Open a TCP connection to the proxy itself
    ///
    /// Used for HTTP forward-proxy requests, where the request line carries the
    /// absolute target URL.
    pub async fn open(proxy: &ProxyRecord) -> Result<TcpStream> {
        TcpStream::connect((proxy.address(), proxy.port()))
            .await
            .map_err(|e| PoolError::ProbeFailed(format!("TCP connect failed: {}", e)))
    }

    /// Connect to a target through the specified proxy
    #[instrument(skip(proxy), fields(proxy = %proxy, target = %target_host))]
    pub async fn connect(
        proxy: &ProxyRecord,
        target_host: &str,
        target_port: u16,
    ) -> Result<TcpStream> {
        let socket = Self::open(proxy).await?;

        let result = match proxy.protocol() {
            ProxyProtocol::Http | ProxyProtocol::Https => {
                connect_http(socket, target_host, target_port).await
            }
            ProxyProtocol::Socks4 => connect_socks4(socket, target_host, target_port).await,
            ProxyProtocol::Socks5 => connect_socks5(socket, target_host, target_port).await,
        };

        result.map_err(|e| {
            PoolError::ProbeFailed(format!(
                "{} tunnel to {} failed: {}",
                proxy.protocol(),
                format_authority(target_host, target_port),
                e
            ))
        })
    }
}

/// Tunnel through an HTTP proxy with the CONNECT method
async fn connect_http(
    mut stream: TcpStream,
    target_host: &str,
    target_port: u16,
) -> std::result::Result<TcpStream, anyhow::Error> {
    let authority = format_authority(target_host, target_port);
    let request = format!(
        "CONNECT {} HTTP/1.1\r\nHost: {}\r\n\r\n",
        authority, authority
    );
    stream.write_all(request.as_bytes()).await?;

    let mut response = vec![0u8; 1024];
    let n = stream.read(&mut response).await?;
    if n == 0 {
        anyhow::bail!("empty CONNECT response");
    }

    let response_str = String::from_utf8_lossy(&response[..n]);
    let status_line = response_str.lines().next().unwrap_or("");
    if status_code(status_line) != Some(200) {
        anyhow::bail!("CONNECT rejected: {}", status_line);
    }

    debug!("HTTP CONNECT tunnel established");
    Ok(stream)
}

async fn connect_socks4(
    socket: TcpStream,
    target_host: &str,
    target_port: u16,
) -> std::result::Result<TcpStream, anyhow::Error> {
    // Hostnames are sent with the SOCKS4a extension
    let stream = Socks4Stream::connect_with_socket(socket, (target_host, target_port)).await?;
    debug!("SOCKS4 connection established");
    Ok(stream.into_inner())
}

async fn connect_socks5(
    socket: TcpStream,
    target_host: &str,
    target_port: u16,
) -> std::result::Result<TcpStream, anyhow::Error> {
    let stream = Socks5Stream::connect_with_socket(socket, (target_host, target_port)).await?;
    debug!("SOCKS5 connection established");
    Ok(stream.into_inner())
}

/// Extract the status code from an HTTP status line
fn status_code(status_line: &str) -> Option<u16> {
    let mut parts = status_line.split_whitespace();
    let version = parts.next()?;
    if !version.starts_with("HTTP/") {
        return None;
    }
    parts.next()?.parse().ok()
}

pub(crate) fn format_authority(host: &str, port: u16) -> String {
    if host.contains(':') && !(host.starts_with('[') && host.ends_with(']')) {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}
