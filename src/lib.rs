//! Proxy Pool - Proxy List Management
//!
//! Fetches proxy lists from a source, filters them, validates them through
//! live probes and rotates over the working set.
//!
//! ## Features
//!
//! - Normalization and deduplication of raw source entries
//! - Declarative filtering by country, protocol, latency and liveness
//! - Bounded-concurrency validation, async or thread-based
//! - HTTP, HTTPS, SOCKS4 and SOCKS5 proxy support
//! - Round-robin and random rotation
//! - Plain list, URL, curl, proxy-mapping and CSV output

pub mod client;
pub mod config;
pub mod error;
pub mod filter;
pub mod format;
pub mod models;
pub mod proxy;
pub mod source;
pub mod tls;

pub use client::{BlockingProxyClient, ClientConfig, ProxyClient};
pub use config::Config;
pub use error::{PoolError, Result};
pub use models::{Liveness, ProxyFilter, ProxyProtocol, ProxyRecord};
pub use proxy::{BlockingValidator, RotationStrategy, Rotator, Validator, ValidatorConfig};
