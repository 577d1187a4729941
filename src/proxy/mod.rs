//! Proxy probing, validation and rotation
//!
//! This module provides:
//! - Connections through HTTP and SOCKS proxies
//! - Liveness probes against a test URL
//! - Bounded-concurrency validation (async and thread-based)
//! - Round-robin and random rotation over a working set

pub mod blocking;
pub mod probe;
pub mod rotation;
pub mod transport;
pub mod validator;

pub use blocking::BlockingValidator;
pub use probe::{HttpProber, ProbeTarget, Prober};
pub use rotation::{RotationStrategy, Rotator};
pub use transport::ProxyTransport;
pub use validator::{Validator, ValidatorConfig};
