use thiserror::Error;

/// Unified error type for proxy pool operations
#[derive(Error, Debug)]
pub enum PoolError {
    // Configuration errors
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    // Data source errors
    #[error("Proxy source error: {0}")]
    Source(String),

    // Rotation errors
    #[error("Rotation set is empty")]
    EmptySet,

    // Probe errors (folded into liveness by the validator)
    #[error("Probe failed: {0}")]
    ProbeFailed(String),

    #[error("Invalid proxy address: {0}")]
    InvalidProxyAddress(String),

    #[error("Operation timed out")]
    Timeout,

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // HTTP errors
    #[error("HTTP error: {0}")]
    Http(String),

    // Output errors
    #[error("Format error: {0}")]
    Format(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for proxy pool operations
pub type Result<T> = std::result::Result<T, PoolError>;

impl PoolError {
    /// Check if this error was caused by invalid caller-supplied configuration
    pub fn is_configuration(&self) -> bool {
        matches!(self, PoolError::Configuration(_))
    }

    /// Check if this error came from the upstream proxy source
    pub fn is_source(&self) -> bool {
        matches!(self, PoolError::Source(_))
    }

    /// Check if this error describes a failed probe rather than a caller mistake
    pub fn is_probe_failure(&self) -> bool {
        matches!(
            self,
            PoolError::ProbeFailed(_)
                | PoolError::InvalidProxyAddress(_)
                | PoolError::Timeout
                | PoolError::Io(_)
                | PoolError::Http(_)
        )
    }
}

// Convert from hyper errors
impl From<hyper::Error> for PoolError {
    fn from(err: hyper::Error) -> Self {
        PoolError::Http(err.to_string())
    }
}

// Convert from URL parse errors
impl From<url::ParseError> for PoolError {
    fn from(err: url::ParseError) -> Self {
        PoolError::Configuration(format!("invalid URL: {}", err))
    }
}

// Convert from CSV writer errors
impl From<csv::Error> for PoolError {
    fn from(err: csv::Error) -> Self {
        PoolError::Format(err.to_string())
    }
}
