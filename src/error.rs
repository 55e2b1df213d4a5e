use thiserror::Error;

/// Failure taxonomy for the gateway contract.
///
/// Gateway errors propagate to the caller uncaught; each section loader
/// decides its own fallback. "No data" is not an error - the aggregation
/// engine returns `None` for empty input instead.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("network failure: {0}")]
    Network(String),

    #[error("server returned {status}: {message}")]
    Server { status: u16, message: String },

    #[error("malformed response body: {0}")]
    Parse(String),

    #[error("invalid scope: {0}")]
    InvalidScope(String),
}

impl ApiError {
    /// Classify a reqwest failure: decode problems are parse errors,
    /// everything else (DNS, connect, timeout) is a network failure.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Parse(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Network(_) => "network",
            ApiError::Server { .. } => "server",
            ApiError::Parse(_) => "parse",
            ApiError::InvalidScope(_) => "invalid_scope",
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
