//! Error taxonomy shared by the dispatcher and the workers.
//!
//! Every variant that can reach a client maps onto an HTTP status; the
//! worker-side variants additionally map onto a wire [`ErrorCode`].

use axum::http::StatusCode;
use thiserror::Error;

use crate::config::loader::ConfigError;
use crate::protocol::ErrorCode;

#[derive(Debug, Error)]
pub enum ProxyError {
    /// Configuration failed to load or validate. Fatal at startup.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(#[from] ConfigError),

    /// A descriptor could not be decoded or failed schema validation.
    #[error("malformed message: {0}")]
    MessageMalformed(String),

    /// No rule matches the requested path.
    #[error("no rule matches path {0}")]
    RuleNotFound(String),

    /// A rule names no upstream, or names one that is not declared.
    #[error("upstream unresolved: {0}")]
    UpstreamUnresolved(String),

    /// The upstream call itself failed (connect, I/O, timeout).
    #[error("upstream request failed: {0}")]
    UpstreamFailed(String),

    /// The client exhausted its request window.
    #[error("rate limit exceeded")]
    RateLimited,

    /// The selected worker is down, its link broke, or it did not answer in time.
    #[error("worker {worker} unavailable: {reason}")]
    WorkerUnavailable { worker: usize, reason: &'static str },

    /// A reply arrived for a correlation id with no pending request.
    #[error("no pending request for correlation id {0}")]
    CorrelationMismatch(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProxyError {
    /// Wire code for errors a worker reports back in a reply descriptor.
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            ProxyError::MessageMalformed(_) => Some(ErrorCode::BadRequest),
            ProxyError::RuleNotFound(_) => Some(ErrorCode::NotFound),
            ProxyError::RateLimited => Some(ErrorCode::TooManyRequests),
            ProxyError::UpstreamUnresolved(_) | ProxyError::UpstreamFailed(_) => {
                Some(ErrorCode::Internal)
            }
            _ => None,
        }
    }

    /// Status code returned to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::MessageMalformed(_) => StatusCode::BAD_REQUEST,
            ProxyError::RuleNotFound(_) => StatusCode::NOT_FOUND,
            ProxyError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ProxyError::WorkerUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Body text sent to the client. Internal detail stays in the logs.
    pub fn client_message(&self) -> &'static str {
        match self {
            ProxyError::MessageMalformed(_) => "Bad Request",
            ProxyError::RuleNotFound(_) => "Rule Not Found",
            ProxyError::UpstreamUnresolved(_) => "Upstream Not Found",
            ProxyError::UpstreamFailed(_) => "Upstream Request Failed",
            ProxyError::RateLimited => "Too Many Requests",
            ProxyError::WorkerUnavailable { .. } => "Service Unavailable",
            _ => "Internal Server Error",
        }
    }
}
