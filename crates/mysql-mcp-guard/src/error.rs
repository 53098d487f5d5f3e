use std::fmt::Display;
use std::time::Duration;

use rmcp::ErrorData;
use thiserror::Error;

use crate::security::ExecuteError;
use crate::types::RejectReason;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid statement: {0}")]
    InvalidStatement(String),

    #[error("Request rejected ({reason}): {message}")]
    SecurityRejection {
        reason: RejectReason,
        message: String,
    },

    #[error("Rate limit exceeded{}", retry_hint(*.retry_after))]
    RateLimitExceeded { retry_after: Option<Duration> },

    #[error("Query timeout after {0:?}")]
    QueryTimeout(Duration),

    #[error("Execution error: {0}")]
    Execution(String),
}

fn retry_hint(retry_after: Option<Duration>) -> String {
    retry_after.map_or_else(String::new, |d| {
        format!(", retry after {:.3}s", d.as_secs_f64())
    })
}

impl Error {
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    #[must_use]
    pub const fn is_invalid_statement(&self) -> bool {
        matches!(self, Self::InvalidStatement(_))
    }

    #[must_use]
    pub const fn is_security_rejection(&self) -> bool {
        matches!(self, Self::SecurityRejection { .. })
    }

    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimitExceeded { .. })
    }

    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::QueryTimeout(_))
    }

    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Rejection reason code, for errors produced by a pipeline decision
    #[must_use]
    pub const fn reason(&self) -> Option<RejectReason> {
        match self {
            Self::SecurityRejection { reason, .. } => Some(*reason),
            Self::RateLimitExceeded { .. } => Some(RejectReason::RateLimited),
            Self::InvalidStatement(_) => Some(RejectReason::InvalidStatement),
            _ => None,
        }
    }
}

impl<E: Display> From<ExecuteError<E>> for Error {
    fn from(err: ExecuteError<E>) -> Self {
        match err {
            ExecuteError::Timeout(d) => Self::QueryTimeout(d),
            ExecuteError::Query(e) => Self::Execution(e.to_string()),
        }
    }
}

/// Convert our Error type to rmcp `ErrorData`
impl From<Error> for ErrorData {
    fn from(err: Error) -> Self {
        match err {
            Error::Config(msg) => Self::invalid_params(format!("Configuration error: {msg}"), None),
            Error::InvalidStatement(msg) => {
                Self::invalid_params(format!("Invalid statement: {msg}"), None)
            }
            Error::SecurityRejection { reason, message } => Self::invalid_params(
                format!("Request rejected: {message}"),
                Some(serde_json::json!({ "reason": reason.as_str() })),
            ),
            Error::RateLimitExceeded { retry_after } => Self::invalid_params(
                format!("Rate limit exceeded{}", retry_hint(retry_after)),
                Some(serde_json::json!({
                    "reason": RejectReason::RateLimited.as_str(),
                    "retry_after_ms": retry_after.map(|d| d.as_millis() as u64),
                })),
            ),
            Error::QueryTimeout(duration) => {
                Self::internal_error(format!("Query timeout after {duration:?}"), None)
            }
            Error::Execution(msg) => Self::internal_error(format!("Query error: {msg}"), None),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
