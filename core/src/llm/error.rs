//! LLM error taxonomy.

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by an [`super::LlmClient`], matching the component
/// contract's taxonomy: `DeadlineExceeded | RateLimited | Upstream5xx |
/// AuthFailed | BadRequest | Unknown`.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM call exceeded its deadline")]
    DeadlineExceeded,

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("upstream error {status}: {message}")]
    Upstream5xx { status: u16, message: String },

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    Unknown(String),
}

impl LlmError {
    /// The first three variants are retryable by the caller per the
    /// component contract; the rest are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DeadlineExceeded | Self::RateLimited { .. } | Self::Upstream5xx { .. } | Self::Network(_)
        )
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_variants() {
        assert!(LlmError::DeadlineExceeded.is_retryable());
        assert!(
            LlmError::RateLimited {
                retry_after: Duration::from_secs(1)
            }
            .is_retryable()
        );
        assert!(
            LlmError::Upstream5xx {
                status: 503,
                message: "unavailable".into()
            }
            .is_retryable()
        );
        assert!(!LlmError::AuthFailed("bad key".into()).is_retryable());
        assert!(!LlmError::BadRequest("malformed".into()).is_retryable());
    }
}
