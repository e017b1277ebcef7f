use thiserror::Error;

/// Leaf error type for rate limiter operations; converts into
/// [`crate::error::LoomError`] at the call site.
#[derive(Debug, Error, Clone)]
pub enum RateLimiterError {
    #[error("queue timeout waiting for admission")]
    QueueTimeout,

    #[error("retries exhausted")]
    RetriesExhausted,

    #[error("cancelled")]
    Cancelled,

    #[error("retryable provider error: {0}")]
    Retryable(String),

    #[error("non-retryable provider error: {0}")]
    NonRetryable(String),
}

impl RateLimiterError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, RateLimiterError::Retryable(_))
    }

    /// Classifies a raw error message: any HTTP 429 indicator, or a
    /// network-level timeout/reset, is retryable.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("429")
            || lower.contains("too many requests")
            || lower.contains("timed out")
            || lower.contains("timeout")
            || lower.contains("connection reset")
            || lower.contains("connection refused")
        {
            RateLimiterError::Retryable(message.to_string())
        } else {
            RateLimiterError::NonRetryable(message.to_string())
        }
    }
}

impl From<RateLimiterError> for crate::error::LoomError {
    fn from(e: RateLimiterError) -> Self {
        match e {
            RateLimiterError::QueueTimeout => {
                crate::error::LoomError::ProviderRateLimited("queue timeout".into())
            }
            RateLimiterError::RetriesExhausted => {
                crate::error::LoomError::ProviderUnavailable("retries exhausted".into())
            }
            RateLimiterError::Cancelled => crate::error::LoomError::ContextCancelled,
            RateLimiterError::Retryable(m) => crate::error::LoomError::ProviderRateLimited(m),
            RateLimiterError::NonRetryable(m) => crate::error::LoomError::ProviderBadResponse(m),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_429_as_retryable() {
        assert!(RateLimiterError::classify("HTTP 429 Too Many Requests").is_retryable());
    }

    #[test]
    fn classifies_timeout_as_retryable() {
        assert!(RateLimiterError::classify("request timed out").is_retryable());
    }

    #[test]
    fn classifies_validation_error_as_non_retryable() {
        assert!(!RateLimiterError::classify("invalid api key").is_retryable());
    }
}
