//! Error types for the gateway core
//!
//! Rate-limit and upstream-unavailable failures stay distinct variants so
//! the web layer can render "try again in Ns" vs "service unavailable".

use parlor_upstream::{AgentId, UpstreamError};

/// Main gateway error type
///
/// `Clone` because results can be shared through the response cache.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    /// Request budget for the window is spent
    #[error("rate limited, retry in {retry_after_secs}s")]
    RateLimited {
        /// Seconds until the window resets
        retry_after_secs: u64,
    },

    /// Agent missing upstream, or not owned by the requesting identity
    #[error("agent not found: {0}")]
    AgentNotFound(AgentId),

    /// Remote call failed or timed out
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(#[source] UpstreamError),

    /// Block could not be attached; the exchange was aborted before the send
    #[error("block attach failed: {0}")]
    BlockAttachFailed(#[source] UpstreamError),

    /// Request payload failed validation
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Local record store failure
    #[error("store failure: {0}")]
    Store(#[from] StoreError),

    /// Fault in the gateway itself (task join, poisoned state)
    #[error("internal gateway fault: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Retry hint in seconds, present only for rate-limit denials
    #[inline]
    #[must_use]
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }

    /// Whether the whole exchange is safe to retry later
    ///
    /// Attach failures abort before any send side effect, so the caller may
    /// replay the exchange. An upstream failure mid-send may already have
    /// reached the agent and must not be replayed blindly.
    #[inline]
    #[must_use]
    pub fn is_safe_to_retry(&self) -> bool {
        matches!(self, Self::BlockAttachFailed(_) | Self::RateLimited { .. })
    }
}

impl From<UpstreamError> for GatewayError {
    fn from(err: UpstreamError) -> Self {
        Self::UpstreamUnavailable(err)
    }
}

/// Block record store errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Underlying database failure
    #[error("database failure: {0}")]
    Database(String),

    /// Persisted row did not round-trip
    #[error("corrupt record for identity {identity}: {detail}")]
    CorruptRecord {
        /// Identity whose row is damaged
        identity: String,
        /// What failed to parse
        detail: String,
    },
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_carries_retry_hint() {
        let err = GatewayError::RateLimited {
            retry_after_secs: 12,
        };
        assert_eq!(err.retry_after(), Some(12));
        assert!(err.to_string().contains("12s"));
    }

    #[test]
    fn upstream_errors_have_no_retry_hint() {
        let err = GatewayError::UpstreamUnavailable(UpstreamError::Timeout);
        assert_eq!(err.retry_after(), None);
    }

    #[test]
    fn attach_failures_are_safe_to_retry() {
        let err = GatewayError::BlockAttachFailed(UpstreamError::Timeout);
        assert!(err.is_safe_to_retry());

        let err = GatewayError::UpstreamUnavailable(UpstreamError::Timeout);
        assert!(!err.is_safe_to_retry());
    }

    #[test]
    fn upstream_error_converts_to_unavailable() {
        let err: GatewayError = UpstreamError::Timeout.into();
        assert!(matches!(err, GatewayError::UpstreamUnavailable(_)));
    }
}
