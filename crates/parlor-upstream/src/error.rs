//! Error types for upstream calls

/// Failure talking to the agent runtime
///
/// Variants are `Clone` so results can flow through shared caches.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamError {
    /// Connection-level failure (DNS, refused, reset)
    #[error("transport failure: {0}")]
    Transport(String),

    /// Request exceeded the configured timeout
    #[error("request timed out")]
    Timeout,

    /// Runtime reported the resource missing
    #[error("not found: {0}")]
    NotFound(String),

    /// Runtime answered with a non-success status
    #[error("upstream returned status {status}: {detail}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body excerpt
        detail: String,
    },

    /// Response body did not match the expected shape
    #[error("failed to decode upstream response: {0}")]
    Decode(String),
}

impl UpstreamError {
    /// Whether a retry could plausibly succeed
    ///
    /// Only transport-level failures qualify; a status answer means the
    /// runtime received and rejected the request.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout)
    }

    /// Whether the runtime reported the resource missing
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_and_timeout_are_retryable() {
        assert!(UpstreamError::Transport("reset".to_string()).is_retryable());
        assert!(UpstreamError::Timeout.is_retryable());
    }

    #[test]
    fn status_answers_are_not_retryable() {
        let err = UpstreamError::Status {
            status: 500,
            detail: "boom".to_string(),
        };
        assert!(!err.is_retryable());
        assert!(!UpstreamError::NotFound("agent-1".to_string()).is_retryable());
    }

    #[test]
    fn not_found_predicate() {
        assert!(UpstreamError::NotFound("block-9".to_string()).is_not_found());
        assert!(!UpstreamError::Timeout.is_not_found());
    }
}
