use std::time::Duration;

use crate::ids::ConnectionId;

/// Errors from a Prompt-to-URL adapter call.
///
/// None of these are surfaced to clients beyond a null `generatedURL`.
#[derive(Clone, Debug, thiserror::Error)]
pub enum SuggestError {
    #[error("suggester not configured: {0}")]
    NotConfigured(String),
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("rate limited")]
    RateLimited,
    #[error("upstream error {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("timeout after {0:?}")]
    Timeout(Duration),
}

impl SuggestError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::NotConfigured(_) => "not_configured",
            Self::AuthenticationFailed(_) => "authentication_failed",
            Self::RateLimited => "rate_limited",
            Self::Upstream { .. } => "upstream_error",
            Self::Network(_) => "network_error",
            Self::InvalidResponse(_) => "invalid_response",
            Self::Timeout(_) => "timeout",
        }
    }

    /// Classify an HTTP status code into the appropriate error variant.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::AuthenticationFailed(body),
            429 => Self::RateLimited,
            _ => Self::Upstream { status, body },
        }
    }
}

/// Errors from the signaling relay.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("peer not found: {0}")]
    PeerNotFound(ConnectionId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(matches!(
            SuggestError::from_status(401, "no".into()),
            SuggestError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            SuggestError::from_status(403, "no".into()),
            SuggestError::AuthenticationFailed(_)
        ));
        assert!(matches!(SuggestError::from_status(429, String::new()), SuggestError::RateLimited));
        assert!(matches!(
            SuggestError::from_status(503, "down".into()),
            SuggestError::Upstream { status: 503, .. }
        ));
    }

    #[test]
    fn error_kinds() {
        assert_eq!(SuggestError::RateLimited.error_kind(), "rate_limited");
        assert_eq!(
            SuggestError::Timeout(Duration::from_secs(1)).error_kind(),
            "timeout"
        );
        assert_eq!(
            SuggestError::NotConfigured("x".into()).error_kind(),
            "not_configured"
        );
    }

    #[test]
    fn display_messages() {
        let err = SuggestError::Upstream {
            status: 500,
            body: "boom".into(),
        };
        assert_eq!(err.to_string(), "upstream error 500: boom");

        let err = RelayError::PeerNotFound(ConnectionId::from_raw("peer_x"));
        assert_eq!(err.to_string(), "peer not found: peer_x");
    }
}
