//! Error taxonomy shared by every component.
//!
//! One enum covers the whole crate; what matters operationally is not the
//! variant but its retry class, which [`SqlForgeError::is_transient`]
//! derives from the variant or, for bare provider text, from a substring
//! classifier.

/// All the ways a sqlforge operation can fail.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum SqlForgeError {
    // Transport and provider failures
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited by provider")]
    RateLimited,

    /// A single provider call exceeded its per-request timeout.
    ///
    /// Distinct from [`Cancelled`](Self::Cancelled): a per-attempt network
    /// timeout is transient and retried, a caller-side cancellation is not.
    #[error("request timed out")]
    Timeout,

    #[error("operation cancelled")]
    Cancelled,

    #[error("authentication failed")]
    AuthenticationFailed,

    // Configuration errors
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("provider not supported: {0}")]
    ProviderNotSupported(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Dispatch errors
    #[error("client not found: {0}")]
    ClientNotFound(String),

    #[error("no healthy clients available")]
    NoHealthyClients,

    #[error("circuit breaker is open")]
    CircuitOpen,

    /// Terminal retry-engine error after the attempt budget is spent.
    #[error("all retry attempts failed: {message}")]
    RetriesExhausted { attempts: u32, message: String },

    // Data errors
    #[error("JSON error: {0}")]
    Json(String),

    #[error("failed to parse model response: {0}")]
    Parse(String),

    #[error("unknown target dialect: {0}")]
    UnknownDialect(String),

    /// Provider error carrying only its textual form. Retryability is
    /// decided by the substring classifier in [`is_transient`](Self::is_transient).
    #[error("provider error: {0}")]
    Provider(String),

    /// Explicitly tagged as retryable; the tag wins over any classification.
    #[error("{0}")]
    Transient(String),

    /// Explicitly tagged as non-retryable; the tag wins over any classification.
    #[error("{0}")]
    Permanent(String),

    /// Aggregate of client close failures during shutdown.
    #[error("shutdown completed with errors: {0}")]
    Shutdown(String),
}

/// Substrings that mark an error message as permanent. Checked before the
/// transient patterns; an unknown message is treated as permanent.
const PERMANENT_PATTERNS: &[&str] = &[
    "unauthorized",
    "forbidden",
    "invalid api key",
    "authentication failed",
    "bad request",
    "malformed",
    "400",
    "401",
    "403",
    "404",
];

/// Substrings that mark an error message as transient.
const TRANSIENT_PATTERNS: &[&str] = &[
    "rate limit",
    "too many requests",
    "quota exceeded",
    "service unavailable",
    "bad gateway",
    "gateway timeout",
    "500",
    "502",
    "503",
    "504",
    "429",
    "timeout",
    "timed out",
    "dns",
    "dial",
    "connection refused",
    "connection reset",
    "econnrefused",
    "econnreset",
    "etimedout",
];

/// Classify an error message by substring.
///
/// Permanent patterns win over transient ones, and an unrecognized message
/// is permanent. The pattern lists are load-bearing for retry behaviour;
/// extend them rather than replacing the substring match.
pub(crate) fn message_is_transient(message: &str) -> bool {
    let lower = message.to_lowercase();
    if PERMANENT_PATTERNS.iter().any(|p| lower.contains(p)) {
        return false;
    }
    TRANSIENT_PATTERNS.iter().any(|p| lower.contains(p))
}

impl SqlForgeError {
    /// True when re-dispatching the same request has a realistic chance
    /// of a different outcome — the retry engine's admission test.
    /// Auth, validation, cancellation, and an open circuit are final.
    pub fn is_transient(&self) -> bool {
        match self {
            // Explicit tags win
            Self::Transient(_) => true,
            Self::Permanent(_) => false,

            // Network-shaped failures heal on their own
            Self::RateLimited => true,
            Self::Http(_) => true,
            Self::Timeout => true,

            // 5xx (plus 408/429) may recover; other statuses blame us
            Self::Api { status, .. } => *status >= 500 || *status == 429 || *status == 408,

            // Only the textual form is known; classify by substring
            Self::Provider(message) => message_is_transient(message),

            // The remainder is final
            Self::Cancelled
            | Self::AuthenticationFailed
            | Self::InvalidConfig(_)
            | Self::ProviderNotSupported(_)
            | Self::InvalidInput(_)
            | Self::ClientNotFound(_)
            | Self::NoHealthyClients
            | Self::CircuitOpen
            | Self::RetriesExhausted { .. }
            | Self::Json(_)
            | Self::Parse(_)
            | Self::UnknownDialect(_)
            | Self::Shutdown(_) => false,
        }
    }

    /// Tag an arbitrary message as retryable regardless of its content.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    /// Tag an arbitrary message as non-retryable regardless of its content.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent(message.into())
    }
}

impl From<serde_json::Error> for SqlForgeError {
    fn from(err: serde_json::Error) -> Self {
        SqlForgeError::Json(err.to_string())
    }
}

impl From<reqwest::Error> for SqlForgeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return SqlForgeError::Timeout;
        }
        if let Some(status) = err.status() {
            return SqlForgeError::Api {
                status: status.as_u16(),
                message: err.to_string(),
            };
        }
        SqlForgeError::Http(err.to_string())
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, SqlForgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_patterns_are_permanent() {
        for msg in [
            "401 unauthorized",
            "request forbidden",
            "invalid api key supplied",
            "authentication failed for tenant",
            "bad request: missing model",
            "malformed payload",
        ] {
            assert!(
                !message_is_transient(msg),
                "expected permanent classification for {msg:?}"
            );
        }
    }

    #[test]
    fn network_patterns_are_transient() {
        for msg in [
            "rate limit exceeded",
            "too many requests",
            "quota exceeded for project",
            "503 service unavailable",
            "upstream returned 502 bad gateway",
            "gateway timeout while proxying",
            "dial tcp 127.0.0.1:11434: ECONNREFUSED",
            "read: connection reset by peer",
            "dns lookup failure",
        ] {
            assert!(
                message_is_transient(msg),
                "expected transient classification for {msg:?}"
            );
        }
    }

    #[test]
    fn permanent_patterns_win_over_transient() {
        // "400" is checked before any transient marker.
        assert!(!message_is_transient("400 bad request after rate limit"));
    }

    #[test]
    fn unknown_messages_are_permanent() {
        assert!(!message_is_transient("something inexplicable happened"));
    }

    #[test]
    fn explicit_tags_win() {
        assert!(SqlForgeError::transient("401 unauthorized").is_transient());
        assert!(!SqlForgeError::permanent("rate limit").is_transient());
    }

    #[test]
    fn circuit_open_is_not_retryable() {
        assert!(!SqlForgeError::CircuitOpen.is_transient());
    }

    #[test]
    fn cancellation_is_not_retryable() {
        assert!(!SqlForgeError::Cancelled.is_transient());
    }

    #[test]
    fn server_status_is_transient_client_status_is_not() {
        let server = SqlForgeError::Api {
            status: 503,
            message: "unavailable".into(),
        };
        let client = SqlForgeError::Api {
            status: 404,
            message: "no such model".into(),
        };
        assert!(server.is_transient());
        assert!(!client.is_transient());
    }
}
