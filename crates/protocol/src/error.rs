//! Error types for the protocol crate.

use thiserror::Error;

/// Protocol error type covering all possible failure modes.
#[derive(Debug, Error)]
pub enum ProtocolError {
    // Serialization errors
    /// Failed to serialize data.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Failed to deserialize data.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    // Bot API errors
    /// The Bot API answered with `ok: false`.
    #[error("api error {code}: {description}")]
    Api {
        /// Error code reported by the API (usually mirrors the HTTP status).
        code: i32,
        /// Human-readable description from the API.
        description: String,
    },

    /// The Bot API asked us to slow down.
    #[error("rate limited: retry after {retry_after} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after: u64,
    },

    /// The API answered `ok: true` without a result payload.
    #[error("api response is missing its result")]
    MissingResult,

    // Message errors
    /// Outbound text exceeds the transport limit.
    #[error("message too large: {size} bytes exceeds maximum of {max} bytes")]
    MessageTooLarge {
        /// Actual message size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

impl ProtocolError {
    /// Returns true if retrying the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProtocolError::RateLimited { .. } => true,
            ProtocolError::Api { code, .. } => *code >= 500,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_eof() || err.is_syntax() {
            ProtocolError::Deserialization(err.to_string())
        } else {
            ProtocolError::Serialization(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialization_error_display() {
        let err = ProtocolError::Deserialization("unexpected end of input".to_string());
        assert_eq!(
            err.to_string(),
            "deserialization failed: unexpected end of input"
        );
    }

    #[test]
    fn test_api_error_display() {
        let err = ProtocolError::Api {
            code: 401,
            description: "Unauthorized".to_string(),
        };
        assert_eq!(err.to_string(), "api error 401: Unauthorized");
    }

    #[test]
    fn test_message_too_large_display() {
        let err = ProtocolError::MessageTooLarge {
            size: 5000,
            max: 4096,
        };
        assert_eq!(
            err.to_string(),
            "message too large: 5000 bytes exceeds maximum of 4096 bytes"
        );
    }

    #[test]
    fn test_retryable() {
        assert!(ProtocolError::RateLimited { retry_after: 3 }.is_retryable());
        assert!(ProtocolError::Api {
            code: 502,
            description: "Bad Gateway".to_string()
        }
        .is_retryable());
        assert!(!ProtocolError::Api {
            code: 400,
            description: "Bad Request: message text is empty".to_string()
        }
        .is_retryable());
        assert!(!ProtocolError::MissingResult.is_retryable());
    }

    #[test]
    fn test_from_json_syntax_error() {
        let err: ProtocolError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, ProtocolError::Deserialization(_)));
    }
}
