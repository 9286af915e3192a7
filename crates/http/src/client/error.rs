//! Client error types

use portal_core::IdentityError;
use thiserror::Error;

/// Client error types
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or request error, including timeouts
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The identity provider could not supply a token
    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    /// A header value could not be constructed
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Server returned an error status
    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },

    /// Authentication failed even after a silent sign-in
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Bad request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl ClientError {
    /// Create error from HTTP status code
    pub fn from_status(status: reqwest::StatusCode, message: String) -> Self {
        match status.as_u16() {
            400 => Self::BadRequest(message),
            401 => Self::AuthenticationFailed(message),
            403 => Self::Forbidden(message),
            404 => Self::NotFound(message),
            _ => Self::ServerError {
                status: status.as_u16(),
                message,
            },
        }
    }

    /// Whether the session could not be recovered
    pub const fn is_auth_failure(&self) -> bool {
        matches!(self, Self::AuthenticationFailed(_) | Self::Identity(_))
    }

    /// Whether this is a transport level failure (no HTTP status)
    pub fn is_network_failure(&self) -> bool {
        matches!(self, Self::Request(e) if e.status().is_none() && !e.is_decode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_mapping() {
        assert!(matches!(
            ClientError::from_status(StatusCode::UNAUTHORIZED, "x".into()),
            ClientError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            ClientError::from_status(StatusCode::NOT_FOUND, "x".into()),
            ClientError::NotFound(_)
        ));
        assert!(matches!(
            ClientError::from_status(StatusCode::BAD_GATEWAY, "x".into()),
            ClientError::ServerError { status: 502, .. }
        ));
    }

    #[test]
    fn test_auth_failure_classification() {
        assert!(ClientError::AuthenticationFailed("expired".into()).is_auth_failure());
        assert!(ClientError::Identity(IdentityError::TokenUnavailable).is_auth_failure());
        assert!(!ClientError::Forbidden("nope".into()).is_auth_failure());
    }

    #[test]
    fn test_serialization_is_not_a_network_failure() {
        let err: ClientError = serde_json::from_str::<serde_json::Value>("not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, ClientError::Serialization(_)));
        assert!(!err.is_network_failure());
        assert!(!err.is_auth_failure());
    }
}
