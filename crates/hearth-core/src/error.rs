//! Error types for hearth.

use serde::Serialize;
use thiserror::Error;

/// Result type alias using hearth's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a live connection handshake was refused.
///
/// Each reason is distinct so clients and operators can tell a missing
/// credential apart from a revoked one. The wire code is stable.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthRejection {
    /// No bearer credential was presented.
    #[error("bearer token missing")]
    TokenMissing,

    /// The credential is on the revocation list.
    #[error("bearer token has been revoked")]
    TokenBlacklisted,

    /// The credential is malformed, badly signed, or expired.
    #[error("bearer token is invalid or expired")]
    TokenInvalid,

    /// The credential's subject is not a user id.
    #[error("token subject is not a valid user id")]
    InvalidSubjectFormat,
}

impl AuthRejection {
    /// Stable machine-readable code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            AuthRejection::TokenMissing => "TOKEN_MISSING",
            AuthRejection::TokenBlacklisted => "TOKEN_BLACKLISTED",
            AuthRejection::TokenInvalid => "TOKEN_INVALID",
            AuthRejection::InvalidSubjectFormat => "INVALID_SUBJECT_FORMAT",
        }
    }
}

/// Core error type for hearth operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found (or not owned by the caller)
    #[error("Not found: {0}")]
    NotFound(String),

    /// A domain event is missing required fields or violates an invariant
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unexpected failure while handling an event
    #[error("Processing failure: {0}")]
    Processing(String),

    /// Live connection or API authentication was refused
    #[error("Authentication rejected: {0}")]
    Auth(#[from] AuthRejection),

    /// Cross-instance fan-out channel failure
    #[error("Fan-out error: {0}")]
    Fanout(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for failures in the validation class (never retried, logged at warn).
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("notification 42".to_string());
        assert_eq!(err.to_string(), "Not found: notification 42");
    }

    #[test]
    fn test_error_display_validation() {
        let err = Error::Validation("receiver_id is required".to_string());
        assert_eq!(err.to_string(), "Validation error: receiver_id is required");
        assert!(err.is_validation());
    }

    #[test]
    fn test_error_display_processing() {
        let err = Error::Processing("relation lookup failed".to_string());
        assert_eq!(err.to_string(), "Processing failure: relation lookup failed");
        assert!(!err.is_validation());
    }

    #[test]
    fn test_auth_rejection_converts() {
        let err: Error = AuthRejection::TokenBlacklisted.into();
        assert!(matches!(err, Error::Auth(AuthRejection::TokenBlacklisted)));
        assert_eq!(
            err.to_string(),
            "Authentication rejected: bearer token has been revoked"
        );
    }

    #[test]
    fn test_auth_rejection_codes_match_serde() {
        for reason in [
            AuthRejection::TokenMissing,
            AuthRejection::TokenBlacklisted,
            AuthRejection::TokenInvalid,
            AuthRejection::InvalidSubjectFormat,
        ] {
            let json = serde_json::to_value(reason).unwrap();
            assert_eq!(json, reason.code());
        }
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
