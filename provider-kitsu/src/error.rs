//! Error types for the Kitsu provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KitsuError {
    /// Login refused or the access token expired.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// No access token yet; `log_in` was never called or failed.
    #[error("Not logged in to Kitsu")]
    NotLoggedIn,

    #[error("Kitsu API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    #[error("Kitsu resource not found: {path}")]
    NotFound { path: String },

    #[error("Failed to parse Kitsu response: {0}")]
    ParseError(String),

    #[error("Invalid Kitsu host: {0}")]
    InvalidHost(String),

    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

pub type Result<T> = std::result::Result<T, KitsuError>;

impl From<KitsuError> for BridgeError {
    fn from(error: KitsuError) -> Self {
        match error {
            KitsuError::AuthenticationFailed(msg) => BridgeError::Unauthorized(msg),
            KitsuError::NotLoggedIn => {
                BridgeError::Unauthorized("not logged in to Kitsu".to_string())
            }
            KitsuError::InvalidHost(msg) => BridgeError::InvalidInput(msg),
            KitsuError::BridgeError(e) => e,
            other => BridgeError::OperationFailed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = KitsuError::ApiError {
            status_code: 400,
            message: "Wrong parameters".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "Kitsu API error (status 400): Wrong parameters"
        );
    }

    #[test]
    fn test_auth_errors_become_unauthorized() {
        let bridge_error: BridgeError =
            KitsuError::AuthenticationFailed("bad password".to_string()).into();
        assert!(matches!(bridge_error, BridgeError::Unauthorized(_)));

        let bridge_error: BridgeError = KitsuError::NotFound {
            path: "data/shots/x".to_string(),
        }
        .into();
        assert!(matches!(bridge_error, BridgeError::OperationFailed(_)));
    }
}
