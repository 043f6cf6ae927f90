use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Kitsu rejected the credentials for {username}: {reason}")]
    AuthenticationFailed { username: String, reason: String },

    #[error("No password stored for {0}")]
    MissingPassword(String),

    #[error("Stored password for {username} is unreadable: {reason}")]
    CredentialCorrupted { username: String, reason: String },

    #[error("Project '{0}' does not exist on the Kitsu site")]
    ProjectNotFound(String),

    #[error("Session was invalidated, open a new one")]
    SessionInvalidated,

    #[error("Secure storage unavailable: {0}")]
    SecureStorageUnavailable(String),

    #[error(transparent)]
    Config(#[from] core_runtime::Error),

    #[error("Kitsu request failed: {0}")]
    Remote(#[from] BridgeError),
}

pub type Result<T> = std::result::Result<T, AuthError>;
