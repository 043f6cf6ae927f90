use bridge_traits::BridgeError;
use core_auth::AuthError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Invalid {kind} name '{name}': {reason}")]
    InvalidName {
        kind: &'static str,
        name: String,
        reason: String,
    },

    #[error("{kind} '{name}' not found on Kitsu")]
    EntityNotFound { kind: &'static str, name: String },

    #[error("Task type '{0}' not found on Kitsu")]
    TaskTypeNotFound(String),

    #[error("Task status '{0}' not found on Kitsu")]
    TaskStatusNotFound(String),

    #[error("Cannot publish '{path}': {reason}")]
    UnsupportedMedia { path: String, reason: String },

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Config(#[from] core_runtime::Error),

    #[error("{0}")]
    Remote(#[from] BridgeError),
}

impl SyncError {
    pub(crate) fn invalid_name(kind: &'static str, name: &str, reason: impl Into<String>) -> Self {
        SyncError::InvalidName {
            kind,
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Errors that end a pass instead of failing a single entity.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Auth(_)
                | SyncError::Config(_)
                | SyncError::Remote(BridgeError::Unauthorized(_))
        )
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_errors() {
        assert!(SyncError::Auth(AuthError::SessionInvalidated).is_fatal());
        assert!(SyncError::Remote(BridgeError::Unauthorized("expired".into())).is_fatal());
        assert!(!SyncError::Remote(BridgeError::OperationFailed("500".into())).is_fatal());
        assert!(!SyncError::invalid_name("shot", "SH010", "missing sequence").is_fatal());
    }

    #[test]
    fn test_messages_name_the_entity() {
        let err = SyncError::EntityNotFound {
            kind: "sequence",
            name: "SQ01".to_string(),
        };
        assert_eq!(err.to_string(), "sequence 'SQ01' not found on Kitsu");
    }
}
