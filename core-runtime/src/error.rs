//! Errors raised while loading settings or assembling the runtime.

use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A required Kitsu setting is absent or blank.
    #[error("Setting '{key}' is not set")]
    MissingSetting { key: String },

    #[error("Configuration error: {0}")]
    Config(String),

    /// No implementation was injected and no default exists for this build.
    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// A default bridge could not be created.
    #[error("Failed to initialize {component}: {reason}")]
    Initialization { component: String, reason: String },
}

impl Error {
    #[cfg_attr(not(feature = "desktop-shims"), allow(dead_code))]
    pub(crate) fn init(component: &str, reason: impl std::fmt::Display) -> Self {
        Error::Initialization {
            component: component.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
