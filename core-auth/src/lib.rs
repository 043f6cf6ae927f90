//! # Kitsu Sessions and Credentials
//!
//! Opens authenticated tracker sessions from the stored settings and the
//! password kept in the platform secure store.
//!
//! ## Overview
//!
//! - [`CredentialStore`] keeps one password per login email.
//! - [`SessionManager`] logs in, resolves the configured project and hands
//!   out [`SyncSession`] values to the sync engine.
//! - Changing credentials invalidates every session opened before the change.
//!
//! Auth state changes are published on the core event bus as
//! [`core_runtime::events::AuthEvent`].

pub mod credentials;
pub mod error;
pub mod session;

pub use credentials::CredentialStore;
pub use error::{AuthError, Result};
pub use session::{SessionManager, SyncSession};
