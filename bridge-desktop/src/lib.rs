//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop hosts
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest`
//! - `FileSystemAccess` using `tokio::fs` and platform directories
//! - `SecureStore` using the `keyring` crate
//! - `SettingsStore` and `MetadataStore` using SQLite via `sqlx`
//! - `ImageConverter` using the `image` crate
//! - `LocalCatalog` over a `Shots/` + `Assets/` project folder
//!
//! ## Feature Flags
//!
//! - `secure-store`: Enable OS keychain integration (default)
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{FolderCatalog, SqliteMetadataStore, TokioFileSystem};
//!
//! let fs = Arc::new(TokioFileSystem::new());
//! let metadata = Arc::new(SqliteMetadataStore::new(&project.join("pipeline.db")).await?);
//! let catalog = FolderCatalog::new(&project, fs.clone(), metadata.clone());
//! ```

mod catalog;
mod converter;
mod db;
mod filesystem;
mod http;
mod metadata_store;
mod settings;

#[cfg(feature = "secure-store")]
mod secure_store;

pub use catalog::FolderCatalog;
pub use converter::ImageCrateConverter;
pub use filesystem::TokioFileSystem;
pub use http::ReqwestHttpClient;
pub use metadata_store::SqliteMetadataStore;
pub use settings::SqliteSettingsStore;

#[cfg(feature = "secure-store")]
pub use secure_store::KeyringSecureStore;
