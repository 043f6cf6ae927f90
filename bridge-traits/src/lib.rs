//! # Host Bridge Traits
//!
//! Contracts between the sync engine and everything outside it: the
//! production tracker, the local pipeline project, and the host platform.
//!
//! ## Traits
//!
//! ### Production tracker
//! - [`EntityClient`](entity::EntityClient) - Lookups, creation and listing of
//!   episodes, sequences, shots, asset types, assets, tasks and previews
//! - [`HttpClient`](http::HttpClient) - Transport used by tracker clients
//!
//! ### Local project
//! - [`LocalCatalog`](catalog::LocalCatalog) - Shots and assets on disk
//! - [`MetadataStore`](storage::MetadataStore) - Per-entity pipeline fields
//!   (tracker IDs, preview IDs, frame ranges)
//! - [`FileSystemAccess`](storage::FileSystemAccess) - Thumbnail cache I/O
//! - [`ImageConverter`](image::ImageConverter) - Preview format conversion
//!
//! ### Host platform
//! - [`SecureStore`](storage::SecureStore) - Credential persistence
//! - [`SettingsStore`](storage::SettingsStore) - Key-value preferences
//! - [`LoggerSink`](console::LoggerSink) - Forward structured logs to the
//!   pipeline tool's console
//!
//! ## Fail-Fast Strategy
//!
//! Missing capabilities are reported when the core is configured, never in
//! the middle of a sync:
//!
//! ```ignore
//! let config = CoreConfig::builder()
//!     .settings_store(settings)
//!     .build()?; // Error::CapabilityMissing { capability: "SecureStore", .. }
//! ```
//!
//! ## Testing
//!
//! The `testing` feature exposes in-memory implementations of every trait
//! in [`testing`], including a stateful tracker fake with a call log.
//!
//! ## Error Handling
//!
//! Every trait returns [`BridgeError`](error::BridgeError). Implementations
//! convert their platform errors and keep file paths or entity names in the
//! message.
//!
//! ## Thread Safety
//!
//! All traits require `Send + Sync` so adapters can be shared behind `Arc`
//! across async tasks.

pub mod catalog;
pub mod console;
pub mod entity;
pub mod error;
pub mod http;
pub mod image;
pub mod metadata;
pub mod storage;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use catalog::{LocalAsset, LocalCatalog};
pub use entity::{
    Asset, AssetType, Comment, EntityClient, EntityClientFactory, EntityId, Episode, FrameRange,
    ListScope, NewAsset, Person, PreviewFile, ProductionType, Project, Sequence, Shot, Task,
    TaskStatus, TaskType,
};
pub use error::BridgeError;
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use image::ImageConverter;
pub use metadata::{EntityData, EntityMetadata, MediaHistory};
pub use storage::{FileSystemAccess, MetadataStore, SecureStore, SettingsStore};
pub use console::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
