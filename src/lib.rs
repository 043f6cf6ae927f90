//! Workspace facade crate.
//!
//! Re-exports the member crates so a host plugin can depend on `prism-kitsu`
//! alone. The `desktop-shims` feature (on by default) adds the desktop
//! bridge implementations and lets `CoreConfig::builder()` fall back to them.

pub use bridge_traits;
pub use core_auth;
pub use core_runtime;
pub use core_sync;
pub use provider_kitsu;

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop;

pub use core_auth::{SessionManager, SyncSession};
pub use core_runtime::{CoreConfig, EventBus, KitsuSettings};
pub use core_sync::{PreviewPublisher, SyncCoordinator, SyncReport};
pub use provider_kitsu::KitsuClientFactory;
