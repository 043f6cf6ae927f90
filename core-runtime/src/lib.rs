//! # Core Runtime Module
//!
//! Runtime infrastructure shared by the session and sync crates:
//! - Tracker settings and the bridge configuration builder
//! - Logging and tracing setup
//! - Event bus for session and sync notifications
//!
//! Nothing here talks to the tracker. Other crates take a
//! [`CoreConfig`](config::CoreConfig) and an [`EventBus`](events::EventBus)
//! and do the work.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{CoreConfig, KitsuSettings, ShotUpdatePolicy, SyncOptions};
pub use error::{Error, Result};
pub use events::{AuthEvent, CoreEvent, EventBus, SyncEvent};
