//! # Sync Module
//!
//! Keeps a local Prism project and a Kitsu production in step.
//!
//! ## Components
//!
//! - **Reconciliation** (`reconcile`): get-or-create for episodes, sequences,
//!   shots, asset types and assets
//! - **Local Records** (`records`): remembered `objID`/`thumbnailID` per entity
//! - **Thumbnail Cache** (`thumbnail`): mirrors the tracker's main previews
//! - **Remote Listing** (`listing`): walks the tracker hierarchy of a project
//! - **Sync Coordinator** (`coordinator`): push and pull passes with events
//! - **Post-Sync Checks** (`conflict_resolver`): one-sided entities and what
//!   to do about them
//! - **Preview Publishing** (`publish`): movie uploads as task reviews

pub mod conflict_resolver;
pub mod coordinator;
pub mod error;
pub mod listing;
pub mod naming;
pub mod publish;
pub mod reconcile;
pub mod records;
pub mod report;
pub mod thumbnail;

pub use conflict_resolver::{
    ConflictDecision, ConflictPrompt, ConflictResolver, Discrepancy, IgnoreConflicts,
};
pub use coordinator::SyncCoordinator;
pub use error::{Result, SyncError};
pub use listing::{RemoteAsset, RemoteListing, RemoteShot};
pub use naming::{ShotPath, DEFAULT_EPISODE};
pub use publish::{PreviewPublisher, PublishOutcome, PublishRequest, PublishTarget};
pub use reconcile::{Outcome, Reconciled, Reconciler, RemoteWrite};
pub use records::{LocalRecords, RecordScope};
pub use report::{Direction, PostCheck, SyncFailure, SyncReport};
pub use thumbnail::{ThumbnailCache, ThumbnailChange};
