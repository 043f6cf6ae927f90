//! # Sync Coordinator
//!
//! Runs synchronization passes between the local project and Kitsu.
//!
//! ## Passes
//!
//! | Pass          | Walks              | Does                                              |
//! |---------------|--------------------|---------------------------------------------------|
//! | `push_shots`  | local shot names   | get-or-create episode, sequence and shot, push range |
//! | `push_assets` | local asset folders | get-or-create asset type and asset                |
//! | `pull_shots`  | Kitsu shots        | create local shots, pull ranges and thumbnails    |
//! | `pull_assets` | Kitsu assets       | create local assets, pull descriptions and thumbnails |
//!
//! Entities are visited one at a time in enumeration order. A failing entity
//! is listed under `failed` and the pass moves on; only errors that make the
//! session unusable (see [`SyncError::is_fatal`]) stop it.
//!
//! Every pass emits `Started`, one `Progress` per entity, then `Completed`
//! or `Failed` on the event bus.
//!
//! ## Post-sync checks
//!
//! Unless `kitsu.ignorepostchecks` is set, a pass ends by comparing both
//! sides (see [`crate::conflict_resolver`]) and applying the decision of the
//! configured [`ConflictPrompt`]. A follow-up pass started by a decision is
//! not checked again.
//!
//! ```ignore
//! let coordinator = SyncCoordinator::new(&config, catalog, event_bus)
//!     .with_prompt(Arc::new(dialog));
//! let session = sessions.session().await?;
//! let report = coordinator.push_all_shots(&session).await?;
//! println!("{}", report.summary());
//! ```

use crate::conflict_resolver::{
    ConflictDecision, ConflictPrompt, ConflictResolver, Discrepancy, IgnoreConflicts,
};
use crate::error::{Result, SyncError};
use crate::listing::{RemoteAsset, RemoteListing, RemoteShot};
use crate::naming::ShotPath;
use crate::reconcile::{Outcome, Reconciler, RemoteWrite};
use crate::records::{LocalRecords, RecordScope};
use crate::report::{Direction, PostCheck, SyncReport};
use crate::thumbnail::{ThumbnailCache, ThumbnailChange};
use bridge_traits::catalog::{LocalAsset, LocalCatalog};
use bridge_traits::metadata::EntityData;
use bridge_traits::storage::SettingsStore;
use core_auth::SyncSession;
use core_runtime::config::{keys, CoreConfig, SyncOptions};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use serde_json::{json, Map};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Key under the asset's extra data holding pipeline information.
pub const PIPELINE_DATA_KEY: &str = "prism";

pub struct SyncCoordinator {
    catalog: Arc<dyn LocalCatalog>,
    records: LocalRecords,
    thumbnails: ThumbnailCache,
    settings_store: Arc<dyn SettingsStore>,
    event_bus: EventBus,
    options: SyncOptions,
    prompt: Arc<dyn ConflictPrompt>,
}

/// What happened to one entity during a pass.
enum EntityResult {
    Created,
    Updated,
    Unchanged,
    Failed(String),
}

/// Event bookkeeping for one pass.
struct PassTracker<'a> {
    bus: &'a EventBus,
    report: SyncReport,
    total: u64,
    processed: u64,
}

impl<'a> PassTracker<'a> {
    fn start(bus: &'a EventBus, kind: RecordScope, direction: Direction, total: usize) -> Self {
        let report = SyncReport::new(Uuid::new_v4().to_string(), kind, direction);
        info!(
            job_id = %report.job_id,
            %kind,
            direction = direction.as_str(),
            total,
            "Sync pass started"
        );
        bus.emit(CoreEvent::Sync(SyncEvent::Started {
            job_id: report.job_id.clone(),
            kind: kind.as_str().to_string(),
            direction: direction.as_str().to_string(),
        }))
        .ok();
        Self {
            bus,
            report,
            total: total as u64,
            processed: 0,
        }
    }

    fn record(&mut self, name: &str, result: EntityResult) {
        match result {
            EntityResult::Created => self.report.record_created(name),
            EntityResult::Updated => self.report.record_updated(name),
            EntityResult::Unchanged => {}
            EntityResult::Failed(reason) => {
                warn!(entity = name, %reason, "Entity failed to sync");
                self.report.record_failed(name, reason);
            }
        }

        self.processed += 1;
        let phase = match self.report.direction {
            Direction::Push => "reconciling",
            Direction::Pull => "pulling",
        };
        self.bus
            .emit(CoreEvent::Sync(SyncEvent::Progress {
                job_id: self.report.job_id.clone(),
                items_processed: self.processed,
                total_items: Some(self.total),
                percent: SyncEvent::percent_of(self.processed, self.total),
                phase: phase.to_string(),
            }))
            .ok();
    }

    /// Abort the pass. The error is handed back for propagation.
    fn abort(self, e: SyncError) -> SyncError {
        error!(job_id = %self.report.job_id, error = %e, "Sync pass aborted");
        self.bus
            .emit(CoreEvent::Sync(SyncEvent::Failed {
                job_id: self.report.job_id.clone(),
                message: e.to_string(),
            }))
            .ok();
        e
    }

    fn complete(mut self) -> SyncReport {
        self.report.finish();
        let report = self.report;
        info!(
            job_id = %report.job_id,
            created = report.created().len(),
            updated = report.updated().len(),
            failed = report.failed().len(),
            "Sync pass completed"
        );
        self.bus
            .emit(CoreEvent::Sync(SyncEvent::Completed {
                job_id: report.job_id.clone(),
                created: report.created().len() as u64,
                updated: report.updated().len() as u64,
                failed: report.failed().len() as u64,
                duration_secs: report.duration_secs(),
            }))
            .ok();
        report
    }
}

/// Sort a per-entity result into the report, or stop the pass on a fatal
/// error.
macro_rules! settle {
    ($tracker:expr, $name:expr, $result:expr) => {
        match $result {
            Ok(result) => $tracker.record($name, result),
            Err(e) if e.is_fatal() => return Err($tracker.abort(e)),
            Err(e) => $tracker.record($name, EntityResult::Failed(e.to_string())),
        }
    };
}

impl SyncCoordinator {
    pub fn new(config: &CoreConfig, catalog: Arc<dyn LocalCatalog>, event_bus: EventBus) -> Self {
        let records = LocalRecords::new(config.metadata_store.clone());
        let thumbnails = ThumbnailCache::new(
            config.file_system.clone(),
            config.image_converter.clone(),
            records.clone(),
            config.sync.thumbnail_cache_root.clone(),
        );
        Self {
            catalog,
            records,
            thumbnails,
            settings_store: config.settings_store.clone(),
            event_bus,
            options: config.sync.clone(),
            prompt: Arc::new(IgnoreConflicts),
        }
    }

    /// Prompt asked about post-sync discrepancies. Defaults to
    /// [`IgnoreConflicts`].
    pub fn with_prompt(mut self, prompt: Arc<dyn ConflictPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn records(&self) -> &LocalRecords {
        &self.records
    }

    pub fn thumbnails(&self) -> &ThumbnailCache {
        &self.thumbnails
    }

    // ------------------------------------------------------------------------
    // Public passes
    // ------------------------------------------------------------------------

    /// Push the named local shots.
    pub async fn push_shots(&self, session: &SyncSession, names: &[String]) -> Result<SyncReport> {
        let mut report = self.push_shots_pass(session, names).await?;
        self.finish_with_check(session, &mut report).await?;
        Ok(report)
    }

    /// Push every visible local shot.
    pub async fn push_all_shots(&self, session: &SyncSession) -> Result<SyncReport> {
        let names = self.catalog.list_shots().await?;
        self.push_shots(session, &names).await
    }

    pub async fn push_assets(
        &self,
        session: &SyncSession,
        assets: &[LocalAsset],
    ) -> Result<SyncReport> {
        let mut report = self.push_assets_pass(session, assets).await?;
        self.finish_with_check(session, &mut report).await?;
        Ok(report)
    }

    pub async fn push_all_assets(&self, session: &SyncSession) -> Result<SyncReport> {
        let assets = self.catalog.list_assets().await?;
        self.push_assets(session, &assets).await
    }

    pub async fn pull_shots(&self, session: &SyncSession) -> Result<SyncReport> {
        let mut report = self.pull_shots_pass(session).await?;
        self.finish_with_check(session, &mut report).await?;
        Ok(report)
    }

    pub async fn pull_assets(&self, session: &SyncSession) -> Result<SyncReport> {
        let mut report = self.pull_assets_pass(session).await?;
        self.finish_with_check(session, &mut report).await?;
        Ok(report)
    }

    /// Drop the local record and cached thumbnail of an entity that no
    /// longer exists locally.
    pub async fn remove_record(&self, scope: RecordScope, name: &str) -> Result<()> {
        self.thumbnails.remove_cached(scope, name).await?;
        self.records.forget(scope, name).await
    }

    // ------------------------------------------------------------------------
    // Push
    // ------------------------------------------------------------------------

    #[instrument(skip(self, session, names), fields(count = names.len()))]
    async fn push_shots_pass(&self, session: &SyncSession, names: &[String]) -> Result<SyncReport> {
        session.ensure_valid()?;
        let reconciler = Reconciler::new(
            session.client(),
            session.project(),
            self.options.shot_update_policy,
        );
        let mut tracker =
            PassTracker::start(&self.event_bus, RecordScope::Shots, Direction::Push, names.len());

        for name in names {
            let result = match session.ensure_valid() {
                Ok(()) => self.push_shot(&reconciler, name).await,
                Err(e) => Err(e.into()),
            };
            settle!(tracker, name, result);
        }

        Ok(tracker.complete())
    }

    async fn push_shot(&self, reconciler: &Reconciler<'_>, name: &str) -> Result<EntityResult> {
        let path = ShotPath::parse(name, reconciler.project().production_type)?;
        let episode = reconciler.episode(path.episode.as_deref()).await?;
        let sequence = reconciler
            .sequence(&path.sequence, episode.as_ref().map(|e| &e.entity))
            .await?;
        let range = self.catalog.shot_range(name).await?;

        let shot = reconciler
            .shot(&sequence.entity, &path.shot, range, &EntityData::default())
            .await?;
        self.records
            .remember_object(RecordScope::Shots, name, &shot.entity.id)
            .await?;

        Ok(match shot.outcome {
            Outcome::Created => EntityResult::Created,
            Outcome::Updated(RemoteWrite::Applied) => EntityResult::Updated,
            Outcome::Updated(RemoteWrite::Failed(reason)) => EntityResult::Failed(reason),
            Outcome::Unchanged => EntityResult::Unchanged,
        })
    }

    #[instrument(skip(self, session, assets), fields(count = assets.len()))]
    async fn push_assets_pass(
        &self,
        session: &SyncSession,
        assets: &[LocalAsset],
    ) -> Result<SyncReport> {
        session.ensure_valid()?;
        let reconciler = Reconciler::new(
            session.client(),
            session.project(),
            self.options.shot_update_policy,
        );
        let mut tracker = PassTracker::start(
            &self.event_bus,
            RecordScope::Assets,
            Direction::Push,
            assets.len(),
        );

        for asset in assets {
            let result = match session.ensure_valid() {
                Ok(()) => self.push_asset(&reconciler, asset).await,
                Err(e) => Err(e.into()),
            };
            settle!(tracker, &asset.name, result);
        }

        Ok(tracker.complete())
    }

    async fn push_asset(
        &self,
        reconciler: &Reconciler<'_>,
        asset: &LocalAsset,
    ) -> Result<EntityResult> {
        let asset_type = reconciler.asset_type(&asset.asset_type).await?;
        let description = asset.remote_description();
        let reconciled = reconciler
            .asset(
                &asset_type.entity,
                &asset.name,
                description.as_deref(),
                asset_extra_data(asset),
                None,
            )
            .await?;
        self.records
            .remember_object(RecordScope::Assets, &asset.name, &reconciled.entity.id)
            .await?;

        Ok(if reconciled.outcome.is_created() {
            EntityResult::Created
        } else {
            EntityResult::Unchanged
        })
    }

    // ------------------------------------------------------------------------
    // Pull
    // ------------------------------------------------------------------------

    #[instrument(skip(self, session))]
    async fn pull_shots_pass(&self, session: &SyncSession) -> Result<SyncReport> {
        session.ensure_valid()?;
        let shots = RemoteListing::for_session(session).shots().await?;
        let first_frame = session.settings().first_frame();
        let mut tracker =
            PassTracker::start(&self.event_bus, RecordScope::Shots, Direction::Pull, shots.len());

        for remote in &shots {
            let name = remote.local_name();
            let result = match session.ensure_valid() {
                Ok(()) => self.pull_shot(session, remote, &name, first_frame).await,
                Err(e) => Err(e.into()),
            };
            settle!(tracker, &name, result);
        }

        Ok(tracker.complete())
    }

    async fn pull_shot(
        &self,
        session: &SyncSession,
        remote: &RemoteShot,
        name: &str,
        first_frame: i64,
    ) -> Result<EntityResult> {
        let created = if self.catalog.shot_exists(name).await? {
            false
        } else {
            self.catalog.create_shot(name).await?;
            debug!(shot = name, "Created local shot");
            true
        };
        self.records
            .remember_object(RecordScope::Shots, name, &remote.shot.id)
            .await?;

        let mut changed = false;
        if let Some(range) = remote.frame_range(first_frame) {
            if self.catalog.shot_range(name).await? != Some(range) {
                self.catalog.set_shot_range(name, range).await?;
                debug!(shot = name, %range, "Pulled frame range");
                changed = true;
            }
        }

        let thumbnail = self
            .thumbnails
            .diff(
                session.client(),
                RecordScope::Shots,
                name,
                remote.shot.preview_file_id.as_deref(),
            )
            .await?;

        Ok(classify_pull(created, changed, &thumbnail))
    }

    #[instrument(skip(self, session))]
    async fn pull_assets_pass(&self, session: &SyncSession) -> Result<SyncReport> {
        session.ensure_valid()?;
        let assets = RemoteListing::for_session(session).assets().await?;
        let mut tracker = PassTracker::start(
            &self.event_bus,
            RecordScope::Assets,
            Direction::Pull,
            assets.len(),
        );

        for remote in &assets {
            let name = remote.asset.name.clone();
            let result = match session.ensure_valid() {
                Ok(()) => self.pull_asset(session, remote).await,
                Err(e) => Err(e.into()),
            };
            settle!(tracker, &name, result);
        }

        Ok(tracker.complete())
    }

    async fn pull_asset(
        &self,
        session: &SyncSession,
        remote: &RemoteAsset,
    ) -> Result<EntityResult> {
        let name = remote.asset.name.as_str();
        let asset_type = remote.asset_type.name.as_str();

        let created = if self.catalog.asset_exists(asset_type, name).await? {
            false
        } else {
            self.catalog.create_asset(asset_type, name).await?;
            debug!(asset = name, asset_type, "Created local asset");
            true
        };
        self.records
            .remember_object(RecordScope::Assets, name, &remote.asset.id)
            .await?;

        let mut changed = false;
        let description = remote
            .asset
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty());
        if let Some(description) = description {
            let local = self.catalog.asset_description(name).await?;
            if local.as_deref().map(str::trim) != Some(description) {
                self.catalog
                    .set_asset_description(name, description)
                    .await?;
                changed = true;
            }
        }

        let thumbnail = self
            .thumbnails
            .diff(
                session.client(),
                RecordScope::Assets,
                name,
                remote.asset.preview_file_id.as_deref(),
            )
            .await?;

        Ok(classify_pull(created, changed, &thumbnail))
    }

    // ------------------------------------------------------------------------
    // Post-sync checks
    // ------------------------------------------------------------------------

    async fn finish_with_check(
        &self,
        session: &SyncSession,
        report: &mut SyncReport,
    ) -> Result<()> {
        if self.post_checks_disabled(session).await {
            debug!("Post-sync checks disabled");
            return Ok(());
        }
        match self.post_check(session, report.kind, report.direction).await {
            Ok(check) => {
                report.post_check = check;
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(error = %e, "Post-sync check failed");
                Ok(())
            }
        }
    }

    /// Read from the store on every pass. A session keeps the value it was
    /// opened with.
    async fn post_checks_disabled(&self, session: &SyncSession) -> bool {
        match self.settings_store.get_bool(keys::IGNORE_POST_CHECKS).await {
            Ok(value) => value.unwrap_or(false),
            Err(e) => {
                warn!(error = %e, "Could not read post-check setting");
                session.settings().ignore_post_checks
            }
        }
    }

    #[instrument(skip(self, session))]
    async fn post_check(
        &self,
        session: &SyncSession,
        kind: RecordScope,
        direction: Direction,
    ) -> Result<Option<PostCheck>> {
        let resolver = ConflictResolver::new(self.records.clone(), self.catalog.clone());
        let discrepancy = match (direction, kind) {
            (Direction::Push, RecordScope::Shots) => {
                let names: Vec<String> = RemoteListing::for_session(session)
                    .shots()
                    .await?
                    .iter()
                    .map(RemoteShot::local_name)
                    .collect();
                resolver.remote_only(kind, &names).await?
            }
            (Direction::Push, RecordScope::Assets) => {
                let names: Vec<String> = RemoteListing::for_session(session)
                    .assets()
                    .await?
                    .into_iter()
                    .map(|remote| remote.asset.name)
                    .collect();
                resolver.remote_only(kind, &names).await?
            }
            (Direction::Pull, RecordScope::Shots) => resolver.local_only_shots().await?,
            (Direction::Pull, RecordScope::Assets) => None,
        };

        let Some(discrepancy) = discrepancy else {
            return Ok(None);
        };

        let asked = self.prompt.decide(&discrepancy).await;
        let decision = if discrepancy.allows(asked) {
            asked
        } else {
            warn!(?asked, "Decision does not apply to this discrepancy, ignoring");
            ConflictDecision::Ignore
        };
        info!(?decision, count = discrepancy.names().len(), "Post-sync check");

        self.apply_decision(session, discrepancy, decision).await.map(Some)
    }

    async fn apply_decision(
        &self,
        session: &SyncSession,
        discrepancy: Discrepancy,
        decision: ConflictDecision,
    ) -> Result<PostCheck> {
        let mut follow_up = None;
        let mut hidden = Vec::new();

        match (decision, &discrepancy) {
            (ConflictDecision::Import, Discrepancy::RemoteOnly { kind, .. }) => {
                let report = match kind {
                    RecordScope::Shots => self.pull_shots_pass(session).await?,
                    RecordScope::Assets => self.pull_assets_pass(session).await?,
                };
                follow_up = Some(Box::new(report));
            }
            (ConflictDecision::PushLocal, Discrepancy::LocalOnly { names, .. }) => {
                follow_up = Some(Box::new(self.push_shots_pass(session, names).await?));
            }
            (ConflictDecision::HideLocal, Discrepancy::LocalOnly { names, .. }) => {
                for name in names {
                    match self.catalog.hide_shot(name).await {
                        Ok(()) => hidden.push(name.clone()),
                        Err(e) => warn!(shot = %name, error = %e, "Failed to hide local shot"),
                    }
                }
            }
            (ConflictDecision::IgnoreForever, _) => {
                self.settings_store
                    .set_bool(keys::IGNORE_POST_CHECKS, true)
                    .await?;
                info!("Post-sync checks turned off");
            }
            _ => {}
        }

        Ok(PostCheck {
            discrepancy,
            decision,
            follow_up,
            hidden,
        })
    }
}

fn classify_pull(created: bool, changed: bool, thumbnail: &ThumbnailChange) -> EntityResult {
    if created {
        EntityResult::Created
    } else if changed || thumbnail.is_change() {
        EntityResult::Updated
    } else {
        EntityResult::Unchanged
    }
}

/// `{"prism": {"path": "<type>/<subfolders>/<name>"}}`
fn asset_extra_data(asset: &LocalAsset) -> EntityData {
    let mut segments = vec![asset.asset_type.as_str()];
    segments.extend(asset.subfolders.iter().map(String::as_str));
    segments.push(asset.name.as_str());

    let mut extra = Map::new();
    extra.insert(
        PIPELINE_DATA_KEY.to_string(),
        json!({ "path": segments.join("/") }),
    );
    EntityData {
        extra,
        ..EntityData::default()
    }
}
