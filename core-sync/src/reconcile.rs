//! # Reconciliation
//!
//! Get-or-create routines for every tracker level. Each call resolves the
//! entity by name inside its parent and creates it only when the lookup
//! comes back empty, so repeating a call never duplicates remote objects.
//!
//! ```text
//! Project ─┬─> Episode (TV shows only) ─> Sequence ─> Shot
//!          └─> AssetType ─> Asset
//! ```
//!
//! Name matching is exact and case-sensitive. Every resolve is one remote
//! read and every create one remote write. Nothing is batched or retried.

use crate::error::{Result, SyncError};
use bridge_traits::entity::{
    Asset, AssetType, EntityClient, Episode, FrameRange, NewAsset, Project, Sequence, Shot,
};
use bridge_traits::metadata::EntityData;
use core_runtime::config::ShotUpdatePolicy;
use tracing::{debug, info, instrument, warn};

/// Whether an update reached the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteWrite {
    Applied,
    /// The push failed and was logged. The local computation is kept.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Updated(RemoteWrite),
    Unchanged,
}

impl Outcome {
    pub fn is_created(&self) -> bool {
        matches!(self, Outcome::Created)
    }

    pub fn is_updated(&self) -> bool {
        matches!(self, Outcome::Updated(_))
    }
}

/// A resolved entity and what it took to get it.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled<T> {
    pub entity: T,
    pub outcome: Outcome,
}

impl<T> Reconciled<T> {
    fn created(entity: T) -> Self {
        Self {
            entity,
            outcome: Outcome::Created,
        }
    }

    fn unchanged(entity: T) -> Self {
        Self {
            entity,
            outcome: Outcome::Unchanged,
        }
    }
}

/// Reconciliation against one project.
pub struct Reconciler<'a> {
    client: &'a dyn EntityClient,
    project: &'a Project,
    shot_policy: ShotUpdatePolicy,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        client: &'a dyn EntityClient,
        project: &'a Project,
        shot_policy: ShotUpdatePolicy,
    ) -> Self {
        Self {
            client,
            project,
            shot_policy,
        }
    }

    pub fn project(&self) -> &Project {
        self.project
    }

    /// `Ok(None)` for a missing or blank name, without a remote call.
    #[instrument(skip(self))]
    pub async fn episode(&self, name: Option<&str>) -> Result<Option<Reconciled<Episode>>> {
        let Some(name) = name.filter(|n| !n.trim().is_empty()) else {
            return Ok(None);
        };

        if let Some(episode) = self.client.find_episode(self.project, name).await? {
            return Ok(Some(Reconciled::unchanged(episode)));
        }

        let episode = self.client.create_episode(self.project, name).await?;
        info!(episode = %episode.name, "Created episode");
        Ok(Some(Reconciled::created(episode)))
    }

    /// Resolved and created under `episode` when one is given, under the
    /// project otherwise.
    #[instrument(skip(self, episode), fields(episode = episode.map(|e| e.name.as_str())))]
    pub async fn sequence(
        &self,
        name: &str,
        episode: Option<&Episode>,
    ) -> Result<Reconciled<Sequence>> {
        require_name("sequence", name)?;

        if let Some(sequence) = self
            .client
            .find_sequence(self.project, episode, name)
            .await?
        {
            return Ok(Reconciled::unchanged(sequence));
        }

        let sequence = self
            .client
            .create_sequence(self.project, episode, name)
            .await?;
        info!(sequence = %sequence.name, "Created sequence");
        Ok(Reconciled::created(sequence))
    }

    /// Create the shot, or bring an existing shot's range in line with
    /// `range`.
    ///
    /// A failed update push does not fail the call: the outcome carries
    /// [`RemoteWrite::Failed`] and the returned shot holds the local values.
    #[instrument(skip(self, sequence, data), fields(sequence = %sequence.name))]
    pub async fn shot(
        &self,
        sequence: &Sequence,
        name: &str,
        range: Option<FrameRange>,
        data: &EntityData,
    ) -> Result<Reconciled<Shot>> {
        require_name("shot", name)?;

        let Some(mut shot) = self.client.find_shot(sequence, name).await? else {
            let shot = self
                .client
                .create_shot(self.project, sequence, name, range, data)
                .await?;
            info!(shot = %shot.name, range = ?range, "Created shot");
            return Ok(Reconciled::created(shot));
        };

        let Some(range) = range else {
            debug!("No local range, leaving shot as is");
            return Ok(Reconciled::unchanged(shot));
        };

        let in_sync =
            shot.frame_range() == Some(range) && shot.nb_frames == Some(range.nb_frames());
        if in_sync && self.shot_policy == ShotUpdatePolicy::WhenChanged {
            return Ok(Reconciled::unchanged(shot));
        }

        shot.apply_frame_range(range);
        match self.client.update_shot(&shot).await {
            Ok(updated) => {
                info!(shot = %updated.name, %range, "Updated shot range");
                Ok(Reconciled {
                    entity: updated,
                    outcome: Outcome::Updated(RemoteWrite::Applied),
                })
            }
            Err(e) => {
                warn!(shot = %shot.name, error = %e, "Failed to push shot range");
                Ok(Reconciled {
                    entity: shot,
                    outcome: Outcome::Updated(RemoteWrite::Failed(e.to_string())),
                })
            }
        }
    }

    /// Asset types are global on the tracker, not per project.
    #[instrument(skip(self))]
    pub async fn asset_type(&self, name: &str) -> Result<Reconciled<AssetType>> {
        require_name("asset type", name)?;

        if let Some(asset_type) = self.client.find_asset_type(name).await? {
            return Ok(Reconciled::unchanged(asset_type));
        }

        let asset_type = self.client.create_asset_type(name).await?;
        info!(asset_type = %asset_type.name, "Created asset type");
        Ok(Reconciled::created(asset_type))
    }

    /// Create the asset when it does not exist. An existing asset is never
    /// modified, its description included.
    #[instrument(
        skip(self, asset_type, description, extra_data, episode),
        fields(asset_type = %asset_type.name)
    )]
    pub async fn asset(
        &self,
        asset_type: &AssetType,
        name: &str,
        description: Option<&str>,
        extra_data: EntityData,
        episode: Option<&Episode>,
    ) -> Result<Reconciled<Asset>> {
        require_name("asset", name)?;

        if let Some(asset) = self.client.find_asset(self.project, name).await? {
            return Ok(Reconciled::unchanged(asset));
        }

        let new_asset = NewAsset {
            name: name.to_string(),
            description: description.map(str::to_string),
            data: extra_data,
            episode_id: episode.map(|e| e.id.clone()),
        };
        let asset = self
            .client
            .create_asset(self.project, asset_type, &new_asset)
            .await?;
        info!(asset = %asset.name, "Created asset");
        Ok(Reconciled::created(asset))
    }
}

fn require_name(kind: &'static str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(SyncError::invalid_name(kind, name, "name is empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::entity::ProductionType;
    use bridge_traits::testing::InMemoryKitsu;
    use bridge_traits::BridgeError;

    fn range(start: i64, end: i64) -> FrameRange {
        FrameRange::new(start, end).unwrap()
    }

    fn tracker() -> (InMemoryKitsu, Project) {
        let tracker = InMemoryKitsu::new().signed_in();
        let project = tracker.add_project("Ghibli", ProductionType::FeatureFilm);
        (tracker, project)
    }

    #[tokio::test]
    async fn test_blank_episode_skips_remote() {
        let (tracker, project) = tracker();
        let reconciler = Reconciler::new(&tracker, &project, ShotUpdatePolicy::default());

        assert!(reconciler.episode(None).await.unwrap().is_none());
        assert!(reconciler.episode(Some("  ")).await.unwrap().is_none());
        assert!(tracker.calls().is_empty());
    }

    #[tokio::test]
    async fn test_episode_and_sequence_created_once() {
        let (tracker, project) = tracker();
        let reconciler = Reconciler::new(&tracker, &project, ShotUpdatePolicy::default());

        let first = reconciler.episode(Some("EP01")).await.unwrap().unwrap();
        let second = reconciler.episode(Some("EP01")).await.unwrap().unwrap();
        assert_eq!(first.outcome, Outcome::Created);
        assert_eq!(second.outcome, Outcome::Unchanged);
        assert_eq!(first.entity.id, second.entity.id);

        let sequence = reconciler
            .sequence("SQ01", Some(&first.entity))
            .await
            .unwrap();
        assert!(sequence.outcome.is_created());
        assert_eq!(
            sequence.entity.parent_id.as_deref(),
            Some(first.entity.id.as_str())
        );
        let again = reconciler
            .sequence("SQ01", Some(&first.entity))
            .await
            .unwrap();
        assert_eq!(again.outcome, Outcome::Unchanged);
        assert_eq!(tracker.sequences().len(), 1);
    }

    #[tokio::test]
    async fn test_new_shot_then_same_range_is_unchanged() {
        let (tracker, project) = tracker();
        let reconciler = Reconciler::new(&tracker, &project, ShotUpdatePolicy::WhenChanged);
        let sequence = reconciler.sequence("SQ01", None).await.unwrap().entity;

        let created = reconciler
            .shot(&sequence, "SH010", Some(range(1, 100)), &EntityData::default())
            .await
            .unwrap();
        assert!(created.outcome.is_created());
        assert_eq!(created.entity.nb_frames, Some(99));

        let again = reconciler
            .shot(&sequence, "SH010", Some(range(1, 100)), &EntityData::default())
            .await
            .unwrap();
        assert_eq!(again.outcome, Outcome::Unchanged);
        assert_eq!(tracker.call_count("update_shot"), 0);
    }

    #[tokio::test]
    async fn test_always_policy_pushes_same_range() {
        let (tracker, project) = tracker();
        let reconciler = Reconciler::new(&tracker, &project, ShotUpdatePolicy::Always);
        let sequence = reconciler.sequence("SQ01", None).await.unwrap().entity;
        tracker.add_shot(&sequence, "SH010", Some(range(1, 100)));

        let again = reconciler
            .shot(&sequence, "SH010", Some(range(1, 100)), &EntityData::default())
            .await
            .unwrap();
        assert_eq!(again.outcome, Outcome::Updated(RemoteWrite::Applied));
        assert_eq!(tracker.call_count("update_shot"), 1);
    }

    #[tokio::test]
    async fn test_range_change_recomputes_frame_count() {
        let (tracker, project) = tracker();
        let reconciler = Reconciler::new(&tracker, &project, ShotUpdatePolicy::default());
        let sequence = reconciler.sequence("SQ01", None).await.unwrap().entity;
        tracker.add_shot(&sequence, "SH010", Some(range(1, 100)));

        let updated = reconciler
            .shot(&sequence, "SH010", Some(range(1, 150)), &EntityData::default())
            .await
            .unwrap();

        assert_eq!(updated.outcome, Outcome::Updated(RemoteWrite::Applied));
        assert_eq!(updated.entity.nb_frames, Some(149));
        let stored = tracker.shot_named("SH010").unwrap();
        assert_eq!(stored.nb_frames, Some(149));
        assert_eq!(stored.frame_range(), Some(range(1, 150)));
    }

    #[tokio::test]
    async fn test_existing_shot_without_range_is_left_alone() {
        let (tracker, project) = tracker();
        let reconciler = Reconciler::new(&tracker, &project, ShotUpdatePolicy::Always);
        let sequence = reconciler.sequence("SQ01", None).await.unwrap().entity;
        tracker.add_shot(&sequence, "SH010", Some(range(1, 100)));

        let result = reconciler
            .shot(&sequence, "SH010", None, &EntityData::default())
            .await
            .unwrap();
        assert_eq!(result.outcome, Outcome::Unchanged);
        assert_eq!(tracker.call_count("update_shot"), 0);
    }

    #[tokio::test]
    async fn test_failed_push_keeps_local_values() {
        let (tracker, project) = tracker();
        let reconciler = Reconciler::new(&tracker, &project, ShotUpdatePolicy::default());
        let sequence = reconciler.sequence("SQ01", None).await.unwrap().entity;
        tracker.add_shot(&sequence, "SH010", Some(range(1, 100)));
        tracker.fail_writes_for("SH010");

        let result = reconciler
            .shot(&sequence, "SH010", Some(range(1, 150)), &EntityData::default())
            .await
            .unwrap();

        assert!(matches!(
            result.outcome,
            Outcome::Updated(RemoteWrite::Failed(_))
        ));
        assert_eq!(result.entity.nb_frames, Some(149));
        assert_eq!(tracker.shot_named("SH010").unwrap().nb_frames, Some(99));
    }

    #[tokio::test]
    async fn test_asset_type_created_once_for_two_assets() {
        let (tracker, project) = tracker();
        let reconciler = Reconciler::new(&tracker, &project, ShotUpdatePolicy::default());

        for name in ["Chair", "Table"] {
            let asset_type = reconciler.asset_type("Props").await.unwrap().entity;
            let asset = reconciler
                .asset(&asset_type, name, None, EntityData::default(), None)
                .await
                .unwrap();
            assert!(asset.outcome.is_created());
        }

        assert_eq!(tracker.call_count("create_asset_type"), 1);
        assert_eq!(tracker.asset_types().len(), 1);
        assert_eq!(tracker.assets().len(), 2);
    }

    #[tokio::test]
    async fn test_existing_asset_description_is_not_touched() {
        let (tracker, project) = tracker();
        let props = tracker.add_asset_type("Props");
        tracker.add_asset(&project, &props, "Chair", Some("Old text"));
        let reconciler = Reconciler::new(&tracker, &project, ShotUpdatePolicy::default());

        let result = reconciler
            .asset(&props, "Chair", Some("New text"), EntityData::default(), None)
            .await
            .unwrap();

        assert_eq!(result.outcome, Outcome::Unchanged);
        assert_eq!(
            tracker.asset_named("Chair").unwrap().description.as_deref(),
            Some("Old text")
        );
        assert_eq!(tracker.call_count("update_asset"), 0);
    }

    #[tokio::test]
    async fn test_blank_asset_type_is_rejected() {
        let (tracker, project) = tracker();
        let reconciler = Reconciler::new(&tracker, &project, ShotUpdatePolicy::default());
        assert!(matches!(
            reconciler.asset_type("").await,
            Err(SyncError::InvalidName { kind: "asset type", .. })
        ));
    }

    #[tokio::test]
    async fn test_lookup_failure_is_raised() {
        let tracker = InMemoryKitsu::new();
        let project = tracker.add_project("Ghibli", ProductionType::FeatureFilm);
        let reconciler = Reconciler::new(&tracker, &project, ShotUpdatePolicy::default());

        assert!(matches!(
            reconciler.asset_type("Props").await,
            Err(SyncError::Remote(BridgeError::Unauthorized(_)))
        ));
        assert_eq!(tracker.call_count("create_asset_type"), 0);
    }
}
