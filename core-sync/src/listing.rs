//! Walks the tracker's shot and asset hierarchy for a project.
//!
//! TV shows are walked episode by episode, other productions sequence by
//! sequence. Canceled entities are dropped at every level.

use crate::error::Result;
use crate::naming::ShotPath;
use bridge_traits::entity::{
    Asset, AssetType, EntityClient, Episode, FrameRange, ListScope, Project, Sequence, Shot,
};
use core_auth::SyncSession;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteShot {
    pub shot: Shot,
    pub sequence: Sequence,
    pub episode: Option<Episode>,
}

impl RemoteShot {
    pub fn path(&self) -> ShotPath {
        ShotPath::new(
            self.episode.as_ref().map(|e| e.name.clone()),
            self.sequence.name.clone(),
            self.shot.name.clone(),
        )
    }

    /// Name of the matching local shot.
    pub fn local_name(&self) -> String {
        self.path().local_name()
    }

    /// Range to apply locally.
    ///
    /// The tracker lets users fill in only part of the range: a missing end
    /// is `frame_in + nb_frames`, and a shot with only a frame count starts
    /// at `first_frame`. Values that overflow give no range.
    pub fn frame_range(&self, first_frame: i64) -> Option<FrameRange> {
        let nb_frames = self.shot.nb_frames;
        let (start, end) = match (self.shot.data.frame_in, self.shot.data.frame_out) {
            (Some(start), Some(end)) => (start, end),
            (Some(start), None) => (start, start.checked_add(nb_frames?)?),
            (None, _) => {
                let end = nb_frames?.checked_sub(1)?.checked_add(first_frame)?;
                (first_frame, end)
            }
        };
        match FrameRange::new(start, end) {
            Ok(range) => Some(range),
            Err(e) => {
                warn!(shot = %self.shot.name, error = %e, "Ignoring unusable frame range");
                None
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteAsset {
    pub asset: Asset,
    pub asset_type: AssetType,
}

pub struct RemoteListing<'a> {
    client: &'a dyn EntityClient,
    project: &'a Project,
    scope: ListScope,
}

impl<'a> RemoteListing<'a> {
    pub fn new(client: &'a dyn EntityClient, project: &'a Project, scope: ListScope) -> Self {
        Self {
            client,
            project,
            scope,
        }
    }

    /// Listing scoped by the session's `usersync` setting.
    pub fn for_session(session: &'a SyncSession) -> Self {
        Self::new(session.client(), session.project(), session.list_scope())
    }

    #[instrument(skip(self), fields(project = %self.project.name, scope = ?self.scope))]
    pub async fn shots(&self) -> Result<Vec<RemoteShot>> {
        let mut shots = Vec::new();

        if self.project.production_type.has_episodes() {
            let episodes = self.client.list_episodes(self.project, self.scope).await?;
            for episode in episodes.into_iter().filter(|e| !e.canceled) {
                let sequences = self
                    .client
                    .list_sequences(self.project, Some(&episode), self.scope)
                    .await?;
                for sequence in sequences.into_iter().filter(|s| !s.canceled) {
                    self.collect_shots(sequence, Some(&episode), &mut shots)
                        .await?;
                }
            }
        } else {
            let sequences = self
                .client
                .list_sequences(self.project, None, self.scope)
                .await?;
            for sequence in sequences.into_iter().filter(|s| !s.canceled) {
                self.collect_shots(sequence, None, &mut shots).await?;
            }
        }

        debug!(count = shots.len(), "Listed Kitsu shots");
        Ok(shots)
    }

    async fn collect_shots(
        &self,
        sequence: Sequence,
        episode: Option<&Episode>,
        out: &mut Vec<RemoteShot>,
    ) -> Result<()> {
        let shots = self.client.list_shots(&sequence, self.scope).await?;
        out.extend(
            shots
                .into_iter()
                .filter(|shot| !shot.canceled)
                .map(|shot| RemoteShot {
                    shot,
                    sequence: sequence.clone(),
                    episode: episode.cloned(),
                }),
        );
        Ok(())
    }

    #[instrument(skip(self), fields(project = %self.project.name, scope = ?self.scope))]
    pub async fn assets(&self) -> Result<Vec<RemoteAsset>> {
        let mut assets = Vec::new();
        let asset_types = self
            .client
            .list_asset_types(self.project, self.scope)
            .await?;
        for asset_type in asset_types {
            let listed = self
                .client
                .list_assets(self.project, &asset_type, self.scope)
                .await?;
            assets.extend(
                listed
                    .into_iter()
                    .filter(|asset| !asset.canceled)
                    .map(|asset| RemoteAsset {
                        asset,
                        asset_type: asset_type.clone(),
                    }),
            );
        }
        debug!(count = assets.len(), "Listed Kitsu assets");
        Ok(assets)
    }
}
