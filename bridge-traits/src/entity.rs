//! Production-tracker records and the client contract the sync engine
//! drives.
//!
//! Lookups that find nothing return `Ok(None)`. Errors are reserved for
//! transport, authorization, and server failures.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{BridgeError, Result};
use crate::metadata::{null_as_default, EntityData};

pub type EntityId = String;

/// Frame span of a shot. `start <= end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRange {
    start: i64,
    end: i64,
}

impl FrameRange {
    pub fn new(start: i64, end: i64) -> Result<Self> {
        if start > end {
            return Err(BridgeError::InvalidInput(format!(
                "frame range start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn end(&self) -> i64 {
        self.end
    }

    /// Frame count as the tracker records it: `end - start`.
    pub fn nb_frames(&self) -> i64 {
        self.end - self.start
    }

    /// Move both ends so the range begins at frame 1.
    pub fn shifted_to_one(&self) -> Self {
        Self {
            start: 1,
            end: self.end - self.start + 1,
        }
    }
}

impl std::fmt::Display for FrameRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "String")]
pub enum ProductionType {
    TvShow,
    Short,
    #[default]
    FeatureFilm,
    Other,
}

impl From<String> for ProductionType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "tvshow" => ProductionType::TvShow,
            "short" => ProductionType::Short,
            "featurefilm" => ProductionType::FeatureFilm,
            _ => ProductionType::Other,
        }
    }
}

impl Serialize for ProductionType {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl ProductionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductionType::TvShow => "tvshow",
            ProductionType::Short => "short",
            ProductionType::FeatureFilm => "featurefilm",
            ProductionType::Other => "other",
        }
    }

    /// TV shows nest sequences under episodes.
    pub fn has_episodes(&self) -> bool {
        matches!(self, ProductionType::TvShow)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: EntityId,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub production_type: ProductionType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: EntityId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub project_id: Option<EntityId>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub canceled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub project_id: Option<EntityId>,
    /// Owning episode, for TV shows.
    #[serde(default)]
    pub parent_id: Option<EntityId>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub canceled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shot {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub project_id: Option<EntityId>,
    /// Owning sequence.
    #[serde(default)]
    pub parent_id: Option<EntityId>,
    #[serde(default)]
    pub sequence_name: Option<String>,
    #[serde(default)]
    pub episode_name: Option<String>,
    #[serde(default)]
    pub nb_frames: Option<i64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: EntityData,
    #[serde(default)]
    pub preview_file_id: Option<EntityId>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub canceled: bool,
}

impl Shot {
    /// Stored range, when both ends are present and ordered.
    pub fn frame_range(&self) -> Option<FrameRange> {
        match (self.data.frame_in, self.data.frame_out) {
            (Some(start), Some(end)) => FrameRange::new(start, end).ok(),
            _ => None,
        }
    }

    pub fn apply_frame_range(&mut self, range: FrameRange) {
        self.data.frame_in = Some(range.start());
        self.data.frame_out = Some(range.end());
        self.nb_frames = Some(range.nb_frames());
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetType {
    pub id: EntityId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub entity_type_id: Option<EntityId>,
    #[serde(default)]
    pub project_id: Option<EntityId>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: EntityData,
    #[serde(default)]
    pub preview_file_id: Option<EntityId>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub canceled: bool,
}

/// Fields for an asset that does not exist yet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewAsset {
    pub name: String,
    pub description: Option<String>,
    pub data: EntityData,
    pub episode_id: Option<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskType {
    pub id: EntityId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub id: EntityId,
    pub name: String,
    pub short_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: EntityId,
    #[serde(default)]
    pub name: Option<String>,
    pub entity_id: EntityId,
    pub task_type_id: EntityId,
    #[serde(default)]
    pub task_status_id: Option<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: EntityId,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewFile {
    pub id: EntityId,
    /// File extension without the dot, e.g. `png` or `mp4`.
    #[serde(default)]
    pub extension: Option<String>,
}

/// Which entities a listing returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListScope {
    #[default]
    Project,
    /// Only entities with tasks assigned to the signed-in user.
    AssignedToMe,
}

/// Client for the production tracker's REST API.
///
/// One instance holds one authenticated connection. `log_in` must succeed
/// before any other call.
#[async_trait]
pub trait EntityClient: Send + Sync {
    async fn log_in(&self, email: &str, password: &str) -> Result<Person>;

    async fn current_user(&self) -> Result<Person>;

    async fn find_project(&self, name: &str) -> Result<Option<Project>>;

    async fn find_episode(&self, project: &Project, name: &str) -> Result<Option<Episode>>;

    async fn create_episode(&self, project: &Project, name: &str) -> Result<Episode>;

    async fn list_episodes(&self, project: &Project, scope: ListScope) -> Result<Vec<Episode>>;

    /// Sequences are looked up under `episode` when one is given.
    async fn find_sequence(
        &self,
        project: &Project,
        episode: Option<&Episode>,
        name: &str,
    ) -> Result<Option<Sequence>>;

    async fn create_sequence(
        &self,
        project: &Project,
        episode: Option<&Episode>,
        name: &str,
    ) -> Result<Sequence>;

    /// Sequences of one episode, or of the whole project when `episode` is
    /// `None`.
    async fn list_sequences(
        &self,
        project: &Project,
        episode: Option<&Episode>,
        scope: ListScope,
    ) -> Result<Vec<Sequence>>;

    async fn find_shot(&self, sequence: &Sequence, name: &str) -> Result<Option<Shot>>;

    async fn create_shot(
        &self,
        project: &Project,
        sequence: &Sequence,
        name: &str,
        range: Option<FrameRange>,
        data: &EntityData,
    ) -> Result<Shot>;

    /// Persist name, frame count and `data` of an existing shot.
    async fn update_shot(&self, shot: &Shot) -> Result<Shot>;

    async fn list_shots(&self, sequence: &Sequence, scope: ListScope) -> Result<Vec<Shot>>;

    async fn find_asset_type(&self, name: &str) -> Result<Option<AssetType>>;

    async fn create_asset_type(&self, name: &str) -> Result<AssetType>;

    async fn list_asset_types(&self, project: &Project, scope: ListScope)
        -> Result<Vec<AssetType>>;

    async fn find_asset(&self, project: &Project, name: &str) -> Result<Option<Asset>>;

    async fn create_asset(
        &self,
        project: &Project,
        asset_type: &AssetType,
        asset: &NewAsset,
    ) -> Result<Asset>;

    /// Persist name, description and `data` of an existing asset.
    async fn update_asset(&self, asset: &Asset) -> Result<Asset>;

    async fn list_assets(
        &self,
        project: &Project,
        asset_type: &AssetType,
        scope: ListScope,
    ) -> Result<Vec<Asset>>;

    async fn find_task_type(&self, name: &str) -> Result<Option<TaskType>>;

    async fn find_task_status(&self, short_name: &str) -> Result<Option<TaskStatus>>;

    async fn find_task(&self, entity_id: &str, task_type: &TaskType) -> Result<Option<Task>>;

    async fn create_task(
        &self,
        project: &Project,
        entity_id: &str,
        task_type: &TaskType,
    ) -> Result<Task>;

    async fn add_comment(
        &self,
        task: &Task,
        status: &TaskStatus,
        text: &str,
        author: Option<&Person>,
    ) -> Result<Comment>;

    /// Attach media to a comment, returning the new preview record.
    async fn add_preview(
        &self,
        task: &Task,
        comment: &Comment,
        file_name: &str,
        contents: Bytes,
    ) -> Result<PreviewFile>;

    async fn set_main_preview(&self, preview: &PreviewFile) -> Result<()>;

    async fn get_preview_file(&self, id: &str) -> Result<PreviewFile>;

    /// Thumbnail image bytes for a preview file.
    async fn download_preview_thumbnail(&self, id: &str) -> Result<Bytes>;
}

/// Opens unauthenticated clients for a tracker site.
///
/// Sessions are rebuilt from current settings on every connection, so the
/// site URL is an argument rather than a field.
pub trait EntityClientFactory: Send + Sync {
    fn connect(&self, site: &str) -> Result<Arc<dyn EntityClient>>;
}
