//! # Preview Publishing
//!
//! Sends a rendered movie to Kitsu as a review of one task:
//!
//! 1. Resolve the shot (by local name) or asset (by name).
//! 2. Translate the pipeline step to a task type and get or create the task.
//! 3. Post a comment with the requested status and attach the movie.
//! 4. Optionally make the upload the entity's main preview.
//! 5. Record the media path and step data in the entity's metadata.
//!
//! Only movie files are accepted. Image sequences must be encoded by the
//! host first.

use crate::error::{Result, SyncError};
use crate::naming::ShotPath;
use crate::reconcile::RemoteWrite;
use bridge_traits::entity::{Asset, EntityClient, Project, Shot};
use bridge_traits::storage::FileSystemAccess;
use core_auth::SyncSession;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub const MOVIE_EXTENSIONS: &[&str] = &["mov", "mp4", "mkv", "avi"];
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "png", "bmp", "exr"];
/// Status used when neither the request nor the settings name one.
pub const DEFAULT_STATUS: &str = "todo";

/// Task type name for a pipeline step abbreviation. Unknown steps are used
/// as given.
pub fn task_type_for_step(step: &str) -> &str {
    match step {
        "anm" => "Animation",
        "lay" => "Layout",
        "cmp" => "Compositing",
        "lgt" => "Lighting",
        "fx" => "FX",
        "prv" => "Previz",
        other => other,
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
}

pub fn is_movie(path: &Path) -> bool {
    extension_of(path).is_some_and(|e| MOVIE_EXTENSIONS.contains(&e.as_str()))
}

pub fn is_image(path: &Path) -> bool {
    extension_of(path).is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.as_str()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishTarget {
    /// Local shot name, e.g. `SQ01-SH010`.
    Shot(String),
    Asset(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishRequest {
    pub target: PublishTarget,
    /// Pipeline step, abbreviated (`anm`) or full (`Animation`).
    pub step: String,
    pub media_path: PathBuf,
    pub comment: Option<String>,
    /// Task status short name. Falls back to the `publishstatus` setting,
    /// then to `todo`.
    pub status: Option<String>,
    pub set_main_preview: bool,
    /// Stored under `metadata.prism[<task type>]`.
    pub pipeline_data: Map<String, Value>,
}

impl PublishRequest {
    pub fn new(
        target: PublishTarget,
        step: impl Into<String>,
        media_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            target,
            step: step.into(),
            media_path: media_path.into(),
            comment: None,
            status: None,
            set_main_preview: false,
            pipeline_data: Map::new(),
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn as_main_preview(mut self) -> Self {
        self.set_main_preview = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    pub entity_id: String,
    pub task_id: String,
    pub comment_id: String,
    pub preview_id: String,
    pub set_as_main: bool,
    /// Whether the metadata update reached Kitsu.
    pub metadata: RemoteWrite,
}

enum Target {
    Shot(Shot),
    Asset(Asset),
}

impl Target {
    fn id(&self) -> &str {
        match self {
            Target::Shot(shot) => &shot.id,
            Target::Asset(asset) => &asset.id,
        }
    }

    fn name(&self) -> &str {
        match self {
            Target::Shot(shot) => &shot.name,
            Target::Asset(asset) => &asset.name,
        }
    }
}

pub struct PreviewPublisher {
    fs: Arc<dyn FileSystemAccess>,
}

impl PreviewPublisher {
    pub fn new(fs: Arc<dyn FileSystemAccess>) -> Self {
        Self { fs }
    }

    /// Whether playblasts should be published automatically.
    pub fn publishes_on_playblast(session: &SyncSession) -> bool {
        session.settings().publish_on_playblast
    }

    #[instrument(
        skip(self, session, request),
        fields(target = ?request.target, step = %request.step)
    )]
    pub async fn publish(
        &self,
        session: &SyncSession,
        request: PublishRequest,
    ) -> Result<PublishOutcome> {
        session.ensure_valid()?;

        let media = request.media_path.display().to_string();
        if !is_movie(&request.media_path) {
            let reason = if is_image(&request.media_path) {
                "image sequences must be encoded to a movie first"
            } else {
                "not a movie file"
            };
            return Err(SyncError::UnsupportedMedia {
                path: media,
                reason: reason.to_string(),
            });
        }
        let file_name = request
            .media_path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| SyncError::UnsupportedMedia {
                path: media.clone(),
                reason: "no file name".to_string(),
            })?;

        let client = session.client();
        let project = session.project();
        let target = resolve_target(client, project, &request.target).await?;

        let task_type_name = task_type_for_step(&request.step).to_string();
        let task_type = client
            .find_task_type(&task_type_name)
            .await?
            .ok_or_else(|| SyncError::TaskTypeNotFound(task_type_name.clone()))?;

        let status_name = request
            .status
            .clone()
            .or_else(|| session.settings().publish_status.clone())
            .unwrap_or_else(|| DEFAULT_STATUS.to_string());
        let status = client
            .find_task_status(&status_name)
            .await?
            .ok_or_else(|| SyncError::TaskStatusNotFound(status_name.clone()))?;

        let task = match client.find_task(target.id(), &task_type).await? {
            Some(task) => task,
            None => client.create_task(project, target.id(), &task_type).await?,
        };

        let text = request.comment.clone().unwrap_or_default();
        let comment = client
            .add_comment(&task, &status, &text, Some(session.user()))
            .await?;

        let contents = self.fs.read_file(&request.media_path).await?;
        let preview = client
            .add_preview(&task, &comment, &file_name, contents)
            .await?;

        if request.set_main_preview {
            client.set_main_preview(&preview).await?;
        }
        info!(entity = target.name(), preview = %preview.id, "Published preview");

        let metadata =
            record_publish(client, target, &task_type_name, &media, &request.pipeline_data).await;

        Ok(PublishOutcome {
            entity_id: task.entity_id.clone(),
            task_id: task.id,
            comment_id: comment.id,
            preview_id: preview.id,
            set_as_main: request.set_main_preview,
            metadata,
        })
    }
}

async fn resolve_target(
    client: &dyn EntityClient,
    project: &Project,
    target: &PublishTarget,
) -> Result<Target> {
    match target {
        PublishTarget::Asset(name) => client
            .find_asset(project, name)
            .await?
            .map(Target::Asset)
            .ok_or_else(|| SyncError::EntityNotFound {
                kind: "asset",
                name: name.clone(),
            }),
        PublishTarget::Shot(local_name) => {
            let path = ShotPath::parse(local_name, project.production_type)?;
            let episode = match &path.episode {
                Some(name) => Some(client.find_episode(project, name).await?.ok_or_else(|| {
                    SyncError::EntityNotFound {
                        kind: "episode",
                        name: name.clone(),
                    }
                })?),
                None => None,
            };
            let sequence = client
                .find_sequence(project, episode.as_ref(), &path.sequence)
                .await?
                .ok_or_else(|| SyncError::EntityNotFound {
                    kind: "sequence",
                    name: path.sequence.clone(),
                })?;
            client
                .find_shot(&sequence, &path.shot)
                .await?
                .map(Target::Shot)
                .ok_or_else(|| SyncError::EntityNotFound {
                    kind: "shot",
                    name: local_name.clone(),
                })
        }
    }
}

/// Append the media to the step's history and merge the pipeline data, then
/// push the entity. A failed push is logged, not raised: the preview is
/// already on Kitsu.
async fn record_publish(
    client: &dyn EntityClient,
    target: Target,
    step: &str,
    media: &str,
    pipeline_data: &Map<String, Value>,
) -> RemoteWrite {
    let result = match target {
        Target::Shot(mut shot) => {
            shot.data.metadata.record_media(step, media);
            shot.data.metadata.merge_pipeline_data(step, pipeline_data);
            client.update_shot(&shot).await.map(|_| ())
        }
        Target::Asset(mut asset) => {
            asset.data.metadata.record_media(step, media);
            asset.data.metadata.merge_pipeline_data(step, pipeline_data);
            client.update_asset(&asset).await.map(|_| ())
        }
    };
    match result {
        Ok(()) => RemoteWrite::Applied,
        Err(e) => {
            warn!(error = %e, "Failed to store publish metadata");
            RemoteWrite::Failed(e.to_string())
        }
    }
}
