//! In-memory bridge implementations for tests.
//!
//! Enabled with the `testing` feature. Every fake keeps its state behind a
//! mutex and exposes inspection helpers so tests can assert on what the sync
//! engine actually wrote.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::catalog::{LocalAsset, LocalCatalog};
use crate::entity::{
    Asset, AssetType, Comment, EntityClient, EntityClientFactory, Episode, FrameRange, ListScope,
    NewAsset, Person, PreviewFile, ProductionType, Project, Sequence, Shot, Task, TaskStatus,
    TaskType,
};
use crate::error::{BridgeError, Result};
use crate::http::{HttpClient, HttpRequest, HttpResponse};
use crate::image::ImageConverter;
use crate::metadata::EntityData;
use crate::storage::{FileSystemAccess, MetadataStore, SecureStore, SettingsStore};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Tracker
// ============================================================================

#[derive(Default)]
struct TrackerState {
    email: String,
    password: String,
    user: Option<Person>,
    logged_in: bool,
    next_id: u64,
    projects: Vec<Project>,
    episodes: Vec<Episode>,
    sequences: Vec<Sequence>,
    shots: Vec<Shot>,
    asset_types: Vec<AssetType>,
    assets: Vec<Asset>,
    task_types: Vec<TaskType>,
    task_statuses: Vec<TaskStatus>,
    tasks: Vec<Task>,
    comments: Vec<(String, Comment)>,
    previews: Vec<(PreviewFile, Bytes, Option<String>)>,
    main_previews: Vec<String>,
    assigned: HashSet<String>,
    failing_writes: HashSet<String>,
    calls: Vec<String>,
}

impl TrackerState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn call(&mut self, operation: &str, subject: &str) {
        self.calls.push(format!("{}:{}", operation, subject));
    }

    fn ensure_logged_in(&self) -> Result<()> {
        if self.logged_in {
            Ok(())
        } else {
            Err(BridgeError::Unauthorized("not logged in".to_string()))
        }
    }

    fn ensure_writable(&self, name: &str) -> Result<()> {
        if self.failing_writes.contains(name) {
            Err(BridgeError::OperationFailed(format!(
                "server rejected write for {}",
                name
            )))
        } else {
            Ok(())
        }
    }

    fn sequence_has_assigned_shot(&self, sequence: &Sequence) -> bool {
        self.assigned.contains(&sequence.id)
            || self.shots.iter().any(|shot| {
                shot.parent_id.as_deref() == Some(sequence.id.as_str())
                    && self.assigned.contains(&shot.id)
            })
    }

    fn episode_has_assigned_shot(&self, episode: &Episode) -> bool {
        self.assigned.contains(&episode.id)
            || self.sequences.iter().any(|sequence| {
                sequence.parent_id.as_deref() == Some(episode.id.as_str())
                    && self.sequence_has_assigned_shot(sequence)
            })
    }

    fn episode_name_for(&self, sequence: &Sequence) -> Option<String> {
        let parent = sequence.parent_id.as_deref()?;
        self.episodes
            .iter()
            .find(|episode| episode.id == parent)
            .map(|episode| episode.name.clone())
    }
}

/// Stateful fake of the tracker.
///
/// Every remote call is appended to a call log as `operation:subject`, e.g.
/// `create_shot:SH010` or `download_preview_thumbnail:preview-7`.
pub struct InMemoryKitsu {
    state: Mutex<TrackerState>,
}

impl Default for InMemoryKitsu {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryKitsu {
    /// Tracker accepting `ana@studio.test` / `secret`.
    pub fn new() -> Self {
        let state = TrackerState {
            email: "ana@studio.test".to_string(),
            password: "secret".to_string(),
            ..TrackerState::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn with_credentials(self, email: &str, password: &str) -> Self {
        {
            let mut state = lock(&self.state);
            state.email = email.to_string();
            state.password = password.to_string();
        }
        self
    }

    /// Skip `log_in` for tests that drive the client directly.
    pub fn signed_in(self) -> Self {
        {
            let mut state = lock(&self.state);
            state.logged_in = true;
            let email = state.email.clone();
            state.user = Some(Person {
                id: "person-0".to_string(),
                email: Some(email),
                full_name: Some("Test User".to_string()),
            });
        }
        self
    }

    pub fn add_project(&self, name: &str, production_type: ProductionType) -> Project {
        let mut state = lock(&self.state);
        let project = Project {
            id: state.next_id("project"),
            name: name.to_string(),
            production_type,
        };
        state.projects.push(project.clone());
        project
    }

    pub fn add_episode(&self, project: &Project, name: &str) -> Episode {
        let mut state = lock(&self.state);
        let episode = Episode {
            id: state.next_id("episode"),
            name: name.to_string(),
            project_id: Some(project.id.clone()),
            canceled: false,
        };
        state.episodes.push(episode.clone());
        episode
    }

    pub fn add_sequence(
        &self,
        project: &Project,
        episode: Option<&Episode>,
        name: &str,
    ) -> Sequence {
        let mut state = lock(&self.state);
        let sequence = Sequence {
            id: state.next_id("sequence"),
            name: name.to_string(),
            project_id: Some(project.id.clone()),
            parent_id: episode.map(|e| e.id.clone()),
            canceled: false,
        };
        state.sequences.push(sequence.clone());
        sequence
    }

    pub fn add_shot(&self, sequence: &Sequence, name: &str, range: Option<FrameRange>) -> Shot {
        let mut state = lock(&self.state);
        let mut shot = Shot {
            id: state.next_id("shot"),
            name: name.to_string(),
            project_id: sequence.project_id.clone(),
            parent_id: Some(sequence.id.clone()),
            sequence_name: Some(sequence.name.clone()),
            episode_name: state.episode_name_for(sequence),
            nb_frames: None,
            data: EntityData::default(),
            preview_file_id: None,
            canceled: false,
        };
        if let Some(range) = range {
            shot.apply_frame_range(range);
        }
        state.shots.push(shot.clone());
        shot
    }

    /// Store a shot record as given, for payloads `add_shot` cannot express
    /// (partial frame data, canceled shots).
    pub fn put_shot(&self, shot: Shot) {
        let mut state = lock(&self.state);
        state.shots.retain(|s| s.id != shot.id);
        state.shots.push(shot);
    }

    pub fn add_asset_type(&self, name: &str) -> AssetType {
        let mut state = lock(&self.state);
        let asset_type = AssetType {
            id: state.next_id("asset-type"),
            name: name.to_string(),
        };
        state.asset_types.push(asset_type.clone());
        asset_type
    }

    pub fn add_asset(
        &self,
        project: &Project,
        asset_type: &AssetType,
        name: &str,
        description: Option<&str>,
    ) -> Asset {
        let mut state = lock(&self.state);
        let asset = Asset {
            id: state.next_id("asset"),
            name: name.to_string(),
            description: description.map(str::to_string),
            entity_type_id: Some(asset_type.id.clone()),
            project_id: Some(project.id.clone()),
            data: EntityData::default(),
            preview_file_id: None,
            canceled: false,
        };
        state.assets.push(asset.clone());
        asset
    }

    pub fn add_task_type(&self, name: &str) -> TaskType {
        let mut state = lock(&self.state);
        let task_type = TaskType {
            id: state.next_id("task-type"),
            name: name.to_string(),
        };
        state.task_types.push(task_type.clone());
        task_type
    }

    pub fn add_task_status(&self, name: &str, short_name: &str) -> TaskStatus {
        let mut state = lock(&self.state);
        let status = TaskStatus {
            id: state.next_id("task-status"),
            name: name.to_string(),
            short_name: short_name.to_string(),
        };
        state.task_statuses.push(status.clone());
        status
    }

    /// A preview file whose thumbnail download returns `thumbnail`.
    pub fn add_preview(&self, extension: &str, thumbnail: &[u8]) -> PreviewFile {
        let mut state = lock(&self.state);
        let preview = PreviewFile {
            id: state.next_id("preview"),
            extension: Some(extension.to_string()),
        };
        state
            .previews
            .push((preview.clone(), Bytes::copy_from_slice(thumbnail), None));
        preview
    }

    /// Set or clear the main preview of a shot or asset.
    pub fn set_entity_preview(&self, entity_id: &str, preview_id: Option<&str>) {
        let mut state = lock(&self.state);
        let preview_id = preview_id.map(str::to_string);
        for shot in state.shots.iter_mut().filter(|s| s.id == entity_id) {
            shot.preview_file_id = preview_id.clone();
        }
        for asset in state.assets.iter_mut().filter(|a| a.id == entity_id) {
            asset.preview_file_id = preview_id.clone();
        }
    }

    /// Make an entity show up in `AssignedToMe` listings.
    pub fn assign_to_me(&self, entity_id: &str) {
        lock(&self.state).assigned.insert(entity_id.to_string());
    }

    pub fn cancel(&self, entity_id: &str) {
        let mut state = lock(&self.state);
        for shot in state.shots.iter_mut().filter(|s| s.id == entity_id) {
            shot.canceled = true;
        }
        for asset in state.assets.iter_mut().filter(|a| a.id == entity_id) {
            asset.canceled = true;
        }
        for sequence in state.sequences.iter_mut().filter(|s| s.id == entity_id) {
            sequence.canceled = true;
        }
        for episode in state.episodes.iter_mut().filter(|e| e.id == entity_id) {
            episode.canceled = true;
        }
    }

    /// Creates and updates of an entity with this name fail.
    pub fn fail_writes_for(&self, name: &str) {
        lock(&self.state).failing_writes.insert(name.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.state).calls.clone()
    }

    /// Number of logged calls of `operation`, any subject.
    pub fn call_count(&self, operation: &str) -> usize {
        let prefix = format!("{}:", operation);
        lock(&self.state)
            .calls
            .iter()
            .filter(|call| call.starts_with(&prefix))
            .count()
    }

    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }

    pub fn episodes(&self) -> Vec<Episode> {
        lock(&self.state).episodes.clone()
    }

    pub fn sequences(&self) -> Vec<Sequence> {
        lock(&self.state).sequences.clone()
    }

    pub fn shots(&self) -> Vec<Shot> {
        lock(&self.state).shots.clone()
    }

    pub fn shot_named(&self, name: &str) -> Option<Shot> {
        lock(&self.state)
            .shots
            .iter()
            .find(|shot| shot.name == name)
            .cloned()
    }

    pub fn asset_types(&self) -> Vec<AssetType> {
        lock(&self.state).asset_types.clone()
    }

    pub fn assets(&self) -> Vec<Asset> {
        lock(&self.state).assets.clone()
    }

    pub fn asset_named(&self, name: &str) -> Option<Asset> {
        lock(&self.state)
            .assets
            .iter()
            .find(|asset| asset.name == name)
            .cloned()
    }

    pub fn tasks(&self) -> Vec<Task> {
        lock(&self.state).tasks.clone()
    }

    /// Comments with the id of the task they were posted on.
    pub fn comments(&self) -> Vec<(String, Comment)> {
        lock(&self.state).comments.clone()
    }

    /// Preview ids promoted with `set_main_preview`.
    pub fn main_previews(&self) -> Vec<String> {
        lock(&self.state).main_previews.clone()
    }

    /// File name a preview was uploaded with, if it came from `add_preview`
    /// on a comment.
    pub fn uploaded_file_name(&self, preview_id: &str) -> Option<String> {
        lock(&self.state)
            .previews
            .iter()
            .find(|(preview, _, _)| preview.id == preview_id)
            .and_then(|(_, _, name)| name.clone())
    }
}

#[async_trait]
impl EntityClient for InMemoryKitsu {
    async fn log_in(&self, email: &str, password: &str) -> Result<Person> {
        let mut state = lock(&self.state);
        state.call("log_in", email);
        if email != state.email || password != state.password {
            return Err(BridgeError::Unauthorized("wrong email or password".to_string()));
        }
        let person = Person {
            id: "person-0".to_string(),
            email: Some(email.to_string()),
            full_name: Some("Test User".to_string()),
        };
        state.logged_in = true;
        state.user = Some(person.clone());
        Ok(person)
    }

    async fn current_user(&self) -> Result<Person> {
        let state = lock(&self.state);
        state.ensure_logged_in()?;
        state
            .user
            .clone()
            .ok_or_else(|| BridgeError::Unauthorized("no user".to_string()))
    }

    async fn find_project(&self, name: &str) -> Result<Option<Project>> {
        let mut state = lock(&self.state);
        state.ensure_logged_in()?;
        state.call("find_project", name);
        Ok(state.projects.iter().find(|p| p.name == name).cloned())
    }

    async fn find_episode(&self, project: &Project, name: &str) -> Result<Option<Episode>> {
        let mut state = lock(&self.state);
        state.ensure_logged_in()?;
        state.call("find_episode", name);
        Ok(state
            .episodes
            .iter()
            .find(|e| e.project_id.as_deref() == Some(project.id.as_str()) && e.name == name)
            .cloned())
    }

    async fn create_episode(&self, project: &Project, name: &str) -> Result<Episode> {
        {
            let mut state = lock(&self.state);
            state.ensure_logged_in()?;
            state.call("create_episode", name);
            state.ensure_writable(name)?;
        }
        Ok(self.add_episode(project, name))
    }

    async fn list_episodes(&self, project: &Project, scope: ListScope) -> Result<Vec<Episode>> {
        let mut state = lock(&self.state);
        state.ensure_logged_in()?;
        state.call("list_episodes", &project.name);
        Ok(state
            .episodes
            .iter()
            .filter(|e| e.project_id.as_deref() == Some(project.id.as_str()))
            .filter(|e| scope == ListScope::Project || state.episode_has_assigned_shot(e))
            .cloned()
            .collect())
    }

    async fn find_sequence(
        &self,
        project: &Project,
        episode: Option<&Episode>,
        name: &str,
    ) -> Result<Option<Sequence>> {
        let mut state = lock(&self.state);
        state.ensure_logged_in()?;
        state.call("find_sequence", name);
        let parent = episode.map(|e| e.id.as_str());
        Ok(state
            .sequences
            .iter()
            .find(|s| {
                s.project_id.as_deref() == Some(project.id.as_str())
                    && (parent.is_none() || s.parent_id.as_deref() == parent)
                    && s.name == name
            })
            .cloned())
    }

    async fn create_sequence(
        &self,
        project: &Project,
        episode: Option<&Episode>,
        name: &str,
    ) -> Result<Sequence> {
        {
            let mut state = lock(&self.state);
            state.ensure_logged_in()?;
            state.call("create_sequence", name);
            state.ensure_writable(name)?;
        }
        Ok(self.add_sequence(project, episode, name))
    }

    async fn list_sequences(
        &self,
        project: &Project,
        episode: Option<&Episode>,
        scope: ListScope,
    ) -> Result<Vec<Sequence>> {
        let mut state = lock(&self.state);
        state.ensure_logged_in()?;
        state.call("list_sequences", &project.name);
        let parent = episode.map(|e| e.id.as_str());
        Ok(state
            .sequences
            .iter()
            .filter(|s| s.project_id.as_deref() == Some(project.id.as_str()))
            .filter(|s| parent.is_none() || s.parent_id.as_deref() == parent)
            .filter(|s| scope == ListScope::Project || state.sequence_has_assigned_shot(s))
            .cloned()
            .collect())
    }

    async fn find_shot(&self, sequence: &Sequence, name: &str) -> Result<Option<Shot>> {
        let mut state = lock(&self.state);
        state.ensure_logged_in()?;
        state.call("find_shot", name);
        Ok(state
            .shots
            .iter()
            .find(|s| s.parent_id.as_deref() == Some(sequence.id.as_str()) && s.name == name)
            .cloned())
    }

    async fn create_shot(
        &self,
        _project: &Project,
        sequence: &Sequence,
        name: &str,
        range: Option<FrameRange>,
        data: &EntityData,
    ) -> Result<Shot> {
        {
            let mut state = lock(&self.state);
            state.ensure_logged_in()?;
            state.call("create_shot", name);
            state.ensure_writable(name)?;
        }
        let mut shot = self.add_shot(sequence, name, range);
        let mut merged = data.clone();
        merged.frame_in = shot.data.frame_in;
        merged.frame_out = shot.data.frame_out;
        shot.data = merged;
        self.put_shot(shot.clone());
        Ok(shot)
    }

    async fn update_shot(&self, shot: &Shot) -> Result<Shot> {
        let mut state = lock(&self.state);
        state.ensure_logged_in()?;
        state.call("update_shot", &shot.name);
        state.ensure_writable(&shot.name)?;
        let stored = state
            .shots
            .iter_mut()
            .find(|s| s.id == shot.id)
            .ok_or_else(|| BridgeError::OperationFailed(format!("no shot {}", shot.id)))?;
        stored.name = shot.name.clone();
        stored.nb_frames = shot.nb_frames;
        stored.data = shot.data.clone();
        Ok(stored.clone())
    }

    async fn list_shots(&self, sequence: &Sequence, scope: ListScope) -> Result<Vec<Shot>> {
        let mut state = lock(&self.state);
        state.ensure_logged_in()?;
        state.call("list_shots", &sequence.name);
        Ok(state
            .shots
            .iter()
            .filter(|s| s.parent_id.as_deref() == Some(sequence.id.as_str()))
            .filter(|s| scope == ListScope::Project || state.assigned.contains(&s.id))
            .cloned()
            .collect())
    }

    async fn find_asset_type(&self, name: &str) -> Result<Option<AssetType>> {
        let mut state = lock(&self.state);
        state.ensure_logged_in()?;
        state.call("find_asset_type", name);
        Ok(state.asset_types.iter().find(|t| t.name == name).cloned())
    }

    async fn create_asset_type(&self, name: &str) -> Result<AssetType> {
        {
            let mut state = lock(&self.state);
            state.ensure_logged_in()?;
            state.call("create_asset_type", name);
            state.ensure_writable(name)?;
        }
        Ok(self.add_asset_type(name))
    }

    async fn list_asset_types(
        &self,
        project: &Project,
        scope: ListScope,
    ) -> Result<Vec<AssetType>> {
        let mut state = lock(&self.state);
        state.ensure_logged_in()?;
        state.call("list_asset_types", &project.name);
        let used: BTreeSet<&str> = state
            .assets
            .iter()
            .filter(|a| a.project_id.as_deref() == Some(project.id.as_str()))
            .filter(|a| scope == ListScope::Project || state.assigned.contains(&a.id))
            .filter_map(|a| a.entity_type_id.as_deref())
            .collect();
        Ok(state
            .asset_types
            .iter()
            .filter(|t| used.contains(t.id.as_str()))
            .cloned()
            .collect())
    }

    async fn find_asset(&self, project: &Project, name: &str) -> Result<Option<Asset>> {
        let mut state = lock(&self.state);
        state.ensure_logged_in()?;
        state.call("find_asset", name);
        Ok(state
            .assets
            .iter()
            .find(|a| a.project_id.as_deref() == Some(project.id.as_str()) && a.name == name)
            .cloned())
    }

    async fn create_asset(
        &self,
        project: &Project,
        asset_type: &AssetType,
        asset: &NewAsset,
    ) -> Result<Asset> {
        {
            let mut state = lock(&self.state);
            state.ensure_logged_in()?;
            state.call("create_asset", &asset.name);
            state.ensure_writable(&asset.name)?;
        }
        let mut created = self.add_asset(
            project,
            asset_type,
            &asset.name,
            asset.description.as_deref(),
        );
        created.data = asset.data.clone();
        let mut state = lock(&self.state);
        if let Some(stored) = state.assets.iter_mut().find(|a| a.id == created.id) {
            stored.data = created.data.clone();
        }
        Ok(created)
    }

    async fn update_asset(&self, asset: &Asset) -> Result<Asset> {
        let mut state = lock(&self.state);
        state.ensure_logged_in()?;
        state.call("update_asset", &asset.name);
        state.ensure_writable(&asset.name)?;
        let stored = state
            .assets
            .iter_mut()
            .find(|a| a.id == asset.id)
            .ok_or_else(|| BridgeError::OperationFailed(format!("no asset {}", asset.id)))?;
        stored.name = asset.name.clone();
        stored.description = asset.description.clone();
        stored.data = asset.data.clone();
        Ok(stored.clone())
    }

    async fn list_assets(
        &self,
        project: &Project,
        asset_type: &AssetType,
        scope: ListScope,
    ) -> Result<Vec<Asset>> {
        let mut state = lock(&self.state);
        state.ensure_logged_in()?;
        state.call("list_assets", &asset_type.name);
        Ok(state
            .assets
            .iter()
            .filter(|a| a.project_id.as_deref() == Some(project.id.as_str()))
            .filter(|a| a.entity_type_id.as_deref() == Some(asset_type.id.as_str()))
            .filter(|a| scope == ListScope::Project || state.assigned.contains(&a.id))
            .cloned()
            .collect())
    }

    async fn find_task_type(&self, name: &str) -> Result<Option<TaskType>> {
        let mut state = lock(&self.state);
        state.ensure_logged_in()?;
        state.call("find_task_type", name);
        Ok(state.task_types.iter().find(|t| t.name == name).cloned())
    }

    async fn find_task_status(&self, short_name: &str) -> Result<Option<TaskStatus>> {
        let mut state = lock(&self.state);
        state.ensure_logged_in()?;
        state.call("find_task_status", short_name);
        Ok(state
            .task_statuses
            .iter()
            .find(|s| s.short_name == short_name)
            .cloned())
    }

    async fn find_task(&self, entity_id: &str, task_type: &TaskType) -> Result<Option<Task>> {
        let mut state = lock(&self.state);
        state.ensure_logged_in()?;
        state.call("find_task", entity_id);
        Ok(state
            .tasks
            .iter()
            .find(|t| t.entity_id == entity_id && t.task_type_id == task_type.id)
            .cloned())
    }

    async fn create_task(
        &self,
        _project: &Project,
        entity_id: &str,
        task_type: &TaskType,
    ) -> Result<Task> {
        let mut state = lock(&self.state);
        state.ensure_logged_in()?;
        state.call("create_task", entity_id);
        let task = Task {
            id: state.next_id("task"),
            name: Some("main".to_string()),
            entity_id: entity_id.to_string(),
            task_type_id: task_type.id.clone(),
            task_status_id: None,
        };
        state.tasks.push(task.clone());
        Ok(task)
    }

    async fn add_comment(
        &self,
        task: &Task,
        status: &TaskStatus,
        text: &str,
        _author: Option<&Person>,
    ) -> Result<Comment> {
        let mut state = lock(&self.state);
        state.ensure_logged_in()?;
        state.call("add_comment", &task.id);
        let comment = Comment {
            id: state.next_id("comment"),
            text: Some(text.to_string()),
        };
        if let Some(stored) = state.tasks.iter_mut().find(|t| t.id == task.id) {
            stored.task_status_id = Some(status.id.clone());
        }
        state.comments.push((task.id.clone(), comment.clone()));
        Ok(comment)
    }

    async fn add_preview(
        &self,
        task: &Task,
        _comment: &Comment,
        file_name: &str,
        contents: Bytes,
    ) -> Result<PreviewFile> {
        let mut state = lock(&self.state);
        state.ensure_logged_in()?;
        state.call("add_preview", &task.id);
        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);
        let preview = PreviewFile {
            id: state.next_id("preview"),
            extension,
        };
        state
            .previews
            .push((preview.clone(), contents, Some(file_name.to_string())));
        Ok(preview)
    }

    async fn set_main_preview(&self, preview: &PreviewFile) -> Result<()> {
        let mut state = lock(&self.state);
        state.ensure_logged_in()?;
        state.call("set_main_preview", &preview.id);
        state.main_previews.push(preview.id.clone());
        Ok(())
    }

    async fn get_preview_file(&self, id: &str) -> Result<PreviewFile> {
        let mut state = lock(&self.state);
        state.ensure_logged_in()?;
        state.call("get_preview_file", id);
        state
            .previews
            .iter()
            .find(|(preview, _, _)| preview.id == id)
            .map(|(preview, _, _)| preview.clone())
            .ok_or_else(|| BridgeError::OperationFailed(format!("no preview file {}", id)))
    }

    async fn download_preview_thumbnail(&self, id: &str) -> Result<Bytes> {
        let mut state = lock(&self.state);
        state.ensure_logged_in()?;
        state.call("download_preview_thumbnail", id);
        state
            .previews
            .iter()
            .find(|(preview, _, _)| preview.id == id)
            .map(|(_, bytes, _)| bytes.clone())
            .ok_or_else(|| BridgeError::OperationFailed(format!("no preview file {}", id)))
    }
}

/// Hands out the same tracker for every site and counts connections.
pub struct InMemoryKitsuFactory {
    tracker: Arc<InMemoryKitsu>,
    connections: AtomicU64,
}

impl InMemoryKitsuFactory {
    pub fn new(tracker: Arc<InMemoryKitsu>) -> Self {
        Self {
            tracker,
            connections: AtomicU64::new(0),
        }
    }

    pub fn connections(&self) -> u64 {
        self.connections.load(Ordering::SeqCst)
    }
}

impl EntityClientFactory for InMemoryKitsuFactory {
    fn connect(&self, site: &str) -> Result<Arc<dyn EntityClient>> {
        if site.trim().is_empty() {
            return Err(BridgeError::InvalidInput("site URL is empty".to_string()));
        }
        self.connections.fetch_add(1, Ordering::SeqCst);
        Ok(self.tracker.clone())
    }
}

/// HTTP client for configs whose tracker traffic goes through a fake
/// [`EntityClient`]. Every request fails.
#[derive(Debug, Default)]
pub struct OfflineHttpClient;

#[async_trait]
impl HttpClient for OfflineHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        Err(BridgeError::NotAvailable(format!(
            "offline: {}",
            request.url
        )))
    }
}

// ============================================================================
// Host stores
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum SettingValue {
    Text(String),
    Flag(bool),
    Number(i64),
}

#[derive(Default)]
pub struct InMemorySettingsStore {
    values: Mutex<HashMap<String, SettingValue>>,
}

impl InMemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn type_mismatch(key: &str, expected: &str) -> BridgeError {
        BridgeError::InvalidInput(format!("setting '{}' is not a {}", key, expected))
    }
}

#[async_trait]
impl SettingsStore for InMemorySettingsStore {
    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        lock(&self.values).insert(key.to_string(), SettingValue::Text(value.to_string()));
        Ok(())
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        match lock(&self.values).get(key) {
            None => Ok(None),
            Some(SettingValue::Text(value)) => Ok(Some(value.clone())),
            Some(_) => Err(Self::type_mismatch(key, "string")),
        }
    }

    async fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        lock(&self.values).insert(key.to_string(), SettingValue::Flag(value));
        Ok(())
    }

    async fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        match lock(&self.values).get(key) {
            None => Ok(None),
            Some(SettingValue::Flag(value)) => Ok(Some(*value)),
            Some(_) => Err(Self::type_mismatch(key, "bool")),
        }
    }

    async fn set_i64(&self, key: &str, value: i64) -> Result<()> {
        lock(&self.values).insert(key.to_string(), SettingValue::Number(value));
        Ok(())
    }

    async fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        match lock(&self.values).get(key) {
            None => Ok(None),
            Some(SettingValue::Number(value)) => Ok(Some(*value)),
            Some(_) => Err(Self::type_mismatch(key, "number")),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        lock(&self.values).remove(key);
        Ok(())
    }

    async fn has_key(&self, key: &str) -> Result<bool> {
        Ok(lock(&self.values).contains_key(key))
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = lock(&self.values).keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    async fn clear_all(&self) -> Result<()> {
        lock(&self.values).clear();
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemorySecureStore {
    secrets: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemorySecureStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecureStore for InMemorySecureStore {
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()> {
        lock(&self.secrets).insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(lock(&self.secrets).get(key).cloned())
    }

    async fn delete_secret(&self, key: &str) -> Result<()> {
        lock(&self.secrets).remove(key);
        Ok(())
    }

    async fn clear_all(&self) -> Result<()> {
        lock(&self.secrets).clear();
        Ok(())
    }
}

/// Namespaces are case-insensitive, matching the SQLite store.
#[derive(Default)]
pub struct InMemoryMetadataStore {
    fields: Mutex<BTreeMap<(String, String, String), String>>,
    writes: AtomicU64,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `set_field` calls so far.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    fn key(namespace: &str, entity: &str, field: &str) -> (String, String, String) {
        (
            namespace.to_lowercase(),
            entity.to_string(),
            field.to_string(),
        )
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn get_field(
        &self,
        namespace: &str,
        entity: &str,
        field: &str,
    ) -> Result<Option<String>> {
        Ok(lock(&self.fields)
            .get(&Self::key(namespace, entity, field))
            .cloned())
    }

    async fn set_field(
        &self,
        namespace: &str,
        entity: &str,
        field: &str,
        value: &str,
    ) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        lock(&self.fields).insert(Self::key(namespace, entity, field), value.to_string());
        Ok(())
    }

    async fn delete_field(&self, namespace: &str, entity: &str, field: &str) -> Result<()> {
        lock(&self.fields).remove(&Self::key(namespace, entity, field));
        Ok(())
    }

    async fn list_entities(&self, namespace: &str) -> Result<Vec<String>> {
        let namespace = namespace.to_lowercase();
        let entities: BTreeSet<String> = lock(&self.fields)
            .keys()
            .filter(|(ns, _, _)| *ns == namespace)
            .map(|(_, entity, _)| entity.clone())
            .collect();
        Ok(entities.into_iter().collect())
    }
}

// ============================================================================
// Files
// ============================================================================

/// File tree held in memory. Cache directory is `/cache`, data directory
/// `/data`.
#[derive(Default)]
pub struct InMemoryFileSystem {
    files: Mutex<BTreeMap<PathBuf, Bytes>>,
    dirs: Mutex<BTreeSet<PathBuf>>,
}

impl InMemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(&self, path: &Path) -> Option<Bytes> {
        lock(&self.files).get(path).cloned()
    }

    pub fn put(&self, path: &Path, data: &[u8]) {
        lock(&self.files).insert(path.to_path_buf(), Bytes::copy_from_slice(data));
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        lock(&self.files).keys().cloned().collect()
    }

    fn not_found(path: &Path) -> BridgeError {
        BridgeError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} does not exist", path.display()),
        ))
    }
}

#[async_trait]
impl FileSystemAccess for InMemoryFileSystem {
    async fn get_cache_directory(&self) -> Result<PathBuf> {
        Ok(PathBuf::from("/cache"))
    }

    async fn get_data_directory(&self) -> Result<PathBuf> {
        Ok(PathBuf::from("/data"))
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(lock(&self.files).contains_key(path) || lock(&self.dirs).contains(path))
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        let mut dirs = lock(&self.dirs);
        for ancestor in path.ancestors() {
            if !ancestor.as_os_str().is_empty() {
                dirs.insert(ancestor.to_path_buf());
            }
        }
        Ok(())
    }

    async fn read_file(&self, path: &Path) -> Result<Bytes> {
        self.file(path).ok_or_else(|| Self::not_found(path))
    }

    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()> {
        lock(&self.files).insert(path.to_path_buf(), data);
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        lock(&self.files)
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| Self::not_found(path))
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let mut files = lock(&self.files);
        let data = files.remove(from).ok_or_else(|| Self::not_found(from))?;
        files.insert(to.to_path_buf(), data);
        Ok(())
    }

    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let files = lock(&self.files);
        let dirs = lock(&self.dirs);
        let children: BTreeSet<PathBuf> = files
            .keys()
            .chain(dirs.iter())
            .filter(|candidate| candidate.parent() == Some(path))
            .cloned()
            .collect();
        Ok(children.into_iter().collect())
    }
}

/// "Converts" by copying bytes inside an [`InMemoryFileSystem`].
pub struct CopyConverter {
    fs: Arc<InMemoryFileSystem>,
    conversions: AtomicU64,
}

impl CopyConverter {
    pub fn new(fs: Arc<InMemoryFileSystem>) -> Self {
        Self {
            fs,
            conversions: AtomicU64::new(0),
        }
    }

    pub fn conversions(&self) -> u64 {
        self.conversions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageConverter for CopyConverter {
    async fn convert(&self, source: &Path, target: &Path) -> Result<()> {
        let data = self.fs.read_file(source).await?;
        self.fs.write_file(target, data).await?;
        self.conversions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Local project
// ============================================================================

#[derive(Debug, Clone)]
struct CatalogShot {
    name: String,
    hidden: bool,
    range: Option<FrameRange>,
}

#[derive(Default)]
struct CatalogState {
    shots: Vec<CatalogShot>,
    assets: Vec<LocalAsset>,
}

/// Local project kept in memory. Enumeration follows insertion order.
#[derive(Default)]
pub struct InMemoryCatalog {
    state: Mutex<CatalogState>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shot(self, name: &str, range: Option<FrameRange>) -> Self {
        lock(&self.state).shots.push(CatalogShot {
            name: name.to_string(),
            hidden: false,
            range,
        });
        self
    }

    pub fn with_asset(self, asset: LocalAsset) -> Self {
        lock(&self.state).assets.push(asset);
        self
    }

    pub fn is_hidden(&self, name: &str) -> bool {
        lock(&self.state)
            .shots
            .iter()
            .any(|shot| shot.name == name && shot.hidden)
    }

    pub fn asset(&self, name: &str) -> Option<LocalAsset> {
        lock(&self.state)
            .assets
            .iter()
            .find(|asset| asset.name == name)
            .cloned()
    }
}

#[async_trait]
impl LocalCatalog for InMemoryCatalog {
    async fn list_shots(&self) -> Result<Vec<String>> {
        Ok(lock(&self.state)
            .shots
            .iter()
            .filter(|shot| !shot.hidden)
            .map(|shot| shot.name.clone())
            .collect())
    }

    async fn shot_exists(&self, name: &str) -> Result<bool> {
        Ok(lock(&self.state)
            .shots
            .iter()
            .any(|shot| shot.name == name && !shot.hidden))
    }

    async fn create_shot(&self, name: &str) -> Result<()> {
        let mut state = lock(&self.state);
        if !state.shots.iter().any(|shot| shot.name == name && !shot.hidden) {
            state.shots.push(CatalogShot {
                name: name.to_string(),
                hidden: false,
                range: None,
            });
        }
        Ok(())
    }

    async fn hide_shot(&self, name: &str) -> Result<()> {
        let mut state = lock(&self.state);
        if state.shots.iter().any(|shot| shot.name == name && shot.hidden) {
            return Err(BridgeError::InvalidInput(format!(
                "shot {} is already hidden",
                name
            )));
        }
        let shot = state
            .shots
            .iter_mut()
            .find(|shot| shot.name == name && !shot.hidden)
            .ok_or_else(|| BridgeError::InvalidInput(format!("no local shot {}", name)))?;
        shot.hidden = true;
        Ok(())
    }

    async fn shot_range(&self, name: &str) -> Result<Option<FrameRange>> {
        Ok(lock(&self.state)
            .shots
            .iter()
            .find(|shot| shot.name == name && !shot.hidden)
            .and_then(|shot| shot.range))
    }

    async fn set_shot_range(&self, name: &str, range: FrameRange) -> Result<()> {
        let mut state = lock(&self.state);
        if state.shots.iter().any(|shot| shot.name == name && shot.hidden) {
            return Err(BridgeError::InvalidInput(format!(
                "shot {} is already hidden",
                name
            )));
        }
        let shot = state
            .shots
            .iter_mut()
            .find(|shot| shot.name == name && !shot.hidden)
            .ok_or_else(|| BridgeError::InvalidInput(format!("no local shot {}", name)))?;
        shot.range = Some(range);
        Ok(())
    }

    async fn list_assets(&self) -> Result<Vec<LocalAsset>> {
        Ok(lock(&self.state).assets.clone())
    }

    async fn asset_exists(&self, asset_type: &str, name: &str) -> Result<bool> {
        Ok(lock(&self.state)
            .assets
            .iter()
            .any(|asset| asset.asset_type == asset_type && asset.name == name))
    }

    async fn create_asset(&self, asset_type: &str, name: &str) -> Result<()> {
        let mut state = lock(&self.state);
        if !state
            .assets
            .iter()
            .any(|asset| asset.asset_type == asset_type && asset.name == name)
        {
            state.assets.push(LocalAsset::new(asset_type, name));
        }
        Ok(())
    }

    async fn asset_description(&self, name: &str) -> Result<Option<String>> {
        Ok(lock(&self.state)
            .assets
            .iter()
            .find(|asset| asset.name == name)
            .and_then(|asset| asset.description.clone()))
    }

    async fn set_asset_description(&self, name: &str, description: &str) -> Result<()> {
        let mut state = lock(&self.state);
        let asset = state
            .assets
            .iter_mut()
            .find(|asset| asset.name == name)
            .ok_or_else(|| BridgeError::InvalidInput(format!("no local asset {}", name)))?;
        asset.description = Some(description.to_string());
        Ok(())
    }
}
