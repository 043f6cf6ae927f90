//! Folder-based local project catalog.
//!
//! Layout:
//!
//! ```text
//! <project>/Shots/<seq-shot>/            visible shot
//! <project>/Shots/_<seq-shot>/           hidden shot
//! <project>/Assets/<type>/[<sub>/...]<name>/Scenefiles/
//! ```
//!
//! Frame ranges and descriptions live in the metadata store under
//! `shotinfo` and `assetinfo`.

use async_trait::async_trait;
use bridge_traits::{
    catalog::{LocalAsset, LocalCatalog},
    entity::FrameRange,
    error::{BridgeError, Result},
    storage::{FileSystemAccess, MetadataStore},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const HIDDEN_PREFIX: &str = "_";
/// A folder holding this child is an asset; anything else is grouping.
const ASSET_MARKER: &str = "Scenefiles";
const MAX_ASSET_DEPTH: usize = 8;

const SHOT_NAMESPACE: &str = "shotinfo";
const ASSET_NAMESPACE: &str = "assetinfo";
const START_FIELD: &str = "startframe";
const END_FIELD: &str = "endframe";
const DESCRIPTION_FIELD: &str = "description";

pub struct FolderCatalog {
    shots_root: PathBuf,
    assets_root: PathBuf,
    fs: Arc<dyn FileSystemAccess>,
    metadata: Arc<dyn MetadataStore>,
}

impl FolderCatalog {
    /// Catalog rooted at `<project_root>/Shots` and `<project_root>/Assets`.
    pub fn new(
        project_root: &Path,
        fs: Arc<dyn FileSystemAccess>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        Self {
            shots_root: project_root.join("Shots"),
            assets_root: project_root.join("Assets"),
            fs,
            metadata,
        }
    }

    fn file_name(path: &Path) -> Option<String> {
        path.file_name().map(|n| n.to_string_lossy().to_string())
    }

    fn is_visible(name: &str) -> bool {
        !name.starts_with(HIDDEN_PREFIX) && !name.starts_with('.')
    }

    fn check_name(name: &str) -> Result<()> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(BridgeError::InvalidInput(format!(
                "not a valid folder name: {:?}",
                name
            )));
        }
        Ok(())
    }

    async fn children(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        if !self.fs.exists(dir).await? {
            return Ok(Vec::new());
        }
        self.fs.list_directory(dir).await
    }

    async fn parse_frame(&self, name: &str, field: &str) -> Result<Option<i64>> {
        Ok(self
            .metadata
            .get_field(SHOT_NAMESPACE, name, field)
            .await?
            .and_then(|raw| raw.trim().parse().ok()))
    }
}

#[async_trait]
impl LocalCatalog for FolderCatalog {
    async fn list_shots(&self) -> Result<Vec<String>> {
        let mut shots: Vec<String> = self
            .children(&self.shots_root)
            .await?
            .iter()
            .filter_map(|p| Self::file_name(p))
            .filter(|name| Self::is_visible(name))
            .collect();
        shots.sort();
        Ok(shots)
    }

    async fn shot_exists(&self, name: &str) -> Result<bool> {
        Self::check_name(name)?;
        self.fs.exists(&self.shots_root.join(name)).await
    }

    async fn create_shot(&self, name: &str) -> Result<()> {
        Self::check_name(name)?;
        self.fs.create_dir_all(&self.shots_root.join(name)).await?;
        info!(shot = name, "Created local shot");
        Ok(())
    }

    async fn hide_shot(&self, name: &str) -> Result<()> {
        Self::check_name(name)?;
        let hidden = self.shots_root.join(format!("{}{}", HIDDEN_PREFIX, name));
        if self.fs.exists(&hidden).await? {
            return Err(BridgeError::InvalidInput(format!(
                "Shot '{}' is already hidden",
                name
            )));
        }
        self.fs.rename(&self.shots_root.join(name), &hidden).await?;
        info!(shot = name, "Hid local shot");
        Ok(())
    }

    async fn shot_range(&self, name: &str) -> Result<Option<FrameRange>> {
        let start = self.parse_frame(name, START_FIELD).await?;
        let end = self.parse_frame(name, END_FIELD).await?;
        Ok(match (start, end) {
            (Some(start), Some(end)) => FrameRange::new(start, end).ok(),
            _ => None,
        })
    }

    async fn set_shot_range(&self, name: &str, range: FrameRange) -> Result<()> {
        self.metadata
            .set_field(SHOT_NAMESPACE, name, START_FIELD, &range.start().to_string())
            .await?;
        self.metadata
            .set_field(SHOT_NAMESPACE, name, END_FIELD, &range.end().to_string())
            .await?;
        debug!(shot = name, range = %range, "Stored shot range");
        Ok(())
    }

    async fn list_assets(&self) -> Result<Vec<LocalAsset>> {
        let mut assets = Vec::new();
        let mut pending: Vec<(PathBuf, Vec<String>)> = vec![(self.assets_root.clone(), Vec::new())];

        while let Some((dir, trail)) = pending.pop() {
            for child in self.children(&dir).await? {
                let Some(name) = Self::file_name(&child) else {
                    continue;
                };
                if !Self::is_visible(&name) || name == ASSET_MARKER {
                    continue;
                }

                if self.fs.exists(&child.join(ASSET_MARKER)).await? {
                    let mut folders = trail.clone();
                    let asset_type = if folders.is_empty() {
                        String::new()
                    } else {
                        folders.remove(0)
                    };
                    let description = self
                        .metadata
                        .get_field(ASSET_NAMESPACE, &name, DESCRIPTION_FIELD)
                        .await?;
                    assets.push(LocalAsset {
                        name,
                        asset_type,
                        subfolders: folders,
                        description,
                    });
                } else if trail.len() < MAX_ASSET_DEPTH {
                    let mut next = trail.clone();
                    next.push(name);
                    pending.push((child, next));
                }
            }
        }

        assets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(assets)
    }

    async fn asset_exists(&self, asset_type: &str, name: &str) -> Result<bool> {
        if self
            .fs
            .exists(&self.assets_root.join(asset_type).join(name))
            .await?
        {
            return Ok(true);
        }
        Ok(self.list_assets().await?.iter().any(|a| a.name == name))
    }

    async fn create_asset(&self, asset_type: &str, name: &str) -> Result<()> {
        Self::check_name(asset_type)?;
        Self::check_name(name)?;
        let dir = self.assets_root.join(asset_type).join(name);
        self.fs.create_dir_all(&dir.join(ASSET_MARKER)).await?;
        info!(asset = name, asset_type, "Created local asset");
        Ok(())
    }

    async fn asset_description(&self, name: &str) -> Result<Option<String>> {
        self.metadata
            .get_field(ASSET_NAMESPACE, name, DESCRIPTION_FIELD)
            .await
    }

    async fn set_asset_description(&self, name: &str, description: &str) -> Result<()> {
        self.metadata
            .set_field(ASSET_NAMESPACE, name, DESCRIPTION_FIELD, description)
            .await
    }
}
