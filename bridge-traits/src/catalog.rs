//! The pipeline tool's view of local shots and assets.

use async_trait::async_trait;

use crate::entity::FrameRange;
use crate::error::Result;

/// An asset folder in the local project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalAsset {
    pub name: String,
    /// First folder under the asset root.
    pub asset_type: String,
    /// Folders between the type folder and the asset folder.
    pub subfolders: Vec<String>,
    pub description: Option<String>,
}

impl LocalAsset {
    pub fn new(asset_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            asset_type: asset_type.into(),
            subfolders: Vec::new(),
            description: None,
        }
    }

    /// Description sent to the tracker. Nested folders are kept visible by
    /// prefixing them: `props/small - A wooden chair`.
    pub fn remote_description(&self) -> Option<String> {
        let description = self
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty());
        if self.subfolders.is_empty() {
            return description.map(str::to_string);
        }
        let path = self.subfolders.join("/");
        Some(match description {
            Some(text) => format!("{} - {}", path, text),
            None => path,
        })
    }
}

/// Shots and assets as the pipeline tool sees them on disk.
///
/// Shot names use the pipeline's combined form: `seq-shot`, or
/// `episode.seq-shot` for TV shows.
#[async_trait]
pub trait LocalCatalog: Send + Sync {
    /// Visible shots. Hidden shots are excluded.
    async fn list_shots(&self) -> Result<Vec<String>>;

    async fn shot_exists(&self, name: &str) -> Result<bool>;

    async fn create_shot(&self, name: &str) -> Result<()>;

    /// Hide a shot from listings without deleting its files.
    async fn hide_shot(&self, name: &str) -> Result<()>;

    async fn shot_range(&self, name: &str) -> Result<Option<FrameRange>>;

    async fn set_shot_range(&self, name: &str, range: FrameRange) -> Result<()>;

    async fn list_assets(&self) -> Result<Vec<LocalAsset>>;

    async fn asset_exists(&self, asset_type: &str, name: &str) -> Result<bool>;

    async fn create_asset(&self, asset_type: &str, name: &str) -> Result<()>;

    async fn asset_description(&self, name: &str) -> Result<Option<String>>;

    async fn set_asset_description(&self, name: &str, description: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_asset_description() {
        let mut asset = LocalAsset::new("Props", "Chair");
        assert_eq!(asset.remote_description(), None);

        asset.description = Some("A wooden chair".to_string());
        assert_eq!(asset.remote_description().as_deref(), Some("A wooden chair"));
    }

    #[test]
    fn test_nested_asset_description_keeps_path() {
        let mut asset = LocalAsset::new("Props", "Chair");
        asset.subfolders = vec!["furniture".to_string(), "indoor".to_string()];
        assert_eq!(
            asset.remote_description().as_deref(),
            Some("furniture/indoor")
        );

        asset.description = Some("  A wooden chair ".to_string());
        assert_eq!(
            asset.remote_description().as_deref(),
            Some("furniture/indoor - A wooden chair")
        );
    }
}
