//! # Thumbnail Cache
//!
//! Keeps `<root>/<Shotinfo|Assetinfo>/<name>_preview.jpg` in line with the
//! tracker's main preview, using the stored `thumbnailID` to skip downloads
//! that already happened.
//!
//! | Stored ID | Remote ID | Action                                   |
//! |-----------|-----------|------------------------------------------|
//! | same      | same      | nothing                                  |
//! | any       | none      | delete cached image, clear stored ID      |
//! | other     | some      | download, convert to jpg, store new ID    |

use crate::error::Result;
use crate::records::{LocalRecords, RecordScope};
use bridge_traits::entity::EntityClient;
use bridge_traits::image::ImageConverter;
use bridge_traits::storage::FileSystemAccess;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const CANONICAL_EXTENSION: &str = "jpg";
/// Kitsu renders thumbnails as png when the preview record does not say.
const FALLBACK_EXTENSION: &str = "png";
const CACHE_SUBDIR: &str = "thumbnails";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThumbnailChange {
    Unchanged,
    /// No cached image existed before. Holds the preview file ID.
    Created(String),
    /// A cached image was replaced. Holds the preview file ID.
    Updated(String),
    Removed,
}

impl ThumbnailChange {
    pub fn is_change(&self) -> bool {
        !matches!(self, ThumbnailChange::Unchanged)
    }
}

#[derive(Clone)]
pub struct ThumbnailCache {
    fs: Arc<dyn FileSystemAccess>,
    converter: Arc<dyn ImageConverter>,
    records: LocalRecords,
    root: Option<PathBuf>,
}

impl ThumbnailCache {
    /// `root` defaults to `<cache dir>/thumbnails` of the file system.
    pub fn new(
        fs: Arc<dyn FileSystemAccess>,
        converter: Arc<dyn ImageConverter>,
        records: LocalRecords,
        root: Option<PathBuf>,
    ) -> Self {
        Self {
            fs,
            converter,
            records,
            root,
        }
    }

    pub async fn root(&self) -> Result<PathBuf> {
        match &self.root {
            Some(root) => Ok(root.clone()),
            None => Ok(self.fs.get_cache_directory().await?.join(CACHE_SUBDIR)),
        }
    }

    pub async fn preview_path(&self, scope: RecordScope, name: &str) -> Result<PathBuf> {
        Ok(self
            .root()
            .await?
            .join(scope.cache_folder())
            .join(format!("{}_preview.{}", name, CANONICAL_EXTENSION)))
    }

    /// Bring the cached image for `name` in line with `remote_preview_id`.
    #[instrument(skip(self, client))]
    pub async fn diff(
        &self,
        client: &dyn EntityClient,
        scope: RecordScope,
        name: &str,
        remote_preview_id: Option<&str>,
    ) -> Result<ThumbnailChange> {
        let stored = self.records.thumbnail_id(scope, name).await?;
        if stored.as_deref() == remote_preview_id {
            return Ok(ThumbnailChange::Unchanged);
        }

        let target = self.preview_path(scope, name).await?;

        let Some(preview_id) = remote_preview_id else {
            self.remove_cached(scope, name).await?;
            info!("Thumbnail removed on Kitsu, cleared cache");
            return Ok(ThumbnailChange::Removed);
        };

        let existed = self.fs.exists(&target).await?;

        let preview = client.get_preview_file(preview_id).await?;
        let extension = preview
            .extension
            .as_deref()
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| FALLBACK_EXTENSION.to_string());

        if let Some(folder) = target.parent() {
            self.fs.create_dir_all(folder).await?;
        }

        let data = client.download_preview_thumbnail(preview_id).await?;
        if extension == CANONICAL_EXTENSION || extension == "jpeg" {
            self.fs.write_file(&target, data).await?;
        } else {
            let intermediate = target.with_extension(&extension);
            self.fs.write_file(&intermediate, data).await?;
            let converted = self.converter.convert(&intermediate, &target).await;
            if let Err(e) = self.fs.delete_file(&intermediate).await {
                warn!(
                    path = %intermediate.display(),
                    error = %e,
                    "Failed to delete downloaded thumbnail"
                );
            }
            converted?;
            debug!(from = %extension, "Converted thumbnail to jpg");
        }

        self.records
            .remember_thumbnail(scope, name, preview_id)
            .await?;

        if existed {
            info!(preview_id, "Thumbnail updated");
            Ok(ThumbnailChange::Updated(preview_id.to_string()))
        } else {
            info!(preview_id, "Thumbnail cached");
            Ok(ThumbnailChange::Created(preview_id.to_string()))
        }
    }

    /// Delete the cached image, if any, and clear the stored preview ID.
    pub async fn remove_cached(&self, scope: RecordScope, name: &str) -> Result<()> {
        let target = self.preview_path(scope, name).await?;
        if self.fs.exists(&target).await? {
            self.fs.delete_file(&target).await?;
        }
        self.records.forget_thumbnail(scope, name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::entity::{FrameRange, ProductionType};
    use bridge_traits::testing::{
        CopyConverter, InMemoryFileSystem, InMemoryKitsu, InMemoryMetadataStore,
    };
    use std::path::Path;

    struct Fixture {
        tracker: InMemoryKitsu,
        fs: Arc<InMemoryFileSystem>,
        converter: Arc<CopyConverter>,
        records: LocalRecords,
        cache: ThumbnailCache,
    }

    fn fixture() -> Fixture {
        let tracker = InMemoryKitsu::new().signed_in();
        let fs = Arc::new(InMemoryFileSystem::new());
        let converter = Arc::new(CopyConverter::new(fs.clone()));
        let records = LocalRecords::new(Arc::new(InMemoryMetadataStore::new()));
        let cache = ThumbnailCache::new(
            fs.clone(),
            converter.clone(),
            records.clone(),
            Some(PathBuf::from("/project")),
        );
        Fixture {
            tracker,
            fs,
            converter,
            records,
            cache,
        }
    }

    const TARGET: &str = "/project/Shotinfo/SQ01-SH010_preview.jpg";

    #[tokio::test]
    async fn test_same_preview_is_not_downloaded_twice() {
        let f = fixture();
        let preview = f.tracker.add_preview("png", b"png-bytes");

        let first = f
            .cache
            .diff(&f.tracker, RecordScope::Shots, "SQ01-SH010", Some(&preview.id))
            .await
            .unwrap();
        assert_eq!(first, ThumbnailChange::Created(preview.id.clone()));

        let second = f
            .cache
            .diff(&f.tracker, RecordScope::Shots, "SQ01-SH010", Some(&preview.id))
            .await
            .unwrap();
        assert_eq!(second, ThumbnailChange::Unchanged);
        assert_eq!(f.tracker.call_count("download_preview_thumbnail"), 1);
    }

    #[tokio::test]
    async fn test_png_is_converted_and_intermediate_removed() {
        let f = fixture();
        let preview = f.tracker.add_preview("png", b"png-bytes");

        f.cache
            .diff(&f.tracker, RecordScope::Shots, "SQ01-SH010", Some(&preview.id))
            .await
            .unwrap();

        assert_eq!(f.converter.conversions(), 1);
        assert_eq!(
            f.fs.file(Path::new(TARGET)).as_deref(),
            Some(&b"png-bytes"[..])
        );
        assert!(f
            .fs
            .file(Path::new("/project/Shotinfo/SQ01-SH010_preview.png"))
            .is_none());
        assert_eq!(
            f.records
                .thumbnail_id(RecordScope::Shots, "SQ01-SH010")
                .await
                .unwrap(),
            Some(preview.id)
        );
    }

    #[tokio::test]
    async fn test_jpg_is_written_directly() {
        let f = fixture();
        let preview = f.tracker.add_preview("jpg", b"jpg-bytes");

        f.cache
            .diff(&f.tracker, RecordScope::Assets, "Chair", Some(&preview.id))
            .await
            .unwrap();

        assert_eq!(f.converter.conversions(), 0);
        assert!(f
            .fs
            .file(Path::new("/project/Assetinfo/Chair_preview.jpg"))
            .is_some());
    }

    #[tokio::test]
    async fn test_new_preview_replaces_cached_image() {
        let f = fixture();
        let old = f.tracker.add_preview("jpg", b"old");
        let new = f.tracker.add_preview("jpg", b"new");

        f.cache
            .diff(&f.tracker, RecordScope::Shots, "SQ01-SH010", Some(&old.id))
            .await
            .unwrap();
        let change = f
            .cache
            .diff(&f.tracker, RecordScope::Shots, "SQ01-SH010", Some(&new.id))
            .await
            .unwrap();

        assert_eq!(change, ThumbnailChange::Updated(new.id.clone()));
        assert_eq!(f.fs.file(Path::new(TARGET)).as_deref(), Some(&b"new"[..]));
    }

    #[tokio::test]
    async fn test_removed_preview_clears_cache_and_record() {
        let f = fixture();
        let preview = f.tracker.add_preview("jpg", b"jpg-bytes");
        f.cache
            .diff(&f.tracker, RecordScope::Shots, "SQ01-SH010", Some(&preview.id))
            .await
            .unwrap();

        let change = f
            .cache
            .diff(&f.tracker, RecordScope::Shots, "SQ01-SH010", None)
            .await
            .unwrap();

        assert_eq!(change, ThumbnailChange::Removed);
        assert!(f.fs.file(Path::new(TARGET)).is_none());
        assert!(f
            .records
            .thumbnail_id(RecordScope::Shots, "SQ01-SH010")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_no_preview_anywhere_is_unchanged() {
        let f = fixture();
        let project = f.tracker.add_project("Ghibli", ProductionType::Short);
        let sequence = f.tracker.add_sequence(&project, None, "SQ01");
        let shot = f
            .tracker
            .add_shot(&sequence, "SH010", Some(FrameRange::new(1, 10).unwrap()));

        let change = f
            .cache
            .diff(
                &f.tracker,
                RecordScope::Shots,
                "SQ01-SH010",
                shot.preview_file_id.as_deref(),
            )
            .await
            .unwrap();

        assert_eq!(change, ThumbnailChange::Unchanged);
        assert!(f.tracker.calls().is_empty());
    }

    #[tokio::test]
    async fn test_default_root_is_under_cache_directory() {
        let fs = Arc::new(InMemoryFileSystem::new());
        let cache = ThumbnailCache::new(
            fs.clone(),
            Arc::new(CopyConverter::new(fs)),
            LocalRecords::new(Arc::new(InMemoryMetadataStore::new())),
            None,
        );
        assert_eq!(
            cache
                .preview_path(RecordScope::Assets, "Chair")
                .await
                .unwrap(),
            PathBuf::from("/cache/thumbnails/Assetinfo/Chair_preview.jpg")
        );
    }
}
