//! File System Access Implementation using Tokio

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::FileSystemAccess,
};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

const APP_DIR: &str = "prism-kitsu";

/// `tokio::fs` implementation of [`FileSystemAccess`]
///
/// Cache and data directories default to the platform locations from the
/// `dirs` crate and are created on first use.
pub struct TokioFileSystem {
    cache_dir: PathBuf,
    data_dir: PathBuf,
}

impl TokioFileSystem {
    pub fn new() -> Self {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(APP_DIR);

        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".local")
                    .join("share")
            })
            .join(APP_DIR);

        Self { cache_dir, data_dir }
    }

    pub fn with_directories(cache_dir: PathBuf, data_dir: PathBuf) -> Self {
        Self { cache_dir, data_dir }
    }

    async fn ensure_dir(path: &Path) -> Result<PathBuf> {
        if fs::metadata(path).await.is_err() {
            fs::create_dir_all(path).await.map_err(BridgeError::Io)?;
            debug!(path = ?path, "Created directory");
        }
        Ok(path.to_path_buf())
    }
}

impl Default for TokioFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileSystemAccess for TokioFileSystem {
    async fn get_cache_directory(&self) -> Result<PathBuf> {
        Self::ensure_dir(&self.cache_dir).await
    }

    async fn get_data_directory(&self) -> Result<PathBuf> {
        Self::ensure_dir(&self.data_dir).await
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(fs::try_exists(path).await.unwrap_or(false))
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).await.map_err(BridgeError::Io)
    }

    async fn read_file(&self, path: &Path) -> Result<Bytes> {
        let data = fs::read(path).await.map_err(BridgeError::Io)?;
        Ok(Bytes::from(data))
    }

    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(BridgeError::Io)?;
        }

        let mut file = fs::File::create(path).await.map_err(BridgeError::Io)?;
        file.write_all(&data).await.map_err(BridgeError::Io)?;
        file.flush().await.map_err(BridgeError::Io)?;

        debug!(path = ?path, size = data.len(), "Wrote file");
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).await.map_err(BridgeError::Io)?;
        debug!(path = ?path, "Deleted file");
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to).await.map_err(BridgeError::Io)
    }

    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(path).await.map_err(BridgeError::Io)?;

        while let Some(entry) = dir.next_entry().await.map_err(BridgeError::Io)? {
            entries.push(entry.path());
        }
        entries.sort();
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_fs() -> (tempfile::TempDir, TokioFileSystem) {
        let dir = tempfile::tempdir().unwrap();
        let fs =
            TokioFileSystem::with_directories(dir.path().join("cache"), dir.path().join("data"));
        (dir, fs)
    }

    #[tokio::test]
    async fn test_cache_directory_is_created() {
        let (_dir, fs) = temp_fs();
        let cache = fs.get_cache_directory().await.unwrap();
        assert!(fs.exists(&cache).await.unwrap());
    }

    #[tokio::test]
    async fn test_write_read_delete() {
        let (dir, fs) = temp_fs();
        let path = dir.path().join("Shotinfo").join("sq010-sh020_preview.jpg");

        fs.write_file(&path, Bytes::from_static(b"jpeg")).await.unwrap();
        assert_eq!(fs.read_file(&path).await.unwrap(), Bytes::from_static(b"jpeg"));

        fs.delete_file(&path).await.unwrap();
        assert!(!fs.exists(&path).await.unwrap());
    }

    #[tokio::test]
    async fn test_rename_and_list() {
        let (dir, fs) = temp_fs();
        let shots = dir.path().join("Shots");
        fs.create_dir_all(&shots.join("sq010-sh010")).await.unwrap();
        fs.create_dir_all(&shots.join("sq010-sh020")).await.unwrap();

        fs.rename(&shots.join("sq010-sh020"), &shots.join("_sq010-sh020"))
            .await
            .unwrap();

        let names: Vec<String> = fs
            .list_directory(&shots)
            .await
            .unwrap()
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
            .collect();
        assert_eq!(names, vec!["_sq010-sh020", "sq010-sh010"]);
    }
}
