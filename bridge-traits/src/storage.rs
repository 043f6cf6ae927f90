//! Storage abstractions: files, preferences, credentials and per-entity
//! pipeline metadata.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// File system access for the thumbnail cache and local project folders.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::FileSystemAccess;
///
/// async fn cache_preview(fs: &dyn FileSystemAccess, data: Bytes) -> Result<()> {
///     let dir = fs.get_cache_directory().await?.join("Shotinfo");
///     fs.create_dir_all(&dir).await?;
///     fs.write_file(&dir.join("sq010-sh020_preview.jpg"), data).await
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    /// Directory for regenerable files such as downloaded previews.
    async fn get_cache_directory(&self) -> Result<PathBuf>;

    async fn get_data_directory(&self) -> Result<PathBuf>;

    async fn exists(&self, path: &Path) -> Result<bool>;

    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    async fn read_file(&self, path: &Path) -> Result<Bytes>;

    /// Write data to a file, replacing any previous contents.
    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()>;

    async fn delete_file(&self, path: &Path) -> Result<()>;

    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Immediate children of a directory.
    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>>;
}

/// Credential storage backed by the OS keychain.
///
/// Values are opaque bytes. Implementations must never log them.
#[async_trait]
pub trait SecureStore: Send + Sync {
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()>;

    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Removing an absent key is not an error.
    async fn delete_secret(&self, key: &str) -> Result<()>;

    async fn has_secret(&self, key: &str) -> Result<bool> {
        Ok(self.get_secret(key).await?.is_some())
    }

    async fn clear_all(&self) -> Result<()>;
}

/// Typed key-value preferences (site URL, project name, sync toggles).
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    async fn set_bool(&self, key: &str, value: bool) -> Result<()>;

    async fn get_bool(&self, key: &str) -> Result<Option<bool>>;

    async fn set_i64(&self, key: &str, value: i64) -> Result<()>;

    async fn get_i64(&self, key: &str) -> Result<Option<i64>>;

    async fn delete(&self, key: &str) -> Result<()>;

    async fn has_key(&self, key: &str) -> Result<bool>;

    async fn list_keys(&self) -> Result<Vec<String>>;

    async fn clear_all(&self) -> Result<()>;
}

/// Per-entity string fields kept by the pipeline tool.
///
/// Addressed by `(namespace, entity, field)`, where the namespace groups
/// one kind of entity (`shotinfo`, `assetinfo`). Namespaces are compared
/// case-insensitively; implementations store them lowercased.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get_field(&self, namespace: &str, entity: &str, field: &str)
        -> Result<Option<String>>;

    async fn set_field(&self, namespace: &str, entity: &str, field: &str, value: &str)
        -> Result<()>;

    /// Deleting an absent field is not an error.
    async fn delete_field(&self, namespace: &str, entity: &str, field: &str) -> Result<()>;

    /// Entities that have at least one field in `namespace`.
    async fn list_entities(&self, namespace: &str) -> Result<Vec<String>>;
}
