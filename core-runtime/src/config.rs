//! # Configuration
//!
//! Two layers:
//!
//! - [`KitsuSettings`]: the user-editable tracker settings (site, project,
//!   user, sync toggles). Stored in the host [`SettingsStore`] under the
//!   `kitsu.` prefix and re-read before every connection so edits made
//!   between passes take effect.
//! - [`CoreConfig`]: the set of bridges the engine runs on, gathered with a
//!   builder that fails fast when something required is missing.
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .data_dir("/home/ana/.local/share/prism-kitsu")
//!     .metadata_store(project_metadata)
//!     .build()?;
//!
//! let settings = KitsuSettings::load(config.settings_store.as_ref()).await?;
//! ```
//!
//! With the `desktop-shims` feature, absent stores, HTTP client, file system
//! and image converter are replaced by the `bridge-desktop` implementations.
//! Without it, every bridge has to be injected and the builder reports the
//! first missing one as [`Error::CapabilityMissing`].

use crate::error::{Error, Result};
use bridge_traits::{
    FileSystemAccess, HttpClient, ImageConverter, MetadataStore, SecureStore, SettingsStore,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Settings keys.
pub mod keys {
    pub const SITE: &str = "kitsu.site";
    pub const PROJECT_NAME: &str = "kitsu.projectname";
    pub const USERNAME: &str = "kitsu.username";
    pub const USER_SYNC: &str = "kitsu.usersync";
    pub const IGNORE_POST_CHECKS: &str = "kitsu.ignorepostchecks";
    pub const SET_FIRST_FRAME_ONE: &str = "kitsu.setfirstframeone";
    pub const PUBLISH_ON_PLAYBLAST: &str = "kitsu.publishonplayblast";
    pub const PUBLISH_STATUS: &str = "kitsu.publishstatus";
}

// ============================================================================
// Tracker settings
// ============================================================================

/// Tracker settings for one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KitsuSettings {
    /// Base URL of the Kitsu site, without the `/api` suffix.
    pub site: String,
    pub project_name: String,
    /// Login email.
    pub username: String,
    /// Only list entities assigned to the logged in user.
    pub user_sync: bool,
    /// Skip the local-only/remote-only checks after a pass.
    pub ignore_post_checks: bool,
    /// Remote shots carrying only `nb_frames` start at frame 1 instead of 0.
    pub set_first_frame_one: bool,
    pub publish_on_playblast: bool,
    /// Task status short name used when publishing previews.
    pub publish_status: Option<String>,
}

impl KitsuSettings {
    pub fn new(
        site: impl Into<String>,
        project_name: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            site: site.into(),
            project_name: project_name.into(),
            username: username.into(),
            user_sync: false,
            ignore_post_checks: false,
            set_first_frame_one: false,
            publish_on_playblast: false,
            publish_status: None,
        }
    }

    /// Reads the settings. Missing or blank site, project or username is a
    /// configuration error naming the key.
    pub async fn load(store: &dyn SettingsStore) -> Result<Self> {
        let site = required_string(store, keys::SITE).await?;
        let project_name = required_string(store, keys::PROJECT_NAME).await?;
        let username = required_string(store, keys::USERNAME).await?;

        let publish_status = optional_string(store, keys::PUBLISH_STATUS)
            .await?
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(Self {
            site: site.trim_end_matches('/').to_string(),
            project_name,
            username,
            user_sync: flag(store, keys::USER_SYNC).await?,
            ignore_post_checks: flag(store, keys::IGNORE_POST_CHECKS).await?,
            set_first_frame_one: flag(store, keys::SET_FIRST_FRAME_ONE).await?,
            publish_on_playblast: flag(store, keys::PUBLISH_ON_PLAYBLAST).await?,
            publish_status,
        })
    }

    pub async fn save(&self, store: &dyn SettingsStore) -> Result<()> {
        store.set_string(keys::SITE, &self.site).await?;
        store
            .set_string(keys::PROJECT_NAME, &self.project_name)
            .await?;
        store.set_string(keys::USERNAME, &self.username).await?;
        store.set_bool(keys::USER_SYNC, self.user_sync).await?;
        store
            .set_bool(keys::IGNORE_POST_CHECKS, self.ignore_post_checks)
            .await?;
        store
            .set_bool(keys::SET_FIRST_FRAME_ONE, self.set_first_frame_one)
            .await?;
        store
            .set_bool(keys::PUBLISH_ON_PLAYBLAST, self.publish_on_playblast)
            .await?;
        match &self.publish_status {
            Some(status) => store.set_string(keys::PUBLISH_STATUS, status).await?,
            None => store.delete(keys::PUBLISH_STATUS).await?,
        }
        Ok(())
    }

    /// Frame the first frame of a range lands on when the tracker only knows
    /// the frame count.
    pub fn first_frame(&self) -> i64 {
        if self.set_first_frame_one {
            1
        } else {
            0
        }
    }
}

async fn optional_string(store: &dyn SettingsStore, key: &str) -> Result<Option<String>> {
    Ok(store.get_string(key).await?)
}

async fn required_string(store: &dyn SettingsStore, key: &str) -> Result<String> {
    optional_string(store, key)
        .await?
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| Error::MissingSetting {
            key: key.to_string(),
        })
}

async fn flag(store: &dyn SettingsStore, key: &str) -> Result<bool> {
    Ok(store.get_bool(key).await?.unwrap_or(false))
}

// ============================================================================
// Sync options
// ============================================================================

/// What to do when a pushed shot already exists on the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ShotUpdatePolicy {
    /// Write only when the supplied range differs from the stored one.
    #[default]
    WhenChanged,
    /// Write whenever a range is supplied.
    Always,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOptions {
    pub shot_update_policy: ShotUpdatePolicy,
    /// Where `Shotinfo/` and `Assetinfo/` thumbnails are cached. `None` uses
    /// the file system's cache directory.
    pub thumbnail_cache_root: Option<PathBuf>,
}

// ============================================================================
// Core configuration
// ============================================================================

/// Bridges and options shared by every session and pass.
#[derive(Clone)]
pub struct CoreConfig {
    pub settings_store: Arc<dyn SettingsStore>,
    /// Holds the tracker password.
    pub secure_store: Arc<dyn SecureStore>,
    /// Per-entity local records (`shotinfo` / `assetinfo`).
    pub metadata_store: Arc<dyn MetadataStore>,
    pub http_client: Arc<dyn HttpClient>,
    pub file_system: Arc<dyn FileSystemAccess>,
    pub image_converter: Arc<dyn ImageConverter>,
    pub sync: SyncOptions,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("settings_store", &"SettingsStore { ... }")
            .field("secure_store", &"SecureStore { ... }")
            .field("metadata_store", &"MetadataStore { ... }")
            .field("http_client", &"HttpClient { ... }")
            .field("file_system", &"FileSystemAccess { ... }")
            .field("image_converter", &"ImageConverter { ... }")
            .field("sync", &self.sync)
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(root) = &self.sync.thumbnail_cache_root {
            if root.as_os_str().is_empty() {
                return Err(Error::Config(
                    "Thumbnail cache root cannot be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(feature = "desktop-shims")]
mod defaults {
    use super::*;
    use bridge_desktop::{
        ImageCrateConverter, KeyringSecureStore, ReqwestHttpClient, SqliteMetadataStore,
        SqliteSettingsStore, TokioFileSystem,
    };
    use std::future::Future;
    use std::thread;
    use tokio::runtime::{Builder, Handle};

    /// Runs an async initializer to completion from sync code, on a helper
    /// thread when the caller is already inside a Tokio runtime.
    fn block_on_init<F, Fut, T>(label: &'static str, init: F) -> Result<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = bridge_traits::error::Result<T>>,
        T: Send + 'static,
    {
        let run = move || -> Result<T> {
            let runtime = Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| Error::init(label, format!("runtime: {}", e)))?;
            runtime
                .block_on(init())
                .map_err(|e| Error::init(label, e))
        };

        match Handle::try_current() {
            Ok(_) => thread::spawn(run).join().map_err(|_| {
                Error::init(label, "worker thread panicked")
            })?,
            Err(_) => run(),
        }
    }

    fn require_data_dir<'a>(data_dir: Option<&'a Path>, label: &str) -> Result<&'a Path> {
        data_dir.ok_or_else(|| {
            Error::Config(format!(
                "Data directory is required to create the default {}. Use .data_dir() to set it.",
                label
            ))
        })
    }

    pub(super) fn secure_store() -> Result<Arc<dyn SecureStore>> {
        Ok(Arc::new(KeyringSecureStore::new()))
    }

    pub(super) fn settings_store(data_dir: Option<&Path>) -> Result<Arc<dyn SettingsStore>> {
        let path = require_data_dir(data_dir, "SettingsStore")?.join("settings.db");
        let store = block_on_init("SettingsStore", move || async move {
            SqliteSettingsStore::new(&path).await
        })?;
        Ok(Arc::new(store))
    }

    pub(super) fn metadata_store(data_dir: Option<&Path>) -> Result<Arc<dyn MetadataStore>> {
        let path = require_data_dir(data_dir, "MetadataStore")?.join("records.db");
        let store = block_on_init("MetadataStore", move || async move {
            SqliteMetadataStore::new(&path).await
        })?;
        Ok(Arc::new(store))
    }

    pub(super) fn http_client() -> Result<Arc<dyn HttpClient>> {
        let client = ReqwestHttpClient::new()
            .map_err(|e| Error::init("HttpClient", e))?;
        Ok(Arc::new(client))
    }

    pub(super) fn file_system() -> Result<Arc<dyn FileSystemAccess>> {
        Ok(Arc::new(TokioFileSystem::new()))
    }

    pub(super) fn image_converter() -> Result<Arc<dyn ImageConverter>> {
        Ok(Arc::new(ImageCrateConverter::new()))
    }
}

#[cfg(not(feature = "desktop-shims"))]
mod defaults {
    use super::*;

    const HINT: &str = "Enable the 'desktop-shims' feature or inject an implementation.";

    fn capability_missing(capability: &str, message: &str) -> Error {
        Error::CapabilityMissing {
            capability: capability.to_string(),
            message: message.to_string(),
        }
    }

    pub(super) fn secure_store() -> Result<Arc<dyn SecureStore>> {
        Err(capability_missing(
            "SecureStore",
            &format!("SecureStore is required to keep the tracker password. {}", HINT),
        ))
    }

    pub(super) fn settings_store(_data_dir: Option<&Path>) -> Result<Arc<dyn SettingsStore>> {
        Err(capability_missing(
            "SettingsStore",
            &format!("SettingsStore is required to read tracker settings. {}", HINT),
        ))
    }

    pub(super) fn metadata_store(_data_dir: Option<&Path>) -> Result<Arc<dyn MetadataStore>> {
        Err(capability_missing(
            "MetadataStore",
            &format!("MetadataStore is required for local records. {}", HINT),
        ))
    }

    pub(super) fn http_client() -> Result<Arc<dyn HttpClient>> {
        Err(capability_missing(
            "HttpClient",
            &format!("HttpClient is required to reach the tracker. {}", HINT),
        ))
    }

    pub(super) fn file_system() -> Result<Arc<dyn FileSystemAccess>> {
        Err(capability_missing(
            "FileSystemAccess",
            &format!("FileSystemAccess is required for the thumbnail cache. {}", HINT),
        ))
    }

    pub(super) fn image_converter() -> Result<Arc<dyn ImageConverter>> {
        Err(capability_missing(
            "ImageConverter",
            &format!("ImageConverter is required to cache previews. {}", HINT),
        ))
    }
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    data_dir: Option<PathBuf>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    secure_store: Option<Arc<dyn SecureStore>>,
    metadata_store: Option<Arc<dyn MetadataStore>>,
    http_client: Option<Arc<dyn HttpClient>>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
    image_converter: Option<Arc<dyn ImageConverter>>,
    sync: SyncOptions,
}

impl CoreConfigBuilder {
    /// Directory for the default SQLite stores. Only needed when a store is
    /// left to the desktop defaults.
    pub fn data_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.data_dir = Some(path.into());
        self
    }

    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    pub fn secure_store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.secure_store = Some(store);
        self
    }

    pub fn metadata_store(mut self, store: Arc<dyn MetadataStore>) -> Self {
        self.metadata_store = Some(store);
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn file_system(mut self, fs: Arc<dyn FileSystemAccess>) -> Self {
        self.file_system = Some(fs);
        self
    }

    pub fn image_converter(mut self, converter: Arc<dyn ImageConverter>) -> Self {
        self.image_converter = Some(converter);
        self
    }

    pub fn shot_update_policy(mut self, policy: ShotUpdatePolicy) -> Self {
        self.sync.shot_update_policy = policy;
        self
    }

    pub fn thumbnail_cache_root<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.sync.thumbnail_cache_root = Some(path.into());
        self
    }

    /// Builds the config, filling gaps with platform defaults where
    /// available.
    pub fn build(self) -> Result<CoreConfig> {
        let data_dir = self.data_dir.as_deref();

        let settings_store = match self.settings_store {
            Some(store) => store,
            None => defaults::settings_store(data_dir)?,
        };
        let secure_store = match self.secure_store {
            Some(store) => store,
            None => defaults::secure_store()?,
        };
        let metadata_store = match self.metadata_store {
            Some(store) => store,
            None => defaults::metadata_store(data_dir)?,
        };
        let http_client = match self.http_client {
            Some(client) => client,
            None => defaults::http_client()?,
        };
        let file_system = match self.file_system {
            Some(fs) => fs,
            None => defaults::file_system()?,
        };
        let image_converter = match self.image_converter {
            Some(converter) => converter,
            None => defaults::image_converter()?,
        };

        let config = CoreConfig {
            settings_store,
            secure_store,
            metadata_store,
            http_client,
            file_system,
            image_converter,
            sync: self.sync,
        };
        config.validate()?;
        Ok(config)
    }
}
