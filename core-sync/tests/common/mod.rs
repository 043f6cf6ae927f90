//! Shared harness: an in-memory tracker, host stores and a local catalog
//! wired together the way a host application does it.

#![allow(dead_code)]

use bridge_traits::catalog::LocalCatalog;
use bridge_traits::entity::{ProductionType, Project};
use bridge_traits::testing::{
    CopyConverter, InMemoryCatalog, InMemoryFileSystem, InMemoryKitsu, InMemoryKitsuFactory,
    InMemoryMetadataStore, InMemorySecureStore, InMemorySettingsStore, OfflineHttpClient,
};
use core_auth::{SessionManager, SyncSession};
use core_runtime::config::{CoreConfig, KitsuSettings, ShotUpdatePolicy};
use core_runtime::events::{CoreEvent, EventBus};
use core_sync::SyncCoordinator;
use std::sync::Arc;
use tokio::sync::broadcast::Receiver;

pub const USER: &str = "ana@studio.test";
pub const PASSWORD: &str = "secret";
pub const PROJECT: &str = "Ghibli";

pub struct Harness {
    pub tracker: Arc<InMemoryKitsu>,
    pub project: Project,
    pub settings: Arc<InMemorySettingsStore>,
    pub metadata: Arc<InMemoryMetadataStore>,
    pub fs: Arc<InMemoryFileSystem>,
    pub catalog: Arc<InMemoryCatalog>,
    pub bus: EventBus,
    pub config: CoreConfig,
    pub sessions: SessionManager,
}

pub struct Options {
    pub production_type: ProductionType,
    pub policy: ShotUpdatePolicy,
    pub settings: KitsuSettings,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            production_type: ProductionType::FeatureFilm,
            policy: ShotUpdatePolicy::WhenChanged,
            settings: KitsuSettings::new("https://kitsu.studio.test", PROJECT, USER),
        }
    }
}

impl Harness {
    pub async fn new(catalog: InMemoryCatalog) -> Self {
        Self::with_options(catalog, Options::default()).await
    }

    pub async fn tv_show(catalog: InMemoryCatalog) -> Self {
        Self::with_options(
            catalog,
            Options {
                production_type: ProductionType::TvShow,
                ..Options::default()
            },
        )
        .await
    }

    pub async fn with_options(catalog: InMemoryCatalog, options: Options) -> Self {
        let tracker = Arc::new(InMemoryKitsu::new());
        let project = tracker.add_project(PROJECT, options.production_type);

        let settings = Arc::new(InMemorySettingsStore::new());
        options.settings.save(settings.as_ref()).await.unwrap();
        let metadata = Arc::new(InMemoryMetadataStore::new());
        let fs = Arc::new(InMemoryFileSystem::new());

        let config = CoreConfig::builder()
            .settings_store(settings.clone())
            .secure_store(Arc::new(InMemorySecureStore::new()))
            .metadata_store(metadata.clone())
            .http_client(Arc::new(OfflineHttpClient))
            .file_system(fs.clone())
            .image_converter(Arc::new(CopyConverter::new(fs.clone())))
            .shot_update_policy(options.policy)
            .thumbnail_cache_root("/project/thumbnails")
            .build()
            .unwrap();

        let bus = EventBus::new(256);
        let sessions = SessionManager::from_config(
            &config,
            Arc::new(InMemoryKitsuFactory::new(tracker.clone())),
            bus.clone(),
        );
        sessions
            .credentials()
            .store_password(USER, PASSWORD)
            .await
            .unwrap();

        Self {
            tracker,
            project,
            settings,
            metadata,
            fs,
            catalog: Arc::new(catalog),
            bus,
            config,
            sessions,
        }
    }

    pub fn coordinator(&self) -> SyncCoordinator {
        let catalog: Arc<dyn LocalCatalog> = self.catalog.clone();
        SyncCoordinator::new(&self.config, catalog, self.bus.clone())
    }

    pub async fn session(&self) -> SyncSession {
        self.sessions.session().await.unwrap()
    }

    pub fn events(&self) -> Receiver<CoreEvent> {
        self.bus.subscribe()
    }
}

/// Every event currently queued on `receiver`.
pub fn drain(receiver: &mut Receiver<CoreEvent>) -> Vec<CoreEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

pub fn names(list: &[String]) -> Vec<&str> {
    let mut names: Vec<&str> = list.iter().map(String::as_str).collect();
    names.sort();
    names
}
