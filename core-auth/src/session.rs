//! # Tracker Sessions
//!
//! A [`SyncSession`] is the authenticated context for one synchronization
//! pass: a logged-in client, the resolved project, the user and the settings
//! it was opened with. The [`SessionManager`] builds sessions from the
//! current settings and password, and invalidates every outstanding session
//! when credentials change.
//!
//! ## Flow
//!
//! ```text
//! settings + password ──> connect(site) ──> log_in ──> find_project ──> SyncSession
//!                                                                          │
//! update_credentials / invalidate ──> generation += 1 ──> ensure_valid() fails
//! ```
//!
//! [`SessionManager::session`] reloads the settings on every call and opens a
//! new session when they changed.
//!
//! ```ignore
//! let manager = SessionManager::from_config(&config, Arc::new(factory), event_bus);
//! let session = manager.session().await?;
//! coordinator.push_shots(&session, &names).await?;
//! ```

use crate::credentials::CredentialStore;
use crate::error::{AuthError, Result};
use bridge_traits::entity::{EntityClient, EntityClientFactory, ListScope, Person, Project};
use bridge_traits::storage::{SecureStore, SettingsStore};
use bridge_traits::BridgeError;
use core_runtime::config::{CoreConfig, KitsuSettings};
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, instrument, warn};

/// Authenticated context for one pass.
///
/// Cheap to clone. All clones share the validity flag of the manager that
/// opened them.
#[derive(Clone)]
pub struct SyncSession {
    client: Arc<dyn EntityClient>,
    project: Project,
    user: Person,
    settings: KitsuSettings,
    generation: u64,
    current_generation: Arc<AtomicU64>,
}

impl SyncSession {
    pub fn client(&self) -> &dyn EntityClient {
        self.client.as_ref()
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn user(&self) -> &Person {
        &self.user
    }

    pub fn settings(&self) -> &KitsuSettings {
        &self.settings
    }

    /// Listing scope implied by the `usersync` setting.
    pub fn list_scope(&self) -> ListScope {
        if self.settings.user_sync {
            ListScope::AssignedToMe
        } else {
            ListScope::Project
        }
    }

    pub fn is_valid(&self) -> bool {
        self.current_generation.load(Ordering::SeqCst) == self.generation
    }

    pub fn ensure_valid(&self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(AuthError::SessionInvalidated)
        }
    }
}

impl fmt::Debug for SyncSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncSession")
            .field("project", &self.project.name)
            .field("user", &self.user.id)
            .field("generation", &self.generation)
            .field("valid", &self.is_valid())
            .finish()
    }
}

/// Opens and invalidates tracker sessions.
pub struct SessionManager {
    factory: Arc<dyn EntityClientFactory>,
    credentials: CredentialStore,
    settings_store: Arc<dyn SettingsStore>,
    event_bus: EventBus,
    generation: Arc<AtomicU64>,
    current: RwLock<Option<SyncSession>>,
    /// Serializes `open` so concurrent callers share one login.
    open_lock: Mutex<()>,
}

impl SessionManager {
    pub fn new(
        factory: Arc<dyn EntityClientFactory>,
        secure_store: Arc<dyn SecureStore>,
        settings_store: Arc<dyn SettingsStore>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            factory,
            credentials: CredentialStore::new(secure_store),
            settings_store,
            event_bus,
            generation: Arc::new(AtomicU64::new(0)),
            current: RwLock::new(None),
            open_lock: Mutex::new(()),
        }
    }

    pub fn from_config(
        config: &CoreConfig,
        factory: Arc<dyn EntityClientFactory>,
        event_bus: EventBus,
    ) -> Self {
        Self::new(
            factory,
            config.secure_store.clone(),
            config.settings_store.clone(),
            event_bus,
        )
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// The last opened session, if it is still valid.
    pub async fn current(&self) -> Option<SyncSession> {
        self.current
            .read()
            .await
            .as_ref()
            .filter(|session| session.is_valid())
            .cloned()
    }

    /// Reuse the current session while the stored settings match the ones it
    /// was opened with. Otherwise drop it and open a new one.
    pub async fn session(&self) -> Result<SyncSession> {
        let settings = KitsuSettings::load(self.settings_store.as_ref()).await?;
        if let Some(session) = self.current().await {
            if session.settings == settings {
                return Ok(session);
            }
            self.invalidate("settings changed").await;
        }
        let _guard = self.open_lock.lock().await;
        if let Some(session) = self.current().await {
            if session.settings == settings {
                return Ok(session);
            }
        }
        self.open_locked().await
    }

    /// Always log in again, reading settings and password fresh.
    pub async fn open(&self) -> Result<SyncSession> {
        let _guard = self.open_lock.lock().await;
        self.open_locked().await
    }

    #[instrument(skip(self))]
    async fn open_locked(&self) -> Result<SyncSession> {
        let generation = self.generation.load(Ordering::SeqCst);

        let settings = KitsuSettings::load(self.settings_store.as_ref()).await?;
        let password = self
            .credentials
            .password(&settings.username)
            .await?
            .ok_or_else(|| AuthError::MissingPassword(settings.username.clone()))?;

        let client = self.factory.connect(&settings.site)?;

        let user = match client.log_in(&settings.username, &password).await {
            Ok(user) => user,
            Err(BridgeError::Unauthorized(reason)) => {
                warn!("Kitsu rejected the stored credentials");
                self.emit_error(format!("Login rejected: {}", reason));
                return Err(AuthError::AuthenticationFailed {
                    username: settings.username.clone(),
                    reason,
                });
            }
            Err(e) => {
                error!(error = %e, "Could not reach Kitsu");
                self.emit_error(format!("Could not reach Kitsu: {}", e));
                return Err(AuthError::Remote(e));
            }
        };

        let project = client
            .find_project(&settings.project_name)
            .await?
            .ok_or_else(|| {
                self.emit_error(format!(
                    "Project '{}' not found on {}",
                    settings.project_name, settings.site
                ));
                AuthError::ProjectNotFound(settings.project_name.clone())
            })?;

        let session = SyncSession {
            client,
            project,
            user,
            settings,
            generation,
            current_generation: self.generation.clone(),
        };

        *self.current.write().await = Some(session.clone());

        info!(
            project = %session.project.name,
            production_type = session.project.production_type.as_str(),
            "Kitsu session opened"
        );
        let event = CoreEvent::Auth(AuthEvent::SignedIn {
            user: session.settings.username.clone(),
            project: session.project.name.clone(),
        });
        self.event_bus.emit(event).ok();

        Ok(session)
    }

    /// Every session opened so far fails `ensure_valid` from now on.
    pub async fn invalidate(&self, reason: &str) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.current.write().await = None;
        info!(reason, "Kitsu sessions invalidated");
        let event = CoreEvent::Auth(AuthEvent::SessionInvalidated {
            reason: reason.to_string(),
        });
        self.event_bus.emit(event).ok();
    }

    /// Store a new login and drop every open session.
    #[instrument(skip(self, password))]
    pub async fn update_credentials(&self, username: &str, password: &str) -> Result<()> {
        self.settings_store
            .set_string(core_runtime::config::keys::USERNAME, username)
            .await?;
        self.credentials.store_password(username, password).await?;
        self.invalidate("credentials changed").await;
        Ok(())
    }

    /// Drop sessions and, when asked, the stored password of the configured
    /// user.
    #[instrument(skip(self))]
    pub async fn sign_out(&self, forget_password: bool) -> Result<()> {
        if forget_password {
            let username = self
                .settings_store
                .get_string(core_runtime::config::keys::USERNAME)
                .await?;
            if let Some(username) = username {
                self.credentials.delete_password(&username).await?;
            }
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.current.write().await = None;
        info!("Signed out from Kitsu");
        self.event_bus
            .emit(CoreEvent::Auth(AuthEvent::SignedOut))
            .ok();
        Ok(())
    }

    fn emit_error(&self, message: String) {
        self.event_bus
            .emit(CoreEvent::Auth(AuthEvent::AuthError { message }))
            .ok();
    }
}
