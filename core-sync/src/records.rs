//! # Local Records
//!
//! The local mirror of tracker identities, one record per entity name:
//!
//! | Field         | Meaning                                   |
//! |---------------|-------------------------------------------|
//! | `objID`       | Last known tracker ID of the entity        |
//! | `thumbnailID` | Preview file the cached thumbnail came from |
//!
//! Records only detect drift. Identity is always resolved by name against
//! the tracker, so a stale `objID` is harmless.

use crate::error::Result;
use bridge_traits::storage::MetadataStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

pub const OBJECT_ID_FIELD: &str = "objID";
pub const THUMBNAIL_ID_FIELD: &str = "thumbnailID";

/// Which kind of entity a record, cache folder or pass is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordScope {
    Shots,
    Assets,
}

impl RecordScope {
    /// Metadata store namespace.
    pub fn namespace(&self) -> &'static str {
        match self {
            RecordScope::Shots => "shotinfo",
            RecordScope::Assets => "assetinfo",
        }
    }

    /// Folder under the thumbnail cache root.
    pub fn cache_folder(&self) -> &'static str {
        match self {
            RecordScope::Shots => "Shotinfo",
            RecordScope::Assets => "Assetinfo",
        }
    }

    /// Plural used in reports and events.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordScope::Shots => "shots",
            RecordScope::Assets => "assets",
        }
    }
}

impl fmt::Display for RecordScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone)]
pub struct LocalRecords {
    store: Arc<dyn MetadataStore>,
}

impl LocalRecords {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    pub async fn object_id(&self, scope: RecordScope, name: &str) -> Result<Option<String>> {
        self.get(scope, name, OBJECT_ID_FIELD).await
    }

    /// Returns `true` when the stored value changed.
    pub async fn remember_object(&self, scope: RecordScope, name: &str, id: &str) -> Result<bool> {
        self.set_if_changed(scope, name, OBJECT_ID_FIELD, id).await
    }

    pub async fn thumbnail_id(&self, scope: RecordScope, name: &str) -> Result<Option<String>> {
        self.get(scope, name, THUMBNAIL_ID_FIELD).await
    }

    pub async fn remember_thumbnail(
        &self,
        scope: RecordScope,
        name: &str,
        preview_id: &str,
    ) -> Result<bool> {
        self.set_if_changed(scope, name, THUMBNAIL_ID_FIELD, preview_id)
            .await
    }

    pub async fn forget_thumbnail(&self, scope: RecordScope, name: &str) -> Result<()> {
        self.store
            .delete_field(scope.namespace(), name, THUMBNAIL_ID_FIELD)
            .await?;
        Ok(())
    }

    /// Drop the whole record.
    pub async fn forget(&self, scope: RecordScope, name: &str) -> Result<()> {
        self.store
            .delete_field(scope.namespace(), name, OBJECT_ID_FIELD)
            .await?;
        self.forget_thumbnail(scope, name).await?;
        debug!(scope = %scope, name, "Local record removed");
        Ok(())
    }

    /// Names with at least one stored field.
    pub async fn known(&self, scope: RecordScope) -> Result<Vec<String>> {
        Ok(self.store.list_entities(scope.namespace()).await?)
    }

    async fn get(&self, scope: RecordScope, name: &str, field: &str) -> Result<Option<String>> {
        Ok(self
            .store
            .get_field(scope.namespace(), name, field)
            .await?
            .filter(|value| !value.is_empty()))
    }

    async fn set_if_changed(
        &self,
        scope: RecordScope,
        name: &str,
        field: &str,
        value: &str,
    ) -> Result<bool> {
        if self.get(scope, name, field).await?.as_deref() == Some(value) {
            return Ok(false);
        }
        self.store
            .set_field(scope.namespace(), name, field, value)
            .await?;
        Ok(true)
    }
}

impl fmt::Debug for LocalRecords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalRecords").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::testing::InMemoryMetadataStore;

    fn records() -> (Arc<InMemoryMetadataStore>, LocalRecords) {
        let store = Arc::new(InMemoryMetadataStore::new());
        (store.clone(), LocalRecords::new(store))
    }

    #[tokio::test]
    async fn test_remember_writes_only_on_change() {
        let (store, records) = records();

        assert!(records
            .remember_object(RecordScope::Shots, "SQ01-SH010", "shot-1")
            .await
            .unwrap());
        assert!(!records
            .remember_object(RecordScope::Shots, "SQ01-SH010", "shot-1")
            .await
            .unwrap());
        assert_eq!(store.writes(), 1);

        assert!(records
            .remember_object(RecordScope::Shots, "SQ01-SH010", "shot-2")
            .await
            .unwrap());
        assert_eq!(
            records
                .object_id(RecordScope::Shots, "SQ01-SH010")
                .await
                .unwrap()
                .as_deref(),
            Some("shot-2")
        );
    }

    #[tokio::test]
    async fn test_scopes_do_not_share_records() {
        let (_, records) = records();
        records
            .remember_object(RecordScope::Assets, "Chair", "asset-1")
            .await
            .unwrap();

        assert!(records
            .object_id(RecordScope::Shots, "Chair")
            .await
            .unwrap()
            .is_none());
        assert_eq!(records.known(RecordScope::Assets).await.unwrap(), vec!["Chair"]);
    }

    #[tokio::test]
    async fn test_forget_clears_both_fields() {
        let (_, records) = records();
        records
            .remember_object(RecordScope::Shots, "SQ01-SH010", "shot-1")
            .await
            .unwrap();
        records
            .remember_thumbnail(RecordScope::Shots, "SQ01-SH010", "preview-1")
            .await
            .unwrap();

        records.forget(RecordScope::Shots, "SQ01-SH010").await.unwrap();

        assert!(records
            .object_id(RecordScope::Shots, "SQ01-SH010")
            .await
            .unwrap()
            .is_none());
        assert!(records
            .thumbnail_id(RecordScope::Shots, "SQ01-SH010")
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_scope_names() {
        assert_eq!(RecordScope::Shots.namespace(), "shotinfo");
        assert_eq!(RecordScope::Assets.cache_folder(), "Assetinfo");
        assert_eq!(RecordScope::Assets.to_string(), "assets");
    }
}
