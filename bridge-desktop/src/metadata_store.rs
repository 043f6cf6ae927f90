//! Per-entity pipeline fields in SQLite.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::MetadataStore,
};
use sqlx::{sqlite::SqlitePool, Row};
use std::path::Path;
use tracing::debug;

use crate::db;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS entity_fields (
        namespace TEXT NOT NULL,
        entity TEXT NOT NULL,
        field TEXT NOT NULL,
        value TEXT NOT NULL,
        updated_at INTEGER NOT NULL,
        PRIMARY KEY (namespace, entity, field)
    )
"#;

/// SQLite-backed [`MetadataStore`].
///
/// Namespaces are lowercased on every call.
pub struct SqliteMetadataStore {
    pool: SqlitePool,
}

impl SqliteMetadataStore {
    pub async fn new(db_path: &Path) -> Result<Self> {
        let pool = db::open_file(db_path).await?;
        db::run_schema(&pool, SCHEMA).await?;
        debug!(path = ?db_path, "Initialized metadata store");
        Ok(Self { pool })
    }

    pub async fn in_memory() -> Result<Self> {
        let pool = db::open_in_memory().await?;
        db::run_schema(&pool, SCHEMA).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn get_field(
        &self,
        namespace: &str,
        entity: &str,
        field: &str,
    ) -> Result<Option<String>> {
        let row = sqlx::query(
            "SELECT value FROM entity_fields WHERE namespace = ? AND entity = ? AND field = ?",
        )
        .bind(namespace.to_lowercase())
        .bind(entity)
        .bind(field)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| BridgeError::DatabaseError(format!("Failed to read {}: {}", field, e)))?;

        Ok(row.map(|row| row.get(0)))
    }

    async fn set_field(
        &self,
        namespace: &str,
        entity: &str,
        field: &str,
        value: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO entity_fields (namespace, entity, field, value, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(namespace, entity, field) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(namespace.to_lowercase())
        .bind(entity)
        .bind(field)
        .bind(value)
        .bind(db::now())
        .execute(&self.pool)
        .await
        .map_err(|e| BridgeError::DatabaseError(format!("Failed to write {}: {}", field, e)))?;

        debug!(namespace, entity, field, "Stored entity field");
        Ok(())
    }

    async fn delete_field(&self, namespace: &str, entity: &str, field: &str) -> Result<()> {
        sqlx::query("DELETE FROM entity_fields WHERE namespace = ? AND entity = ? AND field = ?")
            .bind(namespace.to_lowercase())
            .bind(entity)
            .bind(field)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                BridgeError::DatabaseError(format!("Failed to delete {}: {}", field, e))
            })?;
        Ok(())
    }

    async fn list_entities(&self, namespace: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT DISTINCT entity FROM entity_fields WHERE namespace = ? ORDER BY entity",
        )
        .bind(namespace.to_lowercase())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BridgeError::DatabaseError(format!("Failed to list entities: {}", e)))?;

        Ok(rows.into_iter().map(|row| row.get(0)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_namespace_is_case_insensitive() {
        let store = SqliteMetadataStore::in_memory().await.unwrap();
        store
            .set_field("ShotInfo", "sq010-sh020", "objID", "abc")
            .await
            .unwrap();

        assert_eq!(
            store
                .get_field("shotinfo", "sq010-sh020", "objID")
                .await
                .unwrap()
                .as_deref(),
            Some("abc")
        );
    }

    #[tokio::test]
    async fn test_delete_absent_field_is_ok() {
        let store = SqliteMetadataStore::in_memory().await.unwrap();
        store
            .delete_field("assetinfo", "Chair", "thumbnailID")
            .await
            .unwrap();

        store
            .set_field("assetinfo", "Chair", "thumbnailID", "pf1")
            .await
            .unwrap();
        store
            .delete_field("assetinfo", "Chair", "thumbnailID")
            .await
            .unwrap();
        assert_eq!(
            store
                .get_field("assetinfo", "Chair", "thumbnailID")
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_list_entities_per_namespace() {
        let store = SqliteMetadataStore::in_memory().await.unwrap();
        store.set_field("shotinfo", "b", "objID", "1").await.unwrap();
        store.set_field("shotinfo", "a", "objID", "2").await.unwrap();
        store.set_field("shotinfo", "a", "thumbnailID", "3").await.unwrap();
        store.set_field("assetinfo", "c", "objID", "4").await.unwrap();

        assert_eq!(store.list_entities("shotinfo").await.unwrap(), vec!["a", "b"]);
        assert_eq!(store.list_entities("assetinfo").await.unwrap(), vec!["c"]);
    }
}
