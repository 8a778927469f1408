use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

use super::ShadowIndexStore;
use crate::error::Result;
use crate::types::{ShadowKey, ShadowRow};

/// SQLite-backed Shadow Index. One table per deployment, matching the wire
/// schema in spec §6: `(id, root, parent, name, mtime)`, unique on
/// `(root, parent, name)`.
#[derive(Clone)]
pub struct SqliteShadowIndexStore {
    pool: SqlitePool,
}

impl fmt::Debug for SqliteShadowIndexStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteShadowIndexStore")
            .field("pool_size", &self.pool.size())
            .finish()
    }
}

impl SqliteShadowIndexStore {
    /// Open (creating if necessary) the Shadow Index database at `path`.
    pub async fn open(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| crate::error::EngineError::Internal(e.to_string()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1) // single-writer discipline, matching spec §5's serialized bulk calls
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        info!("shadow index opened");
        Ok(store)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS shadow_index (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                root TEXT NOT NULL,
                parent TEXT NOT NULL,
                name TEXT NOT NULL,
                mtime INTEGER NOT NULL,
                UNIQUE(root, parent, name)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ShadowIndexStore for SqliteShadowIndexStore {
    async fn add_files(&self, rows: &[ShadowRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for row in rows {
            sqlx::query(
                "INSERT OR IGNORE INTO shadow_index (root, parent, name, mtime) VALUES (?, ?, ?, ?)",
            )
            .bind(&row.root)
            .bind(&row.parent_dir)
            .bind(&row.name)
            .bind(row.mtime)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn update_files(&self, rows: &[ShadowRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO shadow_index (root, parent, name, mtime) VALUES (?, ?, ?, ?)
                ON CONFLICT(root, parent, name) DO UPDATE SET mtime = excluded.mtime
                "#,
            )
            .bind(&row.root)
            .bind(&row.parent_dir)
            .bind(&row.name)
            .bind(row.mtime)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_files(&self, root: &str, keys: &[ShadowKey]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for key in keys {
            sqlx::query("DELETE FROM shadow_index WHERE root = ? AND parent = ? AND name = ?")
                .bind(root)
                .bind(&key.parent_dir)
                .bind(&key.name)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_subtree(&self, root: &str) -> Result<Vec<ShadowRow>> {
        let rows = sqlx::query("SELECT root, parent, name, mtime FROM shadow_index WHERE root = ?")
            .bind(root)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| ShadowRow {
                root: r.get("root"),
                parent_dir: r.get("parent"),
                name: r.get("name"),
                mtime: r.get("mtime"),
            })
            .collect())
    }
}

impl Drop for SqliteShadowIndexStore {
    fn drop(&mut self) {
        if self.pool.is_closed() {
            return;
        }
        warn!("shadow index store dropped without explicit close");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_test_store() -> SqliteShadowIndexStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqliteShadowIndexStore::from_pool(pool);
        store.migrate().await.unwrap();
        store
    }

    fn row(root: &str, parent: &str, name: &str, mtime: i64) -> ShadowRow {
        ShadowRow {
            root: root.to_string(),
            parent_dir: parent.to_string(),
            name: name.to_string(),
            mtime,
        }
    }

    #[tokio::test]
    async fn add_files_is_idempotent_on_duplicate_keys() {
        let store = open_test_store().await;
        let rows = vec![row("/root", "/root", "a", 1)];
        store.add_files(&rows).await.unwrap();
        store.add_files(&rows).await.unwrap();
        assert_eq!(store.list_subtree("/root").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_files_upserts_mtime() {
        let store = open_test_store().await;
        store.update_files(&[row("/root", "/root", "a", 1)]).await.unwrap();
        store.update_files(&[row("/root", "/root", "a", 2)]).await.unwrap();
        let rows = store.list_subtree("/root").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].mtime, 2);
    }

    #[tokio::test]
    async fn delete_files_removes_by_key() {
        let store = open_test_store().await;
        store
            .add_files(&[row("/root", "/root", "a", 1), row("/root", "/root", "b", 2)])
            .await
            .unwrap();
        store
            .delete_files(
                "/root",
                &[ShadowKey {
                    parent_dir: "/root".into(),
                    name: "a".into(),
                }],
            )
            .await
            .unwrap();
        let rows = store.list_subtree("/root").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "b");
    }

    #[tokio::test]
    async fn is_empty_reflects_root_scoping() {
        let store = open_test_store().await;
        assert!(store.is_empty("/root").await.unwrap());
        store.add_files(&[row("/root", "/root", "a", 1)]).await.unwrap();
        assert!(!store.is_empty("/root").await.unwrap());
        assert!(store.is_empty("/other").await.unwrap());
    }
}
