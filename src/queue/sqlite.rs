use std::collections::VecDeque;
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;

use super::codec;
use super::key::key_hash;
use crate::config::QueueConfig;
use crate::error::{EngineError, Result};

struct WindowState<T> {
    /// Ascending-by-id slice of the queue head, currently held in memory.
    window: VecDeque<(i64, T)>,
    /// Highest id ever pulled into the window; the threshold for the next
    /// append-mode refill.
    highest_fetched_id: i64,
    /// Set by `put`; cleared once a refill has observed it.
    has_new_data: bool,
    /// Row count in storage, maintained under the same lock.
    size: i64,
}

/// Durable infinite keyed FIFO. One table per named queue:
/// `(id INTEGER PRIMARY KEY AUTOINCREMENT, item BLOB, key CHAR(32) UNIQUE)`.
pub struct SqlitePersistentQueue<T> {
    pool: SqlitePool,
    table: String,
    config: QueueConfig,
    state: Mutex<WindowState<T>>,
    _payload: PhantomData<T>,
}

impl<T> fmt::Debug for SqlitePersistentQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlitePersistentQueue")
            .field("table", &self.table)
            .finish()
    }
}

fn validate_table_name(table: &str) -> Result<()> {
    let valid = !table.is_empty()
        && table
            .chars()
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '_')
            .unwrap_or(false)
        && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(EngineError::Internal(format!(
            "invalid queue table name: {table}"
        )))
    }
}

impl<T> SqlitePersistentQueue<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + Clone + PartialEq + 'static,
{
    /// Open (creating if necessary) a named queue backed by the SQLite
    /// database at `path`.
    pub async fn open(path: &str, table: &str, config: QueueConfig) -> Result<Self> {
        validate_table_name(table)?;
        config
            .validate()
            .map_err(EngineError::Internal)?;

        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| EngineError::Internal(e.to_string()))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Self::from_pool(pool, table, config).await
    }

    pub async fn from_pool(pool: SqlitePool, table: &str, config: QueueConfig) -> Result<Self> {
        validate_table_name(table)?;
        config.validate().map_err(EngineError::Internal)?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (id INTEGER PRIMARY KEY AUTOINCREMENT, item BLOB, key CHAR(32))"
        ))
        .execute(&pool)
        .await?;
        sqlx::query(&format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {table}_unique_key ON {table} (key)"
        ))
        .execute(&pool)
        .await?;

        let size: i64 = sqlx::query(&format!("SELECT COUNT(id) FROM {table}"))
            .fetch_one(&pool)
            .await?
            .get(0);

        Ok(Self {
            pool,
            table: table.to_string(),
            config,
            state: Mutex::new(WindowState {
                window: VecDeque::new(),
                highest_fetched_id: 0,
                has_new_data: false,
                size,
            }),
            _payload: PhantomData,
        })
    }

    /// Insert `item` under `key` (or a key derived from `item` if none is
    /// given). Fails with `AlreadyExists` if the resulting key hash is
    /// already present.
    pub async fn put(&self, item: &T, key: Option<&str>) -> Result<()> {
        let owned_key;
        let key_str = match key {
            Some(k) => k,
            None => {
                owned_key = codec::canonical_string(item)?;
                &owned_key
            }
        };
        let hash = key_hash(key_str);
        let bytes = codec::encode(item)?;

        let mut guard = self.state.lock().await;

        let existing: Option<i64> = sqlx::query(&format!("SELECT id FROM {} WHERE key = ?", self.table))
            .bind(&hash)
            .fetch_optional(&self.pool)
            .await?
            .map(|r| r.get(0));
        if existing.is_some() {
            return Err(EngineError::AlreadyExists);
        }

        sqlx::query(&format!(
            "INSERT INTO {} (item, key) VALUES (?, ?)",
            self.table
        ))
        .bind(&bytes)
        .bind(&hash)
        .execute(&self.pool)
        .await?;

        guard.size += 1;
        guard.has_new_data = true;
        Ok(())
    }

    /// Return the queue head's payload without removing it. Fails with
    /// `Empty` if the queue is empty.
    pub async fn peek(&self) -> Result<T> {
        let mut guard = self.state.lock().await;
        if guard.size == 0 {
            return Err(EngineError::Empty);
        }
        self.refill(&mut guard, false).await?;
        Ok(guard.window.front().expect("non-empty after refill").1.clone())
    }

    /// Remove and return the queue head's payload. Fails with `Empty` if the
    /// queue is empty.
    pub async fn get(&self) -> Result<T> {
        let mut guard = self.state.lock().await;
        if guard.size == 0 {
            return Err(EngineError::Empty);
        }
        self.refill(&mut guard, false).await?;
        let (id, item) = guard.window.pop_front().expect("non-empty after refill");
        sqlx::query(&format!("DELETE FROM {} WHERE id = ?", self.table))
            .bind(id)
            .execute(&self.pool)
            .await?;
        guard.size -= 1;
        Ok(item)
    }

    /// Direct lookup by hashed key. No ordering effect, no window change.
    pub async fn get_item_for_key(&self, key: &str) -> Result<Option<T>> {
        let hash = key_hash(key);
        let row = sqlx::query(&format!("SELECT item FROM {} WHERE key = ?", self.table))
            .bind(&hash)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            None => Ok(None),
            Some(row) => {
                let bytes: Vec<u8> = row.get(0);
                Ok(Some(codec::decode(&bytes)?))
            }
        }
    }

    /// Delete by key. If the deleted id lies within the current window, the
    /// window is rebuilt.
    pub async fn remove_item_for_key(&self, key: &str) -> Result<()> {
        let hash = key_hash(key);
        let mut guard = self.state.lock().await;

        let id: Option<i64> = sqlx::query(&format!("SELECT id FROM {} WHERE key = ?", self.table))
            .bind(&hash)
            .fetch_optional(&self.pool)
            .await?
            .map(|r| r.get(0));

        let Some(id) = id else {
            return Ok(());
        };

        sqlx::query(&format!("DELETE FROM {} WHERE key = ?", self.table))
            .bind(&hash)
            .execute(&self.pool)
            .await?;
        guard.size -= 1;

        if self.id_in_window(&guard, id) {
            self.refill(&mut guard, true).await?;
        }
        Ok(())
    }

    /// Replace the payload stored under `key`. Fails with
    /// `UpdateForNonExistingKey` if absent. If the updated id lies within
    /// the window, the window is rebuilt so a subsequent `peek`/`get`
    /// observes the new value rather than a stale one.
    pub async fn update(&self, item: &T, key: &str) -> Result<()> {
        let hash = key_hash(key);
        let mut guard = self.state.lock().await;

        let id: Option<i64> = sqlx::query(&format!("SELECT id FROM {} WHERE key = ?", self.table))
            .bind(&hash)
            .fetch_optional(&self.pool)
            .await?
            .map(|r| r.get(0));

        let Some(id) = id else {
            return Err(EngineError::UpdateForNonExistingKey);
        };

        let bytes = codec::encode(item)?;
        sqlx::query(&format!("UPDATE {} SET item = ? WHERE key = ?", self.table))
            .bind(&bytes)
            .bind(&hash)
            .execute(&self.pool)
            .await?;

        if self.id_in_window(&guard, id) {
            self.refill(&mut guard, true).await?;
        }
        Ok(())
    }

    pub async fn qsize(&self) -> usize {
        self.state.lock().await.size.max(0) as usize
    }

    pub async fn empty(&self) -> bool {
        self.qsize().await == 0
    }

    /// Always `false` -- the queue is, by contract, infinite.
    pub fn full(&self) -> bool {
        false
    }

    /// Containment by payload equality (per spec §9's own suggestion, this
    /// avoids the original's fragile payload-hash comparison). Scans
    /// storage, decoding each row; intended for diagnostics, not hot paths.
    pub async fn contains(&self, item: &T) -> Result<bool> {
        let rows = sqlx::query(&format!("SELECT item FROM {}", self.table))
            .fetch_all(&self.pool)
            .await?;
        for row in rows {
            let bytes: Vec<u8> = row.get(0);
            let candidate: T = codec::decode(&bytes)?;
            if &candidate == item {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn id_in_window(&self, guard: &WindowState<T>, id: i64) -> bool {
        match (guard.window.front(), guard.window.back()) {
            (Some((lo, _)), Some((hi, _))) => id >= *lo && id <= *hi,
            _ => false,
        }
    }

    /// Window-refill algorithm (spec §4.C). `refresh = true` after an
    /// in-window mutation: clear the window, remember the old lowest id,
    /// then reload from that id forward so the mutated entry's new state is
    /// observed.
    async fn refill(&self, guard: &mut WindowState<T>, refresh: bool) -> Result<()> {
        if !refresh && !guard.has_new_data && guard.window.len() >= self.config.min_in_memory {
            return Ok(());
        }

        let min_id_exclusive = if refresh {
            let old_lowest = guard.window.front().map(|(id, _)| *id);
            guard.window.clear();
            old_lowest.map(|l| l - 1).unwrap_or(guard.highest_fetched_id)
        } else {
            guard.highest_fetched_id
        };

        let limit = self.config.max_in_memory.saturating_sub(guard.window.len());

        if limit == 0 {
            guard.has_new_data = false;
            return Ok(());
        }

        let rows = sqlx::query(&format!(
            "SELECT id, item FROM {} WHERE id > ? ORDER BY id ASC LIMIT ?",
            self.table
        ))
        .bind(min_id_exclusive)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        for row in rows {
            let id: i64 = row.get(0);
            let bytes: Vec<u8> = row.get(1);
            let item: T = codec::decode(&bytes)?;
            guard.window.push_back((id, item));
            guard.highest_fetched_id = id;
        }

        guard.has_new_data = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_test_queue(table: &str, config: QueueConfig) -> SqlitePersistentQueue<String> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        SqlitePersistentQueue::from_pool(pool, table, config)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn fifo_order_is_preserved_across_put_and_get() {
        let queue = open_test_queue("events", QueueConfig::default()).await;
        queue.put(&"a".to_string(), None).await.unwrap();
        queue.put(&"b".to_string(), None).await.unwrap();
        queue.put(&"c".to_string(), None).await.unwrap();

        assert_eq!(queue.get().await.unwrap(), "a");
        assert_eq!(queue.get().await.unwrap(), "b");
        assert_eq!(queue.get().await.unwrap(), "c");
        assert!(matches!(queue.get().await, Err(EngineError::Empty)));
    }

    #[tokio::test]
    async fn duplicate_key_is_rejected() {
        let queue = open_test_queue("events", QueueConfig::default()).await;
        queue.put(&"a".to_string(), Some("k")).await.unwrap();
        let err = queue.put(&"b".to_string(), Some("k")).await.unwrap_err();
        assert!(matches!(err, EngineError::AlreadyExists));
    }

    #[tokio::test]
    async fn empty_queue_peek_and_get_fail() {
        let queue = open_test_queue("events", QueueConfig::default()).await;
        assert!(matches!(queue.peek().await, Err(EngineError::Empty)));
        assert!(matches!(queue.get().await, Err(EngineError::Empty)));
    }

    #[tokio::test]
    async fn update_for_missing_key_fails() {
        let queue = open_test_queue("events", QueueConfig::default()).await;
        let err = queue.update(&"x".to_string(), "missing").await.unwrap_err();
        assert!(matches!(err, EngineError::UpdateForNonExistingKey));
    }

    #[tokio::test]
    async fn update_is_observed_by_a_later_get() {
        let queue = open_test_queue("events", QueueConfig::default()).await;
        queue.put(&"a".to_string(), Some("k")).await.unwrap();
        queue.update(&"a-updated".to_string(), "k").await.unwrap();
        assert_eq!(queue.get().await.unwrap(), "a-updated");
    }

    #[tokio::test]
    async fn remove_item_for_key_drops_it_from_fifo_order() {
        let queue = open_test_queue("events", QueueConfig::default()).await;
        queue.put(&"a".to_string(), Some("a")).await.unwrap();
        queue.put(&"b".to_string(), Some("b")).await.unwrap();
        queue.put(&"c".to_string(), Some("c")).await.unwrap();

        queue.remove_item_for_key("b").await.unwrap();
        assert_eq!(queue.qsize().await, 2);
        assert_eq!(queue.get().await.unwrap(), "a");
        assert_eq!(queue.get().await.unwrap(), "c");
    }

    #[tokio::test]
    async fn get_item_for_key_does_not_mutate_order() {
        let queue = open_test_queue("events", QueueConfig::default()).await;
        queue.put(&"a".to_string(), Some("a")).await.unwrap();
        queue.put(&"b".to_string(), Some("b")).await.unwrap();

        assert_eq!(queue.get_item_for_key("b").await.unwrap(), Some("b".to_string()));
        assert_eq!(queue.qsize().await, 2);
        assert_eq!(queue.get().await.unwrap(), "a");
    }

    #[tokio::test]
    async fn window_survives_far_more_entries_than_max_in_memory() {
        let config = QueueConfig {
            max_in_memory: 4,
            min_in_memory: 2,
        };
        let queue = open_test_queue("events", config).await;
        for i in 0..40 {
            queue.put(&format!("item-{i}"), None).await.unwrap();
        }
        assert_eq!(queue.qsize().await, 40);

        for i in 0..40 {
            assert_eq!(queue.get().await.unwrap(), format!("item-{i}"));
        }
        assert!(queue.empty().await);
        assert!(!queue.full());
    }

    #[tokio::test]
    async fn contains_matches_by_payload_equality() {
        let queue = open_test_queue("events", QueueConfig::default()).await;
        queue.put(&"a".to_string(), None).await.unwrap();
        assert!(queue.contains(&"a".to_string()).await.unwrap());
        assert!(!queue.contains(&"z".to_string()).await.unwrap());
    }
}
