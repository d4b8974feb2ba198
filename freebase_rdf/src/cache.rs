//! Persistent cache of merged MQL results.
//!
//! Entries are append-only: they are never invalidated or evicted.

use crate::config::CacheConfig;
use crate::models::PropertyMap;
use crate::{FreebaseError, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<PropertyMap>>;
    async fn put(&self, key: &str, value: &PropertyMap) -> Result<()>;
    async fn contains(&self, key: &str) -> Result<bool>;
    async fn close(&self) -> Result<()>;
}

pub type DynCacheStore = Arc<dyn CacheStore>;

#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: RwLock<HashMap<String, PropertyMap>>,
}

impl InMemoryCacheStore {
    #[tracing::instrument]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    #[tracing::instrument(skip_all)]
    async fn get(&self, key: &str) -> Result<Option<PropertyMap>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    #[tracing::instrument(skip_all)]
    async fn put(&self, key: &str, value: &PropertyMap) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    async fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.entries.read().await.contains_key(key))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Cache persisted in a single SQLite file; survives process restarts.
#[derive(Debug, Clone)]
pub struct SqliteCacheStore {
    pool: SqlitePool,
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS freebase_cache (
  key TEXT PRIMARY KEY,
  value_json TEXT NOT NULL
);
"#;

impl SqliteCacheStore {
    #[tracing::instrument(level = "debug", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(FreebaseError::cache)?;
        }

        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await?;

        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    #[tracing::instrument(skip_all)]
    async fn get(&self, key: &str) -> Result<Option<PropertyMap>> {
        let row = sqlx::query("SELECT value_json FROM freebase_cache WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let text: String = row.try_get("value_json")?;
        Ok(Some(serde_json::from_str(&text)?))
    }

    #[tracing::instrument(skip_all)]
    async fn put(&self, key: &str, value: &PropertyMap) -> Result<()> {
        let text = serde_json::to_string(value)?;
        sqlx::query(
            r#"
INSERT INTO freebase_cache (key, value_json) VALUES (?1, ?2)
ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json
"#,
        )
        .bind(key)
        .bind(text)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    async fn contains(&self, key: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM freebase_cache WHERE key = ?1 LIMIT 1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// How cache entries are keyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheKeying {
    /// Entity id alone. A cached narrow fetch answers any later request for the
    /// same id, whatever properties it asks for.
    EntityId,
    /// Entity id plus a digest of the sorted requested property ids.
    #[default]
    PropertySet,
}

impl CacheKeying {
    pub fn key(&self, id: &str, properties: &BTreeSet<String>) -> String {
        match self {
            CacheKeying::EntityId => id.to_string(),
            CacheKeying::PropertySet => {
                let mut hasher = Sha256::new();
                for p in properties {
                    hasher.update(p.as_bytes());
                    hasher.update(b"\n");
                }
                format!("{id}#{:x}", hasher.finalize())
            }
        }
    }
}

/// Optional cache store plus its keying policy. Without a store every
/// operation is a no-op miss.
#[derive(Clone, Default)]
pub struct ResponseCache {
    store: Option<DynCacheStore>,
    keying: CacheKeying,
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("enabled", &self.store.is_some())
            .field("keying", &self.keying)
            .finish()
    }
}

impl ResponseCache {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn new(store: DynCacheStore, keying: CacheKeying) -> Self {
        Self {
            store: Some(store),
            keying,
        }
    }

    /// Opens the SQLite store named by `cfg`, or a disabled cache when no path
    /// is configured.
    #[tracing::instrument(level = "debug")]
    pub async fn from_config(cfg: &CacheConfig) -> Result<Self> {
        match &cfg.path {
            None => Ok(Self {
                store: None,
                keying: cfg.keying,
            }),
            Some(path) => {
                let store = SqliteCacheStore::open(path).await?;
                Ok(Self::new(Arc::new(store), cfg.keying))
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn keying(&self) -> CacheKeying {
        self.keying
    }

    pub fn key(&self, id: &str, properties: &BTreeSet<String>) -> String {
        self.keying.key(id, properties)
    }

    pub async fn get(&self, key: &str) -> Result<Option<PropertyMap>> {
        match &self.store {
            Some(store) => store.get(key).await,
            None => Ok(None),
        }
    }

    pub async fn put(&self, key: &str, value: &PropertyMap) -> Result<()> {
        match &self.store {
            Some(store) => store.put(key, value).await,
            None => Ok(()),
        }
    }

    /// Closes the store. A failure is logged and returned.
    pub async fn close(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        store.close().await.inspect_err(|err| {
            tracing::warn!(error = %err, "cache store failed to close");
        })
    }
}
