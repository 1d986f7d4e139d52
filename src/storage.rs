//! Local persistence backends for the offline queue.
//!
//! The queue stores its whole record list as one serialized string under a
//! single key, so a backend only needs `read` and `write`. Three backends are
//! provided: SQLite (default), a directory of JSON files, and memory.

use async_trait::async_trait;
use fs2::FileExt;
use log::debug;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::{StorageBackend, StorageConfig};
use crate::error::QueueError;
use crate::queries::{ddl, kv};

/// Durable string-keyed store
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Read the value stored under `key`, or `None` if it was never written
    async fn read(&self, key: &str) -> Result<Option<String>, QueueError>;

    /// Replace the value stored under `key`
    async fn write(&self, key: &str, value: &str) -> Result<(), QueueError>;
}

/// Open the backend selected in the config
pub async fn open_store(config: &StorageConfig) -> Result<Arc<dyn LocalStore>, QueueError> {
    match config.backend {
        StorageBackend::Sqlite => {
            let path = config.path.as_deref().ok_or_else(|| {
                QueueError::StorageUnavailable("sqlite backend requires a path".to_string())
            })?;
            Ok(Arc::new(SqliteStore::open(path).await?))
        }
        StorageBackend::File => {
            let dir = config.path.as_deref().ok_or_else(|| {
                QueueError::StorageUnavailable("file backend requires a path".to_string())
            })?;
            Ok(Arc::new(FileStore::open(dir)?))
        }
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
    }
}

// ============================================================================
// SQLite
// ============================================================================

/// Key/value table in a SQLite database (WAL mode)
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a file-based database and ensure the table exists
    pub async fn open(db_path: &Path) -> Result<Self, QueueError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        debug!("SQLite local store: {}", db_path.display());
        Self::init(pool).await
    }

    /// In-memory database for tests. The single connection is never recycled,
    /// otherwise the data would vanish with it.
    pub async fn open_in_memory() -> Result<Self, QueueError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::init(pool).await
    }

    async fn init(pool: SqlitePool) -> Result<Self, QueueError> {
        sqlx::query(&ddl::create_kv_store_table())
            .execute(&pool)
            .await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl LocalStore for SqliteStore {
    async fn read(&self, key: &str) -> Result<Option<String>, QueueError> {
        let value: Option<String> = sqlx::query_scalar(&kv::select_by_key(key))
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), QueueError> {
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query(kv::UPSERT)
            .bind(key)
            .bind(value)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// ============================================================================
// JSON files
// ============================================================================

const LOCK_FILE_NAME: &str = ".lock";

/// One `<key>.json` file per key inside a directory.
///
/// Writes go to a temp file in the same directory and are renamed over the
/// target, so a crash mid-write leaves the previous value intact. An advisory
/// lock on `.lock` keeps other processes from interleaving writes.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open(dir: &Path) -> Result<Self, QueueError> {
        std::fs::create_dir_all(dir)?;
        debug!("File local store: {}", dir.display());
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn key_path(&self, key: &str) -> Result<PathBuf, QueueError> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(QueueError::StorageUnavailable(format!(
                "Invalid storage key '{}'",
                key
            )));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }

    fn open_lock(dir: &Path) -> std::io::Result<std::fs::File> {
        std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(dir.join(LOCK_FILE_NAME))
    }
}

#[async_trait]
impl LocalStore for FileStore {
    async fn read(&self, key: &str) -> Result<Option<String>, QueueError> {
        let path = self.key_path(key)?;
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || {
            let lock = Self::open_lock(&dir)?;
            lock.lock_shared()?;
            let result = match std::fs::read_to_string(&path) {
                Ok(content) => Ok(Some(content)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(QueueError::from(e)),
            };
            let _ = lock.unlock();
            result
        })
        .await
        .map_err(|e| QueueError::StorageUnavailable(format!("Read task failed: {}", e)))?
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), QueueError> {
        let path = self.key_path(key)?;
        let dir = self.dir.clone();
        let value = value.to_string();
        tokio::task::spawn_blocking(move || {
            let lock = Self::open_lock(&dir)?;
            lock.lock_exclusive()?;
            let result = (|| {
                let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
                tmp.write_all(value.as_bytes())?;
                tmp.as_file().sync_all()?;
                tmp.persist(&path).map_err(|e| e.error)?;
                Ok::<(), std::io::Error>(())
            })();
            let _ = lock.unlock();
            result.map_err(QueueError::from)
        })
        .await
        .map_err(|e| QueueError::StorageUnavailable(format!("Write task failed: {}", e)))?
    }
}

// ============================================================================
// Memory
// ============================================================================

/// Non-durable store. Can be switched into an unavailable state to exercise
/// storage failure paths.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent read and write fail with `StorageUnavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), QueueError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(QueueError::StorageUnavailable(
                "memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn read(&self, key: &str) -> Result<Option<String>, QueueError> {
        self.check_available()?;
        let entries = self
            .entries
            .lock()
            .map_err(|_| QueueError::StorageUnavailable("memory store poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), QueueError> {
        self.check_available()?;
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| QueueError::StorageUnavailable("memory store poisoned".to_string()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
