//! Storage ports and engines.
//!
//! The service talks to storage only through three narrow ports:
//!
//! - [`CacheStore`] - normalized word → previously generated associations
//! - [`HistoryLog`] - append-only record of processed requests
//! - [`UserStore`] - chat users known to the bot channel
//!
//! Engines: [`MemoryStore`] (tests, `STORE=memory`), [`SqliteStore`]
//! (default), and `PgStore` behind the `postgres` feature. Every engine
//! normalizes cache keys itself, so callers cannot address two entries for
//! the same word.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{DatabaseSettings, StoreBackend};
use crate::core::{Association, Source};

pub use error::StorageError;
pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgStore;
pub use sqlite::SqliteStore;

/// Cache key normalization: trim, then lowercase.
pub fn normalize_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Cached associations for one normalized word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub associations: Vec<Association>,
    pub updated_at: DateTime<Utc>,
}

/// One processed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: Uuid,
    /// Weak reference to a [`User`]; never dereferenced by the service.
    pub user_ref: Option<Uuid>,
    pub source: Source,
    /// Text exactly as the caller sent it.
    pub original_text: String,
    pub created_at: DateTime<Utc>,
}

impl HistoryRecord {
    pub fn new(source: Source, original_text: impl Into<String>, user_ref: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_ref,
            source,
            original_text: original_text.into(),
            created_at: Utc::now(),
        }
    }
}

/// Profile data a chat platform reports for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// A registered chat user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn from_profile(profile: &UserProfile) -> Self {
        Self {
            id: Uuid::new_v4(),
            telegram_id: profile.telegram_id,
            username: profile.username.clone(),
            first_name: profile.first_name.clone(),
            last_name: profile.last_name.clone(),
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// Word → associations cache.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch the entry for `key`, if one exists.
    async fn lookup(&self, key: &str) -> Result<Option<CacheEntry>, StorageError>;

    /// Create or replace the entry for `key` (last write wins).
    async fn upsert(
        &self,
        key: &str,
        associations: &[Association],
    ) -> Result<CacheEntry, StorageError>;
}

/// Append-only request history.
#[async_trait]
pub trait HistoryLog: Send + Sync {
    async fn append(
        &self,
        source: Source,
        original_text: &str,
        user_ref: Option<Uuid>,
    ) -> Result<HistoryRecord, StorageError>;

    /// A user's records, newest first.
    async fn list_for_user(
        &self,
        user_id: Uuid,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<HistoryRecord>, StorageError>;
}

/// Chat users.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_telegram_id(&self, telegram_id: i64) -> Result<Option<User>, StorageError>;

    /// Create the user, or refresh the profile of an existing one. The user
    /// id never changes once assigned.
    async fn register(&self, profile: &UserProfile) -> Result<User, StorageError>;
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// The three ports, backed by one engine.
#[derive(Clone)]
pub struct Storage {
    pub cache: Arc<dyn CacheStore>,
    pub history: Arc<dyn HistoryLog>,
    pub users: Arc<dyn UserStore>,
}

impl Storage {
    /// Expose one engine through all three ports.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: CacheStore + HistoryLog + UserStore + 'static,
    {
        Self {
            cache: store.clone(),
            history: store.clone(),
            users: store,
        }
    }

    /// Open the engine selected by `settings.backend`.
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self, StorageError> {
        match settings.backend {
            StoreBackend::Memory => {
                log::info!("Using in-memory storage");
                Ok(Self::from_store(Arc::new(MemoryStore::new())))
            }
            StoreBackend::Sqlite => {
                log::info!("Opening SQLite storage at {}", settings.sqlite_path.display());
                let store = SqliteStore::open(&settings.sqlite_path)?;
                Ok(Self::from_store(Arc::new(store)))
            }
            StoreBackend::Postgres => connect_postgres(settings).await,
        }
    }
}

#[cfg(feature = "postgres")]
async fn connect_postgres(settings: &DatabaseSettings) -> Result<Storage, StorageError> {
    log::info!("Connecting to PostgreSQL...");
    let pool = sqlx::PgPool::connect(&settings.database_url()).await?;
    let store = PgStore::new(pool);
    store.migrate().await?;
    log::info!("PostgreSQL migrations complete");
    Ok(Storage::from_store(Arc::new(store)))
}

#[cfg(not(feature = "postgres"))]
async fn connect_postgres(_settings: &DatabaseSettings) -> Result<Storage, StorageError> {
    Err(StorageError::Unavailable(
        "STORE=postgres requires building with the `postgres` feature".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("  Счастье \n"), "счастье");
        assert_eq!(normalize_key("ФДЫВА "), "фдыва");
        assert_eq!(normalize_key(&normalize_key(" ЁЛКА ")), normalize_key(" ЁЛКА "));
    }

    #[tokio::test]
    async fn test_connect_memory() {
        let settings = DatabaseSettings {
            backend: StoreBackend::Memory,
            ..DatabaseSettings::default()
        };
        let storage = Storage::connect(&settings).await.unwrap();
        assert!(storage.cache.lookup("слово").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_connect_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let settings = DatabaseSettings {
            backend: StoreBackend::Sqlite,
            sqlite_path: dir.path().join("nested").join("lexicon.db"),
            ..DatabaseSettings::default()
        };
        let storage = Storage::connect(&settings).await.unwrap();
        storage
            .cache
            .upsert("слово", &[Association::synonym("термин")])
            .await
            .unwrap();
        assert!(storage.cache.lookup("СЛОВО").await.unwrap().is_some());
    }

    #[cfg(not(feature = "postgres"))]
    #[tokio::test]
    async fn test_connect_postgres_without_feature() {
        let settings = DatabaseSettings {
            backend: StoreBackend::Postgres,
            ..DatabaseSettings::default()
        };
        let err = Storage::connect(&settings).await.err().unwrap();
        assert!(matches!(err, StorageError::Unavailable(_)));
    }
}
