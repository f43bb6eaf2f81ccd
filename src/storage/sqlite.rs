//! SQLite storage engine.
//!
//! One `rusqlite::Connection` guarded by a mutex; every operation runs on a
//! tokio blocking task so request tasks never block the runtime. Tables:
//!
//! - `word_dictionary` - unique `word`, JSON `associations`, `updated_at`
//! - `request_history` - append-only processed requests
//! - `users` - chat users, unique `telegram_id`
//!
//! Timestamps are stored as RFC 3339 UTC strings with microsecond precision
//! so that lexical order matches chronological order.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{
    normalize_key, CacheEntry, CacheStore, HistoryLog, HistoryRecord, StorageError, User,
    UserProfile, UserStore,
};
use crate::core::{Association, AssociationSet, Source};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS word_dictionary (
        id TEXT PRIMARY KEY,
        word TEXT NOT NULL UNIQUE,
        associations TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS request_history (
        id TEXT PRIMARY KEY,
        user_id TEXT,
        source TEXT NOT NULL DEFAULT 'web',
        original_text TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_request_history_user_id
        ON request_history(user_id);
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        telegram_id INTEGER NOT NULL UNIQUE,
        username TEXT,
        first_name TEXT,
        last_name TEXT,
        created_at TEXT NOT NULL
    );
";

/// SQLite-backed implementation of every storage port.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    /// Database file, `None` for an in-memory database.
    pub db_path: Option<PathBuf>,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database file and its tables.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn, Some(path.to_path_buf()))
    }

    /// Private in-memory database, mainly for tests.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::with_connection(Connection::open_in_memory()?, None)
    }

    fn with_connection(conn: Connection, db_path: Option<PathBuf>) -> Result<Self, StorageError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            db_path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on a blocking task.
    async fn run<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StorageError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            f(&guard)
        })
        .await?
    }
}

fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt(format!("bad timestamp '{}': {}", raw, e)))
}

fn parse_uuid(raw: &str) -> Result<Uuid, StorageError> {
    Uuid::parse_str(raw).map_err(|e| StorageError::Corrupt(format!("bad uuid '{}': {}", raw, e)))
}

fn history_from_row(row: &Row<'_>) -> rusqlite::Result<(String, Option<String>, String, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn decode_history(
    (id, user_id, source, original_text, created_at): (String, Option<String>, String, String, String),
) -> Result<HistoryRecord, StorageError> {
    Ok(HistoryRecord {
        id: parse_uuid(&id)?,
        user_ref: user_id.as_deref().map(parse_uuid).transpose()?,
        source: source.parse().map_err(StorageError::Corrupt)?,
        original_text,
        created_at: parse_ts(&created_at)?,
    })
}

fn select_user(conn: &Connection, telegram_id: i64) -> Result<Option<User>, StorageError> {
    let row = conn
        .query_row(
            "SELECT id, telegram_id, username, first_name, last_name, created_at
             FROM users WHERE telegram_id = ?1",
            params![telegram_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        )
        .optional()?;

    row.map(|(id, telegram_id, username, first_name, last_name, created_at)| {
        Ok(User {
            id: parse_uuid(&id)?,
            telegram_id,
            username,
            first_name,
            last_name,
            created_at: parse_ts(&created_at)?,
        })
    })
    .transpose()
}

#[async_trait]
impl CacheStore for SqliteStore {
    async fn lookup(&self, key: &str) -> Result<Option<CacheEntry>, StorageError> {
        let key = normalize_key(key);
        self.run(move |conn| {
            let row = conn
                .query_row(
                    "SELECT associations, updated_at FROM word_dictionary WHERE word = ?1",
                    params![key],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
                )
                .optional()?;

            match row {
                Some((associations, updated_at)) => {
                    let set: AssociationSet = serde_json::from_str(&associations)?;
                    Ok(Some(CacheEntry {
                        key,
                        associations: set.items,
                        updated_at: parse_ts(&updated_at)?,
                    }))
                }
                None => Ok(None),
            }
        })
        .await
    }

    async fn upsert(
        &self,
        key: &str,
        associations: &[Association],
    ) -> Result<CacheEntry, StorageError> {
        let entry = CacheEntry {
            key: normalize_key(key),
            associations: associations.to_vec(),
            updated_at: Utc::now(),
        };
        let payload = serde_json::to_string(&AssociationSet::from(entry.associations.clone()))?;
        let word = entry.key.clone();
        let updated_at = format_ts(&entry.updated_at);

        self.run(move |conn| {
            conn.execute(
                "INSERT INTO word_dictionary (id, word, associations, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(word) DO UPDATE SET
                     associations = excluded.associations,
                     updated_at = excluded.updated_at",
                params![Uuid::new_v4().to_string(), word, payload, updated_at],
            )?;
            Ok(())
        })
        .await?;

        log::debug!("Upserted word {}", entry.key);
        Ok(entry)
    }
}

#[async_trait]
impl HistoryLog for SqliteStore {
    async fn append(
        &self,
        source: Source,
        original_text: &str,
        user_ref: Option<Uuid>,
    ) -> Result<HistoryRecord, StorageError> {
        let record = HistoryRecord::new(source, original_text, user_ref);
        let row = (
            record.id.to_string(),
            record.user_ref.map(|id| id.to_string()),
            record.source.as_str(),
            record.original_text.clone(),
            format_ts(&record.created_at),
        );

        self.run(move |conn| {
            conn.execute(
                "INSERT INTO request_history (id, user_id, source, original_text, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![row.0, row.1, row.2, row.3, row.4],
            )?;
            Ok(())
        })
        .await?;

        Ok(record)
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<HistoryRecord>, StorageError> {
        let user_id = user_id.to_string();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let skip = i64::try_from(skip).unwrap_or(i64::MAX);

        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, source, original_text, created_at
                 FROM request_history
                 WHERE user_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2 OFFSET ?3",
            )?;
            let rows = stmt.query_map(params![user_id, limit, skip], history_from_row)?;

            let mut records = Vec::new();
            for row in rows {
                records.push(decode_history(row?)?);
            }
            Ok(records)
        })
        .await
    }
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn find_by_telegram_id(&self, telegram_id: i64) -> Result<Option<User>, StorageError> {
        self.run(move |conn| select_user(conn, telegram_id)).await
    }

    async fn register(&self, profile: &UserProfile) -> Result<User, StorageError> {
        let candidate = User::from_profile(profile);

        self.run(move |conn| {
            conn.execute(
                "INSERT INTO users (id, telegram_id, username, first_name, last_name, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(telegram_id) DO UPDATE SET
                     username = excluded.username,
                     first_name = excluded.first_name,
                     last_name = excluded.last_name",
                params![
                    candidate.id.to_string(),
                    candidate.telegram_id,
                    candidate.username,
                    candidate.first_name,
                    candidate.last_name,
                    format_ts(&candidate.created_at),
                ],
            )?;
            select_user(conn, candidate.telegram_id)?.ok_or_else(|| {
                StorageError::Corrupt(format!(
                    "user {} missing after upsert",
                    candidate.telegram_id
                ))
            })
        })
        .await
    }
}
