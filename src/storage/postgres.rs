//! PostgreSQL storage engine.
//!
//! Requires the `postgres` feature flag:
//! ```toml
//! [dependencies]
//! lexicon = { features = ["postgres"] }
//! ```

#[cfg(feature = "postgres")]
mod inner {
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use sqlx::types::Json;
    use sqlx::PgPool;
    use uuid::Uuid;

    use crate::core::{Association, AssociationSet, Source};
    use crate::storage::{
        normalize_key, CacheEntry, CacheStore, HistoryLog, HistoryRecord, StorageError, User,
        UserProfile, UserStore,
    };

    const MIGRATIONS: &[&str] = &[
        r#"
        CREATE TABLE IF NOT EXISTS word_dictionary (
            id UUID PRIMARY KEY,
            word TEXT NOT NULL UNIQUE,
            associations JSONB NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id UUID PRIMARY KEY,
            telegram_id BIGINT NOT NULL UNIQUE,
            username TEXT,
            first_name TEXT,
            last_name TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS request_history (
            id UUID PRIMARY KEY,
            user_id UUID,
            source TEXT NOT NULL DEFAULT 'web',
            original_text TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_request_history_user_id ON request_history (user_id)",
    ];

    type UserRow = (
        Uuid,
        i64,
        Option<String>,
        Option<String>,
        Option<String>,
        DateTime<Utc>,
    );

    type HistoryRow = (Uuid, Option<Uuid>, String, String, DateTime<Utc>);

    fn user_from_row(row: UserRow) -> User {
        let (id, telegram_id, username, first_name, last_name, created_at) = row;
        User {
            id,
            telegram_id,
            username,
            first_name,
            last_name,
            created_at,
        }
    }

    fn history_from_row(row: HistoryRow) -> Result<HistoryRecord, StorageError> {
        let (id, user_ref, source, original_text, created_at) = row;
        Ok(HistoryRecord {
            id,
            user_ref,
            source: source.parse().map_err(StorageError::Corrupt)?,
            original_text,
            created_at,
        })
    }

    /// PostgreSQL-backed implementation of every storage port.
    #[derive(Clone)]
    pub struct PgStore {
        pool: PgPool,
    }

    impl PgStore {
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }

        /// Create the tables if they do not exist yet.
        pub async fn migrate(&self) -> Result<(), StorageError> {
            for statement in MIGRATIONS {
                sqlx::query(statement)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| StorageError::Migration(e.to_string()))?;
            }
            log::debug!("Lexicon tables migrated");
            Ok(())
        }
    }

    #[async_trait]
    impl CacheStore for PgStore {
        async fn lookup(&self, key: &str) -> Result<Option<CacheEntry>, StorageError> {
            let key = normalize_key(key);
            let row: Option<(Json<AssociationSet>, DateTime<Utc>)> = sqlx::query_as(
                "SELECT associations, updated_at FROM word_dictionary WHERE word = $1",
            )
            .bind(&key)
            .fetch_optional(&self.pool)
            .await?;

            Ok(row.map(|(Json(set), updated_at)| CacheEntry {
                key,
                associations: set.items,
                updated_at,
            }))
        }

        async fn upsert(
            &self,
            key: &str,
            associations: &[Association],
        ) -> Result<CacheEntry, StorageError> {
            let key = normalize_key(key);
            let payload = Json(AssociationSet::from(associations.to_vec()));
            let (updated_at,): (DateTime<Utc>,) = sqlx::query_as(
                r#"
                INSERT INTO word_dictionary (id, word, associations, updated_at)
                VALUES ($1, $2, $3, now())
                ON CONFLICT (word) DO UPDATE SET
                    associations = EXCLUDED.associations,
                    updated_at = EXCLUDED.updated_at
                RETURNING updated_at
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&key)
            .bind(&payload)
            .fetch_one(&self.pool)
            .await?;

            Ok(CacheEntry {
                key,
                associations: payload.0.items,
                updated_at,
            })
        }
    }

    #[async_trait]
    impl HistoryLog for PgStore {
        async fn append(
            &self,
            source: Source,
            original_text: &str,
            user_ref: Option<Uuid>,
        ) -> Result<HistoryRecord, StorageError> {
            let record = HistoryRecord::new(source, original_text, user_ref);
            sqlx::query(
                r#"
                INSERT INTO request_history (id, user_id, source, original_text, created_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(record.id)
            .bind(record.user_ref)
            .bind(record.source.as_str())
            .bind(&record.original_text)
            .bind(record.created_at)
            .execute(&self.pool)
            .await?;

            Ok(record)
        }

        async fn list_for_user(
            &self,
            user_id: Uuid,
            skip: usize,
            limit: usize,
        ) -> Result<Vec<HistoryRecord>, StorageError> {
            let rows: Vec<HistoryRow> = sqlx::query_as(
                r#"
                SELECT id, user_id, source, original_text, created_at
                FROM request_history
                WHERE user_id = $1
                ORDER BY created_at DESC
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(user_id)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .bind(i64::try_from(skip).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

            rows.into_iter().map(history_from_row).collect()
        }
    }

    #[async_trait]
    impl UserStore for PgStore {
        async fn find_by_telegram_id(
            &self,
            telegram_id: i64,
        ) -> Result<Option<User>, StorageError> {
            let row: Option<UserRow> = sqlx::query_as(
                r#"
                SELECT id, telegram_id, username, first_name, last_name, created_at
                FROM users WHERE telegram_id = $1
                "#,
            )
            .bind(telegram_id)
            .fetch_optional(&self.pool)
            .await?;

            Ok(row.map(user_from_row))
        }

        async fn register(&self, profile: &UserProfile) -> Result<User, StorageError> {
            let row: UserRow = sqlx::query_as(
                r#"
                INSERT INTO users (id, telegram_id, username, first_name, last_name, created_at)
                VALUES ($1, $2, $3, $4, $5, now())
                ON CONFLICT (telegram_id) DO UPDATE SET
                    username = EXCLUDED.username,
                    first_name = EXCLUDED.first_name,
                    last_name = EXCLUDED.last_name
                RETURNING id, telegram_id, username, first_name, last_name, created_at
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(profile.telegram_id)
            .bind(&profile.username)
            .bind(&profile.first_name)
            .bind(&profile.last_name)
            .fetch_one(&self.pool)
            .await?;

            Ok(user_from_row(row))
        }
    }
}

#[cfg(feature = "postgres")]
pub use inner::*;
