//! In-memory storage engine.
//!
//! Backs tests and `STORE=memory` deployments. Maps are guarded by
//! `parking_lot::RwLock`, so concurrent readers never block each other and
//! upserts replace whole entries atomically.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use super::{
    normalize_key, CacheEntry, CacheStore, HistoryLog, HistoryRecord, StorageError, User,
    UserProfile, UserStore,
};
use crate::core::{Association, Source};

/// Thread-safe in-memory implementation of every storage port.
#[derive(Debug, Default)]
pub struct MemoryStore {
    cache: RwLock<HashMap<String, CacheEntry>>,
    history: RwLock<Vec<HistoryRecord>>,
    users: RwLock<HashMap<i64, User>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached words.
    pub fn cache_len(&self) -> usize {
        self.cache.read().len()
    }

    /// Snapshot of every history record, oldest first.
    pub fn history(&self) -> Vec<HistoryRecord> {
        self.history.read().clone()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn lookup(&self, key: &str) -> Result<Option<CacheEntry>, StorageError> {
        Ok(self.cache.read().get(&normalize_key(key)).cloned())
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
        self.cache.write().insert(entry.key.clone(), entry.clone());
        Ok(entry)
    }
}

#[async_trait]
impl HistoryLog for MemoryStore {
    async fn append(
        &self,
        source: Source,
        original_text: &str,
        user_ref: Option<Uuid>,
    ) -> Result<HistoryRecord, StorageError> {
        let record = HistoryRecord::new(source, original_text, user_ref);
        self.history.write().push(record.clone());
        Ok(record)
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<HistoryRecord>, StorageError> {
        let history = self.history.read();
        Ok(history
            .iter()
            .rev()
            .filter(|r| r.user_ref == Some(user_id))
            .skip(skip)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_telegram_id(&self, telegram_id: i64) -> Result<Option<User>, StorageError> {
        Ok(self.users.read().get(&telegram_id).cloned())
    }

    async fn register(&self, profile: &UserProfile) -> Result<User, StorageError> {
        let mut users = self.users.write();
        let user = users
            .entry(profile.telegram_id)
            .and_modify(|user| {
                user.username = profile.username.clone();
                user.first_name = profile.first_name.clone();
                user.last_name = profile.last_name.clone();
            })
            .or_insert_with(|| User::from_profile(profile));
        Ok(user.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(telegram_id: i64, username: &str) -> UserProfile {
        UserProfile {
            telegram_id,
            username: Some(username.to_string()),
            first_name: Some("Иван".to_string()),
            last_name: None,
        }
    }

    #[tokio::test]
    async fn test_upsert_normalizes_and_replaces() {
        let store = MemoryStore::new();
        store
            .upsert(" Счастье ", &[Association::synonym("радость")])
            .await
            .unwrap();
        store
            .upsert("счастье", &[Association::antonym("горе")])
            .await
            .unwrap();

        assert_eq!(store.cache_len(), 1);
        let entry = store.lookup("СЧАСТЬЕ").await.unwrap().unwrap();
        assert_eq!(entry.key, "счастье");
        assert_eq!(entry.associations, vec![Association::antonym("горе")]);
    }

    #[tokio::test]
    async fn test_lookup_miss() {
        let store = MemoryStore::new();
        assert!(store.lookup("нет").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_history_for_user_newest_first() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        store.append(Source::Bot, "первое", Some(user)).await.unwrap();
        store.append(Source::Web, "чужое", None).await.unwrap();
        store.append(Source::Bot, "второе", Some(user)).await.unwrap();

        let records = store.list_for_user(user, 0, 10).await.unwrap();
        let texts: Vec<_> = records.iter().map(|r| r.original_text.as_str()).collect();
        assert_eq!(texts, vec!["второе", "первое"]);

        let page = store.list_for_user(user, 1, 10).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(store.history().len(), 3);
    }

    #[tokio::test]
    async fn test_register_is_stable() {
        let store = MemoryStore::new();
        let first = store.register(&profile(7, "ivan")).await.unwrap();
        let second = store.register(&profile(7, "ivan_new")).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.username.as_deref(), Some("ivan_new"));
        let found = store.find_by_telegram_id(7).await.unwrap().unwrap();
        assert_eq!(found.id, first.id);
        assert!(store.find_by_telegram_id(8).await.unwrap().is_none());
    }
}
