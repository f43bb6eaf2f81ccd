//! Cache-aside orchestration.
//!
//! [`LinguisticService::analyze`] normalizes the word, serves it from the
//! cache when possible, otherwise asks the generator, stores successful
//! results and records every attempt in history. Storage failures abort the
//! attempt without a history record and surface as a generic message.

use std::sync::Arc;

use uuid::Uuid;

use crate::core::{AppError, ProcessingResult, Source};
use crate::generator::{AssociationGenerator, GenerationError};
use crate::storage::{normalize_key, CacheStore, HistoryLog, Storage, StorageError};

/// Message returned when storage fails; the cause is only logged.
pub const INTERNAL_ERROR_MESSAGE: &str = "Произошла внутренняя ошибка при анализе слова";

/// The word → associations orchestrator shared by every channel.
#[derive(Clone)]
pub struct LinguisticService {
    cache: Arc<dyn CacheStore>,
    history: Arc<dyn HistoryLog>,
    generator: Arc<dyn AssociationGenerator>,
}

impl LinguisticService {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        history: Arc<dyn HistoryLog>,
        generator: Arc<dyn AssociationGenerator>,
    ) -> Self {
        Self {
            cache,
            history,
            generator,
        }
    }

    pub fn from_storage(storage: &Storage, generator: Arc<dyn AssociationGenerator>) -> Self {
        Self::new(storage.cache.clone(), storage.history.clone(), generator)
    }

    /// Analyze a word on behalf of an anonymous caller.
    pub async fn analyze(&self, raw_word: &str, source: Source) -> ProcessingResult {
        self.analyze_for(raw_word, source, None).await
    }

    /// Analyze a word, attributing the history record to `user_ref`.
    pub async fn analyze_for(
        &self,
        raw_word: &str,
        source: Source,
        user_ref: Option<Uuid>,
    ) -> ProcessingResult {
        let word = normalize_key(raw_word);
        tracing::info!(word = %word, source = %source, "Starting word analysis");

        match self.run(raw_word, &word, source, user_ref).await {
            Ok(result) => result,
            Err(err) => {
                let err = AppError::from(err);
                tracing::error!(
                    word = %word,
                    source = %source,
                    code = err.kind.code(),
                    details = ?err.details,
                    "Storage failure during word analysis"
                );
                ProcessingResult::failed(INTERNAL_ERROR_MESSAGE)
            }
        }
    }

    async fn run(
        &self,
        raw_word: &str,
        word: &str,
        source: Source,
        user_ref: Option<Uuid>,
    ) -> Result<ProcessingResult, StorageError> {
        if let Some(entry) = self.cache.lookup(word).await? {
            tracing::info!(word = %word, "Cache hit");
            self.history.append(source, raw_word, user_ref).await?;
            return Ok(ProcessingResult::completed(entry.associations));
        }

        tracing::info!(word = %word, "Cache miss, calling generator");
        let generated = self.generator.generate(word).await;

        match &generated {
            Ok(associations) => {
                self.cache.upsert(word, associations).await?;
                tracing::debug!(word = %word, count = associations.len(), "Saved to cache");
            }
            Err(err @ GenerationError::WordNotFound { .. }) => {
                tracing::warn!(
                    word = %word,
                    code = err.kind().code(),
                    error = %err,
                    "Word not found by generator"
                );
            }
            Err(err) => {
                tracing::error!(
                    word = %word,
                    code = err.kind().code(),
                    error = ?err,
                    "Generator call failed"
                );
            }
        }

        self.history.append(source, raw_word, user_ref).await?;

        Ok(match generated {
            Ok(associations) => ProcessingResult::completed(associations),
            Err(err) => ProcessingResult::failed(err.to_string()),
        })
    }
}
