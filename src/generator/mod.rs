//! Association generation.
//!
//! [`AssociationGenerator`] is the service's only dependency on a generative
//! backend. Every failure is returned as a [`GenerationError`] value; the
//! orchestrator records it in history and reports it to the caller.

pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{Association, ErrorKind};

pub use openai::OpenAiGenerator;

/// Why generation produced no associations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// The backend judged the input not to be a real word.
    #[error("Слово '{word}' не найдено в русском языке.")]
    WordNotFound { word: String },

    /// The backend could not be reached or answered with garbage, after retries.
    #[error("Ошибка при обращении к AI сервису")]
    ExternalService { word: String, detail: String },
}

impl GenerationError {
    pub fn not_found(word: impl Into<String>) -> Self {
        Self::WordNotFound { word: word.into() }
    }

    pub fn external(word: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::ExternalService {
            word: word.into(),
            detail: detail.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::WordNotFound { .. } => ErrorKind::NotFound,
            Self::ExternalService { .. } => ErrorKind::ExternalApi,
        }
    }
}

/// Produces synonyms and antonyms for a normalized word.
#[async_trait]
pub trait AssociationGenerator: Send + Sync {
    /// Synonyms first, then antonyms, in backend order. On success the list
    /// is never empty.
    async fn generate(&self, word: &str) -> Result<Vec<Association>, GenerationError>;
}

/// The structured answer requested from the backend.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WordJudgement {
    pub is_exists: bool,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub antonyms: Vec<String>,
}

impl WordJudgement {
    /// Flatten into associations. A word the backend rejects, or one with
    /// nothing to say about it, counts as not found.
    pub fn into_associations(self, word: &str) -> Result<Vec<Association>, GenerationError> {
        if !self.is_exists {
            return Err(GenerationError::not_found(word));
        }

        let associations: Vec<Association> = self
            .synonyms
            .into_iter()
            .map(Association::synonym)
            .chain(self.antonyms.into_iter().map(Association::antonym))
            .collect();

        if associations.is_empty() {
            return Err(GenerationError::not_found(word));
        }
        Ok(associations)
    }
}
