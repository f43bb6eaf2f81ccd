//! Data model and wire shapes.
//!
//! [`Association`] and [`ProcessingResult`] are what the service produces;
//! [`AssociationSet`] is the persisted cache value; [`AnalyzeRequest`] and
//! [`AnalyzeResponse`] are the JSON API bodies.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Associations
// ---------------------------------------------------------------------------

/// Relation between the requested word and an associated word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssociationKind {
    Synonym,
    Antonym,
}

/// A single synonym or antonym.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Association {
    pub word: String,
    #[serde(rename = "type")]
    pub kind: AssociationKind,
}

impl Association {
    pub fn new(word: impl Into<String>, kind: AssociationKind) -> Self {
        Self {
            word: word.into(),
            kind,
        }
    }

    pub fn synonym(word: impl Into<String>) -> Self {
        Self::new(word, AssociationKind::Synonym)
    }

    pub fn antonym(word: impl Into<String>) -> Self {
        Self::new(word, AssociationKind::Antonym)
    }
}

/// Persisted cache value: `{"items": [{"word": ..., "type": ...}, ...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationSet {
    #[serde(default)]
    pub items: Vec<Association>,
}

impl From<Vec<Association>> for AssociationSet {
    fn from(items: Vec<Association>) -> Self {
        Self { items }
    }
}

// ---------------------------------------------------------------------------
// Request source
// ---------------------------------------------------------------------------

/// Channel a request arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Web,
    Api,
    #[serde(alias = "telegram")]
    Bot,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Api => "api",
            Self::Bot => "bot",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "web" => Ok(Self::Web),
            "api" => Ok(Self::Api),
            "bot" | "telegram" => Ok(Self::Bot),
            other => Err(format!("unknown request source '{}'", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Processing result
// ---------------------------------------------------------------------------

/// Lifecycle status of an analysis request.
///
/// The service only ever returns `Completed` or `Failed`; the other variants
/// exist for wire compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Outcome of a single `analyze` call. Never persisted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub status: ProcessingStatus,
    #[serde(rename = "result")]
    pub associations: Option<Vec<Association>>,
    pub error: Option<String>,
}

impl ProcessingResult {
    pub fn completed(associations: Vec<Association>) -> Self {
        Self {
            status: ProcessingStatus::Completed,
            associations: Some(associations),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: ProcessingStatus::Failed,
            associations: None,
            error: Some(error.into()),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == ProcessingStatus::Completed
    }

    /// Associated words of one kind, in order.
    pub fn words_of(&self, kind: AssociationKind) -> impl Iterator<Item = &str> {
        self.associations
            .iter()
            .flatten()
            .filter(move |a| a.kind == kind)
            .map(|a| a.word.as_str())
    }
}

// ---------------------------------------------------------------------------
// JSON API bodies
// ---------------------------------------------------------------------------

/// Kind of linguistic request. Only association lookups are served today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    #[default]
    Synonym,
    Antonym,
    Definition,
    Examples,
}

fn default_language() -> String {
    "ru".to_string()
}

/// Body of `POST /api/analyze`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub text: String,
    #[serde(default)]
    pub request_type: RequestType,
    #[serde(default = "default_language")]
    pub language: String,
}

/// Response of `POST /api/analyze`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub request_id: Uuid,
    pub original_text: String,
    pub request_type: RequestType,
    pub status: ProcessingStatus,
    pub result: Option<Vec<Association>>,
    pub error: Option<String>,
    /// Wall-clock seconds spent in the service.
    pub execution_time: Option<f64>,
}

impl AnalyzeResponse {
    pub fn new(
        original_text: impl Into<String>,
        request_type: RequestType,
        outcome: ProcessingResult,
        execution_time: Option<f64>,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            original_text: original_text.into(),
            request_type,
            status: outcome.status,
            result: outcome.associations,
            error: outcome.error,
            execution_time,
        }
    }
}
