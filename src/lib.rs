//! # Lexicon
//!
//! Word association service: given a Russian word, return its synonyms and
//! antonyms. Results come from a generative backend and are cached by
//! normalized word, so each word is generated at most once in the common
//! case. Every request is recorded in an append-only history.
//!
//! Three channels share one [`LinguisticService`]:
//!
//! - the JSON API and the browser form ([`server`])
//! - the Telegram bot ([`bot`])

pub mod bot;
pub mod config;
pub mod core;
pub mod generator;
pub mod logging;
pub mod server;
pub mod service;
pub mod storage;

pub use crate::config::Settings;
pub use crate::core::{AppError, Association, AssociationKind, ProcessingResult, Source};
pub use crate::generator::{AssociationGenerator, GenerationError, OpenAiGenerator};
pub use crate::service::LinguisticService;
pub use crate::storage::Storage;

/// Crate version, reported by `/health`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
