//! Input validation run by the channels before text reaches the service.

use once_cell::sync::Lazy;
use regex::Regex;

use super::errors::AppError;

/// Longest word the bot accepts, in characters.
pub const MAX_WORD_LENGTH: usize = 50;

static CYRILLIC_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[а-яёА-ЯЁ\s-]+$").expect("cyrillic pattern is valid"));

/// Alphabet checks for user-supplied words.
pub struct WordValidator;

impl WordValidator {
    /// True when `text` holds only Cyrillic letters, whitespace and hyphens,
    /// and at least one non-whitespace character.
    pub fn is_cyrillic(text: &str) -> bool {
        !text.trim().is_empty() && CYRILLIC_PATTERN.is_match(text)
    }

    pub fn validate_word(text: &str) -> Result<(), AppError> {
        if Self::is_cyrillic(text) {
            Ok(())
        } else {
            Err(AppError::validation(
                "Текст должен содержать только кириллические символы, пробелы или дефисы",
            )
            .with_detail("field", "text"))
        }
    }
}
