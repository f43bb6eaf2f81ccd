//! Reply and inline keyboards.

use serde_json::{json, Value};

pub const SYNONYMS_BUTTON: &str = "Синонимы";
pub const ANTONYMS_BUTTON: &str = "Антонимы";
pub const HELP_BUTTON: &str = "Помощь";

const RETRY_PREFIX: &str = "retry:";

/// Telegram rejects callback data longer than this, in bytes.
const MAX_CALLBACK_DATA: usize = 64;

/// Persistent keyboard under the input field.
pub fn main_keyboard() -> Value {
    json!({
        "keyboard": [
            [{"text": SYNONYMS_BUTTON}, {"text": ANTONYMS_BUTTON}],
            [{"text": HELP_BUTTON}],
        ],
        "resize_keyboard": true,
    })
}

/// Inline "try again" button for `word`, or `None` when the word does not fit
/// in callback data.
pub fn retry_keyboard(word: &str) -> Option<Value> {
    let data = format!("{}{}", RETRY_PREFIX, word);
    if data.len() > MAX_CALLBACK_DATA {
        return None;
    }
    Some(json!({
        "inline_keyboard": [[{"text": "🔄 Попробовать еще раз", "callback_data": data}]],
    }))
}

/// Word carried by a retry button's callback data.
pub fn parse_retry(data: &str) -> Option<&str> {
    data.strip_prefix(RETRY_PREFIX).filter(|word| !word.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_main_keyboard_layout() {
        let keyboard = main_keyboard();
        assert_eq!(keyboard["keyboard"][0][0]["text"], SYNONYMS_BUTTON);
        assert_eq!(keyboard["keyboard"][0][1]["text"], ANTONYMS_BUTTON);
        assert_eq!(keyboard["keyboard"][1][0]["text"], HELP_BUTTON);
        assert_eq!(keyboard["resize_keyboard"], true);
    }

    #[test]
    fn test_retry_round_trip() {
        let keyboard = retry_keyboard("счастье").unwrap();
        let data = keyboard["inline_keyboard"][0][0]["callback_data"]
            .as_str()
            .unwrap();
        assert_eq!(parse_retry(data), Some("счастье"));
    }

    #[test]
    fn test_retry_respects_callback_limit() {
        // 30 Cyrillic letters are 60 bytes, plus the prefix.
        let long = "а".repeat(30);
        assert!(retry_keyboard(&long).is_none());
        assert!(retry_keyboard(&"а".repeat(29)).is_some());
    }

    #[test]
    fn test_parse_retry_rejects_other_data() {
        assert_eq!(parse_retry("retry:"), None);
        assert_eq!(parse_retry("other:слово"), None);
    }
}
