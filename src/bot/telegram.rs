//! Minimal Telegram Bot API client over reqwest.
//!
//! Covers the handful of methods the bot uses: long polling with
//! `getUpdates`, sending and editing HTML messages, and acknowledging
//! callback queries.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::storage::UserProfile;

const DEFAULT_API_ROOT: &str = "https://api.telegram.org";

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Telegram API error {code}: {description}")]
    Api { code: i64, description: String },

    #[error("Telegram API returned no result for {0}")]
    MissingResult(&'static str),
}

/// Envelope every Bot API method responds with.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

impl Update {
    /// Chat the update belongs to, if any.
    pub fn chat_id(&self) -> Option<i64> {
        self.message
            .as_ref()
            .or_else(|| self.callback_query.as_ref().and_then(|q| q.message.as_ref()))
            .map(|m| m.chat.id)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub from: Option<TgUser>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgUser {
    pub id: i64,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

impl TgUser {
    pub fn full_name(&self) -> String {
        match &self.last_name {
            Some(last) => format!("{} {}", self.first_name, last),
            None => self.first_name.clone(),
        }
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            telegram_id: self.id,
            username: self.username.clone(),
            first_name: Some(self.first_name.clone()),
            last_name: self.last_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: TgUser,
    pub message: Option<Message>,
    pub data: Option<String>,
}

/// Bot API client bound to one bot token.
#[derive(Debug, Clone)]
pub struct TelegramClient {
    client: reqwest::Client,
    base_url: String,
}

impl TelegramClient {
    pub fn new(token: &str) -> Result<Self, TelegramError> {
        Self::with_api_root(DEFAULT_API_ROOT, token)
    }

    /// Client for a self-hosted Bot API server (or a test double).
    pub fn with_api_root(api_root: &str, token: &str) -> Result<Self, TelegramError> {
        // Must outlive the long-poll timeout passed to getUpdates.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(90))
            .build()?;
        Ok(Self {
            client,
            base_url: format!("{}/bot{}", api_root.trim_end_matches('/'), token),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        body: Value,
    ) -> Result<T, TelegramError> {
        let response: ApiResponse<T> = self
            .client
            .post(format!("{}/{}", self.base_url, method))
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if !response.ok {
            return Err(TelegramError::Api {
                code: response.error_code.unwrap_or_default(),
                description: response.description.unwrap_or_default(),
            });
        }
        response.result.ok_or(TelegramError::MissingResult(method))
    }

    pub async fn delete_webhook(&self, drop_pending_updates: bool) -> Result<(), TelegramError> {
        self.call::<Value>(
            "deleteWebhook",
            json!({"drop_pending_updates": drop_pending_updates}),
        )
        .await?;
        Ok(())
    }

    /// Long-poll for updates after `offset`.
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, TelegramError> {
        let mut body = json!({
            "timeout": timeout_secs,
            "allowed_updates": ["message", "callback_query"],
        });
        if let Some(offset) = offset {
            body["offset"] = json!(offset);
        }
        self.call("getUpdates", body).await
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<Value>,
    ) -> Result<Message, TelegramError> {
        let mut body = json!({"chat_id": chat_id, "text": text, "parse_mode": "HTML"});
        if let Some(markup) = reply_markup {
            body["reply_markup"] = markup;
        }
        self.call("sendMessage", body).await
    }

    pub async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        reply_markup: Option<Value>,
    ) -> Result<(), TelegramError> {
        let mut body = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
            "parse_mode": "HTML",
        });
        if let Some(markup) = reply_markup {
            body["reply_markup"] = markup;
        }
        self.call::<Value>("editMessageText", body).await?;
        Ok(())
    }

    pub async fn answer_callback_query(&self, callback_query_id: &str) -> Result<(), TelegramError> {
        self.call::<Value>(
            "answerCallbackQuery",
            json!({"callback_query_id": callback_query_id}),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_chat_id() {
        let update: Update = serde_json::from_value(json!({
            "update_id": 10,
            "callback_query": {
                "id": "cb1",
                "from": {"id": 5, "first_name": "Анна", "is_bot": false},
                "message": {"message_id": 3, "chat": {"id": 77, "type": "private"}},
                "data": "retry:слово",
            },
        }))
        .unwrap();
        assert_eq!(update.chat_id(), Some(77));
        assert!(update.message.is_none());
    }

    #[test]
    fn test_user_profile() {
        let user: TgUser = serde_json::from_value(json!({
            "id": 5,
            "first_name": "Анна",
            "last_name": "Каренина",
            "username": "anna",
        }))
        .unwrap();
        assert_eq!(user.full_name(), "Анна Каренина");
        let profile = user.profile();
        assert_eq!(profile.telegram_id, 5);
        assert_eq!(profile.username.as_deref(), Some("anna"));
    }

    #[test]
    fn test_error_envelope() {
        let response: ApiResponse<Value> = serde_json::from_value(json!({
            "ok": false,
            "error_code": 401,
            "description": "Unauthorized",
        }))
        .unwrap();
        assert!(!response.ok);
        assert_eq!(response.error_code, Some(401));
        assert!(response.result.is_none());
    }
}
