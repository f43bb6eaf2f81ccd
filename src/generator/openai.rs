//! OpenAI-compatible chat-completions generator.
//!
//! Sends one JSON-mode completion per word and parses the answer into a
//! [`WordJudgement`]. Transport errors, 429 and 5xx responses are retried
//! with exponential backoff; other 4xx responses and unparsable answers fail
//! immediately.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{AssociationGenerator, GenerationError, WordJudgement};
use crate::config::LlmSettings;
use crate::core::Association;

const SYSTEM_PROMPT: &str = "Ты - эксперт-лингвист. Твоя задача - провести морфологический \
и семантический анализ слова. \
1. Проверь, существует ли слово в русском языке. Имена собственные считаются существующими. \
2. Если слово существует: подбери ровно 5 синонимов и 5 антонимов. \
3. Если слово НЕ существует (например, набор букв 'фдыва', 'ккк'): установи is_exists=false, \
а списки пустыми. \
4. Верни результат строго в JSON формате:\n\
{\n  \"is_exists\": true/false,\n  \"synonyms\": [\"слово1\", \"слово2\"...],\n  \
\"antonyms\": [\"слово1\", \"слово2\"...]\n}\n\
5. Убедись, что слова корректны и соответствуют части речи исходного слова.";

/// Generator backed by any `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_retries: u32,
    retry_backoff: Duration,
}

impl OpenAiGenerator {
    pub fn new(settings: &LlmSettings) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", settings.base_url.trim_end_matches('/')),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_retries: settings.max_retries,
            retry_backoff: Duration::from_secs(1),
        })
    }

    /// Delay before the first retry; doubles on every further attempt.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn build_request_body(&self, word: &str) -> Value {
        json!({
            "model": self.model,
            "temperature": self.temperature,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": format!("Проанализируй слово: {}", word)},
            ],
        })
    }

    /// POST the completion request and return the assistant message text.
    async fn complete(&self, word: &str) -> Result<String, String> {
        let body = self.build_request_body(word);
        let mut last_error: Option<String> = None;
        let mut retry_delay = self.retry_backoff;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                log::warn!(
                    "Completion retry attempt {} for '{}' after {:?}",
                    attempt,
                    word,
                    retry_delay
                );
                tokio::time::sleep(retry_delay).await;
                retry_delay *= 2;
            }

            let response = match self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = Some(format!("request failed: {}", e));
                    continue;
                }
            };

            let status = response.status();

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                last_error = Some("rate limited (429)".to_string());
                continue;
            }

            if status.is_server_error() {
                last_error = Some(format!("server error: {}", status));
                continue;
            }

            let response_text = match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    last_error = Some(format!("failed to read body: {}", e));
                    continue;
                }
            };

            if status.is_client_error() {
                return Err(format!("API error ({}): {}", status, truncate(&response_text)));
            }

            let response_json: Value = serde_json::from_str(&response_text).map_err(|e| {
                format!("invalid response JSON: {} - Body: {}", e, truncate(&response_text))
            })?;

            if let Some(usage) = response_json.get("usage") {
                log::debug!(
                    "Completion token usage: prompt={}, completion={}",
                    usage.get("prompt_tokens").and_then(Value::as_i64).unwrap_or(0),
                    usage.get("completion_tokens").and_then(Value::as_i64).unwrap_or(0),
                );
            }

            return response_json
                .pointer("/choices/0/message/content")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| "no message content in response".to_string());
        }

        Err(last_error.unwrap_or_else(|| "completion failed after all retries".to_string()))
    }
}

#[async_trait]
impl AssociationGenerator for OpenAiGenerator {
    async fn generate(&self, word: &str) -> Result<Vec<Association>, GenerationError> {
        log::info!("Requesting associations for '{}' from {}", word, self.model);

        let content = self
            .complete(word)
            .await
            .map_err(|detail| GenerationError::external(word, detail))?;

        let judgement: WordJudgement = serde_json::from_str(strip_code_fence(&content))
            .map_err(|e| {
                GenerationError::external(word, format!("unparsable judgement: {}", e))
            })?;

        log::debug!(
            "Backend judgement for '{}': exists={}, synonyms={}, antonyms={}",
            word,
            judgement.is_exists,
            judgement.synonyms.len(),
            judgement.antonyms.len()
        );

        judgement.into_associations(word)
    }
}

/// Remove a surrounding Markdown code fence, if any.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    match trimmed.strip_prefix("```") {
        Some(rest) => {
            let rest = rest.strip_prefix("json").unwrap_or(rest);
            rest.strip_suffix("```").unwrap_or(rest).trim()
        }
        None => trimmed,
    }
}

fn truncate(text: &str) -> &str {
    match text.char_indices().nth(500) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
