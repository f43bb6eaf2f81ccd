//! Update dispatch and message rendering for the Telegram channel.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tera::escape_html;
use uuid::Uuid;

use super::keyboards::{self, ANTONYMS_BUTTON, HELP_BUTTON, SYNONYMS_BUTTON};
use super::telegram::{CallbackQuery, Message, TelegramClient, TgUser, Update};
use super::BotError;
use crate::core::{AssociationKind, ProcessingResult, Source, WordValidator, MAX_WORD_LENGTH};
use crate::service::LinguisticService;
use crate::storage::{HistoryLog, HistoryRecord, Storage, UserStore};

/// Records shown by `/history`.
pub const HISTORY_LIMIT: usize = 10;

const HELP_TEXT: &str = "Просто напиши слово, например 'счастье', и я проведу его анализ.\n\n\
Кнопки «Синонимы» и «Антонимы» покажут только нужную часть результата для последнего слова.\n\
/history — последние запросы.";

/// Everything an update handler needs.
pub struct BotContext {
    pub client: TelegramClient,
    pub service: LinguisticService,
    pub users: Arc<dyn UserStore>,
    pub history: Arc<dyn HistoryLog>,
    /// Last word analyzed per chat, for the Синонимы/Антонимы buttons.
    last_words: Mutex<HashMap<i64, String>>,
}

impl BotContext {
    pub fn new(
        client: TelegramClient,
        service: LinguisticService,
        users: Arc<dyn UserStore>,
        history: Arc<dyn HistoryLog>,
    ) -> Self {
        Self {
            client,
            service,
            users,
            history,
            last_words: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_storage(client: TelegramClient, service: LinguisticService, storage: &Storage) -> Self {
        Self::new(client, service, storage.users.clone(), storage.history.clone())
    }

    fn remember(&self, chat_id: i64, word: &str) {
        self.last_words.lock().insert(chat_id, word.to_string());
    }

    fn last_word(&self, chat_id: i64) -> Option<String> {
        self.last_words.lock().get(&chat_id).cloned()
    }

    async fn user_ref(&self, from: Option<&TgUser>) -> Result<Option<Uuid>, BotError> {
        match from {
            Some(user) => Ok(Some(self.users.register(&user.profile()).await?.id)),
            None => Ok(None),
        }
    }
}

/// What an incoming text asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Start,
    Help,
    History,
    /// One kind of association for the chat's last word.
    Only(AssociationKind),
    Analyze(&'a str),
}

pub fn parse_command(text: &str) -> Command<'_> {
    let text = text.trim();
    match text {
        SYNONYMS_BUTTON => return Command::Only(AssociationKind::Synonym),
        ANTONYMS_BUTTON => return Command::Only(AssociationKind::Antonym),
        HELP_BUTTON => return Command::Help,
        _ => {}
    }

    let Some(command) = text.strip_prefix('/') else {
        return Command::Analyze(text);
    };
    let name = command
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .split('@')
        .next()
        .unwrap_or_default();
    match name {
        "start" => Command::Start,
        "history" => Command::History,
        _ => Command::Help,
    }
}

/// Trimmed word if the bot accepts it, otherwise the reply to send.
pub fn check_word(text: &str) -> Result<&str, &'static str> {
    let word = text.trim();
    if !WordValidator::is_cyrillic(word) {
        return Err("Пожалуйста, введите слово на кириллице без посторонних символов.");
    }
    if word.chars().count() > MAX_WORD_LENGTH {
        return Err("Слишком длинное слово. Попробуйте что-то короче.");
    }
    Ok(word)
}

fn unique_words<'a>(outcome: &'a ProcessingResult, kind: AssociationKind) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    outcome
        .words_of(kind)
        .filter(|word| seen.insert(*word))
        .collect()
}

/// HTML reply for an analysis outcome. `only` restricts output to one kind.
pub fn render_result(word: &str, outcome: &ProcessingResult, only: Option<AssociationKind>) -> String {
    if !outcome.is_completed() {
        let error = outcome.error.as_deref().unwrap_or_default();
        return format!("Произошла ошибка: {}", escape_html(error));
    }

    let sections = [
        (AssociationKind::Synonym, "✅", "Синонимы"),
        (AssociationKind::Antonym, "❌", "Антонимы"),
    ];

    let mut parts = vec![format!("Результат для: <b>{}</b>\n", escape_html(word))];
    let mut found = false;
    for (kind, mark, title) in sections {
        if only.is_some_and(|wanted| wanted != kind) {
            continue;
        }
        let words = unique_words(outcome, kind);
        if words.is_empty() {
            continue;
        }
        if found {
            parts.push(String::new());
        }
        found = true;
        parts.push(format!("{} <b>{}</b>:", mark, title));
        parts.push(escape_html(&words.join(", ")));
    }

    if !found {
        return "Ничего не найдено.".to_string();
    }
    parts.join("\n")
}

fn render_history(records: &[HistoryRecord]) -> String {
    if records.is_empty() {
        return "История пуста.".to_string();
    }
    let mut lines = vec!["<b>Последние запросы:</b>".to_string()];
    for (i, record) in records.iter().enumerate() {
        lines.push(format!(
            "{}. {} — {}",
            i + 1,
            escape_html(record.original_text.trim()),
            record.created_at.format("%d.%m.%Y %H:%M")
        ));
    }
    lines.join("\n")
}

/// Handle one update end to end.
pub async fn handle_update(ctx: &BotContext, update: &Update) -> Result<(), BotError> {
    if let Some(message) = &update.message {
        handle_message(ctx, message).await
    } else if let Some(query) = &update.callback_query {
        handle_callback(ctx, query).await
    } else {
        Ok(())
    }
}

async fn handle_message(ctx: &BotContext, message: &Message) -> Result<(), BotError> {
    let Some(text) = message.text.as_deref() else {
        return Ok(());
    };
    let chat_id = message.chat.id;

    match parse_command(text) {
        Command::Start => {
            ctx.user_ref(message.from.as_ref()).await?;
            let name = message
                .from
                .as_ref()
                .map(|u| u.full_name())
                .unwrap_or_default();
            let greeting = format!(
                "Привет, {}!\nЯ LexiconAI бот. Отправь мне любое слово, и я найду для него синонимы и антонимы.",
                escape_html(&name)
            );
            ctx.client
                .send_message(chat_id, &greeting, Some(keyboards::main_keyboard()))
                .await?;
        }
        Command::Help => {
            ctx.client
                .send_message(chat_id, HELP_TEXT, Some(keyboards::main_keyboard()))
                .await?;
        }
        Command::History => {
            let user = match &message.from {
                Some(from) => ctx.users.find_by_telegram_id(from.id).await?,
                None => None,
            };
            let records = match user {
                Some(user) => ctx.history.list_for_user(user.id, 0, HISTORY_LIMIT).await?,
                None => Vec::new(),
            };
            ctx.client
                .send_message(chat_id, &render_history(&records), None)
                .await?;
        }
        Command::Only(kind) => match ctx.last_word(chat_id) {
            Some(word) => {
                analyze_and_reply(ctx, chat_id, &word, message.from.as_ref(), Some(kind)).await?
            }
            None => {
                ctx.client
                    .send_message(chat_id, "Сначала отправьте слово для анализа.", None)
                    .await?;
            }
        },
        Command::Analyze(text) => match check_word(text) {
            Ok(word) => {
                ctx.remember(chat_id, word);
                analyze_and_reply(ctx, chat_id, word, message.from.as_ref(), None).await?;
            }
            Err(reply) => {
                ctx.client.send_message(chat_id, reply, None).await?;
            }
        },
    }
    Ok(())
}

async fn handle_callback(ctx: &BotContext, query: &CallbackQuery) -> Result<(), BotError> {
    ctx.client.answer_callback_query(&query.id).await?;

    let word = query.data.as_deref().and_then(keyboards::parse_retry);
    match (word, &query.message) {
        (Some(word), Some(message)) => {
            log::info!("Retry requested for '{}' in chat {}", word, message.chat.id);
            analyze_and_reply(ctx, message.chat.id, word, Some(&query.from), None).await
        }
        _ => Ok(()),
    }
}

/// Post a status message, run the analysis and edit the status message with
/// the outcome.
async fn analyze_and_reply(
    ctx: &BotContext,
    chat_id: i64,
    word: &str,
    from: Option<&TgUser>,
    only: Option<AssociationKind>,
) -> Result<(), BotError> {
    let user_ref = ctx.user_ref(from).await?;
    let status = ctx
        .client
        .send_message(
            chat_id,
            &format!("Анализирую слово <b>{}</b>...", escape_html(word)),
            None,
        )
        .await?;

    let outcome = ctx.service.analyze_for(word, Source::Bot, user_ref).await;

    let markup = if outcome.is_completed() {
        None
    } else {
        keyboards::retry_keyboard(word)
    };
    ctx.client
        .edit_message_text(
            chat_id,
            status.message_id,
            &render_result(word, &outcome, only),
            markup,
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Association;
    use crate::generator::{AssociationGenerator, GenerationError};
    use crate::storage::{MemoryStore, StorageError};
    use async_trait::async_trait;
    use axum::extract::State;
    use axum::http::Uri;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    // -- pure helpers -------------------------------------------------------

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("/start"), Command::Start);
        assert_eq!(parse_command("/start@lexicon_bot payload"), Command::Start);
        assert_eq!(parse_command("/help"), Command::Help);
        assert_eq!(parse_command("/history"), Command::History);
        assert_eq!(parse_command("/unknown"), Command::Help);
        assert_eq!(parse_command("Помощь"), Command::Help);
        assert_eq!(
            parse_command("Синонимы"),
            Command::Only(AssociationKind::Synonym)
        );
        assert_eq!(
            parse_command("Антонимы"),
            Command::Only(AssociationKind::Antonym)
        );
        assert_eq!(parse_command("  счастье "), Command::Analyze("счастье"));
    }

    #[test]
    fn test_check_word() {
        assert_eq!(check_word(" счастье "), Ok("счастье"));
        assert!(check_word("hello").is_err());
        assert!(check_word("   ").is_err());
        assert!(check_word(&"а".repeat(MAX_WORD_LENGTH)).is_ok());
        assert_eq!(
            check_word(&"а".repeat(MAX_WORD_LENGTH + 1)),
            Err("Слишком длинное слово. Попробуйте что-то короче.")
        );
    }

    #[test]
    fn test_render_dedupes_words() {
        let outcome = ProcessingResult::completed(vec![
            Association::synonym("радость"),
            Association::synonym("радость"),
            Association::synonym("удача"),
            Association::antonym("горе"),
        ]);
        let text = render_result("счастье", &outcome, None);
        assert_eq!(
            text,
            "Результат для: <b>счастье</b>\n\n✅ <b>Синонимы</b>:\nрадость, удача\n\n❌ <b>Антонимы</b>:\nгоре"
        );
    }

    #[test]
    fn test_render_single_kind() {
        let outcome = ProcessingResult::completed(vec![
            Association::synonym("радость"),
            Association::antonym("горе"),
        ]);
        let text = render_result("счастье", &outcome, Some(AssociationKind::Antonym));
        assert!(text.contains("горе"));
        assert!(!text.contains("радость"));

        let only_synonyms = ProcessingResult::completed(vec![Association::synonym("мир")]);
        assert_eq!(
            render_result("покой", &only_synonyms, Some(AssociationKind::Antonym)),
            "Ничего не найдено."
        );
    }

    #[test]
    fn test_render_failure_is_escaped() {
        let outcome = ProcessingResult::failed("Слово '<фдыва>' не найдено");
        assert_eq!(
            render_result("фдыва", &outcome, None),
            "Произошла ошибка: Слово &#x27;&lt;фдыва&gt;&#x27; не найдено"
        );
    }

    // -- end to end against a fake Bot API -----------------------------------

    #[derive(Default)]
    struct FakeApi {
        calls: parking_lot::Mutex<Vec<(String, Value)>>,
    }

    impl FakeApi {
        fn calls(&self) -> Vec<(String, Value)> {
            self.calls.lock().clone()
        }
    }

    async fn fake_method(
        State(api): State<Arc<FakeApi>>,
        uri: Uri,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        let method = uri.path().rsplit('/').next().unwrap_or_default().to_string();
        let mut calls = api.calls.lock();
        calls.push((method.clone(), body.clone()));
        let result = match method.as_str() {
            "sendMessage" => json!({
                "message_id": calls.len(),
                "chat": {"id": body["chat_id"]},
                "text": body["text"],
            }),
            "getUpdates" => json!([]),
            _ => json!(true),
        };
        Json(json!({"ok": true, "result": result}))
    }

    struct FixedGenerator;

    #[async_trait]
    impl AssociationGenerator for FixedGenerator {
        async fn generate(&self, word: &str) -> Result<Vec<Association>, GenerationError> {
            match word {
                "счастье" => Ok(vec![
                    Association::synonym("радость"),
                    Association::antonym("горе"),
                ]),
                _ => Err(GenerationError::not_found(word)),
            }
        }
    }

    async fn context() -> (BotContext, Arc<FakeApi>, Arc<MemoryStore>) {
        let api = Arc::new(FakeApi::default());
        let app = Router::new().fallback(fake_method).with_state(api.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = TelegramClient::with_api_root(&format!("http://{}", addr), "TOKEN").unwrap();
        let store = Arc::new(MemoryStore::new());
        let storage = Storage::from_store(store.clone());
        let service = LinguisticService::from_storage(&storage, Arc::new(FixedGenerator));
        (BotContext::from_storage(client, service, &storage), api, store)
    }

    fn text_update(text: &str) -> Update {
        serde_json::from_value(json!({
            "update_id": 1,
            "message": {
                "message_id": 100,
                "chat": {"id": 42},
                "from": {"id": 7, "first_name": "Иван", "username": "ivan"},
                "text": text,
            },
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_word_is_analyzed_and_status_edited() {
        let (ctx, api, store) = context().await;

        handle_update(&ctx, &text_update("Счастье")).await.unwrap();

        let calls = api.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, "sendMessage");
        assert_eq!(calls[1].0, "editMessageText");
        assert_eq!(calls[1].1["message_id"], 1);
        let text = calls[1].1["text"].as_str().unwrap();
        assert!(text.contains("радость"));
        assert!(text.contains("горе"));
        assert!(calls[1].1.get("reply_markup").is_none());

        let history = store.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].source, Source::Bot);
        assert_eq!(history[0].original_text, "Счастье");
        let user = store.find_by_telegram_id(7).await.unwrap().unwrap();
        assert_eq!(history[0].user_ref, Some(user.id));
    }

    struct FailingUsers;

    #[async_trait]
    impl UserStore for FailingUsers {
        async fn find_by_telegram_id(
            &self,
            _telegram_id: i64,
        ) -> Result<Option<crate::storage::User>, StorageError> {
            Ok(None)
        }

        async fn register(
            &self,
            _profile: &crate::storage::UserProfile,
        ) -> Result<crate::storage::User, StorageError> {
            Err(StorageError::Unavailable("users table is down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_registration_failure_sends_no_status() {
        let (ctx, api, store) = context().await;
        let ctx = BotContext::new(
            ctx.client.clone(),
            ctx.service.clone(),
            Arc::new(FailingUsers),
            store.clone(),
        );

        let err = handle_update(&ctx, &text_update("счастье")).await.unwrap_err();

        assert!(matches!(err, BotError::Storage(_)));
        assert!(api.calls().is_empty());
        assert!(store.history().is_empty());
    }

    #[tokio::test]
    async fn test_failure_offers_retry() {
        let (ctx, api, _store) = context().await;

        handle_update(&ctx, &text_update("фдыва")).await.unwrap();

        let calls = api.calls();
        let edit = &calls[1].1;
        assert!(edit["text"].as_str().unwrap().contains("фдыва"));
        assert_eq!(
            edit["reply_markup"]["inline_keyboard"][0][0]["callback_data"],
            "retry:фдыва"
        );
    }

    #[tokio::test]
    async fn test_latin_text_is_rejected() {
        let (ctx, api, store) = context().await;

        handle_update(&ctx, &text_update("hello")).await.unwrap();

        let calls = api.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].1["text"].as_str().unwrap().contains("кириллице"));
        assert!(store.history().is_empty());
    }

    #[tokio::test]
    async fn test_kind_button_uses_last_word() {
        let (ctx, api, _store) = context().await;

        handle_update(&ctx, &text_update("Антонимы")).await.unwrap();
        assert!(api.calls()[0].1["text"]
            .as_str()
            .unwrap()
            .contains("Сначала отправьте слово"));

        handle_update(&ctx, &text_update("счастье")).await.unwrap();
        handle_update(&ctx, &text_update("Антонимы")).await.unwrap();

        let calls = api.calls();
        let last = &calls.last().unwrap().1;
        let text = last["text"].as_str().unwrap();
        assert!(text.contains("горе"));
        assert!(!text.contains("радость"));
    }

    #[tokio::test]
    async fn test_history_command() {
        let (ctx, api, _store) = context().await;

        handle_update(&ctx, &text_update("счастье")).await.unwrap();
        handle_update(&ctx, &text_update("/history")).await.unwrap();

        let calls = api.calls();
        let reply = calls.last().unwrap().1["text"].as_str().unwrap().to_string();
        assert!(reply.contains("1. счастье"));
    }

    #[tokio::test]
    async fn test_start_registers_user() {
        let (ctx, api, store) = context().await;

        handle_update(&ctx, &text_update("/start")).await.unwrap();

        let calls = api.calls();
        assert!(calls[0].1["text"].as_str().unwrap().starts_with("Привет, Иван!"));
        assert_eq!(calls[0].1["reply_markup"]["keyboard"][1][0]["text"], HELP_BUTTON);
        assert!(store.find_by_telegram_id(7).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_retry_callback() {
        let (ctx, api, store) = context().await;
        let update: Update = serde_json::from_value(json!({
            "update_id": 2,
            "callback_query": {
                "id": "cb-1",
                "from": {"id": 7, "first_name": "Иван"},
                "message": {"message_id": 5, "chat": {"id": 42}},
                "data": "retry:счастье",
            },
        }))
        .unwrap();

        handle_update(&ctx, &update).await.unwrap();

        let methods: Vec<_> = api.calls().into_iter().map(|(m, _)| m).collect();
        assert_eq!(methods, vec!["answerCallbackQuery", "sendMessage", "editMessageText"]);
        assert_eq!(store.history().len(), 1);
    }
}
