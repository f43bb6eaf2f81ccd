//! Telegram chat channel.
//!
//! [`run_polling`] long-polls the Bot API and hands each update to its own
//! tokio task, so a slow generation never blocks other chats. Failures inside
//! a handler are logged and reported to the chat with a short apology.

pub mod handlers;
pub mod keyboards;
pub mod telegram;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::{JoinError, JoinSet};

use crate::core::AppError;
use crate::storage::StorageError;

pub use handlers::{handle_update, BotContext};
pub use telegram::{TelegramClient, TelegramError, Update};

/// Seconds Telegram may hold a `getUpdates` call open.
const POLL_TIMEOUT_SECS: u64 = 30;

/// Pause after a failed poll before trying again.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

const UNEXPECTED_ERROR_TEXT: &str = "⚠ Произошла непредвиденная ошибка. Пожалуйста, попробуйте позже.";

#[derive(Debug, Error)]
pub enum BotError {
    #[error(transparent)]
    Telegram(#[from] TelegramError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl BotError {
    /// Text shown to the chat when a handler fails.
    pub fn into_user_message(self) -> String {
        match self {
            Self::Storage(err) => format!("⚠ {}", AppError::from(err).message),
            Self::Telegram(_) => UNEXPECTED_ERROR_TEXT.to_string(),
        }
    }
}

/// Poll for updates until `shutdown` resolves, then wait for the updates
/// already being handled so their cache and history writes complete.
pub async fn run_polling<F>(ctx: Arc<BotContext>, shutdown: F) -> Result<(), TelegramError>
where
    F: Future<Output = ()>,
{
    ctx.client.delete_webhook(true).await?;
    log::info!("Bot polling started");

    tokio::pin!(shutdown);
    let mut offset: Option<i64> = None;
    let mut tasks = JoinSet::new();

    loop {
        let polled = tokio::select! {
            _ = &mut shutdown => break,
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                log_join(joined);
                continue;
            }
            polled = ctx.client.get_updates(offset, POLL_TIMEOUT_SECS) => polled,
        };

        match polled {
            Ok(updates) => {
                for update in updates {
                    offset = Some(update.update_id + 1);
                    let ctx = Arc::clone(&ctx);
                    tasks.spawn(async move { dispatch(&ctx, update).await });
                }
            }
            Err(e) => {
                log::error!("getUpdates failed: {}", e);
                tokio::time::sleep(POLL_RETRY_DELAY).await;
            }
        }
    }

    log::info!("Bot polling stopped, {} update(s) in flight", tasks.len());
    while let Some(joined) = tasks.join_next().await {
        log_join(joined);
    }
    Ok(())
}

fn log_join(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        log::error!("Update handler task failed: {}", e);
    }
}

/// Run the handler for one update, reporting failures to the chat.
pub async fn dispatch(ctx: &BotContext, update: Update) {
    let Err(err) = handle_update(ctx, &update).await else {
        return;
    };

    let chat_id = update.chat_id();
    match &err {
        BotError::Storage(_) => tracing::warn!(
            update_id = update.update_id,
            chat_id = ?chat_id,
            error = %err,
            "Storage error in bot"
        ),
        BotError::Telegram(_) => tracing::error!(
            update_id = update.update_id,
            chat_id = ?chat_id,
            error = %err,
            "Unhandled error in bot"
        ),
    }

    if let Some(chat_id) = chat_id {
        if let Err(send_err) = ctx.client.send_message(chat_id, &err.into_user_message(), None).await {
            log::error!("Failed to send error message to chat {}: {}", chat_id, send_err);
        }
    }
}
