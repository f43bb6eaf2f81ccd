//! Lexicon Telegram bot binary.
//!
//! Long-polls the Bot API with `TELEGRAM_BOT_TOKEN` and shares storage
//! settings with the server (`STORE`, `SQLITE_PATH`, `DATABASE_URL`).
//!
//! ```bash
//! TELEGRAM_BOT_TOKEN=... LLM_API_KEY=... cargo run --bin bot
//! ```

use std::sync::Arc;

use anyhow::Context;
use lexicon::bot::{self, BotContext, TelegramClient};
use lexicon::{logging, LinguisticService, OpenAiGenerator, Settings, Storage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env().context("invalid configuration")?;
    logging::init(&settings);

    let token = settings.require_telegram_token()?;
    let client = TelegramClient::new(token).context("failed to build Telegram client")?;

    let storage = Storage::connect(&settings.database)
        .await
        .context("failed to open storage")?;
    let generator = OpenAiGenerator::new(&settings.llm).context("failed to build LLM client")?;
    let service = LinguisticService::from_storage(&storage, Arc::new(generator));
    let ctx = Arc::new(BotContext::from_storage(client, service, &storage));

    tracing::info!(env = %settings.app_env, "Starting bot...");
    bot::run_polling(ctx, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for shutdown signal: {}", e);
        }
    })
    .await
    .context("bot polling failed")?;

    tracing::info!("Bot stopped");
    Ok(())
}
