//! Callback Handler module for processing inline keyboard callback queries

use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::{debug, warn};

use super::dialogue_manager::Conversation;

/// Handle callback queries from inline keyboards
pub async fn callback_handler(
    bot: Bot,
    q: CallbackQuery,
    conversation: Arc<Conversation>,
) -> Result<()> {
    handle_callback_query(&bot, &q, &conversation).await
}

pub(crate) async fn handle_callback_query(
    bot: &Bot,
    q: &CallbackQuery,
    conversation: &Conversation,
) -> Result<()> {
    debug!(user_id = %q.from.id, "Received callback query from user");

    // Stop the client-side spinner whatever happens next
    if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
        warn!(user_id = %q.from.id, error = %e, "Failed to answer callback query");
    }

    let (Some(data), Some(message)) = (q.data.as_deref(), q.message.as_ref()) else {
        debug!(user_id = %q.from.id, "Callback query without data or message");
        return Ok(());
    };

    conversation
        .handle_callback(bot, &q.from.id.to_string(), message.chat().id.0, data)
        .await
}
