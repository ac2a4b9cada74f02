//! Message Handler module for processing incoming Telegram messages

use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::{debug, error};

use crate::localization::t;

use super::dialogue_manager::Conversation;
use super::transport::ChatTransport;

/// Handle an incoming message; only text is meaningful to the bot
pub async fn message_handler(
    bot: Bot,
    msg: Message,
    conversation: Arc<Conversation>,
) -> Result<()> {
    handle_message(&bot, &msg, &conversation).await
}

pub(crate) async fn handle_message(
    bot: &Bot,
    msg: &Message,
    conversation: &Conversation,
) -> Result<()> {
    let Some(user) = msg.from.as_ref() else {
        debug!(chat_id = %msg.chat.id, "Ignoring message without sender");
        return Ok(());
    };
    let user_id = user.id.to_string();

    let Some(text) = msg.text() else {
        debug!(user_id = %user_id, "Ignoring non-text message");
        return Ok(());
    };

    debug!(user_id = %user_id, text = %text, "Received text message");
    if let Err(e) = conversation
        .handle_text(bot, &user_id, msg.chat.id.0, text)
        .await
    {
        error!(user_id = %user_id, error = %e, "Failed to process message");
        bot.send_text(msg.chat.id.0, &t("error-processing-failed"), None)
            .await?;
    }
    Ok(())
}
