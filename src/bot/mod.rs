//! Bot module for handling Telegram interactions
//!
//! This module is split into several submodules for better organization:
//! - `message_handler`: Handles incoming text messages
//! - `callback_handler`: Handles inline keyboard callback queries
//! - `ui_builder`: Creates keyboards and formats messages
//! - `dialogue_manager`: The per-user conversation state machine
//! - `transport`: The chat seam the conversation talks through

pub mod callback_handler;
pub mod dialogue_manager;
pub mod message_handler;
pub mod transport;
pub mod ui_builder;

use anyhow::Result;
use teloxide::types::{Update, UpdateKind};
use teloxide::Bot;
use tracing::debug;

// Re-export main handler functions for use in main.rs
pub use callback_handler::callback_handler;
pub use message_handler::message_handler;

pub use dialogue_manager::Conversation;
pub use transport::{ChatTransport, Keyboard};

/// Route one update received over the webhook
pub async fn handle_update(bot: &Bot, conversation: &Conversation, update: Update) -> Result<()> {
    match update.kind {
        UpdateKind::Message(msg) => message_handler::handle_message(bot, &msg, conversation).await,
        UpdateKind::CallbackQuery(q) => {
            callback_handler::handle_callback_query(bot, &q, conversation).await
        }
        other => {
            debug!(update_id = ?update.id, kind = ?other, "Ignoring unsupported update");
            Ok(())
        }
    }
}
