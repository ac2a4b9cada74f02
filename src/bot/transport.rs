//! Chat transport seam between the conversation and Telegram

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{
    InlineKeyboardButton, InlineKeyboardMarkup, InputFile, KeyboardButton, KeyboardMarkup,
    KeyboardRemove,
};

/// Keyboard attached to an outgoing text
#[derive(Debug, Clone, PartialEq)]
pub enum Keyboard {
    /// Persistent reply keyboard; each inner vec is a row of button labels
    Reply(Vec<Vec<String>>),
    /// Inline buttons as `(label, callback data)`
    Inline(Vec<Vec<(String, String)>>),
    /// Hide the reply keyboard
    Remove,
}

/// Operations the conversation needs from a chat platform
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str, keyboard: Option<Keyboard>) -> Result<()>;

    /// `source` is an `http(s)://` URL or a local file path
    async fn send_photo(&self, chat_id: i64, source: &str, caption: Option<&str>) -> Result<()>;
}

fn input_file(source: &str) -> InputFile {
    if source.starts_with("http://") || source.starts_with("https://") {
        if let Ok(url) = reqwest::Url::parse(source) {
            return InputFile::url(url);
        }
    }
    InputFile::file(PathBuf::from(source))
}

#[async_trait]
impl ChatTransport for Bot {
    async fn send_text(&self, chat_id: i64, text: &str, keyboard: Option<Keyboard>) -> Result<()> {
        let request = self.send_message(ChatId(chat_id), text);
        match keyboard {
            Some(Keyboard::Reply(rows)) => {
                let markup = KeyboardMarkup::new(
                    rows.into_iter()
                        .map(|row| row.into_iter().map(KeyboardButton::new).collect::<Vec<_>>()),
                )
                .resize_keyboard();
                request.reply_markup(markup).await?;
            }
            Some(Keyboard::Inline(rows)) => {
                let markup = InlineKeyboardMarkup::new(rows.into_iter().map(|row| {
                    row.into_iter()
                        .map(|(label, data)| InlineKeyboardButton::callback(label, data))
                        .collect::<Vec<_>>()
                }));
                request.reply_markup(markup).await?;
            }
            Some(Keyboard::Remove) => {
                request.reply_markup(KeyboardRemove::new()).await?;
            }
            None => {
                request.await?;
            }
        }
        Ok(())
    }

    async fn send_photo(&self, chat_id: i64, source: &str, caption: Option<&str>) -> Result<()> {
        let request = Requester::send_photo(self, ChatId(chat_id), input_file(source));
        match caption {
            Some(caption) => request.caption(caption).await?,
            None => request.await?,
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyboard_equality() {
        let a = Keyboard::Reply(vec![vec!["Назад".to_string()]]);
        assert_eq!(a.clone(), a);
        assert_ne!(a, Keyboard::Remove);
    }
}
