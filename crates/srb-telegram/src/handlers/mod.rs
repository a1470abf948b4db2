//! Telegram update handlers.
//!
//! Each handler is a thin adapter: it decodes the update into a typed core
//! event, takes the per-chat lock, and calls into `srb-core`. Failures are
//! isolated to the single event that raised them.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
};

use crate::router::AppState;

mod callback;
mod commands;
mod text;

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    callback::handle_callback(bot, q, state).await
}

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let chat_id = msg.chat.id.0;

    if let Some(t) = msg.text() {
        if t.starts_with('/') {
            return commands::handle_command(bot, msg, state).await;
        }

        // Sequentialize text messages per chat.
        let _guard = state.chat_locks.lock_chat(chat_id).await;
        return text::handle_text(bot, msg, state).await;
    }

    let _ = bot
        .send_message(
            msg.chat.id,
            "I can only work with text messages and the menu buttons.",
        )
        .await;

    Ok(())
}

/// Keep user-facing error messages short; full detail goes to the log.
pub(crate) fn truncate_error(text: &str) -> String {
    const MAX: usize = 200;
    if text.len() <= MAX {
        return text.to_string();
    }
    format!("{}...", text.chars().take(MAX).collect::<String>())
}
