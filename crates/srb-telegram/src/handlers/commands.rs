use std::sync::Arc;

use teloxide::prelude::*;

use srb_core::{
    domain::{ChatId, UserId},
    messaging::types::CommandEvent,
};

use crate::router::AppState;

use super::truncate_error;

/// Telegram may send `/cmd@botname arg1 ...`; only the bare name matters.
fn parse_command(text: &str) -> String {
    let first = text.trim().split_whitespace().next().unwrap_or("");
    first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase()
}

pub async fn handle_command(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };

    let ev = CommandEvent {
        chat_id: ChatId(msg.chat.id.0),
        user_id: UserId(user.id.0 as i64),
        username: user.username.clone(),
        name: parse_command(msg.text().unwrap_or("")),
    };

    let _guard = state.chat_locks.lock_chat(msg.chat.id.0).await;
    if let Err(e) = state.intake.handle_command(&ev).await {
        eprintln!("[COMMAND] /{} failed: {e}", ev.name);
        let _ = bot
            .send_message(
                msg.chat.id,
                format!("❌ Error: {}", truncate_error(&e.to_string())),
            )
            .await;
    }

    Ok(())
}
