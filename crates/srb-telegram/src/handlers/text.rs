use std::sync::Arc;

use teloxide::prelude::*;

use srb_core::{
    domain::{ChatId, UserId},
    messaging::types::TextEvent,
};

use crate::router::AppState;

use super::truncate_error;

pub async fn handle_text(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let ev = TextEvent {
        chat_id: ChatId(msg.chat.id.0),
        user_id: UserId(user.id.0 as i64),
        username: user.username.clone(),
        text: text.to_string(),
    };

    if let Err(e) = state.intake.handle_text(&ev).await {
        eprintln!("[TEXT] handler failed: {e}");
        let _ = bot
            .send_message(
                msg.chat.id,
                format!("❌ Error: {}", truncate_error(&e.to_string())),
            )
            .await;
    }

    Ok(())
}
