use std::sync::Arc;

use teloxide::prelude::*;

use srb_core::{
    domain::{ChatId, MessageId, MessageRef, UserId},
    flow::Action,
    messaging::types::ActionEvent,
};

use crate::router::AppState;

use super::truncate_error;

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let cb_id = q.id.clone();

    let Some(chat) = q.message.as_ref().map(|m| m.chat.id) else {
        let _ = bot.answer_callback_query(cb_id).await;
        return Ok(());
    };
    let data = q.data.clone().unwrap_or_default();

    // Decode once at the boundary; anything outside the closed token set is
    // a stale or foreign button and only gets its spinner cleared.
    let Some(action) = Action::parse(&data) else {
        let _ = bot.answer_callback_query(cb_id).await;
        return Ok(());
    };
    let _ = bot.answer_callback_query(cb_id).await;

    let message = q.message.as_ref().map(|m| MessageRef {
        chat_id: ChatId(m.chat.id.0),
        message_id: MessageId(m.id.0),
    });

    let ev = ActionEvent {
        chat_id: ChatId(chat.0),
        user_id: UserId(q.from.id.0 as i64),
        username: q.from.username.clone(),
        action,
        message,
    };

    let _guard = state.chat_locks.lock_chat(chat.0).await;
    if let Err(e) = state.intake.handle_action(&ev).await {
        eprintln!("[CALLBACK] {data} failed: {e}");
        let _ = bot
            .send_message(chat, format!("❌ Error: {}", truncate_error(&e.to_string())))
            .await;
    }

    Ok(())
}
