use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    messaging::types::InlineKeyboard,
    Result,
};

/// Cross-messenger port.
///
/// Telegram is the first implementation; the shape is what the intake flows
/// actually emit: plain text, labeled choice keyboards, in-place edits and
/// file attachments.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef>;

    /// Deliver to a platform handle (`@name`) rather than a known chat id.
    /// Used for the observer notification fan-out.
    async fn send_text_to_handle(&self, handle: &str, text: &str) -> Result<MessageRef>;

    async fn send_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef>;

    async fn edit_text(&self, msg: MessageRef, text: &str) -> Result<()>;

    /// Replace both text and buttons of an existing message.
    async fn edit_keyboard(
        &self,
        msg: MessageRef,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<()>;

    /// Replace only the buttons; used to re-render toggle state.
    async fn edit_markup(&self, msg: MessageRef, keyboard: InlineKeyboard) -> Result<()>;

    async fn send_document(&self, chat_id: ChatId, file_name: &str, bytes: Vec<u8>)
        -> Result<()>;
}
