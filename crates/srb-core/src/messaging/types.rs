use crate::domain::{ChatId, MessageRef, UserId};
use crate::flow::Action;

/// Incoming free-text message, already stripped of transport envelope.
#[derive(Clone, Debug)]
pub struct TextEvent {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub username: Option<String>,
    pub text: String,
}

/// Incoming slash command.
#[derive(Clone, Debug)]
pub struct CommandEvent {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub username: Option<String>,
    pub name: String,
}

/// Incoming button press, decoded into a typed [`Action`] at the transport
/// boundary. `message` points at the keyboard message so flows can edit it
/// in place.
#[derive(Clone, Debug)]
pub struct ActionEvent {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub username: Option<String>,
    pub action: Action,
    pub message: Option<MessageRef>,
}

/// Inline keyboard; rendered one button per row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub buttons: Vec<InlineButton>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineKeyboard {
    pub fn new(buttons: Vec<InlineButton>) -> Self {
        Self { buttons }
    }
}

impl InlineButton {
    pub fn new(label: impl Into<String>, action: &Action) -> Self {
        Self {
            label: label.into(),
            callback_data: action.encode(),
        }
    }
}
