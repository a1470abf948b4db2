/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a sent message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Identity written into the "Requester Username" column.
///
/// Users without a platform handle get a synthetic `id:<numeric-id>` token so
/// every record still carries a stable requester identity.
pub fn requester_identity(username: Option<&str>, user_id: UserId) -> String {
    match username.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!("id:{}", user_id.0),
    }
}
