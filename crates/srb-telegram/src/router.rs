use std::{collections::HashMap, sync::Arc};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use tokio::sync::{Mutex, OwnedMutexGuard};

use srb_core::{
    config::Config, intake::Intake, messaging::port::MessagingPort, session::SessionStore,
    store::RecordStore,
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub intake: Arc<Intake>,
    pub sessions: Arc<SessionStore>,
    pub chat_locks: Arc<ChatLocks>,
}

/// Per-chat locks so one user's events are processed strictly in arrival
/// order while independent chats proceed concurrently.
#[derive(Default)]
pub struct ChatLocks {
    inner: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl ChatLocks {
    pub async fn lock_chat(&self, chat_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(chat_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

pub async fn run_polling(cfg: Arc<Config>, store: Arc<dyn RecordStore>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    // Basic startup info.
    if let Ok(me) = bot.get_me().await {
        println!("srb started: @{}", me.username());
    }
    println!("Admins: {}", cfg.admin_usernames.len());
    println!("Observers: {}", cfg.notify_usernames.len());
    println!("Sheet: {}", cfg.sheet_id);

    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let sessions = Arc::new(SessionStore::new());

    // Abandoned sessions otherwise live until cancelled or completed; the
    // sweeper is opt-in and never touches active conversations.
    let _sweeper = cfg
        .session_idle_timeout
        .map(|max_idle| SessionStore::spawn_sweeper(sessions.clone(), max_idle));

    let intake = Arc::new(Intake::new(
        cfg.clone(),
        store,
        messenger.clone(),
        sessions.clone(),
    ));

    let state = Arc::new(AppState {
        cfg,
        intake,
        sessions,
        chat_locks: Arc::new(ChatLocks::default()),
    });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}
