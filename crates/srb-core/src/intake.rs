//! The conversation dispatcher: field collector, platform selector,
//! submission finalizer and the query/export flows.
//!
//! Every inbound event arrives here as a typed value (command, text or
//! decoded [`Action`]); the transition table in [`Intake::handle_action`]
//! matches on `(state, action)` so the legal combination set is explicit.

use std::sync::Arc;

use chrono::{Local, NaiveDate};

use crate::{
    catalog,
    config::Config,
    domain::{requester_identity, ChatId, UserId},
    export,
    flow::{self, Action, ConvState, PlatformMode},
    messaging::{
        port::MessagingPort,
        types::{ActionEvent, CommandEvent, TextEvent},
    },
    query,
    records::{SubmissionRecord, TIMESTAMP_FORMAT},
    security::is_admin,
    session::SessionStore,
    store::RecordStore,
    Error, Result,
};

const MSG_MENU: &str =
    "Hi! I can record a new request or recall past submissions. Choose an option:";
const MSG_USE_MENU: &str = "Use /menu and choose Recall Submissions.";
const MSG_CANCELED: &str = "Canceled. Use /start to begin again.";
const MSG_SUBMISSION_CANCELED: &str = "Submission canceled. Use /start to begin again.";
const MSG_NO_PROMPT: &str = "Nothing in progress. Use /menu to get started.";
const MSG_USE_BUTTONS: &str = "Please use the buttons above to continue.";
const MSG_DENIED_EXPORT: &str = "Sorry, only admins can export CSV.";
const MSG_DENIED_DASHBOARD: &str = "Sorry, only admins can access the dashboard link.";
const MSG_DENIED_MANAGER: &str = "Sorry, only admins can access the manager view.";
const MSG_NO_USERNAME: &str =
    "I couldn't find your username. Please set a Telegram username and try again.";
const MSG_NOTHING_TO_EXPORT: &str = "No submissions found to export.";

pub struct Intake {
    cfg: Arc<Config>,
    store: Arc<dyn RecordStore>,
    messenger: Arc<dyn MessagingPort>,
    sessions: Arc<SessionStore>,
}

impl Intake {
    pub fn new(
        cfg: Arc<Config>,
        store: Arc<dyn RecordStore>,
        messenger: Arc<dyn MessagingPort>,
        sessions: Arc<SessionStore>,
    ) -> Self {
        Self {
            cfg,
            store,
            messenger,
            sessions,
        }
    }

    pub async fn handle_command(&self, ev: &CommandEvent) -> Result<()> {
        match ev.name.as_str() {
            "start" | "menu" => {
                let admin = is_admin(ev.username.as_deref(), &self.cfg.admin_usernames);
                self.messenger
                    .send_keyboard(ev.chat_id, MSG_MENU, flow::action_menu(admin))
                    .await?;
                Ok(())
            }
            "cancel" => {
                self.sessions.clear(ev.user_id).await;
                self.messenger.send_text(ev.chat_id, MSG_CANCELED).await?;
                Ok(())
            }
            "export" => {
                if self
                    .deny_unless_admin(ev.chat_id, ev.username.as_deref(), MSG_DENIED_EXPORT)
                    .await?
                {
                    return Ok(());
                }
                // Entry points never preempt an active conversation; /cancel
                // is the only non-linear exit.
                if !matches!(
                    self.sessions.state_of(ev.user_id).await,
                    None | Some(ConvState::Idle)
                ) {
                    return Ok(());
                }
                self.sessions.begin(ev.user_id, ConvState::ExportChoice).await;
                self.messenger
                    .send_keyboard(ev.chat_id, "Choose an export option:", flow::export_menu())
                    .await?;
                Ok(())
            }
            "dashboard" => {
                if self
                    .deny_unless_admin(ev.chat_id, ev.username.as_deref(), MSG_DENIED_DASHBOARD)
                    .await?
                {
                    return Ok(());
                }
                self.messenger
                    .send_text(
                        ev.chat_id,
                        &format!("Dashboard link:\n{}", self.cfg.dashboard_url()),
                    )
                    .await?;
                Ok(())
            }
            "manager" => {
                if self
                    .deny_unless_admin(ev.chat_id, ev.username.as_deref(), MSG_DENIED_MANAGER)
                    .await?
                {
                    return Ok(());
                }
                self.send_manager_view(ev.chat_id).await
            }
            "history" | "search" => {
                self.messenger.send_text(ev.chat_id, MSG_USE_MENU).await?;
                Ok(())
            }
            _ => {
                self.messenger
                    .send_text(ev.chat_id, "Unknown command. Use /menu to see what I can do.")
                    .await?;
                Ok(())
            }
        }
    }

    pub async fn handle_text(&self, ev: &TextEvent) -> Result<()> {
        let text = ev.text.trim().to_string();
        let Some(state) = self.sessions.state_of(ev.user_id).await else {
            self.messenger.send_text(ev.chat_id, MSG_NO_PROMPT).await?;
            return Ok(());
        };

        // Blank input re-prompts the pending step instead of advancing.
        if text.is_empty() {
            if let Some(prompt) = state.entry_prompt() {
                self.messenger.send_text(ev.chat_id, prompt).await?;
            }
            return Ok(());
        }

        match state {
            ConvState::BrandName
            | ConvState::CreatorName
            | ConvState::RoomNo
            | ConvState::AirDate
            | ConvState::CameraReq
            | ConvState::StageDesign
            | ConvState::OtherTech => self.collect_field(ev, state, &text).await,
            ConvState::PlatformOther => {
                self.sessions
                    .update(ev.user_id, |s| {
                        s.draft.set_text_field(state, &text);
                        s.state = ConvState::ConfirmSubmit;
                    })
                    .await;
                self.send_confirm(ev.chat_id, ev.user_id, None).await
            }
            ConvState::SearchBrand => self.run_search(ev, &text).await,
            ConvState::ExportDateStart => self.collect_export_start(ev, &text).await,
            ConvState::ExportDateEnd => self.collect_export_end(ev, &text).await,
            ConvState::ExportRequester => self.run_export_by_requester(ev, &text).await,
            ConvState::Idle => {
                self.messenger.send_text(ev.chat_id, MSG_NO_PROMPT).await?;
                Ok(())
            }
            ConvState::PlatformMode
            | ConvState::PlatformSelect
            | ConvState::ConfirmSubmit
            | ConvState::RecallMenu
            | ConvState::ExportChoice => {
                self.messenger.send_text(ev.chat_id, MSG_USE_BUTTONS).await?;
                Ok(())
            }
        }
    }

    /// Transition table for button presses. Combinations not listed here
    /// (stale buttons, entry presses mid-conversation) are ignored.
    pub async fn handle_action(&self, ev: &ActionEvent) -> Result<()> {
        let state = self.sessions.state_of(ev.user_id).await;

        match (state, &ev.action) {
            (None | Some(ConvState::Idle), Action::NewRequest) => {
                self.sessions.begin(ev.user_id, ConvState::BrandName).await;
                self.edit_or_send(ev, "Brand Name:").await
            }
            (None | Some(ConvState::Idle), Action::Recall) => {
                self.sessions.begin(ev.user_id, ConvState::RecallMenu).await;
                self.messenger
                    .send_keyboard(
                        ev.chat_id,
                        "How would you like to recall submissions?",
                        flow::recall_menu(),
                    )
                    .await?;
                Ok(())
            }
            (None | Some(ConvState::Idle), Action::Export) => {
                if self
                    .deny_unless_admin(ev.chat_id, ev.username.as_deref(), MSG_DENIED_EXPORT)
                    .await?
                {
                    return Ok(());
                }
                self.sessions.begin(ev.user_id, ConvState::ExportChoice).await;
                self.messenger
                    .send_keyboard(ev.chat_id, "Choose an export option:", flow::export_menu())
                    .await?;
                Ok(())
            }
            (_, Action::Dashboard) => {
                if self
                    .deny_unless_admin(ev.chat_id, ev.username.as_deref(), MSG_DENIED_DASHBOARD)
                    .await?
                {
                    return Ok(());
                }
                self.messenger
                    .send_text(
                        ev.chat_id,
                        &format!("Dashboard link:\n{}", self.cfg.dashboard_url()),
                    )
                    .await?;
                Ok(())
            }
            (_, Action::Manager) => {
                if self
                    .deny_unless_admin(ev.chat_id, ev.username.as_deref(), MSG_DENIED_MANAGER)
                    .await?
                {
                    return Ok(());
                }
                self.messenger
                    .send_text(ev.chat_id, "Preparing manager view...")
                    .await?;
                self.send_manager_view(ev.chat_id).await
            }
            (Some(ConvState::RecallMenu), Action::RecallHistory) => self.show_history(ev).await,
            (Some(ConvState::RecallMenu), Action::RecallSearch) => {
                self.sessions
                    .update(ev.user_id, |s| s.state = ConvState::SearchBrand)
                    .await;
                self.edit_or_send(ev, "Enter the Brand Name to search:").await
            }
            (Some(ConvState::PlatformMode), Action::ModeSingle | Action::ModeMulti) => {
                let mode = if matches!(ev.action, Action::ModeSingle) {
                    PlatformMode::Single
                } else {
                    PlatformMode::Multi
                };
                self.sessions
                    .update(ev.user_id, |s| {
                        s.draft.platform_mode = Some(mode);
                        s.draft.platforms.clear();
                        s.state = ConvState::PlatformSelect;
                    })
                    .await;
                match ev.message {
                    Some(msg) => {
                        self.messenger
                            .edit_keyboard(msg, "Select platform(s):", flow::platforms_menu(&[]))
                            .await
                    }
                    None => self
                        .messenger
                        .send_keyboard(ev.chat_id, "Select platform(s):", flow::platforms_menu(&[]))
                        .await
                        .map(|_| ()),
                }
            }
            (Some(ConvState::PlatformSelect), Action::PlatformToggle(name)) => {
                if !catalog::is_known(name) {
                    return Ok(());
                }
                let Some(selected) = self
                    .sessions
                    .update(ev.user_id, |s| {
                        s.draft.apply_toggle(name);
                        s.draft.platforms.clone()
                    })
                    .await
                else {
                    return Ok(());
                };
                if let Some(msg) = ev.message {
                    self.messenger
                        .edit_markup(msg, flow::platforms_menu(&selected))
                        .await?;
                }
                Ok(())
            }
            (Some(ConvState::PlatformSelect), Action::PlatformDone) => {
                // An empty selection is accepted: no enforced minimum.
                let Some(has_others) = self
                    .sessions
                    .update(ev.user_id, |s| {
                        s.draft.platforms.iter().any(|p| p == catalog::OTHERS)
                    })
                    .await
                else {
                    return Ok(());
                };
                if has_others {
                    self.sessions
                        .update(ev.user_id, |s| s.state = ConvState::PlatformOther)
                        .await;
                    self.edit_or_send(ev, "Please specify other platforms:").await
                } else {
                    self.sessions
                        .update(ev.user_id, |s| s.state = ConvState::ConfirmSubmit)
                        .await;
                    self.send_confirm(ev.chat_id, ev.user_id, ev.message).await
                }
            }
            (Some(ConvState::ConfirmSubmit), Action::ConfirmNo) => {
                self.sessions.clear(ev.user_id).await;
                self.edit_or_send(ev, MSG_SUBMISSION_CANCELED).await
            }
            (Some(ConvState::ConfirmSubmit), Action::ConfirmYes) => self.finalize(ev).await,
            (Some(ConvState::ExportChoice), Action::ExportAll) => {
                self.edit_or_send(ev, "Preparing CSV export...").await?;
                let records = match self.store.read_all().await {
                    Ok(r) => r,
                    Err(e) => {
                        return self.report_store_failure(ev.chat_id, ev.user_id, &e).await
                    }
                };
                self.sessions.clear(ev.user_id).await;
                self.send_export(ev.chat_id, &records).await
            }
            (Some(ConvState::ExportChoice), Action::ExportByDate) => {
                self.sessions
                    .update(ev.user_id, |s| s.state = ConvState::ExportDateStart)
                    .await;
                self.edit_or_send(ev, "Enter start date (YYYY-MM-DD):").await
            }
            (Some(ConvState::ExportChoice), Action::ExportByRequester) => {
                self.sessions
                    .update(ev.user_id, |s| s.state = ConvState::ExportRequester)
                    .await;
                self.edit_or_send(ev, "Enter requester username (without @):").await
            }
            _ => Ok(()),
        }
    }

    async fn collect_field(&self, ev: &TextEvent, state: ConvState, text: &str) -> Result<()> {
        let next = state.next_after_text().ok_or_else(|| {
            Error::External(format!("state {state:?} has no text successor"))
        })?;
        self.sessions
            .update(ev.user_id, |s| {
                s.draft.set_text_field(state, text);
                s.state = next;
            })
            .await;

        if next == ConvState::PlatformMode {
            self.messenger
                .send_keyboard(ev.chat_id, "Platform to be used:", flow::platform_mode_menu())
                .await?;
            return Ok(());
        }
        if let Some(prompt) = next.entry_prompt() {
            self.messenger.send_text(ev.chat_id, prompt).await?;
        }
        Ok(())
    }

    async fn send_confirm(
        &self,
        chat_id: ChatId,
        user: UserId,
        edit: Option<crate::domain::MessageRef>,
    ) -> Result<()> {
        let Some(summary) = self.sessions.update(user, |s| s.draft.summary()).await else {
            return Ok(());
        };
        let text = format!("Please confirm your submission:\n\n{summary}");
        match edit {
            Some(msg) => {
                self.messenger
                    .edit_keyboard(msg, &text, flow::confirm_menu())
                    .await
            }
            None => self
                .messenger
                .send_keyboard(chat_id, &text, flow::confirm_menu())
                .await
                .map(|_| ()),
        }
    }

    async fn finalize(&self, ev: &ActionEvent) -> Result<()> {
        let Some(draft) = self.sessions.update(ev.user_id, |s| s.draft.clone()).await else {
            return Ok(());
        };

        let requester = requester_identity(ev.username.as_deref(), ev.user_id);
        let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
        let record = draft.to_record(timestamp.clone(), requester.clone());

        if let Err(e) = self.store.append(&record).await {
            // Terminal: the pending prompt is dropped, but only the success
            // path or an explicit cancel wipes the collected data.
            self.sessions
                .update(ev.user_id, |s| s.state = ConvState::Idle)
                .await;
            return self
                .edit_or_send(ev, &format!("Sorry, I couldn't save your request. Error: {e}"))
                .await;
        }

        let summary = draft.summary();
        self.edit_or_send(ev, &format!("Your request has been recorded.\n\n{summary}"))
            .await?;

        // Fan-out is best-effort and per-recipient isolated; a failed
        // observer never affects the others or the reported success.
        let notify_text = format!(
            "New request submitted:\n\n{summary}\n\nSubmitted by: @{requester}\nTimestamp: {timestamp}"
        );
        if let Err(e) = self.messenger.send_text(ev.chat_id, &notify_text).await {
            eprintln!("[NOTIFY] Failed to echo submission to chat {}: {e}", ev.chat_id.0);
        }
        for observer in &self.cfg.notify_usernames {
            if let Err(e) = self
                .messenger
                .send_text_to_handle(&format!("@{observer}"), &notify_text)
                .await
            {
                eprintln!("[NOTIFY] Failed to notify @{observer}: {e}");
            }
        }

        self.sessions.clear(ev.user_id).await;
        Ok(())
    }

    async fn show_history(&self, ev: &ActionEvent) -> Result<()> {
        let username = ev.username.as_deref().map(str::trim).unwrap_or("");
        if username.is_empty() {
            self.sessions.clear(ev.user_id).await;
            return self.edit_or_send(ev, MSG_NO_USERNAME).await;
        }

        let records = match self.store.read_all().await {
            Ok(r) => r,
            Err(e) => return self.report_store_failure(ev.chat_id, ev.user_id, &e).await,
        };
        self.sessions.clear(ev.user_id).await;

        let latest = query::history(&records, username);
        if latest.is_empty() {
            return self
                .edit_or_send(ev, "No submissions found for your username.")
                .await;
        }
        let lines: Vec<String> = latest
            .iter()
            .map(|r| format!("- {} | {} | {}", r.timestamp, r.brand_name, r.date_to_be_aired))
            .collect();
        self.edit_or_send(ev, &format!("Your last submissions:\n{}", lines.join("\n")))
            .await
    }

    async fn run_search(&self, ev: &TextEvent, needle: &str) -> Result<()> {
        let records = match self.store.read_all().await {
            Ok(r) => r,
            Err(e) => return self.report_store_failure(ev.chat_id, ev.user_id, &e).await,
        };
        self.sessions.clear(ev.user_id).await;

        let matches = query::search_brand(&records, needle);
        if matches.is_empty() {
            self.messenger
                .send_text(ev.chat_id, "No submissions found for that brand name.")
                .await?;
            return Ok(());
        }
        let lines: Vec<String> = matches
            .iter()
            .map(|r| format!("- {} | {} | {}", r.timestamp, r.brand_name, r.requester))
            .collect();
        self.messenger
            .send_text(ev.chat_id, &format!("Matches:\n{}", lines.join("\n")))
            .await?;
        Ok(())
    }

    async fn collect_export_start(&self, ev: &TextEvent, text: &str) -> Result<()> {
        let Ok(start) = parse_date(text) else {
            self.messenger
                .send_text(
                    ev.chat_id,
                    "Invalid date format. Please enter start date as YYYY-MM-DD:",
                )
                .await?;
            return Ok(());
        };
        self.sessions
            .update(ev.user_id, |s| {
                s.export_start = Some(start);
                s.state = ConvState::ExportDateEnd;
            })
            .await;
        self.messenger
            .send_text(ev.chat_id, "Enter end date (YYYY-MM-DD):")
            .await?;
        Ok(())
    }

    async fn collect_export_end(&self, ev: &TextEvent, text: &str) -> Result<()> {
        let Ok(end) = parse_date(text) else {
            self.messenger
                .send_text(
                    ev.chat_id,
                    "Invalid date format. Please enter end date as YYYY-MM-DD:",
                )
                .await?;
            return Ok(());
        };
        let Some(start) = self
            .sessions
            .update(ev.user_id, |s| s.export_start)
            .await
            .flatten()
        else {
            self.sessions
                .update(ev.user_id, |s| s.state = ConvState::ExportDateStart)
                .await;
            self.messenger
                .send_text(ev.chat_id, "Enter start date (YYYY-MM-DD):")
                .await?;
            return Ok(());
        };

        if end < start {
            self.messenger
                .send_text(
                    ev.chat_id,
                    "End date must be after start date. Enter end date (YYYY-MM-DD):",
                )
                .await?;
            return Ok(());
        }

        let records = match self.store.read_all().await {
            Ok(r) => r,
            Err(e) => return self.report_store_failure(ev.chat_id, ev.user_id, &e).await,
        };
        self.sessions.clear(ev.user_id).await;

        let filtered = query::filter_by_date_range(&records, start, end);
        self.send_export(ev.chat_id, &filtered).await
    }

    async fn run_export_by_requester(&self, ev: &TextEvent, text: &str) -> Result<()> {
        let requester = text.trim_start_matches('@');
        let records = match self.store.read_all().await {
            Ok(r) => r,
            Err(e) => return self.report_store_failure(ev.chat_id, ev.user_id, &e).await,
        };
        self.sessions.clear(ev.user_id).await;

        let filtered = query::filter_by_requester(&records, requester);
        self.send_export(ev.chat_id, &filtered).await
    }

    async fn send_export(&self, chat_id: ChatId, records: &[SubmissionRecord]) -> Result<()> {
        if records.is_empty() {
            self.messenger
                .send_text(chat_id, MSG_NOTHING_TO_EXPORT)
                .await?;
            return Ok(());
        }
        let bytes = export::render_csv(records)?;
        let name = export::file_name(Local::now());
        self.messenger.send_document(chat_id, &name, bytes).await
    }

    async fn send_manager_view(&self, chat_id: ChatId) -> Result<()> {
        let records = match self.store.read_all().await {
            Ok(r) => r,
            Err(e) => {
                self.messenger
                    .send_text(chat_id, &format!("Sorry, I couldn't access the sheet. Error: {e}"))
                    .await?;
                return Ok(());
            }
        };

        let stats = query::manager_stats(&records, Local::now());
        let top_lines = if stats.top_brands.is_empty() {
            "- None".to_string()
        } else {
            stats
                .top_brands
                .iter()
                .map(|(name, count)| format!("- {name}: {count}"))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let message = format!(
            "Manager View\nTotal submissions: {}\nLast 7 days: {}\nLast 30 days: {}\nTop brands:\n{top_lines}",
            stats.total, stats.last_7_days, stats.last_30_days
        );
        self.messenger.send_text(chat_id, &message).await?;
        Ok(())
    }

    async fn deny_unless_admin(
        &self,
        chat_id: ChatId,
        username: Option<&str>,
        denial: &str,
    ) -> Result<bool> {
        if is_admin(username, &self.cfg.admin_usernames) {
            return Ok(false);
        }
        self.messenger.send_text(chat_id, denial).await?;
        Ok(true)
    }

    /// Store failures terminate the current conversation branch; the error
    /// text is surfaced verbatim and there is no retry state.
    async fn report_store_failure(
        &self,
        chat_id: ChatId,
        user: UserId,
        err: &Error,
    ) -> Result<()> {
        self.sessions.clear(user).await;
        self.messenger
            .send_text(chat_id, &format!("Sorry, I couldn't access the sheet. Error: {err}"))
            .await?;
        Ok(())
    }

    async fn edit_or_send(&self, ev: &ActionEvent, text: &str) -> Result<()> {
        match ev.message {
            Some(msg) => self.messenger.edit_text(msg, text).await,
            None => self.messenger.send_text(ev.chat_id, text).await.map(|_| ()),
        }
    }
}

/// Export-range dates are the one place user text is actually parsed.
fn parse_date(text: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
        .map_err(|e| Error::Validation(format!("bad date {text:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MessageId, MessageRef};
    use crate::messaging::types::InlineKeyboard;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    const CHAT: ChatId = ChatId(10);

    #[derive(Default)]
    struct FakeMessenger {
        next_id: Mutex<i32>,
        texts: Mutex<Vec<(i64, String)>>,
        handle_texts: Mutex<Vec<(String, String)>>,
        keyboards: Mutex<Vec<(i64, String, InlineKeyboard)>>,
        edits: Mutex<Vec<(MessageRef, String)>>,
        edited_keyboards: Mutex<Vec<(MessageRef, String, InlineKeyboard)>>,
        markups: Mutex<Vec<(MessageRef, InlineKeyboard)>>,
        documents: Mutex<Vec<(i64, String, Vec<u8>)>>,
        failing_handles: Mutex<HashSet<String>>,
    }

    impl FakeMessenger {
        fn alloc(&self, chat_id: ChatId) -> MessageRef {
            let mut guard = self.next_id.lock().unwrap();
            *guard += 1;
            MessageRef {
                chat_id,
                message_id: MessageId(*guard),
            }
        }

        fn fail_handle(&self, handle: &str) {
            self.failing_handles.lock().unwrap().insert(handle.to_string());
        }

        /// Every user-visible text in send order (sends, edits, keyboards).
        fn all_texts(&self) -> Vec<String> {
            let mut out: Vec<String> =
                self.texts.lock().unwrap().iter().map(|(_, t)| t.clone()).collect();
            out.extend(self.edits.lock().unwrap().iter().map(|(_, t)| t.clone()));
            out.extend(
                self.keyboards.lock().unwrap().iter().map(|(_, t, _)| t.clone()),
            );
            out.extend(
                self.edited_keyboards
                    .lock()
                    .unwrap()
                    .iter()
                    .map(|(_, t, _)| t.clone()),
            );
            out
        }

        fn saw(&self, needle: &str) -> bool {
            self.all_texts().iter().any(|t| t.contains(needle))
        }

        fn notified(&self) -> Vec<String> {
            self.handle_texts
                .lock()
                .unwrap()
                .iter()
                .map(|(h, _)| h.clone())
                .collect()
        }

        fn documents_sent(&self) -> Vec<(i64, String, Vec<u8>)> {
            self.documents.lock().unwrap().clone()
        }

        fn last_markup(&self) -> Option<InlineKeyboard> {
            self.markups.lock().unwrap().last().map(|(_, kb)| kb.clone())
        }
    }

    #[async_trait]
    impl MessagingPort for FakeMessenger {
        async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
            self.texts.lock().unwrap().push((chat_id.0, text.to_string()));
            Ok(self.alloc(chat_id))
        }

        async fn send_text_to_handle(&self, handle: &str, text: &str) -> Result<MessageRef> {
            if self.failing_handles.lock().unwrap().contains(handle) {
                return Err(Error::Notify(format!("blocked by {handle}")));
            }
            self.handle_texts
                .lock()
                .unwrap()
                .push((handle.to_string(), text.to_string()));
            Ok(self.alloc(CHAT))
        }

        async fn send_keyboard(
            &self,
            chat_id: ChatId,
            text: &str,
            keyboard: InlineKeyboard,
        ) -> Result<MessageRef> {
            self.keyboards
                .lock()
                .unwrap()
                .push((chat_id.0, text.to_string(), keyboard));
            Ok(self.alloc(chat_id))
        }

        async fn edit_text(&self, msg: MessageRef, text: &str) -> Result<()> {
            self.edits.lock().unwrap().push((msg, text.to_string()));
            Ok(())
        }

        async fn edit_keyboard(
            &self,
            msg: MessageRef,
            text: &str,
            keyboard: InlineKeyboard,
        ) -> Result<()> {
            self.edited_keyboards
                .lock()
                .unwrap()
                .push((msg, text.to_string(), keyboard));
            Ok(())
        }

        async fn edit_markup(&self, msg: MessageRef, keyboard: InlineKeyboard) -> Result<()> {
            self.markups.lock().unwrap().push((msg, keyboard));
            Ok(())
        }

        async fn send_document(
            &self,
            chat_id: ChatId,
            file_name: &str,
            bytes: Vec<u8>,
        ) -> Result<()> {
            self.documents
                .lock()
                .unwrap()
                .push((chat_id.0, file_name.to_string(), bytes));
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeStore {
        rows: Mutex<Vec<SubmissionRecord>>,
        reads: AtomicUsize,
        appends: AtomicUsize,
        fail_append: AtomicBool,
        fail_read: AtomicBool,
    }

    impl FakeStore {
        fn rows(&self) -> Vec<SubmissionRecord> {
            self.rows.lock().unwrap().clone()
        }

        fn seed(&self, records: Vec<SubmissionRecord>) {
            *self.rows.lock().unwrap() = records;
        }
    }

    #[async_trait]
    impl RecordStore for FakeStore {
        async fn append(&self, record: &SubmissionRecord) -> Result<()> {
            self.appends.fetch_add(1, Ordering::SeqCst);
            if self.fail_append.load(Ordering::SeqCst) {
                return Err(Error::StoreWrite("sheet quota exceeded".to_string()));
            }
            self.rows.lock().unwrap().push(record.clone());
            Ok(())
        }

        async fn read_all(&self) -> Result<Vec<SubmissionRecord>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self.fail_read.load(Ordering::SeqCst) {
                return Err(Error::StoreRead("sheet unavailable".to_string()));
            }
            Ok(self.rows())
        }
    }

    struct Harness {
        intake: Intake,
        messenger: Arc<FakeMessenger>,
        store: Arc<FakeStore>,
        sessions: Arc<SessionStore>,
    }

    fn harness() -> Harness {
        let cfg = Arc::new(Config {
            telegram_bot_token: "x".to_string(),
            admin_usernames: vec!["boss".to_string()],
            notify_usernames: vec!["ops1".to_string(), "ops2".to_string()],
            sheet_id: "sheet123".to_string(),
            sheet_name: "Requests".to_string(),
            sheets_access_token: "token".to_string(),
            session_idle_timeout: None,
        });
        let messenger = Arc::new(FakeMessenger::default());
        let store = Arc::new(FakeStore::default());
        let sessions = Arc::new(SessionStore::new());
        let intake = Intake::new(
            cfg,
            store.clone() as Arc<dyn RecordStore>,
            messenger.clone() as Arc<dyn MessagingPort>,
            sessions.clone(),
        );
        Harness {
            intake,
            messenger,
            store,
            sessions,
        }
    }

    fn text_ev(user: i64, username: Option<&str>, text: &str) -> TextEvent {
        TextEvent {
            chat_id: CHAT,
            user_id: UserId(user),
            username: username.map(|s| s.to_string()),
            text: text.to_string(),
        }
    }

    fn action_ev(user: i64, username: Option<&str>, action: Action) -> ActionEvent {
        ActionEvent {
            chat_id: CHAT,
            user_id: UserId(user),
            username: username.map(|s| s.to_string()),
            action,
            message: Some(MessageRef {
                chat_id: CHAT,
                message_id: MessageId(1),
            }),
        }
    }

    fn command_ev(user: i64, username: Option<&str>, name: &str) -> CommandEvent {
        CommandEvent {
            chat_id: CHAT,
            user_id: UserId(user),
            username: username.map(|s| s.to_string()),
            name: name.to_string(),
        }
    }

    const FORM_ANSWERS: [&str; 7] = [
        "ACME",
        "Jane",
        "3A",
        "2026-09-01",
        "2 cams",
        "LED wall",
        "none",
    ];

    async fn fill_form(h: &Harness, user: i64, username: Option<&str>) {
        h.intake
            .handle_action(&action_ev(user, username, Action::NewRequest))
            .await
            .unwrap();
        for answer in FORM_ANSWERS {
            h.intake
                .handle_text(&text_ev(user, username, answer))
                .await
                .unwrap();
        }
    }

    async fn select_and_confirm(
        h: &Harness,
        user: i64,
        username: Option<&str>,
        mode: Action,
        toggles: &[&str],
        other_text: Option<&str>,
    ) {
        h.intake
            .handle_action(&action_ev(user, username, mode))
            .await
            .unwrap();
        for name in toggles {
            h.intake
                .handle_action(&action_ev(
                    user,
                    username,
                    Action::PlatformToggle(name.to_string()),
                ))
                .await
                .unwrap();
        }
        h.intake
            .handle_action(&action_ev(user, username, Action::PlatformDone))
            .await
            .unwrap();
        if let Some(text) = other_text {
            h.intake
                .handle_text(&text_ev(user, username, text))
                .await
                .unwrap();
        }
        h.intake
            .handle_action(&action_ev(user, username, Action::ConfirmYes))
            .await
            .unwrap();
    }

    fn record(requester: &str, brand: &str, timestamp: &str) -> SubmissionRecord {
        SubmissionRecord {
            timestamp: timestamp.to_string(),
            requester: requester.to_string(),
            brand_name: brand.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn single_mode_submission_round_trips_into_history() {
        let h = harness();
        fill_form(&h, 1, Some("alice")).await;
        select_and_confirm(&h, 1, Some("alice"), Action::ModeSingle, &["Facebook"], None).await;

        let rows = h.store.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].requester, "alice");
        assert_eq!(rows[0].brand_name, "ACME");
        assert_eq!(rows[0].platform_mode, "Single");
        assert_eq!(rows[0].platforms, "Facebook");
        assert_eq!(rows[0].platforms_other, "");

        // Session is gone and both observers were notified.
        assert_eq!(h.sessions.state_of(UserId(1)).await, None);
        assert_eq!(h.messenger.notified(), vec!["@ops1", "@ops2"]);
        assert!(h.messenger.saw("Your request has been recorded."));

        // The freshly written record is the newest history entry.
        let latest = query::history(&rows, "alice");
        assert_eq!(latest.last().unwrap().brand_name, "ACME");
    }

    #[tokio::test]
    async fn multi_mode_with_others_collects_custom_platform_text() {
        let h = harness();
        fill_form(&h, 1, Some("alice")).await;
        select_and_confirm(
            &h,
            1,
            Some("alice"),
            Action::ModeMulti,
            &["Others", "TikTok"],
            Some("Podcast Clips"),
        )
        .await;

        assert!(h.messenger.saw("Please specify other platforms:"));
        let rows = h.store.rows();
        assert_eq!(rows[0].platforms, "Others, TikTok");
        assert_eq!(rows[0].platforms_other, "Podcast Clips");
    }

    #[tokio::test]
    async fn single_mode_replaces_previous_selection() {
        let h = harness();
        fill_form(&h, 1, Some("alice")).await;
        select_and_confirm(
            &h,
            1,
            Some("alice"),
            Action::ModeSingle,
            &["Facebook", "Shopee", "YouTube"],
            None,
        )
        .await;

        assert_eq!(h.store.rows()[0].platforms, "YouTube");
    }

    #[tokio::test]
    async fn toggle_rerenders_keyboard_with_current_membership() {
        let h = harness();
        fill_form(&h, 1, Some("alice")).await;
        h.intake
            .handle_action(&action_ev(1, Some("alice"), Action::ModeMulti))
            .await
            .unwrap();
        h.intake
            .handle_action(&action_ev(
                1,
                Some("alice"),
                Action::PlatformToggle("Facebook".to_string()),
            ))
            .await
            .unwrap();

        let kb = h.messenger.last_markup().unwrap();
        assert_eq!(kb.buttons[0].label, "[x] Facebook");
        assert_eq!(kb.buttons[1].label, "[ ] Instagram");
    }

    #[tokio::test]
    async fn unknown_platform_toggle_is_ignored() {
        let h = harness();
        fill_form(&h, 1, Some("alice")).await;
        h.intake
            .handle_action(&action_ev(1, Some("alice"), Action::ModeMulti))
            .await
            .unwrap();
        h.intake
            .handle_action(&action_ev(
                1,
                Some("alice"),
                Action::PlatformToggle("MySpace".to_string()),
            ))
            .await
            .unwrap();

        assert!(h.messenger.last_markup().is_none());
    }

    #[tokio::test]
    async fn done_with_empty_selection_is_accepted() {
        // No enforced minimum: an intentional permissive boundary, not a gap.
        let h = harness();
        fill_form(&h, 1, Some("alice")).await;
        select_and_confirm(&h, 1, Some("alice"), Action::ModeMulti, &[], None).await;

        let rows = h.store.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].platforms, "");
    }

    #[tokio::test]
    async fn confirm_no_clears_session_without_writing() {
        let h = harness();
        fill_form(&h, 1, Some("alice")).await;
        h.intake
            .handle_action(&action_ev(1, Some("alice"), Action::ModeSingle))
            .await
            .unwrap();
        h.intake
            .handle_action(&action_ev(1, Some("alice"), Action::PlatformDone))
            .await
            .unwrap();
        h.intake
            .handle_action(&action_ev(1, Some("alice"), Action::ConfirmNo))
            .await
            .unwrap();

        assert!(h.store.rows().is_empty());
        assert_eq!(h.sessions.state_of(UserId(1)).await, None);
        assert!(h.messenger.saw("Submission canceled."));
    }

    #[tokio::test]
    async fn cancel_command_discards_mid_form_session() {
        let h = harness();
        fill_form(&h, 1, Some("alice")).await;
        h.intake
            .handle_command(&command_ev(1, Some("alice"), "cancel"))
            .await
            .unwrap();

        assert_eq!(h.sessions.state_of(UserId(1)).await, None);
        assert!(h.messenger.saw("Canceled."));
    }

    #[tokio::test]
    async fn requester_identity_falls_back_when_handle_is_missing() {
        let h = harness();
        fill_form(&h, 77, None).await;
        select_and_confirm(&h, 77, None, Action::ModeSingle, &["Lazada"], None).await;

        assert_eq!(h.store.rows()[0].requester, "id:77");
    }

    #[tokio::test]
    async fn write_failure_reports_error_and_leaves_no_retry_state() {
        let h = harness();
        h.store.fail_append.store(true, Ordering::SeqCst);
        fill_form(&h, 1, Some("alice")).await;
        select_and_confirm(&h, 1, Some("alice"), Action::ModeSingle, &["Facebook"], None).await;

        assert!(h
            .messenger
            .saw("Sorry, I couldn't save your request. Error: sheet quota exceeded"));
        assert_eq!(h.sessions.state_of(UserId(1)).await, Some(ConvState::Idle));
        assert!(h.messenger.notified().is_empty());

        // A stale Confirm press must not retry the write.
        h.intake
            .handle_action(&action_ev(1, Some("alice"), Action::ConfirmYes))
            .await
            .unwrap();
        assert_eq!(h.store.appends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn observer_failure_does_not_block_remaining_fanout() {
        let h = harness();
        h.messenger.fail_handle("@ops1");
        fill_form(&h, 1, Some("alice")).await;
        select_and_confirm(&h, 1, Some("alice"), Action::ModeSingle, &["Facebook"], None).await;

        assert_eq!(h.messenger.notified(), vec!["@ops2"]);
        assert!(h.messenger.saw("Your request has been recorded."));
        assert_eq!(h.sessions.state_of(UserId(1)).await, None);
    }

    #[tokio::test]
    async fn non_admin_export_is_denied_without_a_store_read() {
        let h = harness();
        h.intake
            .handle_action(&action_ev(1, Some("mallory"), Action::Export))
            .await
            .unwrap();

        assert!(h.messenger.saw("Sorry, only admins can export CSV."));
        assert_eq!(h.store.reads.load(Ordering::SeqCst), 0);
        assert_eq!(h.sessions.state_of(UserId(1)).await, None);
    }

    #[tokio::test]
    async fn admin_export_all_delivers_a_csv_document() {
        let h = harness();
        h.store.seed(vec![
            record("alice", "ACME", "2026-08-01 10:00:00"),
            record("bob", "Globex", "2026-08-02 11:00:00"),
        ]);

        h.intake
            .handle_action(&action_ev(2, Some("boss"), Action::Export))
            .await
            .unwrap();
        h.intake
            .handle_action(&action_ev(2, Some("boss"), Action::ExportAll))
            .await
            .unwrap();

        let docs = h.messenger.documents_sent();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].1.starts_with("request-submissions-"));
        assert!(docs[0].1.ends_with(".csv"));
        let body = String::from_utf8(docs[0].2.clone()).unwrap();
        assert!(body.contains("ACME"));
        assert!(body.contains("Globex"));
    }

    #[tokio::test]
    async fn empty_export_sends_a_notice_instead_of_a_file() {
        let h = harness();
        h.intake
            .handle_action(&action_ev(2, Some("boss"), Action::Export))
            .await
            .unwrap();
        h.intake
            .handle_action(&action_ev(2, Some("boss"), Action::ExportAll))
            .await
            .unwrap();

        assert!(h.messenger.documents_sent().is_empty());
        assert!(h.messenger.saw(MSG_NOTHING_TO_EXPORT));
    }

    #[tokio::test]
    async fn inverted_date_range_reprompts_until_valid() {
        let h = harness();
        h.store
            .seed(vec![record("alice", "ACME", "2026-08-15 10:00:00")]);

        h.intake
            .handle_action(&action_ev(2, Some("boss"), Action::Export))
            .await
            .unwrap();
        h.intake
            .handle_action(&action_ev(2, Some("boss"), Action::ExportByDate))
            .await
            .unwrap();
        h.intake
            .handle_text(&text_ev(2, Some("boss"), "2026-08-10"))
            .await
            .unwrap();
        h.intake
            .handle_text(&text_ev(2, Some("boss"), "2026-08-01"))
            .await
            .unwrap();

        assert!(h.messenger.saw("End date must be after start date."));
        assert!(h.messenger.documents_sent().is_empty());
        assert_eq!(
            h.sessions.state_of(UserId(2)).await,
            Some(ConvState::ExportDateEnd)
        );

        // A valid end date completes the pair.
        h.intake
            .handle_text(&text_ev(2, Some("boss"), "2026-08-31"))
            .await
            .unwrap();
        assert_eq!(h.messenger.documents_sent().len(), 1);
    }

    #[tokio::test]
    async fn malformed_date_reprompts_the_same_step() {
        let h = harness();
        h.intake
            .handle_action(&action_ev(2, Some("boss"), Action::Export))
            .await
            .unwrap();
        h.intake
            .handle_action(&action_ev(2, Some("boss"), Action::ExportByDate))
            .await
            .unwrap();
        h.intake
            .handle_text(&text_ev(2, Some("boss"), "next tuesday"))
            .await
            .unwrap();

        assert!(h.messenger.saw("Invalid date format."));
        assert_eq!(
            h.sessions.state_of(UserId(2)).await,
            Some(ConvState::ExportDateStart)
        );
    }

    #[tokio::test]
    async fn export_by_requester_strips_leading_at() {
        let h = harness();
        h.store.seed(vec![
            record("alice", "ACME", "2026-08-01 10:00:00"),
            record("bob", "Globex", "2026-08-02 11:00:00"),
        ]);

        h.intake
            .handle_action(&action_ev(2, Some("boss"), Action::Export))
            .await
            .unwrap();
        h.intake
            .handle_action(&action_ev(2, Some("boss"), Action::ExportByRequester))
            .await
            .unwrap();
        h.intake
            .handle_text(&text_ev(2, Some("boss"), "@alice"))
            .await
            .unwrap();

        let docs = h.messenger.documents_sent();
        assert_eq!(docs.len(), 1);
        let body = String::from_utf8(docs[0].2.clone()).unwrap();
        assert!(body.contains("ACME"));
        assert!(!body.contains("Globex"));
    }

    #[tokio::test]
    async fn history_requires_a_username() {
        let h = harness();
        h.intake
            .handle_action(&action_ev(1, None, Action::Recall))
            .await
            .unwrap();
        h.intake
            .handle_action(&action_ev(1, None, Action::RecallHistory))
            .await
            .unwrap();

        assert!(h.messenger.saw("I couldn't find your username."));
        assert_eq!(h.store.reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn history_lists_own_submissions_only() {
        let h = harness();
        h.store.seed(vec![
            record("alice", "ACME", "2026-08-01 10:00:00"),
            record("bob", "Globex", "2026-08-02 11:00:00"),
            record("alice", "Initech", "2026-08-03 12:00:00"),
        ]);

        h.intake
            .handle_action(&action_ev(1, Some("alice"), Action::Recall))
            .await
            .unwrap();
        h.intake
            .handle_action(&action_ev(1, Some("alice"), Action::RecallHistory))
            .await
            .unwrap();

        let texts = h.messenger.all_texts();
        let listing = texts
            .iter()
            .find(|t| t.starts_with("Your last submissions:"))
            .unwrap();
        assert!(listing.contains("ACME"));
        assert!(listing.contains("Initech"));
        assert!(!listing.contains("Globex"));
    }

    #[tokio::test]
    async fn brand_search_is_case_insensitive() {
        let h = harness();
        h.store.seed(vec![
            record("a", "ACME Corp", "2026-08-01 10:00:00"),
            record("b", "Acme2", "2026-08-02 11:00:00"),
            record("c", "Globex", "2026-08-03 12:00:00"),
        ]);

        h.intake
            .handle_action(&action_ev(1, Some("alice"), Action::Recall))
            .await
            .unwrap();
        h.intake
            .handle_action(&action_ev(1, Some("alice"), Action::RecallSearch))
            .await
            .unwrap();
        h.intake
            .handle_text(&text_ev(1, Some("alice"), "acme"))
            .await
            .unwrap();

        let texts = h.messenger.all_texts();
        let listing = texts.iter().find(|t| t.starts_with("Matches:")).unwrap();
        assert!(listing.contains("ACME Corp"));
        assert!(listing.contains("Acme2"));
        assert!(!listing.contains("Globex"));
        assert_eq!(h.sessions.state_of(UserId(1)).await, None);
    }

    #[tokio::test]
    async fn store_read_failure_is_surfaced_verbatim() {
        let h = harness();
        h.store.fail_read.store(true, Ordering::SeqCst);

        h.intake
            .handle_action(&action_ev(1, Some("alice"), Action::Recall))
            .await
            .unwrap();
        h.intake
            .handle_action(&action_ev(1, Some("alice"), Action::RecallHistory))
            .await
            .unwrap();

        assert!(h
            .messenger
            .saw("Sorry, I couldn't access the sheet. Error: sheet unavailable"));
        assert_eq!(h.sessions.state_of(UserId(1)).await, None);
    }

    #[tokio::test]
    async fn manager_view_formats_stats_and_respects_authorization() {
        let h = harness();
        h.intake
            .handle_action(&action_ev(1, Some("mallory"), Action::Manager))
            .await
            .unwrap();
        assert!(h.messenger.saw("Sorry, only admins can access the manager view."));
        assert_eq!(h.store.reads.load(Ordering::SeqCst), 0);

        h.intake
            .handle_action(&action_ev(2, Some("boss"), Action::Manager))
            .await
            .unwrap();
        assert!(h.messenger.saw("Manager View"));
        assert!(h.messenger.saw("Total submissions: 0"));
        assert!(h.messenger.saw("- None"));
    }

    #[tokio::test]
    async fn menu_shows_admin_rows_only_to_admins() {
        let h = harness();
        h.intake
            .handle_command(&command_ev(1, Some("alice"), "menu"))
            .await
            .unwrap();
        h.intake
            .handle_command(&command_ev(2, Some("boss"), "start"))
            .await
            .unwrap();

        let keyboards = h.messenger.keyboards.lock().unwrap();
        assert_eq!(keyboards[0].2.buttons.len(), 2);
        assert_eq!(keyboards[1].2.buttons.len(), 5);
    }

    #[tokio::test]
    async fn entry_actions_do_not_preempt_an_active_form() {
        let h = harness();
        fill_form(&h, 1, Some("alice")).await;

        // Mid-form menu presses are ignored; the platform-mode prompt stays
        // the pending step.
        h.intake
            .handle_action(&action_ev(1, Some("alice"), Action::NewRequest))
            .await
            .unwrap();
        assert_eq!(
            h.sessions.state_of(UserId(1)).await,
            Some(ConvState::PlatformMode)
        );
    }

    #[tokio::test]
    async fn text_without_a_session_points_at_the_menu() {
        let h = harness();
        h.intake
            .handle_text(&text_ev(1, Some("alice"), "hello?"))
            .await
            .unwrap();
        assert!(h.messenger.saw(MSG_NO_PROMPT));
    }

    #[tokio::test]
    async fn blank_reply_reprompts_the_pending_field() {
        let h = harness();
        h.intake
            .handle_action(&action_ev(1, Some("alice"), Action::NewRequest))
            .await
            .unwrap();
        h.intake
            .handle_text(&text_ev(1, Some("alice"), "   "))
            .await
            .unwrap();

        assert_eq!(
            h.sessions.state_of(UserId(1)).await,
            Some(ConvState::BrandName)
        );
        let texts = h.messenger.all_texts();
        assert!(texts.iter().filter(|t| t.contains("Brand Name:")).count() >= 2);
    }
}
