//! Conversation states, typed action tokens and keyboard layouts.
//!
//! Button callback data is encoded/decoded here so the rest of the core only
//! ever sees typed [`Action`] variants, never raw token strings.

use crate::catalog;
use crate::messaging::types::{InlineButton, InlineKeyboard};

/// Conversation position of one user session.
///
/// The intake form walks the linear chain `BrandName → … → OtherTech`, then
/// branches through the platform selector into confirmation. The remaining
/// states belong to the recall/search and export flows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConvState {
    /// Session exists but no prompt is pending (e.g. after a failed write).
    Idle,

    // Intake form, in prompt order.
    BrandName,
    CreatorName,
    RoomNo,
    AirDate,
    CameraReq,
    StageDesign,
    OtherTech,
    PlatformMode,
    PlatformSelect,
    PlatformOther,
    ConfirmSubmit,

    // Recall.
    RecallMenu,
    SearchBrand,

    // Export.
    ExportChoice,
    ExportDateStart,
    ExportDateEnd,
    ExportRequester,
}

impl ConvState {
    /// Successor in the linear collector chain; `None` for states whose exit
    /// is not a plain text reply.
    pub fn next_after_text(self) -> Option<ConvState> {
        match self {
            ConvState::BrandName => Some(ConvState::CreatorName),
            ConvState::CreatorName => Some(ConvState::RoomNo),
            ConvState::RoomNo => Some(ConvState::AirDate),
            ConvState::AirDate => Some(ConvState::CameraReq),
            ConvState::CameraReq => Some(ConvState::StageDesign),
            ConvState::StageDesign => Some(ConvState::OtherTech),
            ConvState::OtherTech => Some(ConvState::PlatformMode),
            _ => None,
        }
    }

    /// Entry prompt for states that collect free text.
    pub fn entry_prompt(self) -> Option<&'static str> {
        match self {
            ConvState::BrandName => Some("Brand Name:"),
            ConvState::CreatorName => Some("Creator Name:"),
            ConvState::RoomNo => Some("Room No / Room Letter:"),
            ConvState::AirDate => Some("Date to be Aired (e.g., 2026-02-15):"),
            ConvState::CameraReq => Some("Camera Requirements:"),
            ConvState::StageDesign => Some("Stage Design:"),
            ConvState::OtherTech => Some("Other Technical Requirements:"),
            ConvState::PlatformOther => Some("Please specify other platforms:"),
            ConvState::SearchBrand => Some("Enter the Brand Name to search:"),
            ConvState::ExportDateStart => Some("Enter start date (YYYY-MM-DD):"),
            ConvState::ExportDateEnd => Some("Enter end date (YYYY-MM-DD):"),
            ConvState::ExportRequester => Some("Enter requester username (without @):"),
            _ => None,
        }
    }
}

/// Platform selection mode, declared before the toggle keyboard opens.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlatformMode {
    Single,
    Multi,
}

impl PlatformMode {
    /// Label written into the "Platform Mode" column.
    pub fn label(self) -> &'static str {
        match self {
            PlatformMode::Single => "Single",
            PlatformMode::Multi => "Multi",
        }
    }
}

/// Closed set of button tokens, decoded once at the transport boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    NewRequest,
    Recall,
    Export,
    Dashboard,
    Manager,

    RecallHistory,
    RecallSearch,

    ModeSingle,
    ModeMulti,
    PlatformToggle(String),
    PlatformDone,

    ConfirmYes,
    ConfirmNo,

    ExportAll,
    ExportByDate,
    ExportByRequester,
}

impl Action {
    /// Wire token carried as the button's callback data.
    pub fn encode(&self) -> String {
        match self {
            Action::NewRequest => "action:new".to_string(),
            Action::Recall => "action:recall".to_string(),
            Action::Export => "action:export".to_string(),
            Action::Dashboard => "action:dashboard".to_string(),
            Action::Manager => "action:manager".to_string(),
            Action::RecallHistory => "recall:history".to_string(),
            Action::RecallSearch => "recall:search".to_string(),
            Action::ModeSingle => "mode:single".to_string(),
            Action::ModeMulti => "mode:multi".to_string(),
            Action::PlatformToggle(name) => format!("platform:{name}"),
            Action::PlatformDone => "platform:done".to_string(),
            Action::ConfirmYes => "confirm:yes".to_string(),
            Action::ConfirmNo => "confirm:no".to_string(),
            Action::ExportAll => "export:all".to_string(),
            Action::ExportByDate => "export:date".to_string(),
            Action::ExportByRequester => "export:requester".to_string(),
        }
    }

    /// Decode a wire token; `None` for anything outside the closed set.
    pub fn parse(data: &str) -> Option<Action> {
        let (kind, value) = data.split_once(':')?;
        match (kind, value) {
            ("action", "new") => Some(Action::NewRequest),
            ("action", "recall") => Some(Action::Recall),
            ("action", "export") => Some(Action::Export),
            ("action", "dashboard") => Some(Action::Dashboard),
            ("action", "manager") => Some(Action::Manager),
            ("recall", "history") => Some(Action::RecallHistory),
            ("recall", "search") => Some(Action::RecallSearch),
            ("mode", "single") => Some(Action::ModeSingle),
            ("mode", "multi") => Some(Action::ModeMulti),
            ("platform", "done") => Some(Action::PlatformDone),
            ("platform", name) if !name.is_empty() => {
                Some(Action::PlatformToggle(name.to_string()))
            }
            ("confirm", "yes") => Some(Action::ConfirmYes),
            ("confirm", "no") => Some(Action::ConfirmNo),
            ("export", "all") => Some(Action::ExportAll),
            ("export", "date") => Some(Action::ExportByDate),
            ("export", "requester") => Some(Action::ExportByRequester),
            _ => None,
        }
    }
}

/// Main menu; admin rows only for privileged identities.
pub fn action_menu(is_admin: bool) -> InlineKeyboard {
    let mut buttons = vec![
        InlineButton::new("New Request", &Action::NewRequest),
        InlineButton::new("Recall Submissions", &Action::Recall),
    ];
    if is_admin {
        buttons.push(InlineButton::new("Export CSV", &Action::Export));
        buttons.push(InlineButton::new("Dashboard Link", &Action::Dashboard));
        buttons.push(InlineButton::new("Manager View", &Action::Manager));
    }
    InlineKeyboard::new(buttons)
}

pub fn recall_menu() -> InlineKeyboard {
    InlineKeyboard::new(vec![
        InlineButton::new("Last 10 submissions", &Action::RecallHistory),
        InlineButton::new("Search by Brand Name", &Action::RecallSearch),
    ])
}

pub fn platform_mode_menu() -> InlineKeyboard {
    InlineKeyboard::new(vec![
        InlineButton::new("Single Platform", &Action::ModeSingle),
        InlineButton::new("Multistreaming", &Action::ModeMulti),
    ])
}

/// Toggle keyboard; one row per catalog entry in catalog order, with a
/// checked/unchecked marker reflecting current membership, then "Done".
pub fn platforms_menu(selected: &[String]) -> InlineKeyboard {
    let mut buttons = Vec::with_capacity(catalog::PLATFORMS.len() + 1);
    for name in catalog::PLATFORMS {
        let marker = if selected.iter().any(|s| s == name) {
            "[x]"
        } else {
            "[ ]"
        };
        buttons.push(InlineButton::new(
            format!("{marker} {name}"),
            &Action::PlatformToggle(name.to_string()),
        ));
    }
    buttons.push(InlineButton::new("Done", &Action::PlatformDone));
    InlineKeyboard::new(buttons)
}

pub fn confirm_menu() -> InlineKeyboard {
    InlineKeyboard::new(vec![
        InlineButton::new("Confirm", &Action::ConfirmYes),
        InlineButton::new("Cancel", &Action::ConfirmNo),
    ])
}

pub fn export_menu() -> InlineKeyboard {
    InlineKeyboard::new(vec![
        InlineButton::new("All submissions", &Action::ExportAll),
        InlineButton::new("Date range", &Action::ExportByDate),
        InlineButton::new("By requester", &Action::ExportByRequester),
    ])
}
