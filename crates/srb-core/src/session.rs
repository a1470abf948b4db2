use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::NaiveDate;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    flow::{ConvState, PlatformMode},
    records::SubmissionRecord,
};

/// Collected form fields of an in-progress intake conversation.
///
/// Text fields hold whatever the user typed, trimmed but otherwise verbatim;
/// the air-date is deliberately never parsed.
#[derive(Clone, Debug, Default)]
pub struct FormDraft {
    pub brand_name: String,
    pub creator_name: String,
    pub room_no: String,
    pub date_to_be_aired: String,
    pub camera_requirements: String,
    pub stage_design: String,
    pub other_technical: String,
    pub platform_mode: Option<PlatformMode>,
    pub platforms: Vec<String>,
    pub platforms_other: String,
}

impl FormDraft {
    /// Store a text reply into the field owned by `state`.
    pub fn set_text_field(&mut self, state: ConvState, value: &str) {
        let value = value.trim();
        match state {
            ConvState::BrandName => self.brand_name = value.to_string(),
            ConvState::CreatorName => self.creator_name = value.to_string(),
            ConvState::RoomNo => self.room_no = value.to_string(),
            ConvState::AirDate => self.date_to_be_aired = value.to_string(),
            ConvState::CameraReq => self.camera_requirements = value.to_string(),
            ConvState::StageDesign => self.stage_design = value.to_string(),
            ConvState::OtherTech => self.other_technical = value.to_string(),
            ConvState::PlatformOther => self.platforms_other = value.to_string(),
            _ => {}
        }
    }

    /// Apply one platform-toggle event.
    ///
    /// Single mode replaces the whole selection (re-picking the same entry is
    /// a no-op); Multi mode flips membership, preserving first-insertion
    /// order for the entries that remain.
    pub fn apply_toggle(&mut self, name: &str) {
        match self.platform_mode.unwrap_or(PlatformMode::Multi) {
            PlatformMode::Single => {
                self.platforms.clear();
                self.platforms.push(name.to_string());
            }
            PlatformMode::Multi => {
                if let Some(pos) = self.platforms.iter().position(|p| p == name) {
                    self.platforms.remove(pos);
                } else {
                    self.platforms.push(name.to_string());
                }
            }
        }
    }

    /// Human-readable summary block, shown at confirmation and in the
    /// submission notifications.
    pub fn summary(&self) -> String {
        let platforms = self.platforms.join(", ");
        let other = self.platforms_other.trim();
        format!(
            "Brand Name: {}\n\
             Creator Name: {}\n\
             Room No / Room Letter: {}\n\
             Date to be Aired: {}\n\
             Camera Requirements: {}\n\
             Stage Design: {}\n\
             Other Technical Requirements: {}\n\
             Platform Mode: {}\n\
             Platforms: {}\n\
             Other Platforms: {}",
            self.brand_name,
            self.creator_name,
            self.room_no,
            self.date_to_be_aired,
            self.camera_requirements,
            self.stage_design,
            self.other_technical,
            self.platform_mode.map(PlatformMode::label).unwrap_or(""),
            platforms,
            if other.is_empty() { "N/A" } else { other },
        )
    }

    pub fn to_record(&self, timestamp: String, requester: String) -> SubmissionRecord {
        SubmissionRecord {
            timestamp,
            requester,
            brand_name: self.brand_name.clone(),
            creator_name: self.creator_name.clone(),
            room_no: self.room_no.clone(),
            date_to_be_aired: self.date_to_be_aired.clone(),
            camera_requirements: self.camera_requirements.clone(),
            stage_design: self.stage_design.clone(),
            other_technical: self.other_technical.clone(),
            platform_mode: self.platform_mode.map(PlatformMode::label).unwrap_or("").to_string(),
            platforms: self.platforms.join(", "),
            platforms_other: self.platforms_other.clone(),
        }
    }
}

/// Per-user conversation progress. In-memory only; lost on restart.
#[derive(Clone, Debug)]
pub struct Session {
    pub state: ConvState,
    pub draft: FormDraft,
    pub export_start: Option<NaiveDate>,
    last_activity: Instant,
}

impl Session {
    fn new(state: ConvState) -> Self {
        Self {
            state,
            draft: FormDraft::default(),
            export_start: None,
            last_activity: Instant::now(),
        }
    }
}

/// All active conversations, keyed by user identity.
///
/// One async mutex over the map is enough here: per-chat locks in the router
/// already serialize a single user's events, and cross-user contention is a
/// few map operations per inbound event.
#[derive(Default)]
pub struct SessionStore {
    inner: Mutex<HashMap<crate::domain::UserId, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn state_of(&self, user: crate::domain::UserId) -> Option<ConvState> {
        self.inner.lock().await.get(&user).map(|s| s.state)
    }

    /// Start a fresh session at `state`, discarding any previous one.
    pub async fn begin(&self, user: crate::domain::UserId, state: ConvState) {
        self.inner.lock().await.insert(user, Session::new(state));
    }

    /// Mutate the user's session, refreshing its idle clock. Returns `None`
    /// when no session exists.
    pub async fn update<R>(
        &self,
        user: crate::domain::UserId,
        f: impl FnOnce(&mut Session) -> R,
    ) -> Option<R> {
        let mut map = self.inner.lock().await;
        let session = map.get_mut(&user)?;
        session.last_activity = Instant::now();
        Some(f(session))
    }

    pub async fn clear(&self, user: crate::domain::UserId) {
        self.inner.lock().await.remove(&user);
    }

    pub async fn active_count(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Drop sessions idle longer than `max_idle`; returns how many were
    /// evicted. Active users are untouched.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let mut map = self.inner.lock().await;
        let before = map.len();
        map.retain(|_, s| now.duration_since(s.last_activity) < max_idle);
        before - map.len()
    }

    /// Background sweeper for abandoned sessions.
    ///
    /// Optional: without it, an abandoned session persists until completed or
    /// cancelled, which is a slow leak on a long-lived process.
    pub fn spawn_sweeper(
        store: Arc<Self>,
        max_idle: Duration,
    ) -> (CancellationToken, JoinHandle<()>) {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let sweep_every = max_idle.min(Duration::from_secs(60));

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(sweep_every) => {
                        let evicted = store.evict_idle(max_idle).await;
                        if evicted > 0 {
                            eprintln!("[SESSIONS] Evicted {evicted} idle session(s)");
                        }
                    }
                }
            }
        });

        (cancel, handle)
    }
}
