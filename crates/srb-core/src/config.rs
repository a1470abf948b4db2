use std::{
    env, fs,
    path::Path,
    time::Duration,
};

use crate::{errors::Error, Result};

/// Typed configuration, loaded from the environment (with `.env` support).
#[derive(Clone, Debug)]
pub struct Config {
    // Transport
    pub telegram_bot_token: String,

    // Identities
    pub admin_usernames: Vec<String>,
    pub notify_usernames: Vec<String>,

    // Record store
    pub sheet_id: String,
    pub sheet_name: String,
    pub sheets_access_token: String,

    /// Idle bound for abandoned sessions; `None` means sessions live until
    /// completed or cancelled.
    pub session_idle_timeout: Option<Duration>,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let sheet_id = env_str("GOOGLE_SHEET_ID")
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        if sheet_id.is_empty() {
            return Err(Error::Config(
                "GOOGLE_SHEET_ID environment variable is required".to_string(),
            ));
        }

        let sheets_access_token = env_str("SHEETS_ACCESS_TOKEN")
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        if sheets_access_token.is_empty() {
            return Err(Error::Config(
                "SHEETS_ACCESS_TOKEN environment variable is required".to_string(),
            ));
        }

        let sheet_name = env_str("GOOGLE_SHEET_NAME")
            .and_then(non_empty)
            .unwrap_or_else(|| "Requests".to_string());

        let admin_usernames = parse_csv_handles(env_str("ADMIN_USERNAMES"));
        let notify_usernames = parse_csv_handles(env_str("NOTIFY_USERNAMES"));

        // 0 or unset keeps sessions around until completed or cancelled.
        let session_idle_timeout = env_u64("SESSION_IDLE_TIMEOUT_SECS")
            .filter(|&secs| secs > 0)
            .map(Duration::from_secs);

        Ok(Self {
            telegram_bot_token,
            admin_usernames,
            notify_usernames,
            sheet_id,
            sheet_name,
            sheets_access_token,
            session_idle_timeout,
        })
    }

    pub fn dashboard_url(&self) -> String {
        format!("https://docs.google.com/spreadsheets/d/{}", self.sheet_id)
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s.trim().to_string())
    }
}

/// Comma-separated handle list; each entry trimmed with any leading `@`
/// stripped, empties dropped.
fn parse_csv_handles(v: Option<String>) -> Vec<String> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim().trim_start_matches('@').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}
