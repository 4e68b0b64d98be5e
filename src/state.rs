//! Shared application state and configuration loading.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::types::Config;

/// State shared between the poll loop and any embedding process (daemon
/// binary, dashboard host).
pub struct AppState {
    pub config: Mutex<Option<Config>>,
    /// Single-flight guard for the poll loop. The cursor must never see two
    /// concurrent writers; an overdue tick is skipped, not overlapped.
    pub poll_lock: tokio::sync::Mutex<()>,
}

impl AppState {
    pub fn new() -> Self {
        let config = match load_config() {
            Ok(c) => Some(c),
            Err(e) => {
                log::warn!("Failed to load config: {e}. Poller idle until configured.");
                None
            }
        };

        Self {
            config: Mutex::new(config),
            poll_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Snapshot the current config, if loaded.
    pub fn config_snapshot(&self) -> Option<Config> {
        self.config.lock().ok().and_then(|guard| guard.clone())
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Get the canonical config file path (`~/.fieldtrack/config.json`).
pub fn config_path() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or("Could not find home directory")?;
    Ok(home.join(".fieldtrack").join("config.json"))
}

/// Load configuration from `~/.fieldtrack/config.json`.
///
/// A missing file yields the defaults; the `FIELDTRACK_BOT_TOKEN` env var
/// overrides the configured bot token either way.
pub fn load_config() -> Result<Config, String> {
    let path = config_path()?;

    let mut config = if path.exists() {
        let content =
            fs::read_to_string(&path).map_err(|e| format!("Failed to read config: {}", e))?;
        serde_json::from_str::<Config>(&content)
            .map_err(|e| format!("Failed to parse config: {}", e))?
    } else {
        Config::default()
    };

    if let Ok(token) = std::env::var("FIELDTRACK_BOT_TOKEN") {
        if !token.is_empty() {
            config.telegram.bot_token = Some(token);
        }
    }

    Ok(config)
}

/// Reload configuration from disk into shared state.
pub fn reload_config(state: &AppState) -> Result<Config, String> {
    let config = load_config()?;
    let mut guard = state.config.lock().map_err(|_| "Lock poisoned")?;
    *guard = Some(config.clone());
    Ok(config)
}
