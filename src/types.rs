//! Core domain types shared across the pipeline and the dashboard read surface.

use serde::{Deserialize, Serialize};

// ============================================================================
// Hiker status
// ============================================================================

/// Closed status vocabulary for a tracked field unit.
///
/// Transitions are deliberately unguarded: field reports arrive out of order,
/// so any status may follow any other. A `problem` signal must always land,
/// even after a `finished` one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HikerStatus {
    Preparing,
    EnRoute,
    Problem,
    Finished,
}

impl HikerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HikerStatus::Preparing => "preparing",
            HikerStatus::EnRoute => "en_route",
            HikerStatus::Problem => "problem",
            HikerStatus::Finished => "finished",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "preparing" => Some(HikerStatus::Preparing),
            "en_route" => Some(HikerStatus::EnRoute),
            "problem" => Some(HikerStatus::Problem),
            "finished" => Some(HikerStatus::Finished),
            _ => None,
        }
    }

    /// Coarse progression rank used only for the regressive-transition audit
    /// log. `problem` is a severity, not progress, so it shares a rank with
    /// `en_route`.
    pub(crate) fn progression_rank(&self) -> u8 {
        match self {
            HikerStatus::Preparing => 0,
            HikerStatus::EnRoute | HikerStatus::Problem => 1,
            HikerStatus::Finished => 2,
        }
    }
}

// ============================================================================
// Registry and archive rows
// ============================================================================

/// A row from the `hikers` table — one per distinct Telegram account.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Hiker {
    pub id: String,
    pub telegram_user_id: i64,
    pub telegram_username: Option<String>,
    pub status: HikerStatus,
    pub created_at: String,
    pub last_seen_at: String,
}

/// Classification of an archived inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    StatusSignal,
    Note,
    Photo,
    Location,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::StatusSignal => "status_signal",
            MessageKind::Note => "note",
            MessageKind::Photo => "photo",
            MessageKind::Location => "location",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "status_signal" => Some(MessageKind::StatusSignal),
            "note" => Some(MessageKind::Note),
            "photo" => Some(MessageKind::Photo),
            "location" => Some(MessageKind::Location),
            _ => None,
        }
    }
}

/// A row from the `hiker_messages` archive. Immutable once written, except
/// for the single `media_ref` patch after a successful attachment relay.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HikerMessage {
    pub id: String,
    pub hiker_id: String,
    pub telegram_user_id: i64,
    pub kind: MessageKind,
    pub status_label: Option<String>,
    pub note: Option<String>,
    pub media_ref: Option<String>,
    /// Resolved download URL for `media_ref`. Not stored; populated by the
    /// read surface when an object store is available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    pub geo_lat: Option<f64>,
    pub geo_lon: Option<f64>,
    pub received_at: String,
}

/// Fields for a new archive row. `received_at` is assigned by the pipeline.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub hiker_id: String,
    pub telegram_user_id: i64,
    pub kind: MessageKind,
    pub status_label: Option<String>,
    pub note: Option<String>,
    pub geo_lat: Option<f64>,
    pub geo_lon: Option<f64>,
    pub received_at: String,
}

// ============================================================================
// Live tracking projection
// ============================================================================

/// One projection row per hiker: current status plus the most recent known
/// location, if any. Derived on every read, never persisted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveTrackingRow {
    pub hiker_id: String,
    pub telegram_user_id: i64,
    pub telegram_username: Option<String>,
    pub status: HikerStatus,
    pub last_seen_at: String,
    pub geo_lat: Option<f64>,
    pub geo_lon: Option<f64>,
    pub geo_updated_at: Option<String>,
}

// ============================================================================
// Configuration
// ============================================================================

/// Application configuration, loaded from `~/.fieldtrack/config.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramConfig {
    /// Bot token. The `FIELDTRACK_BOT_TOKEN` env var overrides this at load.
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_batch_limit")]
    pub batch_limit: u32,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            api_base: default_api_base(),
            poll_interval_secs: default_poll_interval_secs(),
            batch_limit: default_batch_limit(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_interval_secs() -> u64 {
    3
}

fn default_batch_limit() -> u32 {
    100
}

/// Durable object storage service used by the media relay.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            HikerStatus::Preparing,
            HikerStatus::EnRoute,
            HikerStatus::Problem,
            HikerStatus::Finished,
        ] {
            assert_eq!(HikerStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(HikerStatus::parse("lost"), None);
    }

    #[test]
    fn test_status_serde_snake_case() {
        let json = serde_json::to_string(&HikerStatus::EnRoute).unwrap();
        assert_eq!(json, "\"en_route\"");
        let back: HikerStatus = serde_json::from_str("\"problem\"").unwrap();
        assert_eq!(back, HikerStatus::Problem);
    }

    #[test]
    fn test_kind_roundtrip() {
        for kind in [
            MessageKind::StatusSignal,
            MessageKind::Note,
            MessageKind::Photo,
            MessageKind::Location,
        ] {
            assert_eq!(MessageKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_config_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.telegram.api_base, "https://api.telegram.org");
        assert_eq!(config.telegram.poll_interval_secs, 3);
        assert_eq!(config.telegram.batch_limit, 100);
        assert!(!config.storage.enabled);
    }

    #[test]
    fn test_config_partial_override() {
        let json = r#"{
            "telegram": { "botToken": "123:abc", "pollIntervalSecs": 10 },
            "storage": { "enabled": true, "baseUrl": "https://store.example.com" }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.telegram.bot_token.as_deref(), Some("123:abc"));
        assert_eq!(config.telegram.poll_interval_secs, 10);
        assert_eq!(config.telegram.batch_limit, 100);
        assert_eq!(
            config.storage.base_url.as_deref(),
            Some("https://store.example.com")
        );
    }
}
