//! Telegram Bot API HTTP client.
//!
//! Wraps the three calls the pipeline needs: `getUpdates` (cursor-based
//! fetch), `sendMessage` (the one-time session greeting with the status
//! keyboard), and `getFile` + file download for the media relay.

use serde::Deserialize;

use super::classify::STATUS_BUTTONS;
use super::TelegramError;

// ============================================================================
// Wire types
// ============================================================================

/// Envelope shared by all Bot API responses.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

/// One entry from `getUpdates`. `update_id` is source-assigned and
/// monotonically increasing.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramMessage {
    #[serde(default)]
    pub from: Option<TelegramUser>,
    pub chat: TelegramChat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub photo: Option<Vec<PhotoSize>>,
    #[serde(default)]
    pub location: Option<TelegramLocation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramLocation {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Deserialize)]
struct FileInfo {
    file_path: String,
}

// ============================================================================
// Update source seam
// ============================================================================

/// The external chat-bot API as the poll cycle sees it. The production
/// implementation is [`TelegramClient`]; tests inject a scripted source.
#[async_trait::async_trait]
pub trait UpdateSource: Send + Sync {
    /// Fetch updates at or after `offset`, in ascending `update_id` order.
    async fn fetch_updates(
        &self,
        offset: i64,
        limit: u32,
    ) -> Result<Vec<TelegramUpdate>, TelegramError>;

    /// Resolve an attachment reference and download its bytes.
    async fn fetch_attachment(&self, file_id: &str) -> Result<Vec<u8>, TelegramError>;

    /// Greet a freshly started session with the status keyboard.
    async fn send_greeting(&self, chat_id: i64) -> Result<(), TelegramError>;
}

// ============================================================================
// HTTP client
// ============================================================================

pub struct TelegramClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

impl TelegramClient {
    pub fn new(api_base: &str, token: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    async fn into_result<T: serde::de::DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<T, TelegramError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TelegramError::Api(format!("HTTP {}: {}", status, body)));
        }
        let envelope: ApiResponse<T> = resp.json().await?;
        if !envelope.ok {
            return Err(TelegramError::Api(
                envelope
                    .description
                    .unwrap_or_else(|| "ok=false with no description".to_string()),
            ));
        }
        envelope
            .result
            .ok_or_else(|| TelegramError::Api("ok=true with no result".to_string()))
    }

    /// The persistent reply keyboard: seven status labels plus the location
    /// prompt, laid out in four rows of buttons.
    fn greeting_keyboard() -> serde_json::Value {
        serde_json::json!({
            "keyboard": [
                [{ "text": STATUS_BUTTONS[0] }, { "text": STATUS_BUTTONS[1] }],
                [{ "text": STATUS_BUTTONS[2] }, { "text": STATUS_BUTTONS[3] }],
                [{ "text": STATUS_BUTTONS[4] }, { "text": STATUS_BUTTONS[5] }],
                [{ "text": STATUS_BUTTONS[6] }],
                [{ "text": "📍 Send Location", "request_location": true }],
            ],
            "resize_keyboard": true,
            "persistent": true,
        })
    }
}

#[async_trait::async_trait]
impl UpdateSource for TelegramClient {
    async fn fetch_updates(
        &self,
        offset: i64,
        limit: u32,
    ) -> Result<Vec<TelegramUpdate>, TelegramError> {
        let resp = self
            .http
            .get(self.method_url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("limit", limit.to_string()),
                ("timeout", "0".to_string()),
            ])
            .send()
            .await?;

        Self::into_result(resp).await
    }

    async fn fetch_attachment(&self, file_id: &str) -> Result<Vec<u8>, TelegramError> {
        let resp = self
            .http
            .get(self.method_url("getFile"))
            .query(&[("file_id", file_id)])
            .send()
            .await?;
        let info: FileInfo = Self::into_result(resp).await?;

        let download_url = format!(
            "{}/file/bot{}/{}",
            self.api_base, self.token, info.file_path
        );
        let resp = self.http.get(&download_url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TelegramError::Api(format!(
                "attachment download failed: HTTP {}",
                status
            )));
        }
        Ok(resp.bytes().await?.to_vec())
    }

    async fn send_greeting(&self, chat_id: i64) -> Result<(), TelegramError> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": "Welcome! Use the buttons below to send your status, or share your location. Stay safe! 🏔️",
            "reply_markup": Self::greeting_keyboard(),
        });

        let resp = self
            .http
            .post(self.method_url("sendMessage"))
            .json(&body)
            .send()
            .await?;

        // sendMessage returns the sent message; we only care that it landed.
        let _: serde_json::Value = Self::into_result(resp).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_updates_deserialization() {
        let json = r#"{
            "ok": true,
            "result": [
                {
                    "update_id": 1001,
                    "message": {
                        "message_id": 7,
                        "from": { "id": 42, "is_bot": false, "username": "alice" },
                        "chat": { "id": 4242, "type": "private" },
                        "date": 1755900000,
                        "text": "/start"
                    }
                },
                {
                    "update_id": 1002,
                    "message": {
                        "message_id": 8,
                        "from": { "id": 42, "is_bot": false },
                        "chat": { "id": 4242, "type": "private" },
                        "date": 1755900010,
                        "location": { "latitude": 46.85, "longitude": 7.68 }
                    }
                },
                {
                    "update_id": 1003,
                    "message": {
                        "message_id": 9,
                        "from": { "id": 42, "is_bot": false },
                        "chat": { "id": 4242, "type": "private" },
                        "date": 1755900020,
                        "photo": [
                            { "file_id": "small", "file_unique_id": "u1", "width": 90, "height": 90 },
                            { "file_id": "large", "file_unique_id": "u2", "width": 1280, "height": 960 }
                        ]
                    }
                }
            ]
        }"#;

        let envelope: ApiResponse<Vec<TelegramUpdate>> = serde_json::from_str(json).unwrap();
        assert!(envelope.ok);
        let updates = envelope.result.unwrap();
        assert_eq!(updates.len(), 3);

        assert_eq!(updates[0].update_id, 1001);
        let msg = updates[0].message.as_ref().unwrap();
        assert_eq!(msg.text.as_deref(), Some("/start"));
        assert_eq!(msg.from.as_ref().unwrap().username.as_deref(), Some("alice"));

        let loc = updates[1].message.as_ref().unwrap().location.as_ref().unwrap();
        assert_eq!((loc.latitude, loc.longitude), (46.85, 7.68));

        let photos = updates[2].message.as_ref().unwrap().photo.as_ref().unwrap();
        assert_eq!(photos.last().unwrap().file_id, "large");
    }

    #[test]
    fn test_error_envelope() {
        let json = r#"{"ok": false, "description": "Unauthorized"}"#;
        let envelope: ApiResponse<Vec<TelegramUpdate>> = serde_json::from_str(json).unwrap();
        assert!(!envelope.ok);
        assert_eq!(envelope.description.as_deref(), Some("Unauthorized"));
    }

    #[test]
    fn test_greeting_keyboard_shape() {
        let keyboard = TelegramClient::greeting_keyboard();
        let rows = keyboard["keyboard"].as_array().unwrap();
        assert_eq!(rows.len(), 5);

        // Seven status buttons across the first four rows
        let button_count: usize = rows[..4].iter().map(|r| r.as_array().unwrap().len()).sum();
        assert_eq!(button_count, 7);

        // Final row requests location
        let location_row = rows[4].as_array().unwrap();
        assert_eq!(location_row[0]["request_location"], true);
        assert_eq!(keyboard["persistent"], true);
    }

    #[test]
    fn test_method_url() {
        let client = TelegramClient::new("https://api.telegram.org/", "123:abc");
        assert_eq!(
            client.method_url("getUpdates"),
            "https://api.telegram.org/bot123:abc/getUpdates"
        );
    }
}
