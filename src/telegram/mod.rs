//! Telegram Bot API integration: update fetching, payload classification,
//! and the session greeting.
//!
//! All failures here are transient from the pipeline's point of view — the
//! poller logs them and retries on the next tick, never touching the cursor.

pub mod classify;
pub mod client;

pub use classify::{classify, Intent};
pub use client::{TelegramClient, TelegramUpdate, UpdateSource};

#[derive(Debug, thiserror::Error)]
pub enum TelegramError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Telegram API error: {0}")]
    Api(String),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}
