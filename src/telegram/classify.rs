//! Pure classification of raw Telegram updates into pipeline intents.
//!
//! No I/O happens here: the classifier only inspects the update payload, so
//! it is unit-testable without any network dependency. Recognition order is
//! fixed — session start, status signal, free text, photo, location — and
//! anything else is discarded.

use crate::types::HikerStatus;

use super::client::TelegramUpdate;

/// The reserved session-start marker.
pub const START_COMMAND: &str = "/start";

/// The seven status labels offered on the reply keyboard, in keyboard order.
pub const STATUS_BUTTONS: [&str; 7] = [
    "🟢 I'm okay!",
    "🟡 Feeling tired.",
    "🟠 Feeling unwell, no injury.",
    "🟠 Minor injury, can move.",
    "🔴 Urgent medical help needed.",
    "🔴 Trapped / In danger.",
    "🔴 Emergency, critical condition!",
];

/// Map a status button label to its coarse status, or None for other text.
fn signal_status(label: &str) -> Option<HikerStatus> {
    match label {
        "🟢 I'm okay!"
        | "🟡 Feeling tired."
        | "🟠 Feeling unwell, no injury."
        | "🟠 Minor injury, can move." => Some(HikerStatus::EnRoute),
        "🔴 Urgent medical help needed."
        | "🔴 Trapped / In danger."
        | "🔴 Emergency, critical condition!" => Some(HikerStatus::Problem),
        _ => None,
    }
}

/// A classified inbound update.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    /// The reserved start marker. Resets status to `preparing` and triggers
    /// the one-time greeting with the reply keyboard.
    SessionStart { chat_id: i64 },
    /// An exact match of one of the seven status labels.
    StatusSignal {
        label: String,
        status: HikerStatus,
    },
    /// Any other non-empty text. No status effect.
    Note(String),
    /// An attachment reference (largest available size). Triggers the relay.
    Photo { file_id: String },
    /// A latitude/longitude report. Feeds the live tracking projection.
    Location { lat: f64, lon: f64 },
}

/// Classify a raw update, or return None to discard it.
///
/// Discards cover updates without a message body (edits, channel posts,
/// member events), messages without a sender, and payload shapes the
/// pipeline doesn't track (stickers, voice notes, documents).
pub fn classify(update: &TelegramUpdate) -> Option<Intent> {
    let msg = update.message.as_ref()?;
    msg.from.as_ref()?;

    if let Some(text) = msg.text.as_deref() {
        if text == START_COMMAND {
            return Some(Intent::SessionStart { chat_id: msg.chat.id });
        }
        if let Some(status) = signal_status(text) {
            return Some(Intent::StatusSignal {
                label: text.to_string(),
                status,
            });
        }
        if !text.trim().is_empty() {
            return Some(Intent::Note(text.to_string()));
        }
        return None;
    }

    if let Some(photos) = msg.photo.as_ref() {
        // Telegram lists sizes smallest-first; take the largest.
        if let Some(largest) = photos.last() {
            return Some(Intent::Photo {
                file_id: largest.file_id.clone(),
            });
        }
        return None;
    }

    if let Some(location) = msg.location.as_ref() {
        return Some(Intent::Location {
            lat: location.latitude,
            lon: location.longitude,
        });
    }

    None
}
