//! Pipeline error taxonomy.
//!
//! Errors are classified by how the poll loop reacts:
//! - Fetch: transient network/API trouble — retried on the next tick,
//!   cursor untouched.
//! - Persistence: the local store is unreachable — the batch aborts and the
//!   cursor stays at the last fully processed update.
//!
//! Relay failures are deliberately NOT part of this taxonomy: they are
//! isolated to a single message and never abort a batch (see `media`).

use thiserror::Error;

use crate::db::DbError;
use crate::telegram::TelegramError;

#[derive(Debug, Error)]
pub enum PollError {
    #[error("Fetch failed: {0}")]
    Fetch(#[from] TelegramError),

    #[error("Persistence failed: {0}")]
    Persistence(#[from] DbError),
}

impl PollError {
    /// Transient errors are expected noise: logged at warn, retried next
    /// tick, never escalated.
    pub fn is_transient(&self) -> bool {
        matches!(self, PollError::Fetch(_))
    }
}
