//! Poll scheduler: the Fetch → Classify → Apply → Advance cycle.
//!
//! One cycle is a pass through the state machine
//! `Idle → Fetching → Processing → Advancing → Idle`. Updates are applied in
//! ascending `update_id` order; the cursor advances only over updates that
//! were fully processed, via a compare-and-swap that re-reads the pre-tick
//! cursor. The long-lived loop enforces single-flight: an overdue tick is
//! skipped, never overlapped.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::db::{cursor, hikers, messages, TrackerDb};
use crate::error::PollError;
use crate::media::{self, HttpObjectStore, ObjectStore};
use crate::state::AppState;
use crate::telegram::client::TelegramUpdate;
use crate::telegram::{classify, Intent, TelegramClient, UpdateSource};
use crate::types::{HikerStatus, MessageKind, NewMessage};

/// Pause before re-checking when the bot token or config is missing.
const UNCONFIGURED_PAUSE_SECS: u64 = 300;

/// Summary of one poll cycle, for logging and tests.
#[derive(Debug, Default)]
pub struct CycleOutcome {
    pub fetched: usize,
    pub processed: usize,
    pub discarded: usize,
    pub relayed: usize,
    /// New cursor value, when the cycle advanced it.
    pub new_cursor: Option<i64>,
    /// True when the CAS advance was refused because another writer moved
    /// the cursor mid-cycle.
    pub cursor_conflict: bool,
}

// ---------------------------------------------------------------------------
// One poll cycle
// ---------------------------------------------------------------------------

/// Run one fetch/process/advance cycle against the given source and store.
///
/// - Empty batch: returns immediately, cursor untouched.
/// - Fetch failure: `PollError::Fetch`, cursor untouched (retry next tick).
/// - Per-update persistence failure: aborts the batch; the cursor still
///   advances over the updates that completed before the failure.
/// - Relay failure: isolated to the message, which stays archived with an
///   empty `media_ref`.
pub async fn run_poll_cycle(
    db: &TrackerDb,
    source: &dyn UpdateSource,
    store: Option<&dyn ObjectStore>,
    batch_limit: u32,
) -> Result<CycleOutcome, PollError> {
    let start_offset = cursor::poll_offset(db)?;

    let mut updates = source.fetch_updates(start_offset, batch_limit).await?;

    let mut outcome = CycleOutcome {
        fetched: updates.len(),
        ..CycleOutcome::default()
    };

    if updates.is_empty() {
        return Ok(outcome);
    }

    // The API contract says the batch is ordered; don't rely on it.
    updates.sort_by_key(|u| u.update_id);

    let mut last_done: Option<i64> = None;
    let mut batch_error: Option<PollError> = None;

    for update in &updates {
        match apply_update(db, source, store, update, &mut outcome).await {
            Ok(()) => last_done = Some(update.update_id),
            Err(e) => {
                log::error!(
                    "Aborting batch at update {}: {}",
                    update.update_id,
                    e
                );
                batch_error = Some(e);
                break;
            }
        }
    }

    // Advance the cursor over the fully processed prefix, guarded by a CAS
    // against the pre-tick value.
    if let Some(last) = last_done {
        let next = last + 1;
        if next > start_offset {
            match cursor::advance_poll_offset(db, start_offset, next) {
                Ok(true) => outcome.new_cursor = Some(next),
                Ok(false) => {
                    outcome.cursor_conflict = true;
                    log::warn!(
                        "Cursor moved during the cycle (expected {}), not advancing to {}",
                        start_offset,
                        next
                    );
                }
                Err(e) => {
                    log::error!("Failed to advance cursor to {}: {}", next, e);
                    if batch_error.is_none() {
                        batch_error = Some(e.into());
                    }
                }
            }
        }
    }

    match batch_error {
        Some(e) => Err(e),
        None => Ok(outcome),
    }
}

/// Per-intent side effects, normalized so every recognized update flows
/// through the same registry-upsert + archive-append transaction.
struct UpdateEffects {
    status_effect: Option<HikerStatus>,
    kind: MessageKind,
    status_label: Option<String>,
    note: Option<String>,
    geo: Option<(f64, f64)>,
    relay_file_id: Option<String>,
    greet_chat_id: Option<i64>,
}

fn effects_for(intent: Intent) -> UpdateEffects {
    match intent {
        Intent::SessionStart { chat_id } => UpdateEffects {
            status_effect: Some(HikerStatus::Preparing),
            // The start marker is archived as a note so the timeline shows
            // when the session (re)started.
            kind: MessageKind::Note,
            status_label: None,
            note: Some(crate::telegram::classify::START_COMMAND.to_string()),
            geo: None,
            relay_file_id: None,
            greet_chat_id: Some(chat_id),
        },
        Intent::StatusSignal { label, status } => UpdateEffects {
            status_effect: Some(status),
            kind: MessageKind::StatusSignal,
            status_label: Some(label),
            note: None,
            geo: None,
            relay_file_id: None,
            greet_chat_id: None,
        },
        Intent::Note(text) => UpdateEffects {
            status_effect: None,
            kind: MessageKind::Note,
            status_label: None,
            note: Some(text),
            geo: None,
            relay_file_id: None,
            greet_chat_id: None,
        },
        Intent::Photo { file_id } => UpdateEffects {
            status_effect: None,
            kind: MessageKind::Photo,
            status_label: None,
            note: None,
            geo: None,
            relay_file_id: Some(file_id),
            greet_chat_id: None,
        },
        Intent::Location { lat, lon } => UpdateEffects {
            status_effect: None,
            kind: MessageKind::Location,
            status_label: None,
            note: None,
            geo: Some((lat, lon)),
            relay_file_id: None,
            greet_chat_id: None,
        },
    }
}

/// Apply one update: classify, upsert the hiker, append to the archive, and
/// kick off the best-effort side channels (greeting, media relay).
async fn apply_update(
    db: &TrackerDb,
    source: &dyn UpdateSource,
    store: Option<&dyn ObjectStore>,
    update: &TelegramUpdate,
    outcome: &mut CycleOutcome,
) -> Result<(), PollError> {
    let Some(intent) = classify(update) else {
        log::debug!("Discarding update {} (unrecognized payload)", update.update_id);
        outcome.discarded += 1;
        return Ok(());
    };

    // classify() only yields an intent when a message and sender exist.
    let Some(msg) = update.message.as_ref() else {
        outcome.discarded += 1;
        return Ok(());
    };
    let Some(from) = msg.from.as_ref() else {
        outcome.discarded += 1;
        return Ok(());
    };

    let effects = effects_for(intent);
    let received_at = Utc::now().to_rfc3339();

    // Registry upsert + archive append commit together; the side channels
    // below run after the row is durable.
    let archived = db.with_transaction(|db| {
        let hiker = hikers::upsert_hiker(
            db,
            from.id,
            from.username.as_deref(),
            effects.status_effect,
        )?;
        messages::insert_message(
            db,
            &NewMessage {
                hiker_id: hiker.id,
                telegram_user_id: from.id,
                kind: effects.kind,
                status_label: effects.status_label.clone(),
                note: effects.note.clone(),
                geo_lat: effects.geo.map(|g| g.0),
                geo_lon: effects.geo.map(|g| g.1),
                received_at: received_at.clone(),
            },
        )
    })?;

    outcome.processed += 1;

    if let Some(chat_id) = effects.greet_chat_id {
        if let Err(e) = source.send_greeting(chat_id).await {
            log::warn!("Greeting for chat {} failed: {}", chat_id, e);
        }
    }

    if let Some(file_id) = effects.relay_file_id {
        match store {
            Some(store) => match media::relay_photo(source, store, &file_id).await {
                Ok(storage_id) => {
                    messages::set_media_ref(db, &archived.id, &storage_id)?;
                    outcome.relayed += 1;
                }
                Err(e) => {
                    log::warn!(
                        "Media relay failed for update {} (message kept without attachment): {}",
                        update.update_id,
                        e
                    );
                }
            },
            None => {
                log::debug!(
                    "Object storage disabled; photo {} archived without media_ref",
                    archived.id
                );
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Long-lived poll loop
// ---------------------------------------------------------------------------

/// Background tracker poller. Ticks on a fixed interval and runs one cycle
/// per tick under the single-flight lock.
pub async fn run_tracker_poller(state: Arc<AppState>) {
    loop {
        let Some(config) = state.config_snapshot() else {
            tokio::time::sleep(Duration::from_secs(UNCONFIGURED_PAUSE_SECS)).await;
            if crate::state::reload_config(&state).is_ok() {
                log::info!("Tracker poller: config loaded, starting");
            }
            continue;
        };

        let interval = Duration::from_secs(config.telegram.poll_interval_secs.max(1));
        tokio::time::sleep(interval).await;

        let Ok(_guard) = state.poll_lock.try_lock() else {
            log::warn!("Poll tick skipped: previous run still in flight");
            continue;
        };

        let Some(token) = config.telegram.bot_token.clone() else {
            log::warn!("Tracker poller: bot token not configured, pausing");
            tokio::time::sleep(Duration::from_secs(UNCONFIGURED_PAUSE_SECS)).await;
            continue;
        };

        let client = TelegramClient::new(&config.telegram.api_base, &token);

        let store = if config.storage.enabled {
            match config.storage.base_url.as_deref() {
                Some(url) => Some(HttpObjectStore::new(url)),
                None => {
                    log::warn!("Storage enabled but storage.baseUrl missing; relay disabled");
                    None
                }
            }
        } else {
            None
        };

        let db = match TrackerDb::open() {
            Ok(db) => db,
            Err(e) => {
                log::warn!("Tracker poller: failed to open database: {}", e);
                continue;
            }
        };

        match run_poll_cycle(
            &db,
            &client,
            store.as_ref().map(|s| s as &dyn ObjectStore),
            config.telegram.batch_limit,
        )
        .await
        {
            Ok(outcome) if outcome.fetched > 0 => {
                log::info!(
                    "Poll cycle: {} fetched, {} processed, {} discarded, {} relayed, cursor {:?}",
                    outcome.fetched,
                    outcome.processed,
                    outcome.discarded,
                    outcome.relayed,
                    outcome.new_cursor
                );
            }
            Ok(_) => {}
            Err(e) if e.is_transient() => {
                log::warn!("Poll fetch failed, will retry next tick: {}", e);
            }
            Err(e) => {
                log::error!("Poll batch aborted: {}", e);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
