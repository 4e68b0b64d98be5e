//! Poll cursor persistence.
//!
//! The cursor is a single monotonic resumption token stored in the `settings`
//! table under `telegram_poll_offset`. It advances only after a batch has been
//! fully applied, so a crash mid-batch replays from the last watermark
//! (at-least-once delivery).

use rusqlite::params;

use super::{DbError, TrackerDb};

const OFFSET_KEY: &str = "telegram_poll_offset";

/// Read the current poll offset, defaulting to 0 on first run.
pub fn poll_offset(db: &TrackerDb) -> Result<i64, DbError> {
    let value: Option<String> = db
        .conn_ref()
        .query_row(
            "SELECT value FROM settings WHERE key = ?1",
            params![OFFSET_KEY],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;

    Ok(value.and_then(|v| v.parse::<i64>().ok()).unwrap_or(0))
}

/// Write the poll offset unconditionally. Idempotent: setting the same value
/// twice is a no-op.
pub fn set_poll_offset(db: &TrackerDb, offset: i64) -> Result<(), DbError> {
    db.conn_ref().execute(
        "INSERT INTO settings (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![OFFSET_KEY, offset.to_string()],
    )?;
    Ok(())
}

/// Compare-and-swap cursor advance.
///
/// Re-reads the stored offset inside a transaction and writes `new_offset`
/// only if the stored value still equals `expected_prev`. Returns whether the
/// swap happened. A `false` return means another writer moved the cursor
/// since this tick began — the caller must not overwrite it.
pub fn advance_poll_offset(
    db: &TrackerDb,
    expected_prev: i64,
    new_offset: i64,
) -> Result<bool, DbError> {
    db.with_transaction(|db| {
        let stored = poll_offset(db)?;
        if stored != expected_prev {
            return Ok(false);
        }
        // Never regress, even against a caller bug.
        if new_offset < stored {
            return Ok(false);
        }
        set_poll_offset(db, new_offset)?;
        Ok(true)
    })
}
