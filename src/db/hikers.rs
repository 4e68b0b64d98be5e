//! Person registry: one row per distinct Telegram account.
//!
//! Upserts are keyed on `telegram_user_id`. Status transitions are applied
//! without a state-machine guard — field reports arrive out of order, and a
//! late `problem` signal must always overwrite a `finished` status.

use chrono::Utc;
use rusqlite::{params, Row};

use super::{DbError, TrackerDb};
use crate::types::{Hiker, HikerStatus};

fn hiker_from_row(row: &Row) -> Result<Hiker, rusqlite::Error> {
    let id: String = row.get("id")?;
    let status_text: String = row.get("status")?;
    // Unknown status text would mean a corrupted row; fall back to preparing
    // rather than failing the whole read, but leave a trace.
    let status = HikerStatus::parse(&status_text).unwrap_or_else(|| {
        log::warn!(
            "Hiker {} has unknown status {:?}, treating as preparing",
            id,
            status_text
        );
        HikerStatus::Preparing
    });
    Ok(Hiker {
        id,
        telegram_user_id: row.get("telegram_user_id")?,
        telegram_username: row.get("telegram_username")?,
        status,
        created_at: row.get("created_at")?,
        last_seen_at: row.get("last_seen_at")?,
    })
}

/// Find a hiker by Telegram account id.
pub fn find_by_telegram_user_id(
    db: &TrackerDb,
    telegram_user_id: i64,
) -> Result<Option<Hiker>, DbError> {
    let result = db
        .conn_ref()
        .query_row(
            "SELECT id, telegram_user_id, telegram_username, status, created_at, last_seen_at
             FROM hikers WHERE telegram_user_id = ?1",
            params![telegram_user_id],
            hiker_from_row,
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;
    Ok(result)
}

/// Create or update the registry row for a Telegram account.
///
/// Unseen accounts are created with status `preparing`. Existing rows get a
/// monotonic `last_seen_at` bump, plus a username/status patch when provided.
pub fn upsert_hiker(
    db: &TrackerDb,
    telegram_user_id: i64,
    telegram_username: Option<&str>,
    status: Option<HikerStatus>,
) -> Result<Hiker, DbError> {
    let now = Utc::now().to_rfc3339();

    match find_by_telegram_user_id(db, telegram_user_id)? {
        None => {
            let id = uuid::Uuid::new_v4().to_string();
            let status = status.unwrap_or(HikerStatus::Preparing);
            db.conn_ref().execute(
                "INSERT INTO hikers (id, telegram_user_id, telegram_username, status, created_at, last_seen_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![id, telegram_user_id, telegram_username, status.as_str(), now],
            )?;
            log::info!(
                "Registered new hiker {} (telegram user {})",
                id,
                telegram_user_id
            );
            Ok(Hiker {
                id,
                telegram_user_id,
                telegram_username: telegram_username.map(String::from),
                status,
                created_at: now.clone(),
                last_seen_at: now,
            })
        }
        Some(existing) => {
            if let Some(new_status) = status {
                audit_regression(&existing, new_status);
            }

            // last_seen_at is monotonic: MAX() guards against clock skew.
            db.conn_ref().execute(
                "UPDATE hikers SET
                    telegram_username = COALESCE(?1, telegram_username),
                    status = COALESCE(?2, status),
                    last_seen_at = MAX(last_seen_at, ?3)
                 WHERE id = ?4",
                params![
                    telegram_username,
                    status.map(|s| s.as_str()),
                    now,
                    existing.id
                ],
            )?;

            find_by_telegram_user_id(db, telegram_user_id)?
                .ok_or_else(|| DbError::HikerNotFound(existing.id))
        }
    }
}

/// Unconditional status overwrite, used by both the pipeline and the manual
/// dispatcher override.
pub fn set_hiker_status(
    db: &TrackerDb,
    hiker_id: &str,
    status: HikerStatus,
) -> Result<(), DbError> {
    match get_hiker(db, hiker_id)? {
        Some(existing) => audit_regression(&existing, status),
        None => return Err(DbError::HikerNotFound(hiker_id.to_string())),
    }

    db.conn_ref().execute(
        "UPDATE hikers SET status = ?1 WHERE id = ?2",
        params![status.as_str(), hiker_id],
    )?;
    Ok(())
}

/// Log backward transitions (e.g. `finished -> problem`) as an audit note.
/// The overwrite is still applied — out-of-order delivery is expected.
fn audit_regression(existing: &Hiker, new_status: HikerStatus) {
    if new_status.progression_rank() < existing.status.progression_rank() {
        log::info!(
            "Hiker {} status regressed {} -> {} (out-of-order report or restart)",
            existing.id,
            existing.status.as_str(),
            new_status.as_str()
        );
    }
}

/// Fetch a hiker by internal id.
pub fn get_hiker(db: &TrackerDb, hiker_id: &str) -> Result<Option<Hiker>, DbError> {
    let result = db
        .conn_ref()
        .query_row(
            "SELECT id, telegram_user_id, telegram_username, status, created_at, last_seen_at
             FROM hikers WHERE id = ?1",
            params![hiker_id],
            hiker_from_row,
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;
    Ok(result)
}

/// List all hikers, most recently created first.
pub fn list_hikers(db: &TrackerDb) -> Result<Vec<Hiker>, DbError> {
    let mut stmt = db.conn_ref().prepare(
        "SELECT id, telegram_user_id, telegram_username, status, created_at, last_seen_at
         FROM hikers ORDER BY created_at DESC",
    )?;
    let rows = stmt
        .query_map([], hiker_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::temp_db;

    #[test]
    fn test_upsert_creates_with_preparing() {
        let (_dir, db) = temp_db();

        let hiker = upsert_hiker(&db, 42, Some("alice"), None).unwrap();
        assert_eq!(hiker.telegram_user_id, 42);
        assert_eq!(hiker.telegram_username.as_deref(), Some("alice"));
        assert_eq!(hiker.status, HikerStatus::Preparing);
        assert_eq!(hiker.created_at, hiker.last_seen_at);
    }

    #[test]
    fn test_upsert_twice_is_one_row() {
        let (_dir, db) = temp_db();

        let first = upsert_hiker(&db, 42, None, None).unwrap();
        let second = upsert_hiker(&db, 42, Some("alice"), None).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.telegram_username.as_deref(), Some("alice"));
        assert!(second.last_seen_at >= first.last_seen_at);

        let all = list_hikers(&db).unwrap();
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn test_upsert_keeps_username_when_absent() {
        let (_dir, db) = temp_db();

        upsert_hiker(&db, 42, Some("alice"), None).unwrap();
        let updated = upsert_hiker(&db, 42, None, Some(HikerStatus::EnRoute)).unwrap();

        assert_eq!(updated.telegram_username.as_deref(), Some("alice"));
        assert_eq!(updated.status, HikerStatus::EnRoute);
    }

    #[test]
    fn test_status_overwrite_is_unguarded() {
        let (_dir, db) = temp_db();

        let hiker = upsert_hiker(&db, 42, None, None).unwrap();
        set_hiker_status(&db, &hiker.id, HikerStatus::Finished).unwrap();

        // Regressive transition must still be applied
        set_hiker_status(&db, &hiker.id, HikerStatus::Problem).unwrap();
        let after = get_hiker(&db, &hiker.id).unwrap().unwrap();
        assert_eq!(after.status, HikerStatus::Problem);
    }

    #[test]
    fn test_corrupted_status_text_reads_as_preparing() {
        let (_dir, db) = temp_db();

        let hiker = upsert_hiker(&db, 42, None, Some(HikerStatus::EnRoute)).unwrap();
        db.conn_ref()
            .execute(
                "UPDATE hikers SET status = 'lost' WHERE id = ?1",
                rusqlite::params![hiker.id],
            )
            .unwrap();

        let read = get_hiker(&db, &hiker.id).unwrap().unwrap();
        assert_eq!(read.status, HikerStatus::Preparing);
    }

    #[test]
    fn test_set_status_unknown_hiker() {
        let (_dir, db) = temp_db();
        let result = set_hiker_status(&db, "missing", HikerStatus::Problem);
        assert!(matches!(result, Err(DbError::HikerNotFound(_))));
    }
}
