//! Append-only message archive, scoped per hiker in arrival order.
//!
//! Rows are immutable once written. The single exception is the two-phase
//! photo write: the row is archived first with `media_ref` NULL, then patched
//! once the attachment relay succeeds. Archival never depends on the relay.

use rusqlite::{params, Row};

use super::{DbError, TrackerDb};
use crate::types::{HikerMessage, MessageKind, NewMessage};

fn message_from_row(row: &Row) -> Result<HikerMessage, rusqlite::Error> {
    let id: String = row.get("id")?;
    let kind_text: String = row.get("kind")?;
    // Corrupted kind text degrades to a plain note, with a trace.
    let kind = MessageKind::parse(&kind_text).unwrap_or_else(|| {
        log::warn!(
            "Message {} has unknown kind {:?}, treating as note",
            id,
            kind_text
        );
        MessageKind::Note
    });
    Ok(HikerMessage {
        id,
        hiker_id: row.get("hiker_id")?,
        telegram_user_id: row.get("telegram_user_id")?,
        kind,
        status_label: row.get("status_label")?,
        note: row.get("note")?,
        media_ref: row.get("media_ref")?,
        media_url: None,
        geo_lat: row.get("geo_lat")?,
        geo_lon: row.get("geo_lon")?,
        received_at: row.get("received_at")?,
    })
}

/// Append one archive row. Never mutates prior records.
pub fn insert_message(db: &TrackerDb, new: &NewMessage) -> Result<HikerMessage, DbError> {
    let id = uuid::Uuid::new_v4().to_string();
    db.conn_ref().execute(
        "INSERT INTO hiker_messages
            (id, hiker_id, telegram_user_id, kind, status_label, note, media_ref, geo_lat, geo_lon, received_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7, ?8, ?9)",
        params![
            id,
            new.hiker_id,
            new.telegram_user_id,
            new.kind.as_str(),
            new.status_label,
            new.note,
            new.geo_lat,
            new.geo_lon,
            new.received_at,
        ],
    )?;

    Ok(HikerMessage {
        id,
        hiker_id: new.hiker_id.clone(),
        telegram_user_id: new.telegram_user_id,
        kind: new.kind,
        status_label: new.status_label.clone(),
        note: new.note.clone(),
        media_ref: None,
        media_url: None,
        geo_lat: new.geo_lat,
        geo_lon: new.geo_lon,
        received_at: new.received_at.clone(),
    })
}

/// Phase two of the photo write: attach the durable storage reference once the
/// relay has succeeded. The only permitted update on an archived row.
pub fn set_media_ref(db: &TrackerDb, message_id: &str, media_ref: &str) -> Result<(), DbError> {
    let changed = db.conn_ref().execute(
        "UPDATE hiker_messages SET media_ref = ?1 WHERE id = ?2 AND media_ref IS NULL",
        params![media_ref, message_id],
    )?;
    if changed == 0 {
        log::warn!(
            "media_ref patch skipped for message {} (missing or already set)",
            message_id
        );
    }
    Ok(())
}

/// All archived messages for one hiker, oldest first (timeline order).
pub fn list_messages(db: &TrackerDb, hiker_id: &str) -> Result<Vec<HikerMessage>, DbError> {
    let mut stmt = db.conn_ref().prepare(
        "SELECT id, hiker_id, telegram_user_id, kind, status_label, note, media_ref,
                geo_lat, geo_lon, received_at
         FROM hiker_messages
         WHERE hiker_id = ?1
         ORDER BY received_at ASC, rowid ASC",
    )?;
    let rows = stmt
        .query_map(params![hiker_id], message_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Most recent location report for one hiker: `(lat, lon, received_at)`.
pub fn latest_location(
    db: &TrackerDb,
    hiker_id: &str,
) -> Result<Option<(f64, f64, String)>, DbError> {
    let result = db
        .conn_ref()
        .query_row(
            "SELECT geo_lat, geo_lon, received_at
             FROM hiker_messages
             WHERE hiker_id = ?1 AND kind = 'location'
               AND geo_lat IS NOT NULL AND geo_lon IS NOT NULL
             ORDER BY received_at DESC, rowid DESC
             LIMIT 1",
            params![hiker_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;
    Ok(result)
}

/// Timestamp of the newest archived message for one hiker, if any.
pub fn latest_message_at(db: &TrackerDb, hiker_id: &str) -> Result<Option<String>, DbError> {
    let result = db
        .conn_ref()
        .query_row(
            "SELECT received_at FROM hiker_messages
             WHERE hiker_id = ?1
             ORDER BY received_at DESC, rowid DESC
             LIMIT 1",
            params![hiker_id],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::hikers::upsert_hiker;
    use crate::db::test_support::temp_db;

    fn note_at(hiker_id: &str, text: &str, received_at: &str) -> NewMessage {
        NewMessage {
            hiker_id: hiker_id.to_string(),
            telegram_user_id: 42,
            kind: MessageKind::Note,
            status_label: None,
            note: Some(text.to_string()),
            geo_lat: None,
            geo_lon: None,
            received_at: received_at.to_string(),
        }
    }

    fn location_at(hiker_id: &str, lat: f64, lon: f64, received_at: &str) -> NewMessage {
        NewMessage {
            hiker_id: hiker_id.to_string(),
            telegram_user_id: 42,
            kind: MessageKind::Location,
            status_label: None,
            note: None,
            geo_lat: Some(lat),
            geo_lon: Some(lon),
            received_at: received_at.to_string(),
        }
    }

    #[test]
    fn test_timeline_order() {
        let (_dir, db) = temp_db();
        let hiker = upsert_hiker(&db, 42, None, None).unwrap();

        insert_message(&db, &note_at(&hiker.id, "second", "2026-08-01T10:00:02+00:00")).unwrap();
        insert_message(&db, &note_at(&hiker.id, "first", "2026-08-01T10:00:01+00:00")).unwrap();
        insert_message(&db, &note_at(&hiker.id, "third", "2026-08-01T10:00:03+00:00")).unwrap();

        let timeline = list_messages(&db, &hiker.id).unwrap();
        let texts: Vec<_> = timeline
            .iter()
            .map(|m| m.note.as_deref().unwrap())
            .collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_latest_location_picks_most_recent() {
        let (_dir, db) = temp_db();
        let hiker = upsert_hiker(&db, 42, None, None).unwrap();

        insert_message(&db, &location_at(&hiker.id, 46.1, 7.1, "2026-08-01T10:00:01+00:00"))
            .unwrap();
        insert_message(&db, &location_at(&hiker.id, 46.5, 7.5, "2026-08-01T10:00:02+00:00"))
            .unwrap();
        insert_message(&db, &location_at(&hiker.id, 46.85, 7.68, "2026-08-01T10:00:03+00:00"))
            .unwrap();

        let (lat, lon, at) = latest_location(&db, &hiker.id).unwrap().unwrap();
        assert_eq!((lat, lon), (46.85, 7.68));
        assert_eq!(at, "2026-08-01T10:00:03+00:00");
    }

    #[test]
    fn test_latest_location_ignores_notes() {
        let (_dir, db) = temp_db();
        let hiker = upsert_hiker(&db, 42, None, None).unwrap();

        insert_message(&db, &note_at(&hiker.id, "no geo here", "2026-08-01T10:00:01+00:00"))
            .unwrap();
        assert!(latest_location(&db, &hiker.id).unwrap().is_none());
    }

    #[test]
    fn test_media_ref_patch_once() {
        let (_dir, db) = temp_db();
        let hiker = upsert_hiker(&db, 42, None, None).unwrap();

        let photo = insert_message(
            &db,
            &NewMessage {
                hiker_id: hiker.id.clone(),
                telegram_user_id: 42,
                kind: MessageKind::Photo,
                status_label: None,
                note: None,
                geo_lat: None,
                geo_lon: None,
                received_at: "2026-08-01T10:00:01+00:00".to_string(),
            },
        )
        .unwrap();
        assert!(photo.media_ref.is_none());

        set_media_ref(&db, &photo.id, "st_abc123").unwrap();

        // Second patch must not overwrite the first reference
        set_media_ref(&db, &photo.id, "st_other").unwrap();

        let stored = list_messages(&db, &hiker.id).unwrap();
        assert_eq!(stored[0].media_ref.as_deref(), Some("st_abc123"));
    }

    #[test]
    fn test_corrupted_kind_text_reads_as_note() {
        let (_dir, db) = temp_db();
        let hiker = upsert_hiker(&db, 42, None, None).unwrap();

        let msg =
            insert_message(&db, &note_at(&hiker.id, "hello", "2026-08-01T10:00:01+00:00")).unwrap();
        db.conn_ref()
            .execute(
                "UPDATE hiker_messages SET kind = 'sticker' WHERE id = ?1",
                params![msg.id],
            )
            .unwrap();

        let stored = list_messages(&db, &hiker.id).unwrap();
        assert_eq!(stored[0].kind, MessageKind::Note);
    }

    #[test]
    fn test_latest_message_at() {
        let (_dir, db) = temp_db();
        let hiker = upsert_hiker(&db, 42, None, None).unwrap();

        assert!(latest_message_at(&db, &hiker.id).unwrap().is_none());

        insert_message(&db, &note_at(&hiker.id, "a", "2026-08-01T10:00:01+00:00")).unwrap();
        insert_message(&db, &note_at(&hiker.id, "b", "2026-08-01T11:00:00+00:00")).unwrap();

        assert_eq!(
            latest_message_at(&db, &hiker.id).unwrap().as_deref(),
            Some("2026-08-01T11:00:00+00:00")
        );
    }
}
