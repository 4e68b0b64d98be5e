//! Dashboard queries over the registry and archive, plus the dispatcher's
//! manual status override.
//!
//! The live-tracking projection is derived on read: registry row joined with
//! the newest location report. Nothing here writes to the archive.

use chrono::{Duration, Utc};

use crate::db::{hikers, messages, DbError, TrackerDb};
use crate::media::ObjectStore;
use crate::types::{Hiker, HikerMessage, HikerStatus, LiveTrackingRow};

/// All registered hikers, most recently created first.
pub fn list_hikers(db: &TrackerDb) -> Result<Vec<Hiker>, DbError> {
    hikers::list_hikers(db)
}

/// One hiker by internal id.
pub fn get_hiker(db: &TrackerDb, hiker_id: &str) -> Result<Option<Hiker>, DbError> {
    hikers::get_hiker(db, hiker_id)
}

/// One hiker's message timeline, oldest first.
///
/// When an object store is available, photo rows get their `media_url`
/// resolved from the stored reference. Resolution is best-effort: a storage
/// hiccup leaves the URL empty rather than failing the read.
pub async fn list_hiker_messages(
    db: &TrackerDb,
    hiker_id: &str,
    store: Option<&dyn ObjectStore>,
) -> Result<Vec<HikerMessage>, DbError> {
    let mut timeline = messages::list_messages(db, hiker_id)?;

    if let Some(store) = store {
        for msg in timeline.iter_mut() {
            if let Some(media_ref) = msg.media_ref.as_deref() {
                match store.get_url(media_ref).await {
                    Ok(url) => msg.media_url = Some(url),
                    Err(e) => {
                        log::debug!("Could not resolve media url for {}: {}", media_ref, e);
                    }
                }
            }
        }
    }

    Ok(timeline)
}

/// The live-tracking projection: every hiker with their status, last-seen
/// timestamp, and most recent reported position.
pub fn list_live_tracking(db: &TrackerDb) -> Result<Vec<LiveTrackingRow>, DbError> {
    let all = hikers::list_hikers(db)?;
    let mut rows = Vec::with_capacity(all.len());

    for hiker in all {
        let location = messages::latest_location(db, &hiker.id)?;
        let (geo_lat, geo_lon, geo_updated_at) = match location {
            Some((lat, lon, at)) => (Some(lat), Some(lon), Some(at)),
            None => (None, None, None),
        };
        rows.push(LiveTrackingRow {
            hiker_id: hiker.id,
            telegram_user_id: hiker.telegram_user_id,
            telegram_username: hiker.telegram_username,
            status: hiker.status,
            last_seen_at: hiker.last_seen_at,
            geo_lat,
            geo_lon,
            geo_updated_at,
        });
    }

    Ok(rows)
}

/// Manual status override from the dispatcher console. Applied without a
/// state-machine guard, same as pipeline-driven transitions.
pub fn set_status(db: &TrackerDb, hiker_id: &str, status: HikerStatus) -> Result<(), DbError> {
    hikers::set_hiker_status(db, hiker_id, status)?;
    log::info!("Dispatcher set hiker {} status to {}", hiker_id, status.as_str());
    Ok(())
}

/// Hikers that are en route but silent: no archived message within the
/// `stale_after` window (or none at all).
pub fn list_hikers_needing_attention(
    db: &TrackerDb,
    stale_after: Duration,
) -> Result<Vec<Hiker>, DbError> {
    let cutoff = (Utc::now() - stale_after).to_rfc3339();
    let mut flagged = Vec::new();

    for hiker in hikers::list_hikers(db)? {
        if hiker.status != HikerStatus::EnRoute {
            continue;
        }
        let stale = match messages::latest_message_at(db, &hiker.id)? {
            Some(at) => at < cutoff,
            None => true,
        };
        if stale {
            flagged.push(hiker);
        }
    }

    Ok(flagged)
}
