//! Shared fixtures for unit tests: an in-memory media source, a scripted
//! geocoder, and row builders against a throwaway SQLite database.

use crate::core::clustering::ClusterDraft;
use crate::core::geo::Coordinate;
use crate::core::labeling;
use crate::database::models::{DayGroup, MediaItem, MediaKind, NewMediaItem};
use crate::database::{establish_connection, DbPool};
use crate::traits::{
    DeleteOutcome, GeocodeError, MediaRecord, MediaSource, PlaceName, ReverseGeocoder, SourceError,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;
use uuid::Uuid;

/// Fresh migrated database in a temp directory. Keep the guard alive for the
/// duration of the test.
pub fn test_pool() -> (DbPool, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test.db");
    let pool = establish_connection(&db_path.to_string_lossy()).unwrap();
    (pool, dir)
}

pub fn media_item(id: &str, captured_at: i64, coordinate: Option<(f64, f64)>) -> MediaItem {
    let now = Utc::now().to_rfc3339();
    MediaItem {
        id: id.to_string(),
        kind: String::from(MediaKind::Photo),
        captured_at,
        day_key: labeling::day_key(captured_at),
        latitude: coordinate.map(|(lat, _)| lat),
        longitude: coordinate.map(|(_, lon)| lon),
        size_bytes: 1_024,
        width: 4_000,
        height: 3_000,
        duration_seconds: None,
        cluster_ref: None,
        hidden: false,
        created_at: now.clone(),
        updated_at: now,
    }
}

const TEST_CAPTURED_AT: i64 = 1_700_000_000_000;

pub fn geotagged_item(id: &str, latitude: f64, longitude: f64) -> MediaItem {
    media_item(id, TEST_CAPTURED_AT, Some((latitude, longitude)))
}

pub fn plain_item(id: &str) -> MediaItem {
    media_item(id, TEST_CAPTURED_AT, None)
}

pub fn new_item_at(
    id: &str,
    captured_at: i64,
    coordinate: Option<(f64, f64)>,
) -> NewMediaItem {
    let now = Utc::now().to_rfc3339();
    NewMediaItem {
        id: id.to_string(),
        kind: String::from(MediaKind::Photo),
        captured_at,
        day_key: labeling::day_key(captured_at),
        latitude: coordinate.map(|(lat, _)| lat),
        longitude: coordinate.map(|(_, lon)| lon),
        size_bytes: 1_024,
        width: 4_000,
        height: 3_000,
        duration_seconds: None,
        cluster_ref: None,
        hidden: false,
        created_at: now.clone(),
        updated_at: now,
    }
}

pub fn new_item(id: &str, captured_at: i64) -> NewMediaItem {
    new_item_at(id, captured_at, None)
}

pub fn draft_with_members(
    day_key: &str,
    centroid: Option<Coordinate>,
    member_ids: &[&str],
) -> ClusterDraft {
    ClusterDraft {
        id: format!("cls_{}", Uuid::new_v4().simple()),
        day_key: day_key.to_string(),
        centroid,
        radius_m: if centroid.is_some() { 300.0 } else { 0.0 },
        label: None,
        member_ids: member_ids.iter().map(|s| s.to_string()).collect(),
    }
}

pub fn day_group(
    day_key: &str,
    majority_label: Option<&str>,
    cluster_count: i32,
    total_visible_items: i32,
) -> DayGroup {
    DayGroup {
        day_key: day_key.to_string(),
        majority_label: majority_label.map(|s| s.to_string()),
        cluster_count,
        total_visible_items,
        updated_at: Utc::now().to_rfc3339(),
    }
}

/// Record plus the modification timestamp the scripted source filters on.
pub fn record_at(
    id: &str,
    captured_at: i64,
    coordinate: Option<(f64, f64)>,
) -> (MediaRecord, i64) {
    let record = MediaRecord {
        id: id.to_string(),
        kind: MediaKind::Photo,
        captured_at,
        coordinate: coordinate.map(|(lat, lon)| Coordinate::new(lat, lon)),
        size_bytes: 1_024,
        width: 4_000,
        height: 3_000,
        duration_seconds: None,
    };
    (record, captured_at)
}

/// In-memory media source with scriptable failure modes.
pub struct ScriptedMediaSource {
    records: Mutex<Vec<(MediaRecord, i64)>>,
    unavailable: AtomicBool,
    failing_deletes: Mutex<HashSet<String>>,
}

impl ScriptedMediaSource {
    pub fn with_records(records: Vec<(MediaRecord, i64)>) -> Self {
        Self {
            records: Mutex::new(records),
            unavailable: AtomicBool::new(false),
            failing_deletes: Mutex::new(HashSet::new()),
        }
    }

    pub fn push(&self, record: MediaRecord, modified_ms: i64) {
        self.records.lock().unwrap().push((record, modified_ms));
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Deletion of this id will be reported as failed by the device.
    pub fn fail_deletion_of(&self, id: &str) {
        self.failing_deletes.lock().unwrap().insert(id.to_string());
    }

    fn check_available(&self) -> Result<(), SourceError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(SourceError::Unavailable("scripted outage".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MediaSource for ScriptedMediaSource {
    async fn count(&self) -> Result<u64, SourceError> {
        self.check_available()?;
        Ok(self.records.lock().unwrap().len() as u64)
    }

    async fn fetch_batch(&self, offset: u64, limit: u64) -> Result<Vec<MediaRecord>, SourceError> {
        self.check_available()?;
        let records = self.records.lock().unwrap();
        Ok(records
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|(record, _)| record.clone())
            .collect())
    }

    async fn fetch_modified_since(&self, since_ms: i64) -> Result<Vec<MediaRecord>, SourceError> {
        self.check_available()?;
        let records = self.records.lock().unwrap();
        Ok(records
            .iter()
            .filter(|(_, modified)| *modified > since_ms)
            .map(|(record, _)| record.clone())
            .collect())
    }

    async fn delete_items(&self, ids: &[String]) -> Result<DeleteOutcome, SourceError> {
        self.check_available()?;
        let failing = self.failing_deletes.lock().unwrap();
        let mut records = self.records.lock().unwrap();

        let mut outcome = DeleteOutcome::default();
        for id in ids {
            if failing.contains(id) {
                outcome.failed_ids.push(id.clone());
            } else {
                records.retain(|(record, _)| record.id != *id);
                outcome.deleted_ids.push(id.clone());
            }
        }
        Ok(outcome)
    }
}

/// Geocoder that records call counts and answers from a script.
pub struct RecordingGeocoder {
    label: Option<String>,
    fail: bool,
    calls: AtomicUsize,
}

impl RecordingGeocoder {
    pub fn returning(label: &str) -> Self {
        Self {
            label: Some(label.to_string()),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn returning_none() -> Self {
        Self {
            label: None,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            label: None,
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReverseGeocoder for RecordingGeocoder {
    async fn resolve(&self, _coordinate: Coordinate) -> Result<Option<PlaceName>, GeocodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(GeocodeError::Unavailable("scripted outage".to_string()));
        }
        Ok(self.label.as_ref().map(|label| PlaceName {
            label: label.clone(),
            full_name: None,
        }))
    }
}
