use crate::core::geo::Coordinate;
use crate::core::labeling;
use crate::schema::*;
use crate::traits::MediaRecord;
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

// Media item models
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = media_items)]
pub struct MediaItem {
    pub id: String,
    pub kind: String,
    pub captured_at: i64,
    pub day_key: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub size_bytes: i64,
    pub width: i32,
    pub height: i32,
    pub duration_seconds: Option<f64>,
    pub cluster_ref: Option<String>,
    pub hidden: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl MediaItem {
    pub fn coordinate(&self) -> Option<Coordinate> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some(Coordinate::new(lat, lon)),
            _ => None,
        }
    }

    pub fn is_geotagged(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = media_items)]
pub struct NewMediaItem {
    pub id: String,
    pub kind: String,
    pub captured_at: i64,
    pub day_key: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub size_bytes: i64,
    pub width: i32,
    pub height: i32,
    pub duration_seconds: Option<f64>,
    pub cluster_ref: Option<String>,
    pub hidden: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl NewMediaItem {
    /// Convert a record fetched from the media source into an insertable row.
    /// The organizational overlay (cluster_ref, hidden) starts out clear; the
    /// upsert path leaves existing overlay values untouched.
    pub fn from_record(record: &MediaRecord) -> Self {
        let now = Utc::now().to_rfc3339();

        Self {
            id: record.id.clone(),
            kind: String::from(record.kind),
            captured_at: record.captured_at,
            day_key: labeling::day_key(record.captured_at),
            latitude: record.coordinate.map(|c| c.latitude),
            longitude: record.coordinate.map(|c| c.longitude),
            size_bytes: record.size_bytes,
            width: record.width,
            height: record.height,
            duration_seconds: record.duration_seconds,
            cluster_ref: None,
            hidden: false,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

// Cluster models
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = clusters)]
pub struct Cluster {
    pub id: String,
    pub day_key: String,
    pub latitude: f64,
    pub longitude: f64,
    pub radius: f64,
    pub label: Option<String>,
    pub member_count: i32,
    pub created_at: String,
}

impl Cluster {
    /// A cluster without geotagged members carries the (0, 0) sentinel.
    pub fn has_real_centroid(&self) -> bool {
        self.latitude != 0.0 || self.longitude != 0.0
    }

    pub fn centroid(&self) -> Option<Coordinate> {
        if self.has_real_centroid() {
            Some(Coordinate::new(self.latitude, self.longitude))
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = clusters)]
pub struct NewCluster {
    pub id: String,
    pub day_key: String,
    pub latitude: f64,
    pub longitude: f64,
    pub radius: f64,
    pub label: Option<String>,
    pub member_count: i32,
    pub created_at: String,
}

// Day group model; upserted whole, so one struct serves both directions
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = day_groups)]
pub struct DayGroup {
    pub day_key: String,
    pub majority_label: Option<String>,
    pub cluster_count: i32,
    pub total_visible_items: i32,
    pub updated_at: String,
}

// Geocode cache model
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = geocode_cache)]
pub struct GeocodeCacheEntry {
    pub cache_key: String,
    pub label: String,
    pub place_name: Option<String>,
    pub cached_at: i64,
}

// Enums for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    Photo,
    Video,
}

impl From<String> for MediaKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "video" => MediaKind::Video,
            _ => MediaKind::Photo,
        }
    }
}

impl From<MediaKind> for String {
    fn from(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Photo => "photo".to_string(),
            MediaKind::Video => "video".to_string(),
        }
    }
}
