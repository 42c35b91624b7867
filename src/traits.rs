//! Ports to the platform: the media source that owns the raw files and the
//! reverse geocoder that turns coordinates into place names. The engine only
//! ever sees these traits.

use crate::core::geo::Coordinate;
use crate::database::models::MediaKind;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A capture record as the platform reports it, before it becomes a stored
/// media item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaRecord {
    pub id: String,
    pub kind: MediaKind,
    /// Capture time in epoch milliseconds, bucketed in local time.
    pub captured_at: i64,
    pub coordinate: Option<Coordinate>,
    pub size_bytes: i64,
    pub width: i32,
    pub height: i32,
    pub duration_seconds: Option<f64>,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("media source unavailable: {0}")]
    Unavailable(String),

    #[error("permission denied reading the media source")]
    PermissionDenied,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of a device deletion request. Partial failure is ordinary here:
/// failed ids stay on the device and can be retried by the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteOutcome {
    pub deleted_ids: Vec<String>,
    pub failed_ids: Vec<String>,
}

impl DeleteOutcome {
    pub fn absorb(&mut self, other: DeleteOutcome) {
        self.deleted_ids.extend(other.deleted_ids);
        self.failed_ids.extend(other.failed_ids);
    }
}

/// Access to the device media library. Enumeration order must be stable
/// across `fetch_batch` calls within one scan.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn count(&self) -> Result<u64, SourceError>;

    async fn fetch_batch(&self, offset: u64, limit: u64) -> Result<Vec<MediaRecord>, SourceError>;

    /// Items created or modified after the given epoch-millisecond timestamp.
    async fn fetch_modified_since(&self, since_ms: i64) -> Result<Vec<MediaRecord>, SourceError>;

    async fn delete_items(&self, ids: &[String]) -> Result<DeleteOutcome, SourceError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceName {
    /// Short display label, typically a city or neighborhood.
    pub label: String,
    pub full_name: Option<String>,
}

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("reverse geocoder unavailable: {0}")]
    Unavailable(String),

    #[error("reverse geocoder rate limited")]
    RateLimited,
}

/// Coordinate to place-name lookup. May be rate-limited or offline; callers
/// treat every failure as "no name available".
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    async fn resolve(&self, coordinate: Coordinate) -> Result<Option<PlaceName>, GeocodeError>;
}
