use crate::core::geo::Coordinate;
use crate::database::models::GeocodeCacheEntry;
use crate::database::repositories::GeocodeRepository;
use crate::database::{DatabaseError, DbPool};
use crate::traits::ReverseGeocoder;
use chrono::Utc;
use std::sync::Arc;

/// Cached place names expire after a week.
pub const GEOCODE_TTL_MS: i64 = 7 * 24 * 60 * 60 * 1000;

/// TTL cache in front of the reverse geocoder, keyed by coordinates rounded
/// to cache precision. Shields the provider from one lookup per item when a
/// whole album was shot in the same place.
pub struct GeocodeService {
    geocoder: Arc<dyn ReverseGeocoder>,
    repo: GeocodeRepository,
    ttl_ms: i64,
}

impl GeocodeService {
    pub fn new(geocoder: Arc<dyn ReverseGeocoder>, pool: DbPool) -> Self {
        Self {
            geocoder,
            repo: GeocodeRepository::new(pool),
            ttl_ms: GEOCODE_TTL_MS,
        }
    }

    pub fn with_ttl(mut self, ttl_ms: i64) -> Self {
        self.ttl_ms = ttl_ms;
        self
    }

    /// Resolve a display label for a coordinate.
    ///
    /// Cache hits younger than the TTL short-circuit; expired entries are
    /// re-resolved and overwritten in place rather than evicted up front. A
    /// missing or failing provider degrades to the raw-coordinate label and
    /// never fails the caller.
    pub async fn label_for(&self, coordinate: Coordinate) -> Result<String, DatabaseError> {
        let cache_key = coordinate.rounded_key();
        let now = Utc::now().timestamp_millis();

        let expired = match self.repo.get(&cache_key)? {
            Some(entry) if now - entry.cached_at < self.ttl_ms => return Ok(entry.label),
            Some(_) => true,
            None => false,
        };

        match self.geocoder.resolve(coordinate).await {
            Ok(Some(place)) => {
                self.repo.put(&GeocodeCacheEntry {
                    cache_key,
                    label: place.label.clone(),
                    place_name: place.full_name,
                    cached_at: now,
                })?;
                Ok(place.label)
            }
            Ok(None) => {
                log::debug!("no place name for {}, using coordinates", cache_key);
                Ok(fallback_label(coordinate))
            }
            Err(e) => {
                if expired {
                    log::warn!("geocode refresh failed for {}: {}", cache_key, e);
                } else {
                    log::warn!("geocode lookup failed for {}: {}", cache_key, e);
                }
                Ok(fallback_label(coordinate))
            }
        }
    }
}

/// Raw-coordinate text shown when no place name can be resolved.
pub fn fallback_label(coordinate: Coordinate) -> String {
    format!("{:.3}, {:.3}", coordinate.latitude, coordinate.longitude)
}
