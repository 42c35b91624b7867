use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters, used for great-circle distances.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Meters per degree of latitude, used to convert radii into bounding boxes.
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Decimal places kept when deriving a geocode cache key from a coordinate.
const CACHE_KEY_PRECISION: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance to another coordinate in meters (haversine).
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = (other.latitude - self.latitude).to_radians();
        let dlon = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
    }

    /// Cache key with coordinates rounded to a fixed precision, so nearby
    /// lookups share one reverse-geocode result.
    pub fn rounded_key(&self) -> String {
        format!(
            "{:.prec$},{:.prec$}",
            self.latitude,
            self.longitude,
            prec = CACHE_KEY_PRECISION
        )
    }

    /// Axis-aligned box that fully contains the circle of `radius_m` around
    /// this coordinate. Used as a cheap prefilter before exact distances.
    pub fn bounding_box(&self, radius_m: f64) -> BoundingBox {
        let dlat = radius_m / METERS_PER_DEGREE;
        // Longitude degrees shrink toward the poles; clamp the cosine so the
        // box stays finite at extreme latitudes.
        let cos_lat = self.latitude.to_radians().cos().abs().max(0.01);
        let dlon = radius_m / (METERS_PER_DEGREE * cos_lat);

        BoundingBox {
            min_latitude: self.latitude - dlat,
            max_latitude: self.latitude + dlat,
            min_longitude: self.longitude - dlon,
            max_longitude: self.longitude + dlon,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}
