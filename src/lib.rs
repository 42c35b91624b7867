//! # photo-atlas
//!
//! Organizes a flat, timestamped, partially geo-tagged media collection into
//! calendar days subdivided into location clusters ("albums"). The device
//! media library and the reverse geocoder plug in through the [`traits`]
//! ports; everything else persists to an embedded SQLite database.

pub mod core;
pub mod database;
pub mod schema;
pub mod services;
pub mod traits;

#[cfg(test)]
pub(crate) mod test_support;

pub use crate::core::clustering::{cluster_day, ClusterDraft, ClusterError, ClusterParams};
pub use crate::core::geo::Coordinate;
pub use crate::core::merge::{estimate_radius, merge_nearby};
pub use database::{default_database_path, establish_connection, DatabaseError, DbPool};
pub use services::consistency::{ConsistencyService, DirtyDayQueue};
pub use services::geocode::GeocodeService;
pub use services::indexer::{
    FirstBatchSummary, IndexError, IndexEvent, IndexManager, IndexerConfig, ReclusterStrategy,
    ScanState, ScanSummary,
};
pub use traits::{MediaRecord, MediaSource, ReverseGeocoder};
