pub mod consistency;
pub mod geocode;
pub mod indexer;

pub use consistency::ConsistencyService;
pub use geocode::GeocodeService;
pub use indexer::IndexManager;
