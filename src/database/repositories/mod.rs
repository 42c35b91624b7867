pub mod cluster;
pub mod day_group;
pub mod geocode;
pub mod index_state;
pub mod media_item;

pub use cluster::ClusterRepository;
pub use day_group::DayGroupRepository;
pub use geocode::GeocodeRepository;
pub use index_state::IndexStateRepository;
pub use media_item::MediaItemRepository;

use super::{DatabaseError, DbConnection, DbPool};

pub trait Repository {
    fn pool(&self) -> &DbPool;

    fn conn(&self) -> Result<DbConnection, DatabaseError> {
        self.pool()
            .get()
            .map_err(|e| DatabaseError::Pool(e.to_string()))
    }
}
