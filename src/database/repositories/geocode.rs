use super::Repository;
use crate::database::models::GeocodeCacheEntry;
use crate::database::{DatabaseError, DbPool};
use crate::schema::geocode_cache;
use diesel::prelude::*;

pub struct GeocodeRepository {
    pool: DbPool,
}

impl Repository for GeocodeRepository {
    fn pool(&self) -> &DbPool {
        &self.pool
    }
}

impl GeocodeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn get(&self, cache_key: &str) -> Result<Option<GeocodeCacheEntry>, DatabaseError> {
        let mut conn = self.conn()?;

        geocode_cache::table
            .filter(geocode_cache::cache_key.eq(cache_key))
            .select(GeocodeCacheEntry::as_select())
            .first(&mut conn)
            .optional()
            .map_err(DatabaseError::Query)
    }

    /// Store or refresh an entry; re-resolving an expired key lands here.
    pub fn put(&self, entry: &GeocodeCacheEntry) -> Result<(), DatabaseError> {
        let mut conn = self.conn()?;

        diesel::insert_into(geocode_cache::table)
            .values(entry)
            .on_conflict(geocode_cache::cache_key)
            .do_update()
            .set((
                geocode_cache::label.eq(entry.label.clone()),
                geocode_cache::place_name.eq(entry.place_name.clone()),
                geocode_cache::cached_at.eq(entry.cached_at),
            ))
            .execute(&mut conn)?;

        Ok(())
    }

    pub fn count(&self) -> Result<i64, DatabaseError> {
        let mut conn = self.conn()?;

        geocode_cache::table
            .count()
            .get_result(&mut conn)
            .map_err(DatabaseError::Query)
    }
}
