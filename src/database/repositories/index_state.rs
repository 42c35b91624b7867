use super::Repository;
use crate::database::{DatabaseError, DbPool};
use crate::schema::index_state;
use diesel::prelude::*;

const LAST_SCAN_TIME_KEY: &str = "last_scan_time";
const LAST_SCAN_SUMMARY_KEY: &str = "last_scan_summary";

/// Scan bookkeeping rows: a key/value table so the indexer survives process
/// restarts without a dedicated schema per field.
pub struct IndexStateRepository {
    pool: DbPool,
}

impl Repository for IndexStateRepository {
    fn pool(&self) -> &DbPool {
        &self.pool
    }
}

impl IndexStateRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let mut conn = self.conn()?;

        index_state::table
            .filter(index_state::key.eq(key))
            .select(index_state::value)
            .first(&mut conn)
            .optional()
            .map_err(DatabaseError::Query)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        let mut conn = self.conn()?;

        diesel::insert_into(index_state::table)
            .values((index_state::key.eq(key), index_state::value.eq(value)))
            .on_conflict(index_state::key)
            .do_update()
            .set(index_state::value.eq(value))
            .execute(&mut conn)?;

        Ok(())
    }

    /// Watermark for incremental scans, advanced only after a scan finishes
    /// without a fatal error.
    pub fn last_scan_time(&self) -> Result<Option<i64>, DatabaseError> {
        Ok(self
            .get(LAST_SCAN_TIME_KEY)?
            .and_then(|v| v.parse::<i64>().ok()))
    }

    pub fn set_last_scan_time(&self, timestamp_ms: i64) -> Result<(), DatabaseError> {
        self.set(LAST_SCAN_TIME_KEY, &timestamp_ms.to_string())
    }

    pub fn last_scan_summary_json(&self) -> Result<Option<String>, DatabaseError> {
        self.get(LAST_SCAN_SUMMARY_KEY)
    }

    pub fn set_last_scan_summary_json(&self, json: &str) -> Result<(), DatabaseError> {
        self.set(LAST_SCAN_SUMMARY_KEY, json)
    }
}
