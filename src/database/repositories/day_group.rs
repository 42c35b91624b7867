use super::Repository;
use crate::database::models::DayGroup;
use crate::database::{DatabaseError, DbPool};
use crate::schema::{clusters, day_groups};
use chrono::Utc;
use diesel::prelude::*;

pub struct DayGroupRepository {
    pool: DbPool,
}

impl Repository for DayGroupRepository {
    fn pool(&self) -> &DbPool {
        &self.pool
    }
}

impl DayGroupRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn upsert(&self, group: &DayGroup) -> Result<(), DatabaseError> {
        let mut conn = self.conn()?;

        diesel::insert_into(day_groups::table)
            .values(group)
            .on_conflict(day_groups::day_key)
            .do_update()
            .set((
                day_groups::majority_label.eq(group.majority_label.clone()),
                day_groups::cluster_count.eq(group.cluster_count),
                day_groups::total_visible_items.eq(group.total_visible_items),
                day_groups::updated_at.eq(group.updated_at.clone()),
            ))
            .execute(&mut conn)?;

        Ok(())
    }

    pub fn find_by_key(&self, day_key: &str) -> Result<Option<DayGroup>, DatabaseError> {
        let mut conn = self.conn()?;

        day_groups::table
            .filter(day_groups::day_key.eq(day_key))
            .select(DayGroup::as_select())
            .first(&mut conn)
            .optional()
            .map_err(DatabaseError::Query)
    }

    /// All day groups, newest day first, the order a timeline renders them.
    pub fn find_all(&self) -> Result<Vec<DayGroup>, DatabaseError> {
        let mut conn = self.conn()?;

        day_groups::table
            .order(day_groups::day_key.desc())
            .select(DayGroup::as_select())
            .load(&mut conn)
            .map_err(DatabaseError::Query)
    }

    pub fn delete(&self, day_key: &str) -> Result<bool, DatabaseError> {
        let mut conn = self.conn()?;

        let deleted = diesel::delete(day_groups::table.filter(day_groups::day_key.eq(day_key)))
            .execute(&mut conn)?;

        Ok(deleted > 0)
    }

    pub fn delete_all(&self) -> Result<usize, DatabaseError> {
        let mut conn = self.conn()?;

        diesel::delete(day_groups::table)
            .execute(&mut conn)
            .map_err(DatabaseError::Query)
    }

    /// Delete day groups whose last cluster is gone.
    pub fn delete_childless(&self) -> Result<usize, DatabaseError> {
        let mut conn = self.conn()?;

        conn.transaction::<_, DatabaseError, _>(|conn| {
            let live_days: Vec<String> = clusters::table
                .select(clusters::day_key)
                .distinct()
                .load(conn)?;

            let deleted =
                diesel::delete(day_groups::table.filter(day_groups::day_key.ne_all(&live_days)))
                    .execute(conn)?;

            Ok(deleted)
        })
    }

    /// Recompute one day group's rollup from its surviving clusters. Deletes
    /// the group when no clusters remain; the stored majority label is kept.
    pub fn refresh_rollup(&self, day_key: &str) -> Result<(), DatabaseError> {
        let mut conn = self.conn()?;
        let now = Utc::now().to_rfc3339();

        conn.transaction::<_, DatabaseError, _>(|conn| {
            let counts: Vec<i32> = clusters::table
                .filter(clusters::day_key.eq(day_key))
                .select(clusters::member_count)
                .load(conn)?;

            if counts.is_empty() {
                diesel::delete(day_groups::table.filter(day_groups::day_key.eq(day_key)))
                    .execute(conn)?;
                return Ok(());
            }

            diesel::update(day_groups::table.filter(day_groups::day_key.eq(day_key)))
                .set((
                    day_groups::cluster_count.eq(counts.len() as i32),
                    day_groups::total_visible_items.eq(counts.iter().sum::<i32>()),
                    day_groups::updated_at.eq(&now),
                ))
                .execute(conn)?;

            Ok(())
        })
    }
}
