use super::Repository;
use crate::core::clustering::ClusterDraft;
use crate::database::models::{Cluster, DayGroup, NewCluster};
use crate::database::{DatabaseError, DbPool};
use crate::schema::{clusters, day_groups, media_items};
use chrono::Utc;
use diesel::prelude::*;

pub struct ClusterRepository {
    pool: DbPool,
}

impl Repository for ClusterRepository {
    fn pool(&self) -> &DbPool {
        &self.pool
    }
}

impl ClusterRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Supersede one day's geometry in a single transaction: drop the old
    /// cluster rows, detach the day's items, insert the fresh clusters, link
    /// their members, and upsert the day group. A crash leaves the day either
    /// fully old or fully new.
    pub fn replace_day(
        &self,
        day_key: &str,
        drafts: &[ClusterDraft],
        majority_label: Option<&str>,
    ) -> Result<(), DatabaseError> {
        let mut conn = self.conn()?;
        let now = Utc::now().to_rfc3339();

        conn.transaction::<_, DatabaseError, _>(|conn| {
            diesel::update(media_items::table.filter(media_items::day_key.eq(day_key)))
                .set(media_items::cluster_ref.eq(None::<String>))
                .execute(conn)?;

            diesel::delete(clusters::table.filter(clusters::day_key.eq(day_key)))
                .execute(conn)?;

            if drafts.is_empty() {
                diesel::delete(day_groups::table.filter(day_groups::day_key.eq(day_key)))
                    .execute(conn)?;
                return Ok(());
            }

            let mut total_visible = 0i32;
            for draft in drafts {
                let (latitude, longitude) = draft
                    .centroid
                    .map(|c| (c.latitude, c.longitude))
                    .unwrap_or((0.0, 0.0));

                let row = NewCluster {
                    id: draft.id.clone(),
                    day_key: day_key.to_string(),
                    latitude,
                    longitude,
                    radius: draft.radius_m,
                    label: draft.label.clone(),
                    member_count: draft.member_count() as i32,
                    created_at: now.clone(),
                };
                diesel::insert_into(clusters::table)
                    .values(&row)
                    .execute(conn)?;

                diesel::update(
                    media_items::table.filter(media_items::id.eq_any(&draft.member_ids)),
                )
                .set(media_items::cluster_ref.eq(&draft.id))
                .execute(conn)?;

                total_visible += draft.member_count() as i32;
            }

            let group = DayGroup {
                day_key: day_key.to_string(),
                majority_label: majority_label.map(|s| s.to_string()),
                cluster_count: drafts.len() as i32,
                total_visible_items: total_visible,
                updated_at: now.clone(),
            };
            diesel::insert_into(day_groups::table)
                .values(&group)
                .on_conflict(day_groups::day_key)
                .do_update()
                .set((
                    day_groups::majority_label.eq(group.majority_label.clone()),
                    day_groups::cluster_count.eq(group.cluster_count),
                    day_groups::total_visible_items.eq(group.total_visible_items),
                    day_groups::updated_at.eq(group.updated_at.clone()),
                ))
                .execute(conn)?;

            Ok(())
        })
    }

    pub fn find_by_id(&self, id: &str) -> Result<Option<Cluster>, DatabaseError> {
        let mut conn = self.conn()?;

        clusters::table
            .filter(clusters::id.eq(id))
            .select(Cluster::as_select())
            .first(&mut conn)
            .optional()
            .map_err(DatabaseError::Query)
    }

    /// One day's clusters, largest first.
    pub fn find_by_day(&self, day_key: &str) -> Result<Vec<Cluster>, DatabaseError> {
        let mut conn = self.conn()?;

        clusters::table
            .filter(clusters::day_key.eq(day_key))
            .order((clusters::member_count.desc(), clusters::id.asc()))
            .select(Cluster::as_select())
            .load(&mut conn)
            .map_err(DatabaseError::Query)
    }

    /// Every cluster, in stable id order.
    pub fn find_all(&self) -> Result<Vec<Cluster>, DatabaseError> {
        let mut conn = self.conn()?;

        clusters::table
            .order(clusters::id.asc())
            .select(Cluster::as_select())
            .load(&mut conn)
            .map_err(DatabaseError::Query)
    }

    /// Clusters that have an actual location, skipping the (0, 0) sentinel.
    pub fn find_with_real_centroid(&self) -> Result<Vec<Cluster>, DatabaseError> {
        let mut conn = self.conn()?;

        clusters::table
            .filter(clusters::latitude.ne(0.0).or(clusters::longitude.ne(0.0)))
            .order(clusters::id.asc())
            .select(Cluster::as_select())
            .load(&mut conn)
            .map_err(DatabaseError::Query)
    }

    pub fn update_member_count(&self, id: &str, member_count: i32) -> Result<(), DatabaseError> {
        let mut conn = self.conn()?;

        diesel::update(clusters::table.filter(clusters::id.eq(id)))
            .set(clusters::member_count.eq(member_count))
            .execute(&mut conn)?;

        Ok(())
    }

    pub fn delete_all(&self) -> Result<usize, DatabaseError> {
        let mut conn = self.conn()?;

        diesel::delete(clusters::table)
            .execute(&mut conn)
            .map_err(DatabaseError::Query)
    }

    /// Delete clusters no non-hidden item points at. Returns how many rows
    /// went away; calling it again right away deletes nothing.
    pub fn delete_empty(&self) -> Result<usize, DatabaseError> {
        let mut conn = self.conn()?;

        conn.transaction::<_, DatabaseError, _>(|conn| {
            let live_refs: Vec<String> = media_items::table
                .filter(media_items::hidden.eq(false))
                .filter(media_items::cluster_ref.is_not_null())
                .select(media_items::cluster_ref.assume_not_null())
                .distinct()
                .load(conn)?;

            let deleted = diesel::delete(clusters::table.filter(clusters::id.ne_all(&live_refs)))
                .execute(conn)?;

            Ok(deleted)
        })
    }

    /// Same as `delete_empty`, scoped to one day.
    pub fn delete_empty_for_day(&self, day_key: &str) -> Result<usize, DatabaseError> {
        let mut conn = self.conn()?;

        conn.transaction::<_, DatabaseError, _>(|conn| {
            let live_refs: Vec<String> = media_items::table
                .filter(media_items::day_key.eq(day_key))
                .filter(media_items::hidden.eq(false))
                .filter(media_items::cluster_ref.is_not_null())
                .select(media_items::cluster_ref.assume_not_null())
                .distinct()
                .load(conn)?;

            let deleted = diesel::delete(
                clusters::table
                    .filter(clusters::day_key.eq(day_key))
                    .filter(clusters::id.ne_all(&live_refs)),
            )
            .execute(conn)?;

            Ok(deleted)
        })
    }
}
