use super::Repository;
use crate::core::geo::BoundingBox;
use crate::database::models::{MediaItem, NewMediaItem};
use crate::database::{DatabaseError, DbPool};
use crate::schema::media_items;
use chrono::Utc;
use diesel::prelude::*;

pub struct MediaItemRepository {
    pool: DbPool,
}

impl Repository for MediaItemRepository {
    fn pool(&self) -> &DbPool {
        &self.pool
    }
}

impl MediaItemRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert or refresh one batch of items as a single transaction.
    ///
    /// Re-discovered items keep their organizational overlay: the capture
    /// fields are overwritten, cluster_ref and hidden are left alone.
    pub fn upsert_batch(&self, rows: &[NewMediaItem]) -> Result<usize, DatabaseError> {
        let mut conn = self.conn()?;
        let now = Utc::now().to_rfc3339();

        conn.transaction::<_, DatabaseError, _>(|conn| {
            for row in rows {
                diesel::insert_into(media_items::table)
                    .values(row)
                    .on_conflict(media_items::id)
                    .do_update()
                    .set((
                        media_items::kind.eq(&row.kind),
                        media_items::captured_at.eq(row.captured_at),
                        media_items::day_key.eq(&row.day_key),
                        media_items::latitude.eq(row.latitude),
                        media_items::longitude.eq(row.longitude),
                        media_items::size_bytes.eq(row.size_bytes),
                        media_items::width.eq(row.width),
                        media_items::height.eq(row.height),
                        media_items::duration_seconds.eq(row.duration_seconds),
                        media_items::updated_at.eq(&now),
                    ))
                    .execute(conn)?;
            }
            Ok(())
        })?;

        Ok(rows.len())
    }

    pub fn find_by_id(&self, id: &str) -> Result<Option<MediaItem>, DatabaseError> {
        let mut conn = self.conn()?;

        media_items::table
            .filter(media_items::id.eq(id))
            .select(MediaItem::as_select())
            .first(&mut conn)
            .optional()
            .map_err(DatabaseError::Query)
    }

    pub fn find_by_ids(&self, ids: &[String]) -> Result<Vec<MediaItem>, DatabaseError> {
        let mut conn = self.conn()?;

        media_items::table
            .filter(media_items::id.eq_any(ids))
            .select(MediaItem::as_select())
            .load(&mut conn)
            .map_err(DatabaseError::Query)
    }

    /// Non-hidden items of one day in stable capture order. Clustering input
    /// comes from here, so the ordering doubles as the determinism guarantee.
    pub fn find_visible_by_day(&self, day_key: &str) -> Result<Vec<MediaItem>, DatabaseError> {
        let mut conn = self.conn()?;

        media_items::table
            .filter(media_items::day_key.eq(day_key))
            .filter(media_items::hidden.eq(false))
            .order((media_items::captured_at.asc(), media_items::id.asc()))
            .select(MediaItem::as_select())
            .load(&mut conn)
            .map_err(DatabaseError::Query)
    }

    pub fn count_visible_by_day(&self, day_key: &str) -> Result<i64, DatabaseError> {
        let mut conn = self.conn()?;

        media_items::table
            .filter(media_items::day_key.eq(day_key))
            .filter(media_items::hidden.eq(false))
            .count()
            .get_result(&mut conn)
            .map_err(DatabaseError::Query)
    }

    /// An album's contents: the non-hidden members of one cluster.
    pub fn find_visible_by_cluster(&self, cluster_id: &str) -> Result<Vec<MediaItem>, DatabaseError> {
        let mut conn = self.conn()?;

        media_items::table
            .filter(media_items::cluster_ref.eq(cluster_id))
            .filter(media_items::hidden.eq(false))
            .order((media_items::captured_at.asc(), media_items::id.asc()))
            .select(MediaItem::as_select())
            .load(&mut conn)
            .map_err(DatabaseError::Query)
    }

    /// Timeline slice: non-hidden items whose day falls in the inclusive
    /// range of day keys.
    pub fn find_visible_between_days(
        &self,
        start_day: &str,
        end_day: &str,
    ) -> Result<Vec<MediaItem>, DatabaseError> {
        let mut conn = self.conn()?;

        media_items::table
            .filter(media_items::day_key.between(start_day, end_day))
            .filter(media_items::hidden.eq(false))
            .order((media_items::captured_at.asc(), media_items::id.asc()))
            .select(MediaItem::as_select())
            .load(&mut conn)
            .map_err(DatabaseError::Query)
    }

    pub fn count_visible_by_cluster(&self, cluster_id: &str) -> Result<i64, DatabaseError> {
        let mut conn = self.conn()?;

        media_items::table
            .filter(media_items::cluster_ref.eq(cluster_id))
            .filter(media_items::hidden.eq(false))
            .count()
            .get_result(&mut conn)
            .map_err(DatabaseError::Query)
    }

    /// Non-hidden geotagged items of one day inside an axis-aligned box.
    /// Callers follow up with an exact distance check.
    pub fn find_visible_in_bbox(
        &self,
        day_key: &str,
        bbox: &BoundingBox,
    ) -> Result<Vec<MediaItem>, DatabaseError> {
        let mut conn = self.conn()?;

        media_items::table
            .filter(media_items::day_key.eq(day_key))
            .filter(media_items::hidden.eq(false))
            .filter(media_items::latitude.between(bbox.min_latitude, bbox.max_latitude))
            .filter(media_items::longitude.between(bbox.min_longitude, bbox.max_longitude))
            .order((media_items::captured_at.asc(), media_items::id.asc()))
            .select(MediaItem::as_select())
            .load(&mut conn)
            .map_err(DatabaseError::Query)
    }

    /// Detach every item from its cluster. Runs before a full scan so stale
    /// geometry never mixes with fresh results.
    pub fn clear_cluster_refs(&self) -> Result<usize, DatabaseError> {
        let mut conn = self.conn()?;
        let now = Utc::now().to_rfc3339();

        diesel::update(media_items::table.filter(media_items::cluster_ref.is_not_null()))
            .set((
                media_items::cluster_ref.eq(None::<String>),
                media_items::updated_at.eq(now),
            ))
            .execute(&mut conn)
            .map_err(DatabaseError::Query)
    }

    pub fn set_cluster_ref(
        &self,
        id: &str,
        cluster_id: Option<&str>,
    ) -> Result<bool, DatabaseError> {
        let mut conn = self.conn()?;
        let now = Utc::now().to_rfc3339();

        let updated = diesel::update(media_items::table.filter(media_items::id.eq(id)))
            .set((
                media_items::cluster_ref.eq(cluster_id),
                media_items::updated_at.eq(now),
            ))
            .execute(&mut conn)?;

        Ok(updated > 0)
    }

    pub fn set_cluster_refs(
        &self,
        ids: &[String],
        cluster_id: &str,
    ) -> Result<usize, DatabaseError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn()?;
        let now = Utc::now().to_rfc3339();

        diesel::update(media_items::table.filter(media_items::id.eq_any(ids)))
            .set((
                media_items::cluster_ref.eq(cluster_id),
                media_items::updated_at.eq(now),
            ))
            .execute(&mut conn)
            .map_err(DatabaseError::Query)
    }

    pub fn set_hidden(&self, id: &str, hidden: bool) -> Result<bool, DatabaseError> {
        let mut conn = self.conn()?;
        let now = Utc::now().to_rfc3339();

        let updated = diesel::update(media_items::table.filter(media_items::id.eq(id)))
            .set((
                media_items::hidden.eq(hidden),
                media_items::updated_at.eq(now),
            ))
            .execute(&mut conn)?;

        Ok(updated > 0)
    }

    pub fn delete_by_ids(&self, ids: &[String]) -> Result<usize, DatabaseError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn()?;

        diesel::delete(media_items::table.filter(media_items::id.eq_any(ids)))
            .execute(&mut conn)
            .map_err(DatabaseError::Query)
    }

    /// Every day that currently has at least one stored item.
    pub fn distinct_day_keys(&self) -> Result<Vec<String>, DatabaseError> {
        let mut conn = self.conn()?;

        media_items::table
            .select(media_items::day_key)
            .distinct()
            .order(media_items::day_key.asc())
            .load(&mut conn)
            .map_err(DatabaseError::Query)
    }

    pub fn count_all(&self) -> Result<i64, DatabaseError> {
        let mut conn = self.conn()?;

        media_items::table
            .count()
            .get_result(&mut conn)
            .map_err(DatabaseError::Query)
    }
}
