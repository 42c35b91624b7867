use crate::database::models::Cluster;
use crate::database::repositories::{ClusterRepository, DayGroupRepository, MediaItemRepository};
use crate::database::{DatabaseError, DbPool};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Repair never searches below this radius, whatever the cluster's own ε
/// was. Independent re-clustering runs drift; the slack absorbs it.
pub const FALLBACK_RADIUS_FLOOR_M: f64 = 1_000.0;

/// Days whose persisted counts may be stale after a hide or delete. Pushed by
/// interactive operations, drained here on demand; nothing recomputes
/// synchronously on the interactive path.
#[derive(Debug, Default)]
pub struct DirtyDayQueue {
    inner: Mutex<VecDeque<String>>,
}

impl DirtyDayQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self, day_key: &str) {
        let mut queue = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if !queue.iter().any(|d| d == day_key) {
            queue.push_back(day_key.to_string());
        }
    }

    pub fn drain(&self) -> Vec<String> {
        let mut queue = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CountMismatch {
    pub cluster_id: String,
    pub day_key: String,
    pub recorded: i32,
    pub actual: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepairOutcome {
    pub cluster_id: String,
    pub day_key: String,
    pub members_linked: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PruneReport {
    pub clusters_deleted: usize,
    pub day_groups_deleted: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DrainReport {
    pub days_refreshed: Vec<String>,
    pub clusters_deleted: usize,
    pub day_groups_deleted: usize,
}

/// Verify/repair/prune over the persisted item-cluster-day graph. Operates
/// independently of any in-flight scan and never aborts a whole pass because
/// one cluster is bad.
pub struct ConsistencyService {
    items: MediaItemRepository,
    clusters: ClusterRepository,
    day_groups: DayGroupRepository,
}

impl ConsistencyService {
    pub fn new(pool: DbPool) -> Self {
        Self {
            items: MediaItemRepository::new(pool.clone()),
            clusters: ClusterRepository::new(pool.clone()),
            day_groups: DayGroupRepository::new(pool),
        }
    }

    /// Read-only pass: report clusters whose recorded member count disagrees
    /// with the number of non-hidden items actually pointing at them.
    pub fn verify(&self) -> Result<Vec<CountMismatch>, DatabaseError> {
        let mut mismatches = Vec::new();

        for cluster in self.clusters.find_all()? {
            let actual = self.items.count_visible_by_cluster(&cluster.id)?;
            if actual != cluster.member_count as i64 {
                mismatches.push(CountMismatch {
                    cluster_id: cluster.id,
                    day_key: cluster.day_key,
                    recorded: cluster.member_count,
                    actual,
                });
            }
        }

        Ok(mismatches)
    }

    /// Re-derive every cluster's membership from geometry and rewrite the
    /// stored counts. Safe to run repeatedly; a failing cluster is recorded
    /// in its outcome and the pass moves on.
    pub fn repair(&self) -> Result<Vec<RepairOutcome>, DatabaseError> {
        let mut outcomes = Vec::new();

        for cluster in self.clusters.find_all()? {
            let outcome = match self.repair_cluster(&cluster) {
                Ok(members_linked) => RepairOutcome {
                    cluster_id: cluster.id,
                    day_key: cluster.day_key,
                    members_linked,
                    error: None,
                },
                Err(e) => {
                    log::warn!("repair failed for cluster {}: {}", cluster.id, e);
                    RepairOutcome {
                        cluster_id: cluster.id,
                        day_key: cluster.day_key,
                        members_linked: 0,
                        error: Some(e.to_string()),
                    }
                }
            };
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }

    fn repair_cluster(&self, cluster: &Cluster) -> Result<usize, DatabaseError> {
        let Some(centroid) = cluster.centroid() else {
            // Sentinel-centroid clusters have no geometry to re-derive from;
            // just bring the recorded count back in line with reality.
            let actual = self.items.count_visible_by_cluster(&cluster.id)?;
            if actual != cluster.member_count as i64 {
                self.clusters.update_member_count(&cluster.id, actual as i32)?;
            }
            return Ok(actual as usize);
        };

        let search_radius = (2.0 * cluster.radius).max(FALLBACK_RADIUS_FLOOR_M);
        let bbox = centroid.bounding_box(search_radius);
        let candidates = self.items.find_visible_in_bbox(&cluster.day_key, &bbox)?;

        let member_ids: Vec<String> = candidates
            .into_iter()
            .filter(|item| {
                item.coordinate()
                    .map(|c| centroid.distance_to(&c) <= search_radius)
                    .unwrap_or(false)
            })
            .map(|item| item.id)
            .collect();

        self.items.set_cluster_refs(&member_ids, &cluster.id)?;
        self.clusters
            .update_member_count(&cluster.id, member_ids.len() as i32)?;

        Ok(member_ids.len())
    }

    /// Delete clusters with zero non-hidden members, then day groups with no
    /// clusters left. Running it twice in a row deletes nothing the second
    /// time.
    pub fn prune_empty(&self) -> Result<PruneReport, DatabaseError> {
        let clusters_deleted = self.clusters.delete_empty()?;
        let day_groups_deleted = self.day_groups.delete_childless()?;

        if clusters_deleted > 0 || day_groups_deleted > 0 {
            log::info!(
                "pruned {} empty clusters, {} empty day groups",
                clusters_deleted,
                day_groups_deleted
            );
        }

        Ok(PruneReport {
            clusters_deleted,
            day_groups_deleted,
        })
    }

    /// Refresh exactly the days queued by hide/delete: recount each cluster,
    /// drop the ones that emptied out, and rebuild the day rollups.
    pub fn drain_dirty(&self, queue: &DirtyDayQueue) -> Result<DrainReport, DatabaseError> {
        let days = queue.drain();
        let mut report = DrainReport::default();

        for day_key in days {
            for cluster in self.clusters.find_by_day(&day_key)? {
                let actual = self.items.count_visible_by_cluster(&cluster.id)?;
                if actual != cluster.member_count as i64 {
                    self.clusters.update_member_count(&cluster.id, actual as i32)?;
                }
            }

            report.clusters_deleted += self.clusters.delete_empty_for_day(&day_key)?;

            let had_group = self.day_groups.find_by_key(&day_key)?.is_some();
            self.day_groups.refresh_rollup(&day_key)?;
            if had_group && self.day_groups.find_by_key(&day_key)?.is_none() {
                report.day_groups_deleted += 1;
            }

            report.days_refreshed.push(day_key);
        }

        Ok(report)
    }
}
