use crate::core::clustering::{cluster_day, ClusterDraft, ClusterError, ClusterParams};
use crate::core::labeling::majority_label;
use crate::core::merge::{estimate_radius, merge_nearby, DEFAULT_MAX_MERGE_DISTANCE_M};
use crate::database::models::{MediaItem, NewMediaItem};
use crate::database::repositories::{
    ClusterRepository, DayGroupRepository, IndexStateRepository, MediaItemRepository,
};
use crate::database::{DatabaseError, DbPool};
use crate::services::consistency::DirtyDayQueue;
use crate::services::geocode::GeocodeService;
use crate::traits::{DeleteOutcome, MediaSource, ReverseGeocoder, SourceError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

const STATE_IDLE: u8 = 0;
const STATE_SCANNING: u8 = 1;
const STATE_BACKGROUND: u8 = 2;
const STATE_INCREMENTAL: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Scanning,
    BackgroundContinuing,
    IncrementalScanning,
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("a scan is already running")]
    ScanAlreadyInProgress,

    #[error("media source error: {0}")]
    Source(#[from] SourceError),

    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("clustering error: {0}")]
    Clustering(#[from] ClusterError),
}

#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Items fetched and stored per batch.
    pub batch_size: usize,
    /// Density threshold handed to the clustering pass.
    pub min_points: usize,
    /// Clusters with centroids inside this distance are combined.
    pub max_merge_distance_m: f64,
    /// Upper bound on ids per device deletion call.
    pub delete_chunk_size: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            batch_size: 400,
            min_points: 2,
            max_merge_distance_m: DEFAULT_MAX_MERGE_DISTANCE_M,
            delete_chunk_size: 200,
        }
    }
}

/// Everything a caller can observe about a running scan.
#[derive(Debug, Clone, Serialize)]
pub enum IndexEvent {
    /// Percent never decreases within one scan.
    Progress { percent: u8, message: String },
    /// The synchronous first batch is stored and clustered; the library is
    /// already browsable while the rest continues in the background.
    FirstBatchReady {
        items_indexed: usize,
        days_processed: usize,
    },
    Completed { summary: ScanSummary },
    Failed { reason: String },
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct FirstBatchSummary {
    pub items_indexed: usize,
    pub days_processed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSummary {
    pub items_indexed: usize,
    pub days_processed: usize,
    pub batches_completed: usize,
}

/// How one day's items become clusters. The shipped implementation recomputes
/// the whole day from scratch; an incremental variant can replace it without
/// touching the orchestrator.
pub trait ReclusterStrategy: Send + Sync {
    fn recluster_day(
        &self,
        items: &[MediaItem],
        day_key: &str,
        config: &IndexerConfig,
    ) -> Result<Vec<ClusterDraft>, ClusterError>;
}

/// Recompute-wholesale strategy: estimate a radius from the day's own
/// spacing, density-cluster, then merge near-identical clusters.
pub struct WholesaleRecluster;

impl ReclusterStrategy for WholesaleRecluster {
    fn recluster_day(
        &self,
        items: &[MediaItem],
        day_key: &str,
        config: &IndexerConfig,
    ) -> Result<Vec<ClusterDraft>, ClusterError> {
        let radius_m = estimate_radius(items);
        let params = ClusterParams::new(radius_m, config.min_points)?;
        let drafts = cluster_day(items, day_key, &params);
        Ok(merge_nearby(drafts, items, config.max_merge_distance_m))
    }
}

struct ScanPlan {
    started_at_ms: i64,
    batch_count: usize,
    first_batch: FirstBatchSummary,
}

/// Orchestrates scans of the media source into day albums.
///
/// One scan at a time: full and incremental scans share a single in-flight
/// flag and overlapping calls fail fast instead of queuing. There is no
/// cancellation; a started scan runs to completion or failure.
pub struct IndexManager {
    source: Arc<dyn MediaSource>,
    items: MediaItemRepository,
    clusters: ClusterRepository,
    day_groups: DayGroupRepository,
    state_repo: IndexStateRepository,
    geocode: GeocodeService,
    strategy: Arc<dyn ReclusterStrategy>,
    config: IndexerConfig,
    dirty_days: Arc<DirtyDayQueue>,
    state: AtomicU8,
    last_percent: AtomicU8,
    events: Option<mpsc::UnboundedSender<IndexEvent>>,
}

impl IndexManager {
    pub fn new(
        source: Arc<dyn MediaSource>,
        geocoder: Arc<dyn ReverseGeocoder>,
        pool: DbPool,
        config: IndexerConfig,
    ) -> Self {
        Self {
            source,
            items: MediaItemRepository::new(pool.clone()),
            clusters: ClusterRepository::new(pool.clone()),
            day_groups: DayGroupRepository::new(pool.clone()),
            state_repo: IndexStateRepository::new(pool.clone()),
            geocode: GeocodeService::new(geocoder, pool),
            strategy: Arc::new(WholesaleRecluster),
            config,
            dirty_days: Arc::new(DirtyDayQueue::new()),
            state: AtomicU8::new(STATE_IDLE),
            last_percent: AtomicU8::new(0),
            events: None,
        }
    }

    pub fn with_event_sender(mut self, sender: mpsc::UnboundedSender<IndexEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn ReclusterStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn scan_state(&self) -> ScanState {
        match self.state.load(Ordering::SeqCst) {
            STATE_SCANNING => ScanState::Scanning,
            STATE_BACKGROUND => ScanState::BackgroundContinuing,
            STATE_INCREMENTAL => ScanState::IncrementalScanning,
            _ => ScanState::Idle,
        }
    }

    /// Queue shared with the consistency subsystem; hide and delete push the
    /// affected days here instead of re-clustering eagerly.
    pub fn dirty_days(&self) -> Arc<DirtyDayQueue> {
        Arc::clone(&self.dirty_days)
    }

    /// Run a full scan of the media source.
    ///
    /// The first batch is fetched, stored, and clustered before this returns,
    /// so the caller has a browsable partial library immediately. The
    /// remaining batches continue as a spawned background task that reports
    /// through the event channel and finishes with `Completed` or `Failed`.
    pub async fn start_full_scan(self: &Arc<Self>) -> Result<FirstBatchSummary, IndexError> {
        self.try_transition(STATE_IDLE, STATE_SCANNING)?;
        self.last_percent.store(0, Ordering::SeqCst);

        match self.run_first_batch().await {
            Ok(plan) => {
                let first_batch = plan.first_batch;
                self.state.store(STATE_BACKGROUND, Ordering::SeqCst);

                let manager = Arc::clone(self);
                tokio::spawn(async move {
                    manager.continue_in_background(plan).await;
                });

                Ok(first_batch)
            }
            Err(e) => {
                self.emit(IndexEvent::Failed {
                    reason: e.to_string(),
                });
                self.state.store(STATE_IDLE, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    async fn run_first_batch(&self) -> Result<ScanPlan, IndexError> {
        let started_at_ms = Utc::now().timestamp_millis();

        // Drop stale geometry before fresh rows land, so the background
        // continuation never mixes old and new clusters.
        self.items.clear_cluster_refs()?;
        self.clusters.delete_all()?;
        self.day_groups.delete_all()?;

        let total_items = self.source.count().await?;
        let batch_count = (total_items as usize).div_ceil(self.batch_size()).max(1);

        log::info!(
            "full scan started: {} items in {} batches",
            total_items,
            batch_count
        );
        self.emit_progress(
            0,
            format!("Scanning {} items in {} batches", total_items, batch_count),
        );

        let (items_indexed, days) = self.process_batch(0).await?;
        for day_key in &days {
            self.process_day(day_key).await?;
        }

        let first_batch = FirstBatchSummary {
            items_indexed,
            days_processed: days.len(),
        };
        self.emit(IndexEvent::FirstBatchReady {
            items_indexed,
            days_processed: days.len(),
        });
        self.emit_progress(
            percent_of(1, batch_count + 1),
            format!("Processed batch 1 of {}", batch_count),
        );

        Ok(ScanPlan {
            started_at_ms,
            batch_count,
            first_batch,
        })
    }

    async fn continue_in_background(self: Arc<Self>, plan: ScanPlan) {
        match self.run_remaining_batches(&plan).await {
            Ok(summary) => {
                if let Err(e) = self.persist_scan_bookkeeping(plan.started_at_ms, &summary) {
                    log::warn!("failed to persist scan bookkeeping: {}", e);
                }
                self.emit_progress(100, "Scan complete".to_string());
                self.emit(IndexEvent::Completed { summary });
            }
            Err(e) => {
                log::warn!("background continuation failed: {}", e);
                self.emit(IndexEvent::Failed {
                    reason: e.to_string(),
                });
            }
        }
        self.state.store(STATE_IDLE, Ordering::SeqCst);
    }

    async fn run_remaining_batches(&self, plan: &ScanPlan) -> Result<ScanSummary, IndexError> {
        let mut items_indexed = plan.first_batch.items_indexed;

        for batch_idx in 1..plan.batch_count {
            let (stored, days) = self.process_batch(batch_idx).await?;
            items_indexed += stored;
            for day_key in &days {
                self.process_day(day_key).await?;
            }
            self.emit_progress(
                percent_of(batch_idx + 1, plan.batch_count + 1),
                format!("Processed batch {} of {}", batch_idx + 1, plan.batch_count),
            );
        }

        // Final pass: every known day re-clustered over the complete set.
        let all_days = self.items.distinct_day_keys()?;
        self.emit_progress(
            percent_of(plan.batch_count, plan.batch_count + 1),
            format!("Rebuilding albums for {} days", all_days.len()),
        );
        for day_key in &all_days {
            self.process_day(day_key).await?;
        }

        Ok(ScanSummary {
            items_indexed,
            days_processed: all_days.len(),
            batches_completed: plan.batch_count,
        })
    }

    fn batch_size(&self) -> usize {
        self.config.batch_size.max(1)
    }

    /// Fetch one batch, store it, and report which days it touched.
    async fn process_batch(
        &self,
        batch_idx: usize,
    ) -> Result<(usize, BTreeSet<String>), IndexError> {
        let offset = (batch_idx * self.batch_size()) as u64;
        let records = self
            .source
            .fetch_batch(offset, self.batch_size() as u64)
            .await?;

        let rows: Vec<NewMediaItem> = records.iter().map(NewMediaItem::from_record).collect();
        self.items.upsert_batch(&rows)?;

        let days: BTreeSet<String> = rows.iter().map(|r| r.day_key.clone()).collect();
        Ok((rows.len(), days))
    }

    /// Re-label and re-cluster one day over its full accumulated item set,
    /// superseding whatever geometry that day had.
    async fn process_day(&self, day_key: &str) -> Result<usize, IndexError> {
        let items = self.items.find_visible_by_day(day_key)?;
        if items.is_empty() {
            self.clusters.replace_day(day_key, &[], None)?;
            return Ok(0);
        }

        let mut drafts = self.strategy.recluster_day(&items, day_key, &self.config)?;

        // Density clusters get a geocoded place label; the trailing bucket
        // keeps its sentinel.
        for draft in &mut drafts {
            if draft.label.is_none() {
                if let Some(centroid) = draft.centroid {
                    draft.label = Some(self.geocode.label_for(centroid).await?);
                }
            }
        }

        let mut labels = Vec::with_capacity(items.len());
        for item in &items {
            match item.coordinate() {
                Some(coordinate) => labels.push(Some(self.geocode.label_for(coordinate).await?)),
                None => labels.push(None),
            }
        }
        let majority = majority_label(labels);

        self.clusters
            .replace_day(day_key, &drafts, majority.as_deref())?;
        Ok(items.len())
    }

    /// Fetch and index only items modified since the last completed scan.
    ///
    /// Best-effort: an unavailable source logs and returns `None` instead of
    /// failing. The watermark advances only when the scan finishes cleanly.
    pub async fn incremental_scan(&self) -> Result<Option<ScanSummary>, IndexError> {
        self.try_transition(STATE_IDLE, STATE_INCREMENTAL)?;
        let result = self.run_incremental().await;
        self.state.store(STATE_IDLE, Ordering::SeqCst);
        result
    }

    async fn run_incremental(&self) -> Result<Option<ScanSummary>, IndexError> {
        let started_at_ms = Utc::now().timestamp_millis();
        let since = self.state_repo.last_scan_time()?.unwrap_or(0);

        let records = match self.source.fetch_modified_since(since).await {
            Ok(records) => records,
            Err(e) => {
                log::warn!("incremental scan skipped: {}", e);
                return Ok(None);
            }
        };

        let rows: Vec<NewMediaItem> = records.iter().map(NewMediaItem::from_record).collect();
        self.items.upsert_batch(&rows)?;

        // New items union with the day's existing members through the store;
        // each affected day reruns the full pipeline.
        let days: BTreeSet<String> = rows.iter().map(|r| r.day_key.clone()).collect();
        for day_key in &days {
            self.process_day(day_key).await?;
        }

        self.state_repo.set_last_scan_time(started_at_ms)?;
        log::info!(
            "incremental scan finished: {} items across {} days",
            rows.len(),
            days.len()
        );

        Ok(Some(ScanSummary {
            items_indexed: rows.len(),
            days_processed: days.len(),
            batches_completed: 1,
        }))
    }

    /// Delete items from the device, in chunks the source can handle.
    ///
    /// Partial failure is part of the contract: failed ids stay on the device
    /// and in the index, and the caller may retry them. Succeeded ids leave
    /// the index immediately and their days go on the dirty queue.
    pub async fn remove_items(&self, ids: &[String]) -> Result<DeleteOutcome, IndexError> {
        let mut outcome = DeleteOutcome::default();

        for chunk in ids.chunks(self.config.delete_chunk_size.max(1)) {
            match self.source.delete_items(chunk).await {
                Ok(partial) => outcome.absorb(partial),
                Err(e) => {
                    log::warn!("device deletion failed for {} items: {}", chunk.len(), e);
                    outcome.failed_ids.extend(chunk.iter().cloned());
                }
            }
        }

        if !outcome.deleted_ids.is_empty() {
            let removed = self.items.find_by_ids(&outcome.deleted_ids)?;
            self.items.delete_by_ids(&outcome.deleted_ids)?;
            let days: BTreeSet<&str> = removed.iter().map(|i| i.day_key.as_str()).collect();
            for day_key in days {
                self.dirty_days.mark(day_key);
            }
        }

        Ok(outcome)
    }

    /// Soft-delete toggle. Counts for the item's day go stale until the
    /// dirty queue drains or the next scan; nothing re-clusters here.
    pub fn hide_item(&self, id: &str, hidden: bool) -> Result<bool, IndexError> {
        let Some(item) = self.items.find_by_id(id)? else {
            return Ok(false);
        };

        self.items.set_hidden(id, hidden)?;
        self.dirty_days.mark(&item.day_key);
        Ok(true)
    }

    pub fn last_scan_summary(&self) -> Result<Option<ScanSummary>, IndexError> {
        match self.state_repo.last_scan_summary_json()? {
            Some(json) => {
                let summary = serde_json::from_str(&json).map_err(DatabaseError::Serialization)?;
                Ok(Some(summary))
            }
            None => Ok(None),
        }
    }

    fn persist_scan_bookkeeping(
        &self,
        started_at_ms: i64,
        summary: &ScanSummary,
    ) -> Result<(), DatabaseError> {
        self.state_repo.set_last_scan_time(started_at_ms)?;
        let json = serde_json::to_string(summary)?;
        self.state_repo.set_last_scan_summary_json(&json)
    }

    fn try_transition(&self, from: u8, to: u8) -> Result<(), IndexError> {
        self.state
            .compare_exchange(from, to, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| IndexError::ScanAlreadyInProgress)
    }

    fn emit_progress(&self, percent: u8, message: String) {
        // Progress never moves backwards, even when phases overlap.
        let previous = self.last_percent.fetch_max(percent, Ordering::AcqRel);
        self.emit(IndexEvent::Progress {
            percent: previous.max(percent),
            message,
        });
    }

    fn emit(&self, event: IndexEvent) {
        if let Some(sender) = &self.events {
            let _ = sender.send(event);
        }
    }
}

fn percent_of(done: usize, total: usize) -> u8 {
    ((done * 100) / total.max(1)).min(100) as u8
}
