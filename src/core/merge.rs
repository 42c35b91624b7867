use crate::core::clustering::{centroid_of, ClusterDraft};
use crate::core::geo::Coordinate;
use crate::database::models::MediaItem;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Clusters whose centroids sit within this distance are combined.
pub const DEFAULT_MAX_MERGE_DISTANCE_M: f64 = 500.0;

/// Radius used when there are too few geotagged items to estimate one.
pub const DEFAULT_RADIUS_M: f64 = 300.0;

pub const MIN_RADIUS_M: f64 = 100.0;
pub const MAX_RADIUS_M: f64 = 1000.0;

/// Combine clusters whose centroids lie within `max_merge_distance_m` of each
/// other. Clusters carrying the no-location sentinel never participate.
///
/// Each merge restarts the pair scan from scratch; per-day cluster counts are
/// small enough that the cubic worst case does not matter. The surviving
/// cluster's centroid is recomputed as the mean over the union's geotagged
/// members, not a weighted blend of the two prior centroids.
pub fn merge_nearby(
    mut clusters: Vec<ClusterDraft>,
    items: &[MediaItem],
    max_merge_distance_m: f64,
) -> Vec<ClusterDraft> {
    let coord_by_id: HashMap<&str, Coordinate> = items
        .iter()
        .filter_map(|item| item.coordinate().map(|c| (item.id.as_str(), c)))
        .collect();

    while let Some((keep, absorb)) = find_merge_pair(&clusters, max_merge_distance_m) {
        let absorbed = clusters.remove(absorb);
        let target = &mut clusters[keep];
        target.member_ids.extend(absorbed.member_ids);
        target.centroid = centroid_of(
            target
                .member_ids
                .iter()
                .filter_map(|id| coord_by_id.get(id.as_str()).copied()),
        );
    }

    clusters.sort_by(|a, b| b.member_count().cmp(&a.member_count()));
    clusters
}

fn find_merge_pair(clusters: &[ClusterDraft], max_merge_distance_m: f64) -> Option<(usize, usize)> {
    for i in 0..clusters.len() {
        let Some(ci) = clusters[i].centroid else {
            continue;
        };
        for j in (i + 1)..clusters.len() {
            let Some(cj) = clusters[j].centroid else {
                continue;
            };
            if ci.distance_to(&cj) <= max_merge_distance_m {
                return Some((i, j));
            }
        }
    }
    None
}

/// Pick a clustering radius from the distribution of pairwise distances.
///
/// The lower half of the sorted distances biases the estimate toward the
/// typical tight-cluster spacing instead of letting a few far-apart outliers
/// stretch it. The result is clamped to [100, 1000] meters.
pub fn estimate_radius(items: &[MediaItem]) -> f64 {
    let coords: Vec<Coordinate> = items.iter().filter_map(|item| item.coordinate()).collect();
    if coords.len() < 2 {
        return DEFAULT_RADIUS_M;
    }

    let mut distances = Vec::with_capacity(coords.len() * (coords.len() - 1) / 2);
    for i in 0..coords.len() {
        for j in (i + 1)..coords.len() {
            distances.push(coords[i].distance_to(&coords[j]));
        }
    }
    distances.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    // A single pair has an empty lower half; fall back to its one distance.
    let lower = if distances.len() == 1 {
        &distances[..]
    } else {
        &distances[..distances.len() / 2]
    };

    median(lower).clamp(MIN_RADIUS_M, MAX_RADIUS_M)
}

fn median(sorted: &[f64]) -> f64 {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}
