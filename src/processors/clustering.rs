//! DBSCAN clustering of wheel points.
//!
//! This module implements a parallelized DBSCAN over 2D (position, height)
//! points using:
//! - `kiddo` KD-tree for O(log n) neighbor queries
//! - `rayon` for parallel neighbor finding and core point identification
//! - Atomic union-find for lock-free cluster merging
//!
//! # Example
//!
//! ```no_run
//! use axle_detect::processors::clustering::dbscan;
//!
//! let points = vec![[0.0, 0.0], [0.1, 0.0], [5.0, 0.0]];
//! let labels = dbscan(&points, 0.2, 2);
//! assert_eq!(labels, vec![0, 0, -1]);
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use kiddo::{ImmutableKdTree, SquaredEuclidean};
use rayon::prelude::*;

use crate::config::DetectionConfig;
use crate::core::types::{Silhouette, WheelPointSet, NOISE_LABEL};

/// Atomic Union-Find data structure for lock-free parallel cluster merging.
///
/// Uses path compression with atomic compare-and-swap operations to safely
/// merge clusters from multiple threads without locks.
pub struct AtomicUnionFind {
    parent: Vec<AtomicUsize>,
}

impl AtomicUnionFind {
    /// Create a new union-find structure where each element is its own parent.
    #[inline]
    pub fn new(size: usize) -> Self {
        let parent = (0..size).map(AtomicUsize::new).collect();
        Self { parent }
    }

    /// Find the root of the set containing `x` with path compression.
    ///
    /// Relaxed ordering is enough: union-find only needs eventual
    /// consistency and always converges to the correct root.
    #[inline]
    pub fn find(&self, mut x: usize) -> usize {
        loop {
            let p = self.parent[x].load(Ordering::Relaxed);
            if p == x {
                return x;
            }
            let gp = self.parent[p].load(Ordering::Relaxed);
            if gp != p {
                // Failing here only skips one compression step
                let _ = self.parent[x].compare_exchange_weak(
                    p,
                    gp,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                );
            }
            x = p;
        }
    }

    /// Union the sets containing `x` and `y`.
    ///
    /// Returns true if a merge actually occurred, false if they were already
    /// in the same set.
    #[inline]
    pub fn union(&self, x: usize, y: usize) -> bool {
        loop {
            let root_x = self.find(x);
            let root_y = self.find(y);

            if root_x == root_y {
                return false;
            }

            // Smaller root points to the larger one
            let (small, large) = if root_x < root_y {
                (root_x, root_y)
            } else {
                (root_y, root_x)
            };

            match self.parent[small].compare_exchange_weak(
                small,
                large,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(_) => continue,
            }
        }
    }
}

/// Density-based clustering (DBSCAN).
///
/// Two points are neighbors when their Euclidean distance is at most `eps`.
/// A core point has at least `min_samples` neighbors, itself included.
/// Clusters are the connected components of core points; a non-core point
/// joins the cluster of its lowest-index core neighbor, or is noise (-1).
///
/// # Algorithm (Parallelized)
///
/// 1. **Build KD-tree**: O(n log n) construction using kiddo
/// 2. **Parallel neighbor finding**: query neighbors within `eps`
/// 3. **Parallel core point identification**
/// 4. **Lock-free cluster formation**: union every core point with its core neighbors
/// 5. **Label assignment**: cluster IDs follow the index of each cluster's
///    first core point, so labels are stable for identical input
///
/// # Returns
///
/// Vector of cluster labels, one per point (-1 for noise points).
pub fn dbscan(points: &[[f64; 2]], eps: f64, min_samples: usize) -> Vec<i32> {
    let n = points.len();
    if n == 0 {
        return Vec::new();
    }

    let tree: ImmutableKdTree<f64, 2> = ImmutableKdTree::new_from_slice(points);

    let eps_sq = eps * eps;
    // Query slightly wide, then apply the inclusive bound exactly
    let query_sq = eps_sq * (1.0 + 1e-9) + f64::EPSILON;

    let neighbors: Vec<Vec<usize>> = points
        .par_iter()
        .map(|point| {
            let mut found: Vec<usize> = tree
                .within::<SquaredEuclidean>(point, query_sq)
                .iter()
                .filter(|nn| nn.distance <= eps_sq)
                .map(|nn| nn.item as usize)
                .collect();
            found.sort_unstable();
            found
        })
        .collect();

    let is_core: Vec<bool> = neighbors
        .par_iter()
        .map(|neigh| neigh.len() >= min_samples)
        .collect();

    let uf = AtomicUnionFind::new(n);

    (0..n).into_par_iter().for_each(|i| {
        if is_core[i] {
            for &j in &neighbors[i] {
                if is_core[j] {
                    uf.union(i, j);
                }
            }
        }
    });

    let mut root_to_cluster: HashMap<usize, i32> = HashMap::new();
    let mut next_cluster_id: i32 = 0;

    for i in 0..n {
        if is_core[i] {
            let root = uf.find(i);
            root_to_cluster.entry(root).or_insert_with(|| {
                let id = next_cluster_id;
                next_cluster_id += 1;
                id
            });
        }
    }

    let mut labels = vec![NOISE_LABEL; n];

    for i in 0..n {
        if is_core[i] {
            labels[i] = root_to_cluster[&uf.find(i)];
        } else if let Some(&j) = neighbors[i].iter().find(|&&j| is_core[j]) {
            // Border point
            labels[i] = root_to_cluster[&uf.find(j)];
        }
    }

    labels
}

/// Cluster wheel points with the configured epsilon and minimum samples.
pub fn cluster_wheel_points(points: &WheelPointSet, config: &DetectionConfig) -> Vec<i32> {
    let labels = dbscan(
        &points.to_points(),
        config.dbscan_epsilon,
        config.dbscan_min_samples,
    );

    let clusters = labels.iter().filter(|&&l| l >= 0).max().map_or(0, |&l| l + 1);
    let noise = labels.iter().filter(|&&l| l == NOISE_LABEL).count();
    log::debug!(
        "dbscan(eps={}, min_samples={}): {} clusters, {} noise points",
        config.dbscan_epsilon,
        config.dbscan_min_samples,
        clusters,
        noise
    );

    labels
}

/// Split wheel points by cluster label, dropping noise.
///
/// Each cluster keeps the increasing position order of its input.
pub fn clusters_by_label(points: &WheelPointSet, labels: &[i32]) -> BTreeMap<i32, Silhouette> {
    debug_assert_eq!(points.len(), labels.len());

    let mut grouped: BTreeMap<i32, Vec<[f64; 2]>> = BTreeMap::new();
    for (i, &label) in labels.iter().enumerate() {
        if label != NOISE_LABEL {
            grouped.entry(label).or_default().push(points.point(i));
        }
    }

    grouped
        .into_iter()
        .filter_map(|(label, pts)| {
            // Subsequences of a strictly increasing silhouette stay valid
            Silhouette::from_points(&pts).ok().map(|s| (label, s))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn partition(labels: &[i32]) -> HashSet<Vec<usize>> {
        let mut groups: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
        for (i, &l) in labels.iter().enumerate() {
            groups.entry(l).or_default().push(i);
        }
        groups.into_values().collect()
    }

    #[test]
    fn test_atomic_union_find_basic() {
        let uf = AtomicUnionFind::new(5);

        assert_eq!(uf.find(0), 0);
        assert_eq!(uf.find(4), 4);

        assert!(uf.union(0, 1));
        assert_eq!(uf.find(0), uf.find(1));

        assert!(uf.union(2, 3));
        assert_ne!(uf.find(0), uf.find(2));

        assert!(uf.union(1, 2));
        assert_eq!(uf.find(0), uf.find(3));

        assert!(!uf.union(0, 3));
    }

    #[test]
    fn test_dbscan_two_wheels() {
        let points = vec![
            [1.00, 0.00],
            [1.10, 0.01],
            [1.20, 0.03],
            [4.00, 0.02],
            [4.10, 0.00],
            [4.20, 0.05],
        ];

        let labels = dbscan(&points, 0.2, 2);

        assert_eq!(labels, vec![0, 0, 0, 1, 1, 1]);
    }

    #[test]
    fn test_dbscan_noise_points() {
        let points = vec![[0.0, 0.0], [0.1, 0.0], [0.2, 0.0], [3.0, 0.0]];

        let labels = dbscan(&points, 0.15, 3);

        assert!(labels[0] >= 0);
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[0], labels[2]);
        assert_eq!(labels[3], NOISE_LABEL);
    }

    #[test]
    fn test_dbscan_border_point() {
        // 0.3 has only two neighbors (0.2 and itself): border, not core
        let points = vec![[0.0, 0.0], [0.1, 0.0], [0.2, 0.0], [0.3, 0.0]];

        let labels = dbscan(&points, 0.15, 3);

        assert_eq!(labels, vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_dbscan_eps_is_inclusive() {
        let points = vec![[0.0, 0.0], [0.5, 0.0]];
        assert_eq!(dbscan(&points, 0.5, 2), vec![0, 0]);
        assert_eq!(dbscan(&points, 0.49, 2), vec![NOISE_LABEL, NOISE_LABEL]);
    }

    #[test]
    fn test_dbscan_empty_and_single() {
        assert!(dbscan(&[], 0.2, 2).is_empty());
        assert_eq!(dbscan(&[[0.0, 0.0]], 0.2, 2), vec![NOISE_LABEL]);
        assert_eq!(dbscan(&[[0.0, 0.0]], 0.2, 1), vec![0]);
    }

    #[test]
    fn test_dbscan_deterministic() {
        let points: Vec<[f64; 2]> = (0..300)
            .map(|i| {
                let x = (i as f64) * 0.07 + if i % 40 < 20 { 0.0 } else { 3.0 };
                [x, ((i * 13) % 5) as f64 * 0.01]
            })
            .collect();

        let first = dbscan(&points, 0.1, 2);
        for _ in 0..5 {
            let again = dbscan(&points, 0.1, 2);
            assert_eq!(partition(&again), partition(&first));
            assert_eq!(again, first);
        }
    }

    #[test]
    fn test_clusters_by_label_skips_noise() {
        let points =
            Silhouette::from_points(&[[0.0, 0.0], [0.1, 0.0], [2.0, 0.0], [4.0, 0.0], [4.1, 0.0]])
                .unwrap();
        let labels = vec![0, 0, NOISE_LABEL, 1, 1];

        let clusters = clusters_by_label(&points, &labels);

        assert_eq!(clusters.len(), 2);
        assert!(!clusters.contains_key(&NOISE_LABEL));
        assert_eq!(clusters[&1].positions(), &[4.0, 4.1]);
    }
}
