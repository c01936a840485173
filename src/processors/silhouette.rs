//! Lower silhouette extraction.
//!
//! A side-profile scan is reduced to one minimum height per distinct scan
//! position. Ground and baseline points are removed first by the vehicle
//! mask so that the silhouette follows the underside of the vehicle.

use rayon::prelude::*;

use crate::config::{AxesConfig, VehicleMask};
use crate::core::loaders::PointCloud;
use crate::core::types::{DetectionError, Result, Silhouette};

/// Vehicle points that survived the mask, split by semantic axis.
#[derive(Debug, Clone, Default)]
pub struct VehiclePoints {
    pub length: Vec<f64>,
    pub height: Vec<f64>,
    pub lateral: Vec<f64>,
    /// Midpoint of the lateral range of the unmasked cloud
    pub lateral_midpoint: f64,
}

impl VehiclePoints {
    #[inline]
    pub fn len(&self) -> usize {
        self.length.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length.is_empty()
    }

    /// Lateral `(min, max)` of the points with a length coordinate in `[left, right]`.
    pub fn lateral_range(&self, left: f64, right: f64) -> Option<(f64, f64)> {
        self.length
            .iter()
            .zip(&self.lateral)
            .filter(|(x, _)| **x >= left && **x <= right)
            .fold(None, |acc, (_, &z)| match acc {
                None => Some((z, z)),
                Some((lo, hi)) => Some((lo.min(z), hi.max(z))),
            })
    }
}

fn finite_range(values: &[f64]) -> Option<(f64, f64)> {
    values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// Select the vehicle points of a cloud.
///
/// With [`VehicleMask::HalfSpace`] a point is kept when its height is above
/// `height_floor` and its lateral coordinate is above the midpoint of the
/// cloud's lateral range. Points with a non-finite coordinate are dropped.
///
/// # Errors
///
/// Returns [`DetectionError::Input`] when the cloud is empty or no point
/// passes the mask.
pub fn mask_vehicle(cloud: &PointCloud, axes: &AxesConfig) -> Result<VehiclePoints> {
    if cloud.is_empty() {
        return Err(DetectionError::Input("point cloud is empty".to_string()));
    }

    let length = cloud.axis(axes.length_axis);
    let height = cloud.axis(axes.height_axis);
    let lateral = cloud.axis(axes.lateral_axis);

    let (lat_min, lat_max) = finite_range(lateral)
        .ok_or_else(|| DetectionError::Input("no finite lateral coordinates".to_string()))?;
    let lateral_midpoint = (lat_min + lat_max) / 2.0;

    let mut out = VehiclePoints {
        lateral_midpoint,
        ..Default::default()
    };

    for i in 0..cloud.len() {
        let (x, y, z) = (length[i], height[i], lateral[i]);
        if !(x.is_finite() && y.is_finite() && z.is_finite()) {
            continue;
        }
        let keep = match axes.vehicle_mask {
            VehicleMask::HalfSpace => y > axes.height_floor && z > lateral_midpoint,
            VehicleMask::None => true,
        };
        if keep {
            out.length.push(x);
            out.height.push(y);
            out.lateral.push(z);
        }
    }

    if out.is_empty() {
        return Err(DetectionError::Input(format!(
            "no vehicle detected: none of {} points passed the mask",
            cloud.len()
        )));
    }

    log::debug!(
        "vehicle mask kept {}/{} points (lateral midpoint {:.3})",
        out.len(),
        cloud.len(),
        lateral_midpoint
    );

    Ok(out)
}

/// Reduce vehicle points to their lower silhouette.
///
/// Positions are grouped by exact equality, or after rounding to
/// `position_resolution` when one is configured. Each group contributes its
/// minimum height. The output is sorted by position.
pub fn extract_silhouette(points: &VehiclePoints, axes: &AxesConfig) -> Result<Silhouette> {
    if points.is_empty() {
        return Err(DetectionError::Input("no vehicle points".to_string()));
    }

    // Adding 0.0 folds -0.0 into 0.0 so both land in one group
    let snap = |x: f64| match axes.position_resolution {
        Some(r) => (x / r).round() * r + 0.0,
        None => x + 0.0,
    };

    let mut pairs: Vec<(f64, f64)> = points
        .length
        .iter()
        .zip(&points.height)
        .map(|(&x, &y)| (snap(x), y))
        .collect();
    pairs.par_sort_unstable_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));

    let mut positions: Vec<f64> = Vec::new();
    let mut heights: Vec<f64> = Vec::new();
    for (x, y) in pairs {
        match positions.last() {
            // Sorted by height within a group, so the first entry is the minimum
            Some(&last) if last == x => {}
            _ => {
                positions.push(x);
                heights.push(y);
            }
        }
    }

    Silhouette::new(positions, heights)
}

/// Mask a cloud and extract its silhouette in one call.
pub fn lower_bounds(cloud: &PointCloud, axes: &AxesConfig) -> Result<Silhouette> {
    let points = mask_vehicle(cloud, axes)?;
    extract_silhouette(&points, axes)
}
