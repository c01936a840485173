//! Bounding box assembly.
//!
//! Two strategies turn a frame's wheel clusters into boxes:
//! - [`ClusterExtentStrategy`]: square boxes over the raw cluster extent,
//!   anchored at the cluster's left end and highest point
//! - [`DipStrategy`]: boxes over the slope-expanded dip regions, anchored at
//!   the region's left end and lowest point
//!
//! Both skip the noise label; neither emits a box with a non-positive side.

use std::collections::BTreeMap;

use crate::config::{BoxStrategyKind, DipConfig, HeightConvention, PipelineConfig};
use crate::core::types::{BoundingBox, BoxSet, LateralExtent, Result, Silhouette, NOISE_LABEL};

use super::dips::{expand_clusters, ExpandedRegion};
use super::silhouette::VehiclePoints;
use super::spline::{fit_curve, CubicSpline};

/// What a strategy sees of one frame.
pub struct FrameContext<'a> {
    /// Full silhouette of the frame
    pub silhouette: &'a Silhouette,
    /// Spline through the silhouette, when already fitted
    pub curve: Option<&'a CubicSpline>,
    /// Wheel clusters keyed by label, noise excluded
    pub clusters: &'a BTreeMap<i32, Silhouette>,
}

/// Boxes of one frame plus the regions they were built from.
#[derive(Debug, Clone, Default)]
pub struct Assembly {
    pub boxes: BoxSet,
    /// Expanded dip regions; empty for strategies that do not expand
    pub regions: BTreeMap<i32, ExpandedRegion>,
}

/// A way of turning wheel clusters into bounding boxes.
pub trait BoxStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn assemble(&self, frame: &FrameContext<'_>) -> Result<Assembly>;
}

/// Build the strategy selected by the configuration.
pub fn strategy_for(config: &PipelineConfig) -> Box<dyn BoxStrategy> {
    match config.boxes.strategy {
        BoxStrategyKind::ClusterExtent => Box::new(ClusterExtentStrategy),
        BoxStrategyKind::Dips => Box::new(DipStrategy::new(config.dips.clone())),
    }
}

fn insert_box(boxes: &mut BoxSet, label: i32, bbox: BoundingBox) {
    if label == NOISE_LABEL {
        return;
    }
    if bbox.width > 0.0 && bbox.height > 0.0 {
        boxes.insert(label, bbox);
    } else {
        log::warn!(
            "cluster {}: dropping degenerate box (width {:.4}, height {:.4})",
            label,
            bbox.width,
            bbox.height
        );
    }
}

/// Square boxes over the raw cluster extent.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClusterExtentStrategy;

impl ClusterExtentStrategy {
    /// Anchor `(min position, max height)`, side `max position - min position`.
    pub fn cluster_box(cluster: &Silhouette) -> Option<BoundingBox> {
        let positions = cluster.positions();
        let (&min_x, &max_x) = (positions.first()?, positions.last()?);
        let max_y = cluster
            .heights()
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let edge = max_x - min_x;
        Some(BoundingBox::new([min_x, max_y], edge, edge))
    }
}

impl BoxStrategy for ClusterExtentStrategy {
    fn name(&self) -> &'static str {
        "cluster_extent"
    }

    fn assemble(&self, frame: &FrameContext<'_>) -> Result<Assembly> {
        let mut boxes = BoxSet::new();
        for (&label, cluster) in frame.clusters {
            if let Some(bbox) = Self::cluster_box(cluster) {
                insert_box(&mut boxes, label, bbox);
            }
        }
        Ok(Assembly {
            boxes,
            regions: BTreeMap::new(),
        })
    }
}

/// Boxes over slope-expanded dip regions.
#[derive(Debug, Clone, Default)]
pub struct DipStrategy {
    config: DipConfig,
}

impl DipStrategy {
    pub fn new(config: DipConfig) -> Self {
        Self { config }
    }

    /// Box around an expanded region.
    ///
    /// The anchor is the region's left end at its lowest height, and the
    /// width spans the region. The height follows `convention`:
    /// - `TwiceMeanDepth`: `left + right - 2 * bottom`, twice the mean
    ///   depth of the well below its two rims
    /// - `RimSum`: `left + right`, both rim heights measured from zero
    ///
    /// A box whose height comes out non-positive (rims at or below zero
    /// under `RimSum`) is dropped by [`DipStrategy::assemble`] with a warning,
    /// so its cluster has no box.
    pub fn region_box(region: &ExpandedRegion, convention: HeightConvention) -> BoundingBox {
        let [left_x, left_y] = region.left_edge();
        let [_, right_y] = region.right_edge();
        let bottom = region.min_height();

        let height = match convention {
            HeightConvention::TwiceMeanDepth => (left_y - bottom) + (right_y - bottom),
            HeightConvention::RimSum => left_y + right_y,
        };
        BoundingBox::new([left_x, bottom], region.width(), height)
    }
}

impl BoxStrategy for DipStrategy {
    fn name(&self) -> &'static str {
        "dips"
    }

    fn assemble(&self, frame: &FrameContext<'_>) -> Result<Assembly> {
        let fitted;
        let curve = match frame.curve {
            Some(curve) => curve,
            None => {
                fitted = fit_curve(frame.silhouette)?;
                &fitted
            }
        };

        let regions = expand_clusters(frame.clusters, curve, &self.config)?;
        let mut boxes = BoxSet::new();
        for (&label, region) in &regions {
            insert_box(
                &mut boxes,
                label,
                Self::region_box(region, self.config.height_convention),
            );
        }
        Ok(Assembly { boxes, regions })
    }
}

/// Give every box a depth from the vehicle points inside its length range.
///
/// The anchor gains the lowest lateral coordinate of those points. A box
/// with no vehicle point in range gets depth 0 at the lateral midpoint.
pub fn apply_depth(boxes: &mut BoxSet, vehicle: &VehiclePoints) {
    for bbox in boxes.values_mut() {
        let lateral = match vehicle.lateral_range(bbox.left(), bbox.right()) {
            Some((min, max)) => LateralExtent {
                min,
                depth: max - min,
            },
            None => LateralExtent {
                min: vehicle.lateral_midpoint,
                depth: 0.0,
            },
        };
        bbox.lateral = Some(lateral);
    }
}
