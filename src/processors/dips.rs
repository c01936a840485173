//! Slope-driven expansion of wheel clusters into wheel-well dips.
//!
//! A wheel cluster only covers the lowest few silhouette points. Each
//! cluster is widened by walking outward along the frame's spline, one
//! fixed step at a time, until the slope has first become steep (the walk
//! is *armed*) and then reversed sign, which marks the crest of the wheel
//! well. The crest point itself is not included.
//!
//! Walking left, the well wall rises towards smaller positions, so the
//! slope is negative while climbing and turns positive past the crest.
//! Walking right the signs are mirrored.

use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::config::DipConfig;
use crate::core::types::{DetectionError, Result, Silhouette};

use super::spline::CubicSpline;

/// Adjacent positions closer than this are collapsed.
pub const DUPLICATE_EPSILON: f64 = 1e-12;

/// Direction of a boundary walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    #[inline]
    fn sign(self) -> f64 {
        match self {
            Direction::Left => -1.0,
            Direction::Right => 1.0,
        }
    }

    /// True when `slope` shows the curve has crested past the well edge.
    #[inline]
    fn is_reversal(self, reference: f64, slope: f64) -> bool {
        match self {
            Direction::Left => reference < 0.0 && slope > 0.0,
            Direction::Right => reference > 0.0 && slope < 0.0,
        }
    }
}

/// Why a boundary walk stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkTermination {
    /// Slope reversed after arming: the well edge was found.
    SlopeReversal,
    /// The next step would leave the spline's domain.
    DomainBoundary,
    /// `max_steps` reached without a reversal.
    MaxSteps,
}

/// Points accepted by one boundary walk, in walk order.
#[derive(Debug, Clone, PartialEq)]
pub struct Walk {
    pub points: Vec<[f64; 2]>,
    pub termination: WalkTermination,
    /// Whether the slope threshold was ever reached
    pub armed: bool,
}

/// Walk from `start` in `direction` until the well edge, the domain end or
/// the step limit.
///
/// While arming, every step is accepted regardless of slope sign. The first
/// step with `|slope| >= slope_threshold` is accepted and arms the walk with
/// that slope's sign as reference. Once armed, a step whose slope reverses
/// the reference (see [`Direction`]) ends the walk without being accepted;
/// any other step is accepted and a non-zero slope becomes the new reference.
pub fn walk(curve: &CubicSpline, start: f64, direction: Direction, config: &DipConfig) -> Walk {
    let step = config.step_size * direction.sign();
    let mut points = Vec::new();
    let mut reference: Option<f64> = None;

    for k in 1..=config.max_steps {
        let x = start + k as f64 * step;
        let (Some(y), Some(slope)) = (curve.value(x), curve.derivative(x)) else {
            return Walk {
                points,
                termination: WalkTermination::DomainBoundary,
                armed: reference.is_some(),
            };
        };

        match reference {
            None => {
                if slope.abs() >= config.slope_threshold {
                    reference = Some(slope.signum());
                }
            }
            Some(sign) => {
                if direction.is_reversal(sign, slope) {
                    return Walk {
                        points,
                        termination: WalkTermination::SlopeReversal,
                        armed: true,
                    };
                }
                if slope != 0.0 {
                    reference = Some(slope.signum());
                }
            }
        }
        points.push([x, y]);
    }

    Walk {
        points,
        termination: WalkTermination::MaxSteps,
        armed: reference.is_some(),
    }
}

/// A wheel cluster widened to its surrounding dip.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedRegion {
    points: Vec<[f64; 2]>,
    pub left: WalkTermination,
    pub right: WalkTermination,
}

impl ExpandedRegion {
    /// Region points, strictly increasing in position.
    #[inline]
    pub fn points(&self) -> &[[f64; 2]] {
        &self.points
    }

    #[inline]
    pub fn left_edge(&self) -> [f64; 2] {
        self.points[0]
    }

    #[inline]
    pub fn right_edge(&self) -> [f64; 2] {
        self.points[self.points.len() - 1]
    }

    pub fn width(&self) -> f64 {
        self.right_edge()[0] - self.left_edge()[0]
    }

    /// Lowest height in the region.
    pub fn min_height(&self) -> f64 {
        self.points
            .iter()
            .map(|p| p[1])
            .fold(f64::INFINITY, f64::min)
    }

    /// True when either walk hit the step limit.
    pub fn truncated(&self) -> bool {
        self.left == WalkTermination::MaxSteps || self.right == WalkTermination::MaxSteps
    }
}

/// Drop points whose position is within [`DUPLICATE_EPSILON`] of the
/// previously kept one.
pub fn dedupe_positions(points: Vec<[f64; 2]>) -> Vec<[f64; 2]> {
    let mut out: Vec<[f64; 2]> = Vec::with_capacity(points.len());
    for p in points {
        match out.last() {
            Some(last) if (p[0] - last[0]).abs() < DUPLICATE_EPSILON => {}
            _ => out.push(p),
        }
    }
    out
}

/// Expand one cluster outward from its first and last position.
///
/// # Errors
///
/// Returns [`DetectionError::InvalidDomain`] for an empty cluster.
pub fn expand_cluster(
    cluster: &Silhouette,
    curve: &CubicSpline,
    config: &DipConfig,
) -> Result<ExpandedRegion> {
    if cluster.is_empty() {
        return Err(DetectionError::InvalidDomain(
            "cannot expand an empty cluster".to_string(),
        ));
    }
    let first = cluster.positions()[0];
    let last = cluster.positions()[cluster.len() - 1];

    let left = walk(curve, first, Direction::Left, config);
    let right = walk(curve, last, Direction::Right, config);

    let mut points = Vec::with_capacity(left.points.len() + cluster.len() + right.points.len());
    points.extend(left.points.iter().rev().copied());
    points.extend(cluster.to_points());
    points.extend(right.points.iter().copied());

    Ok(ExpandedRegion {
        points: dedupe_positions(points),
        left: left.termination,
        right: right.termination,
    })
}

/// Expand every cluster of a frame against the shared spline.
///
/// Clusters are independent and are expanded in parallel.
pub fn expand_clusters(
    clusters: &BTreeMap<i32, Silhouette>,
    curve: &CubicSpline,
    config: &DipConfig,
) -> Result<BTreeMap<i32, ExpandedRegion>> {
    clusters
        .par_iter()
        .map(|(&label, cluster)| -> Result<(i32, ExpandedRegion)> {
            let region = expand_cluster(cluster, curve, config)?;
            if region.truncated() {
                log::warn!(
                    "cluster {}: boundary walk stopped at max_steps={} without a slope reversal \
                     (left={:?}, right={:?})",
                    label,
                    config.max_steps,
                    region.left,
                    region.right
                );
            }
            log::debug!(
                "cluster {}: {} points expanded to [{:.3}, {:.3}]",
                label,
                cluster.len(),
                region.left_edge()[0],
                region.right_edge()[0]
            );
            Ok((label, region))
        })
        .collect()
}
