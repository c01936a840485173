//! Per-frame data model shared by all detection stages.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::config::ConfigError;

/// Errors that abort detection for one frame.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectionError {
    /// Empty cloud, or nothing survived the vehicle mask.
    #[error("input error: {0}")]
    Input(String),

    /// Spline input is degenerate or not strictly increasing.
    #[error("invalid domain: {0}")]
    InvalidDomain(String),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for detection operations.
pub type Result<T> = std::result::Result<T, DetectionError>;

/// Label assigned to points outside every dense cluster.
pub const NOISE_LABEL: i32 = -1;

/// Lower profile of a vehicle: one minimum height per scan position.
///
/// Positions are strictly increasing. The same type carries the wheel point
/// subset, which keeps that ordering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Silhouette {
    positions: Vec<f64>,
    heights: Vec<f64>,
}

/// Silhouette entries within the clearance band of the global minimum.
pub type WheelPointSet = Silhouette;

impl Silhouette {
    /// Build a silhouette, checking that positions strictly increase.
    pub fn new(positions: Vec<f64>, heights: Vec<f64>) -> Result<Self> {
        if positions.len() != heights.len() {
            return Err(DetectionError::InvalidDomain(format!(
                "{} positions but {} heights",
                positions.len(),
                heights.len()
            )));
        }
        if let Some(i) = positions.windows(2).position(|w| !(w[1] > w[0])) {
            return Err(DetectionError::InvalidDomain(format!(
                "positions not strictly increasing at index {} ({} -> {})",
                i + 1,
                positions[i],
                positions[i + 1]
            )));
        }
        Ok(Self { positions, heights })
    }

    /// Build from `[position, height]` pairs.
    pub fn from_points(points: &[[f64; 2]]) -> Result<Self> {
        let positions = points.iter().map(|p| p[0]).collect();
        let heights = points.iter().map(|p| p[1]).collect();
        Self::new(positions, heights)
    }

    pub fn empty() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    #[inline]
    pub fn positions(&self) -> &[f64] {
        &self.positions
    }

    #[inline]
    pub fn heights(&self) -> &[f64] {
        &self.heights
    }

    /// Entry `i` as `[position, height]`.
    #[inline]
    pub fn point(&self, i: usize) -> [f64; 2] {
        [self.positions[i], self.heights[i]]
    }

    /// Converts the silhouette to a vector of `[position, height]` pairs.
    pub fn to_points(&self) -> Vec<[f64; 2]> {
        (0..self.len()).map(|i| self.point(i)).collect()
    }

    /// Lowest height and its index. Ties resolve to the leftmost entry.
    pub fn min_height(&self) -> Option<(usize, f64)> {
        self.heights
            .iter()
            .copied()
            .enumerate()
            .fold(None, |best, (i, h)| match best {
                Some((_, b)) if b <= h => best,
                _ => Some((i, h)),
            })
    }

    /// Keep the entries for which `keep` returns true. Order is preserved.
    pub fn filter<F>(&self, mut keep: F) -> Silhouette
    where
        F: FnMut(f64, f64) -> bool,
    {
        let mut positions = Vec::new();
        let mut heights = Vec::new();
        for (&x, &y) in self.positions.iter().zip(&self.heights) {
            if keep(x, y) {
                positions.push(x);
                heights.push(y);
            }
        }
        Silhouette { positions, heights }
    }
}

/// Lateral extent of a box in the 3D variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LateralExtent {
    /// Lowest lateral coordinate, the third anchor component
    pub min: f64,
    /// Lateral size of the box
    pub depth: f64,
}

/// Axis-aligned box around one wheel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// `[position, height]` of the anchor corner
    pub anchor: [f64; 2],
    pub width: f64,
    pub height: f64,
    /// Present only for 3D boxes
    pub lateral: Option<LateralExtent>,
}

impl BoundingBox {
    pub fn new(anchor: [f64; 2], width: f64, height: f64) -> Self {
        Self {
            anchor,
            width,
            height,
            lateral: None,
        }
    }

    /// Anchor with the lateral component appended for 3D boxes.
    pub fn anchor_components(&self) -> Vec<f64> {
        let mut out = self.anchor.to_vec();
        if let Some(lateral) = self.lateral {
            out.push(lateral.min);
        }
        out
    }

    /// `[width, height]` or `[width, height, depth]`.
    pub fn extent(&self) -> Vec<f64> {
        let mut out = vec![self.width, self.height];
        if let Some(lateral) = self.lateral {
            out.push(lateral.depth);
        }
        out
    }

    #[inline]
    pub fn left(&self) -> f64 {
        self.anchor[0]
    }

    #[inline]
    pub fn right(&self) -> f64 {
        self.anchor[0] + self.width
    }
}

/// Boxes keyed by cluster label. Never contains [`NOISE_LABEL`].
pub type BoxSet = BTreeMap<i32, BoundingBox>;
