//! Configuration types for the axle detection pipeline.
//!
//! Every stage receives its parameters explicitly through these value
//! objects; nothing in the detection path reads global state.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors raised by [`PipelineConfig::validate`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("axes must be distinct, got length={length}, height={height}, lateral={lateral}")]
    DuplicateAxes {
        length: usize,
        height: usize,
        lateral: usize,
    },

    #[error("axis index {0} out of range (expected 0, 1 or 2)")]
    AxisOutOfRange(usize),

    #[error("{name} must be positive and finite, got {value}")]
    NonPositive { name: &'static str, value: f64 },

    #[error("min_clearance must be non-negative and finite, got {0}")]
    NegativeClearance(f64),

    #[error("dbscan_min_samples must be at least 1")]
    ZeroMinSamples,

    #[error("max_steps must be at least 1")]
    ZeroMaxSteps,
}

/// How points that do not belong to the vehicle are masked out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleMask {
    /// Keep points above `height_floor` on the far half of the lateral range.
    HalfSpace,
    /// Use every point of the cloud.
    None,
}

/// Axis mapping of the incoming cloud and the vehicle mask.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AxesConfig {
    /// Axis along the vehicle (scan position)
    #[serde(default)]
    pub length_axis: usize,

    /// Vertical axis
    #[serde(default = "default_height_axis")]
    pub height_axis: usize,

    /// Lateral axis (distance from the sensor)
    #[serde(default = "default_lateral_axis")]
    pub lateral_axis: usize,

    /// Vehicle mask mode
    #[serde(default = "default_vehicle_mask")]
    pub vehicle_mask: VehicleMask,

    /// Points at or below this height are treated as ground
    #[serde(default)]
    pub height_floor: f64,

    /// Round scan positions to this resolution before grouping.
    /// `None` groups by exact equality.
    #[serde(default)]
    pub position_resolution: Option<f64>,
}

fn default_height_axis() -> usize {
    1
}

fn default_lateral_axis() -> usize {
    2
}

fn default_vehicle_mask() -> VehicleMask {
    VehicleMask::HalfSpace
}

impl Default for AxesConfig {
    fn default() -> Self {
        Self {
            length_axis: 0,
            height_axis: default_height_axis(),
            lateral_axis: default_lateral_axis(),
            vehicle_mask: default_vehicle_mask(),
            height_floor: 0.0,
            position_resolution: None,
        }
    }
}

/// Configuration for wheel point selection and DBSCAN clustering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Maximum distance above the lowest point that still counts as a wheel point
    #[serde(default = "default_min_clearance")]
    pub min_clearance: f64,

    /// Neighborhood radius, should be >= the spacing between scan lines
    #[serde(default = "default_dbscan_epsilon")]
    pub dbscan_epsilon: f64,

    /// Minimum neighborhood size, should be >= 2 so a box is never dimensionless
    #[serde(default = "default_dbscan_min_samples")]
    pub dbscan_min_samples: usize,
}

fn default_min_clearance() -> f64 {
    0.06
}

fn default_dbscan_epsilon() -> f64 {
    0.20
}

fn default_dbscan_min_samples() -> usize {
    2
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_clearance: default_min_clearance(),
            dbscan_epsilon: default_dbscan_epsilon(),
            dbscan_min_samples: default_dbscan_min_samples(),
        }
    }
}

/// How the dip strategy turns rim and bottom heights into a box height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeightConvention {
    /// Twice the mean rim depth below the edges: `2 * ((left + right) / 2 - bottom)`.
    TwiceMeanDepth,
    /// Sum of the two edge heights, measured from zero.
    RimSum,
}

/// Configuration for the slope-driven dip expansion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DipConfig {
    /// Spacing of the resampled silhouette
    #[serde(default = "default_interpolation_resolution")]
    pub interpolation_resolution: f64,

    /// Run wheel selection against the resampled spline instead of raw samples
    #[serde(default = "default_resample")]
    pub resample: bool,

    /// Step size of the boundary walk
    #[serde(default = "default_step_size")]
    pub step_size: f64,

    /// Minimum slope before the reversal trigger is armed
    #[serde(default = "default_slope_threshold")]
    pub slope_threshold: f64,

    /// Safeguard against walks that never reverse
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// Box height convention
    #[serde(default = "default_height_convention")]
    pub height_convention: HeightConvention,
}

fn default_interpolation_resolution() -> f64 {
    0.01
}

fn default_resample() -> bool {
    true
}

fn default_step_size() -> f64 {
    0.05
}

fn default_slope_threshold() -> f64 {
    0.5
}

fn default_max_steps() -> usize {
    5000
}

fn default_height_convention() -> HeightConvention {
    HeightConvention::TwiceMeanDepth
}

impl Default for DipConfig {
    fn default() -> Self {
        Self {
            interpolation_resolution: default_interpolation_resolution(),
            resample: default_resample(),
            step_size: default_step_size(),
            slope_threshold: default_slope_threshold(),
            max_steps: default_max_steps(),
            height_convention: default_height_convention(),
        }
    }
}

/// Which box assembly strategy runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoxStrategyKind {
    /// Square boxes over the raw cluster extent
    ClusterExtent,
    /// Boxes over the slope-expanded dip regions
    Dips,
}

/// Configuration for box assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoxConfig {
    #[serde(default = "default_strategy")]
    pub strategy: BoxStrategyKind,

    /// Emit a depth (lateral extent) and a 3D anchor
    #[serde(default)]
    pub three_d: bool,
}

fn default_strategy() -> BoxStrategyKind {
    BoxStrategyKind::Dips
}

impl Default for BoxConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            three_d: false,
        }
    }
}

/// Configuration for label export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Class tag written for every box
    #[serde(default = "default_class_tag")]
    pub class_tag: String,

    /// Extension of the point cloud files picked up by batch export
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Appended to the input file stem
    #[serde(default = "default_suffix")]
    pub suffix: String,
}

fn default_class_tag() -> String {
    "feature".to_string()
}

fn default_extension() -> String {
    "pcd".to_string()
}

fn default_suffix() -> String {
    "_labels".to_string()
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            class_tag: default_class_tag(),
            extension: default_extension(),
            suffix: default_suffix(),
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub axes: AxesConfig,

    #[serde(default)]
    pub detection: DetectionConfig,

    #[serde(default)]
    pub dips: DipConfig,

    #[serde(default)]
    pub boxes: BoxConfig,

    #[serde(default)]
    pub export: ExportConfig,
}

fn require_positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { name, value })
    }
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject parameter combinations no stage can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let axes = &self.axes;
        for axis in [axes.length_axis, axes.height_axis, axes.lateral_axis] {
            if axis > 2 {
                return Err(ConfigError::AxisOutOfRange(axis));
            }
        }
        if axes.length_axis == axes.height_axis
            || axes.length_axis == axes.lateral_axis
            || axes.height_axis == axes.lateral_axis
        {
            return Err(ConfigError::DuplicateAxes {
                length: axes.length_axis,
                height: axes.height_axis,
                lateral: axes.lateral_axis,
            });
        }
        if let Some(resolution) = axes.position_resolution {
            require_positive("position_resolution", resolution)?;
        }

        let detection = &self.detection;
        if !(detection.min_clearance.is_finite() && detection.min_clearance >= 0.0) {
            return Err(ConfigError::NegativeClearance(detection.min_clearance));
        }
        require_positive("dbscan_epsilon", detection.dbscan_epsilon)?;
        if detection.dbscan_min_samples == 0 {
            return Err(ConfigError::ZeroMinSamples);
        }

        let dips = &self.dips;
        require_positive("interpolation_resolution", dips.interpolation_resolution)?;
        require_positive("step_size", dips.step_size)?;
        require_positive("slope_threshold", dips.slope_threshold)?;
        if dips.max_steps == 0 {
            return Err(ConfigError::ZeroMaxSteps);
        }

        Ok(())
    }
}
