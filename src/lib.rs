//! Wheel and axle bounding boxes from single-frame LiDAR side profiles.
//!
//! This crate provides tools for:
//! - Loading vehicle point clouds from ASCII PCD, PLY and CSV files
//! - Reducing a cloud to its lower silhouette (minimum height per scan position)
//! - Selecting wheel contact points within a clearance band and clustering them with DBSCAN
//! - Expanding each wheel cluster along a cubic spline until the wheel well edge
//! - Assembling one bounding box per wheel and exporting them as JSON labels
//!
//! # Example
//!
//! ```no_run
//! use axle_detect::core::loaders::load_point_cloud;
//! use axle_detect::processors::pipeline::detect;
//! use axle_detect::PipelineConfig;
//!
//! let cloud = load_point_cloud("frame_0001.pcd").unwrap();
//! let detection = detect(&cloud, &PipelineConfig::default()).unwrap();
//! for (label, bbox) in &detection.boxes {
//!     println!("wheel {}: {:?}", label, bbox);
//! }
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;
pub mod visualization;

pub use config::{
    AxesConfig, BoxConfig, BoxStrategyKind, DetectionConfig, DipConfig, ExportConfig,
    HeightConvention, PipelineConfig, VehicleMask,
};
pub use core::loaders::PointCloud;
pub use core::types::{BoundingBox, BoxSet, DetectionError, Silhouette};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
