//! Core data types and I/O operations.

pub mod loaders;
pub mod types;
pub mod writers;

pub use loaders::{load_point_cloud, LoaderError, PointCloud};
pub use types::{
    BoundingBox, BoxSet, DetectionError, LateralExtent, Silhouette, WheelPointSet, NOISE_LABEL,
};
pub use writers::{write_label_json, write_wheel_points_csv, BoxRecord, LabelFile, WriteError};
