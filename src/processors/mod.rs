//! Detection stages, leaf-first.

pub mod boxes;
pub mod clustering;
pub mod dips;
pub mod pipeline;
pub mod silhouette;
pub mod spline;
pub mod wheel_points;

// Re-export key types for convenience
pub use boxes::{
    apply_depth, strategy_for, Assembly, BoxStrategy, ClusterExtentStrategy, DipStrategy,
    FrameContext,
};
pub use clustering::{cluster_wheel_points, clusters_by_label, dbscan};
pub use dips::{expand_cluster, expand_clusters, walk, Direction, ExpandedRegion, WalkTermination};
pub use pipeline::{detect, export_directory, find_point_clouds, BatchSummary, Detection};
pub use silhouette::{extract_silhouette, lower_bounds, mask_vehicle, VehiclePoints};
pub use spline::{fit_curve, CubicSpline};
pub use wheel_points::lowest_points;
