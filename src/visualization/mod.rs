//! Detection overlays rendered with plotters.
//!
//! One PNG per frame in the length/height plane: raw points, the lower
//! silhouette, wheel points coloured by cluster, expanded dip regions and
//! the bounding boxes. No text is drawn so that no font backend is needed.

use std::path::Path;

use plotters::prelude::*;
use plotters_bitmap::BitMapBackend;
use thiserror::Error;

use crate::config::AxesConfig;
use crate::core::loaders::PointCloud;
use crate::processors::pipeline::Detection;

/// Errors that can occur during visualization.
#[derive(Error, Debug)]
pub enum VisualizationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Plotting error: {0}")]
    PlottingError(String),

    #[error("Empty point cloud")]
    EmptyPointCloud,
}

/// Result type for visualization operations.
pub type Result<T> = std::result::Result<T, VisualizationError>;

const DEFAULT_WIDTH: u32 = 1920;
const DEFAULT_HEIGHT: u32 = 1080;

/// Raw points drawn per frame before subsampling kicks in.
const MAX_RAW_POINTS: usize = 200_000;

/// Color palette for cluster visualization.
const CLUSTER_COLORS: &[(u8, u8, u8)] = &[
    (228, 26, 28),   // Red
    (55, 126, 184),  // Blue
    (77, 175, 74),   // Green
    (152, 78, 163),  // Purple
    (255, 127, 0),   // Orange
    (166, 86, 40),   // Brown
    (247, 129, 191), // Pink
    (0, 206, 209),   // Turquoise
];

/// Noise color (gray) for unclustered points (label = -1).
const NOISE_COLOR: (u8, u8, u8) = (128, 128, 128);

const RAW_COLOR: RGBAColor = RGBAColor(100, 149, 237, 0.3);
const SILHOUETTE_COLOR: RGBColor = RGBColor(40, 40, 40);

fn label_color(label: i32) -> RGBColor {
    let (r, g, b) = if label < 0 {
        NOISE_COLOR
    } else {
        CLUSTER_COLORS[label as usize % CLUSTER_COLORS.len()]
    };
    RGBColor(r, g, b)
}

fn plotting_error<E: std::fmt::Display>(e: E) -> VisualizationError {
    VisualizationError::PlottingError(e.to_string())
}

/// Render one frame's detection as a PNG.
///
/// Raw points are subsampled above a fixed budget. Boxes are drawn as
/// outlines in their cluster's colour, expanded regions as polylines.
pub fn plot_detection(
    output_path: &Path,
    cloud: &PointCloud,
    detection: &Detection,
    axes: &AxesConfig,
) -> Result<()> {
    if cloud.is_empty() {
        return Err(VisualizationError::EmptyPointCloud);
    }
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let length = cloud.axis(axes.length_axis);
    let height = cloud.axis(axes.height_axis);
    let step = (cloud.len() / MAX_RAW_POINTS).max(1);
    let raw: Vec<(f64, f64)> = (0..cloud.len())
        .step_by(step)
        .map(|i| (length[i], height[i]))
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .collect();

    let box_corners = detection
        .boxes
        .values()
        .flat_map(|b| [(b.left(), b.anchor[1]), (b.right(), b.anchor[1] + b.height)]);
    let (x_min, x_max, y_min, y_max) = compute_bounds(raw.iter().copied().chain(box_corners));
    let x_padding = (x_max - x_min) * 0.05;
    let y_padding = (y_max - y_min) * 0.05;

    let root = BitMapBackend::new(output_path, (DEFAULT_WIDTH, DEFAULT_HEIGHT)).into_drawing_area();
    root.fill(&WHITE).map_err(plotting_error)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .build_cartesian_2d(
            (x_min - x_padding)..(x_max + x_padding),
            (y_min - y_padding)..(y_max + y_padding),
        )
        .map_err(plotting_error)?;

    chart
        .draw_series(raw.iter().map(|&(x, y)| Circle::new((x, y), 1, RAW_COLOR.filled())))
        .map_err(plotting_error)?;

    chart
        .draw_series(LineSeries::new(
            detection.silhouette.to_points().into_iter().map(|[x, y]| (x, y)),
            SILHOUETTE_COLOR.stroke_width(2),
        ))
        .map_err(plotting_error)?;

    for (label, region) in &detection.regions {
        let color = label_color(*label);
        chart
            .draw_series(LineSeries::new(
                region.points().iter().map(|&[x, y]| (x, y)),
                color.stroke_width(3),
            ))
            .map_err(plotting_error)?;
    }

    chart
        .draw_series(
            detection
                .wheel_points
                .to_points()
                .into_iter()
                .zip(&detection.labels)
                .map(|([x, y], &label)| Circle::new((x, y), 4, label_color(label).filled())),
        )
        .map_err(plotting_error)?;

    chart
        .draw_series(detection.boxes.iter().map(|(&label, b)| {
            Rectangle::new(
                [(b.left(), b.anchor[1]), (b.right(), b.anchor[1] + b.height)],
                label_color(label).stroke_width(2),
            )
        }))
        .map_err(plotting_error)?;

    root.present().map_err(plotting_error)?;
    log::debug!("wrote {}", output_path.display());

    Ok(())
}

/// Compute the bounds (min/max) for x and y coordinates.
fn compute_bounds(points: impl Iterator<Item = (f64, f64)>) -> (f64, f64, f64, f64) {
    let mut x_min = f64::MAX;
    let mut x_max = f64::MIN;
    let mut y_min = f64::MAX;
    let mut y_max = f64::MIN;

    for (x, y) in points {
        x_min = x_min.min(x);
        x_max = x_max.max(x);
        y_min = y_min.min(y);
        y_max = y_max.max(y);
    }

    if x_min > x_max {
        return (-1.0, 1.0, -1.0, 1.0);
    }
    if (x_max - x_min).abs() < f64::EPSILON {
        x_min -= 1.0;
        x_max += 1.0;
    }
    if (y_max - y_min).abs() < f64::EPSILON {
        y_min -= 1.0;
        y_max += 1.0;
    }

    (x_min, x_max, y_min, y_max)
}
