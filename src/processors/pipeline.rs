//! Per-frame detection and directory batch export.
//!
//! [`detect`] chains the processors for one point cloud:
//! mask, silhouette, (spline, resample), clearance band, DBSCAN, boxes.
//! [`export_directory`] runs it over every matching file under a directory
//! and writes one JSON label file per frame.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use rayon::prelude::*;

use crate::config::{BoxStrategyKind, PipelineConfig};
use crate::core::loaders::{load_point_cloud, PointCloud};
use crate::core::types::{BoxSet, Result, Silhouette, WheelPointSet};
use crate::core::writers::{write_label_json, LabelFile};

use super::boxes::{apply_depth, strategy_for, Assembly, FrameContext};
use super::clustering::{cluster_wheel_points, clusters_by_label};
use super::dips::ExpandedRegion;
use super::silhouette::{extract_silhouette, mask_vehicle};
use super::spline::fit_curve;
use super::wheel_points::lowest_points;

/// Everything computed for one frame.
#[derive(Debug, Clone)]
pub struct Detection {
    /// Lower silhouette of the masked vehicle points
    pub silhouette: Silhouette,
    /// Profile the clearance band ran on: the resampled spline when
    /// resampling is enabled, otherwise the silhouette itself
    pub profile: Silhouette,
    pub wheel_points: WheelPointSet,
    /// One label per wheel point, -1 for noise
    pub labels: Vec<i32>,
    /// Expanded dip regions, empty for the cluster-extent strategy
    pub regions: BTreeMap<i32, ExpandedRegion>,
    pub boxes: BoxSet,
}

impl Detection {
    /// Number of non-noise clusters.
    pub fn cluster_count(&self) -> usize {
        let mut labels: Vec<i32> = self.labels.iter().copied().filter(|&l| l >= 0).collect();
        labels.sort_unstable();
        labels.dedup();
        labels.len()
    }
}

/// Run the full detection pipeline on one point cloud.
///
/// # Errors
///
/// - [`DetectionError::Config`](crate::core::types::DetectionError::Config)
///   for an invalid configuration
/// - [`DetectionError::Input`](crate::core::types::DetectionError::Input)
///   when no point passes the vehicle mask
/// - [`DetectionError::InvalidDomain`](crate::core::types::DetectionError::InvalidDomain)
///   when the dip strategy needs a spline through fewer than two positions
///
/// An empty clearance band or all-noise clustering is not an error; the
/// detection simply has no boxes.
pub fn detect(cloud: &PointCloud, config: &PipelineConfig) -> Result<Detection> {
    config.validate()?;

    let vehicle = mask_vehicle(cloud, &config.axes)?;
    let silhouette = extract_silhouette(&vehicle, &config.axes)?;

    let curve = match config.boxes.strategy {
        BoxStrategyKind::Dips => Some(fit_curve(&silhouette)?),
        BoxStrategyKind::ClusterExtent => None,
    };
    let profile = match &curve {
        Some(curve) if config.dips.resample => {
            curve.resample(config.dips.interpolation_resolution)?
        }
        _ => silhouette.clone(),
    };

    let wheel_points = lowest_points(&profile, config.detection.min_clearance);
    let labels = cluster_wheel_points(&wheel_points, &config.detection);
    let clusters = clusters_by_label(&wheel_points, &labels);

    let strategy = strategy_for(config);
    let frame = FrameContext {
        silhouette: &silhouette,
        curve: curve.as_ref(),
        clusters: &clusters,
    };
    let Assembly { mut boxes, regions } = strategy.assemble(&frame)?;

    if config.boxes.three_d {
        apply_depth(&mut boxes, &vehicle);
    }

    log::info!(
        "{} points -> {} silhouette positions, {} wheel points, {} clusters, {} boxes ({})",
        cloud.len(),
        silhouette.len(),
        wheel_points.len(),
        clusters.len(),
        boxes.len(),
        strategy.name()
    );

    Ok(Detection {
        silhouette,
        profile,
        wheel_points,
        labels,
        regions,
        boxes,
    })
}

/// Find files with the given extension under `dir`, recursively, sorted by path.
pub fn find_point_clouds(dir: &Path, extension: &str) -> io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        for entry in fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(extension))
            {
                found.push(path);
            }
        }
    }

    found.sort();
    Ok(found)
}

/// Path of the label file for `input`, mirroring its location below `input_root`.
pub fn label_path(input: &Path, input_root: &Path, output_dir: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let subdir = input
        .parent()
        .and_then(|p| p.strip_prefix(input_root).ok())
        .unwrap_or_else(|| Path::new(""));
    output_dir
        .join(subdir)
        .join(format!("{}{}.json", stem, suffix))
}

/// Detect one file and write its label file. Returns the output path and box count.
pub fn export_frame(
    input: &Path,
    input_root: &Path,
    output_dir: &Path,
    config: &PipelineConfig,
) -> anyhow::Result<(PathBuf, usize)> {
    let cloud = load_point_cloud(input)
        .with_context(|| format!("failed to load {}", input.display()))?;
    let detection = detect(&cloud, config)
        .with_context(|| format!("detection failed for {}", input.display()))?;

    let name = input
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let labels = LabelFile::from_boxes(name, &detection.boxes, &config.export.class_tag);
    let dest = label_path(input, input_root, output_dir, &config.export.suffix);
    write_label_json(&dest, &labels)
        .with_context(|| format!("failed to write labels for {}", input.display()))?;

    Ok((dest, detection.boxes.len()))
}

/// Outcome of a batch export.
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    /// Written label files, in input order
    pub exported: Vec<PathBuf>,
    /// Inputs that failed, with the reason
    pub skipped: Vec<(PathBuf, String)>,
    pub total_boxes: usize,
}

impl BatchSummary {
    pub fn frames(&self) -> usize {
        self.exported.len() + self.skipped.len()
    }
}

/// Export label files for every point cloud under `input_dir`.
///
/// Frames are processed in parallel and independently: a frame that fails
/// to load or detect is logged, recorded in [`BatchSummary::skipped`], and
/// does not stop the batch. `on_frame` is called once per input after it
/// finishes, from the worker thread that processed it.
///
/// # Errors
///
/// Fails only when the directory cannot be read or holds no matching file.
pub fn export_directory<F>(
    input_dir: &Path,
    output_dir: &Path,
    config: &PipelineConfig,
    on_frame: F,
) -> anyhow::Result<BatchSummary>
where
    F: Fn(&Path) + Sync,
{
    config.validate().context("invalid configuration")?;

    let files = find_point_clouds(input_dir, &config.export.extension)
        .with_context(|| format!("failed to scan {}", input_dir.display()))?;
    if files.is_empty() {
        bail!(
            "no .{} files found under {}",
            config.export.extension,
            input_dir.display()
        );
    }
    log::info!("exporting {} frames from {}", files.len(), input_dir.display());

    let results: Vec<anyhow::Result<(PathBuf, usize)>> = files
        .par_iter()
        .map(|input| {
            let result = export_frame(input, input_dir, output_dir, config);
            on_frame(input);
            result
        })
        .collect();

    let mut summary = BatchSummary::default();
    for (input, result) in files.into_iter().zip(results) {
        match result {
            Ok((dest, boxes)) => {
                log::debug!("{} -> {} ({} boxes)", input.display(), dest.display(), boxes);
                summary.exported.push(dest);
                summary.total_boxes += boxes;
            }
            Err(e) => {
                log::warn!("skipping {}: {:#}", input.display(), e);
                summary.skipped.push((input, format!("{:#}", e)));
            }
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VehicleMask;
    use crate::core::types::DetectionError;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    /// Two V-shaped wells on a flat body, no mask needed.
    fn two_wells() -> PointCloud {
        let mut cloud = PointCloud::new();
        for i in 0..=200 {
            let x = i as f64 * 0.05;
            let d1 = (x - 2.5).abs();
            let d2 = (x - 7.5).abs();
            let y = if d1 < 0.6 {
                d1
            } else if d2 < 0.6 {
                0.01 + d2 * 0.59 / 0.6
            } else {
                0.6
            };
            cloud.push(x, y, 0.0);
            cloud.push(x, y + 0.2, 0.0);
        }
        cloud
    }

    fn unmasked() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.axes.vehicle_mask = VehicleMask::None;
        config.detection.min_clearance = 0.08;
        config
    }

    #[test]
    fn test_detect_cluster_extent() {
        let mut config = unmasked();
        config.boxes.strategy = BoxStrategyKind::ClusterExtent;

        let detection = detect(&two_wells(), &config).unwrap();

        assert_eq!(detection.silhouette, detection.profile);
        assert_eq!(detection.cluster_count(), 2);
        assert_eq!(detection.boxes.len(), 2);
        assert!(detection.regions.is_empty());
        for (bbox, center) in detection.boxes.values().zip([2.5, 7.5]) {
            assert!(bbox.left() < center && bbox.right() > center);
        }
    }

    #[test]
    fn test_detect_dips_expands_past_cluster() {
        let config = unmasked();
        let detection = detect(&two_wells(), &config).unwrap();

        assert_eq!(detection.boxes.len(), 2);
        assert_eq!(detection.regions.len(), 2);
        // Resampled at 0.01 over [0, 10]
        assert!(detection.profile.len() > detection.silhouette.len());
        for bbox in detection.boxes.values() {
            assert!(bbox.width > 0.9 && bbox.width < 2.0, "width {}", bbox.width);
        }
    }

    #[test]
    fn test_detect_three_d_adds_depth() {
        let mut config = unmasked();
        config.boxes.three_d = true;
        let detection = detect(&two_wells(), &config).unwrap();
        for bbox in detection.boxes.values() {
            assert_eq!(bbox.anchor_components().len(), 3);
            assert_eq!(bbox.extent().len(), 3);
        }
    }

    #[test]
    fn test_detect_rejects_invalid_config() {
        let mut config = unmasked();
        config.detection.dbscan_min_samples = 0;
        assert!(matches!(
            detect(&two_wells(), &config),
            Err(DetectionError::Config(_))
        ));
    }

    #[test]
    fn test_detect_single_position_is_invalid_domain() {
        let cloud = PointCloud::from_coords(&[[1.0, 0.5, 0.0], [1.0, 0.7, 0.0]]);
        let config = unmasked();
        assert!(matches!(
            detect(&cloud, &config),
            Err(DetectionError::InvalidDomain(_))
        ));
    }

    #[test]
    fn test_find_point_clouds_recursive_sorted() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("b")).unwrap();
        File::create(dir.path().join("b/2.pcd")).unwrap();
        File::create(dir.path().join("1.PCD")).unwrap();
        File::create(dir.path().join("notes.txt")).unwrap();

        let found = find_point_clouds(dir.path(), "pcd").unwrap();
        assert_eq!(
            found,
            vec![dir.path().join("1.PCD"), dir.path().join("b/2.pcd")]
        );
    }

    #[test]
    fn test_label_path_mirrors_subdirectories() {
        let path = label_path(
            Path::new("/data/run1/frame_007.pcd"),
            Path::new("/data"),
            Path::new("exports"),
            "_labels",
        );
        assert_eq!(path, PathBuf::from("exports/run1/frame_007_labels.json"));
    }

    #[test]
    fn test_export_directory_skips_bad_frames() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();

        let cloud = two_wells();
        let mut good = File::create(input.path().join("good.csv")).unwrap();
        writeln!(good, "x,y,z").unwrap();
        for [x, y, z] in cloud.to_coords() {
            writeln!(good, "{},{},{}", x, y, z).unwrap();
        }
        let mut bad = File::create(input.path().join("bad.csv")).unwrap();
        writeln!(bad, "x,y,z").unwrap();
        writeln!(bad, "oops,1,2").unwrap();

        let mut config = unmasked();
        config.export.extension = "csv".to_string();

        let summary = export_directory(input.path(), output.path(), &config, |_| {}).unwrap();

        assert_eq!(summary.frames(), 2);
        assert_eq!(summary.exported.len(), 1);
        assert_eq!(summary.skipped.len(), 1);
        assert!(summary.skipped[0].0.ends_with("bad.csv"));
        assert_eq!(summary.total_boxes, 2);
        assert!(output.path().join("good_labels.json").exists());
    }

    #[test]
    fn test_export_directory_without_matches_fails() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        assert!(export_directory(input.path(), output.path(), &unmasked(), |_| {}).is_err());
    }
}
