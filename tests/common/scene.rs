//! Synthetic side-profile scans of a two-axle vehicle.

use std::fs;
use std::io::Write;
use std::path::Path;

use axle_detect::PointCloud;

/// Scan line spacing along the vehicle.
pub const SCAN_STEP: f64 = 0.05;
/// Wheel centers along the length axis.
pub const WHEEL_CENTERS: [f64; 2] = [2.5, 7.5];
/// Lowest silhouette height under each wheel.
pub const WHEEL_BOTTOMS: [f64; 2] = [0.10, 0.11];
/// Half width of each V-shaped well.
pub const WELL_HALF_WIDTH: f64 = 0.6;
/// Silhouette height at the well rims.
pub const RIM_HEIGHT: f64 = 0.7;

const BODY_FLOOR: f64 = 0.45;
const SCAN_LINES: usize = 200;

/// Lower profile height at `x`: two V-shaped wells whose rims are crests
/// sloping down gently into the body between them.
pub fn profile(x: f64) -> f64 {
    for (&center, &bottom) in WHEEL_CENTERS.iter().zip(&WHEEL_BOTTOMS) {
        let d = (x - center).abs();
        if d <= WELL_HALF_WIDTH {
            return bottom + (RIM_HEIGHT - bottom) * d / WELL_HALF_WIDTH;
        }
    }
    let to_rim = WHEEL_CENTERS
        .iter()
        .map(|c| ((x - c).abs() - WELL_HALF_WIDTH).abs())
        .fold(f64::INFINITY, f64::min);
    (RIM_HEIGHT - 0.2 * to_rim).max(BODY_FLOOR)
}

/// Scan positions of the synthetic sensor.
pub fn scan_positions() -> impl Iterator<Item = f64> {
    (0..=SCAN_LINES).map(|i| i as f64 * SCAN_STEP)
}

/// Vehicle body points plus ground and baseline points that the vehicle
/// mask must remove.
///
/// Axes: 0 = length, 1 = height, 2 = lateral. Vehicle points sit at lateral
/// 1.0..1.4 above the profile; the baseline half of the scan sits at lateral
/// -1.0 and lower than any wheel.
pub fn vehicle_scene() -> PointCloud {
    scene_with(profile)
}

/// Same layout as [`vehicle_scene`] with a custom lower profile.
pub fn scene_with(profile: impl Fn(f64) -> f64) -> PointCloud {
    let mut cloud = PointCloud::new();
    for x in scan_positions() {
        let y = profile(x);
        for z in [1.0, 1.2, 1.4] {
            for k in 0..3 {
                cloud.push(x, y + k as f64 * 0.15, z);
            }
        }
        // Ground
        cloud.push(x, 0.0, 1.2);
        // Baseline
        cloud.push(x, 0.05, -1.0);
    }
    cloud
}

/// Write a cloud as an ASCII PCD with an extra intensity field.
pub fn write_pcd(path: &Path, cloud: &PointCloud) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut file = fs::File::create(path).unwrap();
    writeln!(file, "# .PCD v0.7 - Point Cloud Data file format").unwrap();
    writeln!(file, "VERSION 0.7").unwrap();
    writeln!(file, "FIELDS x y z intensity").unwrap();
    writeln!(file, "SIZE 4 4 4 4").unwrap();
    writeln!(file, "TYPE F F F F").unwrap();
    writeln!(file, "COUNT 1 1 1 1").unwrap();
    writeln!(file, "WIDTH {}", cloud.len()).unwrap();
    writeln!(file, "HEIGHT 1").unwrap();
    writeln!(file, "VIEWPOINT 0 0 0 1 0 0 0").unwrap();
    writeln!(file, "POINTS {}", cloud.len()).unwrap();
    writeln!(file, "DATA ascii").unwrap();
    for [x, y, z] in cloud.to_coords() {
        writeln!(file, "{} {} {} 12", x, y, z).unwrap();
    }
}
