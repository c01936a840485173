//! Data loaders for vehicle point cloud files.
//!
//! This module provides parsers for:
//! - ASCII PCD files (x, y, z fields; other fields are skipped)
//! - ASCII PLY point cloud files
//! - Cartesian point cloud CSV files (x, y, z columns)

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use thiserror::Error;

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Empty file: {0}")]
    EmptyFile(PathBuf),

    #[error("Invalid PCD file: {0}")]
    InvalidPcd(String),

    #[error("Invalid PLY file: {0}")]
    InvalidPly(String),

    #[error("Missing required columns: {0}")]
    MissingColumns(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Unsupported format: {0}")]
    Unsupported(String),
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Upper bound on buffers reserved from a header point count. Larger clouds
/// still load; the vectors grow past it as rows are read.
const MAX_PREALLOCATED_POINTS: usize = 1 << 20;

/// Container for 3D point cloud data.
///
/// Axis meaning is fixed by the caller through
/// [`AxesConfig`](crate::config::AxesConfig); the default convention is
/// x = vehicle length, y = height, z = lateral distance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    /// X coordinates of all points.
    pub x: Vec<f64>,
    /// Y coordinates of all points.
    pub y: Vec<f64>,
    /// Z coordinates of all points.
    pub z: Vec<f64>,
}

impl PointCloud {
    /// Creates a new empty point cloud.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new point cloud from coordinate vectors.
    pub fn from_xyz(x: Vec<f64>, y: Vec<f64>, z: Vec<f64>) -> Self {
        debug_assert!(x.len() == y.len() && y.len() == z.len());
        Self { x, y, z }
    }

    /// Creates a point cloud from `[x, y, z]` triplets.
    pub fn from_coords(coords: &[[f64; 3]]) -> Self {
        let mut cloud = Self::with_capacity(coords.len());
        for c in coords {
            cloud.push(c[0], c[1], c[2]);
        }
        cloud
    }

    /// Creates a new point cloud with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            x: Vec::with_capacity(capacity),
            y: Vec::with_capacity(capacity),
            z: Vec::with_capacity(capacity),
        }
    }

    /// Returns the number of points in the cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Returns true if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Coordinates along axis `index` (0 = x, 1 = y, 2 = z).
    ///
    /// # Panics
    ///
    /// Panics if `index > 2`. Axis indices are checked by
    /// [`PipelineConfig::validate`](crate::config::PipelineConfig::validate).
    #[inline]
    pub fn axis(&self, index: usize) -> &[f64] {
        match index {
            0 => &self.x,
            1 => &self.y,
            2 => &self.z,
            _ => panic!("axis index {} out of range", index),
        }
    }

    /// Converts point cloud to a vector of [x, y, z] coordinate arrays.
    pub fn to_coords(&self) -> Vec<[f64; 3]> {
        (0..self.len())
            .map(|i| [self.x[i], self.y[i], self.z[i]])
            .collect()
    }

    /// Adds a point to the cloud.
    #[inline]
    pub fn push(&mut self, x: f64, y: f64, z: f64) {
        self.x.push(x);
        self.y.push(y);
        self.z.push(z);
    }
}

/// Load a point cloud, choosing the parser by file extension.
///
/// `.pcd`, `.ply` and `.csv` are recognised (case-insensitive).
pub fn load_point_cloud<P: AsRef<Path>>(path: P) -> Result<PointCloud> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "pcd" => load_pcd(path),
        "ply" => load_ply(path),
        "csv" => load_cartesian_csv(path),
        other => Err(LoaderError::Unsupported(format!(
            "{}: unknown extension '{}'",
            path.display(),
            other
        ))),
    }
}

/// Load a point cloud from an ASCII PCD file.
///
/// Only the x, y, z fields are read; intensity and any other fields are
/// skipped using the `COUNT` header to locate columns. Points with a
/// non-finite coordinate (organized clouds pad with NaN) are dropped.
///
/// # Errors
///
/// Returns an error for binary PCD data, missing x/y/z fields, or a data
/// section shorter than `POINTS`.
pub fn load_pcd<P: AsRef<Path>>(path: P) -> Result<PointCloud> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();

    let mut fields: Vec<String> = Vec::new();
    let mut counts: Vec<usize> = Vec::new();
    let mut num_points: Option<usize> = None;
    let mut header_done = false;

    for line in &mut lines {
        let line = line?;
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }

        let mut parts = stripped.split_whitespace();
        let key = parts.next().unwrap_or_default().to_ascii_uppercase();
        let values: Vec<&str> = parts.collect();

        match key.as_str() {
            "FIELDS" => fields = values.iter().map(|s| s.to_ascii_lowercase()).collect(),
            "COUNT" => {
                counts = values
                    .iter()
                    .map(|s| {
                        s.parse().map_err(|_| {
                            LoaderError::InvalidPcd(format!("invalid COUNT entry '{}'", s))
                        })
                    })
                    .collect::<Result<_>>()?;
            }
            "POINTS" => {
                num_points = values.first().and_then(|s| s.parse().ok());
            }
            "DATA" => {
                let encoding = values.first().copied().unwrap_or_default();
                if !encoding.eq_ignore_ascii_case("ascii") {
                    return Err(LoaderError::Unsupported(format!(
                        "{}: PCD DATA {} (only ascii is supported)",
                        path.display(),
                        encoding
                    )));
                }
                header_done = true;
                break;
            }
            _ => {}
        }
    }

    if !header_done {
        return Err(LoaderError::InvalidPcd("missing DATA line".to_string()));
    }
    let num_points =
        num_points.ok_or_else(|| LoaderError::InvalidPcd("no POINTS in header".to_string()))?;
    if counts.is_empty() {
        counts = vec![1; fields.len()];
    }
    if counts.len() != fields.len() {
        return Err(LoaderError::InvalidPcd(format!(
            "{} fields but {} COUNT entries",
            fields.len(),
            counts.len()
        )));
    }

    // Column offset of each field in a data row
    let mut offsets: HashMap<&str, usize> = HashMap::new();
    let mut offset = 0;
    for (name, count) in fields.iter().zip(&counts) {
        offsets.insert(name.as_str(), offset);
        offset += count;
    }
    let row_width = offset;

    let column = |name: &str| {
        offsets
            .get(name)
            .copied()
            .ok_or_else(|| LoaderError::MissingColumns(name.to_string()))
    };
    let x_idx = column("x")?;
    let y_idx = column("y")?;
    let z_idx = column("z")?;

    let mut cloud = PointCloud::with_capacity(num_points.min(MAX_PREALLOCATED_POINTS));
    let mut rows = 0;
    for line in lines {
        if rows >= num_points {
            break;
        }
        let line = line?;
        let values: Vec<&str> = line.split_whitespace().collect();
        if values.is_empty() {
            continue;
        }
        if values.len() < row_width {
            return Err(LoaderError::ParseError(format!(
                "row {} has {} values, expected {}",
                rows,
                values.len(),
                row_width
            )));
        }
        rows += 1;

        let parse = |idx: usize| -> Result<f64> {
            values[idx]
                .parse::<f64>()
                .map_err(|_| LoaderError::ParseError(format!("Invalid value: {}", values[idx])))
        };
        let (x, y, z) = (parse(x_idx)?, parse(y_idx)?, parse(z_idx)?);
        if x.is_finite() && y.is_finite() && z.is_finite() {
            cloud.push(x, y, z);
        }
    }

    if rows < num_points {
        return Err(LoaderError::InvalidPcd(format!(
            "Expected {} points, found {}",
            num_points, rows
        )));
    }
    if cloud.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    Ok(cloud)
}

/// Load a Cartesian point cloud from a CSV file with x, y, z columns.
///
/// The CSV should have a header row with column names. The function will
/// look for columns named 'x', 'y', 'z' (case-insensitive), or fall back
/// to using the first three columns.
pub fn load_cartesian_csv<P: AsRef<Path>>(path: P) -> Result<PointCloud> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let headers = reader.headers()?.clone();
    let col_map: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, name)| (name.trim().to_lowercase(), i))
        .collect();

    let x_idx = col_map.get("x").copied().unwrap_or(0);
    let y_idx = col_map.get("y").copied().unwrap_or(1);
    let z_idx = col_map.get("z").copied().unwrap_or(2);

    let mut cloud = PointCloud::with_capacity(10000);

    for (row, result) in reader.records().enumerate() {
        let record = result?;
        let parse = |idx: usize| -> Result<f64> {
            record
                .get(idx)
                .and_then(|s| s.trim().parse().ok())
                .ok_or_else(|| {
                    LoaderError::ParseError(format!(
                        "row {}: missing or invalid column {}",
                        row, idx
                    ))
                })
        };
        cloud.push(parse(x_idx)?, parse(y_idx)?, parse(z_idx)?);
    }

    if cloud.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    Ok(cloud)
}

/// Load a point cloud from an ASCII PLY file.
///
/// Supports PLY files with vertex elements containing x, y, z properties.
/// Any further vertex properties are ignored.
pub fn load_ply<P: AsRef<Path>>(path: P) -> Result<PointCloud> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();

    let first_line = lines
        .next()
        .ok_or_else(|| LoaderError::InvalidPly("Empty file".to_string()))??;

    if !first_line.trim().starts_with("ply") {
        return Err(LoaderError::InvalidPly(format!(
            "{} is not a PLY file",
            path.display()
        )));
    }

    let mut num_vertices: Option<usize> = None;
    let mut prop_names: Vec<String> = Vec::new();
    let mut header_done = false;

    for line in &mut lines {
        let line = line?;
        let stripped = line.trim();

        if stripped.starts_with("format") && !stripped.contains("ascii") {
            return Err(LoaderError::Unsupported(format!(
                "{}: binary PLY",
                path.display()
            )));
        } else if stripped.starts_with("element vertex") {
            num_vertices = stripped
                .split_whitespace()
                .last()
                .and_then(|count| count.parse().ok());
        } else if stripped.starts_with("property") {
            if let Some(name) = stripped.split_whitespace().last() {
                prop_names.push(name.to_string());
            }
        } else if stripped == "end_header" {
            header_done = true;
            break;
        }
    }

    let num_vertices = num_vertices
        .ok_or_else(|| LoaderError::InvalidPly("No vertex count in header".to_string()))?;

    if !header_done {
        return Err(LoaderError::InvalidPly("Missing end_header".to_string()));
    }

    let prop_idx: HashMap<&str, usize> = prop_names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();

    let property = |name: &str| {
        prop_idx
            .get(name)
            .copied()
            .ok_or_else(|| LoaderError::MissingColumns(name.to_string()))
    };
    let x_idx = property("x")?;
    let y_idx = property("y")?;
    let z_idx = property("z")?;

    let mut cloud = PointCloud::with_capacity(num_vertices.min(MAX_PREALLOCATED_POINTS));
    let mut vertex_count = 0;
    for line in lines {
        if vertex_count >= num_vertices {
            break;
        }

        let line = line?;
        let values: Vec<&str> = line.split_whitespace().collect();

        if values.len() < prop_names.len() {
            continue;
        }

        let parse = |idx: usize| -> Result<f64> {
            values[idx]
                .parse()
                .map_err(|_| LoaderError::ParseError(format!("Invalid value: {}", values[idx])))
        };
        cloud.push(parse(x_idx)?, parse(y_idx)?, parse(z_idx)?);
        vertex_count += 1;
    }

    if vertex_count < num_vertices {
        return Err(LoaderError::InvalidPly(format!(
            "Expected {} vertices, found {}",
            num_vertices, vertex_count
        )));
    }

    Ok(cloud)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{Builder, NamedTempFile};

    fn temp_with_suffix(suffix: &str) -> NamedTempFile {
        Builder::new().suffix(suffix).tempfile().unwrap()
    }

    #[test]
    fn test_point_cloud_operations() {
        let mut cloud = PointCloud::new();
        assert!(cloud.is_empty());

        cloud.push(1.0, 2.0, 3.0);
        cloud.push(4.0, 5.0, 6.0);

        assert_eq!(cloud.len(), 2);
        assert_eq!(cloud.axis(1), &[2.0, 5.0]);

        let coords = cloud.to_coords();
        assert_eq!(coords[1], [4.0, 5.0, 6.0]);
        assert_eq!(PointCloud::from_coords(&coords), cloud);
    }

    #[test]
    fn test_load_pcd_ascii_with_intensity() -> Result<()> {
        let mut file = temp_with_suffix(".pcd");
        writeln!(file, "# .PCD v0.7 - Point Cloud Data file format").unwrap();
        writeln!(file, "VERSION 0.7").unwrap();
        writeln!(file, "FIELDS intensity x y z").unwrap();
        writeln!(file, "SIZE 4 4 4 4").unwrap();
        writeln!(file, "TYPE F F F F").unwrap();
        writeln!(file, "COUNT 1 1 1 1").unwrap();
        writeln!(file, "WIDTH 3").unwrap();
        writeln!(file, "HEIGHT 1").unwrap();
        writeln!(file, "VIEWPOINT 0 0 0 1 0 0 0").unwrap();
        writeln!(file, "POINTS 3").unwrap();
        writeln!(file, "DATA ascii").unwrap();
        writeln!(file, "7 1.0 2.0 3.0").unwrap();
        writeln!(file, "8 nan nan nan").unwrap();
        writeln!(file, "9 4.5 5.5 6.5").unwrap();
        file.flush().unwrap();

        let cloud = load_point_cloud(file.path())?;
        assert_eq!(cloud.len(), 2);
        assert_eq!(cloud.x, vec![1.0, 4.5]);
        assert_eq!(cloud.z, vec![3.0, 6.5]);
        Ok(())
    }

    #[test]
    fn test_load_pcd_rejects_binary() {
        let mut file = temp_with_suffix(".pcd");
        writeln!(file, "FIELDS x y z").unwrap();
        writeln!(file, "POINTS 1").unwrap();
        writeln!(file, "DATA binary").unwrap();
        file.flush().unwrap();

        assert!(matches!(
            load_pcd(file.path()),
            Err(LoaderError::Unsupported(_))
        ));
    }

    #[test]
    fn test_load_pcd_truncated() {
        let mut file = temp_with_suffix(".pcd");
        writeln!(file, "FIELDS x y z").unwrap();
        writeln!(file, "POINTS 3").unwrap();
        writeln!(file, "DATA ascii").unwrap();
        writeln!(file, "1 2 3").unwrap();
        file.flush().unwrap();

        assert!(matches!(load_pcd(file.path()), Err(LoaderError::InvalidPcd(_))));
    }

    #[test]
    fn test_load_pcd_oversized_point_count() {
        let mut file = temp_with_suffix(".pcd");
        writeln!(file, "FIELDS x y z").unwrap();
        writeln!(file, "POINTS 1000000000000000000").unwrap();
        writeln!(file, "DATA ascii").unwrap();
        writeln!(file, "1 2 3").unwrap();
        file.flush().unwrap();

        assert!(matches!(load_pcd(file.path()), Err(LoaderError::InvalidPcd(_))));
    }

    #[test]
    fn test_load_ply_oversized_vertex_count() {
        let mut file = temp_with_suffix(".ply");
        writeln!(file, "ply").unwrap();
        writeln!(file, "format ascii 1.0").unwrap();
        writeln!(file, "element vertex 1000000000000000000").unwrap();
        writeln!(file, "property float x").unwrap();
        writeln!(file, "property float y").unwrap();
        writeln!(file, "property float z").unwrap();
        writeln!(file, "end_header").unwrap();
        writeln!(file, "1.0 2.0 3.0").unwrap();
        file.flush().unwrap();

        assert!(load_ply(file.path()).is_err());
    }

    #[test]
    fn test_load_cartesian_csv() -> Result<()> {
        let mut file = temp_with_suffix(".csv");
        writeln!(file, "z,x,y").unwrap();
        writeln!(file, "3.0,1.0,2.0").unwrap();
        writeln!(file, "6.0,4.0,5.0").unwrap();
        file.flush().unwrap();

        let cloud = load_point_cloud(file.path())?;
        assert_eq!(cloud.len(), 2);
        assert_eq!(cloud.x[0], 1.0);
        assert_eq!(cloud.y[0], 2.0);
        assert_eq!(cloud.z[0], 3.0);
        Ok(())
    }

    #[test]
    fn test_load_ply() -> Result<()> {
        let mut file = temp_with_suffix(".ply");
        writeln!(file, "ply").unwrap();
        writeln!(file, "format ascii 1.0").unwrap();
        writeln!(file, "element vertex 2").unwrap();
        writeln!(file, "property float x").unwrap();
        writeln!(file, "property float y").unwrap();
        writeln!(file, "property float z").unwrap();
        writeln!(file, "property uchar red").unwrap();
        writeln!(file, "end_header").unwrap();
        writeln!(file, "1.0 2.0 3.0 255").unwrap();
        writeln!(file, "4.0 5.0 6.0 0").unwrap();
        file.flush().unwrap();

        let cloud = load_ply(file.path())?;
        assert_eq!(cloud.len(), 2);
        assert_eq!(cloud.y[1], 5.0);
        Ok(())
    }

    #[test]
    fn test_unknown_extension() {
        let file = temp_with_suffix(".las");
        assert!(matches!(
            load_point_cloud(file.path()),
            Err(LoaderError::Unsupported(_))
        ));
    }
}
