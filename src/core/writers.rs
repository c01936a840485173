//! Data writers for label export.
//!
//! This module provides functions for writing detection results:
//! - JSON label files, one per input frame, for labeling tools and training
//! - CSV dumps of the wheel points with their cluster labels

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{BoxSet, WheelPointSet};

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error.
    #[error("JSON write error for '{path}': {source}")]
    JsonError {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },

    /// Mismatched array lengths.
    #[error("length mismatch: {points_len} wheel points, {labels_len} labels")]
    LengthMismatch { points_len: usize, labels_len: usize },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// One exported box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxRecord {
    pub id: String,
    pub anchor: Vec<f64>,
    pub extent: Vec<f64>,
    pub class: String,
}

/// All boxes of one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelFile {
    /// File name of the source point cloud
    pub name: String,
    pub boxes: Vec<BoxRecord>,
}

impl LabelFile {
    /// Build the export record for a frame. Boxes keep label order.
    pub fn from_boxes(name: impl Into<String>, boxes: &BoxSet, class_tag: &str) -> Self {
        let boxes = boxes
            .iter()
            .map(|(label, bbox)| BoxRecord {
                id: label.to_string(),
                anchor: bbox.anchor_components(),
                extent: bbox.extent(),
                class: class_tag.to_string(),
            })
            .collect();
        Self {
            name: name.into(),
            boxes,
        }
    }
}

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Creates a buffered writer for the given path.
fn create_buffered_writer(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(BufWriter::new(file))
}

/// Write a frame's labels as pretty-printed JSON.
///
/// # Example
///
/// ```no_run
/// use axle_detect::core::writers::{write_label_json, LabelFile};
/// use axle_detect::BoxSet;
/// use std::path::Path;
///
/// let labels = LabelFile::from_boxes("frame.pcd", &BoxSet::new(), "feature");
/// write_label_json(Path::new("exports/frame_labels.json"), &labels).unwrap();
/// ```
pub fn write_label_json(path: &Path, labels: &LabelFile) -> Result<()> {
    ensure_parent_dirs(path)?;
    let mut writer = create_buffered_writer(path)?;
    let path_str = path.display().to_string();

    serde_json::to_writer_pretty(&mut writer, labels).map_err(|e| WriteError::JsonError {
        path: path_str.clone(),
        source: e,
    })?;
    writeln!(writer).map_err(|e| WriteError::WriteFile {
        path: path_str.clone(),
        source: e,
    })?;
    writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(())
}

/// Write wheel points and their cluster labels to CSV.
///
/// Creates a CSV file with headers "position,height,label".
pub fn write_wheel_points_csv(path: &Path, points: &WheelPointSet, labels: &[i32]) -> Result<()> {
    if points.len() != labels.len() {
        return Err(WriteError::LengthMismatch {
            points_len: points.len(),
            labels_len: labels.len(),
        });
    }

    ensure_parent_dirs(path)?;
    let buf_writer = create_buffered_writer(path)?;
    let mut csv_writer = csv::Writer::from_writer(buf_writer);
    let path_str = path.display().to_string();

    csv_writer
        .write_record(["position", "height", "label"])
        .map_err(|e| WriteError::CsvError {
            path: path_str.clone(),
            source: e,
        })?;

    for (i, label) in labels.iter().enumerate() {
        let [x, y] = points.point(i);
        csv_writer
            .write_record(&[format!("{:.6}", x), format!("{:.6}", y), label.to_string()])
            .map_err(|e| WriteError::CsvError {
                path: path_str.clone(),
                source: e,
            })?;
    }

    csv_writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(())
}
