//! Command-line interface for wheel box detection.

use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::BoxStrategyKind;
use crate::core::types::BoxSet;
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "axle-detect")]
#[command(about = "Wheel and axle bounding boxes from LiDAR side profiles", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect wheel boxes in one point cloud and print them
    Detect {
        /// Input point cloud (.pcd, .ply or .csv)
        file: PathBuf,
        /// Also write the label JSON to this path
        #[arg(long)]
        json: Option<PathBuf>,
        /// Write wheel points and their cluster labels to this CSV
        #[arg(long)]
        wheel_points: Option<PathBuf>,
        #[command(flatten)]
        overrides: Overrides,
    },

    /// Export label JSON for every point cloud under a directory.
    ///
    /// Boxes are written in 3D (with lateral depth) unless --flat is given.
    Export {
        /// Directory searched recursively for point clouds
        input_dir: PathBuf,
        /// Output directory for label files
        #[arg(short, long, default_value = "exports")]
        output_dir: PathBuf,
        /// File extension to match (defaults to the configured one)
        #[arg(long)]
        extension: Option<String>,
        /// Write 2D boxes (length and height only)
        #[arg(long, conflicts_with = "three_d")]
        flat: bool,
        #[command(flatten)]
        overrides: Overrides,
    },

    /// Render a detection overlay as PNG
    Visualize {
        /// Input point cloud (.pcd, .ply or .csv)
        file: PathBuf,
        /// Output PNG file path (defaults to the input name with .png extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        overrides: Overrides,
    },

    /// Write the default configuration as YAML
    InitConfig {
        /// Destination YAML file
        path: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StrategyArg {
    /// Boxes over slope-expanded dip regions
    Dips,
    /// Square boxes over raw cluster extents
    ClusterExtent,
}

impl From<StrategyArg> for BoxStrategyKind {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Dips => BoxStrategyKind::Dips,
            StrategyArg::ClusterExtent => BoxStrategyKind::ClusterExtent,
        }
    }
}

/// Per-run overrides of the loaded configuration.
#[derive(Args, Debug, Default)]
struct Overrides {
    /// Clearance band above the lowest silhouette point
    #[arg(long)]
    clearance: Option<f64>,
    /// DBSCAN neighborhood radius
    #[arg(long)]
    eps: Option<f64>,
    /// DBSCAN minimum neighborhood size
    #[arg(long)]
    min_samples: Option<usize>,
    /// Box assembly strategy
    #[arg(long, value_enum)]
    strategy: Option<StrategyArg>,
    /// Add lateral depth to every box
    #[arg(long = "3d")]
    three_d: bool,
}

impl Overrides {
    fn apply(&self, config: &PipelineConfig) -> PipelineConfig {
        let mut config = config.clone();
        if let Some(clearance) = self.clearance {
            config.detection.min_clearance = clearance;
        }
        if let Some(eps) = self.eps {
            config.detection.dbscan_epsilon = eps;
        }
        if let Some(min_samples) = self.min_samples {
            config.detection.dbscan_min_samples = min_samples;
        }
        if let Some(strategy) = self.strategy {
            config.boxes.strategy = strategy.into();
        }
        if self.three_d {
            config.boxes.three_d = true;
        }
        config
    }
}

/// Configuration for `export`: overrides applied, 3D boxes unless `flat`.
fn export_config(
    config: &PipelineConfig,
    overrides: &Overrides,
    extension: Option<&str>,
    flat: bool,
) -> PipelineConfig {
    let mut config = overrides.apply(config);
    config.boxes.three_d = !flat;
    if let Some(ext) = extension {
        config.export.extension = ext.trim_start_matches('.').to_string();
    }
    config
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn create_progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} frames",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            format!("{}...", value.chars().take(36).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

fn print_boxes(boxes: &BoxSet) {
    if boxes.is_empty() {
        println!("No wheel boxes detected");
        return;
    }
    for (label, bbox) in boxes {
        let fmt = |v: Vec<f64>| {
            v.iter()
                .map(|c| format!("{:.3}", c))
                .collect::<Vec<_>>()
                .join(", ")
        };
        println!(
            "wheel {:>2}: anchor [{}]  extent [{}]",
            label,
            fmt(bbox.anchor_components()),
            fmt(bbox.extent())
        );
    }
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    let config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("Failed to load config from {}: {}, using defaults", path.display(), e);
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::default(),
    };

    match cli.command {
        Commands::Detect {
            file,
            json,
            wheel_points,
            overrides,
        } => {
            cmd_detect(
                &file,
                json.as_deref(),
                wheel_points.as_deref(),
                &overrides.apply(&config),
            );
        }
        Commands::Export {
            input_dir,
            output_dir,
            extension,
            flat,
            overrides,
        } => {
            let config = export_config(&config, &overrides, extension.as_deref(), flat);
            cmd_export(&input_dir, &output_dir, &config);
        }
        Commands::Visualize { file, output, overrides } => {
            cmd_visualize(&file, output, &overrides.apply(&config));
        }
        Commands::InitConfig { path } => {
            cmd_init_config(&path);
        }
    }
}

fn cmd_detect(
    file: &Path,
    json: Option<&Path>,
    wheel_points: Option<&Path>,
    config: &PipelineConfig,
) {
    use crate::core::{loaders, writers};
    use crate::processors::pipeline;

    let start = Instant::now();
    let spinner = create_spinner("Loading point cloud...");

    let cloud = match loaders::load_point_cloud(file) {
        Ok(c) => c,
        Err(e) => {
            spinner.finish_and_clear();
            error!("Failed to load {}: {}", file.display(), e);
            std::process::exit(1);
        }
    };

    spinner.set_message("Detecting wheels...");
    let detection = match pipeline::detect(&cloud, config) {
        Ok(d) => d,
        Err(e) => {
            spinner.finish_and_clear();
            error!("Detection failed: {}", e);
            std::process::exit(1);
        }
    };
    spinner.finish_and_clear();

    print_boxes(&detection.boxes);

    if let Some(path) = json {
        let name = file
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let labels =
            writers::LabelFile::from_boxes(name, &detection.boxes, &config.export.class_tag);
        if let Err(e) = writers::write_label_json(path, &labels) {
            error!("{}", e);
            std::process::exit(1);
        }
    }
    if let Some(path) = wheel_points {
        if let Err(e) =
            writers::write_wheel_points_csv(path, &detection.wheel_points, &detection.labels)
        {
            error!("{}", e);
            std::process::exit(1);
        }
    }

    print_summary(
        "Detection Complete",
        &[
            ("Input file", file.display().to_string()),
            ("Points", cloud.len().to_string()),
            ("Silhouette", detection.silhouette.len().to_string()),
            ("Wheel points", detection.wheel_points.len().to_string()),
            ("Clusters", detection.cluster_count().to_string()),
            ("Boxes", detection.boxes.len().to_string()),
            ("Strategy", format!("{:?}", config.boxes.strategy)),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
}

fn cmd_export(input_dir: &Path, output_dir: &Path, config: &PipelineConfig) {
    use crate::processors::pipeline;

    let start = Instant::now();

    println!("Exporting labels...");
    println!("Input directory: {}", input_dir.display());
    println!("Output directory: {}", output_dir.display());

    let total = pipeline::find_point_clouds(input_dir, &config.export.extension)
        .map(|files| files.len())
        .unwrap_or(0);
    let pb = create_progress_bar(total as u64);

    let summary = match pipeline::export_directory(input_dir, output_dir, config, |_| pb.inc(1)) {
        Ok(s) => s,
        Err(e) => {
            pb.finish_and_clear();
            error!("Export failed: {:#}", e);
            std::process::exit(1);
        }
    };
    pb.finish_and_clear();

    for (path, reason) in &summary.skipped {
        println!("Skipped {}: {}", path.display(), reason);
    }

    print_summary(
        "Export Complete",
        &[
            ("Input directory", input_dir.display().to_string()),
            ("Output directory", output_dir.display().to_string()),
            ("Frames", summary.frames().to_string()),
            ("Exported", summary.exported.len().to_string()),
            ("Skipped", summary.skipped.len().to_string()),
            ("Boxes", summary.total_boxes.to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
}

fn cmd_visualize(file: &Path, output: Option<PathBuf>, config: &PipelineConfig) {
    use crate::core::loaders;
    use crate::processors::pipeline;
    use crate::visualization;

    let start = Instant::now();

    let output_path = output.unwrap_or_else(|| file.with_extension("png"));

    println!("Visualizing detection...");
    println!("Input: {}", file.display());
    println!("Output: {}", output_path.display());

    let spinner = create_spinner("Loading point cloud...");

    let cloud = match loaders::load_point_cloud(file) {
        Ok(c) => c,
        Err(e) => {
            spinner.finish_and_clear();
            error!("Failed to load {}: {}", file.display(), e);
            std::process::exit(1);
        }
    };

    spinner.set_message("Detecting wheels...");
    let detection = match pipeline::detect(&cloud, config) {
        Ok(d) => d,
        Err(e) => {
            spinner.finish_and_clear();
            error!("Detection failed: {}", e);
            std::process::exit(1);
        }
    };

    spinner.set_message("Generating plot...");
    match visualization::plot_detection(&output_path, &cloud, &detection, &config.axes) {
        Ok(()) => {
            spinner.finish_and_clear();

            print_summary(
                "Visualization Complete",
                &[
                    ("Input file", file.display().to_string()),
                    ("Output PNG", output_path.display().to_string()),
                    ("Points in cloud", cloud.len().to_string()),
                    ("Boxes", detection.boxes.len().to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => {
            spinner.finish_and_clear();
            error!("Visualization failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_init_config(path: &Path) {
    if path.exists() {
        error!("Refusing to overwrite existing file {}", path.display());
        std::process::exit(1);
    }
    match PipelineConfig::default().to_yaml(path) {
        Ok(()) => println!("Wrote default configuration to {}", path.display()),
        Err(e) => {
            error!("Failed to write {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}
