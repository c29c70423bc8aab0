//! Command-line interface for the segmentation pipeline.

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::core::image::BoundingBox;
use crate::core::writers::write_mask_csv;
use crate::processors::segmentation::{
    self, image_dimensions, load_calibration, resolve_mask, MaskSource, SegmentationSummary,
};
use crate::processors::TableCache;
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "lidar-seg")]
#[command(about = "Reflective-image-guided LiDAR point cloud segmentation", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Image-plane rows (overrides metadata and config)
    #[arg(long, global = true)]
    rows: Option<usize>,

    /// Image-plane columns (overrides metadata and config)
    #[arg(long, global = true)]
    columns: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the pixel-to-point lookup table and write it as CSV
    Lut {
        /// Sensor metadata JSON
        metadata: PathBuf,
        /// Output CSV file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Build an image-plane mask and write it as a 0/1 CSV grid
    Mask {
        /// Sensor metadata JSON (gives the image size)
        metadata: PathBuf,
        #[command(flatten)]
        source: MaskArgs,
        /// Output CSV file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Segment a native-order point cloud (PLY or CSV) with a mask
    Segment {
        /// Sensor metadata JSON
        metadata: PathBuf,
        /// Point cloud in the sensor's native ordering
        cloud: PathBuf,
        #[command(flatten)]
        source: MaskArgs,
        /// Output directory for PLY files
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,
        /// Output file name prefix
        #[arg(long, default_value = "scan")]
        prefix: String,
        /// Also write CSV outputs
        #[arg(long)]
        csv: bool,
    },

    /// Segment straight from a range image through the XYZ ray table
    Project {
        /// Sensor metadata JSON
        metadata: PathBuf,
        /// Range image as a CSV grid
        range: PathBuf,
        #[command(flatten)]
        source: MaskArgs,
        /// Output directory for PLY files
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,
        /// Output file name prefix
        #[arg(long, default_value = "scan")]
        prefix: String,
        /// Multiplier from range pixel values to millimetres
        #[arg(long)]
        range_scale: Option<f32>,
        /// Also write CSV outputs
        #[arg(long)]
        csv: bool,
    },
}

/// Exactly one way of describing the mask.
#[derive(Args)]
#[group(required = true, multiple = false)]
struct MaskArgs {
    /// Mask as a CSV grid, non-zero cells selected
    #[arg(long)]
    mask: Option<PathBuf>,
    /// Half-open bounding box in image pixels
    #[arg(long, num_args = 4, value_names = ["TOP", "LEFT", "BOTTOM", "RIGHT"])]
    bbox: Option<Vec<usize>>,
    /// Pose keypoints CSV (x, y, confidence), drawn as a limb
    #[arg(long)]
    keypoints: Option<PathBuf>,
}

impl MaskArgs {
    fn into_source(self) -> Option<MaskSource> {
        if let Some(path) = self.mask {
            return Some(MaskSource::File(path));
        }
        if let Some(path) = self.keypoints {
            return Some(MaskSource::Keypoints(path));
        }
        match self.bbox.as_deref() {
            Some(&[top, left, bottom, right]) => {
                Some(MaskSource::BoundingBox(BoundingBox::new(top, left, bottom, right)))
            }
            _ => None,
        }
    }
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

fn mask_source_or_exit(source: MaskArgs) -> MaskSource {
    match source.into_source() {
        Some(source) => source,
        None => {
            error!("--bbox takes exactly four values: TOP LEFT BOTTOM RIGHT");
            std::process::exit(1);
        }
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

    // Load config
    let mut config = match &cli.config {
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

    config.sensor.rows = cli.rows.or(config.sensor.rows);
    config.sensor.columns = cli.columns.or(config.sensor.columns);

    // Dispatch to subcommands
    match cli.command {
        Commands::Lut { metadata, output } => {
            cmd_lut(&metadata, &output, &config);
        }
        Commands::Mask { metadata, source, output } => {
            cmd_mask(&metadata, mask_source_or_exit(source), &output, &config);
        }
        Commands::Segment { metadata, cloud, source, output_dir, prefix, csv } => {
            config.output.write_csv |= csv;
            cmd_segment(&metadata, &cloud, mask_source_or_exit(source), &output_dir, &prefix, &config);
        }
        Commands::Project { metadata, range, source, output_dir, prefix, range_scale, csv } => {
            config.output.write_csv |= csv;
            if let Some(scale) = range_scale {
                config.sensor.range_scale = scale;
            }
            cmd_project(&metadata, &range, mask_source_or_exit(source), &output_dir, &prefix, &config);
        }
    }
}

fn cmd_lut(metadata: &Path, output: &Path, config: &PipelineConfig) {
    let start = Instant::now();

    println!("Building lookup table...");
    println!("Metadata: {}", metadata.display());

    let spinner = create_spinner("Computing pixel-to-point mapping...");

    match segmentation::export_lookup_table(metadata, output, &config.sensor) {
        Ok(table) => {
            spinner.finish_and_clear();

            let (rows, columns) = table.dims();
            print_summary(
                "Lookup Table Complete",
                &[
                    ("Sensor model", table.key().sensor_model.clone()),
                    ("Resolution", format!("{}x{}", rows, columns)),
                    ("Mapped pixels", table.valid_count().to_string()),
                    ("Sentinel pixels", table.sentinel_count().to_string()),
                    ("Output file", output.display().to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => {
            spinner.finish_and_clear();
            error!("Lookup table build failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_mask(metadata: &Path, source: MaskSource, output: &Path, config: &PipelineConfig) {
    let start = Instant::now();

    let result = load_calibration(metadata).and_then(|calibration| {
        let (rows, columns) = image_dimensions(&calibration, &config.sensor);
        let mask = resolve_mask(&source, rows, columns, &config.mask)?;
        write_mask_csv(output, &mask)?;
        Ok(mask)
    });

    match result {
        Ok(mask) => {
            print_summary(
                "Mask Complete",
                &[
                    ("Resolution", format!("{}x{}", mask.rows(), mask.columns())),
                    ("Selected pixels", mask.count().to_string()),
                    ("Output file", output.display().to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => {
            error!("Mask build failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_segment(
    metadata: &Path,
    cloud: &Path,
    source: MaskSource,
    output_dir: &Path,
    prefix: &str,
    config: &PipelineConfig,
) {
    let start = Instant::now();

    println!("Segmenting point cloud...");
    println!("Input: {}", cloud.display());
    println!("Output directory: {}", output_dir.display());

    let spinner = create_spinner("Applying mask through lookup table...");
    let cache = TableCache::new();

    match segmentation::segment_files(metadata, cloud, &source, output_dir, prefix, config, &cache) {
        Ok(summary) => {
            spinner.finish_and_clear();
            report("Segmentation Complete", &summary, start);
        }
        Err(e) => {
            spinner.finish_and_clear();
            error!("Segmentation failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_project(
    metadata: &Path,
    range: &Path,
    source: MaskSource,
    output_dir: &Path,
    prefix: &str,
    config: &PipelineConfig,
) {
    let start = Instant::now();

    println!("Projecting range image...");
    println!("Input: {}", range.display());
    println!("Output directory: {}", output_dir.display());
    println!("Range scale: {}", config.sensor.range_scale);

    let spinner = create_spinner("Projecting masked pixels...");

    match segmentation::project_files(metadata, range, &source, output_dir, prefix, config) {
        Ok(summary) => {
            spinner.finish_and_clear();
            report("Projection Complete", &summary, start);
        }
        Err(e) => {
            spinner.finish_and_clear();
            error!("Projection failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn report(title: &str, summary: &SegmentationSummary, start: Instant) {
    let mut outputs: Vec<String> = summary.outputs.values().map(|p| p.display().to_string()).collect();
    outputs.sort();

    print_summary(
        title,
        &[
            ("Sensor model", summary.sensor_model.clone()),
            ("Resolution", format!("{}x{}", summary.rows, summary.columns)),
            ("Original points", summary.original_points.to_string()),
            ("Masked pixels", summary.masked_pixels.to_string()),
            ("Segmented points", summary.segmented_points.to_string()),
            ("Output files", outputs.join(", ")),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
}
