//! Command-line argument definitions for liveness-cli.

use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Score face images for liveness with an ensemble of anti-spoofing models.
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct ScoreArgs {
    /// Path to an image file or a directory containing images.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Directory holding the anti-spoofing ONNX models (defaults to settings file).
    #[arg(short, long)]
    pub models: Option<PathBuf>,

    /// Path to the YuNet face detector ONNX model (defaults to settings file).
    #[arg(short, long)]
    pub detector: Option<PathBuf>,

    /// Optional settings JSON. Defaults to `config/liveness_settings.json` when present, otherwise built-in parameters.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Treat input files as base64 text payloads (data-URL prefixes are accepted).
    #[arg(long, action = ArgAction::SetTrue)]
    pub base64: bool,

    /// Evaluate the models of each image concurrently.
    #[arg(long, action = ArgAction::SetTrue)]
    pub parallel: bool,

    /// Override the divisor applied to the winning class sum.
    #[arg(long)]
    pub score_divisor: Option<f64>,

    /// Override the larger side of the image the detector runs on.
    #[arg(long)]
    pub working_size: Option<u32>,

    /// Abort an image when its models have not finished within this many milliseconds.
    #[arg(long)]
    pub max_latency_ms: Option<u64>,

    /// Override the detector score threshold.
    #[arg(long)]
    pub score_threshold: Option<f32>,

    /// Enable telemetry timing logs (defaults to settings file).
    #[arg(long, action = ArgAction::SetTrue)]
    pub telemetry: bool,

    /// Override telemetry logging level (error, warn, info, debug, trace).
    #[arg(long, value_name = "LEVEL")]
    pub telemetry_level: Option<String>,

    /// Write results to a JSON file instead of stdout.
    #[arg(long)]
    pub json: Option<PathBuf>,
}
