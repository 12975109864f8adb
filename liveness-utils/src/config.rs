//! Shared configuration types consumed across the liveness workspace.
//!
//! These structures describe where models live and how the detector, locator,
//! ensemble, and decision rule behave. They serialize to JSON so a deployment
//! can pin its parameters in a settings file.

use anyhow::{Context, Result};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::{
    env, fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

/// Post-processing parameters for the face detector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectionSettings {
    /// Minimum confidence for a detection to become a locator candidate.
    pub score_threshold: f32,
    /// Threshold for non-maximum suppression to merge overlapping bounding boxes.
    pub nms_threshold: f32,
    /// The maximum number of detections kept after sorting by score.
    pub top_k: usize,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            score_threshold: 0.6,
            nms_threshold: 0.3,
            top_k: 5_000,
        }
    }
}

/// Resize filter preference used when fitting images to the detector input.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResizeQuality {
    /// Preserve visual quality when resizing (Triangle filter).
    #[default]
    Quality,
    /// Prioritize throughput (Nearest filter).
    Speed,
}

impl fmt::Display for ResizeQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResizeQuality::Quality => "quality",
            ResizeQuality::Speed => "speed",
        })
    }
}

impl FromStr for ResizeQuality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quality" => Ok(ResizeQuality::Quality),
            "speed" => Ok(ResizeQuality::Speed),
            other => Err(format!(
                "invalid resize quality '{other}'; expected 'quality' or 'speed'"
            )),
        }
    }
}

/// Detector input resolution in pixels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InputDimensions {
    pub width: u32,
    pub height: u32,
    /// Choose between quality-focused or speed-focused resizing.
    pub resize_quality: ResizeQuality,
}

impl Default for InputDimensions {
    fn default() -> Self {
        Self {
            width: 640,
            height: 640,
            resize_quality: ResizeQuality::Quality,
        }
    }
}

/// Face detector backend settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectorSettings {
    pub input: InputDimensions,
    pub detection: DetectionSettings,
}

/// Face locator settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LocatorSettings {
    /// Images with at least `working_size²` pixels are downscaled so their larger
    /// side equals this value before detection.
    pub working_size: u32,
}

impl Default for LocatorSettings {
    fn default() -> Self {
        Self { working_size: 192 }
    }
}

/// Input validation and decision-rule settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoringSettings {
    /// Required width/height ratio of incoming images.
    pub aspect_ratio: f64,
    /// Allowed absolute deviation from `aspect_ratio`.
    pub aspect_tolerance: f64,
    /// Divisor applied to the winning class sum. Kept at 2 for compatibility with
    /// deployments that always register exactly two models.
    pub score_divisor: f64,
    /// Optional latency budget per request in milliseconds.
    pub max_latency_ms: Option<u64>,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            aspect_ratio: 4.0 / 3.0,
            aspect_tolerance: 0.01,
            score_divisor: 2.0,
            max_latency_ms: None,
        }
    }
}

/// Classifier ensemble settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EnsembleSettings {
    /// Evaluate registered models concurrently.
    pub parallel: bool,
}

/// Settings controlling optional runtime telemetry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Whether telemetry timing logs are enabled.
    pub enabled: bool,
    /// Logging level for telemetry output (error, warn, info, debug, trace).
    pub level: String,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            level: "debug".to_string(),
        }
    }
}

impl TelemetrySettings {
    /// Resolve the configured level string into a `LevelFilter`.
    pub fn level_filter(&self) -> LevelFilter {
        match self.level.trim().to_ascii_lowercase().as_str() {
            "off" => LevelFilter::Off,
            "error" => LevelFilter::Error,
            "warn" | "warning" => LevelFilter::Warn,
            "info" => LevelFilter::Info,
            "trace" => LevelFilter::Trace,
            _ => LevelFilter::Debug,
        }
    }
}

/// Persistent settings for the scoring pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Directory scanned for anti-spoofing classifier models.
    pub model_dir: String,
    /// Path to the face detector ONNX model.
    pub detector_path: String,
    pub detector: DetectorSettings,
    pub locator: LocatorSettings,
    pub scoring: ScoringSettings,
    pub ensemble: EnsembleSettings,
    pub telemetry: TelemetrySettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            model_dir: "resources/anti_spoof_models".into(),
            detector_path: "models/face_detection_yunet_2023mar_640.onnx".into(),
            detector: DetectorSettings::default(),
            locator: LocatorSettings::default(),
            scoring: ScoringSettings::default(),
            ensemble: EnsembleSettings::default(),
            telemetry: TelemetrySettings::default(),
        }
    }
}

impl AppSettings {
    /// Load settings from a JSON file. Missing fields take their defaults.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        let settings: AppSettings = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse settings JSON at {}", path.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Serialize settings to disk in pretty-printed JSON, overwriting any existing file.
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let payload =
            serde_json::to_string_pretty(self).context("failed to serialize settings JSON")?;
        fs::write(path, payload)
            .with_context(|| format!("failed to write settings file {}", path.display()))?;
        Ok(())
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.locator.working_size > 0,
            "locator.working_size must be greater than zero"
        );
        anyhow::ensure!(
            self.scoring.aspect_ratio.is_finite() && self.scoring.aspect_ratio > 0.0,
            "scoring.aspect_ratio must be a positive number"
        );
        anyhow::ensure!(
            self.scoring.aspect_tolerance.is_finite() && self.scoring.aspect_tolerance >= 0.0,
            "scoring.aspect_tolerance must be non-negative"
        );
        anyhow::ensure!(
            self.scoring.score_divisor.is_finite() && self.scoring.score_divisor > 0.0,
            "scoring.score_divisor must be a positive number"
        );
        anyhow::ensure!(
            self.detector.input.width > 0 && self.detector.input.height > 0,
            "detector input dimensions must be greater than zero"
        );
        Ok(())
    }
}

/// Returns the default settings location (`config/liveness_settings.json`).
pub fn default_settings_path() -> PathBuf {
    env::current_dir()
        .map(|dir| dir.join("config/liveness_settings.json"))
        .unwrap_or_else(|_| PathBuf::from("config/liveness_settings.json"))
}
