//! Configuration loading and CLI override logic.

use std::path::PathBuf;

use anyhow::{Context, Result};
use liveness_utils::{
    config::{AppSettings, default_settings_path},
    normalize_path,
};
use log::info;

use crate::args::ScoreArgs;

/// Load application settings from a file or use defaults.
pub fn load_settings(config_path: Option<&PathBuf>) -> Result<AppSettings> {
    if let Some(path) = config_path {
        let resolved = normalize_path(path)?;
        let settings = AppSettings::load_from_path(&resolved)?;
        info!("Loaded settings from {}", resolved.display());
        Ok(settings)
    } else {
        let default_path = default_settings_path();
        if default_path.exists() {
            let settings = AppSettings::load_from_path(&default_path).with_context(|| {
                format!(
                    "failed to load default settings from {}",
                    default_path.display()
                )
            })?;
            info!("Loaded settings from {}", default_path.display());
            Ok(settings)
        } else {
            Ok(AppSettings::default())
        }
    }
}

/// Apply command-line arguments to override loaded or default settings.
pub fn apply_cli_overrides(settings: &mut AppSettings, args: &ScoreArgs) {
    if let Some(models) = args.models.as_ref() {
        settings.model_dir = models.display().to_string();
    }
    if let Some(detector) = args.detector.as_ref() {
        settings.detector_path = detector.display().to_string();
    }

    if args.telemetry {
        settings.telemetry.enabled = true;
    }
    if let Some(level) = args.telemetry_level.as_ref() {
        let normalized = level.trim();
        if !normalized.is_empty() {
            let lower = normalized.to_ascii_lowercase();
            settings.telemetry.level = lower.clone();
            if lower == "off" {
                settings.telemetry.enabled = false;
            }
        }
    }

    if args.parallel {
        settings.ensemble.parallel = true;
    }
    if let Some(divisor) = args.score_divisor {
        settings.scoring.score_divisor = divisor;
    }
    if let Some(budget) = args.max_latency_ms {
        settings.scoring.max_latency_ms = Some(budget);
    }
    if let Some(size) = args.working_size {
        settings.locator.working_size = size;
    }
    if let Some(score) = args.score_threshold {
        settings.detector.detection.score_threshold = score;
    }
}
