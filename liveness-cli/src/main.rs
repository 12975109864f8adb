mod args;
mod config;
mod input;
mod types;

use std::{
    fs::{self, File},
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::Parser;
use liveness_core::{
    LivenessError, LivenessReport, LivenessScorer, LivenessVerdict, ModelRegistry,
    OnnxClassifierLoader,
};
use liveness_utils::{configure_telemetry, init_logging, normalize_path};
use log::{info, warn};

use crate::{
    args::ScoreArgs,
    config::{apply_cli_overrides, load_settings},
    input::{collect_images, input_extensions, read_input},
    types::ScoreRecord,
};

fn main() -> Result<()> {
    init_logging(log::LevelFilter::Info)?;
    let args = ScoreArgs::parse();

    let mut settings = load_settings(args.config.as_ref())?;
    apply_cli_overrides(&mut settings, &args);
    settings.validate()?;
    configure_telemetry(
        settings.telemetry.enabled,
        settings.telemetry.level_filter(),
    );

    let input_path = normalize_path(&args.input)?;
    let images = collect_images(&input_path, input_extensions(args.base64))?;
    if images.is_empty() {
        anyhow::bail!(
            "no images found at {} (supported extensions: {})",
            input_path.display(),
            input_extensions(args.base64).join(", ")
        );
    }

    let registry = match ModelRegistry::discover(&settings.model_dir, Arc::new(OnnxClassifierLoader))
    {
        Ok(registry) => registry,
        Err(err) => {
            warn!("{err}; every image will be reported without a verdict");
            ModelRegistry::from_entries(&settings.model_dir, Vec::new())
        }
    };
    let scorer = LivenessScorer::from_settings(&settings);
    info!(
        "Scoring {} image(s) with {} model(s), detector {}",
        images.len(),
        registry.len(),
        settings.detector_path
    );

    let mut results = Vec::with_capacity(images.len());
    for image_path in images {
        let report = match read_input(&image_path, args.base64) {
            Ok(image) => LivenessReport::from(scorer.score(&image, &registry)),
            Err(err) => LivenessReport::from(Err::<LivenessVerdict, _>(
                LivenessError::UndecodableImage(format!("{err:#}")),
            )),
        };
        match &report {
            LivenessReport::Verdict(verdict) => info!(
                "{} -> {} ({:.4})",
                image_path.display(),
                verdict.label,
                verdict.score
            ),
            LivenessReport::Error { error } => {
                warn!("Failed to score {}: {error}", image_path.display())
            }
        }
        results.push(ScoreRecord {
            image: image_path.display().to_string(),
            report,
        });
    }

    if let Some(json_path) = args.json.as_ref() {
        if let Some(dir) = json_path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create directory {}", dir.display()))?;
        }
        let file = File::create(json_path)
            .with_context(|| format!("failed to create {}", json_path.display()))?;
        serde_json::to_writer_pretty(file, &results)
            .with_context(|| format!("failed to write results to {}", json_path.display()))?;
        info!("Wrote results to {}", json_path.display());
    } else {
        let json = serde_json::to_string_pretty(&results).context("failed to serialize results")?;
        println!("{json}");
    }

    Ok(())
}
