//! Input collection and decoding.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use image::DynamicImage;
use liveness_utils::{decode_base64_image, load_image};
use log::debug;
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp"];
const BASE64_EXTENSIONS: &[&str] = &["b64", "base64", "txt"];

/// Extensions collected from directories for the given input mode.
pub fn input_extensions(base64: bool) -> &'static [&'static str] {
    if base64 {
        BASE64_EXTENSIONS
    } else {
        IMAGE_EXTENSIONS
    }
}

/// Collect all input paths from a file or directory.
///
/// A file is returned as is; a directory is walked recursively for files with
/// one of `exts`, sorted by path.
pub fn collect_images(path: &Path, exts: &[&str]) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    if !path.is_dir() {
        anyhow::bail!(
            "input path is neither file nor directory: {}",
            path.display()
        );
    }

    let mut images = Vec::new();
    for entry in WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
    {
        if let Some(ext) = entry.path().extension().and_then(|e| e.to_str()) {
            let ext_lower = ext.to_ascii_lowercase();
            if exts.contains(&ext_lower.as_str()) {
                images.push(entry.path().to_path_buf());
            } else {
                debug!("Skipping non-image file {}", entry.path().display());
            }
        }
    }
    images.sort();
    Ok(images)
}

/// Read and decode one input, either an image file or a base64 text payload.
pub fn read_input(path: &Path, base64: bool) -> Result<DynamicImage> {
    if base64 {
        let payload = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        decode_base64_image(&payload)
            .with_context(|| format!("invalid base64 image in {}", path.display()))
    } else {
        load_image(path)
    }
}
