//! Classifier model naming convention.
//!
//! Anti-spoofing models are discovered by file name. The stem encodes how the
//! model must be fed:
//!
//! ```text
//! 2.7_80x80_MiniFASNetV2      scale 2.7, 80x80 input, MiniFASNetV2
//! 4_0_0_80x80_MiniFASNetV1SE  scale 4 (trailing scale segments are ignored)
//! org_1_80x60_MiniFASNetV1SE  whole-frame input, 80 high x 60 wide
//! 80x80_MiniFASNetV1          whole-frame input
//! ```
//!
//! The dimension segment is `HEIGHTxWIDTH`.

use std::{fmt, path::Path, str::FromStr};

use crate::error::LivenessError;

/// File extensions recognised as classifier models.
pub const MODEL_EXTENSIONS: &[&str] = &["onnx"];

/// Leading segment marking a model that takes the whole frame instead of a face crop.
const WHOLE_FRAME_MARKER: &str = "org";

/// Known classifier architectures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture {
    MiniFasNetV1,
    MiniFasNetV2,
    MiniFasNetV1Se,
    MiniFasNetV2Se,
}

impl Architecture {
    /// Canonical tag as it appears in file names.
    pub fn tag(self) -> &'static str {
        match self {
            Architecture::MiniFasNetV1 => "MiniFASNetV1",
            Architecture::MiniFasNetV2 => "MiniFASNetV2",
            Architecture::MiniFasNetV1Se => "MiniFASNetV1SE",
            Architecture::MiniFasNetV2Se => "MiniFASNetV2SE",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Architecture {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MiniFASNetV1" | "ArchV1" => Ok(Architecture::MiniFasNetV1),
            "MiniFASNetV2" | "ArchV2" => Ok(Architecture::MiniFasNetV2),
            "MiniFASNetV1SE" => Ok(Architecture::MiniFasNetV1Se),
            "MiniFASNetV2SE" => Ok(Architecture::MiniFasNetV2Se),
            other => Err(format!("unknown architecture '{other}'")),
        }
    }
}

/// Everything the pipeline needs to know about one classifier, decoded from its name.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    /// Identifier this model was parsed from (file stem).
    pub identifier: String,
    /// Input height in pixels.
    pub height: u32,
    /// Input width in pixels.
    pub width: u32,
    pub architecture: Architecture,
    /// Crop scale relative to the face box; `None` means the whole frame is used.
    pub scale: Option<f32>,
}

impl ModelSpec {
    /// Build a spec from its parts; the identifier is derived from them.
    pub fn new(height: u32, width: u32, architecture: Architecture, scale: Option<f32>) -> Self {
        let mut spec = Self {
            identifier: String::new(),
            height,
            width,
            architecture,
            scale,
        };
        spec.identifier = spec.canonical_identifier();
        spec
    }

    /// Identifier following the naming convention, e.g. `2.7_80x80_MiniFASNetV2`.
    pub fn canonical_identifier(&self) -> String {
        match self.scale {
            Some(scale) => format!(
                "{scale}_{}x{}_{}",
                self.height, self.width, self.architecture
            ),
            None => format!("{}x{}_{}", self.height, self.width, self.architecture),
        }
    }

    /// Parse a model file name, stripping a recognised extension first.
    ///
    /// Returns `Ok(None)` when the extension is not a model extension.
    pub fn from_file_name(path: &Path) -> Result<Option<Self>, LivenessError> {
        let has_model_ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                MODEL_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            });
        if !has_model_ext {
            return Ok(None);
        }
        let stem = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| {
                LivenessError::invalid_identifier(
                    &path.display().to_string(),
                    "file name is not valid UTF-8",
                )
            })?;
        parse_model_name(stem).map(Some)
    }
}

/// Decode a model identifier into a [`ModelSpec`].
///
/// ```rust
/// # use liveness_core::model_name::{parse_model_name, Architecture};
/// let spec = parse_model_name("2.7_80x80_MiniFASNetV2").unwrap();
/// assert_eq!((spec.height, spec.width), (80, 80));
/// assert_eq!(spec.architecture, Architecture::MiniFasNetV2);
/// assert_eq!(spec.scale, Some(2.7));
///
/// let whole_frame = parse_model_name("80x80_MiniFASNetV1").unwrap();
/// assert_eq!(whole_frame.scale, None);
/// ```
pub fn parse_model_name(identifier: &str) -> Result<ModelSpec, LivenessError> {
    let segments: Vec<&str> = identifier.split('_').collect();
    if segments.len() < 2 {
        return Err(LivenessError::invalid_identifier(
            identifier,
            "expected '[scale_]HxW_architecture'",
        ));
    }

    let arch_tag = segments[segments.len() - 1];
    let architecture: Architecture = arch_tag
        .parse()
        .map_err(|reason: String| LivenessError::invalid_identifier(identifier, reason))?;

    let dims = segments[segments.len() - 2];
    let (height, width) = parse_dimensions(dims)
        .ok_or_else(|| {
            LivenessError::invalid_identifier(
                identifier,
                format!("dimension segment '{dims}' is not HEIGHTxWIDTH"),
            )
        })?;

    let leading = &segments[..segments.len() - 2];
    let scale = match leading.first() {
        None => None,
        Some(&WHOLE_FRAME_MARKER) => None,
        Some(raw) => Some(parse_scale(raw).ok_or_else(|| {
            LivenessError::invalid_identifier(
                identifier,
                format!("scale segment '{raw}' is not a positive number"),
            )
        })?),
    };

    Ok(ModelSpec {
        identifier: identifier.to_string(),
        height,
        width,
        architecture,
        scale,
    })
}

fn parse_dimensions(segment: &str) -> Option<(u32, u32)> {
    let (h, w) = segment.split_once('x')?;
    Some((parse_side(h)?, parse_side(w)?))
}

/// A positive decimal integer written without sign or leading zeros.
fn parse_side(digits: &str) -> Option<u32> {
    if digits.starts_with('0') || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn parse_scale(segment: &str) -> Option<f32> {
    let scale: f32 = segment.parse().ok()?;
    (scale.is_finite() && scale > 0.0).then_some(scale)
}
