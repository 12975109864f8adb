//! Error taxonomy for the scoring pipeline.
//!
//! Every failure of a request maps onto one [`LivenessError`] variant, and every
//! variant belongs to one [`ErrorKind`] so callers can decide how to report it
//! (reject the input, alert on missing models, and so on).

use std::{fmt, path::PathBuf, time::Duration};

use thiserror::Error;

/// Broad category of a pipeline failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The image itself was unusable. Rejected before any model runs.
    Input,
    /// Models or model files are missing, misnamed, or corrupt.
    Resource,
    /// The face locator found nothing or failed.
    Detection,
    /// A classifier failed while the ensemble was running.
    Inference,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::Input => "input",
            ErrorKind::Resource => "resource",
            ErrorKind::Detection => "detection",
            ErrorKind::Inference => "inference",
        })
    }
}

/// Errors produced while scoring an image.
#[derive(Error, Debug)]
pub enum LivenessError {
    /// The image payload could not be decoded.
    #[error("failed to decode image: {0}")]
    UndecodableImage(String),

    /// The image has a zero dimension.
    #[error("image dimensions must be greater than zero")]
    EmptyImage,

    /// The width/height ratio is outside the accepted tolerance.
    #[error("image aspect ratio must be 4:3 (got {width}x{height})")]
    InvalidAspectRatio {
        /// Image width in pixels.
        width: u32,
        /// Image height in pixels.
        height: u32,
    },

    /// The model registry holds no classifier.
    #[error("no anti-spoofing models registered in {}", dir.display())]
    NoModelsAvailable {
        /// Directory that was scanned.
        dir: PathBuf,
    },

    /// A model identifier does not follow the naming grammar.
    #[error("invalid model identifier '{identifier}': {reason}")]
    InvalidModelIdentifier {
        /// The offending identifier.
        identifier: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The model directory could not be read.
    #[error("cannot read model directory {}", dir.display())]
    ModelDirectory {
        /// Directory that was scanned.
        dir: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// A model file could not be loaded.
    #[error("failed to load model {}: {source:#}", path.display())]
    ModelLoad {
        /// Path of the model file.
        path: PathBuf,
        /// Underlying load failure.
        #[source]
        source: anyhow::Error,
    },

    /// The locator returned no candidate.
    #[error("no face detected")]
    NoFaceDetected,

    /// The detect capability itself failed.
    #[error("face detection failed: {0:#}")]
    Detection(#[source] anyhow::Error),

    /// A classifier failed to load or run during the ensemble.
    #[error("model '{model}' failed: {source:#}")]
    ModelInference {
        /// Identifier of the failing model.
        model: String,
        /// Underlying failure.
        #[source]
        source: anyhow::Error,
    },

    /// The request ran past its latency budget.
    #[error("request exceeded its latency budget of {budget:?}")]
    DeadlineExceeded {
        /// The configured budget.
        budget: Duration,
    },
}

impl LivenessError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LivenessError::UndecodableImage(_)
            | LivenessError::EmptyImage
            | LivenessError::InvalidAspectRatio { .. } => ErrorKind::Input,
            LivenessError::NoModelsAvailable { .. }
            | LivenessError::InvalidModelIdentifier { .. }
            | LivenessError::ModelDirectory { .. }
            | LivenessError::ModelLoad { .. } => ErrorKind::Resource,
            LivenessError::NoFaceDetected | LivenessError::Detection(_) => ErrorKind::Detection,
            LivenessError::ModelInference { .. } | LivenessError::DeadlineExceeded { .. } => {
                ErrorKind::Inference
            }
        }
    }

    pub(crate) fn invalid_identifier(identifier: &str, reason: impl Into<String>) -> Self {
        LivenessError::InvalidModelIdentifier {
            identifier: identifier.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variants_map_to_kinds() {
        assert_eq!(LivenessError::EmptyImage.kind(), ErrorKind::Input);
        assert_eq!(
            LivenessError::InvalidAspectRatio {
                width: 500,
                height: 500
            }
            .kind(),
            ErrorKind::Input
        );
        assert_eq!(
            LivenessError::NoModelsAvailable {
                dir: PathBuf::from("models")
            }
            .kind(),
            ErrorKind::Resource
        );
        assert_eq!(LivenessError::NoFaceDetected.kind(), ErrorKind::Detection);
        assert_eq!(
            LivenessError::ModelInference {
                model: "2.7_80x80_MiniFASNetV2".into(),
                source: anyhow::anyhow!("boom"),
            }
            .kind(),
            ErrorKind::Inference
        );
    }

    #[test]
    fn messages_carry_context() {
        let err = LivenessError::InvalidAspectRatio {
            width: 500,
            height: 500,
        };
        assert_eq!(err.to_string(), "image aspect ratio must be 4:3 (got 500x500)");

        let err = LivenessError::ModelInference {
            model: "80x80_MiniFASNetV1".into(),
            source: anyhow::anyhow!("tensor shape mismatch"),
        };
        assert!(err.to_string().contains("tensor shape mismatch"));
    }
}
