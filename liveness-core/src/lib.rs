//! Face anti-spoofing pipeline.
//!
//! An image is validated, its face is located once with a YuNet detector, and
//! every registered MiniFASNet classifier looks at its own patch around that
//! face. The summed class distribution decides whether the face is real.

/// Classify capability, ONNX classifier backend and class vectors.
pub mod classifier;
/// Model-specific patch extraction.
pub mod cropper;
/// Detect capability and the YuNet backend.
pub mod detector;
/// Runs every registered classifier and sums the results.
pub mod ensemble;
/// Error taxonomy.
pub mod error;
/// Integer bounding boxes.
pub mod geometry;
/// Load-once model handles.
pub mod lazy;
/// Face location on a downscaled working image.
pub mod locator;
/// ONNX graph loading and execution.
pub mod model;
/// Classifier model naming convention.
pub mod model_name;
/// Detection post-processing (NMS, score filtering).
pub mod postprocess;
/// Image pre-processing (resizing, tensor conversion).
pub mod preprocess;
/// Model directory discovery.
pub mod registry;
/// Request validation and the decision rule.
pub mod scoring;

pub use classifier::{
    ClassificationVector, Classifier, ClassifierLoader, OnnxClassifier, OnnxClassifierLoader,
};
pub use cropper::{PatchRegion, crop_patch, patch_region};
pub use detector::{FaceDetector, YuNetDetector};
pub use ensemble::{ClassifierEnsemble, EnsembleOutput, ModelRun};
pub use error::{ErrorKind, LivenessError};
pub use geometry::BoundingBox;
pub use lazy::LazyHandle;
pub use locator::FaceLocator;
pub use model::YuNetModel;
pub use model_name::{Architecture, ModelSpec, parse_model_name};
pub use postprocess::{Detection, DetectionBox, Landmark, PostprocessConfig, apply_postprocess};
pub use preprocess::{InputSize, PreprocessConfig, PreprocessOutput, preprocess_dynamic_image};
pub use registry::{ModelRegistry, RegisteredModel};
pub use scoring::{Label, LivenessReport, LivenessScorer, LivenessVerdict, ScoringConfig};

/// Returns the crate version for diagnostics.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
