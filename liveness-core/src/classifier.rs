//! The classify capability and its ONNX backend.

use std::{
    ops::{Add, AddAssign, Index},
    path::Path,
    sync::Arc,
};

use anyhow::{Context, Result};
use image::RgbImage;

use crate::{
    model::{RunnableModel, load_onnx_graph, run_graph},
    model_name::ModelSpec,
    preprocess::bgr_tensor,
};

/// Number of classes every anti-spoofing model predicts.
pub const CLASS_COUNT: usize = 3;

/// Index of the "live" class.
pub const LIVE_CLASS: usize = 1;

/// Per-class scores `[spoof_a, live, spoof_b]`.
///
/// A single model's output sums to one; an ensemble sum uses the same type.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClassificationVector(pub [f64; CLASS_COUNT]);

impl ClassificationVector {
    /// The all-zero vector an ensemble sum starts from.
    pub const ZERO: Self = Self([0.0; CLASS_COUNT]);

    /// Wrap raw class scores.
    pub const fn new(values: [f64; CLASS_COUNT]) -> Self {
        Self(values)
    }

    /// Softmax over raw logits.
    pub fn from_logits(logits: &[f32]) -> Result<Self> {
        anyhow::ensure!(
            logits.len() == CLASS_COUNT,
            "expected {CLASS_COUNT} logits, got {}",
            logits.len()
        );
        let max = logits
            .iter()
            .copied()
            .map(f64::from)
            .fold(f64::NEG_INFINITY, f64::max);
        anyhow::ensure!(max.is_finite(), "logits are not finite: {logits:?}");

        let mut values = [0.0; CLASS_COUNT];
        for (value, &logit) in values.iter_mut().zip(logits) {
            *value = (f64::from(logit) - max).exp();
        }
        let total: f64 = values.iter().sum();
        for value in &mut values {
            *value /= total;
        }
        Ok(Self(values))
    }

    /// Scores as an array.
    pub fn values(&self) -> [f64; CLASS_COUNT] {
        self.0
    }

    /// Score of the live class.
    pub fn live(&self) -> f64 {
        self.0[LIVE_CLASS]
    }

    /// Index of the largest score; the lowest index wins ties.
    pub fn argmax(&self) -> usize {
        let mut best = 0;
        for (index, &value) in self.0.iter().enumerate().skip(1) {
            if value > self.0[best] {
                best = index;
            }
        }
        best
    }

    /// Check that every score is finite and non-negative.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.0.iter().all(|value| value.is_finite() && *value >= 0.0),
            "classifier output is not a probability vector: {:?}",
            self.0
        );
        Ok(())
    }
}

impl From<[f64; CLASS_COUNT]> for ClassificationVector {
    fn from(values: [f64; CLASS_COUNT]) -> Self {
        Self(values)
    }
}

impl Index<usize> for ClassificationVector {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        &self.0[index]
    }
}

impl Add for ClassificationVector {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl AddAssign for ClassificationVector {
    fn add_assign(&mut self, rhs: Self) {
        for (lhs, rhs) in self.0.iter_mut().zip(rhs.0) {
            *lhs += rhs;
        }
    }
}

/// The classify capability: one patch in, one class distribution out.
pub trait Classifier: Send + Sync {
    /// Classify a patch already sized for this model.
    fn classify(&self, patch: &RgbImage) -> Result<ClassificationVector>;
}

/// Builds a classifier for a discovered model file.
pub trait ClassifierLoader: Send + Sync {
    /// Load the model at `path` described by `spec`.
    fn load(&self, path: &Path, spec: &ModelSpec) -> Result<Arc<dyn Classifier>>;
}

/// Anti-spoofing classifier exported to ONNX and run with tract.
///
/// The graph takes a `[1, 3, H, W]` BGR tensor of raw pixel values and returns
/// three logits.
#[derive(Debug)]
pub struct OnnxClassifier {
    runnable: RunnableModel,
    height: u32,
    width: u32,
}

impl OnnxClassifier {
    /// Load the graph at `path`; patches must match `spec`'s dimensions.
    pub fn load(path: &Path, spec: &ModelSpec) -> Result<Self> {
        let runnable = load_onnx_graph(path, &spec.identifier)?;
        Ok(Self {
            runnable,
            height: spec.height,
            width: spec.width,
        })
    }
}

impl Classifier for OnnxClassifier {
    fn classify(&self, patch: &RgbImage) -> Result<ClassificationVector> {
        anyhow::ensure!(
            patch.dimensions() == (self.width, self.height),
            "patch is {}x{}, model expects {}x{}",
            patch.width(),
            patch.height(),
            self.width,
            self.height
        );
        let input = bgr_tensor(patch)?;
        let outputs = run_graph(&self.runnable, input)?;
        let logits = outputs
            .first()
            .context("classifier produced no outputs")?
            .as_slice::<f32>()
            .map_err(|e| anyhow::anyhow!("classifier output is not f32: {e}"))?;
        ClassificationVector::from_logits(logits)
    }
}

/// Loads [`OnnxClassifier`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct OnnxClassifierLoader;

impl ClassifierLoader for OnnxClassifierLoader {
    fn load(&self, path: &Path, spec: &ModelSpec) -> Result<Arc<dyn Classifier>> {
        let classifier = OnnxClassifier::load(path, spec)
            .with_context(|| format!("loading classifier {}", spec.identifier))?;
        Ok(Arc::new(classifier))
    }
}
