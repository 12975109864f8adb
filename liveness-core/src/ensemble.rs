//! Runs every registered classifier on its own patch and sums the results.

use std::time::{Duration, Instant};

use image::DynamicImage;
use liveness_utils::{config::AppSettings, timing_guard};
use log::{debug, trace};
use rayon::prelude::*;

use crate::{
    classifier::ClassificationVector,
    cropper::crop_patch,
    error::LivenessError,
    geometry::BoundingBox,
    registry::{ModelRegistry, RegisteredModel},
};

/// Output of one classifier within an ensemble run.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRun {
    /// Identifier of the model.
    pub identifier: String,
    /// The distribution it produced.
    pub vector: ClassificationVector,
    /// Handle acquisition plus classification time. Cropping is not included.
    pub elapsed: Duration,
}

/// Result of evaluating the whole registry.
#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleOutput {
    /// Element-wise sum of every model's vector.
    pub summed: ClassificationVector,
    /// Per-model results in registration order.
    pub per_model: Vec<ModelRun>,
    /// Sum of the per-model durations.
    pub elapsed: Duration,
}

/// Evaluates the registered classifiers against one face.
#[derive(Debug, Clone, Default)]
pub struct ClassifierEnsemble {
    parallel: bool,
    max_latency: Option<Duration>,
}

impl ClassifierEnsemble {
    /// An ensemble that runs models sequentially or on the rayon pool.
    pub fn new(parallel: bool, max_latency: Option<Duration>) -> Self {
        Self {
            parallel,
            max_latency,
        }
    }

    /// Build an ensemble from the `ensemble` and `scoring` settings.
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self::new(
            settings.ensemble.parallel,
            settings.scoring.max_latency_ms.map(Duration::from_millis),
        )
    }

    /// Whether models run concurrently.
    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    /// Latency budget measured from the start of [`evaluate`](Self::evaluate).
    pub fn max_latency(&self) -> Option<Duration> {
        self.max_latency
    }

    /// Run every registered model on its patch of `image` around `bbox`.
    ///
    /// Any failure aborts the whole evaluation; no partial sum is returned.
    pub fn evaluate(
        &self,
        image: &DynamicImage,
        bbox: BoundingBox,
        registry: &ModelRegistry,
    ) -> Result<EnsembleOutput, LivenessError> {
        let deadline = self.max_latency.map(|budget| (Instant::now() + budget, budget));
        self.evaluate_until(image, bbox, registry, deadline)
    }

    /// Like [`evaluate`](Self::evaluate) with an explicit `(deadline, budget)` pair.
    pub(crate) fn evaluate_until(
        &self,
        image: &DynamicImage,
        bbox: BoundingBox,
        registry: &ModelRegistry,
        deadline: Option<(Instant, Duration)>,
    ) -> Result<EnsembleOutput, LivenessError> {
        let _guard = timing_guard("liveness_core::ensemble", log::Level::Debug);
        let entries = registry.entries();

        // Both modes stop at the first failure. Rayon's indexed collect keeps
        // registration order, so the sums below are identical.
        let per_model: Vec<ModelRun> = if self.parallel {
            entries
                .par_iter()
                .map(|entry| run_model(entry, image, bbox, deadline))
                .collect::<Result<_, _>>()?
        } else {
            entries
                .iter()
                .map(|entry| run_model(entry, image, bbox, deadline))
                .collect::<Result<_, _>>()?
        };

        let mut summed = ClassificationVector::ZERO;
        let mut elapsed = Duration::ZERO;
        for run in &per_model {
            summed += run.vector;
            elapsed += run.elapsed;
        }

        debug!(
            "ensemble of {} model(s) summed to {:?}",
            per_model.len(),
            summed.values()
        );
        Ok(EnsembleOutput {
            summed,
            per_model,
            elapsed,
        })
    }
}

fn run_model(
    entry: &RegisteredModel,
    image: &DynamicImage,
    bbox: BoundingBox,
    deadline: Option<(Instant, Duration)>,
) -> Result<ModelRun, LivenessError> {
    if let Some((deadline, budget)) = deadline {
        if Instant::now() >= deadline {
            return Err(LivenessError::DeadlineExceeded { budget });
        }
    }

    let spec = entry.spec();
    if spec.height == 0 || spec.width == 0 {
        return Err(LivenessError::invalid_identifier(
            &spec.identifier,
            "patch dimensions must be greater than zero",
        ));
    }
    let patch = crop_patch(image, bbox, spec.height, spec.width, spec.scale);

    let guard = timing_guard(
        format!("liveness_core::classify[{}]", spec.identifier),
        log::Level::Debug,
    );
    let inference_error = |source: anyhow::Error| LivenessError::ModelInference {
        model: spec.identifier.clone(),
        source,
    };
    let classifier = entry.handle().get().map_err(inference_error)?;
    let vector = classifier.classify(&patch).map_err(inference_error)?;
    vector.validate().map_err(inference_error)?;
    let elapsed = guard.elapsed();

    trace!("{} -> {:?}", spec.identifier, vector.values());
    Ok(ModelRun {
        identifier: spec.identifier.clone(),
        vector,
        elapsed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Classifier;
    use crate::model_name::{Architecture, ModelSpec};
    use image::RgbImage;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        vector: ClassificationVector,
        expected: (u32, u32),
        calls: AtomicUsize,
    }

    impl Classifier for Fixed {
        fn classify(&self, patch: &RgbImage) -> anyhow::Result<ClassificationVector> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            anyhow::ensure!(patch.dimensions() == self.expected, "wrong patch size");
            Ok(self.vector)
        }
    }

    struct Failing;

    impl Classifier for Failing {
        fn classify(&self, _patch: &RgbImage) -> anyhow::Result<ClassificationVector> {
            anyhow::bail!("runtime error")
        }
    }

    fn fixed(spec: &ModelSpec, values: [f64; 3]) -> Arc<Fixed> {
        Arc::new(Fixed {
            vector: ClassificationVector::new(values),
            expected: (spec.width, spec.height),
            calls: AtomicUsize::new(0),
        })
    }

    fn image() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::new(400, 300))
    }

    const BBOX: BoundingBox = BoundingBox::new(50, 50, 200, 200);

    #[test]
    fn sums_models_in_order() {
        let a = ModelSpec::new(80, 80, Architecture::MiniFasNetV2, Some(2.7));
        let b = ModelSpec::new(80, 60, Architecture::MiniFasNetV1Se, None);
        let first = fixed(&a, [0.10, 0.85, 0.05]);
        let second = fixed(&b, [0.05, 0.90, 0.05]);
        let registry = ModelRegistry::from_entries(
            "memory",
            vec![(a, first.clone() as Arc<dyn Classifier>), (b, second.clone() as Arc<dyn Classifier>)],
        );

        let output = ClassifierEnsemble::default()
            .evaluate(&image(), BBOX, &registry)
            .unwrap();
        assert_eq!(output.per_model.len(), 2);
        assert_eq!(output.per_model[0].identifier, "2.7_80x80_MiniFASNetV2");
        assert!((output.summed.live() - 1.75).abs() < 1e-12);
        assert_eq!(
            output.elapsed,
            output.per_model[0].elapsed + output.per_model[1].elapsed
        );
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn parallel_matches_sequential() {
        let values = [
            [0.11, 0.52, 0.37],
            [0.33, 0.33, 0.34],
            [0.70, 0.20, 0.10],
            [0.05, 0.90, 0.05],
        ];
        let entries: Vec<(ModelSpec, Arc<dyn Classifier>)> = values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let spec = ModelSpec::new(80, 80, Architecture::MiniFasNetV2, Some(1.0 + i as f32));
                let classifier = fixed(&spec, *v) as Arc<dyn Classifier>;
                (spec, classifier)
            })
            .collect();
        let registry = ModelRegistry::from_entries("memory", entries);

        let sequential = ClassifierEnsemble::new(false, None)
            .evaluate(&image(), BBOX, &registry)
            .unwrap();
        let parallel = ClassifierEnsemble::new(true, None)
            .evaluate(&image(), BBOX, &registry)
            .unwrap();
        assert_eq!(sequential.summed, parallel.summed);
        let order = |output: &EnsembleOutput| {
            output
                .per_model
                .iter()
                .map(|run| run.identifier.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(order(&sequential), order(&parallel));
    }

    #[test]
    fn failing_model_aborts_the_run() {
        let a = ModelSpec::new(80, 80, Architecture::MiniFasNetV2, Some(2.7));
        let b = ModelSpec::new(80, 80, Architecture::MiniFasNetV1Se, Some(4.0));
        let c = ModelSpec::new(80, 80, Architecture::MiniFasNetV1, None);
        let last = fixed(&c, [0.0, 1.0, 0.0]);
        let registry = ModelRegistry::from_entries(
            "memory",
            vec![
                (a.clone(), fixed(&a, [0.0, 1.0, 0.0]) as Arc<dyn Classifier>),
                (b, Arc::new(Failing) as Arc<dyn Classifier>),
                (c, last.clone() as Arc<dyn Classifier>),
            ],
        );

        let err = ClassifierEnsemble::default()
            .evaluate(&image(), BBOX, &registry)
            .unwrap_err();
        match err {
            LivenessError::ModelInference { model, .. } => {
                assert_eq!(model, "4_80x80_MiniFASNetV1SE")
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(last.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failing_model_aborts_the_parallel_run() {
        let mut entries: Vec<(ModelSpec, Arc<dyn Classifier>)> = Vec::new();
        let failing = ModelSpec::new(80, 80, Architecture::MiniFasNetV2, Some(1.0));
        entries.push((failing, Arc::new(Failing) as Arc<dyn Classifier>));
        let mut rest = Vec::new();
        for i in 0..16 {
            let spec = ModelSpec::new(80, 80, Architecture::MiniFasNetV1Se, Some(2.0 + i as f32));
            let classifier = fixed(&spec, [0.0, 1.0, 0.0]);
            rest.push(classifier.clone());
            entries.push((spec, classifier as Arc<dyn Classifier>));
        }
        let registry = ModelRegistry::from_entries("memory", entries);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(1)
            .build()
            .unwrap();
        let err = pool
            .install(|| ClassifierEnsemble::new(true, None).evaluate(&image(), BBOX, &registry))
            .unwrap_err();
        match err {
            LivenessError::ModelInference { model, .. } => {
                assert_eq!(model, "1_80x80_MiniFASNetV2")
            }
            other => panic!("unexpected error: {other}"),
        }
        let ran: usize = rest
            .iter()
            .map(|classifier| classifier.calls.load(Ordering::SeqCst))
            .sum();
        assert!(ran < rest.len(), "{ran} models ran after the failure");
    }

    #[test]
    fn invalid_distribution_is_an_inference_error() {
        let spec = ModelSpec::new(80, 80, Architecture::MiniFasNetV2, Some(2.7));
        let registry = ModelRegistry::from_entries(
            "memory",
            vec![(spec.clone(), fixed(&spec, [f64::NAN, 0.5, 0.5]) as Arc<dyn Classifier>)],
        );
        let err = ClassifierEnsemble::default()
            .evaluate(&image(), BBOX, &registry)
            .unwrap_err();
        assert!(matches!(err, LivenessError::ModelInference { .. }));
    }

    #[test]
    fn expired_deadline_stops_before_classifying() {
        let spec = ModelSpec::new(80, 80, Architecture::MiniFasNetV2, Some(2.7));
        let classifier = fixed(&spec, [0.0, 1.0, 0.0]);
        let registry = ModelRegistry::from_entries(
            "memory",
            vec![(spec, classifier.clone() as Arc<dyn Classifier>)],
        );

        let err = ClassifierEnsemble::new(false, Some(Duration::ZERO))
            .evaluate(&image(), BBOX, &registry)
            .unwrap_err();
        assert!(matches!(err, LivenessError::DeadlineExceeded { .. }));
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn settings_control_mode_and_budget() {
        let mut settings = AppSettings::default();
        settings.ensemble.parallel = true;
        settings.scoring.max_latency_ms = Some(250);
        let ensemble = ClassifierEnsemble::from_settings(&settings);
        assert!(ensemble.is_parallel());
        assert_eq!(ensemble.max_latency(), Some(Duration::from_millis(250)));
    }
}
