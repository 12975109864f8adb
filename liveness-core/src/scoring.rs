//! The scoring request: validate, locate, run the ensemble, decide.

use std::{fmt, time::Instant};

use image::{DynamicImage, GenericImageView};
use liveness_utils::{
    config::{AppSettings, ScoringSettings},
    round_to, timing_guard,
};
use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    classifier::{ClassificationVector, LIVE_CLASS},
    ensemble::ClassifierEnsemble,
    error::LivenessError,
    locator::FaceLocator,
    registry::ModelRegistry,
};

/// Decimal places kept in reported scores and times.
const REPORT_DECIMALS: i32 = 4;

/// Final decision for one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Real,
    Fake,
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Label::Real => "real",
            Label::Fake => "fake",
        })
    }
}

/// Label, confidence and latency of one scored image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LivenessVerdict {
    pub label: Label,
    /// Winning class sum divided by the score divisor, rounded to 4 decimals.
    pub score: f64,
    /// Ensemble time in seconds, rounded to 4 decimals.
    pub time: f64,
}

/// Serialisable outcome of a request: either a verdict or an error message.
///
/// ```rust
/// # use liveness_core::scoring::LivenessReport;
/// # use liveness_core::LivenessError;
/// let report = LivenessReport::from(Err(LivenessError::NoFaceDetected));
/// assert_eq!(serde_json::to_string(&report).unwrap(), r#"{"error":"no face detected"}"#);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LivenessReport {
    Verdict(LivenessVerdict),
    Error { error: String },
}

impl From<Result<LivenessVerdict, LivenessError>> for LivenessReport {
    fn from(result: Result<LivenessVerdict, LivenessError>) -> Self {
        match result {
            Ok(verdict) => LivenessReport::Verdict(verdict),
            Err(err) => LivenessReport::Error {
                error: err.to_string(),
            },
        }
    }
}

/// Input validation and decision parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringConfig {
    /// Required width/height ratio.
    pub aspect_ratio: f64,
    /// Allowed absolute deviation from `aspect_ratio`.
    pub aspect_tolerance: f64,
    /// Divisor applied to the winning class sum. It is a fixed constant, not
    /// the model count: with more than two models the score can exceed 1.
    pub score_divisor: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        ScoringSettings::default().into()
    }
}

impl From<ScoringSettings> for ScoringConfig {
    fn from(settings: ScoringSettings) -> Self {
        Self {
            aspect_ratio: settings.aspect_ratio,
            aspect_tolerance: settings.aspect_tolerance,
            score_divisor: settings.score_divisor,
        }
    }
}

impl From<&ScoringSettings> for ScoringConfig {
    fn from(settings: &ScoringSettings) -> Self {
        settings.clone().into()
    }
}

impl ScoringConfig {
    /// Whether a `width` x `height` image has the accepted aspect ratio.
    pub fn accepts_aspect(&self, width: u32, height: u32) -> bool {
        if width == 0 || height == 0 {
            return false;
        }
        let ratio = width as f64 / height as f64;
        (ratio - self.aspect_ratio).abs() <= self.aspect_tolerance
    }
}

/// Apply the decision rule to an ensemble sum.
///
/// The winning index is the argmax (lowest index on ties); the face is real
/// only when the live class wins. Returns the label and the unrounded score.
pub fn decide(summed: &ClassificationVector, score_divisor: f64) -> (Label, f64) {
    let index = summed.argmax();
    let label = if index == LIVE_CLASS {
        Label::Real
    } else {
        Label::Fake
    };
    (label, summed[index] / score_divisor)
}

/// Scores images against a model registry.
#[derive(Debug)]
pub struct LivenessScorer {
    locator: FaceLocator,
    ensemble: ClassifierEnsemble,
    config: ScoringConfig,
}

impl LivenessScorer {
    pub fn new(locator: FaceLocator, ensemble: ClassifierEnsemble, config: ScoringConfig) -> Self {
        Self {
            locator,
            ensemble,
            config,
        }
    }

    /// A scorer with a lazily loaded YuNet locator and settings-driven ensemble.
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self::new(
            FaceLocator::from_settings(settings),
            ClassifierEnsemble::from_settings(settings),
            ScoringConfig::from(&settings.scoring),
        )
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn locator(&self) -> &FaceLocator {
        &self.locator
    }

    pub fn ensemble(&self) -> &ClassifierEnsemble {
        &self.ensemble
    }

    /// Decide whether the face in `image` is live.
    ///
    /// The image is validated, the face is located once, every registered model
    /// classifies its own patch around that face, and the summed distribution
    /// decides the label. The first failure ends the request.
    pub fn score(
        &self,
        image: &DynamicImage,
        registry: &ModelRegistry,
    ) -> Result<LivenessVerdict, LivenessError> {
        let _guard = timing_guard("liveness_core::score", log::Level::Info);
        let started = Instant::now();

        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(LivenessError::EmptyImage);
        }
        if !self.config.accepts_aspect(width, height) {
            return Err(LivenessError::InvalidAspectRatio { width, height });
        }

        let bbox = self.locator.locate(image)?;

        if registry.is_empty() {
            return Err(LivenessError::NoModelsAvailable {
                dir: registry.dir().to_path_buf(),
            });
        }

        // The ensemble's budget counts from the start of the request.
        let deadline = self
            .ensemble
            .max_latency()
            .map(|budget| (started + budget, budget));
        let output = self
            .ensemble
            .evaluate_until(image, bbox, registry, deadline)?;

        let (label, confidence) = decide(&output.summed, self.config.score_divisor);
        let verdict = LivenessVerdict {
            label,
            score: round_to(confidence, REPORT_DECIMALS),
            time: round_to(output.elapsed.as_secs_f64(), REPORT_DECIMALS),
        };
        info!(
            "{} face with score {:.4} from {} model(s) in {:.4}s",
            verdict.label,
            verdict.score,
            output.per_model.len(),
            verdict.time
        );
        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn four_by_three_is_accepted() {
        let config = ScoringConfig::default();
        assert!(config.accepts_aspect(400, 300));
        assert!(config.accepts_aspect(640, 480));
        // 1.3400 is within one percent of 4/3
        assert!(config.accepts_aspect(402, 300));
        assert!(!config.accepts_aspect(500, 500));
        assert!(!config.accepts_aspect(300, 400));
        assert!(!config.accepts_aspect(400, 0));
    }

    #[test]
    fn decision_uses_fixed_divisor() {
        let summed = ClassificationVector::new([0.15, 1.75, 0.10]);
        let (label, score) = decide(&summed, 2.0);
        assert_eq!(label, Label::Real);
        assert!((score - 0.875).abs() < 1e-12);

        // Three agreeing models push the score past 1 with the default divisor.
        let summed = ClassificationVector::new([0.0, 3.0, 0.0]);
        assert_eq!(decide(&summed, 2.0).1, 1.5);
    }

    #[test]
    fn ties_resolve_to_the_lowest_index() {
        let summed = ClassificationVector::new([0.8, 0.8, 0.4]);
        let (label, score) = decide(&summed, 2.0);
        assert_eq!(label, Label::Fake);
        assert!((score - 0.4).abs() < 1e-12);
    }

    #[test]
    fn report_serialises_without_mixing_fields() {
        let verdict = LivenessReport::Verdict(LivenessVerdict {
            label: Label::Real,
            score: 0.875,
            time: 0.0123,
        });
        let json = serde_json::to_value(&verdict).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"label": "real", "score": 0.875, "time": 0.0123})
        );

        let error = LivenessReport::from(Err(LivenessError::InvalidAspectRatio {
            width: 500,
            height: 500,
        }));
        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"error": "image aspect ratio must be 4:3 (got 500x500)"})
        );

        let parsed: LivenessReport =
            serde_json::from_str(r#"{"label":"fake","score":0.75,"time":0.5}"#).unwrap();
        assert!(matches!(
            parsed,
            LivenessReport::Verdict(LivenessVerdict {
                label: Label::Fake,
                ..
            })
        ));
    }

    #[test]
    fn config_follows_settings() {
        let mut settings = AppSettings::default();
        settings.scoring.max_latency_ms = Some(1500);
        settings.scoring.score_divisor = 3.0;
        let scorer = LivenessScorer::from_settings(&settings);
        assert_eq!(scorer.config().score_divisor, 3.0);
        assert_eq!(
            scorer.ensemble().max_latency(),
            Some(Duration::from_millis(1500))
        );
    }
}
