use std::path::Path;

use anyhow::Result;
use image::DynamicImage;
use liveness_utils::{config::DetectorSettings, timing_guard};

use crate::model::YuNetModel;
use crate::postprocess::{Detection, PostprocessConfig, apply_postprocess};
use crate::preprocess::{PreprocessConfig, preprocess_dynamic_image};

/// The detect capability used by the face locator.
///
/// Implementations return every face candidate found in `image`, with boxes in
/// the coordinate space of `image` itself. An empty vector means no face.
pub trait FaceDetector: Send + Sync {
    /// Find face candidates in `image`.
    fn detect(&self, image: &DynamicImage) -> Result<Vec<Detection>>;
}

/// YuNet ONNX graph coupled with its preprocessing and postprocessing settings.
#[derive(Debug)]
pub struct YuNetDetector {
    model: YuNetModel,
    preprocess: PreprocessConfig,
    postprocess: PostprocessConfig,
}

impl YuNetDetector {
    /// Construct a detector from a model path and configuration.
    ///
    /// # Arguments
    ///
    /// * `model_path` - The path to the ONNX model file.
    /// * `preprocess` - Resize settings for the detector input.
    /// * `postprocess` - Score threshold, NMS and top-k settings.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        preprocess: PreprocessConfig,
        postprocess: PostprocessConfig,
    ) -> Result<Self> {
        let model = YuNetModel::load(model_path, preprocess.input_size)?;
        Ok(Self {
            model,
            preprocess,
            postprocess,
        })
    }

    /// Construct a detector from the `detector` section of the settings.
    pub fn from_settings<P: AsRef<Path>>(model_path: P, settings: &DetectorSettings) -> Result<Self> {
        Self::new(
            model_path,
            PreprocessConfig::from(&settings.input),
            PostprocessConfig::from(&settings.detection),
        )
    }

    /// Access the postprocess configuration.
    pub fn postprocess_config(&self) -> &PostprocessConfig {
        &self.postprocess
    }

    /// Access the preprocessing configuration.
    pub fn preprocess_config(&self) -> &PreprocessConfig {
        &self.preprocess
    }
}

impl FaceDetector for YuNetDetector {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<Detection>> {
        let _guard = timing_guard("liveness_core::yunet_detect", log::Level::Debug);
        let prep = preprocess_dynamic_image(image, &self.preprocess)?;

        let raw = {
            let _guard = timing_guard("liveness_core::yunet_inference", log::Level::Trace);
            self.model.run(prep.tensor)?
        };

        apply_postprocess(&raw, prep.scale_x, prep.scale_y, &self.postprocess)
    }
}
