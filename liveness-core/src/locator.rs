//! Face location on a downscaled working copy of the image.
//!
//! Detection runs on an image whose larger side is at most `working_size`
//! pixels, and the chosen box is mapped back to original coordinates.

use std::{
    borrow::Cow,
    path::{Path, PathBuf},
    sync::Arc,
};

use image::{DynamicImage, GenericImageView, imageops::FilterType};
use liveness_utils::{config::AppSettings, resize_image, timing_guard};
use log::debug;

use crate::{
    detector::{FaceDetector, YuNetDetector},
    error::LivenessError,
    geometry::BoundingBox,
    lazy::LazyHandle,
    postprocess::Detection,
};

/// Default larger side of the working image.
pub const DEFAULT_WORKING_SIZE: u32 = 192;

/// Finds the single face box the ensemble will use.
#[derive(Debug)]
pub struct FaceLocator {
    detector: LazyHandle<dyn FaceDetector>,
    working_size: u32,
}

impl FaceLocator {
    /// A locator over a lazily loaded detector.
    pub fn new(detector: LazyHandle<dyn FaceDetector>, working_size: u32) -> Self {
        Self {
            detector,
            working_size,
        }
    }

    /// A locator over an already constructed detector.
    pub fn with_detector(detector: Arc<dyn FaceDetector>, working_size: u32) -> Self {
        Self::new(LazyHandle::ready("face detector", detector), working_size)
    }

    /// A locator that loads the YuNet graph named in `settings` on first use.
    pub fn from_settings(settings: &AppSettings) -> Self {
        let path = PathBuf::from(&settings.detector_path);
        let detector_settings = settings.detector.clone();
        let label = path.display().to_string();
        let handle = LazyHandle::new(label, move || {
            let detector = YuNetDetector::from_settings(&path, &detector_settings)?;
            Ok(Arc::new(detector) as Arc<dyn FaceDetector>)
        });
        Self::new(handle, settings.locator.working_size)
    }

    /// Larger side of the working image.
    pub fn working_size(&self) -> u32 {
        self.working_size
    }

    /// Locate the most confident face in `image`.
    ///
    /// The returned box is in original-image pixels, clamped to the image and
    /// at least one pixel wide and high.
    pub fn locate(&self, image: &DynamicImage) -> Result<BoundingBox, LivenessError> {
        let _guard = timing_guard("liveness_core::locate", log::Level::Debug);
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(LivenessError::EmptyImage);
        }

        let detector = self
            .detector
            .get()
            .map_err(|source| LivenessError::ModelLoad {
                path: Path::new(self.detector.label()).to_path_buf(),
                source,
            })?;

        let working: Cow<'_, DynamicImage> =
            match working_dimensions(width, height, self.working_size) {
                Some((w, h)) if (w, h) != (width, height) => Cow::Owned(DynamicImage::ImageRgb8(
                    resize_image(image, w, h, FilterType::Triangle),
                )),
                _ => Cow::Borrowed(image),
            };
        let (working_w, working_h) = working.dimensions();

        let candidates = detector
            .detect(&working)
            .map_err(LivenessError::Detection)?;
        let best = select_best(&candidates).ok_or(LivenessError::NoFaceDetected)?;

        let scale_x = width as f32 / working_w as f32;
        let scale_y = height as f32 / working_h as f32;
        let b = &best.bbox;
        let bbox = BoundingBox::from_edges_clamped(
            b.x * scale_x,
            b.y * scale_y,
            (b.x + b.width) * scale_x,
            (b.y + b.height) * scale_y,
            width,
            height,
        )
        .ok_or(LivenessError::EmptyImage)?;

        debug!(
            "face at ({}, {}) {}x{} from {} candidate(s), score {:.3}",
            bbox.x,
            bbox.y,
            bbox.width,
            bbox.height,
            candidates.len(),
            best.score
        );
        Ok(bbox)
    }
}

/// Size of the working image, or `None` when the image is used as is.
///
/// Images with `width * height >= working_size²` are scaled so their larger
/// side equals `working_size`; the smaller side is rounded and kept at least 1.
pub fn working_dimensions(width: u32, height: u32, working_size: u32) -> Option<(u32, u32)> {
    if working_size == 0 {
        return None;
    }
    let area = width as u64 * height as u64;
    let target = working_size as u64 * working_size as u64;
    if area < target {
        return None;
    }
    let scale_side = |small: u32, large: u32| -> u32 {
        ((small as f64 * working_size as f64 / large as f64).round() as u32).max(1)
    };
    if width >= height {
        Some((working_size, scale_side(height, width)))
    } else {
        Some((scale_side(width, height), working_size))
    }
}

/// Highest-scoring candidate; the first one wins ties and non-finite scores never win.
fn select_best(candidates: &[Detection]) -> Option<&Detection> {
    candidates
        .iter()
        .filter(|candidate| candidate.score.is_finite())
        .fold(None, |best: Option<&Detection>, candidate| match best {
            Some(current) if current.score >= candidate.score => Some(current),
            _ => Some(candidate),
        })
}
