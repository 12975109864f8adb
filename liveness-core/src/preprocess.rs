//! Tensor preparation for the detector and classifier graphs.
//!
//! Both networks take a `[1, 3, H, W]` BGR tensor of raw pixel values. The
//! detector additionally needs its input resized to a fixed resolution, so its
//! preprocessing also returns the factors that map detections back to the image
//! it was given.

use std::borrow::Cow;

use anyhow::Result;
use image::{DynamicImage, GenericImageView, RgbImage, imageops::FilterType};
use liveness_utils::{
    compute_resize_scales,
    config::{InputDimensions, ResizeQuality},
    resize_image, rgb_to_bgr_chw,
    telemetry::timing_guard,
};
use tract_onnx::prelude::Tensor;

/// Input resolution of a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSize {
    /// The width of the input tensor.
    pub width: u32,
    /// The height of the input tensor.
    pub height: u32,
}

impl InputSize {
    /// Creates a new `InputSize`.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for InputSize {
    fn default() -> Self {
        Self {
            width: 640,
            height: 640,
        }
    }
}

/// Configuration for preparing an image for the detector.
#[derive(Debug, Clone, Default)]
pub struct PreprocessConfig {
    /// The detector input size.
    pub input_size: InputSize,
    /// Resize filter preference controlling the quality vs speed trade-off.
    pub resize_quality: ResizeQuality,
}

impl PreprocessConfig {
    fn resize_filter(&self) -> FilterType {
        match self.resize_quality {
            ResizeQuality::Quality => FilterType::Triangle,
            ResizeQuality::Speed => FilterType::Nearest,
        }
    }
}

impl From<InputDimensions> for PreprocessConfig {
    fn from(dimensions: InputDimensions) -> Self {
        PreprocessConfig {
            input_size: InputSize::new(dimensions.width, dimensions.height),
            resize_quality: dimensions.resize_quality,
        }
    }
}

impl From<&InputDimensions> for PreprocessConfig {
    fn from(dimensions: &InputDimensions) -> Self {
        (*dimensions).into()
    }
}

/// Detector tensor plus the metadata needed to rescale its detections.
#[derive(Debug)]
pub struct PreprocessOutput {
    /// The `[1, 3, H, W]` input tensor.
    pub tensor: Tensor,
    /// Factor mapping detector x coordinates back to the source image.
    pub scale_x: f32,
    /// Factor mapping detector y coordinates back to the source image.
    pub scale_y: f32,
    /// Dimensions of the source image.
    pub original_size: (u32, u32),
}

/// Resize `image` to the detector input size and convert it to a tensor.
pub fn preprocess_dynamic_image(
    image: &DynamicImage,
    config: &PreprocessConfig,
) -> Result<PreprocessOutput> {
    let _guard = timing_guard("liveness_core::preprocess_detector_input", log::Level::Trace);
    let InputSize {
        width: input_w,
        height: input_h,
    } = config.input_size;
    anyhow::ensure!(
        input_w > 0 && input_h > 0,
        "input dimensions must be greater than zero"
    );

    let (orig_w, orig_h) = image.dimensions();
    anyhow::ensure!(
        orig_w > 0 && orig_h > 0,
        "source image dimensions must be greater than zero"
    );
    let resized: Cow<'_, RgbImage> = if (orig_w, orig_h) == (input_w, input_h) {
        match image.as_rgb8() {
            Some(rgb) => Cow::Borrowed(rgb),
            None => Cow::Owned(image.to_rgb8()),
        }
    } else {
        Cow::Owned(resize_image(image, input_w, input_h, config.resize_filter()))
    };

    let tensor = bgr_tensor(&resized)?;
    let (scale_x, scale_y) = compute_resize_scales((orig_w, orig_h), (input_w, input_h))?;

    Ok(PreprocessOutput {
        tensor,
        scale_x,
        scale_y,
        original_size: (orig_w, orig_h),
    })
}

/// Convert an RGB image into a `[1, 3, H, W]` BGR tensor of raw `0..=255` values.
pub fn bgr_tensor(image: &RgbImage) -> Result<Tensor> {
    let (width, height) = image.dimensions();
    let shape = [1usize, 3, height as usize, width as usize];
    let (data, offset) = rgb_to_bgr_chw(image).into_raw_vec_and_offset();
    debug_assert!(matches!(offset, Some(0) | None), "expected contiguous array");
    Tensor::from_shape(&shape, &data).map_err(|e| anyhow::anyhow!("failed to build tensor: {e}"))
}
