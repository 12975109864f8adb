//! Model-specific patch extraction.
//!
//! A scaled model looks at a square window around the face whose side is the
//! longer face side times the model's scale. The window is clamped to the
//! shorter image side and then slid, never shrunk or padded, until it lies
//! inside the image. Whole-frame models (no scale) get the full image.

use image::{DynamicImage, GenericImageView, RgbImage, imageops::FilterType};
use liveness_utils::resize_image;

use crate::geometry::BoundingBox;

/// Square source window for a scaled patch, in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchRegion {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Side length of the square.
    pub side: u32,
}

/// Compute the square window a model with `scale` sees around `bbox`.
///
/// ```rust
/// # use liveness_core::{cropper::{patch_region, PatchRegion}, geometry::BoundingBox};
/// // 200px face scaled by 2.7 is clamped to the 300px image height and slid inside.
/// let region = patch_region(400, 300, BoundingBox::new(50, 50, 200, 200), 2.7);
/// assert_eq!(region, PatchRegion { x: 0, y: 0, side: 300 });
/// ```
pub fn patch_region(img_w: u32, img_h: u32, bbox: BoundingBox, scale: f32) -> PatchRegion {
    let limit = img_w.min(img_h).max(1);
    let wanted = bbox.longer_side() as f64 * scale as f64;
    let side = if wanted.is_finite() {
        (wanted.min(limit as f64).round() as u32).clamp(1, limit)
    } else {
        limit
    };

    let (cx, cy) = bbox.center();
    let place = |center: f64, extent: u32| -> u32 {
        let max_start = extent.saturating_sub(side) as f64;
        (center - side as f64 / 2.0).round().clamp(0.0, max_start) as u32
    };

    PatchRegion {
        x: place(cx, img_w),
        y: place(cy, img_h),
        side,
    }
}

/// Produce an `out_width` x `out_height` RGB patch for one model.
///
/// With `scale` present the square from [`patch_region`] is cropped and
/// resized bilinearly; with `scale` absent `bbox` is ignored and the whole
/// image is resized. Output dimensions must be non-zero.
pub fn crop_patch(
    image: &DynamicImage,
    bbox: BoundingBox,
    out_height: u32,
    out_width: u32,
    scale: Option<f32>,
) -> RgbImage {
    match scale {
        None => resize_image(image, out_width, out_height, FilterType::Triangle),
        Some(scale) => {
            let (img_w, img_h) = image.dimensions();
            let region = patch_region(img_w, img_h, bbox, scale);
            let window = image.crop_imm(region.x, region.y, region.side, region.side);
            resize_image(&window, out_width, out_height, FilterType::Triangle)
        }
    }
}
