use std::path::Path;

use anyhow::{Context, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use image::{DynamicImage, RgbImage, imageops::FilterType};
use ndarray::Array3;

/// Load an image from disk into memory.
///
/// # Arguments
///
/// * `path` - The path to the image file.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
    let path_ref = path.as_ref();
    image::open(path_ref).with_context(|| format!("failed to open image {}", path_ref.display()))
}

/// Decode an encoded image (JPEG, PNG, BMP, WebP) held in memory.
pub fn decode_image_bytes(bytes: &[u8]) -> Result<DynamicImage> {
    anyhow::ensure!(!bytes.is_empty(), "image payload is empty");
    image::load_from_memory(bytes).context("failed to decode image payload")
}

/// Decode a base64 image payload.
///
/// Data URLs such as `data:image/jpeg;base64,<payload>` are accepted; everything up to
/// and including the first comma is discarded before decoding. Surrounding whitespace
/// and line breaks are ignored.
pub fn decode_base64_image(payload: &str) -> Result<DynamicImage> {
    let body = match payload.split_once(',') {
        Some((_, rest)) => rest,
        None => payload,
    };
    let compact: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = BASE64
        .decode(compact.as_bytes())
        .context("image payload is not valid base64")?;
    decode_image_bytes(&bytes)
}

/// Resize an image to the requested resolution using the provided filter.
///
/// # Arguments
///
/// * `image` - The image to resize.
/// * `width` - The target width.
/// * `height` - The target height.
/// * `filter` - The sampling filter to use for resizing.
pub fn resize_image(image: &DynamicImage, width: u32, height: u32, filter: FilterType) -> RgbImage {
    image.resize_exact(width, height, filter).to_rgb8()
}

/// Convert an RGB image into a BGR CHW array of raw `0..=255` values.
///
/// Both the detector and the anti-spoofing classifiers were exported from
/// OpenCV-style pipelines, so they expect blue first and no normalization.
pub fn rgb_to_bgr_chw(image: &RgbImage) -> Array3<f32> {
    let (width, height) = image.dimensions();
    let mut array = Array3::<f32>::zeros((3, height as usize, width as usize));
    for (x, y, pixel) in image.enumerate_pixels() {
        let (xi, yi) = (x as usize, y as usize);
        array[(0, yi, xi)] = pixel[2] as f32;
        array[(1, yi, xi)] = pixel[1] as f32;
        array[(2, yi, xi)] = pixel[0] as f32;
    }
    array
}

/// Compute the per-axis factors that map coordinates in `target` space back to `original`.
///
/// # Arguments
///
/// * `original` - A tuple of the original image's (width, height).
/// * `target` - A tuple of the resized image's (width, height).
pub fn compute_resize_scales(original: (u32, u32), target: (u32, u32)) -> Result<(f32, f32)> {
    let (orig_w, orig_h) = original;
    let (target_w, target_h) = target;
    anyhow::ensure!(
        target_w > 0 && target_h > 0,
        "target dimensions must be non-zero"
    );
    anyhow::ensure!(
        orig_w > 0 && orig_h > 0,
        "original dimensions must be non-zero"
    );
    Ok((
        orig_w as f32 / target_w as f32,
        orig_h as f32 / target_h as f32,
    ))
}

/// Round `value` to `decimals` decimal places (half away from zero).
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;

    fn encoded_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 90]));
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buffer, ImageFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    #[test]
    fn rgb_to_bgr_chw_swaps_channels() {
        let mut image = RgbImage::new(2, 2);
        image.put_pixel(0, 0, Rgb([0, 128, 255]));
        image.put_pixel(1, 0, Rgb([255, 128, 0]));

        let array = rgb_to_bgr_chw(&image);
        assert_eq!(array.shape(), &[3, 2, 2]);
        assert_eq!(array[(0, 0, 0)], 255.0);
        assert_eq!(array[(2, 0, 0)], 0.0);
        assert_eq!(array[(1, 0, 1)], 128.0);
    }

    #[test]
    fn compute_resize_scales_returns_expected_values() {
        let (sx, sy) = compute_resize_scales((400, 300), (192, 144)).unwrap();
        assert!((sx - 400.0 / 192.0).abs() < 1e-6);
        assert!((sy - 300.0 / 144.0).abs() < 1e-6);
        assert!(compute_resize_scales((0, 300), (192, 144)).is_err());
        assert!(compute_resize_scales((400, 300), (192, 0)).is_err());
    }

    #[test]
    fn decodes_plain_and_data_url_base64() {
        let png = encoded_png(8, 6);
        let plain = BASE64.encode(&png);
        let decoded = decode_base64_image(&plain).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 6));

        let data_url = format!("data:image/png;base64,{plain}");
        let decoded = decode_base64_image(&data_url).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 6));
    }

    #[test]
    fn rejects_garbage_payloads() {
        assert!(decode_image_bytes(&[]).is_err());
        assert!(decode_image_bytes(b"not an image").is_err());
        assert!(decode_base64_image("***").is_err());
    }

    #[test]
    fn round_to_four_places() {
        assert_eq!(round_to(0.875, 4), 0.875);
        assert_eq!(round_to(0.123_456, 4), 0.1235);
        assert_eq!(round_to(1.0 / 3.0, 4), 0.3333);
    }
}
