//! Integer face box in original-image coordinates.

/// Axis-aligned face box in pixels of the original, un-downscaled image.
///
/// Boxes produced by the locator always satisfy `x + width <= image width`,
/// `y + height <= image height` and `width, height >= 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width of the box.
    pub width: u32,
    /// Height of the box.
    pub height: u32,
}

impl BoundingBox {
    /// Creates a new box.
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Center of the box in continuous pixel coordinates.
    pub fn center(&self) -> (f64, f64) {
        (
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }

    /// Length of the longer side.
    pub fn longer_side(&self) -> u32 {
        self.width.max(self.height)
    }

    /// Build a box from floating-point edges, clamped to an `img_w` x `img_h` image.
    ///
    /// The left/top edges are floored and the right/bottom edges ceiled so the
    /// face is never cut. The result is at least one pixel wide and high.
    /// Returns `None` for a zero-sized image.
    pub fn from_edges_clamped(
        left: f32,
        top: f32,
        right: f32,
        bottom: f32,
        img_w: u32,
        img_h: u32,
    ) -> Option<Self> {
        if img_w == 0 || img_h == 0 {
            return None;
        }
        let clamp_axis = |lo: f32, hi: f32, extent: u32| -> (u32, u32) {
            let max = extent as f32;
            let lo = if lo.is_finite() { lo.floor().clamp(0.0, max - 1.0) } else { 0.0 };
            let hi = if hi.is_finite() { hi.ceil().clamp(0.0, max) } else { max };
            let start = lo as u32;
            let end = (hi as u32).max(start + 1);
            (start, end - start)
        };
        let (x, width) = clamp_axis(left, right, img_w);
        let (y, height) = clamp_axis(top, bottom, img_h);
        Some(Self::new(x, y, width, height))
    }

    /// Returns `true` when the box lies fully inside an `img_w` x `img_h` image.
    pub fn fits_within(&self, img_w: u32, img_h: u32) -> bool {
        self.x as u64 + self.width as u64 <= img_w as u64
            && self.y as u64 + self.height as u64 <= img_h as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_and_longer_side() {
        let bbox = BoundingBox::new(50, 50, 200, 120);
        assert_eq!(bbox.center(), (150.0, 110.0));
        assert_eq!(bbox.longer_side(), 200);
    }

    #[test]
    fn clamps_edges_to_image() {
        let bbox = BoundingBox::from_edges_clamped(-12.5, 10.2, 420.0, 99.1, 400, 300).unwrap();
        assert_eq!(bbox, BoundingBox::new(0, 10, 400, 90));
        assert!(bbox.fits_within(400, 300));
    }

    #[test]
    fn degenerate_edges_keep_one_pixel() {
        let bbox = BoundingBox::from_edges_clamped(500.0, 400.0, 480.0, 390.0, 400, 300).unwrap();
        assert_eq!(bbox.width, 1);
        assert_eq!(bbox.height, 1);
        assert!(bbox.fits_within(400, 300));
        assert!(BoundingBox::from_edges_clamped(0.0, 0.0, 1.0, 1.0, 0, 10).is_none());
    }
}
