use chrono::{DateTime, Utc};

use crate::shared::frame::GrayImage;

/// Enhancement variant of a frame, each suited to a different face distance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameVariant {
    /// Histogram-equalized luma; near faces.
    Base,
    /// Gamma-lifted shadows; distant faces in dim rows.
    Gamma,
    /// Tile-equalized gamma variant.
    Contrast,
    /// Bilateral-filtered contrast variant.
    Denoised,
    /// Sharpened denoised variant, present only when sharpening is enabled.
    Sharpened,
}

/// Output of frame preprocessing: plain luma plus every detection variant.
///
/// All images share the source frame's dimensions.
#[derive(Clone, Debug)]
pub struct PreprocessedFrame {
    captured_at: DateTime<Utc>,
    gray: GrayImage,
    variants: Vec<(FrameVariant, GrayImage)>,
}

impl PreprocessedFrame {
    pub fn new(
        captured_at: DateTime<Utc>,
        gray: GrayImage,
        variants: Vec<(FrameVariant, GrayImage)>,
    ) -> Self {
        Self {
            captured_at,
            gray,
            variants,
        }
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Unenhanced luma, used for face crops and quality scoring.
    pub fn gray(&self) -> &GrayImage {
        &self.gray
    }

    pub fn width(&self) -> usize {
        self.gray.width()
    }

    pub fn height(&self) -> usize {
        self.gray.height()
    }

    /// The requested variant, falling back to `Base`, then to plain luma.
    pub fn variant(&self, kind: FrameVariant) -> &GrayImage {
        self.find(kind)
            .or_else(|| self.find(FrameVariant::Base))
            .unwrap_or(&self.gray)
    }

    pub fn has_variant(&self, kind: FrameVariant) -> bool {
        self.find(kind).is_some()
    }

    fn find(&self, kind: FrameVariant) -> Option<&GrayImage> {
        self.variants
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, img)| img)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_fallback() {
        let frame = PreprocessedFrame::new(
            Utc::now(),
            GrayImage::filled(2, 2, 1),
            vec![(FrameVariant::Base, GrayImage::filled(2, 2, 7))],
        );
        assert_eq!(frame.variant(FrameVariant::Sharpened).get(0, 0), 7);
        assert!(!frame.has_variant(FrameVariant::Gamma));
    }

    #[test]
    fn test_variant_fallback_to_gray_without_base() {
        let frame = PreprocessedFrame::new(Utc::now(), GrayImage::filled(2, 2, 3), Vec::new());
        assert_eq!(frame.variant(FrameVariant::Denoised).get(1, 1), 3);
    }
}
