use crate::preprocessing::domain::preprocessed_frame::{FrameVariant, PreprocessedFrame};
use crate::preprocessing::infrastructure::filters;
use crate::shared::config::PreprocessingConfig;
use crate::shared::frame::{Frame, FrameError};

const BASE_CLAHE_CLIP: f64 = 3.0;
const BASE_CLAHE_TILES: usize = 8;

/// Turns a raw frame into the grayscale variants the detector scans.
///
/// Stateless: the same frame always yields the same output.
#[derive(Clone, Debug, Default)]
pub struct FramePreprocessor {
    config: PreprocessingConfig,
}

impl FramePreprocessor {
    pub fn new(config: PreprocessingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PreprocessingConfig {
        &self.config
    }

    /// Luma, then a 50/50 blend of global and tile equalization as the base.
    /// Gamma, tile contrast, denoise and optional sharpening are chained from there.
    pub fn preprocess(&self, frame: &Frame) -> Result<PreprocessedFrame, FrameError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(FrameError::InvalidFrame("zero-area frame".into()));
        }
        let c = &self.config;
        let gray = frame.to_gray();

        let base = filters::blend(
            &filters::equalize_hist(&gray),
            &filters::clahe(&gray, BASE_CLAHE_CLIP, BASE_CLAHE_TILES),
            0.5,
        );
        let gamma = filters::gamma_correct(&base, c.gamma);
        let contrast = filters::clahe(&gamma, c.clahe_clip_limit, c.clahe_tiles);
        let denoised = filters::bilateral(
            &contrast,
            c.bilateral_diameter,
            c.bilateral_sigma_color,
            c.bilateral_sigma_space,
        );

        let mut variants = Vec::with_capacity(5);
        if c.sharpen {
            variants.push((FrameVariant::Sharpened, filters::sharpen(&denoised)));
        }
        variants.push((FrameVariant::Denoised, denoised));
        variants.push((FrameVariant::Contrast, contrast));
        variants.push((FrameVariant::Gamma, gamma));
        variants.push((FrameVariant::Base, base));

        Ok(PreprocessedFrame::new(frame.captured_at(), gray, variants))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn dim_frame(w: u32, h: u32) -> Frame {
        let data = (0..w * h)
            .flat_map(|i| {
                let v = (10 + (i % w) * 50 / w) as u8;
                [v, v, v]
            })
            .collect();
        Frame::new(data, w, h, 3, now()).unwrap()
    }

    #[test]
    fn test_produces_all_variants() {
        let out = FramePreprocessor::default()
            .preprocess(&dim_frame(32, 24))
            .unwrap();
        for kind in [
            FrameVariant::Base,
            FrameVariant::Gamma,
            FrameVariant::Contrast,
            FrameVariant::Denoised,
        ] {
            assert!(out.has_variant(kind), "missing {kind:?}");
            assert_eq!(out.variant(kind).width(), 32);
            assert_eq!(out.variant(kind).height(), 24);
        }
        assert!(!out.has_variant(FrameVariant::Sharpened));
        assert_eq!(out.captured_at(), now());
    }

    #[test]
    fn test_sharpen_variant_when_enabled() {
        let config = PreprocessingConfig {
            sharpen: true,
            ..PreprocessingConfig::default()
        };
        let out = FramePreprocessor::new(config)
            .preprocess(&dim_frame(16, 16))
            .unwrap();
        assert!(out.has_variant(FrameVariant::Sharpened));
    }

    #[test]
    fn test_enhancement_widens_dim_frame() {
        let frame = dim_frame(48, 48);
        let out = FramePreprocessor::default().preprocess(&frame).unwrap();
        assert!(out.variant(FrameVariant::Base).std_dev() > out.gray().std_dev());
    }

    #[test]
    fn test_is_deterministic() {
        let p = FramePreprocessor::default();
        let frame = dim_frame(20, 20);
        let a = p.preprocess(&frame).unwrap();
        let b = p.preprocess(&frame).unwrap();
        assert_eq!(a.variant(FrameVariant::Denoised), b.variant(FrameVariant::Denoised));
    }
}
