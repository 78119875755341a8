use crate::preprocessing::domain::preprocessed_frame::FrameVariant;

/// Which cascade a pass runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CascadeKind {
    Frontal,
    Profile,
}

/// Face-distance band a pass is tuned for. Used for logging only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassRange {
    Far,
    Medium,
    Near,
    Profile,
}

/// One sliding-window sweep: a cascade, a frame variant, and the
/// `(scale_step, min_neighbors)` pair that controls its recall.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectionPass {
    pub range: PassRange,
    pub cascade: CascadeKind,
    pub variant: FrameVariant,
    pub scale_step: f64,
    pub min_neighbors: usize,
}

impl DetectionPass {
    const fn new(
        range: PassRange,
        cascade: CascadeKind,
        variant: FrameVariant,
        scale_step: f64,
        min_neighbors: usize,
    ) -> Self {
        Self {
            range,
            cascade,
            variant,
            scale_step,
            min_neighbors,
        }
    }
}

/// Small scale steps with few votes find distant faces; large steps with
/// more votes keep near-face passes from firing on texture.
pub const DEFAULT_PASSES: &[DetectionPass] = &[
    DetectionPass::new(PassRange::Far, CascadeKind::Frontal, FrameVariant::Denoised, 1.03, 3),
    DetectionPass::new(PassRange::Far, CascadeKind::Frontal, FrameVariant::Contrast, 1.05, 4),
    DetectionPass::new(PassRange::Far, CascadeKind::Frontal, FrameVariant::Gamma, 1.08, 5),
    DetectionPass::new(PassRange::Medium, CascadeKind::Frontal, FrameVariant::Denoised, 1.10, 4),
    DetectionPass::new(PassRange::Medium, CascadeKind::Frontal, FrameVariant::Contrast, 1.15, 5),
    DetectionPass::new(PassRange::Near, CascadeKind::Frontal, FrameVariant::Base, 1.20, 6),
    DetectionPass::new(PassRange::Profile, CascadeKind::Profile, FrameVariant::Denoised, 1.05, 3),
    DetectionPass::new(PassRange::Profile, CascadeKind::Profile, FrameVariant::Contrast, 1.05, 3),
];

/// The default pass table, without the profile passes when `profile` is false.
pub fn default_passes(profile: bool) -> Vec<DetectionPass> {
    DEFAULT_PASSES
        .iter()
        .filter(|p| profile || p.cascade != CascadeKind::Profile)
        .copied()
        .collect()
}
