use std::sync::Arc;

use crate::detection::domain::detection_pass::{default_passes, CascadeKind, DetectionPass};
use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::window_classifier::WindowClassifier;
use crate::detection::infrastructure::cascade_scanner::CascadeScanner;
use crate::detection::infrastructure::detection_merger::DetectionMerger;
use crate::preprocessing::domain::preprocessed_frame::PreprocessedFrame;
use crate::shared::config::DetectionConfig;
use crate::shared::face_box::FaceBox;

/// Runs every configured pass over its frame variant and de-duplicates the union.
///
/// Profile passes are skipped when no profile cascade was supplied.
pub struct MultiPassDetector {
    frontal: Arc<dyn WindowClassifier>,
    profile: Option<Arc<dyn WindowClassifier>>,
    passes: Vec<DetectionPass>,
    scanner: CascadeScanner,
    merger: DetectionMerger,
}

impl MultiPassDetector {
    pub fn new(
        frontal: Arc<dyn WindowClassifier>,
        profile: Option<Arc<dyn WindowClassifier>>,
        config: &DetectionConfig,
        max_faces: usize,
    ) -> Self {
        Self::with_passes(
            frontal,
            profile,
            default_passes(config.profile_pass),
            config,
            max_faces,
        )
    }

    pub fn with_passes(
        frontal: Arc<dyn WindowClassifier>,
        profile: Option<Arc<dyn WindowClassifier>>,
        passes: Vec<DetectionPass>,
        config: &DetectionConfig,
        max_faces: usize,
    ) -> Self {
        Self {
            frontal,
            profile,
            passes,
            scanner: CascadeScanner::new(config.min_face_size, config.max_face_size),
            merger: DetectionMerger::from_config(config, max_faces),
        }
    }

    pub fn passes(&self) -> &[DetectionPass] {
        &self.passes
    }

    fn classifier_for(&self, kind: CascadeKind) -> Option<&dyn WindowClassifier> {
        match kind {
            CascadeKind::Frontal => Some(self.frontal.as_ref()),
            CascadeKind::Profile => self.profile.as_deref(),
        }
    }
}

impl FaceDetector for MultiPassDetector {
    fn detect(
        &self,
        frame: &PreprocessedFrame,
    ) -> Result<Vec<FaceBox>, Box<dyn std::error::Error + Send + Sync>> {
        let mut raw = Vec::new();
        for pass in &self.passes {
            let Some(classifier) = self.classifier_for(pass.cascade) else {
                continue;
            };
            let hits = self.scanner.scan(
                classifier,
                frame.variant(pass.variant),
                pass.scale_step,
                pass.min_neighbors,
            );
            log::debug!(
                "{:?} pass on {:?} (step {}, votes {}): {} boxes",
                pass.range,
                pass.variant,
                pass.scale_step,
                pass.min_neighbors,
                hits.len()
            );
            raw.extend(hits);
        }
        let faces = self.merger.merge(&raw);
        log::debug!("{} raw detections merged into {} faces", raw.len(), faces.len());
        Ok(faces)
    }
}
