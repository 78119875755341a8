use std::sync::Arc;

use crate::preprocessing::infrastructure::face_normalizer::normalize_face;
use crate::preprocessing::infrastructure::filters;
use crate::recognition::domain::embedder::{l2_normalize, Embedder};
use crate::recognition::domain::face_quality::quality_score;
use crate::recognition::domain::gallery_handle::GalleryHandle;
use crate::recognition::domain::identity_gallery::IdentityGallery;
use crate::recognition::domain::match_outcome::{FaceMatch, MatchOutcome, UnmatchedReason};
use crate::shared::config::EngineConfig;
use crate::shared::face_box::{DistanceBand, FaceBox};
use crate::shared::frame::GrayImage;
use crate::shared::ids::StudentId;

/// Faces at least this many pixels on a side get no threshold relaxation.
const FULL_DETAIL_SIDE: f64 = 50.0;
const BOOST_ALPHA: f64 = 1.2;
const BOOST_BETA: f64 = 10.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatcherSettings {
    pub quality_floor: f64,
    pub distance_threshold: f64,
    pub distance_relaxation: f64,
}

impl MatcherSettings {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            quality_floor: config.detection_quality_floor,
            distance_threshold: config.match_distance_threshold,
            distance_relaxation: config.distance_relaxation,
        }
    }

    /// Maximum accepted distance for a face of `area` pixels: the base
    /// threshold, relaxed linearly as the face shrinks below 50x50.
    pub fn adaptive_threshold(&self, area: i64) -> f64 {
        let size_factor = (area.max(0) as f64 / (FULL_DETAIL_SIDE * FULL_DETAIL_SIDE)).min(1.0);
        self.distance_threshold + (1.0 - size_factor) * self.distance_relaxation
    }
}

/// Quality gate, embedding and nearest-identity lookup for detected faces.
pub struct FaceMatcher {
    embedder: Arc<dyn Embedder>,
    gallery: Arc<GalleryHandle>,
    settings: MatcherSettings,
}

impl FaceMatcher {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        gallery: Arc<GalleryHandle>,
        settings: MatcherSettings,
    ) -> Self {
        Self {
            embedder,
            gallery,
            settings,
        }
    }

    pub fn gallery(&self) -> &Arc<GalleryHandle> {
        &self.gallery
    }

    pub fn settings(&self) -> &MatcherSettings {
        &self.settings
    }

    /// Whether `gallery` embeddings are comparable with this embedder's output.
    pub fn fits(&self, gallery: &IdentityGallery) -> bool {
        gallery.dimension() == self.embedder.dimension()
    }

    /// Matches every face of one frame against a single gallery snapshot.
    pub fn match_faces(
        &self,
        gray: &GrayImage,
        faces: &[FaceBox],
    ) -> Result<Vec<FaceMatch>, Box<dyn std::error::Error + Send + Sync>> {
        let snapshot = self.gallery.snapshot();
        if let Some(gallery) = snapshot.as_deref() {
            if !faces.is_empty() && !self.fits(gallery) {
                log::warn!(
                    "Gallery v{} holds {}-d embeddings but the embedder produces {}-d; no face can match",
                    gallery.version(),
                    gallery.dimension(),
                    self.embedder.dimension()
                );
            }
        }
        faces
            .iter()
            .map(|face| self.match_face(gray, face, snapshot.as_deref()))
            .collect()
    }

    pub fn match_face(
        &self,
        gray: &GrayImage,
        face: &FaceBox,
        gallery: Option<&IdentityGallery>,
    ) -> Result<FaceMatch, Box<dyn std::error::Error + Send + Sync>> {
        let distance_band = DistanceBand::from_box(face);
        let result = |quality: f64, outcome: MatchOutcome| FaceMatch {
            face: *face,
            quality,
            distance_band,
            outcome,
        };

        let Some(crop) = crop_face(gray, face) else {
            return Ok(result(0.0, MatchOutcome::unmatched(UnmatchedReason::LowQuality)));
        };
        let quality = quality_score(&crop, face.area());
        if quality < self.settings.quality_floor {
            return Ok(result(quality, MatchOutcome::unmatched(UnmatchedReason::LowQuality)));
        }
        let Some(gallery) = gallery else {
            return Ok(result(quality, MatchOutcome::unmatched(UnmatchedReason::NoGallery)));
        };
        if gallery.is_empty() || !self.fits(gallery) {
            return Ok(result(
                quality,
                MatchOutcome::unmatched(UnmatchedReason::NoGalleryMatch),
            ));
        }

        let normalized = normalize_face(&crop);
        let boosted = filters::scale_contrast(&normalized, BOOST_ALPHA, BOOST_BETA);
        let mut best: Option<(StudentId, f64)> = None;
        for attempt in [&normalized, &boosted] {
            let mut embedding = self.embedder.embed(attempt)?;
            l2_normalize(&mut embedding);
            if let Some(hit) = gallery.nearest(&embedding) {
                if best.as_ref().map_or(true, |(_, d)| hit.distance < *d) {
                    best = Some((hit.student_id.clone(), hit.distance));
                }
            }
        }

        let Some((student_id, distance)) = best else {
            return Ok(result(
                quality,
                MatchOutcome::unmatched(UnmatchedReason::NoGalleryMatch),
            ));
        };
        let threshold = self.settings.adaptive_threshold(face.area());
        if distance > threshold {
            log::trace!(
                "Nearest {student_id} at {distance:.3} exceeds {threshold:.3} for {distance_band}"
            );
            return Ok(result(
                quality,
                MatchOutcome::unmatched(UnmatchedReason::BelowConfidence),
            ));
        }
        Ok(result(
            quality,
            MatchOutcome::Matched {
                student_id,
                confidence: (1.0 - distance).clamp(0.0, 1.0),
                distance,
                gallery_version: gallery.version(),
            },
        ))
    }
}

/// Crops `face` padded by `max(3, min(w, h) / 15)` px, clipped to the image.
pub fn crop_face(gray: &GrayImage, face: &FaceBox) -> Option<GrayImage> {
    let pad = (face.width.min(face.height) / 15).max(3);
    let b = face.padded_within(pad, gray.width(), gray.height())?;
    Some(gray.crop(b.x as usize, b.y as usize, b.width as usize, b.height as usize))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::domain::identity_gallery::GalleryEntry;
    use crate::shared::ids::StudentId;
    use approx::assert_relative_eq;
    use rstest::rstest;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embeds a face as its mean brightness in one of two directions, so
    /// bright and dark faces are orthogonal. Counts calls.
    struct BrightnessEmbedder {
        calls: AtomicUsize,
    }

    impl BrightnessEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Embedder for BrightnessEmbedder {
        fn dimension(&self) -> usize {
            2
        }

        fn embed(
            &self,
            face: &GrayImage,
        ) -> Result<Vec<f32>, Box<dyn std::error::Error + Send + Sync>> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let m = (face.mean() / 255.0) as f32;
            Ok(vec![m, 1.0 - m])
        }
    }

    struct FailingEmbedder;

    impl Embedder for FailingEmbedder {
        fn dimension(&self) -> usize {
            2
        }

        fn embed(
            &self,
            _face: &GrayImage,
        ) -> Result<Vec<f32>, Box<dyn std::error::Error + Send + Sync>> {
            Err("model crashed".into())
        }
    }

    fn settings() -> MatcherSettings {
        MatcherSettings {
            quality_floor: 0.15,
            distance_threshold: 0.45,
            distance_relaxation: 0.15,
        }
    }

    fn textured_frame() -> GrayImage {
        let (w, h) = (200, 200);
        let data = (0..w * h)
            .map(|i| {
                let (x, y) = (i % w, i / w);
                if (x / 3 + y / 3) % 2 == 0 { 40 } else { 210 }
            })
            .collect();
        GrayImage::new(data, w, h)
    }

    fn gallery_for(embedding: Vec<f32>, id: &str, version: u64) -> IdentityGallery {
        IdentityGallery::new(
            version,
            vec![GalleryEntry {
                student_id: StudentId::new(id),
                embedding,
            }],
        )
        .unwrap()
    }

    fn matcher_with(embedder: Arc<dyn Embedder>, gallery: Option<IdentityGallery>) -> FaceMatcher {
        let handle = match gallery {
            Some(g) => GalleryHandle::with_gallery(g),
            None => GalleryHandle::new(),
        };
        FaceMatcher::new(embedder, Arc::new(handle), settings())
    }

    /// Gallery entry equal to whatever the brightness embedder produces for
    /// a normalized crop of the textured frame.
    fn matching_embedding(face: &FaceBox) -> Vec<f32> {
        let crop = crop_face(&textured_frame(), face).unwrap();
        let m = (normalize_face(&crop).mean() / 255.0) as f32;
        vec![m, 1.0 - m]
    }

    // ── Adaptive threshold ───────────────────────────────────────────

    #[rstest]
    #[case(2500, 0.45)]
    #[case(10_000, 0.45)]
    #[case(0, 0.60)]
    #[case(625, 0.5625)]
    fn test_adaptive_threshold(#[case] area: i64, #[case] expected: f64) {
        assert_relative_eq!(settings().adaptive_threshold(area), expected, epsilon = 1e-9);
    }

    #[test]
    fn test_smaller_faces_never_get_stricter_threshold() {
        let s = settings();
        let mut previous = s.adaptive_threshold(0);
        for area in (0..5000).step_by(50) {
            let t = s.adaptive_threshold(area);
            assert!(t <= previous + 1e-12);
            previous = t;
        }
    }

    // ── Outcomes ─────────────────────────────────────────────────────

    #[test]
    fn test_matches_enrolled_face() {
        let face = FaceBox::new(40, 40, 90, 90);
        let matcher = matcher_with(
            Arc::new(BrightnessEmbedder::new()),
            Some(gallery_for(matching_embedding(&face), "s1", 7)),
        );
        let m = matcher.match_faces(&textured_frame(), &[face]).unwrap();
        match &m[0].outcome {
            MatchOutcome::Matched {
                student_id,
                confidence,
                gallery_version,
                ..
            } => {
                assert_eq!(student_id.as_str(), "s1");
                assert!(*confidence > 0.9);
                assert_eq!(*gallery_version, 7);
            }
            other => panic!("expected match, got {other:?}"),
        }
        assert_eq!(m[0].distance_band, DistanceBand::Close);
    }

    #[test]
    fn test_low_quality_face_is_never_embedded() {
        let embedder = Arc::new(BrightnessEmbedder::new());
        let face = FaceBox::new(10, 10, 20, 20);
        let flat = GrayImage::filled(100, 100, 128);
        let matcher = matcher_with(
            embedder.clone(),
            Some(gallery_for(vec![0.5, 0.5], "s1", 1)),
        );
        let m = matcher.match_faces(&flat, &[face]).unwrap();
        assert_eq!(
            m[0].outcome,
            MatchOutcome::unmatched(UnmatchedReason::LowQuality)
        );
        assert_eq!(embedder.calls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_no_gallery_published() {
        let matcher = matcher_with(Arc::new(BrightnessEmbedder::new()), None);
        let m = matcher
            .match_faces(&textured_frame(), &[FaceBox::new(40, 40, 90, 90)])
            .unwrap();
        assert_eq!(m[0].outcome, MatchOutcome::unmatched(UnmatchedReason::NoGallery));
    }

    #[test]
    fn test_empty_gallery_is_no_gallery_match() {
        let matcher = matcher_with(
            Arc::new(BrightnessEmbedder::new()),
            Some(IdentityGallery::empty(1)),
        );
        let m = matcher
            .match_faces(&textured_frame(), &[FaceBox::new(40, 40, 90, 90)])
            .unwrap();
        assert_eq!(
            m[0].outcome,
            MatchOutcome::unmatched(UnmatchedReason::NoGalleryMatch)
        );
    }

    #[test]
    fn test_dimension_mismatch_is_no_gallery_match() {
        let embedder = Arc::new(BrightnessEmbedder::new());
        let wide = gallery_for(vec![1.0, 0.0, 0.0], "s1", 1);
        let matcher = matcher_with(embedder.clone(), Some(wide.clone()));
        assert!(!matcher.fits(&wide));
        assert!(matcher.fits(&gallery_for(vec![1.0, 0.0], "s1", 2)));

        let m = matcher
            .match_faces(
                &textured_frame(),
                &[FaceBox::new(10, 10, 90, 90), FaceBox::new(100, 100, 90, 90)],
            )
            .unwrap();
        assert_eq!(m.len(), 2);
        for face in &m {
            assert_eq!(
                face.outcome,
                MatchOutcome::unmatched(UnmatchedReason::NoGalleryMatch)
            );
        }
        assert_eq!(embedder.calls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_distant_identity_is_below_confidence() {
        let face = FaceBox::new(40, 40, 90, 90);
        let mut opposite = matching_embedding(&face);
        opposite.reverse();
        opposite[0] = -opposite[0];
        let matcher = matcher_with(
            Arc::new(BrightnessEmbedder::new()),
            Some(gallery_for(opposite, "s1", 1)),
        );
        let m = matcher.match_faces(&textured_frame(), &[face]).unwrap();
        assert_eq!(
            m[0].outcome,
            MatchOutcome::unmatched(UnmatchedReason::BelowConfidence)
        );
    }

    #[test]
    fn test_embedder_failure_propagates() {
        let matcher = matcher_with(
            Arc::new(FailingEmbedder),
            Some(gallery_for(vec![1.0, 0.0], "s1", 1)),
        );
        assert!(matcher
            .match_faces(&textured_frame(), &[FaceBox::new(40, 40, 90, 90)])
            .is_err());
    }

    #[test]
    fn test_face_outside_frame_is_low_quality() {
        let matcher = matcher_with(Arc::new(BrightnessEmbedder::new()), None);
        let m = matcher
            .match_faces(&textured_frame(), &[FaceBox::new(500, 500, 40, 40)])
            .unwrap();
        assert_eq!(m[0].outcome, MatchOutcome::unmatched(UnmatchedReason::LowQuality));
    }

    #[test]
    fn test_crop_padding() {
        let gray = GrayImage::filled(100, 100, 0);
        let crop = crop_face(&gray, &FaceBox::new(30, 30, 45, 45)).unwrap();
        assert_eq!((crop.width(), crop.height()), (51, 51));
        let edge = crop_face(&gray, &FaceBox::new(0, 0, 20, 20)).unwrap();
        assert_eq!((edge.width(), edge.height()), (23, 23));
    }
}
