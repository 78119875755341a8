use crate::preprocessing::domain::preprocessed_frame::PreprocessedFrame;
use crate::shared::face_box::FaceBox;

/// Domain interface for face detection.
///
/// One detector instance serves every frame worker, hence `&self` and
/// `Sync`. An empty result is the normal outcome for an empty room, not an
/// error; errors are reserved for broken models.
pub trait FaceDetector: Send + Sync {
    fn detect(
        &self,
        frame: &PreprocessedFrame,
    ) -> Result<Vec<FaceBox>, Box<dyn std::error::Error + Send + Sync>>;
}
