use crate::detection::domain::integral_image::IntegralImage;

/// Decides whether a single scanning window contains a face.
///
/// Shared read-only across frame workers, so implementations must be
/// stateless per call.
pub trait WindowClassifier: Send + Sync {
    /// Training window size `(width, height)` at scale 1.
    fn base_size(&self) -> (usize, usize);

    /// Evaluates the window at `(x, y)` whose size is `base_size * scale`.
    /// The scaled window is guaranteed to lie inside the integral image.
    fn evaluate(&self, integral: &IntegralImage, x: usize, y: usize, scale: f64) -> bool;
}
