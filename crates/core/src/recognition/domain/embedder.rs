use crate::shared::frame::GrayImage;

/// Black-box `embed(face) -> vector` function.
///
/// Receives normalized square face crops and must return vectors of a fixed
/// [`Embedder::dimension`]. Called concurrently from every frame worker.
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;

    fn embed(&self, face: &GrayImage) -> Result<Vec<f32>, Box<dyn std::error::Error + Send + Sync>>;
}

pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Dot product of L2-normalized vectors equals cosine similarity.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum()
}

/// `1 - cosine_similarity`, in `[0, 2]` for normalized inputs.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    (1.0 - cosine_similarity(a, b)).clamp(0.0, 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_l2_normalize_unit_vector() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        let mut v = vec![0.0, 0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_cosine_distance_identical_and_opposite() {
        let a = [0.6, 0.8];
        let b = [-0.6, -0.8];
        assert_relative_eq!(cosine_distance(&a, &a), 0.0, epsilon = 1e-6);
        assert_relative_eq!(cosine_distance(&a, &b), 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_cosine_distance_orthogonal() {
        assert_relative_eq!(cosine_distance(&[1.0, 0.0], &[0.0, 1.0]), 1.0);
    }
}
