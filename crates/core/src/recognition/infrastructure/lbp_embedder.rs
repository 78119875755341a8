/// Local-binary-pattern histogram embedder.
///
/// Describes a face by the distribution of uniform 8-neighbour LBP codes in
/// each cell of a grid laid over the crop. Needs no model file, so it is the
/// default when no ONNX embedding model is configured. Weaker than a learned
/// embedding but stable under the global brightness changes typical of
/// classroom lighting.
use crate::recognition::domain::embedder::{l2_normalize, Embedder};
use crate::shared::frame::GrayImage;

pub const DEFAULT_GRID: usize = 8;

/// 58 uniform patterns plus one shared bin for every non-uniform code.
const BINS: usize = 59;

pub struct LbpHistogramEmbedder {
    grid: usize,
    lookup: [u8; 256],
}

impl LbpHistogramEmbedder {
    pub fn new(grid: usize) -> Self {
        Self {
            grid: grid.max(1),
            lookup: uniform_lookup(),
        }
    }

    fn codes(&self, img: &GrayImage) -> Vec<u8> {
        let (w, h) = (img.width(), img.height());
        let mut out = vec![0u8; w * h];
        for y in 0..h {
            for x in 0..w {
                let c = img.get(x, y);
                let (xi, yi) = (x as isize, y as isize);
                let neighbours = [
                    (-1, -1),
                    (0, -1),
                    (1, -1),
                    (1, 0),
                    (1, 1),
                    (0, 1),
                    (-1, 1),
                    (-1, 0),
                ];
                let mut code = 0u8;
                for (bit, (dx, dy)) in neighbours.iter().enumerate() {
                    if img.get_clamped(xi + dx, yi + dy) >= c {
                        code |= 1 << bit;
                    }
                }
                out[y * w + x] = self.lookup[code as usize];
            }
        }
        out
    }
}

impl Default for LbpHistogramEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_GRID)
    }
}

impl Embedder for LbpHistogramEmbedder {
    fn dimension(&self) -> usize {
        self.grid * self.grid * BINS
    }

    fn embed(&self, face: &GrayImage) -> Result<Vec<f32>, Box<dyn std::error::Error + Send + Sync>> {
        if face.is_empty() {
            return Err("cannot embed an empty face crop".into());
        }
        let (w, h) = (face.width(), face.height());
        let codes = self.codes(face);
        let mut hist = vec![0.0f32; self.dimension()];

        for y in 0..h {
            let cy = (y * self.grid / h).min(self.grid - 1);
            for x in 0..w {
                let cx = (x * self.grid / w).min(self.grid - 1);
                let cell = cy * self.grid + cx;
                hist[cell * BINS + codes[y * w + x] as usize] += 1.0;
            }
        }

        // Square-root (Hellinger) scaling keeps dominant flat-skin bins from
        // swamping the texture bins.
        for v in hist.iter_mut() {
            *v = v.sqrt();
        }
        l2_normalize(&mut hist);
        Ok(hist)
    }
}

/// Maps every 8-bit code to its uniform-pattern bin (at most two 0/1
/// transitions around the circle); the rest share the last bin.
fn uniform_lookup() -> [u8; 256] {
    let mut table = [(BINS - 1) as u8; 256];
    let mut next = 0u8;
    for code in 0..256u32 {
        let rotated = (code >> 1) | ((code & 1) << 7);
        if (code ^ rotated).count_ones() <= 2 {
            table[code as usize] = next;
            next += 1;
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::domain::embedder::cosine_distance;
    use approx::assert_relative_eq;

    fn gradient(w: usize, h: usize, offset: u8) -> GrayImage {
        let data = (0..w * h)
            .map(|i| (i % w + i / w) as u8 + offset)
            .collect();
        GrayImage::new(data, w, h)
    }

    fn stripes(w: usize, h: usize, period: usize) -> GrayImage {
        let data = (0..w * h)
            .map(|i| if (i / w / period) % 2 == 0 { 30 } else { 220 })
            .collect();
        GrayImage::new(data, w, h)
    }

    #[test]
    fn test_uniform_lookup_has_58_patterns() {
        let table = uniform_lookup();
        let uniform = table.iter().filter(|&&b| (b as usize) < BINS - 1).count();
        assert_eq!(uniform, 58);
        assert_eq!(table[0], 0);
        // 0b01010101 has eight transitions
        assert_eq!(table[0b0101_0101] as usize, BINS - 1);
    }

    #[test]
    fn test_dimension_and_norm() {
        let e = LbpHistogramEmbedder::default();
        assert_eq!(e.dimension(), 8 * 8 * 59);
        let v = e.embed(&gradient(100, 100, 0)).unwrap();
        assert_eq!(v.len(), e.dimension());
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert_relative_eq!(norm, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_brightness_shift_is_invariant() {
        let e = LbpHistogramEmbedder::default();
        let a = e.embed(&gradient(100, 100, 0)).unwrap();
        let b = e.embed(&gradient(100, 100, 40)).unwrap();
        assert!(cosine_distance(&a, &b) < 1e-6);
    }

    #[test]
    fn test_different_textures_are_apart() {
        let e = LbpHistogramEmbedder::default();
        let a = e.embed(&gradient(100, 100, 0)).unwrap();
        let b = e.embed(&stripes(100, 100, 3)).unwrap();
        assert!(cosine_distance(&a, &b) > 0.2);
    }

    #[test]
    fn test_empty_crop_is_error() {
        let e = LbpHistogramEmbedder::default();
        assert!(e.embed(&GrayImage::new(Vec::new(), 0, 0)).is_err());
    }
}
