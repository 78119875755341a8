use crate::shared::frame::GrayImage;

const SHARPNESS_NORM: f64 = 1000.0;
const SIZE_NORM_AREA: f64 = 200.0 * 200.0;
const SIZE_BOOST_AREA: f64 = 100.0 * 100.0;

/// Variance of the 4-neighbour Laplacian response; higher is sharper.
pub fn laplacian_variance(img: &GrayImage) -> f64 {
    let (w, h) = (img.width(), img.height());
    if img.is_empty() {
        return 0.0;
    }
    let n = (w * h) as f64;
    let mut sum = 0.0;
    let mut sq_sum = 0.0;
    for y in 0..h {
        for x in 0..w {
            let (xi, yi) = (x as isize, y as isize);
            let lap = img.get_clamped(xi - 1, yi) as f64
                + img.get_clamped(xi + 1, yi) as f64
                + img.get_clamped(xi, yi - 1) as f64
                + img.get_clamped(xi, yi + 1) as f64
                - 4.0 * img.get(x, y) as f64;
            sum += lap;
            sq_sum += lap * lap;
        }
    }
    let mean = sum / n;
    (sq_sum / n - mean * mean).max(0.0)
}

/// Quality of a face crop in `[0, 1]`, from sharpness, intensity spread and
/// the detected face's area in frame pixels.
///
/// `0.4 * sharpness + 0.3 * contrast + 0.3 * size`, plus up to 0.2 for
/// faces of at least 100x100 px, clamped to 1.
pub fn quality_score(crop: &GrayImage, face_area: i64) -> f64 {
    if crop.is_empty() {
        return 0.0;
    }
    let area = face_area.max(0) as f64;
    let sharpness = (laplacian_variance(crop) / SHARPNESS_NORM).min(1.0);
    let contrast = crop.std_dev() / 255.0;
    let size = (area / SIZE_NORM_AREA).min(1.0);
    let base = 0.4 * sharpness + 0.3 * contrast + 0.3 * size;
    let boost = 0.2 * (area / SIZE_BOOST_AREA).min(1.0);
    (base + boost).clamp(0.0, 1.0)
}
