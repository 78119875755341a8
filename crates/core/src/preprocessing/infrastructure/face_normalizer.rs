use crate::preprocessing::infrastructure::filters;
use crate::shared::constants::FACE_CROP_SIZE;
use crate::shared::frame::GrayImage;

const FACE_GAMMA: f64 = 1.3;
const FACE_CLAHE_CLIP: f64 = 3.5;
const FACE_CLAHE_TILES: usize = 4;
const FACE_BILATERAL_DIAMETER: usize = 5;
const FACE_BILATERAL_SIGMA: f64 = 50.0;

/// Canonical face crop handed to the embedder: lighting-normalized, sharpened
/// and stretched to the full range, resized to `FACE_CROP_SIZE` square.
pub fn normalize_face(crop: &GrayImage) -> GrayImage {
    if crop.is_empty() {
        return GrayImage::filled(FACE_CROP_SIZE, FACE_CROP_SIZE, 0);
    }
    let lifted = filters::gamma_correct(crop, FACE_GAMMA);
    let equalized = filters::clahe(&lifted, FACE_CLAHE_CLIP, FACE_CLAHE_TILES);
    let smoothed = filters::bilateral(
        &equalized,
        FACE_BILATERAL_DIAMETER,
        FACE_BILATERAL_SIGMA,
        FACE_BILATERAL_SIGMA,
    );
    let sharpened = filters::sharpen(&smoothed);
    filters::normalize_min_max(&sharpened).resize(FACE_CROP_SIZE, FACE_CROP_SIZE)
}
