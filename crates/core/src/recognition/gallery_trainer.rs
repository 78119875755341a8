use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;

use crate::detection::domain::face_detector::FaceDetector;
use crate::preprocessing::infrastructure::face_normalizer::normalize_face;
use crate::preprocessing::infrastructure::filters;
use crate::preprocessing::infrastructure::frame_preprocessor::FramePreprocessor;
use crate::preprocessing::infrastructure::image_decoder::load_frame;
use crate::recognition::domain::embedder::Embedder;
use crate::recognition::domain::identity_gallery::{GalleryEntry, GalleryError, IdentityGallery};
use crate::recognition::face_matcher::crop_face;
use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::frame::{Frame, GrayImage};
use crate::shared::ids::StudentId;

/// Brightness factors applied to each enrollment crop when augmenting.
const AUGMENT_BRIGHTNESS: [f64; 2] = [0.8, 1.2];

/// One labelled enrollment photo.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnrollmentImage {
    pub student_id: StudentId,
    pub path: PathBuf,
}

/// Collects enrollment photos under `dir`.
///
/// Two layouts are accepted and may be mixed: `<dir>/<student_id>/<any>.jpg`
/// and `<dir>/<student_id>[_n].jpg`. Files without an image extension are
/// ignored. Results are sorted by path.
pub fn scan_enrollment_dir(dir: &Path) -> Result<Vec<EnrollmentImage>, GalleryError> {
    let io_err = |path: &Path, e| GalleryError::Io {
        path: path.display().to_string(),
        source: e,
    };
    let mut images = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| io_err(dir, e))? {
        let path = entry.map_err(|e| io_err(dir, e))?.path();
        if path.is_dir() {
            let Some(student) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let student_id = StudentId::new(student);
            for inner in fs::read_dir(&path).map_err(|e| io_err(&path, e))? {
                let file = inner.map_err(|e| io_err(&path, e))?.path();
                if is_image(&file) {
                    images.push(EnrollmentImage {
                        student_id: student_id.clone(),
                        path: file,
                    });
                }
            }
        } else if is_image(&path) {
            if let Some(student_id) = student_from_file_name(&path) {
                images.push(EnrollmentImage { student_id, path });
            }
        }
    }
    images.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(images)
}

fn is_image(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// `S123_2.jpg` -> `S123`; `S123.jpg` -> `S123`. A trailing `_<digits>` is
/// an image counter, anything else belongs to the id.
fn student_from_file_name(path: &Path) -> Option<StudentId> {
    let stem = path.file_stem()?.to_str()?;
    let id = match stem.rsplit_once('_') {
        Some((head, tail))
            if !head.is_empty() && !tail.is_empty() && tail.chars().all(|c| c.is_ascii_digit()) =>
        {
            head
        }
        _ => stem,
    };
    (!id.is_empty()).then(|| StudentId::new(id))
}

/// Builds gallery snapshots from enrollment photos.
///
/// Each photo contributes the embedding of its largest detected face. Photos
/// that fail to load, or show no face, are skipped with a warning.
pub struct GalleryTrainer {
    preprocessor: FramePreprocessor,
    detector: Arc<dyn FaceDetector>,
    embedder: Arc<dyn Embedder>,
    augment: bool,
}

impl GalleryTrainer {
    pub fn new(
        preprocessor: FramePreprocessor,
        detector: Arc<dyn FaceDetector>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            preprocessor,
            detector,
            embedder,
            augment: false,
        }
    }

    /// Also enroll a mirrored copy and brightness variants of every face.
    pub fn with_augmentation(mut self, augment: bool) -> Self {
        self.augment = augment;
        self
    }

    /// Trains a snapshot whose version follows `previous_version`.
    pub fn train(
        &self,
        images: &[EnrollmentImage],
        previous_version: Option<u64>,
    ) -> Result<IdentityGallery, GalleryError> {
        let mut entries = Vec::new();
        for image in images {
            let frame = match load_frame(&image.path, Utc::now()) {
                Ok(f) => f,
                Err(e) => {
                    log::warn!("Skipping {}: {e}", image.path.display());
                    continue;
                }
            };
            match self.embed_frame(&frame) {
                Ok(Some(embeddings)) => {
                    entries.extend(embeddings.into_iter().map(|embedding| GalleryEntry {
                        student_id: image.student_id.clone(),
                        embedding,
                    }));
                }
                Ok(None) => log::warn!("No face found in {}, skipping", image.path.display()),
                Err(e) => log::warn!("Skipping {}: {e}", image.path.display()),
            }
        }
        if entries.is_empty() {
            return Err(GalleryError::NoEnrollments);
        }

        let version = previous_version.map_or(1, |v| v + 1);
        let gallery = IdentityGallery::new(version, entries)?;
        log::info!(
            "Trained gallery version {version}: {} entries for {} students from {} images",
            gallery.len(),
            gallery.students().len(),
            images.len()
        );
        Ok(gallery)
    }

    /// Embeddings for the largest face in `frame`, or `None` when no face is found.
    pub fn embed_frame(
        &self,
        frame: &Frame,
    ) -> Result<Option<Vec<Vec<f32>>>, Box<dyn std::error::Error + Send + Sync>> {
        let pre = self.preprocessor.preprocess(frame)?;
        let faces = self.detector.detect(&pre)?;
        let Some(face) = faces.iter().max_by_key(|f| f.area()) else {
            return Ok(None);
        };
        let Some(crop) = crop_face(pre.gray(), face) else {
            return Ok(None);
        };

        let normalized = normalize_face(&crop);
        let mut variants = vec![normalized.clone()];
        if self.augment {
            variants.push(mirror(&normalized));
            for alpha in AUGMENT_BRIGHTNESS {
                variants.push(filters::scale_contrast(&normalized, alpha, 0.0));
            }
        }
        let embeddings = variants
            .iter()
            .map(|v| self.embedder.embed(v))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(embeddings))
    }
}

fn mirror(img: &GrayImage) -> GrayImage {
    let (w, h) = (img.width(), img.height());
    let mut data = Vec::with_capacity(w * h);
    for y in 0..h {
        data.extend((0..w).rev().map(|x| img.get(x, y)));
    }
    GrayImage::new(data, w, h)
}
