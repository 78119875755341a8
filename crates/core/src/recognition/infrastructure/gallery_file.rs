use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::recognition::domain::identity_gallery::{GalleryEntry, GalleryError, IdentityGallery};
use crate::shared::constants::GALLERY_FORMAT_VERSION;

const FORMAT_NAME: &str = "attendance-gallery";

/// On-disk gallery snapshot: one JSON document, replaced wholesale on retrain.
#[derive(Debug, Serialize, Deserialize)]
struct GalleryFile {
    format: String,
    format_version: u32,
    version: u64,
    dimension: usize,
    entries: Vec<GalleryEntry>,
}

pub fn load_gallery(path: &Path) -> Result<IdentityGallery, GalleryError> {
    let json = fs::read_to_string(path).map_err(|e| GalleryError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let file: GalleryFile = serde_json::from_str(&json).map_err(|e| GalleryError::Parse {
        path: path.display().to_string(),
        source: e,
    })?;
    if file.format != FORMAT_NAME || file.format_version != GALLERY_FORMAT_VERSION {
        return Err(GalleryError::UnsupportedFormat {
            format: file.format,
            format_version: file.format_version,
        });
    }
    let gallery = IdentityGallery::new(file.version, file.entries)?;
    if !gallery.is_empty() && gallery.dimension() != file.dimension {
        return Err(GalleryError::MixedDimensions {
            student_id: gallery.entries()[0].student_id.clone(),
            expected: file.dimension,
            got: gallery.dimension(),
        });
    }
    log::info!(
        "Loaded gallery version {} from {} ({} entries)",
        gallery.version(),
        path.display(),
        gallery.len()
    );
    Ok(gallery)
}

/// Writes to a sibling temp file first so readers never see a partial snapshot.
pub fn save_gallery(gallery: &IdentityGallery, path: &Path) -> Result<(), GalleryError> {
    let file = GalleryFile {
        format: FORMAT_NAME.to_string(),
        format_version: GALLERY_FORMAT_VERSION,
        version: gallery.version(),
        dimension: gallery.dimension(),
        entries: gallery.entries().to_vec(),
    };
    let io_err = |e| GalleryError::Io {
        path: path.display().to_string(),
        source: e,
    };
    let json = serde_json::to_string(&file).map_err(|e| GalleryError::Parse {
        path: path.display().to_string(),
        source: e,
    })?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::ids::StudentId;

    fn sample() -> IdentityGallery {
        IdentityGallery::new(
            4,
            vec![
                GalleryEntry {
                    student_id: StudentId::new("s1"),
                    embedding: vec![1.0, 0.0, 0.0],
                },
                GalleryEntry {
                    student_id: StudentId::new("s2"),
                    embedding: vec![0.0, 0.0, 1.0],
                },
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_save_then_load_preserves_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gallery.json");
        save_gallery(&sample(), &path).unwrap();
        let loaded = load_gallery(&path).unwrap();
        assert_eq!(loaded.version(), 4);
        assert_eq!(loaded.dimension(), 3);
        assert_eq!(loaded.entries(), sample().entries());
        assert!(!dir.path().join("gallery.json.tmp").exists());
    }

    #[test]
    fn test_rejects_unknown_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gallery.json");
        fs::write(
            &path,
            r#"{"format":"pickle","format_version":1,"version":1,"dimension":2,"entries":[]}"#,
        )
        .unwrap();
        assert!(matches!(
            load_gallery(&path),
            Err(GalleryError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn test_rejects_declared_dimension_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gallery.json");
        fs::write(
            &path,
            r#"{"format":"attendance-gallery","format_version":1,"version":1,"dimension":3,
               "entries":[{"student_id":"a","embedding":[1.0,0.0]}]}"#,
        )
        .unwrap();
        assert!(matches!(
            load_gallery(&path),
            Err(GalleryError::MixedDimensions { .. })
        ));
    }

    #[test]
    fn test_missing_and_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_gallery(&dir.path().join("absent.json")),
            Err(GalleryError::Io { .. })
        ));
        let bad = dir.path().join("bad.json");
        fs::write(&bad, "{not json").unwrap();
        assert!(matches!(load_gallery(&bad), Err(GalleryError::Parse { .. })));
    }
}
