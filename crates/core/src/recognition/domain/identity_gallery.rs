use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::recognition::domain::embedder::{cosine_distance, l2_normalize};
use crate::shared::ids::StudentId;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("gallery entry for {student_id} has {got} dimensions, expected {expected}")]
    MixedDimensions {
        student_id: StudentId,
        expected: usize,
        got: usize,
    },
    #[error("gallery entry for {student_id} is empty or not finite")]
    InvalidEmbedding { student_id: StudentId },
    #[error("gallery version {offered} is not newer than published version {current}")]
    StaleVersion { current: u64, offered: u64 },
    #[error("unsupported gallery file format '{format}' version {format_version}")]
    UnsupportedFormat { format: String, format_version: u32 },
    #[error("gallery file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("gallery file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("no usable enrollment images")]
    NoEnrollments,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GalleryEntry {
    pub student_id: StudentId,
    pub embedding: Vec<f32>,
}

/// Nearest gallery entry for a query embedding.
#[derive(Clone, Debug, PartialEq)]
pub struct GalleryHit<'a> {
    pub student_id: &'a StudentId,
    pub distance: f64,
}

/// Immutable, versioned set of known identities.
///
/// Embeddings are L2-normalized at construction and every entry shares one
/// dimension. A student may have several entries (one per enrollment image).
/// Never mutated after construction; a retrain builds a new gallery.
#[derive(Clone, Debug)]
pub struct IdentityGallery {
    version: u64,
    dimension: usize,
    entries: Vec<GalleryEntry>,
}

impl IdentityGallery {
    pub fn new(version: u64, entries: Vec<GalleryEntry>) -> Result<Self, GalleryError> {
        let dimension = entries.first().map_or(0, |e| e.embedding.len());
        let mut normalized = Vec::with_capacity(entries.len());
        for mut entry in entries {
            if entry.embedding.is_empty() || entry.embedding.iter().any(|v| !v.is_finite()) {
                return Err(GalleryError::InvalidEmbedding {
                    student_id: entry.student_id,
                });
            }
            if entry.embedding.len() != dimension {
                return Err(GalleryError::MixedDimensions {
                    student_id: entry.student_id,
                    expected: dimension,
                    got: entry.embedding.len(),
                });
            }
            l2_normalize(&mut entry.embedding);
            normalized.push(entry);
        }
        Ok(Self {
            version,
            dimension,
            entries: normalized,
        })
    }

    pub fn empty(version: u64) -> Self {
        Self {
            version,
            dimension: 0,
            entries: Vec::new(),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Embedding length; 0 for an empty gallery.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct students, sorted.
    pub fn students(&self) -> Vec<&StudentId> {
        let mut ids: Vec<&StudentId> = self.entries.iter().map(|e| &e.student_id).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Closest entry by cosine distance. `None` for an empty gallery or a
    /// query of the wrong dimension. `query` must already be normalized.
    pub fn nearest(&self, query: &[f32]) -> Option<GalleryHit<'_>> {
        if query.len() != self.dimension {
            return None;
        }
        self.entries
            .iter()
            .map(|e| GalleryHit {
                student_id: &e.student_id,
                distance: cosine_distance(query, &e.embedding),
            })
            .min_by(|a, b| {
                a.distance
                    .partial_cmp(&b.distance)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }
}
