use serde::{Deserialize, Serialize};

use crate::shared::face_box::{DistanceBand, FaceBox};
use crate::shared::ids::StudentId;

/// Why a detected face produced no detection event. All routine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedReason {
    /// Quality below the floor; never embedded.
    LowQuality,
    /// Gallery empty or incompatible with the embedder.
    NoGalleryMatch,
    /// Nearest entry farther than the size-adjusted threshold.
    BelowConfidence,
    /// No gallery snapshot has been published yet.
    NoGallery,
}

impl std::fmt::Display for UnmatchedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnmatchedReason::LowQuality => write!(f, "low_quality"),
            UnmatchedReason::NoGalleryMatch => write!(f, "no_gallery_match"),
            UnmatchedReason::BelowConfidence => write!(f, "below_confidence"),
            UnmatchedReason::NoGallery => write!(f, "no_gallery"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MatchOutcome {
    Matched {
        student_id: StudentId,
        confidence: f64,
        distance: f64,
        gallery_version: u64,
    },
    Unmatched {
        reason: UnmatchedReason,
    },
}

impl MatchOutcome {
    pub fn unmatched(reason: UnmatchedReason) -> Self {
        MatchOutcome::Unmatched { reason }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self, MatchOutcome::Matched { .. })
    }
}

/// Everything the matcher learned about one detected face.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FaceMatch {
    pub face: FaceBox,
    pub quality: f64,
    pub distance_band: DistanceBand,
    pub outcome: MatchOutcome,
}
