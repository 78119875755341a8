use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::recognition::domain::match_outcome::UnmatchedReason;
use crate::shared::face_box::{DistanceBand, FaceBox};
use crate::shared::ids::{SessionId, StudentId};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchReport {
    pub student_id: StudentId,
    pub confidence: f64,
    pub bounding_box: FaceBox,
    pub distance_band: DistanceBand,
    /// Whether the match became a detection event in the session.
    pub recorded: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnmatchedFace {
    pub bounding_box: FaceBox,
    pub reason: UnmatchedReason,
    pub quality: f64,
}

/// Routine conditions worth surfacing alongside a frame's results.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FrameDiagnostic {
    /// No session id given and none resolved for the camera.
    NoActiveSession,
    /// The session exists but has not started.
    SessionNotStarted { session_id: SessionId },
    /// Matches arrived after the session was finalized and were dropped.
    SessionClosed { session_id: SessionId },
    /// Recognized, but not on the session roster.
    NotEnrolled { student_id: StudentId },
    /// Matching ran before any gallery snapshot was published.
    NoGalleryLoaded,
}

/// Wall-clock time spent in each stage for one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StageTimings {
    pub decode_ms: f64,
    pub preprocess_ms: f64,
    pub detect_ms: f64,
    pub match_ms: f64,
    pub record_ms: f64,
}

impl StageTimings {
    pub fn stages(&self) -> [(&'static str, f64); 5] {
        [
            ("decode", self.decode_ms),
            ("preprocess", self.preprocess_ms),
            ("detect", self.detect_ms),
            ("match", self.match_ms),
            ("record", self.record_ms),
        ]
    }
}

/// Per-frame output to the caller and diagnostics sink.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    pub captured_at: DateTime<Utc>,
    pub session_id: Option<SessionId>,
    pub faces_detected: usize,
    pub matches: Vec<MatchReport>,
    pub unmatched_count: usize,
    pub unmatched: Vec<UnmatchedFace>,
    pub diagnostics: Vec<FrameDiagnostic>,
    pub processing_time_ms: f64,
    pub timings: StageTimings,
}

impl FrameReport {
    pub fn recorded_count(&self) -> usize {
        self.matches.iter().filter(|m| m.recorded).count()
    }

    pub(crate) fn push_diagnostic(&mut self, diagnostic: FrameDiagnostic) {
        if !self.diagnostics.contains(&diagnostic) {
            self.diagnostics.push(diagnostic);
        }
    }
}
