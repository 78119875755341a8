use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::face_box::FaceBox;
use crate::shared::ids::StudentId;

/// One timestamped, confidence-scored sighting of a matched student.
///
/// Fields are read-only after construction; records only ever append events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    student_id: StudentId,
    timestamp: DateTime<Utc>,
    confidence: f64,
    bounding_box: FaceBox,
    quality_score: f64,
}

impl DetectionEvent {
    /// Confidence and quality are clamped into `[0, 1]`.
    pub fn new(
        student_id: StudentId,
        timestamp: DateTime<Utc>,
        confidence: f64,
        bounding_box: FaceBox,
        quality_score: f64,
    ) -> Self {
        Self {
            student_id,
            timestamp,
            confidence: clamp_unit(confidence),
            bounding_box,
            quality_score: clamp_unit(quality_score),
        }
    }

    pub fn student_id(&self) -> &StudentId {
        &self.student_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn bounding_box(&self) -> FaceBox {
        self.bounding_box
    }

    pub fn quality_score(&self) -> f64 {
        self.quality_score
    }
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_and_quality_are_clamped() {
        let e = DetectionEvent::new(
            StudentId::new("s1"),
            Utc::now(),
            1.7,
            FaceBox::new(0, 0, 10, 10),
            -0.2,
        );
        assert_eq!(e.confidence(), 1.0);
        assert_eq!(e.quality_score(), 0.0);
    }

    #[test]
    fn test_nan_confidence_becomes_zero() {
        let e = DetectionEvent::new(
            StudentId::new("s1"),
            Utc::now(),
            f64::NAN,
            FaceBox::new(0, 0, 10, 10),
            0.5,
        );
        assert_eq!(e.confidence(), 0.0);
    }
}
