use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::presence::domain::attendance_status::{AttendanceStatus, StatusThresholds};
use crate::presence::domain::detection_event::DetectionEvent;
use crate::shared::ids::{CourseRegistrationId, SessionId, StudentId};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("presence record for {student_id} in session {session_id} is locked")]
    Locked {
        student_id: StudentId,
        session_id: SessionId,
    },
    #[error("detection for {got} appended to the record of {expected}")]
    WrongStudent { expected: StudentId, got: StudentId },
}

/// Identity of the session a record belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub session_id: SessionId,
    pub course_registration_id: CourseRegistrationId,
    pub session_date: NaiveDate,
}

/// Accumulated per-student, per-session presence state.
///
/// Mutated by the aggregator on every new event, frozen by [`PresenceRecord::lock`].
/// Once locked, every mutating method fails with [`RecordError::Locked`].
#[derive(Clone, Debug)]
pub struct PresenceRecord {
    student_id: StudentId,
    key: RecordKey,
    first_detected_at: Option<DateTime<Utc>>,
    last_detected_at: Option<DateTime<Utc>>,
    detection_count: u32,
    presence_duration: Duration,
    total_session_duration: Duration,
    presence_percentage: f64,
    status: AttendanceStatus,
    is_locked: bool,
    is_manual_override: bool,
    events: Vec<DetectionEvent>,
}

impl PresenceRecord {
    /// A fresh record: absent, zero detections.
    pub fn new(student_id: StudentId, key: RecordKey, total_session_duration: Duration) -> Self {
        Self {
            student_id,
            key,
            first_detected_at: None,
            last_detected_at: None,
            detection_count: 0,
            presence_duration: Duration::zero(),
            total_session_duration,
            presence_percentage: 0.0,
            status: AttendanceStatus::Absent,
            is_locked: false,
            is_manual_override: false,
            events: Vec::new(),
        }
    }

    pub fn student_id(&self) -> &StudentId {
        &self.student_id
    }

    pub fn key(&self) -> &RecordKey {
        &self.key
    }

    pub fn session_id(&self) -> SessionId {
        self.key.session_id
    }

    pub fn first_detected_at(&self) -> Option<DateTime<Utc>> {
        self.first_detected_at
    }

    pub fn last_detected_at(&self) -> Option<DateTime<Utc>> {
        self.last_detected_at
    }

    pub fn detection_count(&self) -> u32 {
        self.detection_count
    }

    pub fn presence_duration(&self) -> Duration {
        self.presence_duration
    }

    pub fn total_session_duration(&self) -> Duration {
        self.total_session_duration
    }

    pub fn presence_percentage(&self) -> f64 {
        self.presence_percentage
    }

    pub fn status(&self) -> AttendanceStatus {
        self.status
    }

    pub fn is_locked(&self) -> bool {
        self.is_locked
    }

    pub fn is_manual_override(&self) -> bool {
        self.is_manual_override
    }

    pub fn events(&self) -> &[DetectionEvent] {
        &self.events
    }

    /// Appends an event and widens the detection window to cover it.
    ///
    /// Events may arrive out of timestamp order from parallel workers, so the
    /// window is tracked as min/max rather than first/last arrival.
    pub fn append(&mut self, event: DetectionEvent) -> Result<(), RecordError> {
        self.ensure_unlocked()?;
        if event.student_id() != &self.student_id {
            return Err(RecordError::WrongStudent {
                expected: self.student_id.clone(),
                got: event.student_id().clone(),
            });
        }
        let ts = event.timestamp();
        self.first_detected_at = Some(self.first_detected_at.map_or(ts, |f| f.min(ts)));
        self.last_detected_at = Some(self.last_detected_at.map_or(ts, |l| l.max(ts)));
        self.detection_count += 1;
        self.events.push(event);
        Ok(())
    }

    pub(crate) fn set_presence(
        &mut self,
        duration: Duration,
        percentage: f64,
    ) -> Result<(), RecordError> {
        self.ensure_unlocked()?;
        self.presence_duration = duration;
        self.presence_percentage = percentage;
        Ok(())
    }

    /// Re-derives the status from the current percentage unless an
    /// administrator has pinned it.
    pub fn classify(&mut self, thresholds: &StatusThresholds) -> Result<(), RecordError> {
        self.ensure_unlocked()?;
        if !self.is_manual_override {
            self.status = thresholds.classify(self.presence_percentage);
        }
        Ok(())
    }

    pub fn override_status(&mut self, status: AttendanceStatus) -> Result<(), RecordError> {
        self.ensure_unlocked()?;
        self.status = status;
        self.is_manual_override = true;
        Ok(())
    }

    /// Freezes the record. Locking an already locked record is a no-op.
    pub fn lock(&mut self) {
        self.is_locked = true;
    }

    pub fn to_finalized(&self) -> FinalizedAttendance {
        FinalizedAttendance {
            student_id: self.student_id.clone(),
            session_id: self.key.session_id,
            course_registration_id: self.key.course_registration_id.clone(),
            session_date: self.key.session_date,
            status: self.status,
            presence_percentage: self.presence_percentage,
            presence_duration_seconds: self.presence_duration.num_seconds(),
            detection_count: self.detection_count,
            first_detected_at: self.first_detected_at,
            last_detected_at: self.last_detected_at,
            is_manual_override: self.is_manual_override,
            is_locked: self.is_locked,
        }
    }

    fn ensure_unlocked(&self) -> Result<(), RecordError> {
        if self.is_locked {
            return Err(RecordError::Locked {
                student_id: self.student_id.clone(),
                session_id: self.key.session_id,
            });
        }
        Ok(())
    }
}

/// The per-student output handed to the attendance store once a session ends.
///
/// Carries no detection events or gallery internals.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FinalizedAttendance {
    pub student_id: StudentId,
    pub session_id: SessionId,
    pub course_registration_id: CourseRegistrationId,
    pub session_date: NaiveDate,
    pub status: AttendanceStatus,
    pub presence_percentage: f64,
    pub presence_duration_seconds: i64,
    pub detection_count: u32,
    pub first_detected_at: Option<DateTime<Utc>>,
    pub last_detected_at: Option<DateTime<Utc>>,
    pub is_manual_override: bool,
    pub is_locked: bool,
}
