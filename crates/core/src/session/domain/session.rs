use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::presence::domain::attendance_status::StatusThresholds;
use crate::shared::ids::{CourseRegistrationId, SessionId, StudentId};

/// `Scheduled -> Active -> Ended`. No other transition exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Scheduled,
    Active,
    Ended,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Scheduled => "scheduled",
            SessionState::Active => "active",
            SessionState::Ended => "ended",
        };
        f.write_str(s)
    }
}

/// What the timetable knows about one class meeting.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionSpec {
    pub course_registration_id: CourseRegistrationId,
    pub date: NaiveDate,
    pub start: DateTime<Utc>,
    pub scheduled_duration: Duration,
    /// Students expected to attend. Empty means attendance is open to
    /// every recognized student.
    pub roster: BTreeSet<StudentId>,
    pub venue: Option<String>,
    /// Per-session override of the institution thresholds.
    pub thresholds: Option<StatusThresholds>,
}

impl SessionSpec {
    pub fn new(
        course_registration_id: CourseRegistrationId,
        start: DateTime<Utc>,
        scheduled_duration: Duration,
    ) -> Self {
        Self {
            course_registration_id,
            date: start.date_naive(),
            start,
            scheduled_duration,
            roster: BTreeSet::new(),
            venue: None,
            thresholds: None,
        }
    }

    pub fn with_roster(mut self, roster: impl IntoIterator<Item = StudentId>) -> Self {
        self.roster = roster.into_iter().collect();
        self
    }

    pub fn with_venue(mut self, venue: impl Into<String>) -> Self {
        self.venue = Some(venue.into());
        self
    }

    pub fn with_thresholds(mut self, thresholds: StatusThresholds) -> Self {
        self.thresholds = Some(thresholds);
        self
    }
}

#[derive(Clone, Debug)]
pub struct Session {
    id: SessionId,
    spec: SessionSpec,
    state: SessionState,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(id: SessionId, spec: SessionSpec) -> Self {
        Self {
            id,
            spec,
            state: SessionState::Scheduled,
            started_at: None,
            ended_at: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn spec(&self) -> &SessionSpec {
        &self.spec
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn scheduled_end(&self) -> DateTime<Utc> {
        self.spec.start + self.spec.scheduled_duration
    }

    pub fn is_enrolled(&self, student: &StudentId) -> bool {
        self.spec.roster.is_empty() || self.spec.roster.contains(student)
    }

    /// Moves `Scheduled -> Active`. Returns `false` from any other state.
    pub fn activate(&mut self, now: DateTime<Utc>) -> bool {
        if self.state != SessionState::Scheduled {
            return false;
        }
        self.state = SessionState::Active;
        self.started_at = Some(now);
        true
    }

    /// Moves to `Ended` from either earlier state. Returns `false` if
    /// already ended.
    pub fn end(&mut self, now: DateTime<Utc>) -> bool {
        if self.state == SessionState::Ended {
            return false;
        }
        self.state = SessionState::Ended;
        self.ended_at = Some(now);
        true
    }
}
