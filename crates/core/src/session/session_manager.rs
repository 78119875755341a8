use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::presence::domain::attendance_status::{AttendanceStatus, StatusThresholds};
use crate::presence::domain::attendance_summary::AttendanceSummary;
use crate::presence::domain::detection_event::DetectionEvent;
use crate::presence::domain::presence_aggregator::PresenceAggregator;
use crate::presence::domain::presence_record::{
    FinalizedAttendance, PresenceRecord, RecordError, RecordKey,
};
use crate::presence::presence_ledger::{PresenceLedger, RecordUpdate, StatusChange};
use crate::session::domain::attendance_store::AttendanceStore;
use crate::session::domain::session::{Session, SessionSpec, SessionState};
use crate::shared::config::{ConfigError, EngineConfig};
use crate::shared::ids::{SessionId, StudentId};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("unknown session {0}")]
    UnknownSession(SessionId),
    #[error("session {id} cannot start: it is {state}")]
    InvalidTransition { id: SessionId, state: SessionState },
    #[error("student {student_id} is not enrolled in session {session_id}")]
    NotEnrolled {
        student_id: StudentId,
        session_id: SessionId,
    },
    #[error("invalid session: {0}")]
    InvalidSpec(String),
    #[error(transparent)]
    Thresholds(#[from] ConfigError),
    #[error(transparent)]
    Record(#[from] RecordError),
}

/// Result of offering one detection to a session. Only `Recorded` changes state.
#[derive(Clone, Debug, PartialEq)]
pub enum RecordOutcome {
    Recorded(RecordUpdate),
    /// Recognized, but not on the session roster.
    NotEnrolled,
    /// The session has not started yet.
    NotActive,
    /// Arrived after the session was finalized; dropped.
    SessionClosed,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FinalizeOutcome {
    pub session_id: SessionId,
    /// Records locked by this call; 0 when the session had already ended.
    pub finalized_count: usize,
    pub status_changes: Vec<StatusChange>,
    pub records: Vec<FinalizedAttendance>,
    /// Whether the records have reached the attendance store.
    pub stored: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickReport {
    pub started: Vec<SessionId>,
    pub finalized: Vec<FinalizeOutcome>,
}

struct SessionSlot {
    session: RwLock<Session>,
    ledger: PresenceLedger,
    stored: Mutex<bool>,
}

impl SessionSlot {
    fn read(&self) -> RwLockReadGuard<'_, Session> {
        self.session.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Session> {
        self.session.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns every session's lifecycle and presence ledger.
///
/// Detections are recorded while holding the session's read guard, so many
/// students update in parallel. Closing a session takes the write guard,
/// which waits for every in-flight detection to drain before the final
/// aggregation pass and lock. A detection that loses that race sees the
/// session as ended and is reported as `SessionClosed`.
pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, Arc<SessionSlot>>>,
    aggregator: PresenceAggregator,
    thresholds: StatusThresholds,
    store: Option<Arc<dyn AttendanceStore>>,
}

impl SessionManager {
    pub fn new(aggregator: PresenceAggregator, thresholds: StatusThresholds) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            aggregator,
            thresholds,
            store: None,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(
            PresenceAggregator::from_seconds(config.continuity_buffer_seconds),
            config.thresholds()?,
        ))
    }

    pub fn with_store(mut self, store: Arc<dyn AttendanceStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn schedule(&self, spec: SessionSpec) -> Result<SessionId, SessionError> {
        self.schedule_with_id(SessionId::generate(), spec)
    }

    pub fn schedule_with_id(
        &self,
        id: SessionId,
        spec: SessionSpec,
    ) -> Result<SessionId, SessionError> {
        if spec.scheduled_duration <= Duration::zero() {
            return Err(SessionError::InvalidSpec(format!(
                "scheduled duration must be positive, got {}s",
                spec.scheduled_duration.num_seconds()
            )));
        }
        if spec.start.checked_add_signed(spec.scheduled_duration).is_none() {
            return Err(SessionError::InvalidSpec(format!(
                "scheduled duration of {}s runs past the end of the calendar",
                spec.scheduled_duration.num_seconds()
            )));
        }
        let thresholds = match spec.thresholds {
            Some(t) => StatusThresholds::new(t.present(), t.partial(), t.late())?,
            None => self.thresholds,
        };
        let key = RecordKey {
            session_id: id,
            course_registration_id: spec.course_registration_id.clone(),
            session_date: spec.date,
        };
        let ledger = PresenceLedger::new(
            key,
            spec.scheduled_duration,
            self.aggregator,
            thresholds,
        );

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        if sessions.contains_key(&id) {
            return Err(SessionError::InvalidSpec(format!("session {id} already exists")));
        }
        log::info!(
            "Scheduled session {id} for {} at {} ({} min, {} students)",
            spec.course_registration_id,
            spec.start,
            spec.scheduled_duration.num_minutes(),
            spec.roster.len()
        );
        sessions.insert(
            id,
            Arc::new(SessionSlot {
                session: RwLock::new(Session::new(id, spec)),
                ledger,
                stored: Mutex::new(false),
            }),
        );
        Ok(id)
    }

    /// Activates a scheduled session and creates an absent record for every
    /// roster student. Starting an active session is a no-op.
    pub fn start(&self, id: SessionId, now: DateTime<Utc>) -> Result<(), SessionError> {
        let slot = self.slot(id)?;
        let mut session = slot.write();
        match session.state() {
            SessionState::Active => Ok(()),
            SessionState::Ended => Err(SessionError::InvalidTransition {
                id,
                state: SessionState::Ended,
            }),
            SessionState::Scheduled => {
                session.activate(now);
                slot.ledger.seed(session.spec().roster.iter().cloned());
                log::info!("Session {id} is active");
                Ok(())
            }
        }
    }

    /// Finalizes and locks every record of the session, then hands them to
    /// the attendance store.
    ///
    /// Blocks until in-flight detections for the session have drained.
    /// Closing an ended session changes nothing and returns the same records;
    /// it only retries a store hand-off that previously failed.
    pub fn end_session(
        &self,
        id: SessionId,
        now: DateTime<Utc>,
    ) -> Result<FinalizeOutcome, SessionError> {
        let slot = self.slot(id)?;
        let (records, status_changes, finalized_count) = {
            let mut session = slot.write();
            let previous = session.state();
            let newly_ended = session.end(now);
            if newly_ended {
                if previous == SessionState::Scheduled {
                    log::warn!("Session {id} closed before it started; every student is absent");
                }
                slot.ledger.seed(session.spec().roster.iter().cloned());
            }
            let (records, changes) = slot.ledger.finalize();
            let count = if newly_ended { records.len() } else { 0 };
            (records, changes, count)
        };

        if finalized_count > 0 || !status_changes.is_empty() {
            log::info!(
                "Session {id} ended: {finalized_count} records finalized, {} status changes",
                status_changes.len()
            );
        }
        let stored = self.hand_off(id, &slot, &records);
        Ok(FinalizeOutcome {
            session_id: id,
            finalized_count,
            status_changes,
            records,
            stored,
        })
    }

    fn hand_off(&self, id: SessionId, slot: &SessionSlot, records: &[FinalizedAttendance]) -> bool {
        let Some(store) = &self.store else {
            return false;
        };
        let mut stored = slot.stored.lock().unwrap_or_else(PoisonError::into_inner);
        if *stored {
            return true;
        }
        match store.store_session(id, records) {
            Ok(()) => {
                *stored = true;
                true
            }
            Err(e) => {
                log::warn!("Failed to store session {id}, will retry on next close: {e}");
                false
            }
        }
    }

    /// Offers one matched detection to a session.
    pub fn record_detection(
        &self,
        id: SessionId,
        event: DetectionEvent,
    ) -> Result<RecordOutcome, SessionError> {
        let slot = self.slot(id)?;
        let session = slot.read();
        match session.state() {
            SessionState::Scheduled => return Ok(RecordOutcome::NotActive),
            SessionState::Ended => {
                log::info!(
                    "Dropping detection of {} for closed session {id}",
                    event.student_id()
                );
                return Ok(RecordOutcome::SessionClosed);
            }
            SessionState::Active => {}
        }
        if !session.is_enrolled(event.student_id()) {
            log::debug!("{} is not enrolled in session {id}", event.student_id());
            return Ok(RecordOutcome::NotEnrolled);
        }
        let update = slot.ledger.record(event)?;
        Ok(RecordOutcome::Recorded(update))
    }

    /// Sets a status by hand. The classifier never overwrites it; once the
    /// session has ended the call fails with a locked-record error.
    pub fn override_status(
        &self,
        id: SessionId,
        student: &StudentId,
        status: AttendanceStatus,
    ) -> Result<RecordUpdate, SessionError> {
        let slot = self.slot(id)?;
        let session = slot.read();
        if session.state() == SessionState::Ended {
            return Err(SessionError::Record(RecordError::Locked {
                student_id: student.clone(),
                session_id: id,
            }));
        }
        if !session.is_enrolled(student) {
            return Err(SessionError::NotEnrolled {
                student_id: student.clone(),
                session_id: id,
            });
        }
        let update = slot.ledger.override_status(student, status)?;
        log::info!("Manual override in session {id}: {student} -> {status}");
        Ok(update)
    }

    /// Starts sessions whose start time has come and ends those past their
    /// scheduled end.
    pub fn tick(&self, now: DateTime<Utc>) -> Result<TickReport, SessionError> {
        let mut report = TickReport::default();
        for slot in self.slots() {
            let (id, state, start, end) = {
                let s = slot.read();
                (s.id(), s.state(), s.spec().start, s.scheduled_end())
            };
            if state == SessionState::Scheduled && now >= start && now < end {
                self.start(id, now)?;
                report.started.push(id);
            }
            if state != SessionState::Ended && now >= end {
                report.finalized.push(self.end_session(id, now)?);
            }
        }
        Ok(report)
    }

    /// Ends every session that is still open.
    pub fn end_all(&self, now: DateTime<Utc>) -> Vec<FinalizeOutcome> {
        let mut outcomes = Vec::new();
        for slot in self.slots() {
            let (id, state) = {
                let s = slot.read();
                (s.id(), s.state())
            };
            if state == SessionState::Ended {
                continue;
            }
            match self.end_session(id, now) {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => log::warn!("Failed to end session {id}: {e}"),
            }
        }
        outcomes
    }

    /// Drops ended sessions whose records reached the store.
    pub fn prune_stored(&self) -> usize {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let before = sessions.len();
        sessions.retain(|_, slot| {
            let ended = slot.read().state() == SessionState::Ended;
            !(ended && *slot.stored.lock().unwrap_or_else(PoisonError::into_inner))
        });
        before - sessions.len()
    }

    pub fn session_stats(
        &self,
        id: SessionId,
        now: DateTime<Utc>,
    ) -> Result<AttendanceSummary, SessionError> {
        let records = self.slot(id)?.ledger.records();
        Ok(AttendanceSummary::from_records(records.iter(), now))
    }

    pub fn session(&self, id: SessionId) -> Result<Session, SessionError> {
        Ok(self.slot(id)?.read().clone())
    }

    pub fn state(&self, id: SessionId) -> Result<SessionState, SessionError> {
        Ok(self.slot(id)?.read().state())
    }

    pub fn sessions(&self) -> Vec<Session> {
        self.slots().iter().map(|slot| slot.read().clone()).collect()
    }

    /// The active session at `venue`; the earliest-starting one if several overlap.
    pub fn active_session_at(&self, venue: &str) -> Option<Session> {
        self.sessions()
            .into_iter()
            .filter(|s| s.state() == SessionState::Active)
            .filter(|s| s.spec().venue.as_deref() == Some(venue))
            .min_by_key(|s| s.spec().start)
    }

    pub fn records(&self, id: SessionId) -> Result<Vec<PresenceRecord>, SessionError> {
        Ok(self.slot(id)?.ledger.records())
    }

    pub fn record(
        &self,
        id: SessionId,
        student: &StudentId,
    ) -> Result<Option<PresenceRecord>, SessionError> {
        Ok(self.slot(id)?.ledger.get(student))
    }

    fn slot(&self, id: SessionId) -> Result<Arc<SessionSlot>, SessionError> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or(SessionError::UnknownSession(id))
    }

    fn slots(&self) -> Vec<Arc<SessionSlot>> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        let mut slots: Vec<_> = sessions.values().cloned().collect();
        slots.sort_by_key(|slot| {
            let s = slot.read();
            (s.spec().start, s.id())
        });
        slots
    }
}
