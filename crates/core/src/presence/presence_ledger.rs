use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::presence::domain::attendance_status::{AttendanceStatus, StatusThresholds};
use crate::presence::domain::detection_event::DetectionEvent;
use crate::presence::domain::presence_aggregator::PresenceAggregator;
use crate::presence::domain::presence_record::{
    FinalizedAttendance, PresenceRecord, RecordError, RecordKey,
};
use crate::shared::ids::StudentId;

/// State of one record right after an update, returned to the caller.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordUpdate {
    pub student_id: StudentId,
    pub detection_count: u32,
    pub presence_percentage: f64,
    pub status: AttendanceStatus,
}

impl From<&PresenceRecord> for RecordUpdate {
    fn from(r: &PresenceRecord) -> Self {
        Self {
            student_id: r.student_id().clone(),
            detection_count: r.detection_count(),
            presence_percentage: r.presence_percentage(),
            status: r.status(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub student_id: StudentId,
    pub from: AttendanceStatus,
    pub to: AttendanceStatus,
}

/// All presence records of one session.
///
/// Each record sits behind its own mutex: recording for one student never
/// waits on another. The outer map lock is only taken to find or insert a
/// record and is never held while a record is being aggregated.
pub struct PresenceLedger {
    key: RecordKey,
    total_session_duration: Duration,
    aggregator: PresenceAggregator,
    thresholds: StatusThresholds,
    records: RwLock<HashMap<StudentId, Arc<Mutex<PresenceRecord>>>>,
}

impl PresenceLedger {
    pub fn new(
        key: RecordKey,
        total_session_duration: Duration,
        aggregator: PresenceAggregator,
        thresholds: StatusThresholds,
    ) -> Self {
        Self {
            key,
            total_session_duration,
            aggregator,
            thresholds,
            records: RwLock::new(HashMap::new()),
        }
    }

    pub fn key(&self) -> &RecordKey {
        &self.key
    }

    pub fn thresholds(&self) -> &StatusThresholds {
        &self.thresholds
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Creates an absent, zero-detection record for every student not yet present.
    pub fn seed(&self, students: impl IntoIterator<Item = StudentId>) {
        let mut map = self.records.write().unwrap_or_else(PoisonError::into_inner);
        for student in students {
            map.entry(student.clone()).or_insert_with(|| {
                Arc::new(Mutex::new(PresenceRecord::new(
                    student,
                    self.key.clone(),
                    self.total_session_duration,
                )))
            });
        }
    }

    /// Appends the event, then aggregates and classifies under the same
    /// record lock so the returned state reflects this event.
    pub fn record(&self, event: DetectionEvent) -> Result<RecordUpdate, RecordError> {
        let slot = self.slot(event.student_id());
        let mut record = lock_record(&slot);
        record.append(event)?;
        self.aggregator.aggregate(&mut record)?;
        record.classify(&self.thresholds)?;
        Ok(RecordUpdate::from(&*record))
    }

    pub fn override_status(
        &self,
        student: &StudentId,
        status: AttendanceStatus,
    ) -> Result<RecordUpdate, RecordError> {
        let slot = self.slot(student);
        let mut record = lock_record(&slot);
        record.override_status(status)?;
        Ok(RecordUpdate::from(&*record))
    }

    /// Runs a final aggregation and classification pass on every unlocked
    /// record, then locks it.
    ///
    /// Already locked records are reported unchanged, so repeated calls
    /// return the same finalized state.
    pub fn finalize(&self) -> (Vec<FinalizedAttendance>, Vec<StatusChange>) {
        let mut finalized = Vec::new();
        let mut changes = Vec::new();
        for slot in self.slots() {
            let mut record = lock_record(&slot);
            if !record.is_locked() {
                let before = record.status();
                // Unlocked records cannot fail these two passes.
                let _ = self.aggregator.aggregate(&mut record);
                let _ = record.classify(&self.thresholds);
                record.lock();
                if record.status() != before {
                    changes.push(StatusChange {
                        student_id: record.student_id().clone(),
                        from: before,
                        to: record.status(),
                    });
                }
            }
            finalized.push(record.to_finalized());
        }
        (finalized, changes)
    }

    pub fn get(&self, student: &StudentId) -> Option<PresenceRecord> {
        let slot = self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(student)
            .cloned()?;
        let record = lock_record(&slot).clone();
        Some(record)
    }

    /// Point-in-time copies of every record, ordered by student id.
    pub fn records(&self) -> Vec<PresenceRecord> {
        self.slots()
            .iter()
            .map(|slot| lock_record(slot).clone())
            .collect()
    }

    fn slot(&self, student: &StudentId) -> Arc<Mutex<PresenceRecord>> {
        if let Some(slot) = self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(student)
        {
            return Arc::clone(slot);
        }
        let mut map = self.records.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(map.entry(student.clone()).or_insert_with(|| {
            Arc::new(Mutex::new(PresenceRecord::new(
                student.clone(),
                self.key.clone(),
                self.total_session_duration,
            )))
        }))
    }

    fn slots(&self) -> Vec<Arc<Mutex<PresenceRecord>>> {
        let map = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let mut entries: Vec<_> = map.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries.into_iter().map(|(_, s)| Arc::clone(s)).collect()
    }
}

fn lock_record(slot: &Mutex<PresenceRecord>) -> MutexGuard<'_, PresenceRecord> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}
