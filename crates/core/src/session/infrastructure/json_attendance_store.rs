use std::fs;
use std::path::{Path, PathBuf};

use crate::presence::domain::presence_record::FinalizedAttendance;
use crate::session::domain::attendance_store::AttendanceStore;
use crate::shared::ids::SessionId;

/// Writes each finalized session to `<dir>/<session_id>.json`.
///
/// Files are written to a temp name and renamed into place, so a reader
/// sees either the previous file or the complete new one.
pub struct JsonAttendanceStore {
    dir: PathBuf,
}

impl JsonAttendanceStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, session_id: SessionId) -> PathBuf {
        self.dir.join(format!("{session_id}.json"))
    }

    pub fn load(
        &self,
        session_id: SessionId,
    ) -> Result<Option<Vec<FinalizedAttendance>>, Box<dyn std::error::Error + Send + Sync>> {
        let path = self.path_for(session_id);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&json)?))
    }
}

impl AttendanceStore for JsonAttendanceStore {
    fn store_session(
        &self,
        session_id: SessionId,
        records: &[FinalizedAttendance],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(session_id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(records)?)?;
        fs::rename(&tmp, &path)?;
        log::debug!("Wrote {} records to {}", records.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::domain::attendance_status::AttendanceStatus;
    use crate::shared::ids::{CourseRegistrationId, StudentId};
    use chrono::NaiveDate;

    fn record(session_id: SessionId, student: &str) -> FinalizedAttendance {
        FinalizedAttendance {
            student_id: StudentId::new(student),
            session_id,
            course_registration_id: CourseRegistrationId::new("CSC301"),
            session_date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            status: AttendanceStatus::Late,
            presence_percentage: 30.0,
            presence_duration_seconds: 1620,
            detection_count: 3,
            first_detected_at: None,
            last_detected_at: None,
            is_manual_override: false,
            is_locked: true,
        }
    }

    #[test]
    fn test_store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonAttendanceStore::new(dir.path().join("attendance"));
        let id = SessionId::generate();
        let records = vec![record(id, "a"), record(id, "b")];
        store.store_session(id, &records).unwrap();
        assert_eq!(store.load(id).unwrap().unwrap(), records);
        assert!(store.load(SessionId::generate()).unwrap().is_none());
    }

    #[test]
    fn test_storing_twice_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonAttendanceStore::new(dir.path());
        let id = SessionId::generate();
        store.store_session(id, &[record(id, "a")]).unwrap();
        store.store_session(id, &[record(id, "b")]).unwrap();
        let loaded = store.load(id).unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].student_id.as_str(), "b");
    }

    #[test]
    fn test_record_fields_are_snake_case_json() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonAttendanceStore::new(dir.path());
        let id = SessionId::generate();
        store.store_session(id, &[record(id, "a")]).unwrap();
        let json = fs::read_to_string(store.path_for(id)).unwrap();
        assert!(json.contains("\"status\": \"late\""));
        assert!(json.contains("\"is_locked\": true"));
    }
}
