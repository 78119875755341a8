use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::presence::domain::presence_record::FinalizedAttendance;
use crate::session::domain::attendance_store::AttendanceStore;
use crate::shared::ids::SessionId;

/// Keeps finalized sessions in memory. Storing a session again replaces it.
#[derive(Debug, Default)]
pub struct MemoryAttendanceStore {
    sessions: Mutex<HashMap<SessionId, Vec<FinalizedAttendance>>>,
}

impl MemoryAttendanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self, id: SessionId) -> Option<Vec<FinalizedAttendance>> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AttendanceStore for MemoryAttendanceStore {
    fn store_session(
        &self,
        session_id: SessionId,
        records: &[FinalizedAttendance],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session_id, records.to_vec());
        Ok(())
    }
}
