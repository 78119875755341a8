use crate::presence::domain::presence_record::FinalizedAttendance;
use crate::shared::ids::SessionId;

/// Receives the locked records of every finalized session.
///
/// Implementations must tolerate the same session being stored twice: a
/// failed hand-off is retried on the next close call.
pub trait AttendanceStore: Send + Sync {
    fn store_session(
        &self,
        session_id: SessionId,
        records: &[FinalizedAttendance],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
