pub mod json_attendance_store;
pub mod memory_attendance_store;
pub mod venue_session_resolver;
