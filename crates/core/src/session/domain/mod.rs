pub mod attendance_store;
pub mod session;
pub mod session_resolver;
