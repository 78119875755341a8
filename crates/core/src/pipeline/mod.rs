pub mod attendance_engine;
pub mod frame_executor;
pub mod frame_report;
pub mod infrastructure;
pub mod pipeline_logger;
