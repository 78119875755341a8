pub mod attendance_status;
pub mod attendance_summary;
pub mod detection_event;
pub mod presence_aggregator;
pub mod presence_record;
