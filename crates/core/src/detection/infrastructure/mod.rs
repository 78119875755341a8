pub mod cascade_scanner;
pub mod detection_merger;
pub mod haar_cascade;
pub mod math;
pub mod multi_pass_detector;
