pub mod detection_pass;
pub mod face_detector;
pub mod integral_image;
pub mod window_classifier;
