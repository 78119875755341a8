pub mod face_normalizer;
pub mod filters;
pub mod frame_preprocessor;
pub mod image_decoder;
