pub mod embedder;
pub mod face_quality;
pub mod gallery_handle;
pub mod identity_gallery;
pub mod match_outcome;
