pub mod gallery_file;
pub mod lbp_embedder;
#[cfg(feature = "onnx")]
pub mod onnx_embedder;
