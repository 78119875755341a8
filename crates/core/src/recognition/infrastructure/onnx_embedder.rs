/// ArcFace-style embedder using ONNX Runtime.
///
/// Takes the normalized grayscale face crop, replicates it into three
/// channels and feeds a `1x3x112x112` tensor normalized to `[-1, 1]`.
use std::path::Path;
use std::sync::Mutex;

use crate::recognition::domain::embedder::{l2_normalize, Embedder};
use crate::shared::frame::GrayImage;

const INPUT_SIZE: usize = 112;
const NORM_MEAN: f32 = 127.5;
const NORM_STD: f32 = 127.5;
/// Output width of the common ArcFace exports (w600k, glint360k).
pub const DEFAULT_DIMENSION: usize = 512;

pub struct OnnxEmbedder {
    session: Mutex<ort::session::Session>,
    dimension: usize,
}

impl OnnxEmbedder {
    pub fn new(
        model_path: &Path,
        dimension: usize,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let intra_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let session = ort::session::Session::builder()?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
            .with_inter_threads(1)?
            .with_intra_threads(intra_threads)?
            .with_execution_providers(preferred_execution_providers())?
            .commit_from_file(model_path)?;
        log::info!("Loaded embedding model {}", model_path.display());
        Ok(Self {
            session: Mutex::new(session),
            dimension,
        })
    }
}

impl Embedder for OnnxEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, face: &GrayImage) -> Result<Vec<f32>, Box<dyn std::error::Error + Send + Sync>> {
        if face.is_empty() {
            return Err("cannot embed an empty face crop".into());
        }
        let tensor = to_tensor(face);
        let input_value = ort::value::Tensor::from_array(tensor)?;
        let mut session = self
            .session
            .lock()
            .map_err(|e| format!("Lock poisoned: {e}"))?;
        let outputs = session.run(ort::inputs![input_value])?;
        let embedding_array = outputs[0].try_extract_array::<f32>()?;
        let embedding_slice = embedding_array
            .as_slice()
            .ok_or("Cannot get embedding slice")?;
        if embedding_slice.len() != self.dimension {
            return Err(format!(
                "model produced {} values, expected {}",
                embedding_slice.len(),
                self.dimension
            )
            .into());
        }

        let mut embedding = embedding_slice.to_vec();
        l2_normalize(&mut embedding);
        Ok(embedding)
    }
}

/// Nearest-neighbour resize to 112x112, gray replicated to three channels, NCHW.
fn to_tensor(face: &GrayImage) -> ndarray::Array4<f32> {
    let (src_w, src_h) = (face.width(), face.height());
    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, INPUT_SIZE, INPUT_SIZE));

    for y in 0..INPUT_SIZE {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / INPUT_SIZE as f64) as usize).min(src_h - 1);
        for x in 0..INPUT_SIZE {
            let src_x =
                (((x as f64 + 0.5) * src_w as f64 / INPUT_SIZE as f64) as usize).min(src_w - 1);
            let v = (face.get(src_x, src_y) as f32 - NORM_MEAN) / NORM_STD;
            for c in 0..3 {
                tensor[[0, c, y, x]] = v;
            }
        }
    }

    tensor
}

fn preferred_execution_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec![]
    }
}
