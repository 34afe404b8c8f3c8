//! ArcFace embedder via ONNX Runtime.
//!
//! Produces 512-dimensional, L2-normalised descriptors from aligned 112×112
//! RGB crops, using the w600k_r50 ArcFace model.

use super::alignment::ALIGNED_SIZE;
use crate::extractor::ExtractorError;
use crate::types::FaceDescriptor;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5; // symmetric, unlike SCRFD's 128
pub const ARCFACE_DESCRIPTOR_DIM: usize = 512;

pub struct ArcFaceEmbedder {
    session: Session,
}

impl ArcFaceEmbedder {
    pub fn load(model_path: &Path) -> Result<Self, ExtractorError> {
        if !model_path.exists() {
            return Err(ExtractorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded ArcFace model"
        );

        Ok(Self { session })
    }

    /// Describe one aligned face crop.
    pub fn embed(&mut self, aligned: &RgbImage) -> Result<FaceDescriptor, ExtractorError> {
        let input = preprocess(aligned);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ExtractorError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw.len() != ARCFACE_DESCRIPTOR_DIM {
            return Err(ExtractorError::InferenceFailed(format!(
                "expected {ARCFACE_DESCRIPTOR_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        Ok(FaceDescriptor::new(l2_normalize(raw)))
    }
}

/// 112×112 RGB crop to NCHW float tensor. Pixels outside the crop read as black.
fn preprocess(aligned: &RgbImage) -> Array4<f32> {
    let size = ALIGNED_SIZE as usize;
    let mut tensor = Array4::<f32>::from_elem((1, 3, size, size), (0.0 - ARCFACE_MEAN) / ARCFACE_STD);

    for (x, y, pixel) in aligned.enumerate_pixels() {
        if x as usize >= size || y as usize >= size {
            continue;
        }
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - ARCFACE_MEAN) / ARCFACE_STD;
        }
    }

    tensor
}

fn l2_normalize(raw: &[f32]) -> Vec<f32> {
    let norm = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw.to_vec()
    }
}
