//! ONNX Runtime descriptor extractor: SCRFD detection + ArcFace embedding.

mod alignment;
mod arcface;
mod scrfd;

pub use arcface::{ArcFaceEmbedder, ARCFACE_DESCRIPTOR_DIM};
pub use scrfd::{DetectedFace, ScrfdDetector};

use crate::extractor::{DescriptorExtractor, ExtractedFace, ExtractorError};
use image::RgbImage;
use std::path::{Path, PathBuf};

pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

/// Default model directory, relative to the working directory.
pub fn default_model_dir() -> PathBuf {
    PathBuf::from("models")
}

pub struct OnnxExtractor {
    detector: ScrfdDetector,
    embedder: ArcFaceEmbedder,
}

impl OnnxExtractor {
    /// Load both models from `model_dir`. Fails fast if either file is missing.
    pub fn load(model_dir: &Path) -> Result<Self, ExtractorError> {
        Self::from_paths(
            &model_dir.join(DETECTOR_MODEL_FILE),
            &model_dir.join(RECOGNIZER_MODEL_FILE),
        )
    }

    pub fn from_paths(detector_path: &Path, embedder_path: &Path) -> Result<Self, ExtractorError> {
        let detector = ScrfdDetector::load(detector_path)?;
        let embedder = ArcFaceEmbedder::load(embedder_path)?;
        Ok(Self { detector, embedder })
    }
}

impl DescriptorExtractor for OnnxExtractor {
    fn extract(&mut self, image: &RgbImage) -> Result<Vec<ExtractedFace>, ExtractorError> {
        let detected = self.detector.detect(image)?;

        let mut faces = Vec::with_capacity(detected.len());
        for face in detected {
            let crop = match &face.landmarks {
                Some(landmarks) => alignment::align_face(image, &face.region, landmarks),
                None => alignment::crop_and_resize(image, &face.region),
            };
            faces.push(ExtractedFace {
                region: face.region,
                descriptor: self.embedder.embed(&crop)?,
                score: face.score.clamp(0.0, 1.0),
            });
        }
        Ok(faces)
    }
}
