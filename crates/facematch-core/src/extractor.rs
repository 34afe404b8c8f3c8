//! The face-geometry seam: image in, (region, descriptor) pairs out.

use crate::types::{FaceDescriptor, FaceRegion};
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractorError {
    #[error("model file not found: {0} (download from insightface into the model directory)")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// One face found by an extractor.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedFace {
    /// Clamped to the image bounds.
    pub region: FaceRegion,
    pub descriptor: FaceDescriptor,
    /// Detector confidence in [0, 1].
    pub score: f32,
}

/// Produces every face in an image together with its descriptor.
///
/// Implementations must be deterministic for a given image and model
/// configuration. One call covers the whole image; callers never invoke it
/// per face.
pub trait DescriptorExtractor {
    fn extract(&mut self, image: &RgbImage) -> Result<Vec<ExtractedFace>, ExtractorError>;
}

impl<T: DescriptorExtractor + ?Sized> DescriptorExtractor for Box<T> {
    fn extract(&mut self, image: &RgbImage) -> Result<Vec<ExtractedFace>, ExtractorError> {
        (**self).extract(image)
    }
}
