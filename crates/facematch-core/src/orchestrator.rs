//! Batch recognition: one extractor pass per image, one match per face.

use crate::extractor::{DescriptorExtractor, ExtractedFace, ExtractorError};
use crate::matcher::{EuclideanMatcher, MatchError, MatchPolicy, Matcher};
use crate::normalize::normalize;
use crate::registry::Registry;
use crate::types::{BboxMode, DetectionResult, MatchResult};
use image::RgbImage;
use rayon::prelude::*;
use thiserror::Error;

/// Below this many descriptor comparisons per image, matching stays on the calling thread.
const PARALLEL_MIN_COMPARISONS: usize = 4096;

#[derive(Error, Debug)]
pub enum RecognizeError {
    #[error("descriptor extraction failed: {0}")]
    Extractor(#[from] ExtractorError),
    #[error(transparent)]
    Match(#[from] MatchError),
}

/// Per-request recognition settings.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RecognizeOptions {
    pub policy: MatchPolicy,
    pub bbox_mode: BboxMode,
}

/// Ordered per-face results for one image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recognition {
    /// In extractor order.
    pub detections: Vec<DetectionResult>,
    pub count: usize,
}

impl Recognition {
    pub fn empty() -> Self {
        Self::default()
    }

    fn from_detections(detections: Vec<DetectionResult>) -> Self {
        let count = detections.len();
        Self { detections, count }
    }

    /// Number of detections whose match was accepted.
    pub fn recognized_count(&self) -> usize {
        self.detections
            .iter()
            .filter(|d| d.match_result.as_ref().is_some_and(|m| m.is_recognized))
            .count()
    }
}

/// Detect and describe every face without matching.
pub fn detect_all<E: DescriptorExtractor + ?Sized>(
    extractor: &mut E,
    image: &RgbImage,
    bbox_mode: BboxMode,
) -> Result<Recognition, ExtractorError> {
    let faces = extractor.extract(image)?;
    let (width, height) = image.dimensions();

    let detections = faces
        .into_iter()
        .map(|face| DetectionResult {
            bbox: normalize(&face.region, width, height, bbox_mode),
            descriptor: face.descriptor,
            score: face.score,
            match_result: None,
        })
        .collect();

    Ok(Recognition::from_detections(detections))
}

/// Detect every face in `image` and match each one against `registry`.
///
/// Zero faces and an empty registry are both ordinary outcomes, never errors.
pub fn recognize_all<E: DescriptorExtractor + ?Sized>(
    extractor: &mut E,
    image: &RgbImage,
    registry: &Registry,
    options: &RecognizeOptions,
) -> Result<Recognition, RecognizeError> {
    let faces = extractor.extract(image)?;
    let (width, height) = image.dimensions();
    Ok(recognize_faces(faces, width, height, registry, options)?)
}

/// Match already-extracted faces. Output order always equals input order.
pub fn recognize_faces(
    faces: Vec<ExtractedFace>,
    image_width: u32,
    image_height: u32,
    registry: &Registry,
    options: &RecognizeOptions,
) -> Result<Recognition, MatchError> {
    if faces.is_empty() {
        return Ok(Recognition::empty());
    }

    let matcher = EuclideanMatcher;
    let compare = |face: &ExtractedFace| matcher.compare(&face.descriptor, registry, &options.policy);

    let comparisons = faces.len() * registry.descriptor_count();
    let matches: Vec<MatchResult> = if faces.len() > 1 && comparisons >= PARALLEL_MIN_COMPARISONS {
        // Indexed collect keeps detection order regardless of completion order.
        faces.par_iter().map(compare).collect::<Result<_, _>>()?
    } else {
        faces.iter().map(compare).collect::<Result<_, _>>()?
    };

    let detections = faces
        .into_iter()
        .zip(matches)
        .map(|(face, matched)| DetectionResult {
            bbox: normalize(&face.region, image_width, image_height, options.bbox_mode),
            descriptor: face.descriptor,
            score: face.score,
            match_result: Some(matched),
        })
        .collect();

    let recognition = Recognition::from_detections(detections);
    tracing::debug!(
        faces = recognition.count,
        recognized = recognition.recognized_count(),
        identities = registry.len(),
        comparisons,
        "recognition complete"
    );
    Ok(recognition)
}
