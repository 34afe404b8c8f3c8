//! SCRFD face detector via ONNX Runtime.
//!
//! Implements the SCRFD (Sample and Computation Redistribution for Efficient Face
//! Detection) model with 3-stride anchor decoding and NMS post-processing.

use crate::extractor::ExtractorError;
use crate::types::FaceRegion;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

const SCRFD_INPUT_SIZE: u32 = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

/// A face as the detector sees it, before embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedFace {
    pub region: FaceRegion,
    pub score: f32,
    /// Eyes, nose, mouth corners in source pixels.
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Resize factor from source pixels into the 640×640 input.
///
/// The resized image sits at the top-left corner, so mapping back is a
/// single division.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Letterbox {
    scale: f32,
}

impl Letterbox {
    fn for_image(width: u32, height: u32) -> Self {
        let size = SCRFD_INPUT_SIZE as f32;
        Self {
            scale: (size / width as f32).min(size / height as f32),
        }
    }

    fn to_source(&self, (x, y): (f32, f32)) -> (f32, f32) {
        (x / self.scale, y / self.scale)
    }
}

/// Output tensor positions for one stride.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StrideOutputs {
    score: usize,
    bbox: usize,
    kps: usize,
}

pub struct ScrfdDetector {
    session: Session,
    /// Per stride 8, 16, 32.
    outputs: [StrideOutputs; 3],
}

impl ScrfdDetector {
    pub fn load(model_path: &Path) -> Result<Self, ExtractorError> {
        if !model_path.exists() {
            return Err(ExtractorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?output_names,
            "loaded SCRFD model"
        );

        if output_names.len() < 9 {
            return Err(ExtractorError::InferenceFailed(format!(
                "SCRFD model requires 9 outputs (3 strides x score/bbox/kps), got {}",
                output_names.len()
            )));
        }

        let outputs = discover_outputs(&output_names);
        tracing::debug!(?outputs, "SCRFD output tensor mapping");

        Ok(Self { session, outputs })
    }

    /// Every face above the score threshold, highest score first, clamped to the image.
    pub fn detect(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>, ExtractorError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Ok(Vec::new());
        }

        let (input, letterbox) = preprocess(image);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (slot, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let positions = self.outputs[slot];
            let extract = |idx: usize, what: &str| {
                outputs[idx]
                    .try_extract_tensor::<f32>()
                    .map(|(_, data)| data)
                    .map_err(|e| ExtractorError::InferenceFailed(format!("{what} stride {stride}: {e}")))
            };
            let scores = extract(positions.score, "scores")?;
            let bboxes = extract(positions.bbox, "bboxes")?;
            let kps = extract(positions.kps, "kps")?;

            candidates.extend(decode_stride(scores, bboxes, kps, stride, &letterbox));
        }

        let faces: Vec<DetectedFace> = nms(candidates, SCRFD_NMS_THRESHOLD)
            .into_iter()
            .filter_map(|mut face| {
                face.region = face.region.clamp_to(width, height);
                face.region.is_valid_for(width, height).then_some(face)
            })
            .collect();

        tracing::debug!(faces = faces.len(), width, height, "SCRFD detection");
        Ok(faces)
    }
}

/// Resize into the top-left of a 640×640 NCHW tensor, padding with the mean.
fn preprocess(image: &RgbImage) -> (Array4<f32>, Letterbox) {
    let letterbox = Letterbox::for_image(image.width(), image.height());
    let new_w = ((image.width() as f32 * letterbox.scale).round() as u32).clamp(1, SCRFD_INPUT_SIZE);
    let new_h = ((image.height() as f32 * letterbox.scale).round() as u32).clamp(1, SCRFD_INPUT_SIZE);
    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);

    let size = SCRFD_INPUT_SIZE as usize;
    // Padding is zero after normalisation.
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - SCRFD_MEAN) / SCRFD_STD;
        }
    }

    (tensor, letterbox)
}

/// Map stride slots to output tensors.
///
/// Exports either name their tensors `score_8`, `bbox_16`, `kps_32`, ... or use
/// generic numeric names; the latter fall back to positional order
/// `[scores 8/16/32, bboxes 8/16/32, kps 8/16/32]`.
fn discover_outputs(names: &[String]) -> [StrideOutputs; 3] {
    let find = |prefix: &str, stride: usize| {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| *n == target)
    };
    let lookup = |stride: usize| {
        Some(StrideOutputs {
            score: find("score", stride)?,
            bbox: find("bbox", stride)?,
            kps: find("kps", stride)?,
        })
    };

    match (lookup(8), lookup(16), lookup(32)) {
        (Some(s8), Some(s16), Some(s32)) => [s8, s16, s32],
        _ => {
            tracing::info!(?names, "SCRFD output names not recognized, using positional mapping");
            [0, 1, 2].map(|i| StrideOutputs {
                score: i,
                bbox: i + 3,
                kps: i + 6,
            })
        }
    }
}

/// Decode detections for a single stride level into source-image coordinates.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    kps: &[f32],
    stride: usize,
    letterbox: &Letterbox,
) -> Vec<DetectedFace> {
    let grid = SCRFD_INPUT_SIZE as usize / stride;
    let num_anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
    let step = stride as f32;

    let mut faces = Vec::new();
    for idx in 0..num_anchors {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score <= SCRFD_CONFIDENCE_THRESHOLD {
            continue;
        }
        let Some(offsets) = bboxes.get(idx * 4..idx * 4 + 4) else {
            continue;
        };

        let cell = idx / SCRFD_ANCHORS_PER_CELL;
        let anchor_x = (cell % grid) as f32 * step;
        let anchor_y = (cell / grid) as f32 * step;

        let (left, top) = letterbox.to_source((anchor_x - offsets[0] * step, anchor_y - offsets[1] * step));
        let (right, bottom) = letterbox.to_source((anchor_x + offsets[2] * step, anchor_y + offsets[3] * step));

        let landmarks = kps.get(idx * 10..idx * 10 + 10).map(|points| {
            std::array::from_fn(|i| {
                letterbox.to_source((anchor_x + points[i * 2] * step, anchor_y + points[i * 2 + 1] * step))
            })
        });

        faces.push(DetectedFace {
            region: FaceRegion::new(left, top, right, bottom),
            score,
            landmarks,
        });
    }

    faces
}

/// Non-maximum suppression. Output is score-descending.
fn nms(mut faces: Vec<DetectedFace>, iou_threshold: f32) -> Vec<DetectedFace> {
    faces.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut keep: Vec<DetectedFace> = Vec::new();
    for face in faces {
        if keep.iter().all(|kept| kept.region.iou(&face.region) <= iou_threshold) {
            keep.push(face);
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use image::Rgb;

    fn face(left: f32, top: f32, size: f32, score: f32) -> DetectedFace {
        DetectedFace {
            region: FaceRegion::new(left, top, left + size, top + size),
            score,
            landmarks: None,
        }
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let result = nms(
            vec![
                face(5.0, 5.0, 100.0, 0.8),
                face(0.0, 0.0, 100.0, 0.9),
                face(200.0, 200.0, 50.0, 0.7),
            ],
            0.4,
        );
        assert_eq!(result.len(), 2);
        assert_abs_diff_eq!(result[0].score, 0.9);
        assert_abs_diff_eq!(result[1].score, 0.7);
    }

    #[test]
    fn test_nms_keeps_disjoint_and_handles_empty() {
        let result = nms(vec![face(0.0, 0.0, 10.0, 0.6), face(50.0, 50.0, 10.0, 0.8)], 0.4);
        assert_eq!(result.len(), 2);
        assert_abs_diff_eq!(result[0].score, 0.8);
        assert!(nms(vec![], 0.4).is_empty());
    }

    #[test]
    fn test_letterbox_scale_uses_long_side() {
        assert_abs_diff_eq!(Letterbox::for_image(1280, 720).scale, 0.5);
        assert_abs_diff_eq!(Letterbox::for_image(320, 640).scale, 1.0);
        let lb = Letterbox::for_image(320, 240);
        let (x, y) = lb.to_source((100.0 * lb.scale, 50.0 * lb.scale));
        assert_abs_diff_eq!(x, 100.0, epsilon = 1e-3);
        assert_abs_diff_eq!(y, 50.0, epsilon = 1e-3);
    }

    #[test]
    fn test_preprocess_pads_bottom_right_with_zero() {
        let image = RgbImage::from_pixel(320, 160, Rgb([255, 0, 128]));
        let (tensor, letterbox) = preprocess(&image);
        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
        assert_abs_diff_eq!(letterbox.scale, 2.0);

        // Resized image covers 640×320 at the top-left.
        assert_abs_diff_eq!(tensor[[0, 0, 10, 10]], (255.0 - SCRFD_MEAN) / SCRFD_STD, epsilon = 1e-2);
        assert_abs_diff_eq!(tensor[[0, 1, 10, 10]], (0.0 - SCRFD_MEAN) / SCRFD_STD, epsilon = 1e-2);
        assert_abs_diff_eq!(tensor[[0, 2, 10, 10]], (128.0 - SCRFD_MEAN) / SCRFD_STD, epsilon = 1e-2);
        assert_eq!(tensor[[0, 0, 500, 10]], 0.0);
    }

    #[test]
    fn test_decode_stride_single_anchor() {
        let stride = 32;
        let grid = 640 / stride;
        let anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
        let mut scores = vec![0.0f32; anchors];
        let mut bboxes = vec![0.0f32; anchors * 4];
        let mut kps = vec![0.0f32; anchors * 10];

        // Cell (x=3, y=2), second anchor.
        let idx = (2 * grid + 3) * SCRFD_ANCHORS_PER_CELL + 1;
        scores[idx] = 0.92;
        bboxes[idx * 4..idx * 4 + 4].copy_from_slice(&[1.0, 1.0, 2.0, 3.0]);
        kps[idx * 10] = 0.5;

        let letterbox = Letterbox { scale: 2.0 };
        let faces = decode_stride(&scores, &bboxes, &kps, stride, &letterbox);

        assert_eq!(faces.len(), 1);
        let f = &faces[0];
        // anchor (96, 64) in input space, halved back to source.
        assert_abs_diff_eq!(f.region.left, 32.0);
        assert_abs_diff_eq!(f.region.top, 16.0);
        assert_abs_diff_eq!(f.region.right, 80.0);
        assert_abs_diff_eq!(f.region.bottom, 80.0);
        let lm = f.landmarks.unwrap();
        assert_abs_diff_eq!(lm[0].0, 56.0);
        assert_abs_diff_eq!(lm[0].1, 32.0);
    }

    #[test]
    fn test_decode_stride_threshold_and_short_buffers() {
        let stride = 32;
        let anchors = 20 * 20 * SCRFD_ANCHORS_PER_CELL;
        let mut scores = vec![0.0f32; anchors];
        scores[0] = 0.5; // not strictly above threshold
        scores[1] = 0.9;
        let bboxes = vec![1.0f32; 8];
        let faces = decode_stride(&scores, &bboxes, &[], stride, &Letterbox { scale: 1.0 });
        assert_eq!(faces.len(), 1);
        assert!(faces[0].landmarks.is_none());
    }

    #[test]
    fn test_discover_outputs_named_shuffled() {
        let names: Vec<String> = [
            "bbox_8", "kps_8", "score_8", "bbox_16", "kps_16", "score_16", "bbox_32", "kps_32", "score_32",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let mapping = discover_outputs(&names);
        assert_eq!(mapping[0], StrideOutputs { score: 2, bbox: 0, kps: 1 });
        assert_eq!(mapping[2], StrideOutputs { score: 8, bbox: 6, kps: 7 });
    }

    #[test]
    fn test_discover_outputs_positional_fallback() {
        let names: Vec<String> = (0..9).map(|i: usize| (428 + i).to_string()).collect();
        let mapping = discover_outputs(&names);
        assert_eq!(mapping[1], StrideOutputs { score: 1, bbox: 4, kps: 7 });
    }
}
