use crate::matcher::MatchError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Name reported for faces that did not match any enrolled identity.
pub const UNKNOWN_NAME: &str = "Unknown";

/// Fixed-length face descriptor (128-d for dlib-style encoders, 512-d for ArcFace).
///
/// Euclidean distance between two descriptors approximates how dissimilar
/// the two faces are.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FaceDescriptor(Vec<f32>);

impl FaceDescriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }

    /// Euclidean distance to `other`.
    ///
    /// Descriptors of different length are never comparable: this returns
    /// [`MatchError::DimensionMismatch`] instead of truncating or padding.
    pub fn distance(&self, other: &FaceDescriptor) -> Result<f32, MatchError> {
        if self.len() != other.len() {
            return Err(MatchError::DimensionMismatch {
                probe: self.len(),
                enrolled: other.len(),
            });
        }
        Ok(self
            .0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt())
    }
}

impl From<Vec<f32>> for FaceDescriptor {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

/// Face rectangle in source-image pixels, stored as `(left, top, right, bottom)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl FaceRegion {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self { left, top, right, bottom }
    }

    /// Build from the dlib / `face_recognition` ordering `(top, right, bottom, left)`.
    pub fn from_trbl(top: f32, right: f32, bottom: f32, left: f32) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// Clamp every edge into `[0, width] x [0, height]`.
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        let (w, h) = (width as f32, height as f32);
        Self {
            left: self.left.clamp(0.0, w),
            top: self.top.clamp(0.0, h),
            right: self.right.clamp(0.0, w),
            bottom: self.bottom.clamp(0.0, h),
        }
    }

    /// True when the rectangle has positive extent inside a `width x height` image.
    pub fn is_valid_for(&self, width: u32, height: u32) -> bool {
        let (w, h) = (width as f32, height as f32);
        self.right > self.left
            && self.bottom > self.top
            && self.left >= 0.0
            && self.top >= 0.0
            && self.right <= w
            && self.bottom <= h
    }

    /// Intersection-over-union with another region.
    pub fn iou(&self, other: &FaceRegion) -> f32 {
        let inter_w = (self.right.min(other.right) - self.left.max(other.left)).max(0.0);
        let inter_h = (self.bottom.min(other.bottom) - self.top.max(other.top)).max(0.0);
        let inter = inter_w * inter_h;
        let union = self.area() + other.area() - inter;
        if union > 0.0 { inter / union } else { 0.0 }
    }
}

/// Opaque identity key, carried back to the caller exactly as supplied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PersonId {
    Number(i64),
    Text(String),
}

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersonId::Number(n) => write!(f, "{n}"),
            PersonId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for PersonId {
    fn from(n: i64) -> Self {
        PersonId::Number(n)
    }
}

impl From<&str> for PersonId {
    fn from(s: &str) -> Self {
        PersonId::Text(s.to_string())
    }
}

/// A known person together with every descriptor enrolled for them.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrolledIdentity {
    pub id: PersonId,
    pub name: String,
    /// Never empty once the identity is inside a [`Registry`](crate::Registry).
    pub descriptors: Vec<FaceDescriptor>,
}

/// Outcome of matching one probe descriptor against a registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub name: String,
    pub person_id: Option<PersonId>,
    /// Always within [0, 1].
    pub confidence: f32,
    pub is_recognized: bool,
}

impl MatchResult {
    pub fn unknown(confidence: f32) -> Self {
        Self {
            name: UNKNOWN_NAME.to_string(),
            person_id: None,
            confidence: confidence.clamp(0.0, 1.0),
            is_recognized: false,
        }
    }

    pub fn recognized(identity: &EnrolledIdentity, confidence: f32) -> Self {
        Self {
            name: identity.name.clone(),
            person_id: Some(identity.id.clone()),
            confidence: confidence.clamp(0.0, 1.0),
            is_recognized: true,
        }
    }
}

/// Output bounding-box convention.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BboxMode {
    /// `[left, top, right, bottom]` in pixels.
    #[default]
    #[serde(alias = "pixel", alias = "pixels")]
    Absolute,
    /// `[left, top, right, bottom]` as percentages of image width/height.
    #[serde(alias = "percent")]
    Percentage,
}

impl FromStr for BboxMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "absolute" | "pixel" | "pixels" => Ok(BboxMode::Absolute),
            "percentage" | "percent" => Ok(BboxMode::Percentage),
            other => Err(format!("unknown bbox mode '{other}' (expected absolute or percentage)")),
        }
    }
}

impl fmt::Display for BboxMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BboxMode::Absolute => f.write_str("absolute"),
            BboxMode::Percentage => f.write_str("percentage"),
        }
    }
}

/// Per-face output of detection or recognition.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    /// `[left, top, right, bottom]` in the requested [`BboxMode`].
    pub bbox: [f32; 4],
    pub descriptor: FaceDescriptor,
    /// Detector confidence for this face.
    pub score: f32,
    /// `None` for pure detection calls.
    pub match_result: Option<MatchResult>,
}
