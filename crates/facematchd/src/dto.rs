//! Request/response data transfer objects shared by the HTTP routes and the CLI.
//!
//! Request field names accept both the camelCase and snake_case spellings
//! that existing callers send.

use facematch_core::{BboxMode, DetectionResult, PersonId, Recognition};
use serde::{Deserialize, Serialize};

/// Detect request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetectRequest {
    #[serde(rename = "imageData", alias = "image_data", default)]
    pub image_data: Option<String>,
    #[serde(rename = "bboxMode", alias = "bbox_mode", default)]
    pub bbox_mode: Option<BboxMode>,
}

/// Recognize request: one image plus the caller's registry snapshot.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecognizeRequest {
    #[serde(rename = "imageData", alias = "image_data", default)]
    pub image_data: Option<String>,
    /// Kept raw so one bad element is reported instead of failing the request.
    #[serde(rename = "knownFaces", alias = "known_faces", default)]
    pub known_faces: Vec<serde_json::Value>,
    #[serde(default)]
    pub tolerance: Option<f32>,
    #[serde(rename = "bboxMode", alias = "bbox_mode", default)]
    pub bbox_mode: Option<BboxMode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceDto {
    pub bbox: [f32; 4],
    pub encoding: Vec<f32>,
    pub confidence: f32,
}

/// Detect response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectResponse {
    pub faces: Vec<FaceDto>,
    pub count: usize,
    pub processing_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DetectResponse {
    pub fn from_recognition(recognition: Recognition, processing_time_ms: u64) -> Self {
        let faces: Vec<FaceDto> = recognition
            .detections
            .into_iter()
            .map(|d| FaceDto {
                bbox: d.bbox,
                encoding: d.descriptor.into_inner(),
                confidence: d.score,
            })
            .collect();
        Self {
            count: faces.len(),
            faces,
            processing_time_ms,
            error: None,
        }
    }

    pub fn failure(error: impl ToString, processing_time_ms: u64) -> Self {
        Self {
            faces: Vec::new(),
            count: 0,
            processing_time_ms,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionDto {
    pub bbox: [f32; 4],
    pub name: String,
    pub person_id: Option<PersonId>,
    pub confidence: f32,
    pub is_recognized: bool,
}

impl From<DetectionResult> for RecognitionDto {
    fn from(detection: DetectionResult) -> Self {
        let matched = detection.match_result.unwrap_or_else(|| facematch_core::MatchResult::unknown(0.0));
        Self {
            bbox: detection.bbox,
            name: matched.name,
            person_id: matched.person_id,
            confidence: matched.confidence,
            is_recognized: matched.is_recognized,
        }
    }
}

/// Recognize response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognizeResponse {
    pub detections: Vec<RecognitionDto>,
    pub count: usize,
    /// One message per enrollment record excluded from matching.
    pub rejected_enrollments: Vec<String>,
    pub processing_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RecognizeResponse {
    pub fn from_recognition(recognition: Recognition, rejected_enrollments: Vec<String>, processing_time_ms: u64) -> Self {
        let detections: Vec<RecognitionDto> = recognition.detections.into_iter().map(Into::into).collect();
        Self {
            count: detections.len(),
            detections,
            rejected_enrollments,
            processing_time_ms,
            error: None,
        }
    }

    pub fn failure(error: impl ToString, rejected_enrollments: Vec<String>, processing_time_ms: u64) -> Self {
        Self {
            detections: Vec::new(),
            count: 0,
            rejected_enrollments,
            processing_time_ms,
            error: Some(error.to_string()),
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".into(),
            service: "face_recognition".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }

    pub fn unhealthy() -> Self {
        Self {
            status: "unhealthy".into(),
            ..Self::healthy()
        }
    }
}
