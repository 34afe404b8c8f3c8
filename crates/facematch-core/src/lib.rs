//! facematch-core: face recognition matching engine.
//!
//! Takes a decoded image and a caller-supplied registry of enrolled
//! descriptors, and produces one ordered match result per detected face.
//! Detection and description sit behind [`DescriptorExtractor`]; the
//! [`onnx`] module provides the SCRFD + ArcFace implementation.

pub mod decode;
pub mod extractor;
pub mod matcher;
pub mod normalize;
pub mod onnx;
pub mod orchestrator;
pub mod registry;
pub mod types;

pub use decode::{decode_image_payload, DecodeError};
pub use extractor::{DescriptorExtractor, ExtractedFace, ExtractorError};
pub use matcher::{match_descriptor, DimensionPolicy, EuclideanMatcher, MatchError, MatchPolicy, Matcher};
pub use normalize::normalize;
pub use onnx::{default_model_dir, OnnxExtractor};
pub use orchestrator::{detect_all, recognize_all, recognize_faces, Recognition, RecognizeError, RecognizeOptions};
pub use registry::{EnrollmentRecord, MalformedEnrollment, Registry};
pub use types::{BboxMode, DetectionResult, EnrolledIdentity, FaceDescriptor, FaceRegion, MatchResult, PersonId, UNKNOWN_NAME};
