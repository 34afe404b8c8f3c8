//! Request handling shared by the HTTP routes and the CLI.

use crate::dto::{DetectRequest, DetectResponse, RecognizeRequest, RecognizeResponse};
use crate::engine::{EngineError, EngineHandle};
use facematch_core::{decode_image_payload, Registry, RecognizeOptions};
use image::RgbImage;
use std::future::Future;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Face detection/recognition front end over the engine thread.
#[derive(Clone)]
pub struct FaceService {
    engine: EngineHandle,
    options: RecognizeOptions,
    expected_dim: Option<usize>,
    timeout: Option<Duration>,
}

impl FaceService {
    pub fn new(
        engine: EngineHandle,
        options: RecognizeOptions,
        expected_dim: Option<usize>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            engine,
            options,
            expected_dim,
            timeout,
        }
    }

    pub fn engine_running(&self) -> bool {
        self.engine.is_running()
    }

    pub async fn detect(&self, request: &DetectRequest) -> DetectResponse {
        let request_id = Uuid::new_v4();
        let start = Instant::now();
        let bbox_mode = request.bbox_mode.unwrap_or(self.options.bbox_mode);

        let Some(image) = decode(request.image_data.as_deref(), &request_id) else {
            return DetectResponse::from_recognition(Default::default(), elapsed_ms(start));
        };

        match self.bounded(self.engine.detect(image, bbox_mode)).await {
            Ok(recognition) => {
                tracing::info!(%request_id, faces = recognition.count, elapsed_ms = elapsed_ms(start), "detect");
                DetectResponse::from_recognition(recognition, elapsed_ms(start))
            }
            Err(e) => {
                tracing::error!(%request_id, error = %e, "detect failed");
                DetectResponse::failure(e, elapsed_ms(start))
            }
        }
    }

    pub async fn recognize(&self, request: &RecognizeRequest) -> RecognizeResponse {
        let request_id = Uuid::new_v4();
        let start = Instant::now();

        let (registry, rejected) = Registry::from_values(&request.known_faces, self.expected_dim);
        let rejected: Vec<String> = rejected.iter().map(ToString::to_string).collect();
        let options = self.options_for(request);

        let Some(image) = decode(request.image_data.as_deref(), &request_id) else {
            return RecognizeResponse::from_recognition(Default::default(), rejected, elapsed_ms(start));
        };

        match self.bounded(self.engine.recognize(image, registry, options)).await {
            Ok(recognition) => {
                tracing::info!(
                    %request_id,
                    faces = recognition.count,
                    recognized = recognition.recognized_count(),
                    rejected_enrollments = rejected.len(),
                    elapsed_ms = elapsed_ms(start),
                    "recognize"
                );
                RecognizeResponse::from_recognition(recognition, rejected, elapsed_ms(start))
            }
            Err(e) => {
                tracing::error!(%request_id, error = %e, "recognize failed");
                RecognizeResponse::failure(e, rejected, elapsed_ms(start))
            }
        }
    }

    /// Service options with per-request overrides applied.
    fn options_for(&self, request: &RecognizeRequest) -> RecognizeOptions {
        let mut options = self.options;
        if let Some(mode) = request.bbox_mode {
            options.bbox_mode = mode;
        }
        match request.tolerance {
            Some(t) if t.is_finite() && t > 0.0 => options.policy.tolerance = t,
            Some(t) => tracing::warn!(tolerance = t, "ignoring non-positive tolerance override"),
            None => {}
        }
        options
    }

    async fn bounded<T>(&self, work: impl Future<Output = Result<T, EngineError>>) -> Result<T, ServiceError> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, work)
                .await
                .map_err(|_| ServiceError::Timeout(limit))?
                .map_err(ServiceError::Engine),
            None => work.await.map_err(ServiceError::Engine),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Engine(EngineError),
    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

/// Undecodable payloads are an empty result, not a failure.
fn decode(payload: Option<&str>, request_id: &Uuid) -> Option<RgbImage> {
    match decode_image_payload(payload.unwrap_or_default()) {
        Ok(image) => Some(image),
        Err(e) => {
            tracing::warn!(%request_id, error = %e, "image payload not decodable, returning no faces");
            None
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
