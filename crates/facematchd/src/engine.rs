use facematch_core::{
    detect_all, recognize_all, BboxMode, DescriptorExtractor, ExtractorError, Recognition, RecognizeError,
    RecognizeOptions, Registry,
};
use image::RgbImage;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Queue depth in front of the engine thread.
const ENGINE_QUEUE_DEPTH: usize = 16;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("extractor error: {0}")]
    Extractor(#[from] ExtractorError),
    #[error(transparent)]
    Recognize(#[from] RecognizeError),
    #[error("failed to start engine thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from HTTP handlers to the engine thread.
enum EngineRequest {
    Detect {
        image: RgbImage,
        bbox_mode: BboxMode,
        reply: oneshot::Sender<Result<Recognition, EngineError>>,
    },
    Recognize {
        image: RgbImage,
        registry: Registry,
        options: RecognizeOptions,
        reply: oneshot::Sender<Result<Recognition, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// False once the engine thread has exited, for example after a panic in inference.
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Detect and describe every face in `image`.
    pub async fn detect(&self, image: RgbImage, bbox_mode: BboxMode) -> Result<Recognition, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Detect {
                image,
                bbox_mode,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Detect every face in `image` and match each against `registry`.
    pub async fn recognize(
        &self,
        image: RgbImage,
        registry: Registry,
        options: RecognizeOptions,
    ) -> Result<Recognition, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Recognize {
                image,
                registry,
                options,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread that owns `extractor`.
///
/// Requests are served one at a time in arrival order. The thread exits
/// when every [`EngineHandle`] has been dropped.
pub fn spawn_engine(mut extractor: Box<dyn DescriptorExtractor + Send>) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(ENGINE_QUEUE_DEPTH);

    std::thread::Builder::new()
        .name("facematch-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Detect { image, bbox_mode, reply } => {
                        let result = detect_all(&mut extractor, &image, bbox_mode).map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                    EngineRequest::Recognize {
                        image,
                        registry,
                        options,
                        reply,
                    } => {
                        let result =
                            recognize_all(&mut extractor, &image, &registry, &options).map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use facematch_core::{EnrolledIdentity, ExtractedFace, FaceDescriptor, FaceRegion, PersonId};

    /// Reports one fixed face per image, or fails if built with `failing()`.
    pub(crate) struct FixedExtractor {
        pub faces: Vec<ExtractedFace>,
        pub fail: bool,
    }

    impl FixedExtractor {
        pub(crate) fn one_face(descriptor: Vec<f32>) -> Self {
            Self {
                faces: vec![ExtractedFace {
                    region: FaceRegion::new(10.0, 20.0, 50.0, 80.0),
                    descriptor: FaceDescriptor::new(descriptor),
                    score: 0.93,
                }],
                fail: false,
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                faces: Vec::new(),
                fail: true,
            }
        }
    }

    /// Panics inside `extract`, taking the engine thread down with it.
    pub(crate) struct PanickingExtractor;

    impl DescriptorExtractor for PanickingExtractor {
        fn extract(&mut self, _image: &RgbImage) -> Result<Vec<ExtractedFace>, ExtractorError> {
            panic!("inference crashed");
        }
    }

    /// Wait (bounded) for the engine thread to finish unwinding.
    pub(crate) async fn wait_for_exit(is_running: impl Fn() -> bool) {
        for _ in 0..200 {
            if !is_running() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    }

    impl DescriptorExtractor for FixedExtractor {
        fn extract(&mut self, _image: &RgbImage) -> Result<Vec<ExtractedFace>, ExtractorError> {
            if self.fail {
                return Err(ExtractorError::InferenceFailed("session poisoned".into()));
            }
            Ok(self.faces.clone())
        }
    }

    #[tokio::test]
    async fn test_detect_round_trip() {
        let handle = spawn_engine(Box::new(FixedExtractor::one_face(vec![0.1, 0.2]))).unwrap();
        let result = handle.detect(RgbImage::new(100, 100), BboxMode::Percentage).await.unwrap();
        assert_eq!(result.count, 1);
        assert_eq!(result.detections[0].bbox, [10.0, 20.0, 50.0, 80.0]);
        assert!(result.detections[0].match_result.is_none());
    }

    #[tokio::test]
    async fn test_recognize_round_trip() {
        let handle = spawn_engine(Box::new(FixedExtractor::one_face(vec![0.1, 0.2]))).unwrap();
        let registry = Registry::new(vec![EnrolledIdentity {
            id: PersonId::Number(1),
            name: "Alice".into(),
            descriptors: vec![FaceDescriptor::new(vec![0.1, 0.2])],
        }]);
        let result = handle
            .recognize(RgbImage::new(100, 100), registry, RecognizeOptions::default())
            .await
            .unwrap();
        let matched = result.detections[0].match_result.as_ref().unwrap();
        assert!(matched.is_recognized);
        assert_eq!(matched.name, "Alice");
        assert_eq!(matched.confidence, 1.0);
    }

    #[tokio::test]
    async fn test_extractor_failure_is_reported() {
        let handle = spawn_engine(Box::new(FixedExtractor::failing())).unwrap();
        let err = handle.detect(RgbImage::new(8, 8), BboxMode::Absolute).await.unwrap_err();
        assert!(matches!(err, EngineError::Extractor(ExtractorError::InferenceFailed(_))));

        // The thread survives a failed request.
        let err = handle
            .recognize(RgbImage::new(8, 8), Registry::default(), RecognizeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Recognize(RecognizeError::Extractor(_))));
    }

    #[tokio::test]
    async fn test_panicked_engine_reports_not_running() {
        let handle = spawn_engine(Box::new(PanickingExtractor)).unwrap();
        assert!(handle.is_running());

        let err = handle.detect(RgbImage::new(8, 8), BboxMode::Absolute).await.unwrap_err();
        assert!(matches!(err, EngineError::ChannelClosed));

        wait_for_exit(|| handle.is_running()).await;
        assert!(!handle.is_running());
        let err = handle.detect(RgbImage::new(8, 8), BboxMode::Absolute).await.unwrap_err();
        assert!(matches!(err, EngineError::ChannelClosed));
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_engine() {
        let handle = spawn_engine(Box::new(FixedExtractor::one_face(vec![0.0]))).unwrap();
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let h = handle.clone();
                tokio::spawn(async move { h.detect(RgbImage::new(64, 64), BboxMode::Absolute).await })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap().count, 1);
        }
    }
}
