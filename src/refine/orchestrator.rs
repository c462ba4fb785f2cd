use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::{info, warn};

use crate::canvas::{MaskExportError, MaskPng, SampledColor};
use crate::history::{Artifact, ArtifactHistory};
use crate::refine::metrics::{ArtifactMetrics, ConfidenceThresholds, ConfidenceTier};
use crate::refine::service::{
    ColorizeRequest, RefineRequest, ServiceError, SharedColorizationService, SourceImage,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceOperation {
    Colorize,
    Refine,
}

impl ServiceOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Colorize => "colorize",
            Self::Refine => "refine",
        }
    }

    fn failure_message(self) -> &'static str {
        match self {
            Self::Colorize => {
                "Failed to colorize image. Please ensure the backend server is running."
            }
            Self::Refine => "Failed to refine image areas.",
        }
    }
}

impl fmt::Display for ServiceOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum RefineError {
    #[error("no source image selected")]
    MissingSource,
    #[error("refine requires at least one history entry")]
    EmptyHistory,
    #[error("another colorize/refine call is already in flight")]
    Busy,
    #[error("session was reset while the call was in flight")]
    Superseded,
    #[error("{operation} call failed: {source}")]
    Transport {
        operation: ServiceOperation,
        #[source]
        source: ServiceError,
    },
    #[error("{operation} worker join failed: {message}")]
    Join {
        operation: ServiceOperation,
        message: String,
    },
    #[error("mask export failed: {0}")]
    MaskExport(#[from] MaskExportError),
}

impl RefineError {
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::MissingSource | Self::EmptyHistory)
    }

    pub fn user_message(&self) -> Option<&'static str> {
        match self {
            Self::Transport { operation, .. } | Self::Join { operation, .. } => {
                Some(operation.failure_message())
            }
            Self::MaskExport(_) => Some(ServiceOperation::Refine.failure_message()),
            Self::MissingSource | Self::EmptyHistory | Self::Busy | Self::Superseded => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistorySnapshot {
    pub len: usize,
    pub cursor: isize,
    pub can_undo: bool,
    pub can_redo: bool,
    pub busy: bool,
}

pub struct RefinementOrchestrator {
    service: SharedColorizationService,
    history: Mutex<ArtifactHistory>,
    in_flight: AtomicBool,
    epoch: AtomicU64,
    thresholds: ConfidenceThresholds,
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl RefinementOrchestrator {
    pub fn new(service: SharedColorizationService, thresholds: ConfidenceThresholds) -> Self {
        Self {
            service,
            history: Mutex::new(ArtifactHistory::new()),
            in_flight: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            thresholds,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn current(&self) -> Option<Arc<Artifact>> {
        self.lock_history().current().cloned()
    }

    pub fn entries(&self) -> Vec<Arc<Artifact>> {
        self.lock_history().entries().to_vec()
    }

    pub fn snapshot(&self) -> HistorySnapshot {
        let history = self.lock_history();
        HistorySnapshot {
            len: history.len(),
            cursor: history.cursor_index(),
            can_undo: history.can_undo(),
            can_redo: history.can_redo(),
            busy: self.is_busy(),
        }
    }

    pub fn tier_for(&self, artifact: &Artifact) -> Option<ConfidenceTier> {
        artifact
            .metrics()
            .headline_score()
            .map(|score| self.thresholds.classify(score))
    }

    pub fn undo(&self) -> bool {
        if self.is_busy() {
            return false;
        }
        self.lock_history().undo()
    }

    pub fn redo(&self) -> bool {
        if self.is_busy() {
            return false;
        }
        self.lock_history().redo()
    }

    pub fn reset(&self) -> usize {
        let released = {
            let mut history = self.lock_history();
            self.epoch.fetch_add(1, Ordering::AcqRel);
            history.reset()
        };
        let count = released.len();
        drop(released);
        info!(released = count, "edit history reset");
        count
    }

    pub fn restore(&self, artifact: Artifact) -> Arc<Artifact> {
        self.reset();
        let artifact = Arc::new(artifact);
        self.lock_history().append(Arc::clone(&artifact));
        info!(artifact = %artifact.id(), "history restored from saved artifact");
        artifact
    }

    pub async fn colorize(
        &self,
        source: Option<&SourceImage>,
    ) -> Result<Arc<Artifact>, RefineError> {
        let source = source.ok_or(RefineError::MissingSource)?;
        let _guard = self.enter()?;
        let epoch = self.epoch.load(Ordering::Acquire);
        let request = ColorizeRequest {
            original: source.clone(),
        };
        info!(file = %source.file_name, bytes = source.bytes.len(), "colorize requested");

        let service = Arc::clone(&self.service);
        let response = run_blocking(ServiceOperation::Colorize, move || {
            service.colorize(&request)
        })
        .await?;

        let artifact = Artifact::new(
            response.image.bytes,
            response.image.media_type.as_deref(),
            ArtifactMetrics::Colorize(response.metrics),
        );
        self.commit(epoch, artifact)
    }

    pub async fn refine(
        &self,
        source: Option<&SourceImage>,
        mask: &MaskPng,
        target_color: Option<SampledColor>,
    ) -> Result<Arc<Artifact>, RefineError> {
        let source = source.ok_or(RefineError::MissingSource)?;
        let _guard = self.enter()?;
        let base = self.current().ok_or(RefineError::EmptyHistory)?;
        let epoch = self.epoch.load(Ordering::Acquire);
        let request = RefineRequest {
            original: source.clone(),
            mask_png: mask.bytes.clone(),
            base: Arc::clone(&base),
            target_color,
        };
        let color_hex = target_color.map(SampledColor::to_hex);
        info!(
            base = %base.id(),
            painted_pixels = mask.painted_pixels,
            target_color = color_hex.as_deref().unwrap_or("none"),
            "refine requested"
        );

        let service = Arc::clone(&self.service);
        let response =
            run_blocking(ServiceOperation::Refine, move || service.refine(&request)).await?;

        let artifact = Artifact::new(
            response.image.bytes,
            response.image.media_type.as_deref(),
            ArtifactMetrics::Refine(response.metrics),
        );
        self.commit(epoch, artifact)
    }

    fn enter(&self) -> Result<InFlightGuard<'_>, RefineError> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| {
                warn!("rejected re-entrant call while busy");
                RefineError::Busy
            })?;
        Ok(InFlightGuard(&self.in_flight))
    }

    fn commit(&self, epoch: u64, artifact: Artifact) -> Result<Arc<Artifact>, RefineError> {
        let mut history = self.lock_history();
        // Epoch only changes while the history lock is held.
        if self.epoch.load(Ordering::Acquire) != epoch {
            warn!(artifact = %artifact.id(), "dropping result from before reset");
            return Err(RefineError::Superseded);
        }
        let artifact = Arc::new(artifact);
        history.append(Arc::clone(&artifact));
        info!(
            artifact = %artifact.id(),
            len = history.len(),
            cursor = history.cursor_index(),
            score = artifact.metrics().headline_score(),
            "history entry appended"
        );
        Ok(artifact)
    }

    fn lock_history(&self) -> MutexGuard<'_, ArtifactHistory> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn run_blocking<T, F>(operation: ServiceOperation, call: F) -> Result<T, RefineError>
where
    F: FnOnce() -> Result<T, ServiceError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| RefineError::Join {
            operation,
            message: e.to_string(),
        })?
        .map_err(|source| {
            warn!(operation = operation.as_str(), error = %source, "service call failed");
            RefineError::Transport { operation, source }
        })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::canvas::RasterSize;
    use crate::refine::metrics::{ColorizeMetrics, RefineMetrics};
    use crate::refine::service::{
        ColorizationService, ColorizeResponse, RefineResponse, ServiceImage, ServiceStatus,
    };
    use std::collections::VecDeque;
    use std::time::Duration;

    #[derive(Default)]
    pub(crate) struct FakeService {
        pub seen_colorize: Mutex<Vec<ColorizeRequest>>,
        pub seen_refine: Mutex<Vec<RefineRequest>>,
        pub fail_next: Mutex<VecDeque<ServiceError>>,
        pub delay: Option<Duration>,
        pub counter: AtomicU64,
    }

    impl FakeService {
        pub(crate) fn failing(error: ServiceError) -> Self {
            let fake = Self::default();
            fake.fail_next
                .lock()
                .expect("fake fail mutex poisoned")
                .push_back(error);
            fake
        }

        pub(crate) fn slow(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::default()
            }
        }

        fn next_image(&self) -> Result<ServiceImage, ServiceError> {
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            if let Some(err) = self
                .fail_next
                .lock()
                .expect("fake fail mutex poisoned")
                .pop_front()
            {
                return Err(err);
            }
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            Ok(ServiceImage {
                bytes: fake_png(n as u8),
                media_type: Some(String::from("image/png")),
            })
        }
    }

    pub(crate) fn fake_png(n: u8) -> Vec<u8> {
        let mut img = image::RgbImage::from_pixel(8, 8, image::Rgb([0x1a, 0x2b, 0x3c]));
        img.put_pixel(7, 7, image::Rgb([n, n, n]));
        let mut bytes = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .expect("png encode");
        bytes
    }

    impl ColorizationService for FakeService {
        fn colorize(&self, request: &ColorizeRequest) -> Result<ColorizeResponse, ServiceError> {
            self.seen_colorize
                .lock()
                .expect("fake colorize mutex poisoned")
                .push(request.clone());
            Ok(ColorizeResponse {
                image: self.next_image()?,
                metrics: ColorizeMetrics {
                    global_color_strength: Some(80.0),
                    tile_confidence_map: vec![0.5; 4],
                },
            })
        }

        fn refine(&self, request: &RefineRequest) -> Result<RefineResponse, ServiceError> {
            self.seen_refine
                .lock()
                .expect("fake refine mutex poisoned")
                .push(request.clone());
            Ok(RefineResponse {
                image: self.next_image()?,
                metrics: RefineMetrics {
                    brush_confidence: Some(50.0),
                },
            })
        }

        fn status(&self) -> Result<ServiceStatus, ServiceError> {
            Ok(ServiceStatus {
                message: String::from("fake"),
                device: None,
            })
        }
    }

    fn source() -> SourceImage {
        SourceImage::new("photo.jpg", vec![0xff, 0xd8, 0xff, 0xe0])
    }

    fn mask() -> MaskPng {
        MaskPng {
            size: RasterSize::new(2, 2),
            painted_pixels: 1,
            bytes: vec![1, 2, 3],
        }
    }

    fn orchestrator(fake: Arc<FakeService>) -> RefinementOrchestrator {
        RefinementOrchestrator::new(fake, ConfidenceThresholds::default())
    }

    #[tokio::test]
    async fn colorize_appends_first_entry() {
        let fake = Arc::new(FakeService::default());
        let orch = orchestrator(fake.clone());
        let artifact = orch.colorize(Some(&source())).await.expect("colorize");

        let snap = orch.snapshot();
        assert_eq!(snap.len, 1);
        assert_eq!(snap.cursor, 0);
        assert_eq!(orch.current().map(|a| a.id()), Some(artifact.id()));
        assert_eq!(orch.tier_for(&artifact), Some(ConfidenceTier::High));
        assert_eq!(fake.seen_colorize.lock().expect("lock").len(), 1);
        assert!(!orch.is_busy());
    }

    #[tokio::test]
    async fn missing_source_is_input_error_without_network() {
        let fake = Arc::new(FakeService::default());
        let orch = orchestrator(fake.clone());
        let err = orch.colorize(None).await.expect_err("should reject");
        assert!(err.is_input_error());
        assert_eq!(err.user_message(), None);
        assert!(fake.seen_colorize.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn refine_with_empty_history_is_rejected_locally() {
        let fake = Arc::new(FakeService::default());
        let orch = orchestrator(fake.clone());
        let err = orch
            .refine(Some(&source()), &mask(), None)
            .await
            .expect_err("should reject");
        assert!(matches!(err, RefineError::EmptyHistory));
        assert!(fake.seen_refine.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn failed_colorize_leaves_history_unchanged() {
        let fake = Arc::new(FakeService::default());
        let orch = orchestrator(fake.clone());
        orch.colorize(Some(&source())).await.expect("first colorize");
        let before = orch.snapshot();

        fake.fail_next.lock().expect("lock").push_back(ServiceError::Request {
            endpoint: String::from("http://localhost:8000/colorize"),
            message: String::from("connection refused"),
        });
        let err = orch
            .colorize(Some(&source()))
            .await
            .expect_err("should fail");

        assert!(!err.is_input_error());
        assert_eq!(
            err.user_message(),
            Some("Failed to colorize image. Please ensure the backend server is running.")
        );
        assert_eq!(orch.snapshot(), before);
    }

    #[tokio::test]
    async fn http_failure_keeps_status_in_error_chain() {
        let fake = Arc::new(FakeService::failing(ServiceError::Status {
            status: 500,
            body: String::from("boom"),
        }));
        let orch = orchestrator(fake);
        let err = orch
            .colorize(Some(&source()))
            .await
            .expect_err("should fail");
        assert_eq!(err.to_string(), "colorize call failed: HTTP 500: boom");
        assert_eq!(orch.snapshot().len, 0);
    }

    #[tokio::test]
    async fn failed_refine_uses_refine_message() {
        let fake = Arc::new(FakeService::default());
        let orch = orchestrator(fake.clone());
        orch.colorize(Some(&source())).await.expect("a0");
        fake.fail_next.lock().expect("lock").push_back(ServiceError::Timeout {
            endpoint: String::from("http://localhost:8000/refine"),
        });

        let err = orch
            .refine(Some(&source()), &mask(), None)
            .await
            .expect_err("should fail");

        assert_eq!(err.user_message(), Some("Failed to refine image areas."));
        assert_eq!(orch.snapshot().len, 1);
        assert_eq!(orch.snapshot().cursor, 0);
    }

    #[tokio::test]
    async fn refine_sends_current_base_and_color() {
        let fake = Arc::new(FakeService::default());
        let orch = orchestrator(fake.clone());
        let a0 = orch.colorize(Some(&source())).await.expect("colorize");
        let color: SampledColor = "#1a2b3c".parse().expect("color");

        let a1 = orch
            .refine(Some(&source()), &mask(), Some(color))
            .await
            .expect("refine");

        let seen = fake.seen_refine.lock().expect("lock");
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].base.id(), a0.id());
        assert_eq!(seen[0].mask_png, vec![1, 2, 3]);
        assert_eq!(seen[0].target_color, Some(color));
        assert_eq!(orch.current().map(|a| a.id()), Some(a1.id()));
        assert_eq!(orch.tier_for(&a1), Some(ConfidenceTier::Medium));
    }

    #[tokio::test]
    async fn refine_after_undo_discards_redo_tail() {
        let fake = Arc::new(FakeService::default());
        let orch = orchestrator(fake);
        let a0 = orch.colorize(Some(&source())).await.expect("colorize");
        let a1 = orch
            .refine(Some(&source()), &mask(), None)
            .await
            .expect("refine 1");
        assert!(orch.undo());
        let a2 = orch
            .refine(Some(&source()), &mask(), None)
            .await
            .expect("refine 2");

        let ids: Vec<_> = orch.entries().iter().map(|a| a.id()).collect();
        assert_eq!(ids, vec![a0.id(), a2.id()]);
        assert!(!ids.contains(&a1.id()));
        assert_eq!(orch.snapshot().cursor, 1);
        assert!(!orch.redo());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn second_call_while_in_flight_is_rejected() {
        let fake = Arc::new(FakeService::slow(Duration::from_millis(100)));
        let orch = orchestrator(fake.clone());
        let src = source();

        let (first, second) = tokio::join!(orch.colorize(Some(&src)), orch.colorize(Some(&src)));

        assert!(first.is_ok());
        assert!(matches!(second, Err(RefineError::Busy)));
        assert_eq!(fake.seen_colorize.lock().expect("lock").len(), 1);
        assert_eq!(orch.snapshot().len, 1);
        assert!(!orch.is_busy());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn undo_is_ignored_while_busy() {
        let fake = Arc::new(FakeService::slow(Duration::from_millis(100)));
        let orch = orchestrator(fake);
        let src = source();
        orch.colorize(Some(&src)).await.expect("a0");
        orch.colorize(Some(&src)).await.expect("a1");

        let undo_midway = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            (orch.is_busy(), orch.undo())
        };
        let (result, (busy, undone)) = tokio::join!(orch.colorize(Some(&src)), undo_midway);

        result.expect("a2");
        assert!(busy);
        assert!(!undone);
        assert_eq!(orch.snapshot().cursor, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn result_landing_after_reset_is_dropped() {
        let fake = Arc::new(FakeService::slow(Duration::from_millis(100)));
        let orch = orchestrator(fake);
        let src = source();

        let resetter = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            orch.reset()
        };
        let (result, released) = tokio::join!(orch.colorize(Some(&src)), resetter);

        assert_eq!(released, 0);
        assert!(matches!(result, Err(RefineError::Superseded)));
        assert_eq!(orch.snapshot().len, 0);
        assert_eq!(orch.snapshot().cursor, -1);
    }

    #[tokio::test]
    async fn refine_while_busy_is_rejected_before_history_is_read() {
        let fake = Arc::new(FakeService::default());
        let orch = orchestrator(fake.clone());
        let held = orch.enter().expect("guard");

        let err = orch
            .refine(Some(&source()), &mask(), None)
            .await
            .expect_err("should reject");

        assert!(matches!(err, RefineError::Busy));
        assert!(fake.seen_refine.lock().expect("lock").is_empty());
        drop(held);
        assert!(!orch.is_busy());
    }

    #[test]
    fn commit_after_reset_is_superseded() {
        let orch = orchestrator(Arc::new(FakeService::default()));
        let epoch = orch.epoch.load(Ordering::Acquire);
        orch.reset();

        let err = orch
            .commit(
                epoch,
                Artifact::new(
                    fake_png(1),
                    None,
                    ArtifactMetrics::Colorize(ColorizeMetrics::default()),
                ),
            )
            .expect_err("stale commit");

        assert!(matches!(err, RefineError::Superseded));
        assert_eq!(orch.snapshot().len, 0);
    }

    #[tokio::test]
    async fn reset_releases_entries() {
        let fake = Arc::new(FakeService::default());
        let orch = orchestrator(fake);
        orch.colorize(Some(&source())).await.expect("a0");
        orch.refine(Some(&source()), &mask(), None)
            .await
            .expect("a1");
        assert_eq!(orch.reset(), 2);
        assert!(orch.current().is_none());
        assert_eq!(orch.snapshot().cursor, -1);
    }

    #[tokio::test]
    async fn restore_seeds_history_for_refine() {
        let fake = Arc::new(FakeService::default());
        let orch = orchestrator(fake.clone());
        orch.colorize(Some(&source())).await.expect("a0");
        let saved = orch.restore(Artifact::new(
            fake_png(9),
            None,
            ArtifactMetrics::Colorize(ColorizeMetrics::default()),
        ));
        assert_eq!(orch.snapshot().len, 1);

        orch.refine(Some(&source()), &mask(), None)
            .await
            .expect("refine");
        let seen = fake.seen_refine.lock().expect("lock");
        assert_eq!(seen[0].base.id(), saved.id());
    }
}
