use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::canvas::{export_mask, MaskCanvasEngine, MaskPng};
use crate::history::Artifact;
use crate::refine::{
    ConfidenceTier, HistorySnapshot, RefineError, RefinementOrchestrator,
    SharedColorizationService, SourceImage,
};
use crate::settings::ColorizerSettings;

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("nothing to save: history is empty")]
    NoArtifact,
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub struct EditingSession {
    orchestrator: RefinementOrchestrator,
    canvas: MaskCanvasEngine,
    source: Option<SourceImage>,
    refine_mode: bool,
}

impl EditingSession {
    pub fn new(service: SharedColorizationService, settings: &ColorizerSettings) -> Self {
        Self {
            orchestrator: RefinementOrchestrator::new(service, settings.confidence),
            canvas: MaskCanvasEngine::new(settings.brush),
            source: None,
            refine_mode: false,
        }
    }

    pub fn upload(&mut self, source: SourceImage) {
        info!(file = %source.file_name, media_type = %source.media_type, "source image selected");
        self.orchestrator.reset();
        self.source = Some(source);
        self.refine_mode = false;
        self.canvas.unload_target();
        self.canvas.clear_sampled_color();
    }

    pub fn resume(&mut self, source: SourceImage, base: Artifact) -> Arc<Artifact> {
        self.upload(source);
        let artifact = self.orchestrator.restore(base);
        self.reload_canvas();
        artifact
    }

    pub fn source(&self) -> Option<&SourceImage> {
        self.source.as_ref()
    }

    pub async fn colorize(&mut self) -> Result<Arc<Artifact>, RefineError> {
        let artifact = self.orchestrator.colorize(self.source.as_ref()).await?;
        self.reload_canvas();
        Ok(artifact)
    }

    pub async fn refine(&mut self) -> Result<Arc<Artifact>, RefineError> {
        if self.source.is_none() {
            return Err(RefineError::MissingSource);
        }
        if self.orchestrator.current().is_none() {
            return Err(RefineError::EmptyHistory);
        }
        self.canvas.end_stroke();
        let mask = export_mask(&self.canvas)?;
        self.refine_with_mask(&mask).await
    }

    pub async fn refine_with_mask(&mut self, mask: &MaskPng) -> Result<Arc<Artifact>, RefineError> {
        if mask.is_blank() {
            debug!("refining with a blank mask");
        }
        let color = self.canvas.sampled_color();
        let artifact = self
            .orchestrator
            .refine(self.source.as_ref(), mask, color)
            .await?;
        self.reload_canvas();
        Ok(artifact)
    }

    pub fn undo(&mut self) -> bool {
        let moved = self.orchestrator.undo();
        if moved {
            self.reload_canvas();
        }
        moved
    }

    pub fn redo(&mut self) -> bool {
        let moved = self.orchestrator.redo();
        if moved {
            self.reload_canvas();
        }
        moved
    }

    pub fn can_undo(&self) -> bool {
        let snap = self.orchestrator.snapshot();
        snap.can_undo && !snap.busy
    }

    pub fn can_redo(&self) -> bool {
        let snap = self.orchestrator.snapshot();
        snap.can_redo && !snap.busy
    }

    pub fn history(&self) -> HistorySnapshot {
        self.orchestrator.snapshot()
    }

    pub fn current_artifact(&self) -> Option<Arc<Artifact>> {
        self.orchestrator.current()
    }

    pub fn current_tier(&self) -> Option<ConfidenceTier> {
        self.current_artifact()
            .and_then(|artifact| self.orchestrator.tier_for(&artifact))
    }

    pub fn orchestrator(&self) -> &RefinementOrchestrator {
        &self.orchestrator
    }

    pub fn reset(&mut self) {
        self.orchestrator.reset();
        self.source = None;
        self.refine_mode = false;
        self.canvas.unload_target();
        self.canvas.clear_sampled_color();
    }

    pub fn refine_mode(&self) -> bool {
        self.refine_mode
    }

    pub fn set_refine_mode(&mut self, enabled: bool) {
        self.refine_mode = enabled;
    }

    pub fn canvas(&self) -> &MaskCanvasEngine {
        &self.canvas
    }

    pub fn canvas_mut(&mut self) -> &mut MaskCanvasEngine {
        &mut self.canvas
    }

    pub fn save_current(&self, path: &Path) -> Result<Arc<Artifact>, SaveError> {
        let artifact = self.current_artifact().ok_or(SaveError::NoArtifact)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| SaveError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, artifact.bytes()).map_err(|source| SaveError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), artifact = %artifact.id(), "artifact saved");
        Ok(artifact)
    }

    fn reload_canvas(&mut self) {
        let Some(artifact) = self.orchestrator.current() else {
            self.canvas.unload_target();
            return;
        };
        match artifact.decode() {
            Ok(image) => self.canvas.load_target(&image),
            Err(error) => {
                warn!(artifact = %artifact.id(), error = %error, "artifact is not a decodable image");
                self.canvas.unload_target();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{RasterPoint, RasterSize, ToolMode};
    use crate::refine::orchestrator::tests::FakeService;
    use crate::refine::ServiceError;

    fn session(fake: Arc<FakeService>) -> EditingSession {
        EditingSession::new(fake, &ColorizerSettings::default())
    }

    fn upload(session: &mut EditingSession) {
        session.upload(SourceImage::new("photo.jpg", vec![0xff, 0xd8, 0xff, 0xe0]));
    }

    fn paint(session: &mut EditingSession) {
        let canvas = session.canvas_mut();
        assert!(canvas.begin_stroke(RasterPoint::new(1.0, 1.0)));
        assert!(canvas.extend_stroke(RasterPoint::new(6.0, 6.0)));
        assert!(canvas.end_stroke());
    }

    #[tokio::test]
    async fn colorize_without_upload_is_rejected_locally() {
        let fake = Arc::new(FakeService::default());
        let mut session = session(fake.clone());
        let err = session.colorize().await.expect_err("should reject");
        assert!(err.is_input_error());
        assert!(fake.seen_colorize.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn colorize_loads_artifact_onto_canvas() {
        let mut session = session(Arc::new(FakeService::default()));
        upload(&mut session);
        session.colorize().await.expect("colorize");

        assert_eq!(session.canvas().size(), Some(RasterSize::new(8, 8)));
        assert_eq!(session.current_tier(), Some(ConfidenceTier::High));
        assert!(!session.can_undo());
    }

    #[tokio::test]
    async fn refine_flow_matches_linear_history() {
        let fake = Arc::new(FakeService::default());
        let mut session = session(fake.clone());
        upload(&mut session);
        let a0 = session.colorize().await.expect("a0");
        session.set_refine_mode(true);

        paint(&mut session);
        session.canvas_mut().set_mode(ToolMode::Sample);
        let sampled = session
            .canvas_mut()
            .sample(RasterPoint::new(2.5, 2.5))
            .expect("sample");
        assert_eq!(sampled.to_hex(), "#1a2b3c");

        let a1 = session.refine().await.expect("a1");
        assert_eq!(session.history().len, 2);
        assert_eq!(session.history().cursor, 1);
        {
            let seen = fake.seen_refine.lock().expect("lock");
            assert_eq!(seen[0].base.id(), a0.id());
            assert_eq!(seen[0].target_color.map(|c| c.to_hex()).as_deref(), Some("#1a2b3c"));
            let mask = image::load_from_memory(&seen[0].mask_png)
                .expect("mask png")
                .to_luma8();
            assert_eq!(mask.get_pixel(3, 3).0, [255]);
        }
        assert!(!session.canvas().has_strokes());

        assert!(session.undo());
        assert_eq!(session.current_artifact().map(|a| a.id()), Some(a0.id()));
        assert_eq!(session.canvas().sampled_color(), Some(sampled));

        let a2 = session.refine().await.expect("a2");
        let ids: Vec<_> = session
            .orchestrator()
            .entries()
            .iter()
            .map(|a| a.id())
            .collect();
        assert_eq!(ids, vec![a0.id(), a2.id()]);
        assert_ne!(a1.id(), a2.id());
        assert!(!session.can_redo());
    }

    #[tokio::test]
    async fn refine_before_colorize_is_empty_history() {
        let fake = Arc::new(FakeService::default());
        let mut session = session(fake.clone());
        upload(&mut session);
        let err = session.refine().await.expect_err("should reject");
        assert!(matches!(err, RefineError::EmptyHistory));
        assert!(fake.seen_refine.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn failed_refine_keeps_strokes_and_history() {
        let fake = Arc::new(FakeService::default());
        let mut session = session(fake.clone());
        upload(&mut session);
        session.colorize().await.expect("a0");
        paint(&mut session);
        fake.fail_next
            .lock()
            .expect("lock")
            .push_back(ServiceError::Status {
                status: 500,
                body: String::from("boom"),
            });

        let err = session.refine().await.expect_err("should fail");

        assert_eq!(err.user_message(), Some("Failed to refine image areas."));
        assert_eq!(session.history().len, 1);
        assert!(session.canvas().has_strokes());
    }

    #[tokio::test]
    async fn upload_discards_previous_history() {
        let mut session = session(Arc::new(FakeService::default()));
        upload(&mut session);
        session.colorize().await.expect("a0");
        session.set_refine_mode(true);

        upload(&mut session);

        assert_eq!(session.history().len, 0);
        assert_eq!(session.history().cursor, -1);
        assert!(!session.refine_mode());
        assert!(session.canvas().size().is_none());
        assert!(session.source().is_some());
    }

    #[tokio::test]
    async fn save_current_writes_artifact_bytes() {
        let mut session = session(Arc::new(FakeService::default()));
        let dir = std::env::temp_dir().join(format!("colorize_refine_save_{}", uuid::Uuid::new_v4()));
        let path = dir.join("out").join("result.png");
        assert!(matches!(session.save_current(&path), Err(SaveError::NoArtifact)));

        upload(&mut session);
        let artifact = session.colorize().await.expect("a0");
        session.save_current(&path).expect("save");

        assert_eq!(std::fs::read(&path).expect("read back"), artifact.bytes());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn reset_clears_source_and_history() {
        let mut session = session(Arc::new(FakeService::default()));
        upload(&mut session);
        session.colorize().await.expect("a0");
        session.reset();
        assert!(session.source().is_none());
        assert!(session.current_artifact().is_none());
        assert!(session.colorize().await.expect_err("no source").is_input_error());
    }
}
