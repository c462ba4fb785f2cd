pub mod metrics;
pub mod orchestrator;
pub mod service;

pub use metrics::{ArtifactMetrics, ConfidenceThresholds, ConfidenceTier};
pub use orchestrator::{HistorySnapshot, RefineError, RefinementOrchestrator, ServiceOperation};
pub use service::{
    ColorizationService, HttpColorizationService, ServiceError, ServiceStatus,
    SharedColorizationService, SourceImage,
};
