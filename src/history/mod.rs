pub mod artifact;
pub mod stack;

use std::sync::Arc;

pub use artifact::Artifact;
pub use stack::HistoryStack;

pub type ArtifactHistory = HistoryStack<Arc<Artifact>>;
