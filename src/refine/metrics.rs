use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ColorizeMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_color_strength: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tile_confidence_map: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RefineMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brush_confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArtifactMetrics {
    Colorize(ColorizeMetrics),
    Refine(RefineMetrics),
}

impl ArtifactMetrics {
    pub fn headline_score(&self) -> Option<f64> {
        match self {
            Self::Colorize(m) => m.global_color_strength,
            Self::Refine(m) => m.brush_confidence,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceThresholds {
    pub high: f64,
    pub medium: f64,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            high: 75.0,
            medium: 45.0,
        }
    }
}

impl ConfidenceThresholds {
    pub fn classify(&self, score: f64) -> ConfidenceTier {
        if score >= self.high {
            ConfidenceTier::High
        } else if score >= self.medium {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        }
    }
}
