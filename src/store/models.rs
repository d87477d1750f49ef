use crate::labels::Disease;
use crate::ml::{ModelKind, SoftVotingEnsemble, StandardScaler};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Everything needed to score a snapshot for one disease
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelBundle {
    pub disease: Disease,
    pub model: SoftVotingEnsemble<ModelKind>,
    pub scaler: StandardScaler,
    /// Column order the model was trained on
    pub feature_columns: Vec<String>,
    #[serde(default)]
    pub feature_importance: Vec<FeatureImportance>,
    pub trained_at: DateTime<Utc>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub update_count: u32,
}

/// Per-disease entry of `model_metrics.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub samples: usize,
    pub training_samples: usize,
    pub test_samples: usize,
    pub positive_cases: usize,
    pub features_count: usize,
    pub feature_importance: Vec<FeatureImportance>,
    pub top_feature: Option<String>,
    /// Rows per heuristic risk tier in the training table
    #[serde(default)]
    pub risk_tiers: RiskTiers,
    pub trained_on: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskTiers {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
}

impl RiskTiers {
    pub fn count(tiers: &[u8]) -> Self {
        let mut counts = Self::default();
        for &tier in tiers {
            match tier {
                2 => counts.high += 1,
                1 => counts.medium += 1,
                _ => counts.low += 1,
            }
        }
        counts
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnlineLearningInfo {
    pub enabled: bool,
    pub last_updated: DateTime<Utc>,
    pub update_count: u32,
}

/// Contents of `model_metrics.json`: one entry per disease name plus an
/// optional online-learning block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub online_learning: Option<OnlineLearningInfo>,
    #[serde(flatten)]
    pub diseases: BTreeMap<String, ModelMetrics>,
}
