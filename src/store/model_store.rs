use super::models::{MetricsFile, ModelBundle, ModelMetrics, OnlineLearningInfo};
use super::write_atomic;
use crate::error::Result;
use crate::labels::Disease;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const METRICS_FILE: &str = "model_metrics.json";

/// Directory of `{slug}_model.json` bundles and the metrics summary
#[derive(Debug, Clone)]
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn bundle_path(&self, disease: Disease) -> PathBuf {
        self.dir.join(format!("{}_model.json", disease.slug()))
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.dir.join(METRICS_FILE)
    }

    pub fn save(&self, bundle: &ModelBundle) -> Result<PathBuf> {
        let path = self.bundle_path(bundle.disease);
        let json = serde_json::to_vec(bundle)?;
        write_atomic(&path, &json)?;
        info!(disease = %bundle.disease, path = %path.display(), "Saved model bundle");
        Ok(path)
    }

    /// `Ok(None)` when no bundle has been trained for `disease`
    pub fn load(&self, disease: Disease) -> Result<Option<ModelBundle>> {
        let path = self.bundle_path(disease);
        if !path.exists() {
            debug!(disease = %disease, path = %path.display(), "No model bundle on disk");
            return Ok(None);
        }
        let content = std::fs::read(&path)?;
        let bundle: ModelBundle = serde_json::from_slice(&content)?;
        Ok(Some(bundle))
    }

    /// Every bundle that loads; unreadable ones are skipped with a warning
    pub fn load_all(&self) -> BTreeMap<Disease, ModelBundle> {
        let mut bundles = BTreeMap::new();
        for disease in Disease::ALL {
            match self.load(disease) {
                Ok(Some(bundle)) => {
                    bundles.insert(disease, bundle);
                }
                Ok(None) => {}
                Err(e) => warn!(disease = %disease, "Skipping unreadable model bundle: {}", e),
            }
        }
        info!("Loaded {} model bundles from {}", bundles.len(), self.dir.display());
        bundles
    }

    pub fn read_metrics(&self) -> Result<Option<MetricsFile>> {
        let path = self.metrics_path();
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read(&path)?;
        Ok(Some(serde_json::from_slice(&content)?))
    }

    /// Replace the per-disease entries, keeping any other diseases already recorded
    pub fn write_metrics(&self, metrics: &BTreeMap<Disease, ModelMetrics>) -> Result<PathBuf> {
        let mut file = match self.read_metrics() {
            Ok(existing) => existing.unwrap_or_default(),
            Err(e) => {
                warn!("Existing metrics summary unreadable, starting fresh: {}", e);
                MetricsFile::default()
            }
        };
        for (disease, m) in metrics {
            file.diseases.insert(disease.name().to_string(), m.clone());
        }

        let path = self.metrics_path();
        write_atomic(&path, &serde_json::to_vec_pretty(&file)?)?;
        info!(path = %path.display(), "Wrote model metrics");
        Ok(path)
    }

    /// Record the latest online update in the metrics summary.
    ///
    /// Returns `false` without writing when there is no summary yet.
    pub fn annotate_online_learning(
        &self,
        last_updated: DateTime<Utc>,
        update_count: u32,
    ) -> Result<bool> {
        let Some(mut file) = self.read_metrics()? else {
            return Ok(false);
        };
        file.online_learning = Some(OnlineLearningInfo {
            enabled: true,
            last_updated,
            update_count,
        });
        write_atomic(&self.metrics_path(), &serde_json::to_vec_pretty(&file)?)?;
        Ok(true)
    }
}
