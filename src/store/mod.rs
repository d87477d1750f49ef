//! On-disk state: trained model bundles, the metrics summary and the
//! online-learning buffer.

mod buffer;
mod model_store;
mod models;

pub use buffer::BufferStore;
pub use model_store::ModelStore;
pub use models::{
    FeatureImportance, MetricsFile, ModelBundle, ModelMetrics, OnlineLearningInfo, RiskTiers,
};

use crate::error::Result;
use std::path::Path;

/// Write `bytes` next to `path` and rename over it
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
