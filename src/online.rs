use crate::cities::CITIES;
use crate::error::Result;
use crate::features::{engineer_all, feature_matrix, FeatureFrame};
use crate::fetcher::Fetcher;
use crate::labels::{generate_labels, Disease};
use crate::ml::Classifier;
use crate::models::{BufferedRecord, ClimateRow};
use crate::store::{BufferStore, ModelStore};
use chrono::Utc;
use ndarray::Array1;
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrainingRun {
    NotEnoughData { have: usize, need: usize },
    NoUpdates { records: usize },
    Updated { diseases: Vec<Disease>, records: usize },
}

/// Buffers live observations and periodically re-fits the saved models on them
pub struct OnlineLearner {
    buffer: BufferStore,
    models: ModelStore,
    min_records: usize,
}

impl OnlineLearner {
    pub fn new(buffer: BufferStore, models: ModelStore, min_records: usize) -> Self {
        Self {
            buffer,
            models,
            min_records,
        }
    }

    /// Fetch current data for every city and append it to the buffer and the monthly log
    pub async fn collect(&self, fetcher: &Fetcher) -> Result<usize> {
        let weather = fetcher.fetch_all_realtime(CITIES).await;
        let collected_at = Utc::now();
        let records: Vec<BufferedRecord> = weather
            .into_iter()
            .map(|weather| BufferedRecord {
                weather,
                collected_at,
            })
            .collect();
        self.append(&records)?;
        Ok(records.len())
    }

    pub fn append(&self, records: &[BufferedRecord]) -> Result<()> {
        if records.is_empty() {
            warn!("No real-time records collected");
            return Ok(());
        }

        let mut buffer = self.buffer.load()?;
        buffer.extend_from_slice(records);
        self.buffer.save(&buffer)?;
        let log = self.buffer.log_path(records[0].collected_at);
        self.buffer.append_log(records, records[0].collected_at)?;

        info!(
            collected = records.len(),
            buffered = buffer.len(),
            log = %log.display(),
            "Buffered real-time records"
        );
        Ok(())
    }

    /// Re-fit every saved model on the buffered batch.
    ///
    /// A model is only touched when its labels on the batch include a
    /// positive; its scaler and feature list are kept. The buffer is cleared
    /// once at least one model was updated.
    pub fn run_incremental_training(&self) -> Result<TrainingRun> {
        let records = self.buffer.load()?;
        if records.len() < self.min_records {
            info!(
                have = records.len(),
                need = self.min_records,
                "Not enough buffered data for training"
            );
            return Ok(TrainingRun::NotEnoughData {
                have: records.len(),
                need: self.min_records,
            });
        }

        let rows: Vec<ClimateRow> = records.iter().map(BufferedRecord::to_climate_row).collect();
        let mut frame = FeatureFrame::from_rows(&rows)?;
        engineer_all(&mut frame, None)?;

        let now = Utc::now();
        let mut updated = Vec::new();
        let mut max_updates = 0;

        for disease in Disease::ALL {
            let Some(mut bundle) = self.models.load(disease)? else {
                debug!(disease = %disease, "No saved model to update");
                continue;
            };

            let labels = generate_labels(&frame, disease);
            if !labels.contains(&1) {
                debug!(disease = %disease, "Batch has no positive cases, model unchanged");
                continue;
            }

            let x = feature_matrix(&frame, &bundle.feature_columns)?;
            let x = bundle.scaler.transform(&x);
            let y: Array1<usize> = labels.iter().map(|&l| l as usize).collect();

            if let Err(e) = bundle.model.fit(&x, &y) {
                warn!(disease = %disease, "Incremental update failed: {}", e);
                continue;
            }
            bundle.update_count += 1;
            bundle.last_updated = Some(now);
            max_updates = max_updates.max(bundle.update_count);

            self.models.save(&bundle)?;
            info!(
                disease = %disease,
                samples = y.len(),
                update = bundle.update_count,
                "Model updated"
            );
            updated.push(disease);
        }

        if updated.is_empty() {
            info!(records = records.len(), "No model needed an update");
            return Ok(TrainingRun::NoUpdates {
                records: records.len(),
            });
        }

        if !self.models.annotate_online_learning(now, max_updates)? {
            debug!("No metrics summary to annotate");
        }
        self.buffer.clear()?;
        info!(records = records.len(), "Cleared online-learning buffer");

        Ok(TrainingRun::Updated {
            diseases: updated,
            records: records.len(),
        })
    }
}
