use crate::error::{AppError, Result};
use crate::features::{engineer_all, feature_matrix, FeatureFrame};
use crate::fetcher::Fetcher;
use crate::labels::Disease;
use crate::ml::Classifier;
use crate::models::{ClimateRow, LiveWeather, WeatherSnapshot};
use crate::store::{ModelBundle, ModelStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Map a positive-class probability to an integer risk in 0..=100
pub fn risk_from_probability(p: f64) -> u8 {
    if p.is_nan() {
        return 0;
    }
    (p * 100.0).floor().clamp(0.0, 100.0) as u8
}

#[derive(Debug, Clone, Serialize)]
pub struct LivePrediction {
    pub city: String,
    pub timestamp: DateTime<Utc>,
    pub weather: LiveWeather,
    pub risks: BTreeMap<Disease, u8>,
}

/// Scores snapshots against the persisted bundles.
///
/// Bundles are read once at construction and never change afterwards.
#[derive(Debug, Clone, Default)]
pub struct PredictionService {
    bundles: BTreeMap<Disease, ModelBundle>,
}

impl PredictionService {
    pub fn new(bundles: BTreeMap<Disease, ModelBundle>) -> Self {
        Self { bundles }
    }

    pub fn from_store(store: &ModelStore) -> Self {
        Self::new(store.load_all())
    }

    pub fn diseases(&self) -> impl Iterator<Item = Disease> + '_ {
        self.bundles.keys().copied()
    }

    pub fn bundle(&self, disease: Disease) -> Option<&ModelBundle> {
        self.bundles.get(&disease)
    }

    pub fn has_models(&self) -> bool {
        !self.bundles.is_empty()
    }

    /// Positive-class probability for one snapshot
    pub fn probability(&self, snapshot: &WeatherSnapshot, disease: Disease) -> Result<f64> {
        let bundle = self
            .bundles
            .get(&disease)
            .ok_or_else(|| AppError::ModelNotFound(disease.to_string()))?;

        let mut frame = FeatureFrame::from_rows(&[ClimateRow::from(snapshot)])?;
        engineer_all(&mut frame, None)?;

        let x = feature_matrix(&frame, &bundle.feature_columns)?;
        let x = bundle.scaler.transform(&x);
        let proba = bundle.model.predict_proba(&x)?;

        proba
            .get(0)
            .copied()
            .ok_or_else(|| AppError::InvalidData("model returned no probability".to_string()))
    }

    pub fn predict_risk(&self, snapshot: &WeatherSnapshot, disease: Disease) -> Result<u8> {
        let p = self.probability(snapshot, disease)?;
        let risk = risk_from_probability(p);
        debug!(city = %snapshot.city, disease = %disease, probability = p, risk, "Predicted risk");
        Ok(risk)
    }

    /// Risk for every loaded disease; a disease that fails is left out
    pub fn predict_all(&self, snapshot: &WeatherSnapshot) -> BTreeMap<Disease, u8> {
        let mut risks = BTreeMap::new();
        for disease in self.diseases() {
            match self.predict_risk(snapshot, disease) {
                Ok(risk) => {
                    risks.insert(disease, risk);
                }
                Err(e) => warn!(disease = %disease, "Prediction failed: {}", e),
            }
        }
        risks
    }

    /// Fetch current conditions for `city` and score them.
    ///
    /// `Ok(None)` when the weather API has nothing for the city.
    pub async fn predict_live(&self, fetcher: &Fetcher, city: &str) -> Result<Option<LivePrediction>> {
        let Some(mut weather) = fetcher.fetch_current_weather(city).await? else {
            return Ok(None);
        };
        if let Some((aqi, pollutant)) = fetcher.fetch_current_aqi(city).await? {
            weather.aqi = Some(aqi);
            weather.main_pollutant = Some(pollutant);
        }

        let risks = self.predict_all(&weather.snapshot());
        Ok(Some(LivePrediction {
            city: weather.city.clone(),
            timestamp: weather.timestamp,
            weather,
            risks,
        }))
    }
}
