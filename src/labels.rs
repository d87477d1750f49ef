//! Weak-supervision labels derived from climate conditions.

use crate::features::FeatureFrame;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Disease {
    Malaria,
    Dengue,
    Cholera,
    #[serde(rename = "Heat Stroke")]
    HeatStroke,
    #[serde(rename = "Respiratory Diseases")]
    RespiratoryDiseases,
}

impl Disease {
    pub const ALL: [Disease; 5] = [
        Disease::Malaria,
        Disease::Dengue,
        Disease::Cholera,
        Disease::HeatStroke,
        Disease::RespiratoryDiseases,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Disease::Malaria => "Malaria",
            Disease::Dengue => "Dengue",
            Disease::Cholera => "Cholera",
            Disease::HeatStroke => "Heat Stroke",
            Disease::RespiratoryDiseases => "Respiratory Diseases",
        }
    }

    /// File-name form, e.g. `heat_stroke`
    pub fn slug(&self) -> String {
        self.name().to_lowercase().replace(' ', "_")
    }

    pub fn params(&self) -> &'static DiseaseParams {
        match self {
            Disease::Malaria => &MALARIA,
            Disease::Dengue => &DENGUE,
            Disease::Cholera => &CHOLERA,
            Disease::HeatStroke => &HEAT_STROKE,
            Disease::RespiratoryDiseases => &RESPIRATORY,
        }
    }

    pub fn heuristic(&self) -> &'static HeuristicProfile {
        match self {
            Disease::Malaria => &MALARIA_PROFILE,
            Disease::Dengue => &DENGUE_PROFILE,
            Disease::Cholera => &CHOLERA_PROFILE,
            Disease::HeatStroke => &HEAT_STROKE_PROFILE,
            Disease::RespiratoryDiseases => &RESPIRATORY_PROFILE,
        }
    }
}

impl fmt::Display for Disease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Disease {
    type Err = String;

    /// Accepts the display name or the slug, ignoring case
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase().replace(['_', '-'], " ");
        Disease::ALL
            .into_iter()
            .find(|d| d.name().to_lowercase() == needle)
            .ok_or_else(|| {
                let known: Vec<&str> = Disease::ALL.iter().map(|d| d.name()).collect();
                format!("Unknown disease '{}', expected one of: {}", s, known.join(", "))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// `temp_max` at or above the lower bound
    Heat,
    /// `temp_max` at or below the upper bound, plus poor air when the
    /// disease is AQI-sensitive and AQI is known
    ColdRespiratory,
    /// Inside the temperature band
    Standard,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiseaseParams {
    pub temp_low: f64,
    pub temp_high: f64,
    /// Rainfall in mm that must be exceeded; 0 disables the rain condition
    pub rain_threshold: f64,
    pub peak_months: &'static [u32],
    pub humidity_gate: bool,
    pub aqi_sensitive: bool,
    pub rule: RuleKind,
}

const HUMIDITY_GATE: f64 = 60.0;
const UNHEALTHY_AQI: f64 = 100.0;

static MALARIA: DiseaseParams = DiseaseParams {
    temp_low: 18.0,
    temp_high: 32.0,
    rain_threshold: 20.0,
    peak_months: &[5, 6, 7, 8, 9, 10],
    humidity_gate: true,
    aqi_sensitive: false,
    rule: RuleKind::Standard,
};

static DENGUE: DiseaseParams = DiseaseParams {
    temp_low: 20.0,
    temp_high: 34.0,
    rain_threshold: 50.0,
    peak_months: &[6, 7, 8, 9, 10, 11],
    humidity_gate: true,
    aqi_sensitive: false,
    rule: RuleKind::Standard,
};

static CHOLERA: DiseaseParams = DiseaseParams {
    temp_low: 15.0,
    temp_high: 35.0,
    rain_threshold: 100.0,
    peak_months: &[6, 7, 8, 9],
    humidity_gate: false,
    aqi_sensitive: false,
    rule: RuleKind::Standard,
};

static HEAT_STROKE: DiseaseParams = DiseaseParams {
    temp_low: 35.0,
    temp_high: 50.0,
    rain_threshold: 0.0,
    peak_months: &[3, 4, 5, 6],
    humidity_gate: true,
    aqi_sensitive: false,
    rule: RuleKind::Heat,
};

static RESPIRATORY: DiseaseParams = DiseaseParams {
    temp_low: 10.0,
    temp_high: 22.0,
    rain_threshold: 0.0,
    peak_months: &[11, 12, 1, 2, 3],
    humidity_gate: false,
    aqi_sensitive: true,
    rule: RuleKind::ColdRespiratory,
};

/// Inputs of one row that the rules look at
#[derive(Debug, Clone, Copy, Default)]
pub struct Conditions {
    pub temp_max: f64,
    pub rain: f64,
    pub month: Option<u32>,
    pub humidity: Option<f64>,
    pub aqi: Option<f64>,
}

impl DiseaseParams {
    pub fn is_positive(&self, c: &Conditions) -> bool {
        let in_band = c.temp_max >= self.temp_low && c.temp_max <= self.temp_high;
        let base = match self.rule {
            RuleKind::Heat => c.temp_max >= self.temp_low,
            RuleKind::ColdRespiratory => {
                let poor_air =
                    !self.aqi_sensitive || c.aqi.map_or(true, |a| a > UNHEALTHY_AQI);
                c.temp_max <= self.temp_high && poor_air
            }
            RuleKind::Standard if self.rain_threshold > 0.0 => {
                in_band && c.rain > self.rain_threshold
            }
            RuleKind::Standard => in_band,
        };

        let in_season = c.month.map_or(true, |m| self.peak_months.contains(&m));
        let humid = !self.humidity_gate || c.humidity.map_or(true, |h| h > HUMIDITY_GATE);

        base && in_season && humid
    }
}

/// Column values by row, `fallback` where the column or the value is missing
fn column_or(frame: &FeatureFrame, name: &str, fallback: f64) -> Vec<f64> {
    match frame.column(name) {
        Some(values) => values.into_iter().map(|v| v.unwrap_or(fallback)).collect(),
        None => vec![fallback; frame.len()],
    }
}

fn optional_column(frame: &FeatureFrame, name: &str) -> Vec<Option<f64>> {
    frame.column(name).unwrap_or_else(|| vec![None; frame.len()])
}

/// Binary outbreak label per row. Deterministic for a given frame.
pub fn generate_labels(frame: &FeatureFrame, disease: Disease) -> Vec<u8> {
    let params = disease.params();
    let temp_max = column_or(frame, "temp_max", f64::NAN);
    let rain = column_or(frame, "rain", 0.0);
    let month = optional_column(frame, "month");
    let humidity = optional_column(frame, "humidity");
    let aqi = optional_column(frame, "aqi_avg");

    (0..frame.len())
        .map(|row| {
            let conditions = Conditions {
                temp_max: temp_max[row],
                rain: rain[row],
                month: month[row].map(|m| m as u32),
                humidity: humidity[row],
                aqi: aqi[row],
            };
            u8::from(params.is_positive(&conditions))
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RainCorrelation {
    Positive,
    Negative,
}

/// Weighted temperature/rain/season profile behind the 0-100 heuristic score
#[derive(Debug, Clone, PartialEq)]
pub struct HeuristicProfile {
    pub optimal_temp_min: f64,
    pub optimal_temp_max: f64,
    pub rainfall_scale: f64,
    pub correlation: RainCorrelation,
    pub temp_weight: f64,
    pub rain_weight: f64,
    pub seasonal_weight: f64,
    pub peak_months: &'static [u32],
}

static MALARIA_PROFILE: HeuristicProfile = HeuristicProfile {
    optimal_temp_min: 20.0,
    optimal_temp_max: 30.0,
    rainfall_scale: 100.0,
    correlation: RainCorrelation::Positive,
    temp_weight: 0.4,
    rain_weight: 0.4,
    seasonal_weight: 0.2,
    peak_months: &[6, 7, 8, 9],
};

static DENGUE_PROFILE: HeuristicProfile = HeuristicProfile {
    optimal_temp_min: 22.0,
    optimal_temp_max: 32.0,
    rainfall_scale: 100.0,
    correlation: RainCorrelation::Positive,
    temp_weight: 0.4,
    rain_weight: 0.4,
    seasonal_weight: 0.2,
    peak_months: &[6, 7, 8, 9, 10],
};

static CHOLERA_PROFILE: HeuristicProfile = HeuristicProfile {
    optimal_temp_min: 15.0,
    optimal_temp_max: 35.0,
    rainfall_scale: 150.0,
    correlation: RainCorrelation::Positive,
    temp_weight: 0.3,
    rain_weight: 0.5,
    seasonal_weight: 0.2,
    peak_months: &[5, 6, 7, 8],
};

static HEAT_STROKE_PROFILE: HeuristicProfile = HeuristicProfile {
    optimal_temp_min: 35.0,
    optimal_temp_max: 50.0,
    rainfall_scale: 50.0,
    correlation: RainCorrelation::Negative,
    temp_weight: 0.5,
    rain_weight: 0.3,
    seasonal_weight: 0.2,
    peak_months: &[3, 4, 5],
};

static RESPIRATORY_PROFILE: HeuristicProfile = HeuristicProfile {
    optimal_temp_min: 10.0,
    optimal_temp_max: 25.0,
    rainfall_scale: 50.0,
    correlation: RainCorrelation::Positive,
    temp_weight: 0.5,
    rain_weight: 0.2,
    seasonal_weight: 0.3,
    peak_months: &[10, 11, 12, 1],
};

/// Per-factor breakdown of a heuristic score, each on a 0-100 scale
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub temperature: f64,
    pub rainfall: f64,
    pub seasonal: f64,
    pub score: u8,
}

impl HeuristicProfile {
    pub fn breakdown(&self, temp_max: f64, temp_min: f64, rain: f64, month: u32) -> ScoreBreakdown {
        let temp_avg = (temp_max + temp_min) / 2.0;
        let mid = (self.optimal_temp_min + self.optimal_temp_max) / 2.0;
        let half = (self.optimal_temp_max - self.optimal_temp_min) / 2.0;

        let temperature = if temp_avg >= self.optimal_temp_min && temp_avg <= self.optimal_temp_max {
            100.0 - ((temp_avg - mid).abs() / half) * 30.0
        } else {
            let deviation = ((temp_avg - mid).abs() - half).min(20.0);
            (70.0 - deviation * 3.0).max(0.0)
        };

        let ratio = rain / self.rainfall_scale * 100.0;
        let rainfall = match self.correlation {
            RainCorrelation::Positive => ratio.min(100.0),
            RainCorrelation::Negative => (100.0 - ratio).max(0.0),
        };

        let seasonal = if self.peak_months.contains(&month) {
            100.0
        } else {
            30.0
        };

        let raw = temperature * self.temp_weight
            + rainfall * self.rain_weight
            + seasonal * self.seasonal_weight;

        ScoreBreakdown {
            temperature,
            rainfall,
            seasonal,
            score: raw.round().clamp(0.0, 100.0) as u8,
        }
    }
}

pub fn heuristic_score(disease: Disease, temp_max: f64, temp_min: f64, rain: f64, month: u32) -> u8 {
    disease
        .heuristic()
        .breakdown(temp_max, temp_min, rain, month)
        .score
}

/// 2 = high (> 70), 1 = medium (> 40), 0 = low
pub fn risk_tier(score: u8) -> u8 {
    match score {
        s if s > 70 => 2,
        s if s > 40 => 1,
        _ => 0,
    }
}

/// Heuristic risk tier per row, see [`risk_tier`]
pub fn generate_tiered_labels(frame: &FeatureFrame, disease: Disease) -> Vec<u8> {
    let temp_max = column_or(frame, "temp_max", 0.0);
    let temp_min = column_or(frame, "temp_min", 0.0);
    let rain = column_or(frame, "rain", 0.0);
    let month = column_or(frame, "month", 0.0);

    (0..frame.len())
        .map(|row| {
            let score = heuristic_score(
                disease,
                temp_max[row],
                temp_min[row],
                rain[row],
                month[row] as u32,
            );
            risk_tier(score)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{add_temporal_features, FeatureFrame};
    use crate::models::ClimateRow;
    use chrono::NaiveDate;

    fn frame(temp_max: f64, rain: f64, month: u32, humidity: Option<f64>) -> FeatureFrame {
        let row = ClimateRow {
            city: "Delhi".to_string(),
            date: NaiveDate::from_ymd_opt(2024, month, 15).unwrap(),
            temp_max,
            temp_min: temp_max - 10.0,
            rain,
            humidity,
            aqi: None,
        };
        let mut frame = FeatureFrame::from_rows(&[row]).unwrap();
        add_temporal_features(&mut frame).unwrap();
        frame
    }

    #[test]
    fn test_heat_stroke_vs_cholera() {
        let f = frame(40.0, 0.0, 5, None);
        assert_eq!(generate_labels(&f, Disease::HeatStroke), vec![1]);
        assert_eq!(generate_labels(&f, Disease::Cholera), vec![0]);
    }

    #[test]
    fn test_humidity_gate() {
        let dry = frame(28.0, 30.0, 7, Some(40.0));
        let humid = frame(28.0, 30.0, 7, Some(80.0));
        assert_eq!(generate_labels(&dry, Disease::Malaria), vec![0]);
        assert_eq!(generate_labels(&humid, Disease::Malaria), vec![1]);
    }

    #[test]
    fn test_respiratory_needs_poor_air_when_known() {
        let params = Disease::RespiratoryDiseases.params();
        let mut c = Conditions {
            temp_max: 18.0,
            rain: 0.0,
            month: Some(12),
            humidity: None,
            aqi: Some(80.0),
        };
        assert!(!params.is_positive(&c));
        c.aqi = Some(180.0);
        assert!(params.is_positive(&c));
        c.aqi = None;
        assert!(params.is_positive(&c));
        c.month = Some(7);
        assert!(!params.is_positive(&c));
    }

    #[test]
    fn test_aqi_gate_only_for_sensitive_diseases() {
        let insensitive = DiseaseParams {
            aqi_sensitive: false,
            ..RESPIRATORY.clone()
        };
        let clean_air = Conditions {
            temp_max: 18.0,
            month: Some(1),
            aqi: Some(40.0),
            ..Conditions::default()
        };
        assert!(insensitive.is_positive(&clean_air));
        assert!(!RESPIRATORY.is_positive(&clean_air));
    }

    #[test]
    fn test_missing_month_column_skips_season() {
        let row = ClimateRow {
            city: "Delhi".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 12, 1).unwrap(),
            temp_max: 44.0,
            temp_min: 30.0,
            rain: 0.0,
            humidity: None,
            aqi: None,
        };
        // no temporal step: December would fail the Heat Stroke season
        let frame = FeatureFrame::from_rows(&[row]).unwrap();
        assert_eq!(generate_labels(&frame, Disease::HeatStroke), vec![1]);
    }

    #[test]
    fn test_labels_deterministic() {
        let f = frame(30.0, 120.0, 8, Some(70.0));
        for d in Disease::ALL {
            assert_eq!(generate_labels(&f, d), generate_labels(&f, d));
        }
    }

    #[test]
    fn test_disease_names_round_trip() {
        for d in Disease::ALL {
            assert_eq!(d.name().parse::<Disease>().unwrap(), d);
            assert_eq!(d.slug().parse::<Disease>().unwrap(), d);
        }
        assert_eq!(Disease::HeatStroke.slug(), "heat_stroke");
        assert!("flu".parse::<Disease>().is_err());
    }

    #[test]
    fn test_heuristic_score_and_tier() {
        // Hot dry May: temp avg 37.5 inside 35-50 band
        let score = heuristic_score(Disease::HeatStroke, 42.0, 33.0, 0.0, 5);
        assert!(score > 70, "score {}", score);
        assert_eq!(risk_tier(score), 2);
        assert_eq!(risk_tier(55), 1);
        assert_eq!(risk_tier(40), 0);

        let f = frame(42.0, 0.0, 5, None);
        assert_eq!(generate_tiered_labels(&f, Disease::HeatStroke), vec![2]);
    }
}
