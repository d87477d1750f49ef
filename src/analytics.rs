//! Read-only reports built on top of the prediction service.

use crate::cities::{self, CITIES};
use crate::error::{AppError, Result};
use crate::fetcher::Fetcher;
use crate::labels::{risk_tier, Disease, ScoreBreakdown};
use crate::models::{LiveWeather, WeatherSnapshot};
use crate::predict::PredictionService;
use crate::store::FeatureImportance;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, warn};

const TOP_FEATURES: usize = 15;

#[derive(Debug, Clone, Serialize)]
pub struct ImportanceReport {
    pub disease: Disease,
    pub top_features: Vec<FeatureImportance>,
    pub total_features: usize,
}

pub fn feature_importance(predictor: &PredictionService, disease: Disease) -> Result<ImportanceReport> {
    let bundle = predictor
        .bundle(disease)
        .ok_or_else(|| AppError::ModelNotFound(disease.to_string()))?;

    Ok(ImportanceReport {
        disease,
        top_features: bundle
            .feature_importance
            .iter()
            .take(TOP_FEATURES)
            .cloned()
            .collect(),
        total_features: bundle.feature_columns.len(),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct Factor {
    pub value: f64,
    pub contribution: f64,
    pub status: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct Factors {
    pub temperature: Factor,
    pub rainfall: Factor,
    pub humidity: Factor,
}

#[derive(Debug, Clone, Serialize)]
pub struct Explanation {
    pub city: String,
    pub disease: Disease,
    pub risk: u8,
    pub factors: Factors,
    /// Heuristic score of the same conditions, split by factor
    pub heuristic: ScoreBreakdown,
    pub confidence: u8,
    pub weather: LiveWeather,
}

fn factors(weather: &LiveWeather) -> Factors {
    let rain = weather.total_rain();
    Factors {
        temperature: Factor {
            value: weather.temp_max,
            contribution: ((weather.temp_max - 28.0).abs() / 28.0 * 100.0).min(40.0),
            status: if (25.0..=30.0).contains(&weather.temp_max) {
                "optimal"
            } else {
                "suboptimal"
            },
        },
        rainfall: Factor {
            value: rain,
            contribution: (rain / 100.0 * 40.0).min(40.0),
            status: if rain > 50.0 { "high" } else { "low" },
        },
        humidity: Factor {
            value: weather.humidity,
            contribution: (weather.humidity / 100.0 * 20.0).min(20.0),
            status: if weather.humidity > 60.0 { "high" } else { "moderate" },
        },
    }
}

/// Live risk for `city` with a per-factor breakdown; `Ok(None)` without live data
pub async fn explain(
    predictor: &PredictionService,
    fetcher: &Fetcher,
    city: &str,
    disease: Disease,
) -> Result<Option<Explanation>> {
    let Some(live) = predictor.predict_live(fetcher, city).await? else {
        return Ok(None);
    };
    let risk = *live
        .risks
        .get(&disease)
        .ok_or_else(|| AppError::ModelNotFound(disease.to_string()))?;

    let w = &live.weather;
    let heuristic = disease.heuristic().breakdown(
        w.temp_max,
        w.temp_min,
        w.total_rain(),
        w.timestamp.month(),
    );

    Ok(Some(Explanation {
        city: live.city.clone(),
        disease,
        risk,
        factors: factors(w),
        heuristic,
        confidence: if risk > 0 { 95 } else { 99 },
        weather: live.weather,
    }))
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyRisk {
    pub date: NaiveDate,
    pub day: u32,
    pub risk: u8,
    pub level: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskCalendar {
    pub city: String,
    pub disease: Disease,
    pub year: i32,
    pub month: u32,
    pub daily_risks: Vec<DailyRisk>,
}

pub fn level(risk: u8) -> &'static str {
    match risk_tier(risk) {
        2 => "high",
        1 => "medium",
        _ => "low",
    }
}

fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((next - first).num_days() as u32)
}

/// One prediction per day of the month from the city's climate normals.
///
/// Monthly rainfall is spread evenly across the days.
pub fn risk_calendar(
    predictor: &PredictionService,
    city: &str,
    disease: Disease,
    year: i32,
    month: u32,
) -> Result<RiskCalendar> {
    let info = cities::find(city)
        .ok_or_else(|| AppError::InvalidData(format!("Unknown city '{}'", city)))?;
    let days = days_in_month(year, month)
        .ok_or_else(|| AppError::InvalidData(format!("Invalid month {}-{}", year, month)))?;
    let (temp_max, temp_min, rain) = cities::normals(info.name)
        .and_then(|n| n.for_month(month))
        .ok_or_else(|| AppError::InvalidData(format!("No climate normals for {}", info.name)))?;

    let mut daily_risks = Vec::with_capacity(days as usize);
    for day in 1..=days {
        let date = NaiveDate::from_ymd_opt(year, month, day)
            .ok_or_else(|| AppError::InvalidData(format!("Invalid date {}-{}-{}", year, month, day)))?;
        let snapshot = WeatherSnapshot {
            city: info.name.to_string(),
            date,
            temp_max,
            temp_min,
            rain: rain / days as f64,
            humidity: None,
            aqi: None,
        };
        let risk = predictor.predict_risk(&snapshot, disease)?;
        daily_risks.push(DailyRisk {
            date,
            day,
            risk,
            level: level(risk),
        });
    }

    Ok(RiskCalendar {
        city: info.name.to_string(),
        disease,
        year,
        month,
        daily_risks,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct CityRisk {
    pub city: String,
    pub risk: u8,
    pub temp: f64,
    pub rain: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CityComparison {
    pub disease: Disease,
    pub cities: Vec<CityRisk>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Live risk for every registered city, highest first
pub async fn compare_cities(
    predictor: &PredictionService,
    fetcher: &Fetcher,
    disease: Disease,
) -> Result<CityComparison> {
    if predictor.bundle(disease).is_none() {
        return Err(AppError::ModelNotFound(disease.to_string()));
    }

    let mut rows = Vec::new();
    let mut timestamp = None;
    for city in CITIES {
        let live = match predictor.predict_live(fetcher, city.name).await {
            Ok(Some(live)) => live,
            Ok(None) => continue,
            Err(e) => {
                warn!(city = city.name, "Live prediction failed: {}", e);
                continue;
            }
        };
        let Some(&risk) = live.risks.get(&disease) else {
            continue;
        };
        timestamp = Some(live.timestamp);
        rows.push(CityRisk {
            city: live.city,
            risk,
            temp: live.weather.temp_max,
            rain: live.weather.total_rain(),
        });
    }

    rows.sort_by(|a, b| b.risk.cmp(&a.risk));
    info!(disease = %disease, cities = rows.len(), "Compared cities");

    Ok(CityComparison {
        disease,
        cities: rows,
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_days_in_month() {
        assert_eq!(days_in_month(2024, 2), Some(29));
        assert_eq!(days_in_month(2023, 2), Some(28));
        assert_eq!(days_in_month(2025, 12), Some(31));
        assert_eq!(days_in_month(2025, 13), None);
    }

    #[test]
    fn test_level_thresholds() {
        assert_eq!(level(71), "high");
        assert_eq!(level(70), "medium");
        assert_eq!(level(41), "medium");
        assert_eq!(level(40), "low");
    }

    #[test]
    fn test_unknown_disease_model() {
        let predictor = PredictionService::default();
        assert!(matches!(
            feature_importance(&predictor, Disease::Malaria),
            Err(AppError::ModelNotFound(_))
        ));
    }

    #[test]
    fn test_calendar_rejects_city_without_normals() {
        let predictor = PredictionService::default();
        let err = risk_calendar(&predictor, "Madurai", Disease::Dengue, 2025, 7).unwrap_err();
        assert!(err.to_string().contains("normals"));
    }
}
