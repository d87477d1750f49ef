use crate::cities::{self, MONTH_NAMES};
use crate::error::{AppError, Result};
use crate::fetcher::Fetcher;
use crate::labels::Disease;
use crate::models::WeatherSnapshot;
use crate::predict::PredictionService;
use chrono::{Datelike, NaiveDate, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Days taken from the forecast API before switching to climate normals
const API_DAYS: usize = 5;

/// Humidity reported for points built from monthly normals
const ESTIMATED_HUMIDITY: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastSource {
    WeatherApi,
    ClimateNormals,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub month: &'static str,
    pub risk: u8,
    pub temp: f64,
    pub temp_max: f64,
    pub temp_min: f64,
    pub rainfall: f64,
    pub humidity: f64,
    pub source: ForecastSource,
}

#[derive(Debug, Clone, Serialize)]
pub struct CityForecast {
    pub city: String,
    pub forecasts: BTreeMap<Disease, Vec<ForecastPoint>>,
    pub timestamp: chrono::DateTime<Utc>,
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn month_name(date: NaiveDate) -> &'static str {
    MONTH_NAMES[date.month0() as usize]
}

/// First day of the month `offset` months after `from`'s month
fn month_start(from: NaiveDate, offset: u32) -> Option<NaiveDate> {
    let index = from.year() * 12 + from.month0() as i32 + offset as i32;
    NaiveDate::from_ymd_opt(index.div_euclid(12), index.rem_euclid(12) as u32 + 1, 1)
}

/// Hybrid risk forecast: short-range API days, then monthly climate normals
pub struct ForecastService<'a> {
    predictor: &'a PredictionService,
    fetcher: &'a Fetcher,
}

impl<'a> ForecastService<'a> {
    pub fn new(predictor: &'a PredictionService, fetcher: &'a Fetcher) -> Self {
        Self { predictor, fetcher }
    }

    pub async fn generate(&self, city: &str, disease: Disease, months: u32) -> Result<Vec<ForecastPoint>> {
        let info = cities::find(city)
            .ok_or_else(|| AppError::InvalidData(format!("Unknown city '{}'", city)))?;
        let days = match self.fetcher.fetch_forecast(info.name).await {
            Ok(days) => days.unwrap_or_default(),
            Err(e) => {
                warn!(city = info.name, "Forecast response unusable: {}", e);
                Vec::new()
            }
        };

        let today = Utc::now().date_naive();
        let mut rng = StdRng::from_entropy();
        let mut points = daily_points(self.predictor, info.name, disease, &days)?;
        points.extend(monthly_points(
            self.predictor,
            info.name,
            disease,
            months,
            today,
            &mut rng,
        )?);

        info!(city = info.name, disease = %disease, points = points.len(), "Generated forecast");
        Ok(points)
    }

    /// Forecast for every loaded disease
    pub async fn generate_all(&self, city: &str, months: u32) -> Result<CityForecast> {
        let mut forecasts = BTreeMap::new();
        for disease in self.predictor.diseases() {
            forecasts.insert(disease, self.generate(city, disease, months).await?);
        }
        Ok(CityForecast {
            city: city.to_string(),
            forecasts,
            timestamp: Utc::now(),
        })
    }
}

/// Points for the first days of the API forecast
pub fn daily_points(
    predictor: &PredictionService,
    city: &str,
    disease: Disease,
    days: &[crate::models::DailyForecast],
) -> Result<Vec<ForecastPoint>> {
    days.iter()
        .take(API_DAYS)
        .map(|day| {
            let snapshot = WeatherSnapshot {
                city: city.to_string(),
                date: day.date,
                temp_max: day.temp_max,
                temp_min: day.temp_min,
                rain: day.rain,
                humidity: Some(day.humidity),
                aqi: None,
            };
            Ok(ForecastPoint {
                date: day.date,
                month: month_name(day.date),
                risk: predictor.predict_risk(&snapshot, disease)?,
                temp: round1(day.temp_avg),
                temp_max: round1(day.temp_max),
                temp_min: round1(day.temp_min),
                rainfall: round1(day.rain),
                humidity: round1(day.humidity),
                source: ForecastSource::WeatherApi,
            })
        })
        .collect()
}

/// `months - 1` points from monthly normals, starting the month after `today`.
///
/// Temperatures are jittered by x U(0.95, 1.05) and rain by x U(0.9, 1.1).
/// Cities without normals produce no points.
pub fn monthly_points<R: Rng>(
    predictor: &PredictionService,
    city: &str,
    disease: Disease,
    months: u32,
    today: NaiveDate,
    rng: &mut R,
) -> Result<Vec<ForecastPoint>> {
    let Some(normals) = cities::normals(city) else {
        warn!(city, "No climate normals, skipping long-range forecast");
        return Ok(Vec::new());
    };

    let mut points = Vec::new();
    for i in 1..months {
        let Some(date) = month_start(today, i) else {
            break;
        };
        let Some((temp_max, temp_min, rain)) = normals.for_month(date.month()) else {
            continue;
        };
        let temp_max = temp_max * rng.gen_range(0.95..1.05);
        let temp_min = temp_min * rng.gen_range(0.95..1.05);
        let rain = rain * rng.gen_range(0.9..1.1);

        let snapshot = WeatherSnapshot {
            city: city.to_string(),
            date,
            temp_max,
            temp_min,
            rain,
            humidity: None,
            aqi: None,
        };

        points.push(ForecastPoint {
            date,
            month: month_name(date),
            risk: predictor.predict_risk(&snapshot, disease)?,
            temp: round1((temp_max + temp_min) / 2.0),
            temp_max: round1(temp_max),
            temp_min: round1(temp_min),
            rainfall: round1(rain),
            humidity: ESTIMATED_HUMIDITY,
            source: ForecastSource::ClimateNormals,
        });
    }
    Ok(points)
}
