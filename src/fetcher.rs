use crate::cities::{self, City};
use crate::config::ApiConfig;
use crate::error::{AppError, Result};
use crate::models::{DailyForecast, LiveWeather};
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Forecast days kept from the 3-hourly feed
const MAX_FORECAST_DAYS: usize = 6;

/// Best-effort client for the weather and air-quality APIs.
///
/// Every call is a single attempt. Transport failures, timeouts and
/// non-success statuses come back as `Ok(None)`; only a successful
/// response with an undecodable body is an error.
pub struct Fetcher {
    client: Client,
    openweather_url: String,
    openweather_key: String,
    iqair_url: String,
    iqair_key: String,
    timeout: Duration,
    forecast_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct CurrentWeatherResponse {
    main: MainBlock,
    #[serde(default)]
    rain: Option<RainBlock>,
    wind: WindBlock,
    clouds: CloudsBlock,
    #[serde(default)]
    weather: Vec<ConditionBlock>,
}

#[derive(Debug, Deserialize)]
struct MainBlock {
    temp: f64,
    temp_min: f64,
    temp_max: f64,
    humidity: f64,
    pressure: f64,
}

#[derive(Debug, Deserialize, Default)]
struct RainBlock {
    #[serde(rename = "1h", default)]
    one_hour: f64,
    #[serde(rename = "3h", default)]
    three_hours: f64,
}

#[derive(Debug, Deserialize)]
struct WindBlock {
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct CloudsBlock {
    all: f64,
}

#[derive(Debug, Deserialize)]
struct ConditionBlock {
    main: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    list: Vec<ForecastItem>,
}

#[derive(Debug, Deserialize)]
struct ForecastItem {
    dt: i64,
    main: ForecastMain,
    #[serde(default)]
    rain: Option<RainBlock>,
}

#[derive(Debug, Deserialize)]
struct ForecastMain {
    temp: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct AqiResponse {
    data: AqiData,
}

#[derive(Debug, Deserialize)]
struct AqiData {
    current: AqiCurrent,
}

#[derive(Debug, Deserialize)]
struct AqiCurrent {
    pollution: Pollution,
}

#[derive(Debug, Deserialize)]
struct Pollution {
    aqius: f64,
    mainus: String,
}

impl Fetcher {
    pub fn new(api: &ApiConfig) -> Result<Self> {
        if api.openweather_api_key.trim().is_empty() {
            return Err(AppError::Config(
                "OpenWeather API key cannot be empty, set OPENWEATHER_API_KEY".to_string(),
            ));
        }

        let client = Client::builder()
            .user_agent(concat!("outbreak-risk/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            openweather_url: api.openweather_base_url.trim_end_matches('/').to_string(),
            openweather_key: api.openweather_api_key.clone(),
            iqair_url: api.iqair_base_url.trim_end_matches('/').to_string(),
            iqair_key: api.iqair_api_key.clone(),
            timeout: Duration::from_secs(api.timeout_seconds),
            forecast_timeout: Duration::from_secs(api.forecast_timeout_seconds),
        })
    }

    pub async fn fetch_current_weather(&self, city: &str) -> Result<Option<LiveWeather>> {
        let url = format!("{}/weather", self.openweather_url);
        let query = [
            ("q", format!("{},IN", city)),
            ("appid", self.openweather_key.clone()),
            ("units", "metric".to_string()),
        ];

        let Some(body) = self
            .get_json::<CurrentWeatherResponse>(&url, &query, self.timeout)
            .await?
        else {
            return Ok(None);
        };

        let rain = body.rain.unwrap_or_default();
        let (weather, description) = body
            .weather
            .into_iter()
            .next()
            .map(|c| (c.main, c.description))
            .unwrap_or_default();

        Ok(Some(LiveWeather {
            city: city.to_string(),
            timestamp: Utc::now(),
            temp: body.main.temp,
            temp_min: body.main.temp_min,
            temp_max: body.main.temp_max,
            humidity: body.main.humidity,
            pressure: body.main.pressure,
            rain_1h: rain.one_hour,
            rain_3h: rain.three_hours,
            wind_speed: body.wind.speed,
            clouds: body.clouds.all,
            weather,
            description,
            aqi: None,
            main_pollutant: None,
        }))
    }

    /// Current US AQI and main pollutant near the city.
    ///
    /// Returns `Ok(None)` without a request when no key is configured or the
    /// city is not in the registry.
    pub async fn fetch_current_aqi(&self, city: &str) -> Result<Option<(f64, String)>> {
        if self.iqair_key.is_empty() {
            return Ok(None);
        }
        let Some(info) = cities::find(city) else {
            return Ok(None);
        };

        let url = format!("{}/nearest_city", self.iqair_url);
        let query = [
            ("lat", info.latitude.to_string()),
            ("lon", info.longitude.to_string()),
            ("key", self.iqair_key.clone()),
        ];

        let body = self
            .get_json::<AqiResponse>(&url, &query, self.timeout)
            .await?;

        Ok(body.map(|b| {
            let p = b.data.current.pollution;
            (p.aqius, p.mainus)
        }))
    }

    /// Up to six days of forecast, aggregated per calendar day (UTC)
    pub async fn fetch_forecast(&self, city: &str) -> Result<Option<Vec<DailyForecast>>> {
        let url = format!("{}/forecast", self.openweather_url);
        let query = [
            ("q", format!("{},IN", city)),
            ("appid", self.openweather_key.clone()),
            ("units", "metric".to_string()),
            ("cnt", "40".to_string()),
        ];

        let body = self
            .get_json::<ForecastResponse>(&url, &query, self.forecast_timeout)
            .await?;

        Ok(body.map(|b| aggregate_daily(&b.list)))
    }

    /// Current weather merged with AQI for each city; cities without data are skipped
    pub async fn fetch_all_realtime(&self, cities: &[City]) -> Vec<LiveWeather> {
        let mut records = Vec::new();

        for city in cities {
            let mut weather = match self.fetch_current_weather(city.name).await {
                Ok(Some(w)) => w,
                Ok(None) => continue,
                Err(e) => {
                    error!(city = city.name, "Weather response unusable: {}", e);
                    continue;
                }
            };

            match self.fetch_current_aqi(city.name).await {
                Ok(Some((aqi, pollutant))) => {
                    weather.aqi = Some(aqi);
                    weather.main_pollutant = Some(pollutant);
                }
                Ok(None) => {}
                Err(e) => error!(city = city.name, "AQI response unusable: {}", e),
            }

            info!(
                city = city.name,
                temp = weather.temp,
                humidity = weather.humidity,
                "Fetched real-time weather"
            );
            records.push(weather);
        }

        info!("Fetched {} real-time records", records.len());
        records
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        timeout: Duration,
    ) -> Result<Option<T>> {
        debug!("GET {}", url);

        let response = match self
            .client
            .get(url)
            .query(query)
            .timeout(timeout)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("Request to {} failed: {}", url, e);
                return Ok(None);
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!("Request to {} returned {}", url, status);
            return Ok(None);
        }

        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => {
                warn!("Failed to read body from {}: {}", url, e);
                return Ok(None);
            }
        };

        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| AppError::Parse(format!("Unexpected response from {}: {}", url, e)))
    }
}

fn aggregate_daily(items: &[ForecastItem]) -> Vec<DailyForecast> {
    #[derive(Default)]
    struct Day {
        temps: Vec<f64>,
        rains: Vec<f64>,
        humidity: Vec<f64>,
    }

    let mut days: BTreeMap<NaiveDate, Day> = BTreeMap::new();
    for item in items {
        let Some(dt) = DateTime::<Utc>::from_timestamp(item.dt, 0) else {
            continue;
        };
        let day = days.entry(dt.date_naive()).or_default();
        day.temps.push(item.main.temp);
        day.humidity.push(item.main.humidity);
        day.rains
            .push(item.rain.as_ref().map(|r| r.three_hours).unwrap_or(0.0));
    }

    days.into_iter()
        .take(MAX_FORECAST_DAYS)
        .filter(|(_, d)| !d.temps.is_empty())
        .map(|(date, d)| {
            let n = d.temps.len() as f64;
            DailyForecast {
                date,
                temp_max: d.temps.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                temp_min: d.temps.iter().copied().fold(f64::INFINITY, f64::min),
                temp_avg: d.temps.iter().sum::<f64>() / n,
                rain: d.rains.iter().sum(),
                humidity: d.humidity.iter().sum::<f64>() / d.humidity.len() as f64,
            }
        })
        .collect()
}
