use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One (city, date) climate observation
#[derive(Debug, Clone, PartialEq)]
pub struct ClimateRow {
    pub city: String,
    pub date: NaiveDate,
    pub temp_max: f64,
    pub temp_min: f64,
    pub rain: f64,
    pub humidity: Option<f64>,
    pub aqi: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AqiRecord {
    pub city: String,
    pub date: Option<NaiveDate>,
    pub aqi: f64,
}

/// Single-row inference input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub city: String,
    pub date: NaiveDate,
    pub temp_max: f64,
    pub temp_min: f64,
    pub rain: f64,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub aqi: Option<f64>,
}

impl From<&WeatherSnapshot> for ClimateRow {
    fn from(s: &WeatherSnapshot) -> Self {
        ClimateRow {
            city: s.city.clone(),
            date: s.date,
            temp_max: s.temp_max,
            temp_min: s.temp_min,
            rain: s.rain,
            humidity: s.humidity,
            aqi: s.aqi,
        }
    }
}

/// Current conditions flattened from the weather and air-quality APIs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveWeather {
    pub city: String,
    pub timestamp: DateTime<Utc>,
    pub temp: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub humidity: f64,
    pub pressure: f64,
    #[serde(default)]
    pub rain_1h: f64,
    #[serde(default)]
    pub rain_3h: f64,
    pub wind_speed: f64,
    pub clouds: f64,
    pub weather: String,
    pub description: String,
    #[serde(default)]
    pub aqi: Option<f64>,
    #[serde(default)]
    pub main_pollutant: Option<String>,
}

impl LiveWeather {
    pub fn total_rain(&self) -> f64 {
        self.rain_1h + self.rain_3h
    }

    pub fn snapshot(&self) -> WeatherSnapshot {
        WeatherSnapshot {
            city: self.city.clone(),
            date: self.timestamp.date_naive(),
            temp_max: self.temp_max,
            temp_min: self.temp_min,
            rain: self.total_rain(),
            humidity: Some(self.humidity),
            aqi: self.aqi,
        }
    }
}

/// Day-level aggregate of the 3-hourly forecast feed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyForecast {
    pub date: NaiveDate,
    pub temp_max: f64,
    pub temp_min: f64,
    pub temp_avg: f64,
    pub rain: f64,
    pub humidity: f64,
}

/// A live record as held in the online-learning buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferedRecord {
    #[serde(flatten)]
    pub weather: LiveWeather,
    pub collected_at: DateTime<Utc>,
}

impl BufferedRecord {
    pub fn to_climate_row(&self) -> ClimateRow {
        ClimateRow {
            city: self.weather.city.clone(),
            date: self.collected_at.date_naive(),
            temp_max: self.weather.temp_max,
            temp_min: self.weather.temp_min,
            rain: self.weather.total_rain(),
            humidity: Some(self.weather.humidity),
            aqi: self.weather.aqi,
        }
    }
}
