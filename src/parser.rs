use crate::cities::City;
use crate::error::{AppError, Result};
use crate::models::{AqiRecord, ClimateRow};
use chrono::NaiveDate;
use std::path::Path;
use tracing::{debug, info, warn};

const DATE_FORMATS: &[&str] = &["%d-%m-%Y", "%Y-%m-%d", "%d/%m/%Y"];

#[derive(Debug, Clone, Default)]
pub struct ParseStats {
    pub total_rows: usize,
    pub parsed_successfully: usize,
    pub dropped_rows: usize,
}

impl ParseStats {
    pub fn drop_rate(&self) -> f64 {
        if self.total_rows > 0 {
            self.dropped_rows as f64 / self.total_rows as f64
        } else {
            0.0
        }
    }
}

/// Header positions for a climate CSV
struct ClimateColumns {
    date: usize,
    rain: usize,
    temp_max: usize,
    temp_min: usize,
    humidity: Option<usize>,
}

pub struct ClimateParser;

impl ClimateParser {
    /// Parse a `{code}-temp-rains.csv` file.
    ///
    /// Rows with an unparseable date, rain, max or min temperature are
    /// dropped and counted; they never fail the load. A missing mandatory
    /// column does.
    pub fn parse_city_climate(content: &str, city: &str) -> Result<(Vec<ClimateRow>, ParseStats)> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());

        let headers = reader.headers()?.clone();
        let columns = ClimateColumns {
            date: require_column(&headers, "date")?,
            rain: require_column(&headers, "rain")?,
            temp_max: require_column(&headers, "temp max")?,
            temp_min: require_column(&headers, "temp min")?,
            humidity: find_column(&headers, "humidity"),
        };

        let mut rows = Vec::new();
        let mut stats = ParseStats::default();

        for (line_num, record) in reader.records().enumerate() {
            stats.total_rows += 1;

            let parsed = record
                .map_err(AppError::from)
                .and_then(|r| Self::parse_climate_record(&r, &columns, city));

            match parsed {
                Ok(row) => {
                    rows.push(row);
                    stats.parsed_successfully += 1;
                }
                Err(e) => {
                    stats.dropped_rows += 1;
                    debug!(city, line = line_num + 2, error = %e, "Dropping malformed climate row");
                }
            }
        }

        Ok((rows, stats))
    }

    fn parse_climate_record(
        record: &csv::StringRecord,
        columns: &ClimateColumns,
        city: &str,
    ) -> Result<ClimateRow> {
        let date = parse_date(field(record, columns.date)?)?;
        let rain = parse_number(field(record, columns.rain)?)?;
        let temp_max = parse_number(field(record, columns.temp_max)?)?;
        let temp_min = parse_number(field(record, columns.temp_min)?)?;
        let humidity = columns
            .humidity
            .and_then(|idx| record.get(idx))
            .and_then(|s| parse_number(s).ok());

        Ok(ClimateRow {
            city: city.to_string(),
            date,
            temp_max,
            temp_min,
            rain,
            humidity,
            aqi: None,
        })
    }

    /// Parse a `{City}_AQI_Dataset.csv` file. `AQI` is mandatory, `Date` optional.
    pub fn parse_aqi(content: &str, city: &str) -> Result<(Vec<AqiRecord>, ParseStats)> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());

        let headers = reader.headers()?.clone();
        let aqi_idx = require_column(&headers, "aqi")?;
        let date_idx = find_column(&headers, "date");

        let mut records = Vec::new();
        let mut stats = ParseStats::default();

        for record in reader.records() {
            stats.total_rows += 1;

            let parsed = record.map_err(AppError::from).and_then(|r| {
                let aqi = parse_number(field(&r, aqi_idx)?)?;
                let date = date_idx
                    .and_then(|idx| r.get(idx))
                    .and_then(|s| parse_date(s).ok());
                Ok(AqiRecord {
                    city: city.to_string(),
                    date,
                    aqi,
                })
            });

            match parsed {
                Ok(rec) => {
                    records.push(rec);
                    stats.parsed_successfully += 1;
                }
                Err(_) => stats.dropped_rows += 1,
            }
        }

        Ok((records, stats))
    }
}

/// Load every registered city's historical climate file from `data_dir`.
///
/// Missing files are skipped with a warning. The result is sorted by
/// city (registry order) and then ascending by date.
pub fn load_city_climate(data_dir: &Path, cities: &[City]) -> Result<Vec<ClimateRow>> {
    let mut all_rows = Vec::new();

    for city in cities {
        let path = data_dir.join(format!("{}-temp-rains.csv", city.code));
        if !path.exists() {
            warn!(city = city.name, path = %path.display(), "Climate file not found");
            continue;
        }

        let content = std::fs::read_to_string(&path)?;
        let (mut rows, stats) = ClimateParser::parse_city_climate(&content, city.name)?;
        rows.sort_by_key(|r| r.date);

        info!(
            city = city.name,
            records = rows.len(),
            dropped = stats.dropped_rows,
            "Loaded climate records ({:.1}% dropped)",
            stats.drop_rate() * 100.0
        );
        all_rows.extend(rows);
    }

    info!(total = all_rows.len(), "Climate records loaded");
    Ok(all_rows)
}

/// Load every `*_AQI_Dataset.csv` in `data_dir`; the city is the filename prefix.
pub fn load_aqi(data_dir: &Path) -> Result<Vec<AqiRecord>> {
    let pattern = data_dir.join("*_AQI_Dataset.csv");
    let pattern = pattern.to_string_lossy();
    let paths = glob::glob(&pattern)
        .map_err(|e| AppError::Config(format!("Invalid AQI file pattern: {}", e)))?;

    let mut all_records = Vec::new();
    for entry in paths {
        let path = match entry {
            Ok(p) => p,
            Err(e) => {
                warn!("Skipping unreadable AQI path: {}", e);
                continue;
            }
        };

        let Some(city) = city_from_aqi_filename(&path) else {
            continue;
        };

        let content = std::fs::read_to_string(&path)?;
        let (records, stats) = ClimateParser::parse_aqi(&content, &city)?;
        info!(
            city = %city,
            records = records.len(),
            dropped = stats.dropped_rows,
            "Loaded AQI records"
        );
        all_records.extend(records);
    }

    Ok(all_records)
}

fn city_from_aqi_filename(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let city = name.strip_suffix("_AQI_Dataset.csv")?;
    if city.is_empty() {
        None
    } else {
        Some(city.to_string())
    }
}

fn normalize_header(h: &str) -> String {
    h.trim().to_lowercase().replace(['_', '-'], " ")
}

fn find_column(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| normalize_header(h) == name)
}

fn require_column(headers: &csv::StringRecord, name: &str) -> Result<usize> {
    find_column(headers, name)
        .ok_or_else(|| AppError::Parse(format!("Missing required column '{}'", name)))
}

fn field(record: &csv::StringRecord, idx: usize) -> Result<&str> {
    record
        .get(idx)
        .ok_or_else(|| AppError::Parse(format!("Row has no field at position {}", idx)))
}

fn parse_number(s: &str) -> Result<f64> {
    let value = s
        .trim()
        .parse::<f64>()
        .map_err(|e| AppError::Parse(format!("Failed to parse number '{}': {}", s, e)))?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(AppError::Parse(format!("Non-finite number '{}'", s)))
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .ok_or_else(|| AppError::Parse(format!("Failed to parse date '{}'", s)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(parse_date("15-01-2024").unwrap(), expected);
        assert_eq!(parse_date("2024-01-15").unwrap(), expected);
        assert!(parse_date("31-02-2024").is_err());
        assert!(parse_date("").is_err());
    }

    #[test]
    fn test_parse_number_rejects_garbage() {
        assert_eq!(parse_number(" 12.5 ").unwrap(), 12.5);
        assert!(parse_number("NA").is_err());
        assert!(parse_number("NaN").is_err());
    }

    #[test]
    fn test_parse_city_climate_drops_malformed_rows() {
        let content = "Date,Rain,Temp Max,Temp Min\n\
                       01-06-2020,12.5,34.1,26.0\n\
                       02-06-2020,,33.0,25.5\n\
                       not-a-date,1.0,30.0,20.0\n\
                       04-06-2020,0.0,35.2,27.1\n";

        let (rows, stats) = ClimateParser::parse_city_climate(content, "Delhi").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(stats.total_rows, 4);
        assert_eq!(stats.dropped_rows, 2);
        assert_eq!(rows[0].city, "Delhi");
        assert_eq!(rows[0].rain, 12.5);
        assert_eq!(rows[1].temp_max, 35.2);
        assert!(rows[0].humidity.is_none());
    }

    #[test]
    fn test_parse_city_climate_missing_column_fails() {
        let content = "Date,Rain,Temp Max\n01-06-2020,12.5,34.1\n";
        let err = ClimateParser::parse_city_climate(content, "Delhi").unwrap_err();
        assert!(err.to_string().contains("temp min"));
    }

    #[test]
    fn test_parse_aqi() {
        let content = "Date,AQI\n2020-01-01,250\n2020-01-02,bad\n,180\n";
        let (records, stats) = ClimateParser::parse_aqi(content, "Delhi").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(stats.dropped_rows, 1);
        assert_eq!(records[1].date, None);
        assert_eq!(records[1].aqi, 180.0);
    }

    #[test]
    fn test_city_from_aqi_filename() {
        assert_eq!(
            city_from_aqi_filename(Path::new("/data/Delhi_AQI_Dataset.csv")),
            Some("Delhi".to_string())
        );
        assert_eq!(city_from_aqi_filename(Path::new("/data/_AQI_Dataset.csv")), None);
        assert_eq!(city_from_aqi_filename(Path::new("/data/delhi.csv")), None);
    }
}
