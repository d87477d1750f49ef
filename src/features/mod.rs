//! Turns raw climate rows into the model feature table.

mod frame;
pub mod window;

pub use frame::{FeatureFrame, CITY_COLUMN};

use crate::error::{AppError, Result};
use crate::models::AqiRecord;
use chrono::{Datelike, NaiveDate};
use ndarray::Array2;
use polars::prelude::*;
use std::collections::HashMap;
use std::f64::consts::PI;
use tracing::debug;

pub const ROLLING_WINDOWS: [usize; 4] = [7, 14, 30, 90];
pub const TEMP_LAGS: [usize; 5] = [1, 3, 7, 14, 30];
pub const RAIN_LAGS: [usize; 4] = [1, 3, 7, 14];

const RAINY_DAY_MM: f64 = 2.5;
const HEAVY_RAIN_MM: f64 = 50.0;
const VERY_HEAVY_RAIN_MM: f64 = 100.0;

/// Upper bounds of the AQI categories; the lower bound of the first is exclusive 0
const AQI_BINS: [f64; 6] = [50.0, 100.0, 150.0, 200.0, 300.0, 500.0];

const TEMPORAL_FEATURES: &[&str] = &[
    "year",
    "month",
    "day",
    "day_of_year",
    "week_of_year",
    "quarter",
    "month_sin",
    "month_cos",
    "season_encoded",
    "is_monsoon",
    "is_summer",
    "is_winter",
];

const DERIVED_FEATURES: &[&str] = &[
    "temp_range",
    "temp_avg",
    "temp_variability_7d",
    "temp_variability_30d",
    "is_rainy_day",
    "is_heavy_rain",
    "is_very_heavy_rain",
    "rainy_streak",
    "heat_index",
];

const AQI_FEATURES: &[&str] = &["aqi_avg", "aqi_max", "aqi_std", "aqi_category"];

/// Run every feature step in order and fill the remaining gaps.
///
/// `aqi` is the historical AQI table; pass `None` for live rows, which carry
/// their own `aqi_avg` column when the API returned a reading.
pub fn engineer_all(frame: &mut FeatureFrame, aqi: Option<&[AqiRecord]>) -> Result<()> {
    add_temporal_features(frame)?;
    add_rolling_features(frame)?;
    add_lag_features(frame)?;
    add_derived_features(frame)?;
    add_interaction_features(frame)?;
    if let Some(records) = aqi.filter(|r| !r.is_empty()) {
        join_aqi_summary(frame, records)?;
    }
    add_aqi_category(frame)?;
    frame.fill_gaps()?;

    debug!(
        rows = frame.len(),
        columns = frame.column_names().len(),
        "Feature engineering complete"
    );
    Ok(())
}

fn season(month: u32) -> f64 {
    match month {
        12 | 1 | 2 => 0.0,
        3..=5 => 1.0,
        6..=9 => 2.0,
        _ => 3.0,
    }
}

fn flag(cond: bool) -> f64 {
    if cond {
        1.0
    } else {
        0.0
    }
}

/// Trailing window of `size` rows that emits once one observation is present
fn trailing(size: usize) -> RollingOptionsFixedWindow {
    RollingOptionsFixedWindow {
        window_size: size,
        min_periods: 1,
        ..Default::default()
    }
}

fn per_city(expr: Expr) -> Expr {
    expr.over([col(CITY_COLUMN)])
}

/// Sample std over a trailing window; undefined below two observations
fn rolling_std(source: &str, size: usize) -> Expr {
    per_city(col(source).rolling_std(trailing(size))).fill_nan(lit(NULL))
}

pub fn add_temporal_features(frame: &mut FeatureFrame) -> Result<()> {
    let dates = frame.dates().to_vec();
    let from_dates = |f: fn(&NaiveDate) -> f64| -> Vec<Option<f64>> {
        dates.iter().map(|d| Some(f(d))).collect()
    };

    frame.insert("year", from_dates(|d| d.year() as f64))?;
    frame.insert("month", from_dates(|d| d.month() as f64))?;
    frame.insert("day", from_dates(|d| d.day() as f64))?;
    frame.insert("day_of_year", from_dates(|d| d.ordinal() as f64))?;
    frame.insert("week_of_year", from_dates(|d| d.iso_week().week() as f64))?;
    frame.insert("quarter", from_dates(|d| ((d.month() - 1) / 3 + 1) as f64))?;
    frame.insert("month_sin", from_dates(|d| (2.0 * PI * d.month() as f64 / 12.0).sin()))?;
    frame.insert("month_cos", from_dates(|d| (2.0 * PI * d.month() as f64 / 12.0).cos()))?;
    frame.insert("season_encoded", from_dates(|d| season(d.month())))?;
    frame.insert("is_monsoon", from_dates(|d| flag((6..=9).contains(&d.month()))))?;
    frame.insert("is_summer", from_dates(|d| flag((3..=5).contains(&d.month()))))?;
    frame.insert("is_winter", from_dates(|d| flag(matches!(d.month(), 12 | 1 | 2))))
}

pub fn add_rolling_features(frame: &mut FeatureFrame) -> Result<()> {
    let temps = frame.has_column("temp_max") && frame.has_column("temp_min");
    let rain = frame.has_column("rain");

    let mut exprs = Vec::new();
    for w in ROLLING_WINDOWS {
        if temps {
            exprs.push(
                per_city(col("temp_max").rolling_mean(trailing(w)))
                    .alias(format!("temp_max_{}d_avg", w)),
            );
            exprs.push(
                per_city(col("temp_min").rolling_mean(trailing(w)))
                    .alias(format!("temp_min_{}d_avg", w)),
            );
            exprs.push(rolling_std("temp_max", w).alias(format!("temp_{}d_std", w)));
        }
        if rain {
            exprs.push(
                per_city(col("rain").rolling_sum(trailing(w))).alias(format!("rain_{}d_sum", w)),
            );
            exprs.push(
                per_city(col("rain").rolling_mean(trailing(w))).alias(format!("rain_{}d_avg", w)),
            );
            exprs.push(
                per_city(col("rain").rolling_max(trailing(w))).alias(format!("rain_{}d_max", w)),
            );
        }
    }
    frame.with_exprs(exprs)
}

fn lag(source: &str, k: usize) -> Expr {
    per_city(col(source).shift(lit(k as i64))).alias(format!("{}_lag_{}d", source, k))
}

pub fn add_lag_features(frame: &mut FeatureFrame) -> Result<()> {
    let mut exprs = Vec::new();
    for k in TEMP_LAGS {
        for source in ["temp_max", "temp_min"] {
            if frame.has_column(source) {
                exprs.push(lag(source, k));
            }
        }
    }
    if frame.has_column("rain") {
        exprs.extend(RAIN_LAGS.iter().map(|&k| lag("rain", k)));
    }
    frame.with_exprs(exprs)
}

pub fn add_derived_features(frame: &mut FeatureFrame) -> Result<()> {
    if frame.has_column("temp_max") && frame.has_column("temp_min") {
        frame.with_exprs(vec![
            (col("temp_max") - col("temp_min")).alias("temp_range"),
            ((col("temp_max") + col("temp_min")) / lit(2.0)).alias("temp_avg"),
        ])?;
    }

    let mut exprs = Vec::new();
    // Only alongside the rolling block
    if frame.has_column("temp_7d_std") && frame.has_column("temp_avg") {
        exprs.push(rolling_std("temp_avg", 7).alias("temp_variability_7d"));
        exprs.push(rolling_std("temp_avg", 30).alias("temp_variability_30d"));
    }
    if frame.has_column("rain") {
        for (threshold, name) in [
            (RAINY_DAY_MM, "is_rainy_day"),
            (HEAVY_RAIN_MM, "is_heavy_rain"),
            (VERY_HEAVY_RAIN_MM, "is_very_heavy_rain"),
        ] {
            exprs.push(
                col("rain")
                    .gt(lit(threshold))
                    .cast(DataType::Float64)
                    .alias(name),
            );
        }
    }
    if frame.has_column("temp_avg") && frame.has_column("humidity") {
        exprs.push(
            (col("temp_avg") + lit(0.5) * (col("humidity") - lit(50.0))).alias("heat_index"),
        );
    }
    frame.with_exprs(exprs)?;

    frame.derive_per_city("is_rainy_day", "rainy_streak", window::streak)
}

pub fn add_interaction_features(frame: &mut FeatureFrame) -> Result<()> {
    let mut exprs = Vec::new();
    if frame.has_column("temp_avg") && frame.has_column("rain") {
        exprs.push((col("temp_avg") * col("rain")).alias("temp_rain_interaction"));
        exprs.push((col("temp_avg") / (col("rain") + lit(1.0))).alias("temp_rain_ratio"));
    }
    if frame.has_column("humidity") {
        if frame.has_column("temp_avg") {
            exprs.push((col("temp_avg") * col("humidity")).alias("temp_humidity_interaction"));
        }
        if frame.has_column("rain") {
            exprs.push((col("rain") * col("humidity")).alias("rain_humidity_interaction"));
        }
    }
    frame.with_exprs(exprs)
}

/// Per-city AQI mean, max and sample std from the historical table
fn aqi_summary(records: &[AqiRecord]) -> Result<HashMap<String, (f64, f64, Option<f64>)>> {
    let table = DataFrame::new(vec![
        Series::new(
            CITY_COLUMN.into(),
            records.iter().map(|r| r.city.clone()).collect::<Vec<String>>(),
        ),
        Series::new("aqi".into(), records.iter().map(|r| r.aqi).collect::<Vec<f64>>()),
    ])?;

    let stats = table
        .lazy()
        .group_by([col(CITY_COLUMN)])
        .agg([
            col("aqi").mean().alias("mean"),
            col("aqi").max().alias("max"),
            col("aqi").std(1).alias("std"),
        ])
        .collect()?;

    let cities = stats.column(CITY_COLUMN)?.str()?;
    let means = stats.column("mean")?.f64()?;
    let maxes = stats.column("max")?.f64()?;
    let stds = stats.column("std")?.f64()?;

    Ok(cities
        .into_iter()
        .zip(means)
        .zip(maxes)
        .zip(stds)
        .filter_map(|(((city, mean), max), std)| {
            Some((
                city?.to_string(),
                (mean?, max?, std.filter(|s| !s.is_nan())),
            ))
        })
        .collect())
}

/// Left-join per-city AQI mean, max and sample std.
///
/// A row that already carries `aqi_avg` keeps its own reading.
pub fn join_aqi_summary(frame: &mut FeatureFrame, records: &[AqiRecord]) -> Result<()> {
    let summary = aqi_summary(records)?;

    let existing = frame.column("aqi_avg");
    let mut avg = Vec::with_capacity(frame.len());
    let mut max = Vec::with_capacity(frame.len());
    let mut std = Vec::with_capacity(frame.len());

    for (row, city) in frame.cities().iter().enumerate() {
        let stats = summary.get(city.as_str());
        let own = existing.as_ref().and_then(|c| c[row]);
        avg.push(own.or(stats.map(|s| s.0)));
        max.push(stats.map(|s| s.1));
        std.push(stats.and_then(|s| s.2));
    }

    frame.insert("aqi_avg", avg)?;
    frame.insert("aqi_max", max)?;
    frame.insert("aqi_std", std)
}

pub fn aqi_category(aqi: f64) -> Option<f64> {
    if aqi <= 0.0 {
        return None;
    }
    AQI_BINS
        .iter()
        .position(|&upper| aqi <= upper)
        .map(|i| i as f64)
}

pub fn add_aqi_category(frame: &mut FeatureFrame) -> Result<()> {
    let Some(avg) = frame.column("aqi_avg") else {
        return Ok(());
    };
    let category = avg.iter().map(|v| v.and_then(aqi_category)).collect();
    frame.insert("aqi_category", category)
}

/// Ordered, de-duplicated model inputs that exist in `frame`
pub fn select_training_features(frame: &FeatureFrame) -> Vec<String> {
    let mut wanted: Vec<String> = ["temp_max", "temp_min", "rain", "month"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let names = frame.column_names();
    let rolling_suffixes = ["_avg", "_sum", "_std", "_max"];
    wanted.extend(
        names
            .iter()
            .filter(|n| n.contains("d_") && rolling_suffixes.iter().any(|s| n.ends_with(s)))
            .filter(|n| !n.starts_with("aqi_"))
            .cloned(),
    );
    wanted.extend(names.iter().filter(|n| n.contains("_lag_")).cloned());
    wanted.extend(DERIVED_FEATURES.iter().map(|s| s.to_string()));
    wanted.extend(TEMPORAL_FEATURES.iter().map(|s| s.to_string()));
    wanted.extend(
        names
            .iter()
            .filter(|n| n.contains("interaction") || n.contains("ratio"))
            .cloned(),
    );
    wanted.extend(AQI_FEATURES.iter().map(|s| s.to_string()));

    let mut selected = Vec::with_capacity(wanted.len());
    for name in wanted {
        if frame.has_column(&name) && !selected.contains(&name) {
            selected.push(name);
        }
    }
    selected
}

/// Row-major model input for `names`; see [`FeatureFrame::reindexed`]
pub fn feature_matrix(frame: &FeatureFrame, names: &[String]) -> Result<Array2<f64>> {
    let values: Vec<f64> = frame.reindexed(names).into_iter().flatten().collect();
    Array2::from_shape_vec((frame.len(), names.len()), values)
        .map_err(|e| AppError::InvalidData(format!("feature matrix shape: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClimateRow;

    fn rows(city: &str, days: u32) -> Vec<ClimateRow> {
        (0..days)
            .map(|i| ClimateRow {
                city: city.to_string(),
                date: NaiveDate::from_ymd_opt(2023, 6, 1).unwrap() + chrono::Days::new(i as u64),
                temp_max: 30.0 + i as f64,
                temp_min: 20.0,
                rain: i as f64,
                humidity: None,
                aqi: None,
            })
            .collect()
    }

    #[test]
    fn test_temporal_features() {
        let mut frame = FeatureFrame::from_rows(&rows("Delhi", 1)).unwrap();
        add_temporal_features(&mut frame).unwrap();
        assert_eq!(frame.value("month", 0), Some(6.0));
        assert_eq!(frame.value("quarter", 0), Some(2.0));
        assert_eq!(frame.value("season_encoded", 0), Some(2.0));
        assert_eq!(frame.value("is_monsoon", 0), Some(1.0));
        assert_eq!(frame.value("day_of_year", 0), Some(152.0));
    }

    #[test]
    fn test_engineer_all_leaves_no_gaps() {
        let mut frame = FeatureFrame::from_rows(&rows("Delhi", 5)).unwrap();
        engineer_all(&mut frame, None).unwrap();
        for name in frame.column_names() {
            assert!(frame.column(&name).unwrap().iter().all(|v| v.is_some()), "{}", name);
        }
        assert!(!frame.has_column("heat_index"));
        assert!(!frame.has_column("aqi_category"));
        // first lag row is back-filled from row 1
        assert_eq!(frame.value("temp_max_lag_1d", 0), Some(30.0));
    }

    #[test]
    fn test_rolling_windows_start_with_one_observation() {
        let mut frame = FeatureFrame::from_rows(&rows("Delhi", 4)).unwrap();
        add_rolling_features(&mut frame).unwrap();

        let mean = frame.column("temp_max_7d_avg").unwrap();
        assert_eq!(mean, &[Some(30.0), Some(30.5), Some(31.0), Some(31.5)]);
        assert_eq!(frame.value("rain_7d_sum", 3), Some(6.0));
        assert_eq!(frame.value("rain_7d_max", 2), Some(2.0));

        // sample std: 30, 31 -> sqrt(0.5)
        let std = frame.value("temp_7d_std", 1).unwrap();
        assert!((std - 0.5_f64.sqrt()).abs() < 1e-9);
        assert!(frame.value("temp_7d_std", 0).map_or(true, |v| v == 0.0));
    }

    #[test]
    fn test_lags_are_undefined_before_history() {
        let mut frame = FeatureFrame::from_rows(&rows("Delhi", 4)).unwrap();
        add_lag_features(&mut frame).unwrap();

        let lag3 = frame.column("temp_max_lag_3d").unwrap();
        assert_eq!(lag3, &[None, None, None, Some(30.0)]);
        assert!(frame.column("rain_lag_14d").unwrap().iter().all(|v| v.is_none()));
        assert!(frame.has_column("temp_min_lag_30d"));
    }

    #[test]
    fn test_rain_flags_and_streak() {
        let mut all = rows("Delhi", 5);
        all[3].rain = 60.0;
        let mut frame = FeatureFrame::from_rows(&all).unwrap();
        add_derived_features(&mut frame).unwrap();

        // rain 0, 1, 2, 60, 4
        let rainy = frame.column("is_rainy_day").unwrap();
        assert_eq!(rainy, &[Some(0.0), Some(0.0), Some(0.0), Some(1.0), Some(1.0)]);
        assert_eq!(frame.value("is_heavy_rain", 3), Some(1.0));
        assert_eq!(frame.value("rainy_streak", 4), Some(2.0));
        assert_eq!(frame.value("temp_range", 0), Some(10.0));
        assert!(!frame.has_column("temp_variability_7d"));
    }

    #[test]
    fn test_aqi_category_bins() {
        assert_eq!(aqi_category(0.0), None);
        assert_eq!(aqi_category(50.0), Some(0.0));
        assert_eq!(aqi_category(50.1), Some(1.0));
        assert_eq!(aqi_category(300.0), Some(4.0));
        assert_eq!(aqi_category(501.0), None);
    }

    #[test]
    fn test_aqi_join_per_city() {
        let mut all = rows("Delhi", 2);
        all.extend(rows("Pune", 1));
        let mut frame = FeatureFrame::from_rows(&all).unwrap();
        let aqi = vec![
            AqiRecord { city: "Delhi".into(), date: None, aqi: 100.0 },
            AqiRecord { city: "Delhi".into(), date: None, aqi: 300.0 },
        ];
        engineer_all(&mut frame, Some(&aqi)).unwrap();

        assert_eq!(frame.value("aqi_avg", 0), Some(200.0));
        assert_eq!(frame.value("aqi_max", 1), Some(300.0));
        assert_eq!(frame.value("aqi_category", 0), Some(3.0));
        // no AQI for Pune: zero after fill
        assert_eq!(frame.value("aqi_avg", 2), Some(0.0));
    }

    #[test]
    fn test_select_training_features_order() {
        let mut frame = FeatureFrame::from_rows(&rows("Delhi", 3)).unwrap();
        engineer_all(&mut frame, None).unwrap();
        let selected = select_training_features(&frame);

        assert_eq!(&selected[..4], &["temp_max", "temp_min", "rain", "month"]);
        assert!(selected.contains(&"rain_7d_sum".to_string()));
        assert!(selected.contains(&"temp_max_lag_30d".to_string()));
        assert!(selected.contains(&"temp_rain_ratio".to_string()));
        assert!(!selected.iter().any(|n| n.starts_with("aqi")));
        assert!(!selected.contains(&"heat_index".to_string()));

        let mut dedup = selected.clone();
        dedup.dedup();
        assert_eq!(dedup.len(), selected.len());
    }
}
