use chrono::NaiveDate;
use outbreak_risk::cities::CITIES;
use outbreak_risk::parser::{load_aqi, load_city_climate};
use std::fs;
use tempfile::TempDir;

fn write(dir: &TempDir, name: &str, content: &str) {
    fs::write(dir.path().join(name), content).expect("Failed to write fixture");
}

/// Files are read per registered city, sorted by date, and missing cities are skipped
#[test]
fn test_load_city_climate_from_directory() {
    let dir = TempDir::new().unwrap();

    write(
        &dir,
        "delhi-temp-rains.csv",
        "Date,Rain,Temp Max,Temp Min\n\
         03-06-2020,0.0,41.0,29.0\n\
         01-06-2020,1.5,40.2,28.1\n\
         02-06-2020,bad,39.0,27.5\n",
    );
    write(
        &dir,
        "mumbai-temp-rains.csv",
        "date,rain,temp_max,temp_min,humidity\n\
         2020-07-01,85.0,30.1,25.4,88\n",
    );

    let rows = load_city_climate(dir.path(), CITIES).expect("Load failed");
    assert_eq!(rows.len(), 3);

    assert_eq!(rows[0].city, "Delhi");
    assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2020, 6, 1).unwrap());
    assert_eq!(rows[1].date, NaiveDate::from_ymd_opt(2020, 6, 3).unwrap());

    assert_eq!(rows[2].city, "Mumbai");
    assert_eq!(rows[2].rain, 85.0);
    assert_eq!(rows[2].humidity, Some(88.0));
}

#[test]
fn test_load_city_climate_empty_directory() {
    let dir = TempDir::new().unwrap();
    let rows = load_city_climate(dir.path(), CITIES).unwrap();
    assert!(rows.is_empty());
}

/// A file missing a mandatory column fails the whole load
#[test]
fn test_load_city_climate_missing_column_errors() {
    let dir = TempDir::new().unwrap();
    write(&dir, "pune-temp-rains.csv", "Date,Rain\n01-06-2020,1.0\n");
    assert!(load_city_climate(dir.path(), CITIES).is_err());
}

#[test]
fn test_load_aqi_uses_filename_city() {
    let dir = TempDir::new().unwrap();
    write(&dir, "Delhi_AQI_Dataset.csv", "Date,AQI\n2020-01-01,310\n2020-01-02,290\n");
    write(&dir, "Chennai_AQI_Dataset.csv", "AQI\n75\nNA\n");
    write(&dir, "notes.csv", "AQI\n999\n");

    let mut records = load_aqi(dir.path()).expect("Load failed");
    records.sort_by(|a, b| a.city.cmp(&b.city));

    assert_eq!(records.len(), 3);
    assert_eq!(records[0].city, "Chennai");
    assert_eq!(records[0].aqi, 75.0);
    assert!(records[0].date.is_none());
    assert!(records[1..].iter().all(|r| r.city == "Delhi"));
    assert_eq!(records[1].date, NaiveDate::from_ymd_opt(2020, 1, 1));
}
