use outbreak_risk::cities::CITIES;
use outbreak_risk::config::ApiConfig;
use outbreak_risk::error::AppError;
use outbreak_risk::fetcher::Fetcher;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn api_config(base: &str, iqair_key: &str) -> ApiConfig {
    ApiConfig {
        openweather_base_url: base.to_string(),
        openweather_api_key: "test-key".to_string(),
        iqair_base_url: base.to_string(),
        iqair_api_key: iqair_key.to_string(),
        timeout_seconds: 2,
        forecast_timeout_seconds: 2,
    }
}

const WEATHER_BODY: &str = r#"{
    "main": {"temp": 31.0, "temp_min": 28.5, "temp_max": 33.2, "humidity": 74, "pressure": 1006},
    "rain": {"1h": 2.5},
    "wind": {"speed": 3.1},
    "clouds": {"all": 40},
    "weather": [{"main": "Rain", "description": "light rain"}]
}"#;

const AQI_BODY: &str = r#"{
    "status": "success",
    "data": {"current": {"pollution": {"aqius": 182, "mainus": "p2"}}}
}"#;

/// Current weather is flattened and both rain fields are carried
#[tokio::test]
async fn test_fetch_current_weather() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/weather"))
        .and(query_param("q", "Delhi,IN"))
        .and(query_param("units", "metric"))
        .respond_with(ResponseTemplate::new(200).set_body_string(WEATHER_BODY))
        .mount(&mock_server)
        .await;

    let fetcher = Fetcher::new(&api_config(&mock_server.uri(), "")).expect("Failed to create fetcher");
    let weather = fetcher
        .fetch_current_weather("Delhi")
        .await
        .expect("Request failed")
        .expect("Expected weather");

    assert_eq!(weather.city, "Delhi");
    assert_eq!(weather.temp_max, 33.2);
    assert_eq!(weather.humidity, 74.0);
    assert_eq!(weather.rain_1h, 2.5);
    assert_eq!(weather.rain_3h, 0.0);
    assert_eq!(weather.weather, "Rain");
    assert_eq!(weather.description, "light rain");
    assert!(weather.aqi.is_none());
}

/// Non-success statuses are an absent result, not an error
#[tokio::test]
async fn test_fetch_current_weather_non_success_is_none() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/weather"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let fetcher = Fetcher::new(&api_config(&mock_server.uri(), "")).unwrap();
    let result = fetcher.fetch_current_weather("Delhi").await.unwrap();
    assert!(result.is_none());
}

/// A 200 with a body that does not decode is an error
#[tokio::test]
async fn test_fetch_current_weather_bad_body_is_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/weather"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"cod\": 200}"))
        .mount(&mock_server)
        .await;

    let fetcher = Fetcher::new(&api_config(&mock_server.uri(), "")).unwrap();
    match fetcher.fetch_current_weather("Delhi").await {
        Err(AppError::Parse(msg)) => assert!(msg.contains("Unexpected response")),
        other => panic!("Expected Parse error, got: {:?}", other),
    }
}

/// Unreachable host is an absent result
#[tokio::test]
async fn test_fetch_current_weather_unreachable_is_none() {
    let fetcher = Fetcher::new(&api_config("http://127.0.0.1:9", "")).unwrap();
    let result = fetcher.fetch_current_weather("Delhi").await.unwrap();
    assert!(result.is_none());
}

/// Network commands need a weather key; config loading does not
#[test]
fn test_fetcher_requires_openweather_key() {
    let mut api = api_config("http://127.0.0.1:9", "");
    api.openweather_api_key = "  ".to_string();
    let Err(err) = Fetcher::new(&api) else {
        panic!("blank key accepted");
    };
    assert!(matches!(err, AppError::Config(_)));
    assert!(err.to_string().contains("OPENWEATHER_API_KEY"));
}

/// Without a key no request is made
#[tokio::test]
async fn test_fetch_aqi_without_key_skips_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/nearest_city"))
        .respond_with(ResponseTemplate::new(200).set_body_string(AQI_BODY))
        .expect(0)
        .mount(&mock_server)
        .await;

    let fetcher = Fetcher::new(&api_config(&mock_server.uri(), "")).unwrap();
    assert!(fetcher.fetch_current_aqi("Delhi").await.unwrap().is_none());
}

#[tokio::test]
async fn test_fetch_aqi_with_key() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/nearest_city"))
        .and(query_param("key", "air-key"))
        .respond_with(ResponseTemplate::new(200).set_body_string(AQI_BODY))
        .mount(&mock_server)
        .await;

    let fetcher = Fetcher::new(&api_config(&mock_server.uri(), "air-key")).unwrap();
    let (aqi, pollutant) = fetcher.fetch_current_aqi("Delhi").await.unwrap().unwrap();
    assert_eq!(aqi, 182.0);
    assert_eq!(pollutant, "p2");

    // Cities outside the registry are never looked up
    assert!(fetcher.fetch_current_aqi("Atlantis").await.unwrap().is_none());
}

/// 3-hourly items are grouped per UTC day
#[tokio::test]
async fn test_fetch_forecast_aggregates_days() {
    let mock_server = MockServer::start().await;

    // 2024-06-01 00:00, 2024-06-01 03:00 and 2024-06-02 00:00 UTC
    let body = r#"{
        "list": [
            {"dt": 1717200000, "main": {"temp": 30.0, "humidity": 60}, "rain": {"3h": 2.0}},
            {"dt": 1717210800, "main": {"temp": 34.0, "humidity": 70}},
            {"dt": 1717286400, "main": {"temp": 28.0, "humidity": 80}, "rain": {"3h": 5.5}}
        ]
    }"#;

    Mock::given(method("GET"))
        .and(path("/forecast"))
        .and(query_param("cnt", "40"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&mock_server)
        .await;

    let fetcher = Fetcher::new(&api_config(&mock_server.uri(), "")).unwrap();
    let days = fetcher.fetch_forecast("Mumbai").await.unwrap().unwrap();

    assert_eq!(days.len(), 2);
    assert_eq!(days[0].temp_max, 34.0);
    assert_eq!(days[0].temp_min, 30.0);
    assert_eq!(days[0].rain, 2.0);
    assert_eq!(days[0].humidity, 65.0);
    assert_eq!(days[1].temp_avg, 28.0);
    assert_eq!(days[1].rain, 5.5);
}

/// Cities whose weather call fails are skipped; AQI is merged in when present
#[tokio::test]
async fn test_fetch_all_realtime_skips_failures() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/weather"))
        .and(query_param("q", "Delhi,IN"))
        .respond_with(ResponseTemplate::new(200).set_body_string(WEATHER_BODY))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/weather"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/nearest_city"))
        .respond_with(ResponseTemplate::new(200).set_body_string(AQI_BODY))
        .mount(&mock_server)
        .await;

    let fetcher = Fetcher::new(&api_config(&mock_server.uri(), "air-key")).unwrap();
    let records = fetcher.fetch_all_realtime(&CITIES[..3]).await;

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].city, "Delhi");
    assert_eq!(records[0].aqi, Some(182.0));
    assert_eq!(records[0].main_pollutant.as_deref(), Some("p2"));
}
