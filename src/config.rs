use crate::error::{AppError, Result};
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    pub api: ApiConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub online: OnlineConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,
    #[serde(default = "default_buffer_dir")]
    pub buffer_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            models_dir: default_models_dir(),
            buffer_dir: default_buffer_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_buffer_dir() -> PathBuf {
    PathBuf::from("online_learning_data")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_openweather_url")]
    pub openweather_base_url: String,
    /// Only needed by commands that call the weather API
    #[serde(default)]
    pub openweather_api_key: String,
    #[serde(default = "default_iqair_url")]
    pub iqair_base_url: String,
    /// Empty disables the air-quality lookup
    #[serde(default)]
    pub iqair_api_key: String,
    #[serde(default = "default_timeout", deserialize_with = "deserialize_u64")]
    pub timeout_seconds: u64,
    #[serde(
        default = "default_forecast_timeout",
        deserialize_with = "deserialize_u64"
    )]
    pub forecast_timeout_seconds: u64,
}

fn default_openweather_url() -> String {
    "https://api.openweathermap.org/data/2.5".to_string()
}

fn default_iqair_url() -> String {
    "http://api.airvisual.com/v2".to_string()
}

fn default_timeout() -> u64 {
    5
}

fn default_forecast_timeout() -> u64 {
    10
}

/// Custom deserializer that handles integers given as numbers or strings
///
/// Accepts:
/// - `timeout_seconds: 5` (number)
/// - `timeout_seconds: "5"` (string that parses to number)
/// - `timeout_seconds: ${API_TIMEOUT}` (env var substituted to either)
fn deserialize_u64<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IntValue {
        Number(u64),
        String(String),
    }

    match IntValue::deserialize(deserializer)? {
        IntValue::Number(n) => Ok(n),
        IntValue::String(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| serde::de::Error::custom(format!("Invalid integer: '{}'", s))),
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrainingConfig {
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_n_trees")]
    pub n_trees: usize,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_min_samples_split")]
    pub min_samples_split: usize,
    #[serde(default = "default_logistic_iterations")]
    pub logistic_max_iterations: u64,
    #[serde(default = "default_importance_sample")]
    pub importance_sample: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            test_fraction: default_test_fraction(),
            seed: default_seed(),
            n_trees: default_n_trees(),
            max_depth: default_max_depth(),
            min_samples_split: default_min_samples_split(),
            logistic_max_iterations: default_logistic_iterations(),
            importance_sample: default_importance_sample(),
        }
    }
}

fn default_test_fraction() -> f64 {
    0.2
}

fn default_seed() -> u64 {
    42
}

fn default_n_trees() -> usize {
    50
}

fn default_max_depth() -> usize {
    12
}

fn default_min_samples_split() -> usize {
    10
}

fn default_logistic_iterations() -> u64 {
    150
}

fn default_importance_sample() -> usize {
    2000
}

#[derive(Debug, Deserialize, Clone)]
pub struct OnlineConfig {
    #[serde(default = "default_collect_interval")]
    pub collect_interval_hours: u64,
    #[serde(default = "default_train_interval")]
    pub train_interval_hours: u64,
    #[serde(default = "default_min_buffer_records")]
    pub min_buffer_records: usize,
}

impl Default for OnlineConfig {
    fn default() -> Self {
        Self {
            collect_interval_hours: default_collect_interval(),
            train_interval_hours: default_train_interval(),
            min_buffer_records: default_min_buffer_records(),
        }
    }
}

fn default_collect_interval() -> u64 {
    1
}

fn default_train_interval() -> u64 {
    24
}

fn default_min_buffer_records() -> usize {
    10
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| AppError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        // Substitute environment variables
        let expanded = expand_env_vars(content)?;

        let config: Config = serde_yaml::from_str(&expanded)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    ///
    /// Checks for:
    /// - Non-empty API key for the weather service
    /// - Valid URL formats
    /// - Positive timeouts and intervals
    /// - A test fraction strictly between 0 and 1
    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("openweather_base_url", &self.api.openweather_base_url),
            ("iqair_base_url", &self.api.iqair_base_url),
        ] {
            if let Err(e) = url::Url::parse(value) {
                return Err(AppError::Config(format!(
                    "Invalid {} '{}': {}",
                    name, value, e
                )));
            }
        }

        if self.api.timeout_seconds == 0 || self.api.forecast_timeout_seconds == 0 {
            return Err(AppError::Config(
                "API timeouts must be greater than 0".to_string(),
            ));
        }

        if !(self.training.test_fraction > 0.0 && self.training.test_fraction < 1.0) {
            return Err(AppError::Config(format!(
                "training.test_fraction must be between 0 and 1, got {}",
                self.training.test_fraction
            )));
        }

        if self.training.n_trees == 0 {
            return Err(AppError::Config(
                "training.n_trees must be at least 1".to_string(),
            ));
        }

        if self.online.collect_interval_hours == 0 || self.online.train_interval_hours == 0 {
            return Err(AppError::Config(
                "Online learning intervals must be greater than 0".to_string(),
            ));
        }

        if self.online.train_interval_hours < self.online.collect_interval_hours {
            tracing::warn!(
                "Training interval ({}h) is shorter than collection interval ({}h), most training runs will find an empty buffer",
                self.online.train_interval_hours,
                self.online.collect_interval_hours
            );
        }

        Ok(())
    }
}

/// Replace `${VAR}` and `${VAR:-default}` placeholders with environment values.
///
/// Full-line `#` comments are copied through untouched.
fn expand_env_vars(content: &str) -> Result<String> {
    let re = regex_lite::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
        .map_err(|e| AppError::Config(format!("Invalid placeholder pattern: {}", e)))?;

    let mut missing_vars = Vec::new();
    let mut lines = Vec::new();

    for line in content.lines() {
        if line.trim_start().starts_with('#') {
            lines.push(line.to_string());
            continue;
        }

        let mut expanded = line.to_string();
        for cap in re.captures_iter(line) {
            let var_name = &cap[1];
            match (std::env::var(var_name), cap.get(2)) {
                (Ok(value), _) => {
                    expanded = expanded.replace(&cap[0], &value);
                }
                (Err(_), Some(default)) => {
                    expanded = expanded.replace(&cap[0], default.as_str());
                }
                (Err(_), None) => {
                    missing_vars.push(var_name.to_string());
                }
            }
        }
        lines.push(expanded);
    }
    let result = lines.join("\n");

    if !missing_vars.is_empty() {
        return Err(AppError::Config(format!(
            "Missing required environment variable{}: {}\n\n\
             To fix this:\n\
             1. Create a .env file in the project root (copy .env.example)\n\
             2. Set the missing variable{}: export {}=<value>\n\
             3. Or give it a default in the config: ${{{}:-value}}",
            if missing_vars.len() > 1 { "s" } else { "" },
            missing_vars.join(", "),
            if missing_vars.len() > 1 { "s" } else { "" },
            missing_vars[0],
            missing_vars[0]
        )));
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
api:
  openweather_api_key: test-key
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.api.timeout_seconds, 5);
        assert_eq!(config.api.forecast_timeout_seconds, 10);
        assert!(config.api.iqair_api_key.is_empty());
        assert_eq!(config.paths.models_dir, PathBuf::from("models"));
        assert_eq!(config.training.seed, 42);
        assert_eq!(config.online.min_buffer_records, 10);
    }

    #[test]
    fn test_timeout_deserialize_from_string() {
        let yaml = r#"
openweather_api_key: k
timeout_seconds: "7"
"#;
        let api: ApiConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(api.timeout_seconds, 7);
    }

    #[test]
    fn test_timeout_deserialize_invalid_string() {
        let yaml = r#"
openweather_api_key: k
timeout_seconds: "soon"
"#;
        let result: std::result::Result<ApiConfig, _> = serde_yaml::from_str(yaml);
        assert!(result.is_err());
        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("Invalid integer") || err_msg.contains("soon"));
    }

    #[test]
    fn test_env_default_used_when_unset() {
        let expanded =
            expand_env_vars("key: ${OUTBREAK_RISK_SURELY_UNSET_VAR:-fallback}").unwrap();
        assert_eq!(expanded, "key: fallback");
    }

    #[test]
    fn test_missing_env_var_is_reported() {
        let err = expand_env_vars("key: ${OUTBREAK_RISK_SURELY_UNSET_VAR}").unwrap_err();
        assert!(err
            .to_string()
            .contains("OUTBREAK_RISK_SURELY_UNSET_VAR"));
    }

    #[test]
    fn test_rejects_bad_test_fraction() {
        let yaml = r#"
api:
  openweather_api_key: k
training:
  test_fraction: 1.5
"#;
        let err = Config::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("test_fraction"));
    }

    #[test]
    fn test_rejects_invalid_url() {
        let yaml = r#"
api:
  openweather_api_key: k
  openweather_base_url: "not a url"
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }

    /// Offline commands load without any API key
    #[test]
    fn test_empty_api_key_is_accepted() {
        let yaml = r#"
api:
  openweather_api_key: ""
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert!(config.api.openweather_api_key.is_empty());

        let config = Config::from_yaml("api: {}\n").unwrap();
        assert!(config.api.openweather_api_key.is_empty());
    }

    #[test]
    fn test_comment_placeholders_are_not_expanded() {
        let yaml = "# export ${OUTBREAK_RISK_SURELY_UNSET_VAR} first\n  # ${ALSO_UNSET}\nkey: v\n";
        let expanded = expand_env_vars(yaml).unwrap();
        assert!(expanded.contains("${OUTBREAK_RISK_SURELY_UNSET_VAR}"));
        assert!(expanded.ends_with("key: v"));
    }

    #[test]
    fn test_shipped_config_loads() {
        let config = Config::from_yaml(include_str!("../config/config.yaml")).unwrap();
        assert_eq!(config.training.n_trees, 50);
        assert_eq!(config.training.max_depth, 12);
        assert_eq!(config.online.train_interval_hours, 24);
        assert_eq!(config.online.min_buffer_records, 10);
        assert!(config.api.openweather_base_url.starts_with("https://"));
    }
}
