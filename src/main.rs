use anyhow::Context;
use chrono::{Datelike, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use outbreak_risk::analytics;
use outbreak_risk::cities::{self, CITIES};
use outbreak_risk::config::{Config, OnlineConfig};
use outbreak_risk::features::{engineer_all, FeatureFrame};
use outbreak_risk::fetcher::Fetcher;
use outbreak_risk::forecast::ForecastService;
use outbreak_risk::labels::Disease;
use outbreak_risk::models::WeatherSnapshot;
use outbreak_risk::online::OnlineLearner;
use outbreak_risk::parser;
use outbreak_risk::predict::PredictionService;
use outbreak_risk::scheduler::{LearningMode, Scheduler};
use outbreak_risk::store::{BufferStore, ModelStore};
use outbreak_risk::trainer;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "outbreak-risk")]
#[command(about = "Climate-driven disease outbreak risk for Indian cities")]
struct Cli {
    /// Path to the YAML configuration
    #[arg(long, global = true, default_value = "config/config.yaml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train models from the historical datasets
    Train {
        /// Train a single disease instead of all
        #[arg(long)]
        disease: Option<Disease>,
    },
    /// Score current or given conditions
    Predict {
        #[arg(long)]
        city: String,
        #[arg(long)]
        disease: Option<Disease>,
        /// Use live weather and air quality
        #[arg(long, conflicts_with_all = ["temp_max", "temp_min", "rain", "humidity", "aqi", "date"])]
        live: bool,
        #[arg(long, required_unless_present = "live")]
        temp_max: Option<f64>,
        #[arg(long, required_unless_present = "live")]
        temp_min: Option<f64>,
        #[arg(long, required_unless_present = "live")]
        rain: Option<f64>,
        #[arg(long)]
        humidity: Option<f64>,
        #[arg(long)]
        aqi: Option<f64>,
        /// Observation date (YYYY-MM-DD), today when omitted
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Short-range API forecast followed by monthly outlook
    Forecast {
        #[arg(long)]
        city: String,
        #[arg(long)]
        disease: Option<Disease>,
        #[arg(long, default_value_t = 6)]
        months: u32,
    },
    /// Model and risk reports
    Analytics {
        #[command(subcommand)]
        action: AnalyticsAction,
    },
    /// Collect live data and update models over time
    Learn {
        #[arg(long, value_enum, default_value_t = LearningMode::Continuous)]
        mode: LearningMode,
        /// Hours between collections
        #[arg(long)]
        collect_interval: Option<u64>,
        /// Hours between training runs
        #[arg(long)]
        train_interval: Option<u64>,
    },
}

#[derive(Subcommand)]
enum AnalyticsAction {
    Importance {
        #[arg(long)]
        disease: Disease,
    },
    Explain {
        #[arg(long)]
        city: String,
        #[arg(long)]
        disease: Disease,
    },
    Calendar {
        #[arg(long)]
        city: String,
        #[arg(long)]
        disease: Disease,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        month: Option<u32>,
    },
    Compare {
        #[arg(long)]
        disease: Disease,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Diagnostics on stderr, results on stdout
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,outbreak_risk=debug")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let output = match run(cli).await {
        Ok(value) => value,
        Err(e) => {
            error!("{:#}", e);
            json!({ "error": format!("{:#}", e) })
        }
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<Value> {
    let config = Config::load(&cli.config).map_err(|e| {
        anyhow::anyhow!(
            "Failed to load configuration: {}\n\n\
             Make sure:\n\
             1. {} exists\n\
             2. All required environment variables are set (check .env.example)\n\
             3. Create a .env file if needed",
            e,
            cli.config
        )
    })?;
    info!("Configuration loaded from {}", cli.config);

    let store = ModelStore::new(&config.paths.models_dir);

    match cli.command {
        Commands::Train { disease } => train(&config, &store, disease),
        Commands::Predict {
            city,
            disease,
            live,
            temp_max,
            temp_min,
            rain,
            humidity,
            aqi,
            date,
        } => {
            let predictor = PredictionService::from_store(&store);
            let city = resolve_city(&city)?;
            if live {
                let fetcher = Fetcher::new(&config.api)?;
                let Some(live) = predictor.predict_live(&fetcher, city).await? else {
                    anyhow::bail!("No live weather data available for {}", city);
                };
                let risks = filter_risks(live.risks.clone(), disease)?;
                return Ok(json!({
                    "city": live.city,
                    "timestamp": live.timestamp,
                    "predictions": risks,
                    "weather": live.weather,
                }));
            }

            let snapshot = WeatherSnapshot {
                city: city.to_string(),
                date: date.unwrap_or_else(|| Utc::now().date_naive()),
                temp_max: temp_max.context("--temp-max is required")?,
                temp_min: temp_min.context("--temp-min is required")?,
                rain: rain.context("--rain is required")?,
                humidity,
                aqi,
            };
            let risks = match disease {
                Some(d) => BTreeMap::from([(d, predictor.predict_risk(&snapshot, d)?)]),
                None => predictor.predict_all(&snapshot),
            };
            Ok(json!({
                "city": snapshot.city,
                "date": snapshot.date,
                "predictions": risks,
            }))
        }
        Commands::Forecast {
            city,
            disease,
            months,
        } => {
            let predictor = PredictionService::from_store(&store);
            let fetcher = Fetcher::new(&config.api)?;
            let service = ForecastService::new(&predictor, &fetcher);
            let city = resolve_city(&city)?;
            match disease {
                Some(d) => Ok(serde_json::to_value(service.generate(city, d, months).await?)?),
                None => Ok(serde_json::to_value(service.generate_all(city, months).await?)?),
            }
        }
        Commands::Analytics { action } => {
            let predictor = PredictionService::from_store(&store);
            analytics_command(&config, &predictor, action).await
        }
        Commands::Learn {
            mode,
            collect_interval,
            train_interval,
        } => {
            let mut online = config.online.clone();
            if let Some(h) = collect_interval {
                online.collect_interval_hours = h.max(1);
            }
            if let Some(h) = train_interval {
                online.train_interval_hours = h.max(1);
            }
            learn(&config, store, mode, &online).await
        }
    }
}

fn resolve_city(name: &str) -> anyhow::Result<&'static str> {
    cities::find(name)
        .map(|c| c.name)
        .ok_or_else(|| anyhow::anyhow!("Unknown city '{}'", name))
}

fn filter_risks(
    risks: BTreeMap<Disease, u8>,
    disease: Option<Disease>,
) -> anyhow::Result<BTreeMap<Disease, u8>> {
    match disease {
        None => Ok(risks),
        Some(d) => {
            let risk = risks
                .get(&d)
                .copied()
                .ok_or_else(|| anyhow::anyhow!("Model not found for {}", d))?;
            Ok(BTreeMap::from([(d, risk)]))
        }
    }
}

fn train(config: &Config, store: &ModelStore, disease: Option<Disease>) -> anyhow::Result<Value> {
    info!("Loading historical datasets from {}", config.paths.data_dir.display());
    let rows = parser::load_city_climate(&config.paths.data_dir, CITIES)?;
    if rows.is_empty() {
        anyhow::bail!(
            "No climate records found in {}",
            config.paths.data_dir.display()
        );
    }
    let aqi = parser::load_aqi(&config.paths.data_dir)?;

    let mut frame = FeatureFrame::from_rows(&rows)?;
    engineer_all(&mut frame, Some(&aqi))?;
    info!(
        rows = frame.len(),
        columns = frame.column_names().len(),
        "Training table ready"
    );

    let diseases: Vec<Disease> = match disease {
        Some(d) => vec![d],
        None => Disease::ALL.to_vec(),
    };
    let metrics = trainer::train_all(&frame, &diseases, &config.training, store)?;
    Ok(serde_json::to_value(metrics)?)
}

async fn analytics_command(
    config: &Config,
    predictor: &PredictionService,
    action: AnalyticsAction,
) -> anyhow::Result<Value> {
    let value = match action {
        AnalyticsAction::Importance { disease } => {
            serde_json::to_value(analytics::feature_importance(predictor, disease)?)?
        }
        AnalyticsAction::Explain { city, disease } => {
            let fetcher = Fetcher::new(&config.api)?;
            let city = resolve_city(&city)?;
            match analytics::explain(predictor, &fetcher, city, disease).await? {
                Some(explanation) => serde_json::to_value(explanation)?,
                None => anyhow::bail!("No data available"),
            }
        }
        AnalyticsAction::Calendar {
            city,
            disease,
            year,
            month,
        } => {
            let today = Utc::now().date_naive();
            let calendar = analytics::risk_calendar(
                predictor,
                &city,
                disease,
                year.unwrap_or(today.year()),
                month.unwrap_or(today.month()),
            )?;
            serde_json::to_value(calendar)?
        }
        AnalyticsAction::Compare { disease } => {
            let fetcher = Fetcher::new(&config.api)?;
            serde_json::to_value(analytics::compare_cities(predictor, &fetcher, disease).await?)?
        }
    };
    Ok(value)
}

async fn learn(
    config: &Config,
    store: ModelStore,
    mode: LearningMode,
    online: &OnlineConfig,
) -> anyhow::Result<Value> {
    let fetcher = Fetcher::new(&config.api)?;
    let buffer = BufferStore::new(&config.paths.buffer_dir);
    let learner = OnlineLearner::new(buffer, store, online.min_buffer_records);

    // Set up shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Spawn signal handler
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let mut scheduler = Scheduler::new(learner, fetcher, mode, online, shutdown_rx);
    if let Err(e) = scheduler.run().await {
        error!("Scheduler error: {}", e);
    }

    info!("Online learning shutting down");
    Ok(json!({ "status": "stopped", "mode": format!("{:?}", mode).to_lowercase() }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}
