use crate::config::OnlineConfig;
use crate::error::Result;
use crate::fetcher::Fetcher;
use crate::online::{OnlineLearner, TrainingRun};
use tokio::sync::watch;
use tokio::time::{interval, Duration, Interval};
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LearningMode {
    /// Only collect real-time data into the buffer
    Collect,
    /// Only run incremental training on what is buffered
    Train,
    /// Collect and train on their own intervals
    Continuous,
}

pub struct Scheduler {
    learner: OnlineLearner,
    fetcher: Fetcher,
    mode: LearningMode,
    collect_every: Duration,
    train_every: Duration,
    shutdown_rx: watch::Receiver<bool>,
}

fn hours(h: u64) -> Duration {
    Duration::from_secs(h * 3600)
}

/// Interval whose first tick fires one period from now
async fn delayed_interval(period: Duration) -> Interval {
    let mut ticker = interval(period);
    ticker.tick().await; // First tick is immediate, skip it
    ticker
}

impl Scheduler {
    pub fn new(
        learner: OnlineLearner,
        fetcher: Fetcher,
        mode: LearningMode,
        online: &OnlineConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            learner,
            fetcher,
            mode,
            collect_every: hours(online.collect_interval_hours),
            train_every: hours(online.train_interval_hours),
            shutdown_rx,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        info!(
            mode = ?self.mode,
            "Online learning starting: collect every {}h, train every {}h",
            self.collect_every.as_secs() / 3600,
            self.train_every.as_secs() / 3600
        );

        // Continuous mode collects once up front; every mode then waits a full interval
        if self.mode == LearningMode::Continuous {
            self.run_collection().await;
        }

        let collect_enabled = self.mode != LearningMode::Train;
        let train_enabled = self.mode != LearningMode::Collect;
        let mut collect_ticker = delayed_interval(self.collect_every).await;
        let mut train_ticker = delayed_interval(self.train_every).await;

        loop {
            tokio::select! {
                _ = collect_ticker.tick(), if collect_enabled => {
                    self.run_collection().await;
                }
                _ = train_ticker.tick(), if train_enabled => {
                    self.run_training();
                }
                _ = self.shutdown_rx.changed() => {
                    info!("Shutdown signal received, stopping online learning");
                    break;
                }
            }
        }

        Ok(())
    }

    async fn run_collection(&self) {
        match self.learner.collect(&self.fetcher).await {
            Ok(n) => info!("Collection run completed: {} records", n),
            Err(e) => error!("Collection error: {}", e),
        }
    }

    fn run_training(&self) {
        match self.learner.run_incremental_training() {
            Ok(TrainingRun::Updated { diseases, records }) => {
                info!(records, "Incremental training updated {} models", diseases.len())
            }
            Ok(run) => info!(?run, "Incremental training completed without updates"),
            Err(e) => error!("Incremental training error: {}", e),
        }
    }
}
