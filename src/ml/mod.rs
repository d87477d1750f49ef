//! Binary classifiers used for outbreak risk.
//!
//! Every model exposes the probability of the positive class (label 1).

mod ensemble;
mod forest;
mod logistic;
pub mod metrics;
mod scaler;

pub use ensemble::SoftVotingEnsemble;
pub use forest::{ForestParams, RandomForest};
pub use logistic::LogisticModel;
pub use scaler::StandardScaler;

use crate::error::Result;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

pub trait Classifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()>;

    /// Probability of label 1 for each row
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        Ok(self.predict_proba(x)?.mapv(|p| usize::from(p >= 0.5)))
    }
}

/// Serializable member of an ensemble
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelKind {
    RandomForest(RandomForest),
    Logistic(LogisticModel),
}

impl Classifier for ModelKind {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        match self {
            ModelKind::RandomForest(m) => m.fit(x, y),
            ModelKind::Logistic(m) => m.fit(x, y),
        }
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match self {
            ModelKind::RandomForest(m) => m.predict_proba(x),
            ModelKind::Logistic(m) => m.predict_proba(x),
        }
    }
}

/// Share of rows labelled 1, used when a model cannot be fitted on one class
pub(crate) fn positive_rate(y: &Array1<usize>) -> f64 {
    if y.is_empty() {
        0.0
    } else {
        y.iter().filter(|&&v| v == 1).count() as f64 / y.len() as f64
    }
}

pub(crate) fn is_single_class(y: &Array1<usize>) -> bool {
    let mut labels = y.iter();
    match labels.next() {
        Some(first) => labels.all(|v| v == first),
        None => true,
    }
}
