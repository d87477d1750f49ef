use super::{is_single_class, positive_rate, Classifier};
use crate::error::{AppError, Result};
use linfa::prelude::*;
use linfa_logistic::{FittedLogisticRegression, LogisticRegression};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticModel {
    max_iterations: u64,
    fitted: Option<FittedLogisticRegression<f64, usize>>,
    /// Whether `fitted` reports probabilities for label 1 or label 0
    positive_is_one: bool,
    /// Used instead of `fitted` when the last fit saw a single class
    constant: f64,
}

/// Label linfa-logistic scores as its positive class: the more frequent of
/// the two, or the first one seen when both are equally frequent.
fn linfa_positive_class(y: &Array1<usize>) -> Option<usize> {
    let mut counts: Vec<(usize, usize)> = Vec::with_capacity(2);
    for &label in y {
        match counts.iter_mut().find(|(class, _)| *class == label) {
            Some((_, n)) => *n += 1,
            None => counts.push((label, 1)),
        }
    }
    match counts.as_slice() {
        [first, second] if second.1 > first.1 => Some(second.0),
        [first, _] => Some(first.0),
        _ => None,
    }
}

impl LogisticModel {
    pub fn new(max_iterations: u64) -> Self {
        Self {
            max_iterations,
            fitted: None,
            positive_is_one: true,
            constant: 0.0,
        }
    }
}

impl Classifier for LogisticModel {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        if is_single_class(y) {
            warn!("Logistic model got a single class, using a constant probability");
            self.fitted = None;
            self.constant = positive_rate(y);
            return Ok(());
        }

        let positive = linfa_positive_class(y).ok_or_else(|| {
            AppError::Training("logistic regression needs exactly two classes".to_string())
        })?;

        let dataset = DatasetBase::new(x.clone(), y.clone());
        let fitted = LogisticRegression::default()
            .max_iterations(self.max_iterations)
            .fit(&dataset)
            .map_err(|e| AppError::Training(format!("logistic regression: {}", e)))?;

        self.fitted = Some(fitted);
        self.positive_is_one = positive == 1;
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match &self.fitted {
            Some(model) if self.positive_is_one => Ok(model.predict_probabilities(x)),
            Some(model) => Ok(model.predict_probabilities(x).mapv(|p| 1.0 - p)),
            None => Ok(Array1::from_elem(x.nrows(), self.constant)),
        }
    }
}
