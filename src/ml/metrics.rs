//! Evaluation of binary predictions. All scores are percentages.

use super::Classifier;
use crate::error::Result;
use linfa::metrics::ToConfusionMatrix;
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
}

/// Share of rows where `other` equals the single label in `constant`.
///
/// linfa builds the class list from `other` and drops rows whose labels are
/// outside it, so a label that `other` never uses scores 0 (NaN from an empty
/// matrix) and the class order of the matrix does not matter.
fn match_rate(constant: &Array1<usize>, other: &Array1<usize>) -> f64 {
    match other.confusion_matrix(constant) {
        Ok(cm) => {
            let rate = f64::from(cm.accuracy());
            if rate.is_nan() {
                0.0
            } else {
                rate
            }
        }
        Err(_) => 0.0,
    }
}

/// Rows of `values` where `key` equals `label`
fn rows_where(values: &Array1<usize>, key: &Array1<usize>, label: usize) -> Array1<usize> {
    values
        .iter()
        .zip(key.iter())
        .filter(|(_, &k)| k == label)
        .map(|(&v, _)| v)
        .collect()
}

/// Accuracy, precision, recall and F1 for label 1; a zero denominator scores 0
///
/// The binary scores of a linfa confusion matrix refer to whichever class it
/// lists first, so each score here is the accuracy of a one-label slice.
pub fn evaluate(truth: &Array1<usize>, predicted: &Array1<usize>) -> Scores {
    let n = truth.len();
    if n == 0 {
        return Scores::default();
    }

    let flagged = rows_where(truth, predicted, 1);
    let precision = match_rate(&Array1::from_elem(flagged.len(), 1), &flagged);

    let on_positive = rows_where(predicted, truth, 1);
    let recall = match_rate(&Array1::from_elem(on_positive.len(), 1), &on_positive);

    let on_negative = rows_where(predicted, truth, 0);
    let specificity = match_rate(&Array1::from_elem(on_negative.len(), 0), &on_negative);

    let accuracy =
        (recall * on_positive.len() as f64 + specificity * on_negative.len() as f64) / n as f64;
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    Scores {
        accuracy: accuracy * 100.0,
        precision: precision * 100.0,
        recall: recall * 100.0,
        f1_score: f1 * 100.0,
    }
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Accuracy drop when each column is shuffled, as a share of the total drop.
///
/// Returns `(column index, importance %)` sorted descending. Columns whose
/// shuffle does not hurt accuracy get 0.
pub fn permutation_importance<C: Classifier>(
    model: &C,
    x: &Array2<f64>,
    y: &Array1<usize>,
    seed: u64,
) -> Result<Vec<(usize, f64)>> {
    let baseline = evaluate(y, &model.predict(x)?).accuracy;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut drops = Vec::with_capacity(x.ncols());

    for j in 0..x.ncols() {
        let mut shuffled = x.clone();
        let mut column: Vec<f64> = x.column(j).to_vec();
        column.shuffle(&mut rng);
        shuffled
            .column_mut(j)
            .assign(&Array1::from(column));

        let score = evaluate(y, &model.predict(&shuffled)?).accuracy;
        drops.push((j, (baseline - score).max(0.0)));
    }

    let total: f64 = drops.iter().map(|(_, d)| d).sum();
    if total > 0.0 {
        for (_, d) in &mut drops {
            *d = *d / total * 100.0;
        }
    }
    drops.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    Ok(drops)
}

/// First `n` rows, or all of them
pub fn head_rows(x: &Array2<f64>, y: &Array1<usize>, n: usize) -> (Array2<f64>, Array1<usize>) {
    let n = n.min(x.nrows());
    let rows: Vec<usize> = (0..n).collect();
    (x.select(Axis(0), &rows), y.select(Axis(0), &rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_evaluate() {
        let truth = array![1, 1, 0, 0];
        let predicted = array![1, 0, 1, 0];
        let s = evaluate(&truth, &predicted);
        assert_eq!(s.accuracy, 50.0);
        assert_eq!(s.precision, 50.0);
        assert_eq!(s.recall, 50.0);
        assert_eq!(s.f1_score, 50.0);
    }

    #[test]
    fn test_zero_division_scores_zero() {
        let s = evaluate(&array![0, 0], &array![0, 0]);
        assert_eq!(s.accuracy, 100.0);
        assert_eq!(s.precision, 0.0);
        assert_eq!(s.recall, 0.0);
        assert_eq!(s.f1_score, 0.0);
    }

    /// Scores stay tied to label 1 when one side never uses a label
    #[test]
    fn test_scores_with_one_sided_labels() {
        let s = evaluate(&array![1, 1, 1, 0], &array![0, 0, 0, 0]);
        assert_eq!(s.accuracy, 25.0);
        assert_eq!(s.precision, 0.0);
        assert_eq!(s.recall, 0.0);

        let s = evaluate(&array![0, 0, 0, 1], &array![1, 1, 1, 1]);
        assert_eq!(s.accuracy, 25.0);
        assert_eq!(s.precision, 25.0);
        assert_eq!(s.recall, 100.0);
        assert!((s.f1_score - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_evaluate_empty() {
        assert_eq!(evaluate(&array![], &array![]), Scores::default());
    }

    struct FirstColumn;

    impl Classifier for FirstColumn {
        fn fit(&mut self, _x: &Array2<f64>, _y: &Array1<usize>) -> Result<()> {
            Ok(())
        }

        fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
            Ok(x.column(0).to_owned())
        }
    }

    #[test]
    fn test_permutation_importance_finds_used_column() {
        let x = Array2::from_shape_fn((50, 2), |(i, j)| if j == 0 { (i % 2) as f64 } else { 0.5 });
        let y = Array1::from_shape_fn(50, |i| i % 2);
        let importance = permutation_importance(&FirstColumn, &x, &y, 1).unwrap();

        assert_eq!(importance[0].0, 0);
        assert_eq!(importance[0].1, 100.0);
        assert_eq!(importance[1], (1, 0.0));
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(12.3456), 12.35);
    }
}
