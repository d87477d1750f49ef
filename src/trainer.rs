use crate::config::TrainingConfig;
use crate::error::{AppError, Result};
use crate::features::{feature_matrix, select_training_features, FeatureFrame};
use crate::labels::{generate_labels, generate_tiered_labels, Disease};
use crate::ml::metrics::{self, round2, Scores};
use crate::ml::{
    Classifier, ForestParams, LogisticModel, ModelKind, RandomForest, SoftVotingEnsemble,
    StandardScaler,
};
use crate::store::{FeatureImportance, ModelBundle, ModelMetrics, ModelStore, RiskTiers};
use chrono::Utc;
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

const TOP_IMPORTANCES: usize = 10;

#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub bundle: ModelBundle,
    pub metrics: ModelMetrics,
}

/// Untrained random forest plus logistic regression, soft-voted
pub fn build_ensemble(cfg: &TrainingConfig) -> SoftVotingEnsemble<ModelKind> {
    SoftVotingEnsemble::new(vec![
        ModelKind::RandomForest(RandomForest::new(ForestParams {
            n_trees: cfg.n_trees,
            max_depth: cfg.max_depth,
            min_samples_split: cfg.min_samples_split,
            seed: cfg.seed,
        })),
        ModelKind::Logistic(LogisticModel::new(cfg.logistic_max_iterations)),
    ])
}

fn test_count(n: usize, fraction: f64) -> usize {
    ((n as f64 * fraction - 1e-9).ceil().max(0.0) as usize).min(n.saturating_sub(1))
}

/// Seeded train/test split, stratified by label.
///
/// Falls back to a plain shuffle when any class has fewer than two rows.
pub fn split_indices(labels: &[u8], test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);

    let mut by_class: BTreeMap<u8, Vec<usize>> = BTreeMap::new();
    for (i, &label) in labels.iter().enumerate() {
        by_class.entry(label).or_default().push(i);
    }

    let (mut train, mut test) = (Vec::new(), Vec::new());
    if by_class.values().all(|rows| rows.len() >= 2) {
        for rows in by_class.values_mut() {
            rows.shuffle(&mut rng);
            let n_test = test_count(rows.len(), test_fraction);
            test.extend_from_slice(&rows[..n_test]);
            train.extend_from_slice(&rows[n_test..]);
        }
        train.shuffle(&mut rng);
        test.shuffle(&mut rng);
    } else {
        warn!("A class has fewer than 2 rows, splitting without stratification");
        let mut rows: Vec<usize> = (0..labels.len()).collect();
        rows.shuffle(&mut rng);
        let n_test = test_count(rows.len(), test_fraction);
        test.extend_from_slice(&rows[..n_test]);
        train.extend_from_slice(&rows[n_test..]);
    }

    (train, test)
}

fn labels_array(labels: &[u8]) -> Array1<usize> {
    labels.iter().map(|&l| l as usize).collect()
}

pub fn train_disease(
    frame: &FeatureFrame,
    disease: Disease,
    cfg: &TrainingConfig,
) -> Result<TrainingOutcome> {
    let labels = generate_labels(frame, disease);
    let positives = labels.iter().filter(|&&l| l == 1).count();
    info!(
        disease = %disease,
        positives,
        rows = labels.len(),
        "Generated labels ({:.2}% positive)",
        if labels.is_empty() { 0.0 } else { positives as f64 / labels.len() as f64 * 100.0 }
    );

    if labels.len() < 2 {
        return Err(AppError::Training(format!(
            "{} needs at least 2 rows, got {}",
            disease,
            labels.len()
        )));
    }

    let risk_tiers = RiskTiers::count(&generate_tiered_labels(frame, disease));
    debug!(
        disease = %disease,
        low = risk_tiers.low,
        medium = risk_tiers.medium,
        high = risk_tiers.high,
        "Heuristic risk tiers"
    );

    let feature_columns = select_training_features(frame);
    let x = feature_matrix(frame, &feature_columns)?;
    let y = labels_array(&labels);

    let (train_idx, test_idx) = split_indices(&labels, cfg.test_fraction, cfg.seed);
    let x_train = x.select(Axis(0), &train_idx);
    let y_train = y.select(Axis(0), &train_idx);
    let x_test = x.select(Axis(0), &test_idx);
    let y_test = y.select(Axis(0), &test_idx);

    let scaler = StandardScaler::fit(&x_train);
    let x_train = scaler.transform(&x_train);
    let x_test = scaler.transform(&x_test);

    let mut model = build_ensemble(cfg);
    model.fit(&x_train, &y_train)?;

    let scores = if x_test.nrows() > 0 {
        metrics::evaluate(&y_test, &model.predict(&x_test)?)
    } else {
        Scores::default()
    };

    let feature_importance = rank_importances(&model, &x_test, &y_test, &feature_columns, cfg)?;
    let top: Vec<FeatureImportance> = feature_importance
        .iter()
        .take(TOP_IMPORTANCES)
        .cloned()
        .collect();

    info!(
        disease = %disease,
        accuracy = round2(scores.accuracy),
        precision = round2(scores.precision),
        recall = round2(scores.recall),
        f1 = round2(scores.f1_score),
        features = feature_columns.len(),
        "Model trained"
    );

    let trained_at = Utc::now();
    let metrics = ModelMetrics {
        accuracy: round2(scores.accuracy),
        precision: round2(scores.precision),
        recall: round2(scores.recall),
        f1_score: round2(scores.f1_score),
        samples: labels.len(),
        training_samples: train_idx.len(),
        test_samples: test_idx.len(),
        positive_cases: positives,
        features_count: feature_columns.len(),
        top_feature: top.first().map(|f| f.feature.clone()),
        feature_importance: top,
        risk_tiers,
        trained_on: trained_at,
    };

    let bundle = ModelBundle {
        disease,
        model,
        scaler,
        feature_columns,
        feature_importance,
        trained_at,
        last_updated: None,
        update_count: 0,
    };

    Ok(TrainingOutcome { bundle, metrics })
}

/// Permutation importance of every feature, highest first
fn rank_importances<C: Classifier>(
    model: &C,
    x_test: &Array2<f64>,
    y_test: &Array1<usize>,
    names: &[String],
    cfg: &TrainingConfig,
) -> Result<Vec<FeatureImportance>> {
    if x_test.nrows() == 0 {
        return Ok(Vec::new());
    }
    let (x_sample, y_sample) = metrics::head_rows(x_test, y_test, cfg.importance_sample);
    let ranked = metrics::permutation_importance(model, &x_sample, &y_sample, cfg.seed)?;

    Ok(ranked
        .into_iter()
        .map(|(j, importance)| FeatureImportance {
            feature: names[j].clone(),
            importance: round2(importance),
        })
        .collect())
}

/// Train and persist every disease in `diseases`, then write the metrics summary.
///
/// A disease that fails to train is logged and left out; the others still save.
pub fn train_all(
    frame: &FeatureFrame,
    diseases: &[Disease],
    cfg: &TrainingConfig,
    store: &ModelStore,
) -> Result<BTreeMap<Disease, ModelMetrics>> {
    let mut all_metrics = BTreeMap::new();

    for &disease in diseases {
        let outcome = match train_disease(frame, disease, cfg) {
            Ok(o) => o,
            Err(e) => {
                error!(disease = %disease, "Training failed: {}", e);
                continue;
            }
        };
        store.save(&outcome.bundle)?;
        all_metrics.insert(disease, outcome.metrics);
    }

    if all_metrics.is_empty() {
        return Err(AppError::Training("no disease model could be trained".to_string()));
    }

    store.write_metrics(&all_metrics)?;
    Ok(all_metrics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stratified_split_keeps_both_classes() {
        let labels: Vec<u8> = (0..50).map(|i| u8::from(i % 5 == 0)).collect();
        let (train, test) = split_indices(&labels, 0.2, 42);

        assert_eq!(train.len() + test.len(), 50);
        assert_eq!(test.len(), 10);
        assert_eq!(test.iter().filter(|&&i| labels[i] == 1).count(), 2);
        assert!(train.iter().all(|i| !test.contains(i)));
    }

    #[test]
    fn test_split_falls_back_without_stratification() {
        let mut labels = vec![0u8; 9];
        labels.push(1);
        let (train, test) = split_indices(&labels, 0.2, 1);
        assert_eq!(test.len(), 2);
        assert_eq!(train.len(), 8);
    }

    #[test]
    fn test_split_is_seeded() {
        let labels: Vec<u8> = (0..30).map(|i| u8::from(i % 3 == 0)).collect();
        assert_eq!(split_indices(&labels, 0.2, 9), split_indices(&labels, 0.2, 9));
    }

    /// Rare positives at the high end score above the common negatives
    #[test]
    fn test_ensemble_orders_imbalanced_classes() {
        let x = Array2::from_shape_fn((60, 2), |(i, j)| {
            if j == 0 {
                i as f64
            } else {
                (i % 3) as f64
            }
        });
        let y = Array1::from_shape_fn(60, |i| usize::from(i >= 50));
        let scaler = StandardScaler::fit(&x);

        let cfg = TrainingConfig {
            n_trees: 9,
            max_depth: 4,
            min_samples_split: 2,
            logistic_max_iterations: 200,
            ..TrainingConfig::default()
        };
        let mut model = build_ensemble(&cfg);
        model.fit(&scaler.transform(&x), &y).unwrap();

        let rows = ndarray::array![[3.0, 1.0], [58.0, 1.0]];
        let p = model.predict_proba(&scaler.transform(&rows)).unwrap();
        assert!(p[0] < 0.5, "low {}", p[0]);
        assert!(p[1] > 0.5, "high {}", p[1]);
        assert!(p[1] > p[0]);
    }

    #[test]
    fn test_test_count_never_empties_train() {
        assert_eq!(test_count(2, 0.9), 1);
        assert_eq!(test_count(1, 0.2), 0);
        assert_eq!(test_count(10, 0.2), 2);
    }
}
