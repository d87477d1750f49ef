use super::{is_single_class, Classifier};
use crate::error::{AppError, Result};
use linfa::prelude::*;
use linfa_trees::DecisionTree;
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Member {
    Tree {
        features: Vec<usize>,
        tree: DecisionTree<f64, usize>,
    },
    /// Bootstrap sample held one class only
    Constant(usize),
}

/// Bagged decision trees with a random feature subspace per tree.
///
/// The probability of label 1 is the share of trees voting for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    members: Vec<Member>,
}

impl RandomForest {
    pub fn new(params: ForestParams) -> Self {
        Self {
            params,
            members: Vec::new(),
        }
    }
}

fn subspace_size(n_features: usize) -> usize {
    ((n_features as f64).sqrt().ceil() as usize).clamp(1, n_features.max(1))
}

impl Classifier for RandomForest {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        let (n_rows, n_features) = x.dim();
        if n_rows == 0 || n_features == 0 {
            return Err(AppError::Training(
                "random forest needs at least one row and one feature".to_string(),
            ));
        }

        let k = subspace_size(n_features);
        let mut rng = StdRng::seed_from_u64(self.params.seed);
        let mut members = Vec::with_capacity(self.params.n_trees);

        for _ in 0..self.params.n_trees {
            let rows: Vec<usize> = (0..n_rows).map(|_| rng.gen_range(0..n_rows)).collect();
            let mut features = rand::seq::index::sample(&mut rng, n_features, k).into_vec();
            features.sort_unstable();

            let y_boot = y.select(Axis(0), &rows);
            if is_single_class(&y_boot) {
                members.push(Member::Constant(y_boot[0]));
                continue;
            }

            let x_boot = x.select(Axis(0), &rows).select(Axis(1), &features);
            let dataset = DatasetBase::new(x_boot, y_boot);
            let tree = DecisionTree::params()
                .max_depth(Some(self.params.max_depth))
                .min_weight_split(self.params.min_samples_split as f32)
                .fit(&dataset)
                .map_err(|e| AppError::Training(format!("decision tree: {}", e)))?;

            members.push(Member::Tree { features, tree });
        }

        debug!(
            trees = members.len(),
            subspace = k,
            rows = n_rows,
            "Random forest fitted"
        );
        self.members = members;
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.members.is_empty() {
            return Err(AppError::Training("random forest is not fitted".to_string()));
        }

        let mut votes = Array1::<f64>::zeros(x.nrows());
        for member in &self.members {
            match member {
                Member::Tree { features, tree } => {
                    if features.iter().any(|&f| f >= x.ncols()) {
                        return Err(AppError::InvalidData(format!(
                            "expected at least {} feature columns, got {}",
                            features.iter().max().map_or(0, |m| m + 1),
                            x.ncols()
                        )));
                    }
                    let sub = x.select(Axis(1), features);
                    let predicted: Array1<usize> = tree.predict(&sub);
                    votes.zip_mut_with(&predicted, |v, &p| *v += p as f64);
                }
                Member::Constant(label) => votes += *label as f64,
            }
        }

        Ok(votes / self.members.len() as f64)
    }
}
