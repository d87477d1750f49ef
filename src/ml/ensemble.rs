use super::Classifier;
use crate::error::{AppError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Averages the positive-class probabilities of its members
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftVotingEnsemble<C> {
    members: Vec<C>,
}

impl<C: Classifier> SoftVotingEnsemble<C> {
    pub fn new(members: Vec<C>) -> Self {
        Self { members }
    }
}

impl<C: Classifier> Classifier for SoftVotingEnsemble<C> {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        for member in &mut self.members {
            member.fit(x, y)?;
        }
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.members.is_empty() {
            return Err(AppError::Training("ensemble has no members".to_string()));
        }

        let mut total = Array1::<f64>::zeros(x.nrows());
        for member in &self.members {
            total += &member.predict_proba(x)?;
        }
        Ok(total / self.members.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    struct Fixed(f64);

    impl Classifier for Fixed {
        fn fit(&mut self, _x: &Array2<f64>, _y: &Array1<usize>) -> Result<()> {
            Ok(())
        }

        fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
            Ok(Array1::from_elem(x.nrows(), self.0))
        }
    }

    #[test]
    fn test_soft_vote_averages() {
        let ensemble = SoftVotingEnsemble::new(vec![Fixed(0.2), Fixed(0.8), Fixed(0.5)]);
        let x = array![[0.0], [1.0]];
        let p = ensemble.predict_proba(&x).unwrap();
        assert!((p[0] - 0.5).abs() < 1e-12);
        assert_eq!(ensemble.predict(&x).unwrap(), array![1, 1]);
    }

    #[test]
    fn test_empty_ensemble_errors() {
        let ensemble: SoftVotingEnsemble<Fixed> = SoftVotingEnsemble::new(Vec::new());
        assert!(ensemble.predict_proba(&array![[0.0]]).is_err());
    }
}
