use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

/// Per-column standardisation fitted on training rows only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    /// Population std per column; a constant column gets scale 1
    pub fn fit(x: &Array2<f64>) -> Self {
        let n = x.nrows().max(1) as f64;
        let mut mean = Vec::with_capacity(x.ncols());
        let mut scale = Vec::with_capacity(x.ncols());

        for col in x.axis_iter(Axis(1)) {
            let m = col.sum() / n;
            let var = col.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n;
            let s = var.sqrt();
            mean.push(m);
            scale.push(if s > 0.0 && s.is_finite() { s } else { 1.0 });
        }

        Self { mean, scale }
    }

    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut out = x.clone();
        for (j, mut col) in out.axis_iter_mut(Axis(1)).enumerate() {
            let (m, s) = (
                self.mean.get(j).copied().unwrap_or(0.0),
                self.scale.get(j).copied().unwrap_or(1.0),
            );
            col.mapv_inplace(|v| (v - m) / s);
        }
        out
    }
}
