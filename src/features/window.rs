//! Sequence helpers over one city's ordered values that have no polars
//! window expression.

/// Length of the current run of equal values, counting the row itself
pub fn streak(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(values.len());
    let mut run = 0.0;
    for (i, v) in values.iter().enumerate() {
        if i > 0 && values[i - 1] == *v {
            run += 1.0;
        } else {
            run = 1.0;
        }
        out.push(Some(run));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().copied().map(Some).collect()
    }

    #[test]
    fn test_streak_resets_on_flip() {
        let out = streak(&some(&[0.0, 0.0, 1.0, 1.0, 1.0, 0.0]));
        assert_eq!(out, some(&[1.0, 2.0, 1.0, 2.0, 3.0, 1.0]));
    }

    #[test]
    fn test_streak_empty() {
        assert!(streak(&[]).is_empty());
    }
}
