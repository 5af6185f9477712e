use crate::error::{AnytimeError, Result};
use serde::{Deserialize, Serialize};

/// Per-feature standardization with statistics frozen at calibration time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

impl StandardScaler {
    /// Pass-through scaler (zero mean, unit std).
    pub fn identity(dim: usize) -> Self {
        Self {
            mean: vec![0.0; dim],
            std: vec![1.0; dim],
        }
    }

    /// Fit mean and population std over `rows`. A zero std component is
    /// replaced by 1.0.
    pub fn fit<'a, I>(rows: I, dim: usize) -> Result<Self>
    where
        I: IntoIterator<Item = &'a [f64]>,
    {
        let mut sum = vec![0.0; dim];
        let mut sum_sq = vec![0.0; dim];
        let mut n = 0usize;
        for row in rows {
            if row.len() != dim {
                return Err(AnytimeError::invalid_input(format!(
                    "row of length {} for a {dim}-feature scaler",
                    row.len()
                )));
            }
            for (k, &v) in row.iter().enumerate() {
                sum[k] += v;
                sum_sq[k] += v * v;
            }
            n += 1;
        }
        if n == 0 {
            return Err(AnytimeError::invalid_input("cannot fit scaler on zero rows"));
        }
        let inv = 1.0 / n as f64;
        let mean: Vec<f64> = sum.iter().map(|s| s * inv).collect();
        let std = sum_sq
            .iter()
            .zip(&mean)
            .map(|(sq, m)| {
                let var = (sq * inv - m * m).max(0.0);
                let sd = var.sqrt();
                if sd > 0.0 {
                    sd
                } else {
                    1.0
                }
            })
            .collect();
        Ok(Self { mean, std })
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// `(x - mean) / std`, subtract first then divide.
    pub fn transform(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .zip(self.mean.iter().zip(&self.std))
            .map(|(v, (m, s))| (v - m) / s)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_uses_population_std_and_guards_constant_features() {
        let rows: Vec<Vec<f64>> = vec![vec![1.0, 5.0], vec![3.0, 5.0]];
        let scaler = StandardScaler::fit(rows.iter().map(|r| r.as_slice()), 2).unwrap();
        assert_eq!(scaler.mean, vec![2.0, 5.0]);
        assert_eq!(scaler.std, vec![1.0, 1.0]);
        assert_eq!(scaler.transform(&[3.0, 5.0]), vec![1.0, 0.0]);
    }

    #[test]
    fn fit_rejects_ragged_rows() {
        let rows: Vec<Vec<f64>> = vec![vec![1.0, 2.0], vec![3.0]];
        assert!(StandardScaler::fit(rows.iter().map(|r| r.as_slice()), 2).is_err());
    }
}
