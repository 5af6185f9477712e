//! Offline least-squares fit of the bb3d time model.

use super::{CalibrationData, PredictorCheckpoint, RegressionModel, StandardScaler};
use crate::error::{AnytimeError, Result};
use log::debug;
use nalgebra::{DMatrix, DVector};
use serde::Serialize;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResidualStats {
    pub samples: usize,
    pub mean_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub rmse_ms: f64,
}

impl ResidualStats {
    fn from_residuals(residuals: &[f64]) -> Self {
        if residuals.is_empty() {
            return Self::default();
        }
        let n = residuals.len() as f64;
        Self {
            samples: residuals.len(),
            mean_ms: residuals.iter().sum::<f64>() / n,
            min_ms: residuals.iter().copied().fold(f64::INFINITY, f64::min),
            max_ms: residuals.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            rmse_ms: (residuals.iter().map(|r| r * r).sum::<f64>() / n).sqrt(),
        }
    }
}

/// Fitted checkpoint plus per-sample residuals (`measured - predicted`).
#[derive(Clone, Debug)]
pub struct FitReport {
    pub checkpoint: PredictorCheckpoint,
    pub residuals: Vec<f64>,
    pub stats: ResidualStats,
}

/// Fit `[standardized occupancy | tile count | 1] · w = bb3d_ms` by SVD.
///
/// `data` should already be cleaned; every recorded subset of every sample
/// becomes one row.
pub fn fit_linear(data: &CalibrationData) -> Result<FitReport> {
    let t = data.num_tiles;
    let rows = data.bb3d_samples();
    if rows.is_empty() {
        return Err(AnytimeError::config("calibration data holds no bb3d samples"));
    }
    let occupancies: Vec<Vec<f64>> = rows
        .iter()
        .map(|(occ, _, _)| occ.iter().map(|&c| c as f64).collect())
        .collect();
    let scaler = StandardScaler::fit(occupancies.iter().map(|r| r.as_slice()), t)?;

    let n = rows.len();
    let mut a = DMatrix::zeros(n, t + 2);
    let mut b = DVector::zeros(n);
    for (r, (occ, (_, count, ms))) in occupancies.iter().zip(&rows).enumerate() {
        for (c, v) in scaler.transform(occ).into_iter().enumerate() {
            a[(r, c)] = v;
        }
        a[(r, t)] = *count as f64;
        a[(r, t + 1)] = 1.0;
        b[r] = *ms;
    }

    let w = a
        .clone()
        .svd(true, true)
        .solve(&b, 1e-9)
        .map_err(|e| AnytimeError::config(format!("least-squares solve failed: {e}")))?;
    let residuals: Vec<f64> = (&b - &a * &w).iter().copied().collect();
    let stats = ResidualStats::from_residuals(&residuals);
    debug!(
        "fit_linear: {} rows, residual mean {:.3} ms, rmse {:.3} ms",
        n, stats.mean_ms, stats.rmse_ms
    );

    let model = RegressionModel::Linear {
        weights: w.rows(0, t).iter().copied().collect(),
        tile_count_weight: w[t],
        bias: w[t + 1],
    };
    Ok(FitReport {
        checkpoint: PredictorCheckpoint {
            num_tiles: t,
            scaler,
            model,
        },
        residuals,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{CalibrationTables, TimePredictor};

    fn linear_data() -> CalibrationData {
        // bb3d = 0.01 * voxels + 2 ms, recorded over a few subsets.
        let mut d = CalibrationData::empty(3, 1);
        let occs = [
            vec![100, 0, 0],
            vec![100, 200, 0],
            vec![100, 200, 300],
            vec![0, 200, 300],
            vec![0, 0, 300],
            vec![50, 0, 10],
        ];
        for (i, occ) in occs.iter().enumerate() {
            let voxels: u32 = occ.iter().sum();
            d.scene_tokens.push(format!("s{}", i / 3));
            d.voxel_counts.push(vec![occ.clone()]);
            d.bb3d_time_ms.push(vec![0.01 * voxels as f64 + 2.0]);
            d.chosen_tile_coords.push(vec![(0..3).filter(|&k| occ[k] > 0).collect()]);
        }
        d
    }

    #[test]
    fn recovers_linear_cost_model() {
        let data = linear_data();
        let report = fit_linear(&data).unwrap();
        assert_eq!(report.stats.samples, 6);
        assert!(report.stats.rmse_ms < 1e-6);
        let tables = CalibrationTables::from_data(&data).unwrap();
        let p = TimePredictor::new(report.checkpoint.scaler, report.checkpoint.model, tables)
            .unwrap();
        let pred = p.predict(&[vec![10.0, 20.0, 30.0]], &[3]).unwrap();
        assert!((pred[0] - 2.6).abs() < 1e-6);
    }

    #[test]
    fn empty_data_is_rejected() {
        assert!(fit_linear(&CalibrationData::empty(2, 1)).is_err());
    }
}
