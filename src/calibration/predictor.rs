//! Runtime contract of the time predictor.
//!
//! The 3D backbone time is estimated by a regression over the standardized
//! per-tile occupancy vector. Every other stage is an exact table replay keyed
//! by a bit-encoded subset id.

use super::{CalibrationData, CalibrationTables, StandardScaler};
use crate::error::{AnytimeError, Result};
use crate::io::{read_json_file, write_json_file};
use crate::tiles::SubsetId;
use log::info;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Fully connected layer, `weights` is `out x in` row-major.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
}

impl DenseLayer {
    fn input_dim(&self) -> usize {
        self.weights.first().map(|r| r.len()).unwrap_or(0)
    }

    fn output_dim(&self) -> usize {
        self.bias.len()
    }

    fn matrix(&self) -> DMatrix<f64> {
        let rows = self.weights.len();
        let cols = self.input_dim();
        DMatrix::from_fn(rows, cols, |r, c| self.weights[r][c])
    }
}

/// Fitted bb3d time regression.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RegressionModel {
    /// `w · x + w_count * tile_count + bias`.
    Linear {
        weights: Vec<f64>,
        tile_count_weight: f64,
        bias: f64,
    },
    /// ReLU between layers, none after the last one. Output dimension 1.
    Mlp { layers: Vec<DenseLayer> },
}

impl RegressionModel {
    /// Width of the occupancy input the model expects.
    pub fn input_dim(&self) -> usize {
        match self {
            RegressionModel::Linear { weights, .. } => weights.len(),
            RegressionModel::Mlp { layers } => layers.first().map(|l| l.input_dim()).unwrap_or(0),
        }
    }

    fn check(&self) -> Result<()> {
        if let RegressionModel::Mlp { layers } = self {
            if layers.is_empty() {
                return Err(AnytimeError::config("mlp model has no layers"));
            }
            let mut dim = layers[0].input_dim();
            for (i, layer) in layers.iter().enumerate() {
                if layer.weights.iter().any(|r| r.len() != dim)
                    || layer.weights.len() != layer.output_dim()
                {
                    return Err(AnytimeError::config(format!(
                        "mlp layer {i} is not a {}x{dim} matrix",
                        layer.output_dim()
                    )));
                }
                dim = layer.output_dim();
            }
            if dim != 1 {
                return Err(AnytimeError::config(format!(
                    "mlp output dimension is {dim}, expected 1"
                )));
            }
        }
        Ok(())
    }

    /// Evaluate a batch; `x` is `batch x input_dim` (already standardized).
    fn forward(&self, x: &DMatrix<f64>, tile_counts: &[usize]) -> DVector<f64> {
        match self {
            RegressionModel::Linear {
                weights,
                tile_count_weight,
                bias,
            } => {
                let w = DVector::from_column_slice(weights);
                let counts = DVector::from_iterator(
                    tile_counts.len(),
                    tile_counts.iter().map(|&c| c as f64),
                );
                (x * w + counts * *tile_count_weight).add_scalar(*bias)
            }
            RegressionModel::Mlp { layers } => {
                // Columns are samples from here on.
                let mut h = x.transpose();
                let last = layers.len().saturating_sub(1);
                for (i, layer) in layers.iter().enumerate() {
                    let b = DVector::from_column_slice(&layer.bias);
                    h = layer.matrix() * h;
                    for mut col in h.column_iter_mut() {
                        col += &b;
                    }
                    if i < last {
                        h.apply(|v| *v = v.max(0.0));
                    }
                }
                h.row(0).transpose()
            }
        }
    }
}

/// Serialized regression parameters plus the standardization statistics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PredictorCheckpoint {
    pub num_tiles: usize,
    pub scaler: StandardScaler,
    pub model: RegressionModel,
}

impl PredictorCheckpoint {
    pub fn load(path: &Path) -> Result<Self> {
        read_json_file(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_file(path, self)
    }
}

/// bb3d and total-time predictions for a batch of candidate workloads.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TotalPrediction {
    pub bb3d_ms: Vec<f64>,
    /// bb2d + head-pre of the candidate plus worst-case head-post.
    pub post_bb3d_ms: Vec<f64>,
    /// filtering WCET + bb3d + post-bb3d.
    pub total_ms: Vec<f64>,
}

/// Read-only predictor used by the scheduler during inference.
#[derive(Clone, Debug)]
pub struct TimePredictor {
    scaler: StandardScaler,
    model: RegressionModel,
    tables: CalibrationTables,
}

impl TimePredictor {
    pub fn new(
        scaler: StandardScaler,
        model: RegressionModel,
        tables: CalibrationTables,
    ) -> Result<Self> {
        model.check()?;
        let t = tables.num_tiles();
        if scaler.dim() != t || scaler.std.len() != t || model.input_dim() != t {
            return Err(AnytimeError::config(format!(
                "predictor input widths (scaler {}, model {}) do not match T={t}",
                scaler.dim(),
                model.input_dim()
            )));
        }
        Ok(Self {
            scaler,
            model,
            tables,
        })
    }

    /// Load calibration tables and a fitted checkpoint.
    ///
    /// An absent data file yields [`AnytimeError::MissingCalibrationData`] so
    /// the caller can fall back to the calibration sweep.
    pub fn load(data_path: &Path, checkpoint_path: &Path) -> Result<Self> {
        let data = CalibrationData::load(data_path)?;
        let ckpt = PredictorCheckpoint::load(checkpoint_path)?;
        Self::from_parts(&data, ckpt)
    }

    /// Build from in-memory calibration data and a fitted checkpoint.
    pub fn from_parts(data: &CalibrationData, ckpt: PredictorCheckpoint) -> Result<Self> {
        if ckpt.num_tiles != data.num_tiles {
            return Err(AnytimeError::config(format!(
                "checkpoint fitted for T={}, calibration data has T={}",
                ckpt.num_tiles, data.num_tiles
            )));
        }
        let tables = CalibrationTables::from_data(data)?;
        info!(
            "time predictor ready: T={}, filtering WCET {:.3} ms, head-post WCET {:.3} ms",
            tables.num_tiles(),
            tables.filtering_wcet_ms(),
            tables.head_post_wcet_ms()
        );
        Self::new(ckpt.scaler, ckpt.model, tables)
    }

    pub fn tables(&self) -> &CalibrationTables {
        &self.tables
    }

    pub fn num_tiles(&self) -> usize {
        self.tables.num_tiles()
    }

    /// Predicted bb3d time (ms) for each occupancy vector.
    pub fn predict(&self, occupancies: &[Vec<f64>], tile_counts: &[usize]) -> Result<Vec<f64>> {
        if occupancies.len() != tile_counts.len() {
            return Err(AnytimeError::invalid_input(format!(
                "{} occupancy vectors but {} tile counts",
                occupancies.len(),
                tile_counts.len()
            )));
        }
        if occupancies.is_empty() {
            return Ok(Vec::new());
        }
        let t = self.num_tiles();
        let mut x = DMatrix::zeros(occupancies.len(), t);
        for (r, occ) in occupancies.iter().enumerate() {
            if occ.len() != t {
                return Err(AnytimeError::invalid_input(format!(
                    "occupancy vector of length {} for T={t}",
                    occ.len()
                )));
            }
            for (c, v) in self.scaler.transform(occ).into_iter().enumerate() {
                x[(r, c)] = v;
            }
        }
        Ok(self.model.forward(&x, tile_counts).iter().copied().collect())
    }

    /// Everything after bb3d for a tile subset: bb2d + head-pre + head-post WCET.
    pub fn predict_post_bb3d_ms(&self, id: SubsetId) -> Result<f64> {
        Ok(self.tables.bb2d_head_pre_ms(id)? + self.tables.head_post_wcet_ms())
    }

    /// Predicted end-to-end time of each candidate, `ids[i]` being the
    /// subset id of candidate `i`.
    pub fn predict_total_req_time_ms(
        &self,
        occupancies: &[Vec<f64>],
        tile_counts: &[usize],
        ids: &[SubsetId],
    ) -> Result<TotalPrediction> {
        let bb3d_ms = self.predict(occupancies, tile_counts)?;
        let post_bb3d_ms = ids
            .iter()
            .map(|&id| self.predict_post_bb3d_ms(id))
            .collect::<Result<Vec<_>>>()?;
        let wcet = self.tables.filtering_wcet_ms();
        let total_ms = bb3d_ms
            .iter()
            .zip(&post_bb3d_ms)
            .map(|(b, p)| wcet + b + p)
            .collect();
        Ok(TotalPrediction {
            bb3d_ms,
            post_bb3d_ms,
            total_ms,
        })
    }

    /// Head-post time of the active head set, an exact table replay.
    pub fn predict_final_req_time_ms(&self, heads: &[usize]) -> Result<f64> {
        if let Some(&bad) = heads.iter().find(|&&h| h >= self.tables.num_det_heads()) {
            return Err(AnytimeError::config(format!(
                "head index {bad} with {} configured heads",
                self.tables.num_det_heads()
            )));
        }
        self.tables.head_post_ms(SubsetId::try_encode(heads.iter().copied())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiles::table_len;

    fn tables(t: usize, h: usize) -> CalibrationTables {
        CalibrationTables::new(t, h, 0.5, vec![1.0; table_len(t)], vec![2.0; table_len(h)]).unwrap()
    }

    #[test]
    fn linear_model_uses_standardized_input_and_tile_count() {
        let scaler = StandardScaler {
            mean: vec![10.0, 10.0],
            std: vec![2.0, 2.0],
        };
        let model = RegressionModel::Linear {
            weights: vec![1.0, 3.0],
            tile_count_weight: 0.5,
            bias: 4.0,
        };
        let p = TimePredictor::new(scaler, model, tables(2, 1)).unwrap();
        let out = p.predict(&[vec![12.0, 14.0]], &[2]).unwrap();
        // (1 * 1) + (3 * 2) + 0.5 * 2 + 4
        assert!((out[0] - 12.0).abs() < 1e-12);
    }

    #[test]
    fn mlp_applies_relu_between_layers() {
        let model = RegressionModel::Mlp {
            layers: vec![
                DenseLayer {
                    weights: vec![vec![1.0, 0.0], vec![-1.0, 0.0]],
                    bias: vec![0.0, 0.0],
                },
                DenseLayer {
                    weights: vec![vec![1.0, 1.0]],
                    bias: vec![0.5],
                },
            ],
        };
        let p = TimePredictor::new(StandardScaler::identity(2), model, tables(2, 1)).unwrap();
        let out = p.predict(&[vec![3.0, 0.0], vec![-2.0, 7.0]], &[1, 1]).unwrap();
        assert!((out[0] - 3.5).abs() < 1e-12);
        assert!((out[1] - 2.5).abs() < 1e-12);
    }

    #[test]
    fn total_adds_filtering_bb3d_and_tables() {
        let model = RegressionModel::Linear {
            weights: vec![1.0, 1.0],
            tile_count_weight: 0.0,
            bias: 0.0,
        };
        let p = TimePredictor::new(StandardScaler::identity(2), model, tables(2, 1)).unwrap();
        let pred = p
            .predict_total_req_time_ms(&[vec![3.0, 0.0]], &[1], &[SubsetId(1)])
            .unwrap();
        assert_eq!(pred.bb3d_ms, vec![3.0]);
        assert_eq!(pred.post_bb3d_ms, vec![3.0]);
        assert_eq!(pred.total_ms, vec![6.5]);
    }

    #[test]
    fn mismatched_widths_are_configuration_errors() {
        let model = RegressionModel::Linear {
            weights: vec![1.0; 3],
            tile_count_weight: 0.0,
            bias: 0.0,
        };
        let err = TimePredictor::new(StandardScaler::identity(2), model, tables(2, 1)).unwrap_err();
        assert!(matches!(err, AnytimeError::Configuration(_)));
    }
}
