use super::CalibrationData;
use crate::error::{AnytimeError, Result};
use crate::tiles::{table_len, SubsetId};
use serde::{Deserialize, Serialize};

/// Filtering time assumed when no filtering sample was recorded.
pub const DEFAULT_FILTERING_WCET_MS: f64 = 1.0;

/// Exact-replay timing tables for stages whose cost depends only on a
/// discrete configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationTables {
    num_tiles: usize,
    num_det_heads: usize,
    filtering_wcet_ms: f64,
    /// bb2d + head-pre time per tile subset id.
    bb2d_head_pre_ms: Vec<f64>,
    /// head-post time per head subset id.
    head_post_ms: Vec<f64>,
}

impl CalibrationTables {
    pub fn from_data(data: &CalibrationData) -> Result<Self> {
        if data.bb2d_times_ms.len() != table_len(data.num_tiles)
            || data.det_head_pre_times_ms.len() != table_len(data.num_tiles)
        {
            return Err(AnytimeError::config(format!(
                "tile tables must have 2^{} entries",
                data.num_tiles
            )));
        }
        let bb2d_head_pre_ms = data
            .bb2d_times_ms
            .iter()
            .zip(&data.det_head_pre_times_ms)
            .map(|(a, b)| a + b)
            .collect();
        Self::new(
            data.num_tiles,
            data.num_det_heads,
            percentile_lower(&data.filtering_times_ms, 0.99).unwrap_or(DEFAULT_FILTERING_WCET_MS),
            bb2d_head_pre_ms,
            data.det_head_post_times_ms.clone(),
        )
    }

    pub fn new(
        num_tiles: usize,
        num_det_heads: usize,
        filtering_wcet_ms: f64,
        bb2d_head_pre_ms: Vec<f64>,
        head_post_ms: Vec<f64>,
    ) -> Result<Self> {
        if bb2d_head_pre_ms.len() != table_len(num_tiles) {
            return Err(AnytimeError::config(format!(
                "bb2d+head-pre table has {} entries, expected 2^{num_tiles}",
                bb2d_head_pre_ms.len()
            )));
        }
        if head_post_ms.len() != table_len(num_det_heads) {
            return Err(AnytimeError::config(format!(
                "head-post table has {} entries, expected 2^{num_det_heads}",
                head_post_ms.len()
            )));
        }
        Ok(Self {
            num_tiles,
            num_det_heads,
            filtering_wcet_ms,
            bb2d_head_pre_ms,
            head_post_ms,
        })
    }

    pub fn num_tiles(&self) -> usize {
        self.num_tiles
    }

    pub fn num_det_heads(&self) -> usize {
        self.num_det_heads
    }

    pub fn filtering_wcet_ms(&self) -> f64 {
        self.filtering_wcet_ms
    }

    /// bb2d + head-pre time of a tile subset.
    pub fn bb2d_head_pre_ms(&self, id: SubsetId) -> Result<f64> {
        lookup(&self.bb2d_head_pre_ms, id, "bb2d+head-pre")
    }

    /// Head-post time of a head subset.
    pub fn head_post_ms(&self, id: SubsetId) -> Result<f64> {
        lookup(&self.head_post_ms, id, "head-post")
    }

    /// Head-post time with every head active.
    pub fn head_post_wcet_ms(&self) -> f64 {
        self.head_post_ms.last().copied().unwrap_or(0.0)
    }
}

fn lookup(table: &[f64], id: SubsetId, name: &str) -> Result<f64> {
    id.slot(table.len()).map(|i| table[i]).ok_or_else(|| {
        AnytimeError::config(format!(
            "{name} id {} outside table of {} entries",
            id.0,
            table.len()
        ))
    })
}

/// Percentile with the "lower" interpolation rule: `sorted[floor(q * (n - 1))]`.
pub fn percentile_lower(samples: &[f64], q: f64) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let idx = (q * (sorted.len() - 1) as f64).floor() as usize;
    Some(sorted[idx.min(sorted.len() - 1)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_lower_picks_existing_sample() {
        let samples: Vec<f64> = (1..=200).map(|v| v as f64).collect();
        // floor(0.99 * 199) = 197
        assert_eq!(percentile_lower(&samples, 0.99), Some(198.0));
        assert_eq!(percentile_lower(&[3.0], 0.99), Some(3.0));
        assert_eq!(percentile_lower(&[], 0.99), None);
    }

    #[test]
    fn from_data_combines_bb2d_and_head_pre() {
        let mut data = CalibrationData::empty(2, 2);
        data.bb2d_times_ms = vec![0.0, 1.0, 2.0, 3.0];
        data.det_head_pre_times_ms = vec![0.0, 0.5, 0.5, 0.5];
        data.det_head_post_times_ms = vec![0.0, 1.0, 2.0, 4.0];
        let tables = CalibrationTables::from_data(&data).unwrap();
        assert_eq!(tables.filtering_wcet_ms(), DEFAULT_FILTERING_WCET_MS);
        assert_eq!(tables.bb2d_head_pre_ms(SubsetId(3)).unwrap(), 3.5);
        assert_eq!(tables.head_post_wcet_ms(), 4.0);
        assert!(tables.head_post_ms(SubsetId(4)).is_err());
    }
}
