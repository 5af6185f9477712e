use crate::error::{AnytimeError, Result};
use crate::io::{read_json_file, write_json_file};
use crate::tiles::{table_len, TileId};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// On-disk calibration record produced by the calibration sweep.
///
/// Per-sample series (`voxel_counts`, `bb3d_time_ms`, `chosen_tile_coords`,
/// `scene_tokens`) hold one entry per recorded frame; each frame entry holds
/// one value per tile subset tried on it. The lookup tables are addressed by
/// [`SubsetId`](crate::tiles::SubsetId) and have exactly `2^num_tiles` /
/// `2^num_det_heads` entries.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationData {
    pub voxel_counts: Vec<Vec<Vec<u32>>>,
    pub bb3d_time_ms: Vec<Vec<f64>>,
    pub scene_tokens: Vec<String>,
    pub chosen_tile_coords: Vec<Vec<Vec<TileId>>>,
    pub filtering_times_ms: Vec<f64>,
    pub bb2d_times_ms: Vec<f64>,
    pub det_head_pre_times_ms: Vec<f64>,
    pub det_head_post_times_ms: Vec<f64>,
    pub num_tiles: usize,
    pub num_det_heads: usize,
}

impl CalibrationData {
    /// Empty record with zero-filled tables sized for the given configuration.
    pub fn empty(num_tiles: usize, num_det_heads: usize) -> Self {
        Self {
            bb2d_times_ms: vec![0.0; table_len(num_tiles)],
            det_head_pre_times_ms: vec![0.0; table_len(num_tiles)],
            det_head_post_times_ms: vec![0.0; table_len(num_det_heads)],
            num_tiles,
            num_det_heads,
            ..Default::default()
        }
    }

    /// Load from `path`; an absent file is reported as
    /// [`AnytimeError::MissingCalibrationData`].
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AnytimeError::MissingCalibrationData {
                path: path.to_path_buf(),
            });
        }
        let data: CalibrationData = read_json_file(path)?;
        info!(
            "loaded calibration data from {} ({} samples, T={}, heads={})",
            path.display(),
            data.scene_tokens.len(),
            data.num_tiles,
            data.num_det_heads
        );
        Ok(data)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_file(path, self)
    }

    /// Number of recorded frames.
    pub fn num_samples(&self) -> usize {
        self.scene_tokens.len()
    }

    /// Check table sizes and per-sample shapes against the running configuration.
    pub fn validate(&self, num_tiles: usize, num_det_heads: usize) -> Result<()> {
        if self.num_tiles != num_tiles || self.num_det_heads != num_det_heads {
            return Err(AnytimeError::config(format!(
                "calibration recorded for T={} heads={}, running with T={} heads={}",
                self.num_tiles, self.num_det_heads, num_tiles, num_det_heads
            )));
        }
        let tile_tables = [
            ("bb2d_times_ms", self.bb2d_times_ms.len()),
            ("det_head_pre_times_ms", self.det_head_pre_times_ms.len()),
        ];
        for (name, len) in tile_tables {
            if len != table_len(num_tiles) {
                return Err(AnytimeError::config(format!(
                    "{name} has {len} entries, expected 2^{num_tiles}"
                )));
            }
        }
        if self.det_head_post_times_ms.len() != table_len(num_det_heads) {
            return Err(AnytimeError::config(format!(
                "det_head_post_times_ms has {} entries, expected 2^{num_det_heads}",
                self.det_head_post_times_ms.len()
            )));
        }
        let n = self.scene_tokens.len();
        if self.voxel_counts.len() != n
            || self.bb3d_time_ms.len() != n
            || self.chosen_tile_coords.len() != n
        {
            return Err(AnytimeError::config(
                "per-sample series have different lengths",
            ));
        }
        for (vcs, times) in self.voxel_counts.iter().zip(&self.bb3d_time_ms) {
            if vcs.len() != times.len() {
                return Err(AnytimeError::config(
                    "voxel count and bb3d time series disagree within a sample",
                ));
            }
            if let Some(bad) = vcs.iter().find(|v| v.len() != num_tiles) {
                return Err(AnytimeError::config(format!(
                    "occupancy vector of length {} in a T={num_tiles} calibration",
                    bad.len()
                )));
            }
        }
        Ok(())
    }

    /// Drop the first sample of every scene; its timings include scene warm-up.
    pub fn cleanup(&mut self) {
        let mut keep = Vec::with_capacity(self.scene_tokens.len());
        let mut prev: Option<&str> = None;
        for token in &self.scene_tokens {
            keep.push(prev == Some(token.as_str()));
            prev = Some(token.as_str());
        }
        retain_by_mask(&mut self.voxel_counts, &keep);
        retain_by_mask(&mut self.bb3d_time_ms, &keep);
        retain_by_mask(&mut self.chosen_tile_coords, &keep);
        retain_by_mask(&mut self.scene_tokens, &keep);
    }

    /// Flatten per-sample series into `(occupancy, tile_count, bb3d_ms)` rows.
    pub fn bb3d_samples(&self) -> Vec<(&[u32], usize, f64)> {
        let mut rows = Vec::new();
        for (i, (vcs, times)) in self.voxel_counts.iter().zip(&self.bb3d_time_ms).enumerate() {
            let tiles = self.chosen_tile_coords.get(i);
            for (j, (vc, &t)) in vcs.iter().zip(times).enumerate() {
                let count = tiles
                    .and_then(|s| s.get(j))
                    .map(|c| c.len())
                    .unwrap_or_else(|| vc.iter().filter(|&&c| c > 0).count());
                rows.push((vc.as_slice(), count, t));
            }
        }
        rows
    }
}

fn retain_by_mask<T>(v: &mut Vec<T>, keep: &[bool]) {
    let mut idx = 0;
    v.retain(|_| {
        let k = keep.get(idx).copied().unwrap_or(false);
        idx += 1;
        k
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_data() -> CalibrationData {
        let mut d = CalibrationData::empty(2, 1);
        d.scene_tokens = vec!["a".into(), "a".into(), "b".into(), "b".into(), "b".into()];
        d.voxel_counts = (0..5).map(|i| vec![vec![i, 1]]).collect();
        d.bb3d_time_ms = (0..5).map(|i| vec![i as f64]).collect();
        d.chosen_tile_coords = (0..5).map(|_| vec![vec![0, 1]]).collect();
        d
    }

    #[test]
    fn cleanup_drops_first_sample_of_each_scene() {
        let mut d = sample_data();
        d.cleanup();
        assert_eq!(d.scene_tokens, vec!["a", "b", "b"]);
        assert_eq!(d.bb3d_time_ms, vec![vec![1.0], vec![3.0], vec![4.0]]);
        assert_eq!(d.voxel_counts.len(), 3);
        assert_eq!(d.chosen_tile_coords.len(), 3);
    }

    #[test]
    fn validate_rejects_mismatched_tables() {
        let d = sample_data();
        assert!(d.validate(2, 1).is_ok());
        assert!(matches!(d.validate(3, 1), Err(AnytimeError::Configuration(_))));
        let mut bad = d.clone();
        bad.det_head_post_times_ms.push(0.0);
        assert!(bad.validate(2, 1).is_err());
    }

    #[test]
    fn missing_file_is_recoverable() {
        let dir = tempfile::tempdir().unwrap();
        let err = CalibrationData::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, AnytimeError::MissingCalibrationData { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn unknown_keys_are_ignored_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calib.json");
        let mut value = serde_json::to_value(sample_data()).unwrap();
        value["det_head_attr_skip_gains"] = serde_json::json!([0.1, 0.2]);
        std::fs::write(&path, value.to_string()).unwrap();
        let back = CalibrationData::load(&path).unwrap();
        assert_eq!(back, sample_data());
    }
}
