//! Data-collection mode: enumerate tile subsets and record measured stage times.

use super::CalibrationData;
use crate::error::{AnytimeError, Result};
use crate::tiles::{NonemptyTiles, SubsetId, TileId};

/// Measured stage times of one forced-subset run.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SweepTiming {
    pub filtering_ms: f64,
    pub bb3d_ms: f64,
    pub bb2d_ms: f64,
    pub head_pre_ms: f64,
    pub head_post_ms: f64,
}

/// Rotation windows swept for one frame: every contiguous window of sizes
/// `1..N-1` from every start index (wrapping), followed by the full set.
pub fn sweep_windows(nonempty: &NonemptyTiles) -> Vec<Vec<TileId>> {
    let tiles = nonempty.tiles();
    let n = tiles.len();
    let mut windows = Vec::with_capacity(n * n.saturating_sub(1) + 1);
    for size in 1..n {
        for start in 0..n {
            windows.push((0..size).map(|k| tiles[(start + k) % n]).collect());
        }
    }
    if n > 0 {
        windows.push(tiles.to_vec());
    }
    windows
}

/// Accumulates sweep measurements into a [`CalibrationData`].
///
/// Table entries are overwritten by the latest measurement of the same id.
#[derive(Clone, Debug)]
pub struct CalibrationRecorder {
    data: CalibrationData,
}

impl CalibrationRecorder {
    pub fn new(num_tiles: usize, num_det_heads: usize) -> Self {
        Self {
            data: CalibrationData::empty(num_tiles, num_det_heads),
        }
    }

    /// Open the per-sample series for a new frame.
    pub fn begin_sample(&mut self, scene_token: &str) {
        self.data.scene_tokens.push(scene_token.to_string());
        self.data.voxel_counts.push(Vec::new());
        self.data.bb3d_time_ms.push(Vec::new());
        self.data.chosen_tile_coords.push(Vec::new());
    }

    /// Record one run of `chosen` tiles on the current sample.
    pub fn record(
        &mut self,
        chosen: &[TileId],
        nonempty: &NonemptyTiles,
        heads: &[usize],
        timing: SweepTiming,
    ) -> Result<()> {
        let d = &mut self.data;
        let mut occupancy = vec![0u32; d.num_tiles];
        for &tile in chosen {
            let slot = occupancy.get_mut(tile).ok_or_else(|| {
                AnytimeError::config(format!("tile {tile} outside T={}", d.num_tiles))
            })?;
            *slot = nonempty.count_of(tile).unwrap_or(0);
        }
        let tid = SubsetId::try_encode(chosen.iter().copied())?;
        let hid = SubsetId::try_encode(heads.iter().copied())?;
        let tile_slot = tid
            .slot(d.bb2d_times_ms.len())
            .ok_or_else(|| AnytimeError::config(format!("tile subset id {} out of table", tid.0)))?;
        let head_slot = hid
            .slot(d.det_head_post_times_ms.len())
            .ok_or_else(|| AnytimeError::config(format!("head subset id {} out of table", hid.0)))?;
        let (Some(vcs), Some(times), Some(coords)) = (
            d.voxel_counts.last_mut(),
            d.bb3d_time_ms.last_mut(),
            d.chosen_tile_coords.last_mut(),
        ) else {
            return Err(AnytimeError::invalid_input("record called before begin_sample"));
        };
        vcs.push(occupancy);
        times.push(timing.bb3d_ms);
        coords.push(chosen.to_vec());
        d.filtering_times_ms.push(timing.filtering_ms);
        d.bb2d_times_ms[tile_slot] = timing.bb2d_ms;
        d.det_head_pre_times_ms[tile_slot] = timing.head_pre_ms;
        d.det_head_post_times_ms[head_slot] = timing.head_post_ms;
        Ok(())
    }

    pub fn finish(self) -> CalibrationData {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_wrap_and_end_with_full_set() {
        let nonempty = NonemptyTiles::from_parts(vec![1, 4, 6], vec![5, 5, 5]).unwrap();
        let w = sweep_windows(&nonempty);
        assert_eq!(w.len(), 3 * 2 + 1);
        assert_eq!(w[0], vec![1]);
        assert_eq!(w[5], vec![6, 1]);
        assert_eq!(w.last().unwrap(), &vec![1, 4, 6]);
        assert!(sweep_windows(&NonemptyTiles::default()).is_empty());
    }

    #[test]
    fn record_writes_tables_at_subset_ids() {
        let nonempty = NonemptyTiles::from_parts(vec![1, 2], vec![7, 9]).unwrap();
        let mut rec = CalibrationRecorder::new(4, 2);
        assert!(rec
            .record(&[1], &nonempty, &[0], SweepTiming::default())
            .is_err());
        rec.begin_sample("scene");
        let timing = SweepTiming {
            filtering_ms: 0.2,
            bb3d_ms: 5.0,
            bb2d_ms: 3.0,
            head_pre_ms: 1.0,
            head_post_ms: 2.0,
        };
        rec.record(&[2, 1], &nonempty, &[0, 1], timing).unwrap();
        let data = rec.finish();
        assert_eq!(data.voxel_counts, vec![vec![vec![0, 7, 9, 0]]]);
        assert_eq!(data.bb2d_times_ms[0b0110], 3.0);
        assert_eq!(data.det_head_pre_times_ms[0b0110], 1.0);
        assert_eq!(data.det_head_post_times_ms[0b11], 2.0);
        assert_eq!(data.chosen_tile_coords, vec![vec![vec![2, 1]]]);
        assert!(data.validate(4, 2).is_ok());
    }
}
