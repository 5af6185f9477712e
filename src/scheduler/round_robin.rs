use super::CandidateTable;
use crate::calibration::TimePredictor;
use crate::error::Result;
use crate::tiles::{NonemptyTiles, TileId};
use log::{debug, warn};
use serde::Serialize;

/// Milliseconds left before `deadline_sec` at host time `now_sec`.
pub fn remaining_time_ms(deadline_sec: f64, now_sec: f64) -> f64 {
    (deadline_sec - now_sec) * 1000.0
}

/// Tile selection for one frame, refined in place by `schedule2`.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleDecision {
    pub chosen_tile_coords: Vec<TileId>,
    /// Predicted end-to-end time of every candidate size (ms).
    pub predicted_stage_times: Vec<f64>,
    pub remaining_time_budget_ms: f64,
    /// False when the whole nonempty set runs unfiltered.
    pub filtered: bool,
    /// Predicted bb3d time of the chosen candidate.
    pub predicted_bb3d_ms: Option<f64>,
    #[serde(skip)]
    candidates: CandidateTable,
    #[serde(skip)]
    post_bb3d_ms: Vec<f64>,
}

impl ScheduleDecision {
    pub fn is_empty(&self) -> bool {
        self.chosen_tile_coords.is_empty()
    }

    /// Rotated order the candidates were built from.
    pub fn rotated_order(&self) -> &[TileId] {
        self.candidates.order()
    }

    /// Predicted post-bb3d time of the currently chosen subset.
    pub fn predicted_post_bb3d_ms(&self) -> Option<f64> {
        let k = self.chosen_tile_coords.len();
        k.checked_sub(1).and_then(|i| self.post_bb3d_ms.get(i).copied())
    }
}

/// Result of the non-authoritative final check.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule3Check {
    pub remaining_ms: f64,
    pub required_ms: f64,
    pub shortfall: bool,
}

/// Round-robin tile scheduler. The only state carried across frames is the
/// last tile processed by a filtered frame.
#[derive(Clone, Debug)]
pub struct RoundRobinScheduler {
    tile_count: usize,
    last_tile_coord: Option<TileId>,
}

impl RoundRobinScheduler {
    pub fn new(tile_count: usize) -> Self {
        Self {
            tile_count,
            last_tile_coord: None,
        }
    }

    pub fn tile_count(&self) -> usize {
        self.tile_count
    }

    pub fn last_tile_coord(&self) -> Option<TileId> {
        self.last_tile_coord
    }

    pub fn set_last_tile_coord(&mut self, last: Option<TileId>) {
        self.last_tile_coord = last;
    }

    /// Back to "start from the beginning".
    pub fn reset(&mut self) {
        self.last_tile_coord = None;
    }

    /// Choose the largest rotated prefix whose predicted total time fits in
    /// `remaining_ms`. At least one tile is always chosen when any exists.
    pub fn schedule1(
        &mut self,
        nonempty: &NonemptyTiles,
        predictor: &TimePredictor,
        remaining_ms: f64,
    ) -> Result<ScheduleDecision> {
        if nonempty.is_empty() {
            debug!("schedule1: no nonempty tiles");
            return Ok(ScheduleDecision {
                remaining_time_budget_ms: remaining_ms,
                ..Default::default()
            });
        }
        let candidates = CandidateTable::build(nonempty, self.last_tile_coord, self.tile_count)?;
        let pred = predictor.predict_total_req_time_ms(
            candidates.occupancies(),
            candidates.tile_counts(),
            candidates.ids(),
        )?;
        let n = candidates.len();
        let fits = |i: usize| pred.total_ms[i] <= remaining_ms;

        let (chosen_tile_coords, size, filtered) = if fits(n - 1) {
            (nonempty.tiles().to_vec(), n, false)
        } else {
            let size = (0..n).rev().find(|&i| fits(i)).map_or(1, |i| i + 1);
            let chosen = candidates.prefix(size).to_vec();
            self.last_tile_coord = chosen.last().copied();
            (chosen, size, true)
        };
        debug!(
            "schedule1: remaining {:.3} ms, chose {}/{} tiles {:?} (filtered={})",
            remaining_ms, size, n, chosen_tile_coords, filtered
        );
        Ok(ScheduleDecision {
            chosen_tile_coords,
            remaining_time_budget_ms: remaining_ms,
            filtered,
            predicted_bb3d_ms: pred.bb3d_ms.get(size - 1).copied(),
            predicted_stage_times: pred.total_ms,
            post_bb3d_ms: pred.post_bb3d_ms,
            candidates,
        })
    }

    /// Re-check after the 3D backbone. Shrinks the chosen subset to the
    /// largest smaller prefix whose post-bb3d time fits; never grows it.
    /// Returns true when the subset changed.
    pub fn schedule2(&mut self, decision: &mut ScheduleDecision, remaining_ms: f64) -> bool {
        let k = decision.chosen_tile_coords.len();
        decision.remaining_time_budget_ms = remaining_ms;
        if k == 0 || decision.post_bb3d_ms.len() < k {
            return false;
        }
        let fits = |i: usize| decision.post_bb3d_ms[i] <= remaining_ms;
        if fits(k - 1) {
            return false;
        }
        let size = (0..k - 1).rev().find(|&i| fits(i)).map_or(1, |i| i + 1);
        let chosen = decision.candidates.prefix(size).to_vec();
        self.last_tile_coord = chosen.last().copied();
        let changed = chosen != decision.chosen_tile_coords;
        debug!(
            "schedule2: remaining {:.3} ms, shrink {} -> {} tiles {:?}",
            remaining_ms, k, size, chosen
        );
        decision.chosen_tile_coords = chosen;
        decision.filtered = true;
        changed
    }

    /// Compare the remaining time with the head-post time of the active
    /// heads. Diagnostic only.
    pub fn schedule3(
        &self,
        predictor: &TimePredictor,
        heads: &[usize],
        remaining_ms: f64,
    ) -> Result<Schedule3Check> {
        let required_ms = predictor.predict_final_req_time_ms(heads)?;
        let shortfall = remaining_ms < required_ms;
        if shortfall {
            warn!(
                "schedule3: remaining {:.3} ms < required {:.3} ms for heads {:?}",
                remaining_ms, required_ms, heads
            );
        }
        Ok(Schedule3Check {
            remaining_ms,
            required_ms,
            shortfall,
        })
    }
}
