use super::FrameDiagnostics;
use crate::tiles::TileId;
use serde::Serialize;

/// Aggregate of a replay run.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub frames: usize,
    pub deadlines_missed: usize,
    pub schedule3_shortfalls: usize,
    pub empty_frames: usize,
    pub filtered_frames: usize,
    pub mean_predicted_bb3d_ms: f64,
    pub mean_measured_bb3d_ms: f64,
    pub mean_lateness_ms: f64,
    pub nonempty_tiles: Vec<Vec<TileId>>,
    pub chosen_tiles_1: Vec<Vec<TileId>>,
    pub chosen_tiles_2: Vec<Vec<TileId>>,
}

impl RunSummary {
    pub fn from_frames(frames: &[FrameDiagnostics]) -> Self {
        let mut s = RunSummary {
            frames: frames.len(),
            ..Default::default()
        };
        let mut bb3d_pairs = 0usize;
        for f in frames {
            s.deadlines_missed += f.deadline_missed as usize;
            s.schedule3_shortfalls += f.schedule3.map_or(0, |c| c.shortfall as usize);
            s.empty_frames += f.empty_input as usize;
            s.filtered_frames += f.filtered as usize;
            s.mean_lateness_ms += f.lateness_ms;
            if let Some(pred) = f.predicted_bb3d_ms {
                s.mean_predicted_bb3d_ms += pred;
                s.mean_measured_bb3d_ms += f.measured_bb3d_ms;
                bb3d_pairs += 1;
            }
            s.nonempty_tiles.push(f.nonempty_tiles.clone());
            s.chosen_tiles_1.push(f.chosen_tiles_1.clone());
            s.chosen_tiles_2.push(f.chosen_tiles_2.clone());
        }
        if bb3d_pairs > 0 {
            s.mean_predicted_bb3d_ms /= bb3d_pairs as f64;
            s.mean_measured_bb3d_ms /= bb3d_pairs as f64;
        }
        if !frames.is_empty() {
            s.mean_lateness_ms /= frames.len() as f64;
        }
        s
    }

    /// Summary excluding the first frame, whose timings include warm-up.
    pub fn without_warmup(frames: &[FrameDiagnostics]) -> Self {
        Self::from_frames(frames.get(1..).unwrap_or(&[]))
    }

    pub fn deadline_miss_rate(&self) -> f64 {
        if self.frames == 0 {
            0.0
        } else {
            self.deadlines_missed as f64 / self.frames as f64
        }
    }
}
