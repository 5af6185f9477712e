use serde::{Deserialize, Serialize};

/// Timing entry for one pipeline stage, with the scheduler's prediction when
/// one was made for that stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTiming {
    pub label: String,
    pub elapsed_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicted_ms: Option<f64>,
}

impl StageTiming {
    pub fn new(label: impl Into<String>, elapsed_ms: f64) -> Self {
        Self {
            label: label.into(),
            elapsed_ms,
            predicted_ms: None,
        }
    }
}

/// Per-frame timing trace, in stage order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingBreakdown {
    pub total_ms: f64,
    pub stages: Vec<StageTiming>,
}

impl TimingBreakdown {
    pub fn push(&mut self, label: impl Into<String>, elapsed_ms: f64) {
        self.stages.push(StageTiming::new(label, elapsed_ms));
    }

    pub fn push_predicted(&mut self, label: impl Into<String>, elapsed_ms: f64, predicted_ms: f64) {
        self.stages.push(StageTiming {
            predicted_ms: Some(predicted_ms),
            ..StageTiming::new(label, elapsed_ms)
        });
    }

    /// Elapsed time of the first stage named `label`.
    pub fn get(&self, label: &str) -> Option<f64> {
        self.stages
            .iter()
            .find(|s| s.label == label)
            .map(|s| s.elapsed_ms)
    }

    /// Sum of all stage times.
    pub fn stage_sum_ms(&self) -> f64 {
        self.stages.iter().map(|s| s.elapsed_ms).sum()
    }
}
