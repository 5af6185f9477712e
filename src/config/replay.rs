use super::PipelineConfig;
use crate::error::{AnytimeError, Result};
use crate::io::read_json_file;
use crate::synthetic::{SceneConfig, SyntheticModelConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayOutputConfig {
    /// Per-frame diagnostics and run summary.
    pub report_json: Option<PathBuf>,
}

/// Configuration of the `anytime_replay` tool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    pub pipeline: PipelineConfig,
    pub model: SyntheticModelConfig,
    /// Played back to back; each token change resets history.
    pub scenes: Vec<SceneConfig>,
    pub frames_per_scene: usize,
    /// Relative deadline of every frame (ms after its release).
    pub deadline_ms: f64,
    /// Frames of the first scene swept when no calibration data exists yet.
    pub calibration_frames: usize,
    pub output: ReplayOutputConfig,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            model: SyntheticModelConfig::default(),
            scenes: vec![SceneConfig::default()],
            frames_per_scene: 40,
            deadline_ms: 30.0,
            calibration_frames: 8,
            output: ReplayOutputConfig::default(),
        }
    }
}

impl ReplayConfig {
    pub fn validate(&self) -> Result<()> {
        self.pipeline.validate()?;
        if self.scenes.is_empty() || self.frames_per_scene == 0 {
            return Err(AnytimeError::config("replay needs at least one scene and frame"));
        }
        if !(self.deadline_ms > 0.0) {
            return Err(AnytimeError::config(format!(
                "deadline_ms {} must be positive",
                self.deadline_ms
            )));
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<ReplayConfig> {
    let config: ReplayConfig = read_json_file(path)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: ReplayConfig = serde_json::from_str(
            r#"{ "deadline_ms": 12.5, "pipeline": { "tile_count": 8 },
                 "output": { "report_json": "out/report.json" } }"#,
        )
        .unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.pipeline.tile_count, 8);
        assert_eq!(cfg.pipeline.num_det_heads, 6);
        assert_eq!(cfg.deadline_ms, 12.5);
        assert_eq!(cfg.scenes.len(), 1);
        assert_eq!(
            cfg.output.report_json.as_deref(),
            Some(Path::new("out/report.json"))
        );
    }

    #[test]
    fn rejects_nonpositive_deadline() {
        let cfg = ReplayConfig {
            deadline_ms: 0.0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(AnytimeError::Configuration(_))));
    }
}
