use anytime_detector::backend::{CpuBackend, ManualClock};
use anytime_detector::calibration::{
    CalibrationTables, RegressionModel, StandardScaler, TimePredictor,
};
use anytime_detector::synthetic::{SceneConfig, SyntheticModel, SyntheticModelConfig};
use anytime_detector::tiles::table_len;
use anytime_detector::{AnytimePipeline, PipelineConfig};

pub type TestPipeline = AnytimePipeline<CpuBackend<ManualClock>, SyntheticModel>;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Predictor with `bb3d = ms_per_voxel * voxels`, constant post-bb3d time
/// and a head-post table of `head_post_ms` everywhere.
pub fn per_voxel_predictor(
    t: usize,
    heads: usize,
    ms_per_voxel: f64,
    post_bb3d_ms: f64,
    head_post_ms: f64,
) -> TimePredictor {
    let tables = CalibrationTables::new(
        t,
        heads,
        0.0,
        vec![post_bb3d_ms - head_post_ms; table_len(t)],
        vec![head_post_ms; table_len(heads)],
    )
    .unwrap();
    let model = RegressionModel::Linear {
        weights: vec![ms_per_voxel; t],
        tile_count_weight: 0.0,
        bias: 0.0,
    };
    TimePredictor::new(StandardScaler::identity(t), model, tables).unwrap()
}

/// Eight 64-voxel-wide tiles over the default range.
pub fn small_config() -> PipelineConfig {
    PipelineConfig {
        tile_count: 8,
        ..Default::default()
    }
}

/// Scene with a standing ego vehicle, no ground, and the default objects.
pub fn still_scene(token: &str) -> SceneConfig {
    SceneConfig {
        scene_token: token.to_string(),
        ego_speed_mps: 0.0,
        ground_spacing: 0.0,
        ..Default::default()
    }
}

/// Pipeline whose model charges its costs to `clock`.
pub fn synthetic_pipeline(config: PipelineConfig, clock: &ManualClock) -> TestPipeline {
    let model = SyntheticModel::new(&config, SyntheticModelConfig::default())
        .unwrap()
        .with_clock(clock.clone());
    AnytimePipeline::new(config, CpuBackend::new(clock.clone()), model).unwrap()
}
