mod common;

use anytime_detector::backend::ManualClock;
use anytime_detector::calibration::{fit_linear, CalibrationData, TimePredictor};
use anytime_detector::config::CalibrationPaths;
use anytime_detector::synthetic::{SceneConfig, SyntheticScene};
use anytime_detector::tiles::SubsetId;
use anytime_detector::{AnytimeError, FrameOutput, PipelineConfig, RunSummary};
use common::fixtures::{
    init_logging, per_voxel_predictor, small_config, still_scene, synthetic_pipeline,
    TestPipeline,
};

const PERIOD_SEC: f64 = 0.05;

fn sweep(pipeline: &mut TestPipeline, frames: usize) -> CalibrationData {
    let scene = SyntheticScene::new(still_scene("calibration")).unwrap();
    let frames: Vec<_> = (0..frames).map(|i| scene.frame(i, 0.0, 100.0)).collect();
    pipeline.collect_calibration(&frames).unwrap()
}

fn calibrated_pipeline(clock: &ManualClock) -> TestPipeline {
    let mut pipeline = synthetic_pipeline(small_config(), clock);
    let data = sweep(&mut pipeline, 3);
    let mut cleaned = data.clone();
    cleaned.cleanup();
    let fit = fit_linear(&cleaned).unwrap();
    let predictor = TimePredictor::from_parts(&data, fit.checkpoint).unwrap();
    pipeline.with_predictor(predictor).unwrap()
}

fn run_frame(
    pipeline: &mut TestPipeline,
    clock: &ManualClock,
    scene: &SyntheticScene,
    index: usize,
    deadline_ms: f64,
) -> FrameOutput {
    let release = 100.0 + index as f64 * PERIOD_SEC;
    clock.set_sec(release);
    pipeline
        .process(&scene.frame(index, release, deadline_ms))
        .unwrap()
}

#[test]
fn calibration_sweep_records_every_rotation_window() {
    init_logging();
    let clock = ManualClock::new(0.0);
    let mut pipeline = synthetic_pipeline(small_config(), &clock);
    let data = sweep(&mut pipeline, 2);

    data.validate(8, 6).unwrap();
    assert_eq!(data.num_samples(), 2);
    // Objects occupy tiles 2, 4, 5 and 6: 4 * 3 windows plus the full set.
    assert_eq!(data.chosen_tile_coords[0][0], vec![2]);
    assert_eq!(data.chosen_tile_coords[0].len(), 13);
    assert_eq!(data.chosen_tile_coords[0][12], vec![2, 4, 5, 6]);
    assert_eq!(data.bb3d_time_ms[1].len(), 13);
    assert_eq!(data.filtering_times_ms.len(), 26);

    let pair = SubsetId::encode([2, 4]).0 as usize;
    assert!((data.bb2d_times_ms[pair] - 1.6).abs() < 1e-6);
    assert!((data.det_head_pre_times_ms[pair] - 1.0).abs() < 1e-6);
    // Car and truck heads active on the full set.
    assert!((data.det_head_post_times_ms[0b11] - 2.4).abs() < 1e-6);
    assert!((data.det_head_post_times_ms[0b01] - 1.7).abs() < 1e-6);
}

#[test]
fn generous_deadline_runs_every_tile_and_detects_every_object() {
    init_logging();
    let clock = ManualClock::new(0.0);
    let mut pipeline = calibrated_pipeline(&clock);
    let scene = SyntheticScene::new(still_scene("scene-a")).unwrap();

    let out = run_frame(&mut pipeline, &clock, &scene, 0, 100.0);
    let diag = &out.diagnostics;
    assert!(!diag.filtered);
    assert!(!diag.deadline_missed);
    assert!(diag.lateness_ms < 0.0);
    assert_eq!(diag.nonempty_tiles, vec![2, 4, 5, 6]);
    assert_eq!(diag.chosen_tiles_2, diag.nonempty_tiles);
    assert_eq!(diag.active_heads, vec![0, 1]);
    assert_eq!(out.detections.len(), 3);
    let predicted = diag.predicted_bb3d_ms.unwrap();
    assert!(
        (predicted - diag.measured_bb3d_ms).abs() < 0.25,
        "predicted {predicted} measured {}",
        diag.measured_bb3d_ms
    );
    assert!(diag.timing.get("bb3d").is_some());
    assert!(diag.timing.get("head_post").is_some());

    // History is projected into the next frame and merged away by NMS.
    let out = run_frame(&mut pipeline, &clock, &scene, 1, 100.0);
    assert_eq!(out.diagnostics.projected_detections, 3);
    assert_eq!(out.detections.len(), 3);
    assert!(out.detections.iter().all(|d| d.score >= 0.5));
}

#[test]
fn tight_deadline_rotates_over_all_tiles() {
    let clock = ManualClock::new(0.0);
    let mut pipeline = calibrated_pipeline(&clock);
    let scene = SyntheticScene::new(still_scene("scene-a")).unwrap();

    let mut visited = Vec::new();
    let mut frames = Vec::new();
    for i in 0..4 {
        let out = run_frame(&mut pipeline, &clock, &scene, i, 6.0);
        let diag = out.diagnostics;
        assert!(diag.filtered);
        assert_eq!(diag.chosen_tiles_2.len(), 1, "frame {i}: {:?}", diag.chosen_tiles_2);
        assert_eq!(diag.deadline_missed, diag.lateness_ms > 0.0);
        visited.extend(diag.chosen_tiles_2.iter().copied());
        frames.push(diag);
    }
    assert_eq!(visited, vec![2, 4, 5, 6]);
    assert_eq!(pipeline.context().scheduler.last_tile_coord(), Some(6));

    let summary = RunSummary::from_frames(&frames);
    assert_eq!(summary.frames, 4);
    assert_eq!(summary.filtered_frames, 4);
    assert_eq!(summary.chosen_tiles_2, vec![vec![2], vec![4], vec![5], vec![6]]);
}

#[test]
fn exhausted_budget_still_processes_one_tile_and_reports_the_miss() {
    let clock = ManualClock::new(0.0);
    let mut pipeline = calibrated_pipeline(&clock);
    let scene = SyntheticScene::new(still_scene("scene-a")).unwrap();

    let release = 100.0;
    let frame = scene.frame(0, release, 5.0);
    // Frame arrives 10 ms late.
    clock.set_sec(release + 0.010);
    let out = pipeline.process(&frame).unwrap();
    let diag = &out.diagnostics;
    assert!(diag.remaining_ms_at_schedule1 < 0.0);
    assert_eq!(diag.chosen_tiles_1, vec![2]);
    assert!(diag.deadline_missed);
    assert!(diag.lateness_ms > 5.0);
    assert_eq!(out.detections.len(), 1, "only the car in tile 2");
}

#[test]
fn scene_change_resets_history_and_rotation() {
    let clock = ManualClock::new(0.0);
    let mut pipeline = calibrated_pipeline(&clock);
    let scene_a = SyntheticScene::new(still_scene("scene-a")).unwrap();
    let scene_b = SyntheticScene::new(still_scene("scene-b")).unwrap();

    for i in 0..3 {
        let out = run_frame(&mut pipeline, &clock, &scene_a, i, 6.0);
        assert!(!out.diagnostics.scene_reset);
    }
    assert_eq!(pipeline.context().scheduler.last_tile_coord(), Some(5));
    assert_eq!(pipeline.context().projection.history().num_poses(), 3);

    let out = run_frame(&mut pipeline, &clock, &scene_b, 3, 6.0);
    let diag = &out.diagnostics;
    assert!(diag.scene_reset);
    assert_eq!(diag.projected_detections, 0);
    assert_eq!(diag.chosen_tiles_1, vec![2]);
    assert_eq!(pipeline.context().projection.history().num_poses(), 1);
}

#[test]
fn empty_frame_skips_model_stages_and_records_the_pose() {
    let clock = ManualClock::new(0.0);
    let mut pipeline = calibrated_pipeline(&clock);
    let empty = SyntheticScene::new(SceneConfig {
        objects: Vec::new(),
        ..still_scene("scene-a")
    })
    .unwrap();

    let out = run_frame(&mut pipeline, &clock, &empty, 0, 10.0);
    let diag = &out.diagnostics;
    assert!(diag.empty_input);
    assert!(out.detections.is_empty());
    assert!(!diag.deadline_missed);
    assert!(diag.timing.get("bb3d").is_none());
    let history = pipeline.context().projection.history();
    assert_eq!(history.num_poses(), 1);
    assert_eq!(history.num_records(), 0);
}

#[test]
fn missing_calibration_falls_back_to_the_sweep() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig {
        calibration: CalibrationPaths {
            data_path: dir.path().join("calib_data.json"),
            checkpoint_path: dir.path().join("time_pred_model.json"),
        },
        ..small_config()
    };
    let paths = config.calibration.clone();
    let clock = ManualClock::new(0.0);
    let mut pipeline = synthetic_pipeline(config, &clock);

    let err = pipeline.load_predictor().unwrap_err();
    assert!(matches!(err, AnytimeError::MissingCalibrationData { .. }));
    let scene = SyntheticScene::new(still_scene("scene-a")).unwrap();
    let frame = scene.frame(0, 0.0, 50.0);
    assert!(matches!(
        pipeline.process(&frame),
        Err(AnytimeError::Configuration(_))
    ));

    let data = sweep(&mut pipeline, 3);
    data.save(&paths.data_path).unwrap();
    let mut cleaned = data;
    cleaned.cleanup();
    fit_linear(&cleaned)
        .unwrap()
        .checkpoint
        .save(&paths.checkpoint_path)
        .unwrap();
    pipeline.load_predictor().unwrap();

    clock.set_sec(0.0);
    let out = pipeline.process(&frame).unwrap();
    assert_eq!(out.detections.len(), 3);
}

#[test]
fn predictor_calibrated_for_another_tiling_is_rejected() {
    let clock = ManualClock::new(0.0);
    let pipeline = synthetic_pipeline(small_config(), &clock);
    let wrong = per_voxel_predictor(16, 6, 1.0, 0.0, 0.0);
    assert!(matches!(
        pipeline.with_predictor(wrong),
        Err(AnytimeError::Configuration(_))
    ));
}
