mod common;

use anytime_detector::calibration::{
    fit_linear, percentile_lower, CalibrationData, CalibrationTables, StandardScaler,
    TimePredictor,
};
use anytime_detector::tiles::{table_len, SubsetId};
use anytime_detector::AnytimeError;
use common::fixtures::init_logging;

/// bb3d = 0.02 ms per voxel + 0.5 ms per tile + 1 ms, over two scenes.
fn linear_sweep() -> CalibrationData {
    let mut d = CalibrationData::empty(4, 2);
    let frames = [[120u32, 0, 40, 300], [80, 60, 0, 200], [10, 20, 30, 40], [0, 0, 500, 5]];
    for (i, counts) in frames.iter().enumerate() {
        d.scene_tokens.push(if i < 2 { "s1" } else { "s2" }.to_string());
        let nonempty: Vec<usize> = (0..4).filter(|&t| counts[t] > 0).collect();
        let mut occs = Vec::new();
        let mut times = Vec::new();
        let mut chosen = Vec::new();
        for size in 1..=nonempty.len() {
            for start in 0..nonempty.len() {
                let tiles: Vec<usize> =
                    (0..size).map(|k| nonempty[(start + k) % nonempty.len()]).collect();
                let mut occ = vec![0u32; 4];
                for &t in &tiles {
                    occ[t] = counts[t];
                }
                let voxels: u32 = occ.iter().sum();
                times.push(0.02 * voxels as f64 + 0.5 * tiles.len() as f64 + 1.0);
                occs.push(occ);
                chosen.push(tiles);
            }
        }
        d.voxel_counts.push(occs);
        d.bb3d_time_ms.push(times);
        d.chosen_tile_coords.push(chosen);
    }
    d.filtering_times_ms = (1..=100).map(|v| v as f64 * 0.01).collect();
    d
}

#[test]
fn head_post_lookup_uses_the_bit_encoded_head_set() {
    let mut head_post = vec![0.0; table_len(3)];
    head_post[6] = 12.4;
    head_post[7] = 15.0;
    let tables = CalibrationTables::new(2, 3, 0.0, vec![0.0; 4], head_post).unwrap();
    let p = TimePredictor::new(
        StandardScaler::identity(2),
        anytime_detector::calibration::RegressionModel::Linear {
            weights: vec![0.0; 2],
            tile_count_weight: 0.0,
            bias: 0.0,
        },
        tables,
    )
    .unwrap();
    assert_eq!(SubsetId::encode([1, 2]), SubsetId(6));
    assert_eq!(p.predict_final_req_time_ms(&[1, 2]).unwrap(), 12.4);
    assert_eq!(p.predict_final_req_time_ms(&[2, 1]).unwrap(), 12.4);
    assert_eq!(p.tables().head_post_wcet_ms(), 15.0);
}

#[test]
fn filtering_wcet_is_the_lower_99th_percentile() {
    let samples: Vec<f64> = (1..=100).rev().map(|v| v as f64).collect();
    assert_eq!(percentile_lower(&samples, 0.99), Some(99.0));
    assert_eq!(percentile_lower(&[], 0.99), None);

    let tables = CalibrationTables::from_data(&linear_sweep()).unwrap();
    assert!((tables.filtering_wcet_ms() - 0.99).abs() < 1e-12);
}

#[test]
fn table_size_mismatch_is_a_configuration_error() {
    let mut d = linear_sweep();
    d.bb2d_times_ms.pop();
    assert!(matches!(
        CalibrationTables::from_data(&d),
        Err(AnytimeError::Configuration(_))
    ));
    assert!(matches!(
        linear_sweep().validate(5, 2),
        Err(AnytimeError::Configuration(_))
    ));
}

#[test]
fn fit_save_load_predicts_the_recorded_times() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let data_path = dir.path().join("calib/calib_data.json");
    let ckpt_path = dir.path().join("calib/time_pred_model.json");

    let data = linear_sweep();
    data.save(&data_path).unwrap();
    let mut cleaned = CalibrationData::load(&data_path).unwrap();
    assert_eq!(cleaned, data);
    cleaned.cleanup();
    assert_eq!(cleaned.num_samples(), 2);

    let fit = fit_linear(&cleaned).unwrap();
    assert!(fit.stats.rmse_ms < 1e-6, "rmse {}", fit.stats.rmse_ms);
    fit.checkpoint.save(&ckpt_path).unwrap();

    let p = TimePredictor::load(&data_path, &ckpt_path).unwrap();
    let got = p
        .predict(&[vec![0.0, 100.0, 0.0, 50.0]], &[2])
        .unwrap();
    let expected = 0.02 * 150.0 + 0.5 * 2.0 + 1.0;
    assert!((got[0] - expected).abs() < 1e-6, "{} vs {expected}", got[0]);
}

#[test]
fn absent_data_file_reports_its_path() {
    let dir = tempfile::tempdir().unwrap();
    let data_path = dir.path().join("missing.json");
    let err = TimePredictor::load(&data_path, &dir.path().join("ckpt.json")).unwrap_err();
    match err {
        AnytimeError::MissingCalibrationData { path } => assert_eq!(path, data_path),
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn unknown_keys_in_the_data_file_are_ignored() {
    let mut value = serde_json::to_value(CalibrationData::empty(1, 1)).unwrap();
    value["det_head_attr_skip_gains"] = serde_json::json!([0.1, 0.2]);
    let d: CalibrationData = serde_json::from_value(value).unwrap();
    d.validate(1, 1).unwrap();
}
