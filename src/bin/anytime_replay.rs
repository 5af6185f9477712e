use anytime_detector::backend::{CpuBackend, HostClock, ManualClock};
use anytime_detector::calibration::fit_linear;
use anytime_detector::config::replay::{self, ReplayConfig};
use anytime_detector::diagnostics::{FrameDiagnostics, RunSummary};
use anytime_detector::io::write_json_file;
use anytime_detector::synthetic::{SyntheticModel, SyntheticScene};
use anytime_detector::{AnytimeError, AnytimePipeline};
use serde::Serialize;
use std::env;
use std::path::Path;

type Pipeline = AnytimePipeline<CpuBackend<ManualClock>, SyntheticModel>;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplayReport<'a> {
    summary: &'a RunSummary,
    frames: &'a [FrameDiagnostics],
}

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn usage() -> String {
    "Usage: anytime_replay <config.json>".to_string()
}

fn run() -> Result<(), String> {
    let config_path = env::args().nth(1).ok_or_else(usage)?;
    let config = replay::load_config(Path::new(&config_path)).map_err(|e| e.to_string())?;

    let clock = ManualClock::new(0.0);
    let model = SyntheticModel::new(&config.pipeline, config.model.clone())
        .map_err(|e| e.to_string())?
        .with_clock(clock.clone());
    let mut pipeline = AnytimePipeline::new(
        config.pipeline.clone(),
        CpuBackend::new(clock.clone()),
        model,
    )
    .map_err(|e| e.to_string())?;

    ensure_predictor(&mut pipeline, &config)?;

    let mut frames = Vec::new();
    let mut release_sec = 1000.0;
    for scene_cfg in &config.scenes {
        let scene = SyntheticScene::new(scene_cfg.clone()).map_err(|e| e.to_string())?;
        let period_sec = scene_cfg.frame_period_us as f64 * 1e-6;
        for i in 0..config.frames_per_scene {
            // A frame still running at its successor's release delays it.
            clock.set_sec(clock.now_sec().max(release_sec));
            let frame = scene.frame(i, release_sec, config.deadline_ms);
            let out = pipeline.process(&frame).map_err(|e| e.to_string())?;
            frames.push(out.diagnostics);
            release_sec += period_sec;
        }
    }

    let summary = RunSummary::without_warmup(&frames);
    print_text_summary(&summary, &frames);

    if let Some(path) = &config.output.report_json {
        let report = ReplayReport {
            summary: &summary,
            frames: &frames,
        };
        write_json_file(path, &report).map_err(|e| e.to_string())?;
        println!("\nJSON report written to {}", path.display());
    }
    Ok(())
}

/// Load the predictor, or sweep, fit and save one when no calibration exists.
fn ensure_predictor(pipeline: &mut Pipeline, config: &ReplayConfig) -> Result<(), String> {
    match pipeline.load_predictor() {
        Ok(()) => return Ok(()),
        Err(AnytimeError::MissingCalibrationData { path }) => {
            println!(
                "No calibration data at {}; sweeping {} frames",
                path.display(),
                config.calibration_frames
            );
        }
        Err(err) => return Err(err.to_string()),
    }

    let first = config.scenes.first().ok_or("no scenes configured")?;
    let scene = SyntheticScene::new(first.clone()).map_err(|e| e.to_string())?;
    let frames: Vec<_> = (0..config.calibration_frames)
        .map(|i| scene.frame(i, 0.0, config.deadline_ms))
        .collect();
    let data = pipeline
        .collect_calibration(&frames)
        .map_err(|e| e.to_string())?;
    let paths = &config.pipeline.calibration;
    data.save(&paths.data_path).map_err(|e| e.to_string())?;

    let mut cleaned = data;
    cleaned.cleanup();
    let fit = fit_linear(&cleaned).map_err(|e| e.to_string())?;
    println!(
        "Fitted bb3d model on {} samples: residual mean={:.3} ms rmse={:.3} ms",
        fit.stats.samples, fit.stats.mean_ms, fit.stats.rmse_ms
    );
    fit.checkpoint
        .save(&paths.checkpoint_path)
        .map_err(|e| e.to_string())?;
    pipeline.load_predictor().map_err(|e| e.to_string())
}

fn print_text_summary(summary: &RunSummary, frames: &[FrameDiagnostics]) {
    println!("Replay summary (first frame excluded)");
    println!("  frames: {}", summary.frames);
    println!(
        "  deadlines missed: {} ({:.1}%)",
        summary.deadlines_missed,
        100.0 * summary.deadline_miss_rate()
    );
    println!("  schedule3 shortfalls: {}", summary.schedule3_shortfalls);
    println!(
        "  empty frames: {}  filtered frames: {}",
        summary.empty_frames, summary.filtered_frames
    );
    println!(
        "  bb3d ms: predicted={:.3} measured={:.3}",
        summary.mean_predicted_bb3d_ms, summary.mean_measured_bb3d_ms
    );
    println!("  mean lateness ms: {:.3}", summary.mean_lateness_ms);

    println!("\nFrames");
    for f in frames {
        println!(
            "  #{:<3} {} tiles {:?} -> {:?} dets={} (proj={}) lateness={:.3} ms{}",
            f.frame_index,
            f.scene_token,
            f.chosen_tiles_1,
            f.chosen_tiles_2,
            f.output_detections,
            f.projected_detections,
            f.lateness_ms,
            if f.deadline_missed { " MISSED" } else { "" }
        );
    }
}
