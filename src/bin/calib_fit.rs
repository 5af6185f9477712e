use anytime_detector::calibration::{fit_linear, CalibrationData, FitReport};
use std::env;
use std::path::PathBuf;

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn usage() -> String {
    "Usage: calib_fit <calib_data.json> <checkpoint_out.json>".to_string()
}

fn run() -> Result<(), String> {
    let mut args = env::args().skip(1);
    let data_path = PathBuf::from(args.next().ok_or_else(usage)?);
    let ckpt_path = PathBuf::from(args.next().ok_or_else(usage)?);

    let mut data = CalibrationData::load(&data_path).map_err(|e| e.to_string())?;
    data.validate(data.num_tiles, data.num_det_heads)
        .map_err(|e| e.to_string())?;
    let raw = data.num_samples();
    data.cleanup();
    println!(
        "Calibration data: T={} heads={} samples={} ({} after dropping scene warm-up)",
        data.num_tiles,
        data.num_det_heads,
        raw,
        data.num_samples()
    );

    let report = fit_linear(&data).map_err(|e| e.to_string())?;
    print_residuals(&report);

    report
        .checkpoint
        .save(&ckpt_path)
        .map_err(|e| e.to_string())?;
    println!("\nCheckpoint written to {}", ckpt_path.display());
    Ok(())
}

fn print_residuals(report: &FitReport) {
    let s = &report.stats;
    println!(
        "Residuals (measured - predicted, ms): n={} mean={:.4} min={:.4} max={:.4} rmse={:.4}",
        s.samples, s.mean_ms, s.min_ms, s.max_ms, s.rmse_ms
    );
    for (i, r) in report.residuals.iter().enumerate() {
        println!("  {i:>5}: {r:+.4}");
    }
}
