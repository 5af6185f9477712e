//! Per-frame diagnostics, stage timings and run statistics.
//!
//! All reports serialize with camelCase keys and can be written with
//! [`write_json_file`](crate::io::write_json_file).

mod frame;
mod run;
mod timing;

pub use frame::FrameDiagnostics;
pub use run::RunSummary;
pub use timing::{StageTiming, TimingBreakdown};
