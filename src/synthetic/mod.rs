//! Deterministic driving sequences and a geometric stand-in model.
//!
//! Used by the `anytime_replay` tool and the integration tests to exercise the
//! scheduler under a reproducible clock: [`SyntheticScene`] produces LiDAR
//! frames of boxes moving past a driving ego vehicle, and [`SyntheticModel`]
//! detects them while charging simulated kernel costs to a
//! [`ManualClock`](crate::backend::ManualClock).

mod model;
mod scene;

pub use model::{CostModel, PillarCluster, SyntheticModel, SyntheticModelConfig};
pub use scene::{SceneConfig, SyntheticObject, SyntheticScene};
