//! History of past detections and their motion-compensated projection.
//!
//! - `pose`: sensor poses and the per-sample pose table.
//! - `history`: poses and detection records with index-consistent eviction.
//! - `engine`: recording policy, freshness decay and rigid-motion projection.
//! - `nms`: rotated BEV IoU and the greedy NMS that fuses projections.

mod engine;
mod history;
pub mod nms;
mod pose;

pub use engine::{
    split_by_head, transform_box, ProjectionEngine, DEFAULT_DECAY_OFFSET, DEFAULT_HORIZON_US,
};
pub use history::{DetectionRecord, PoseHistory};
pub use nms::{bev_iou, NmsParams};
pub use pose::{PoseRecord, PoseTable, SensorPose};
