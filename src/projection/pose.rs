use crate::error::{AnytimeError, Result};
use crate::io::read_json_file;
use nalgebra::{Isometry3, Quaternion, Translation3, UnitQuaternion};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Sensor pose of one frame: LiDAR-to-ego calibration and ego-to-global pose.
///
/// Quaternions are stored `[w, x, y, z]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorPose {
    pub cs_translation: [f64; 3],
    pub cs_rotation: [f64; 4],
    pub ep_translation: [f64; 3],
    pub ep_rotation: [f64; 4],
}

impl Default for SensorPose {
    fn default() -> Self {
        Self::identity()
    }
}

impl SensorPose {
    pub fn identity() -> Self {
        Self {
            cs_translation: [0.0; 3],
            cs_rotation: [1.0, 0.0, 0.0, 0.0],
            ep_translation: [0.0; 3],
            ep_rotation: [1.0, 0.0, 0.0, 0.0],
        }
    }

    /// Ego pose with identity calibration, rotated by `yaw` around +z.
    pub fn from_ego_xy_yaw(x: f64, y: f64, yaw: f64) -> Self {
        let (s, c) = (0.5 * yaw).sin_cos();
        Self {
            ep_translation: [x, y, 0.0],
            ep_rotation: [c, 0.0, 0.0, s],
            ..Self::identity()
        }
    }

    /// Parse the 14-float layout
    /// `[cs_t(3), cs_q(4), ep_t(3), ep_q(4)]`.
    pub fn from_vector(v: &[f64]) -> Result<Self> {
        if v.len() != 14 {
            return Err(AnytimeError::invalid_input(format!(
                "pose vector has {} entries, expected 14",
                v.len()
            )));
        }
        let pose = Self {
            cs_translation: [v[0], v[1], v[2]],
            cs_rotation: [v[3], v[4], v[5], v[6]],
            ep_translation: [v[7], v[8], v[9]],
            ep_rotation: [v[10], v[11], v[12], v[13]],
        };
        for q in [pose.cs_rotation, pose.ep_rotation] {
            if q.iter().map(|c| c * c).sum::<f64>() < 1e-12 {
                return Err(AnytimeError::invalid_input("zero-norm pose quaternion"));
            }
        }
        Ok(pose)
    }

    pub fn to_vector(&self) -> [f64; 14] {
        let mut v = [0.0; 14];
        v[..3].copy_from_slice(&self.cs_translation);
        v[3..7].copy_from_slice(&self.cs_rotation);
        v[7..10].copy_from_slice(&self.ep_translation);
        v[10..].copy_from_slice(&self.ep_rotation);
        v
    }

    /// Rigid transform from the LiDAR frame to the global frame.
    pub fn lidar_to_global(&self) -> Isometry3<f64> {
        isometry(&self.ep_translation, &self.ep_rotation)
            * isometry(&self.cs_translation, &self.cs_rotation)
    }
}

fn isometry(t: &[f64; 3], q: &[f64; 4]) -> Isometry3<f64> {
    let rotation = UnitQuaternion::from_quaternion(Quaternion::new(q[0], q[1], q[2], q[3]));
    Isometry3::from_parts(Translation3::new(t[0], t[1], t[2]), rotation)
}

/// Per-sample pose record as exported alongside a recorded sequence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseRecord {
    pub cs_translation: [f64; 3],
    pub cs_rotation: [f64; 4],
    pub ep_translation: [f64; 3],
    pub ep_rotation: [f64; 4],
    /// Microseconds.
    pub timestamp: i64,
    pub scene: String,
}

impl PoseRecord {
    pub fn pose(&self) -> SensorPose {
        SensorPose {
            cs_translation: self.cs_translation,
            cs_rotation: self.cs_rotation,
            ep_translation: self.ep_translation,
            ep_rotation: self.ep_rotation,
        }
    }
}

/// Sample token → pose, timestamp and scene.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoseTable {
    pub records: HashMap<String, PoseRecord>,
}

impl PoseTable {
    pub fn load(path: &Path) -> Result<Self> {
        read_json_file(path)
    }

    pub fn get(&self, token: &str) -> Option<&PoseRecord> {
        self.records.get(token)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
