use crate::projection::SensorPose;
use serde::{Deserialize, Serialize};

/// One LiDAR return in the sensor frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LidarPoint {
    pub xyz: [f32; 3],
    pub intensity: f32,
}

impl LidarPoint {
    pub fn new(x: f32, y: f32, z: f32, intensity: f32) -> Self {
        Self {
            xyz: [x, y, z],
            intensity,
        }
    }
}

/// Oriented 3D box: centre, size, heading (rad, around +z) and planar velocity (m/s).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Box3d {
    pub center: [f32; 3],
    pub size: [f32; 3],
    pub heading: f32,
    pub velocity: [f32; 2],
}

impl Box3d {
    /// Build from the 9-float layout `[x, y, z, dx, dy, dz, heading, vx, vy]`.
    pub fn from_array(v: [f32; 9]) -> Self {
        Self {
            center: [v[0], v[1], v[2]],
            size: [v[3], v[4], v[5]],
            heading: v[6],
            velocity: [v[7], v[8]],
        }
    }

    pub fn to_array(&self) -> [f32; 9] {
        [
            self.center[0],
            self.center[1],
            self.center[2],
            self.size[0],
            self.size[1],
            self.size[2],
            self.heading,
            self.velocity[0],
            self.velocity[1],
        ]
    }

    /// Corners of the bird's-eye-view footprint, counter-clockwise.
    pub fn bev_corners(&self) -> [[f32; 2]; 4] {
        let (s, c) = self.heading.sin_cos();
        let hx = 0.5 * self.size[0];
        let hy = 0.5 * self.size[1];
        let local = [[hx, hy], [-hx, hy], [-hx, -hy], [hx, -hy]];
        local.map(|[lx, ly]| {
            [
                self.center[0] + c * lx - s * ly,
                self.center[1] + s * lx + c * ly,
            ]
        })
    }

    pub fn bev_area(&self) -> f32 {
        self.size[0] * self.size[1]
    }
}

/// A scored, labelled box. Labels are 1-based class ids as emitted by the heads.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: Box3d,
    pub score: f32,
    pub label: u32,
}

/// Detections of one frame (or of one detection head).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionSet {
    pub detections: Vec<Detection>,
}

impl DetectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
        self.detections.iter()
    }

    pub fn push(&mut self, det: Detection) {
        self.detections.push(det);
    }

    pub fn extend(&mut self, other: DetectionSet) {
        self.detections.extend(other.detections);
    }

    /// Detections with `score > threshold`.
    pub fn above(&self, threshold: f32) -> DetectionSet {
        self.iter().filter(|d| d.score > threshold).copied().collect()
    }
}

impl FromIterator<Detection> for DetectionSet {
    fn from_iter<I: IntoIterator<Item = Detection>>(iter: I) -> Self {
        Self {
            detections: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for DetectionSet {
    type Item = Detection;
    type IntoIter = std::vec::IntoIter<Detection>;

    fn into_iter(self) -> Self::IntoIter {
        self.detections.into_iter()
    }
}

/// Everything the pipeline receives for one frame.
#[derive(Clone, Debug)]
pub struct FrameInput {
    pub points: Vec<LidarPoint>,
    pub pose: SensorPose,
    /// Sensor timestamp in microseconds.
    pub timestamp_us: i64,
    /// Driving-sequence identifier; a change resets all history.
    pub scene_token: String,
    /// Absolute host-clock deadline in seconds.
    pub deadline_sec: f64,
}
