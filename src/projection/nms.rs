//! Rotated bird's-eye-view IoU and greedy NMS used to fuse fresh and
//! projected detections.

use crate::types::{Box3d, Detection, DetectionSet};

/// NMS limits.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NmsParams {
    pub iou_threshold: f32,
    /// Candidates kept (by score) before suppression.
    pub pre_max_size: usize,
    /// Detections kept after suppression.
    pub post_max_size: usize,
}

fn cross(o: [f64; 2], a: [f64; 2], b: [f64; 2]) -> f64 {
    (a[0] - o[0]) * (b[1] - o[1]) - (a[1] - o[1]) * (b[0] - o[0])
}

fn polygon_area(poly: &[[f64; 2]]) -> f64 {
    let n = poly.len();
    if n < 3 {
        return 0.0;
    }
    let mut acc = 0.0;
    for i in 0..n {
        let a = poly[i];
        let b = poly[(i + 1) % n];
        acc += a[0] * b[1] - a[1] * b[0];
    }
    0.5 * acc.abs()
}

fn line_intersection(p1: [f64; 2], p2: [f64; 2], a: [f64; 2], b: [f64; 2]) -> [f64; 2] {
    let d1 = cross(a, b, p1);
    let d2 = cross(a, b, p2);
    let t = d1 / (d1 - d2);
    [p1[0] + t * (p2[0] - p1[0]), p1[1] + t * (p2[1] - p1[1])]
}

/// Sutherland–Hodgman clip of `subject` by the convex CCW polygon `clip`.
fn clip_polygon(subject: &[[f64; 2]], clip: &[[f64; 2]]) -> Vec<[f64; 2]> {
    let mut output = subject.to_vec();
    for i in 0..clip.len() {
        if output.is_empty() {
            break;
        }
        let a = clip[i];
        let b = clip[(i + 1) % clip.len()];
        let input = std::mem::take(&mut output);
        for j in 0..input.len() {
            let cur = input[j];
            let prev = input[(j + input.len() - 1) % input.len()];
            let cur_in = cross(a, b, cur) >= 0.0;
            let prev_in = cross(a, b, prev) >= 0.0;
            if cur_in {
                if !prev_in {
                    output.push(line_intersection(prev, cur, a, b));
                }
                output.push(cur);
            } else if prev_in {
                output.push(line_intersection(prev, cur, a, b));
            }
        }
    }
    output
}

fn corners_f64(b: &Box3d) -> [[f64; 2]; 4] {
    b.bev_corners().map(|[x, y]| [x as f64, y as f64])
}

/// IoU of the rotated BEV footprints of two boxes.
pub fn bev_iou(a: &Box3d, b: &Box3d) -> f32 {
    let area_a = a.bev_area() as f64;
    let area_b = b.bev_area() as f64;
    if area_a <= 0.0 || area_b <= 0.0 {
        return 0.0;
    }
    let inter = polygon_area(&clip_polygon(&corners_f64(a), &corners_f64(b)));
    let union = area_a + area_b - inter;
    if union <= 0.0 {
        0.0
    } else {
        (inter / union).clamp(0.0, 1.0) as f32
    }
}

/// Class-agnostic greedy NMS, highest score first.
pub fn nms(dets: DetectionSet, params: &NmsParams) -> DetectionSet {
    let mut sorted = dets.detections;
    sorted.sort_by(|a, b| b.score.total_cmp(&a.score));
    sorted.truncate(params.pre_max_size);

    let mut kept: Vec<Detection> = Vec::with_capacity(sorted.len().min(params.post_max_size));
    for det in sorted {
        if kept.len() >= params.post_max_size {
            break;
        }
        if kept
            .iter()
            .all(|k| bev_iou(&k.bbox, &det.bbox) <= params.iou_threshold)
        {
            kept.push(det);
        }
    }
    DetectionSet { detections: kept }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bx(x: f32, y: f32, heading: f32) -> Box3d {
        Box3d {
            center: [x, y, 0.0],
            size: [4.0, 2.0, 1.5],
            heading,
            velocity: [0.0, 0.0],
        }
    }

    fn det(x: f32, score: f32) -> Detection {
        Detection {
            bbox: bx(x, 0.0, 0.0),
            score,
            label: 1,
        }
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        assert!((bev_iou(&bx(0.0, 0.0, 0.3), &bx(0.0, 0.0, 0.3)) - 1.0).abs() < 1e-5);
        assert_eq!(bev_iou(&bx(0.0, 0.0, 0.0), &bx(10.0, 0.0, 0.0)), 0.0);
    }

    #[test]
    fn iou_of_half_shifted_boxes() {
        // Overlap 2x2 = 4, union 8 + 8 - 4 = 12.
        let iou = bev_iou(&bx(0.0, 0.0, 0.0), &bx(2.0, 0.0, 0.0));
        assert!((iou - 1.0 / 3.0).abs() < 1e-5);
    }

    #[test]
    fn iou_is_rotation_aware() {
        // Cross-shaped overlap: 2x2 square.
        let iou = bev_iou(&bx(0.0, 0.0, 0.0), &bx(0.0, 0.0, std::f32::consts::FRAC_PI_2));
        assert!((iou - 4.0 / 12.0).abs() < 1e-4);
    }

    #[test]
    fn nms_keeps_highest_scoring_and_respects_limits() {
        let dets: DetectionSet = [det(0.0, 0.3), det(0.2, 0.9), det(20.0, 0.5), det(40.0, 0.1)]
            .into_iter()
            .collect();
        let params = NmsParams {
            iou_threshold: 0.2,
            pre_max_size: 10,
            post_max_size: 2,
        };
        let out = nms(dets.clone(), &params);
        assert_eq!(out.len(), 2);
        assert_eq!(out.detections[0].score, 0.9);
        assert_eq!(out.detections[1].score, 0.5);

        let pre_limited = nms(
            dets,
            &NmsParams {
                pre_max_size: 1,
                ..params
            },
        );
        assert_eq!(pre_limited.len(), 1);
    }
}
