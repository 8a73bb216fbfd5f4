//! Per-frame feature extraction
//!
//! Geometric proxies computed from a single face mesh. None of these are
//! calibrated measurements; they are ratios and offsets in normalized image
//! coordinates.

use crate::error::ProctorError;
use crate::signals::types::{FaceLandmarks, FrameFeatures, HeadPose, Landmark};

/// Face mesh landmark indices
pub mod mesh {
    /// Left eye, ordered p1..p6 for EAR
    pub const LEFT_EYE: [usize; 6] = [33, 160, 158, 133, 153, 144];
    /// Right eye, ordered p1..p6 for EAR
    pub const RIGHT_EYE: [usize; 6] = [362, 385, 387, 263, 373, 380];

    pub const NOSE_TIP: usize = 1;
    pub const LEFT_EYE_OUTER: usize = 33;
    pub const RIGHT_EYE_OUTER: usize = 263;
    pub const CHIN: usize = 152;
    pub const FOREHEAD: usize = 10;

    pub const LEFT_EYEBROW: usize = 70;
    pub const RIGHT_EYEBROW: usize = 300;

    pub const MOUTH_LEFT: usize = 61;
    pub const MOUTH_RIGHT: usize = 291;
    pub const UPPER_LIP: usize = 13;
    pub const LOWER_LIP: usize = 14;

    /// Highest index referenced above, plus one
    pub const REQUIRED_POINTS: usize = 388;
}

/// Extract all per-frame features from a face mesh.
pub fn extract_features(landmarks: &FaceLandmarks) -> Result<FrameFeatures, ProctorError> {
    if landmarks.len() < mesh::REQUIRED_POINTS {
        return Err(ProctorError::InsufficientLandmarks {
            needed: mesh::REQUIRED_POINTS,
            got: landmarks.len(),
        });
    }
    let p = |i: usize| landmarks.points[i];

    let left_ear = eye_aspect_ratio(&mesh::LEFT_EYE.map(p));
    let right_ear = eye_aspect_ratio(&mesh::RIGHT_EYE.map(p));
    let pose = head_pose(
        &p(mesh::NOSE_TIP),
        &p(mesh::LEFT_EYE_OUTER),
        &p(mesh::RIGHT_EYE_OUTER),
        &p(mesh::CHIN),
        &p(mesh::FOREHEAD),
    );
    let eyebrow_height = eyebrow_height(
        &p(mesh::LEFT_EYEBROW),
        &p(mesh::RIGHT_EYEBROW),
        &p(mesh::LEFT_EYE_OUTER),
        &p(mesh::RIGHT_EYE_OUTER),
    );
    let mouth_tension = mouth_tension(
        &p(mesh::MOUTH_LEFT),
        &p(mesh::MOUTH_RIGHT),
        &p(mesh::UPPER_LIP),
        &p(mesh::LOWER_LIP),
    );

    Ok(FrameFeatures {
        ear: (left_ear + right_ear) / 2.0,
        yaw: pose.yaw,
        pitch: pose.pitch,
        eyebrow_height,
        mouth_tension,
    })
}

/// Eye Aspect Ratio
///
/// Formula: `(d(p2,p6) + d(p3,p5)) / (2 * d(p1,p4))`
/// Returns 0 when the eye corners coincide.
pub fn eye_aspect_ratio(eye: &[Landmark; 6]) -> f64 {
    let horizontal = eye[0].distance(&eye[3]);
    if horizontal <= f64::EPSILON {
        return 0.0;
    }
    let vertical_1 = eye[1].distance(&eye[5]);
    let vertical_2 = eye[2].distance(&eye[4]);
    (vertical_1 + vertical_2) / (2.0 * horizontal)
}

/// Head pose proxy
///
/// yaw = (nose.x - eye_center.x) * 100, pitch = (nose.y - face_center.y) * 100
/// where eye_center is the midpoint of the outer eye corners and face_center
/// the midpoint of chin and forehead.
pub fn head_pose(
    nose: &Landmark,
    left_eye: &Landmark,
    right_eye: &Landmark,
    chin: &Landmark,
    forehead: &Landmark,
) -> HeadPose {
    let eye_center = left_eye.midpoint(right_eye);
    let face_center = chin.midpoint(forehead);
    HeadPose {
        yaw: (nose.x - eye_center.x) * 100.0,
        pitch: (nose.y - face_center.y) * 100.0,
    }
}

/// Average vertical eyebrow-to-eye distance over both sides.
pub fn eyebrow_height(
    left_brow: &Landmark,
    right_brow: &Landmark,
    left_eye: &Landmark,
    right_eye: &Landmark,
) -> f64 {
    let left = (left_brow.y - left_eye.y).abs();
    let right = (right_brow.y - right_eye.y).abs();
    (left + right) / 2.0
}

/// Vertical mouth opening over mouth width; 0 for a degenerate mouth.
pub fn mouth_tension(
    left_corner: &Landmark,
    right_corner: &Landmark,
    upper_lip: &Landmark,
    lower_lip: &Landmark,
) -> f64 {
    let width = left_corner.distance(right_corner);
    if width <= f64::EPSILON {
        return 0.0;
    }
    upper_lip.distance(lower_lip) / width
}

/// Heuristic stress composite
///
/// Formula:
/// ```text
/// stress = 0.5 * (blink_rate / 40)
///        + 0.3 * (head_movements / frames_analyzed)
///        + 0.2 * (1 - gaze_stability)
/// ```
/// clamped to [0, 1]. A proxy for the interface, not a physiological measure.
pub fn stress_estimate(
    blink_rate: f64,
    head_movements: u32,
    frames_analyzed: u64,
    gaze_stability: f64,
) -> f64 {
    let movement_ratio = if frames_analyzed == 0 {
        0.0
    } else {
        head_movements as f64 / frames_analyzed as f64
    };
    let score = 0.5 * (blink_rate / 40.0) + 0.3 * movement_ratio + 0.2 * (1.0 - gaze_stability);
    score.clamp(0.0, 1.0)
}
