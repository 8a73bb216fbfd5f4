//! Webcam signal types
//!
//! This module defines the types that flow through the signal extraction
//! pipeline: raw landmarks from the detector, per-frame features, periodic
//! timeline points and the per-question aggregate.

use serde::{Deserialize, Serialize};

/// Normalized landmark coordinate returned by the face detector
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Landmark {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }

    /// Planar Euclidean distance in normalized image coordinates.
    pub fn distance(&self, other: &Landmark) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn midpoint(&self, other: &Landmark) -> Landmark {
        Landmark {
            x: (self.x + other.x) / 2.0,
            y: (self.y + other.y) / 2.0,
            z: (self.z + other.z) / 2.0,
        }
    }
}

/// Landmark mesh of a single detected face (468-point face mesh indexing)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FaceLandmarks {
    pub points: Vec<Landmark>,
}

impl FaceLandmarks {
    pub fn new(points: Vec<Landmark>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Landmark> {
        self.points.get(index)
    }
}

/// Head orientation proxy. Unit-less and uncalibrated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadPose {
    pub yaw: f64,
    pub pitch: f64,
}

/// Instantaneous features derived from one frame with a face
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameFeatures {
    /// Eye aspect ratio averaged over both eyes
    pub ear: f64,
    pub yaw: f64,
    pub pitch: f64,
    /// Average vertical eyebrow-to-eye distance
    pub eyebrow_height: f64,
    /// Vertical mouth opening / mouth width
    pub mouth_tension: f64,
}

impl FrameFeatures {
    pub fn pose(&self) -> HeadPose {
        HeadPose {
            yaw: self.yaw,
            pitch: self.pitch,
        }
    }
}

/// One processed frame: either a face was found or it was not
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameSample {
    FaceAbsent,
    Face(FrameFeatures),
}

/// Periodic behavioral snapshot within one question
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelinePoint {
    /// Seconds since the question started
    pub timestamp: f64,
    /// Blinks per minute so far
    pub blink_rate: f64,
    pub gaze_stability: f64,
    pub head_yaw: f64,
    pub head_pitch: f64,
    /// Heuristic composite in [0, 1]; not a physiological measurement
    pub stress_estimate: f64,
    pub eyebrow_height: f64,
    pub mouth_tension: f64,
    pub eye_openness: f64,
}

/// Facial-expression summary of one question
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FacialFeatures {
    pub eyebrow_raise_count: u32,
    pub avg_mouth_tension: f64,
    pub avg_eye_openness: f64,
    pub expression_changes: u32,
}

/// Derived statistics over one question's frame stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionMetrics {
    /// Blinks per minute over the question
    pub blink_rate: f64,
    /// Head movements per hundred frames
    pub head_movement_score: f64,
    /// 1 - off-screen frames / frames analyzed, in [0, 1]
    pub gaze_stability: f64,
    /// Frames with a face / frames analyzed
    pub face_detection_rate: f64,
    pub total_blinks: u32,
    pub total_head_movements: u32,
    pub frames_analyzed: u64,
    pub timeline: Vec<TimelinePoint>,
    pub duration_seconds: f64,
    pub facial_features: FacialFeatures,
}

impl Default for QuestionMetrics {
    fn default() -> Self {
        Self::empty()
    }
}

impl QuestionMetrics {
    /// Metrics of a question during which nothing was captured.
    pub fn empty() -> Self {
        Self {
            blink_rate: 0.0,
            head_movement_score: 0.0,
            gaze_stability: 1.0,
            face_detection_rate: 0.0,
            total_blinks: 0,
            total_head_movements: 0,
            frames_analyzed: 0,
            timeline: Vec::new(),
            duration_seconds: 0.0,
            facial_features: FacialFeatures::default(),
        }
    }
}
