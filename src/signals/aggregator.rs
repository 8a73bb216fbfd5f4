//! Per-question metrics aggregation
//!
//! A [`MetricsAggregator`] owns every counter for exactly one question. It is
//! never cleared in place: at a question boundary the pipeline swaps in a fresh
//! instance.

use crate::config::SignalsConfig;
use crate::interaction::round_to;
use crate::signals::features::stress_estimate;
use crate::signals::types::{
    FacialFeatures, FrameFeatures, FrameSample, HeadPose, QuestionMetrics, TimelinePoint,
};

/// Running counters and sums for one question
#[derive(Debug, Clone)]
pub struct MetricsAggregator {
    config: SignalsConfig,
    started_ms: u64,
    frames_analyzed: u64,
    face_frames: u64,
    gaze_off_frames: u64,
    total_blinks: u32,
    closed_frames: u32,
    total_head_movements: u32,
    prev_pose: Option<HeadPose>,
    eyebrow_raises: u32,
    expression_changes: u32,
    prev_eyebrow_height: Option<f64>,
    ear_sum: f64,
    mouth_tension_sum: f64,
    timeline: Vec<TimelinePoint>,
    last_timeline_ms: u64,
}

impl MetricsAggregator {
    pub fn new(config: SignalsConfig, started_ms: u64) -> Self {
        Self {
            config,
            started_ms,
            frames_analyzed: 0,
            face_frames: 0,
            gaze_off_frames: 0,
            total_blinks: 0,
            closed_frames: 0,
            total_head_movements: 0,
            prev_pose: None,
            eyebrow_raises: 0,
            expression_changes: 0,
            prev_eyebrow_height: None,
            ear_sum: 0.0,
            mouth_tension_sum: 0.0,
            timeline: Vec::new(),
            last_timeline_ms: started_ms,
        }
    }

    pub fn started_ms(&self) -> u64 {
        self.started_ms
    }

    pub fn frames_analyzed(&self) -> u64 {
        self.frames_analyzed
    }

    pub fn total_blinks(&self) -> u32 {
        self.total_blinks
    }

    /// Account for one processed frame captured at `now_ms`.
    pub fn ingest(&mut self, sample: &FrameSample, now_ms: u64) {
        self.frames_analyzed += 1;

        let features = match sample {
            FrameSample::FaceAbsent => {
                // No face counts as looking away; pose deltas resume from the
                // last frame that had a face.
                self.gaze_off_frames += 1;
                return;
            }
            FrameSample::Face(features) => features,
        };
        self.face_frames += 1;

        self.track_blink(features.ear);
        self.track_head(features);
        self.track_expression(features);
        self.maybe_sample_timeline(features, now_ms);
    }

    fn track_blink(&mut self, ear: f64) {
        if ear < self.config.ear_threshold {
            self.closed_frames += 1;
        } else {
            if self.closed_frames >= self.config.min_closed_frames {
                self.total_blinks += 1;
                tracing::trace!(run = self.closed_frames, "blink registered");
            }
            self.closed_frames = 0;
        }
    }

    fn track_head(&mut self, features: &FrameFeatures) {
        let pose = features.pose();
        if let Some(prev) = self.prev_pose {
            let threshold = self.config.head_movement_threshold;
            if (pose.yaw - prev.yaw).abs() > threshold || (pose.pitch - prev.pitch).abs() > threshold
            {
                self.total_head_movements += 1;
            }
        }
        self.prev_pose = Some(pose);

        let limit = self.config.gaze_off_threshold;
        if pose.yaw.abs() >= limit || pose.pitch.abs() >= limit {
            self.gaze_off_frames += 1;
        }
    }

    fn track_expression(&mut self, features: &FrameFeatures) {
        self.ear_sum += features.ear;
        self.mouth_tension_sum += features.mouth_tension;

        if let Some(prev) = self.prev_eyebrow_height {
            if (features.eyebrow_height - prev).abs() > self.config.eyebrow_change_threshold {
                self.eyebrow_raises += 1;
                self.expression_changes += 1;
            }
        }
        self.prev_eyebrow_height = Some(features.eyebrow_height);
    }

    fn maybe_sample_timeline(&mut self, features: &FrameFeatures, now_ms: u64) {
        if now_ms.saturating_sub(self.last_timeline_ms) < self.config.timeline_interval_ms {
            return;
        }

        let timestamp = round_to(self.elapsed_secs(now_ms), 1);
        if self
            .timeline
            .last()
            .is_some_and(|last| timestamp <= last.timestamp)
        {
            return;
        }

        let blink_rate = self.blink_rate(now_ms);
        let gaze_stability = self.gaze_stability();
        let stress = stress_estimate(
            blink_rate,
            self.total_head_movements,
            self.frames_analyzed,
            gaze_stability,
        );

        self.timeline.push(TimelinePoint {
            timestamp,
            blink_rate: round_to(blink_rate, 2),
            gaze_stability: round_to(gaze_stability, 3),
            head_yaw: round_to(features.yaw, 2),
            head_pitch: round_to(features.pitch, 2),
            stress_estimate: round_to(stress, 3),
            eyebrow_height: round_to(features.eyebrow_height, 3),
            mouth_tension: round_to(features.mouth_tension, 3),
            eye_openness: round_to(features.ear, 3),
        });
        self.last_timeline_ms = now_ms;
    }

    fn elapsed_secs(&self, now_ms: u64) -> f64 {
        now_ms.saturating_sub(self.started_ms) as f64 / 1000.0
    }

    fn blink_rate(&self, now_ms: u64) -> f64 {
        let elapsed = self.elapsed_secs(now_ms);
        if elapsed <= 0.0 {
            return 0.0;
        }
        self.total_blinks as f64 / elapsed * 60.0
    }

    /// 1 - off-screen / analyzed; 1 when nothing has been analyzed.
    pub fn gaze_stability(&self) -> f64 {
        if self.frames_analyzed == 0 {
            return 1.0;
        }
        (1.0 - self.gaze_off_frames as f64 / self.frames_analyzed as f64).clamp(0.0, 1.0)
    }

    /// Read the aggregate as of `now_ms` without modifying it.
    pub fn snapshot(&self, now_ms: u64) -> QuestionMetrics {
        let frames = self.frames_analyzed;
        let face_frames = self.face_frames;
        let per_face_frame = |sum: f64| {
            if face_frames == 0 {
                0.0
            } else {
                sum / face_frames as f64
            }
        };

        QuestionMetrics {
            blink_rate: round_to(self.blink_rate(now_ms), 2),
            head_movement_score: round_to(
                self.total_head_movements as f64 / frames.max(1) as f64 * 100.0,
                2,
            ),
            gaze_stability: round_to(self.gaze_stability(), 4),
            face_detection_rate: if frames == 0 {
                0.0
            } else {
                round_to(face_frames as f64 / frames as f64, 4)
            },
            total_blinks: self.total_blinks,
            total_head_movements: self.total_head_movements,
            frames_analyzed: frames,
            timeline: self.timeline.clone(),
            duration_seconds: round_to(self.elapsed_secs(now_ms), 1),
            facial_features: FacialFeatures {
                eyebrow_raise_count: self.eyebrow_raises,
                avg_mouth_tension: round_to(per_face_frame(self.mouth_tension_sum), 3),
                avg_eye_openness: round_to(per_face_frame(self.ear_sum), 3),
                expression_changes: self.expression_changes,
            },
        }
    }
}
