//! Recorded frame adapter
//!
//! Parses recorded frame streams (NDJSON, one frame per line) and replays them
//! through the same aggregation used live, producing one [`QuestionMetrics`]
//! per question.
//!
//! Each line is `{"t_ms": u64, "question": usize?, "landmarks": [...]? }` or
//! carries precomputed `features` instead of landmarks. A line with neither is
//! a face-absent frame. Frames without a `question` belong to the question of
//! the previous frame (0 at the start).

use serde::{Deserialize, Serialize};

use crate::clock::{Clock, ManualClock};
use crate::config::SignalsConfig;
use crate::error::ProctorError;
use crate::signals::aggregator::MetricsAggregator;
use crate::signals::features::extract_features;
use crate::signals::types::{FaceLandmarks, FrameFeatures, FrameSample, QuestionMetrics};

/// One recorded frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedFrame {
    /// Capture time in milliseconds on any monotonic scale
    pub t_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landmarks: Option<FaceLandmarks>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<FrameFeatures>,
}

impl RecordedFrame {
    /// Resolve the frame into a sample. Precomputed features win over landmarks;
    /// an unusable landmark set counts as no face, as it does live.
    pub fn to_sample(&self) -> FrameSample {
        if let Some(features) = self.features {
            return FrameSample::Face(features);
        }
        match &self.landmarks {
            Some(landmarks) => match extract_features(landmarks) {
                Ok(features) => FrameSample::Face(features),
                Err(e) => {
                    tracing::debug!(t_ms = self.t_ms, error = %e, "recorded landmarks unusable");
                    FrameSample::FaceAbsent
                }
            },
            None => FrameSample::FaceAbsent,
        }
    }
}

/// Metrics of one replayed question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayedQuestion {
    pub question: usize,
    pub metrics: QuestionMetrics,
}

/// Parse NDJSON recorded frames. Blank lines are skipped.
pub fn parse_ndjson(ndjson: &str) -> Result<Vec<RecordedFrame>, ProctorError> {
    let mut frames = Vec::new();
    for (line_num, line) in ndjson.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let frame = serde_json::from_str::<RecordedFrame>(trimmed).map_err(|e| {
            ProctorError::ParseError(format!("Failed to parse line {}: {}", line_num + 1, e))
        })?;
        frames.push(frame);
    }
    Ok(frames)
}

/// Replay recorded frames into per-question metrics, in order of first
/// appearance.
///
/// Each question's aggregate starts at its first frame and is read at its last.
/// Revisiting a question starts a new entry for it.
/// Time never runs backwards: a frame stamped earlier than its predecessor is
/// processed at the predecessor's time.
pub fn replay(frames: &[RecordedFrame], config: &SignalsConfig) -> Vec<ReplayedQuestion> {
    let Some(first) = frames.first() else {
        return Vec::new();
    };

    let clock = ManualClock::new(first.t_ms);
    let mut results = Vec::new();
    let mut current = first.question.unwrap_or(0);
    let mut aggregator = MetricsAggregator::new(config.clone(), clock.now_ms());

    for frame in frames {
        let question = frame.question.unwrap_or(current);
        if question != current {
            results.push(ReplayedQuestion {
                question: current,
                metrics: aggregator.snapshot(clock.now_ms()),
            });
            clock.set(frame.t_ms);
            aggregator = MetricsAggregator::new(config.clone(), clock.now_ms());
            current = question;
        }
        clock.set(frame.t_ms);
        aggregator.ingest(&frame.to_sample(), clock.now_ms());
    }

    results.push(ReplayedQuestion {
        question: current,
        metrics: aggregator.snapshot(clock.now_ms()),
    });
    tracing::debug!(frames = frames.len(), questions = results.len(), "replay finished");
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::features::tests::neutral_face;

    fn features_line(t_ms: u64, question: usize, ear: f64) -> String {
        format!(
            r#"{{"t_ms": {t_ms}, "question": {question}, "features": {{"ear": {ear}, "yaw": 0.0, "pitch": 0.0, "eyebrow_height": 0.05, "mouth_tension": 0.2}}}}"#
        )
    }

    #[test]
    fn test_parse_ndjson_skips_blank_lines() {
        let text = format!("{}\n\n{}\n", features_line(0, 0, 0.3), r#"{"t_ms": 33}"#);
        let frames = parse_ndjson(&text).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].question, None);
        assert_eq!(frames[1].to_sample(), FrameSample::FaceAbsent);
    }

    #[test]
    fn test_parse_ndjson_reports_line_number() {
        let text = format!("{}\nnot json\n", features_line(0, 0, 0.3));
        let err = parse_ndjson(&text).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_landmark_frames_are_extracted() {
        let frame = RecordedFrame {
            t_ms: 0,
            question: None,
            landmarks: Some(neutral_face()),
            features: None,
        };
        match frame.to_sample() {
            FrameSample::Face(features) => assert!((features.ear - 0.3).abs() < 1e-9),
            FrameSample::FaceAbsent => panic!("expected a face"),
        }
    }

    #[test]
    fn test_replay_splits_questions() {
        let lines = [
            features_line(0, 0, 0.3),
            features_line(33, 0, 0.1),
            features_line(66, 0, 0.1),
            features_line(99, 0, 0.3),
            r#"{"t_ms": 132}"#.to_string(),
            features_line(5_000, 1, 0.3),
            features_line(5_033, 1, 0.3),
        ];
        let frames = parse_ndjson(&lines.join("\n")).unwrap();
        let replayed = replay(&frames, &SignalsConfig::default());

        assert_eq!(replayed.len(), 2);
        assert_eq!(replayed[0].question, 0);
        assert_eq!(replayed[0].metrics.frames_analyzed, 5);
        assert_eq!(replayed[0].metrics.total_blinks, 1);
        assert_eq!(replayed[0].metrics.face_detection_rate, 0.8);

        assert_eq!(replayed[1].question, 1);
        assert_eq!(replayed[1].metrics.frames_analyzed, 2);
        assert_eq!(replayed[1].metrics.total_blinks, 0);
        assert!(replayed[1].metrics.timeline.is_empty());
    }

    #[test]
    fn test_replay_of_nothing_is_empty() {
        assert!(replay(&[], &SignalsConfig::default()).is_empty());
    }
}
