//! Signal pipeline orchestration
//!
//! This module provides the capture contract the session controller holds and
//! the webcam implementation behind it: frame source → landmark detector →
//! per-frame features → per-question aggregate.
//!
//! Passive capture is strictly best-effort. A detector that fails to
//! initialize or a camera that cannot be opened degrades the pipeline to
//! empty metrics; it never blocks the quiz.

use std::sync::Arc;

use crate::clock::Clock;
use crate::config::SignalsConfig;
use crate::error::ProctorError;
use crate::signals::aggregator::MetricsAggregator;
use crate::signals::features::extract_features;
use crate::signals::types::{FaceLandmarks, FrameSample, QuestionMetrics};

/// Control surface the session controller uses for passive capture.
pub trait BehaviorCapture: Send {
    /// Acquire the capture device and begin accepting frames.
    fn start(&mut self) -> Result<(), ProctorError>;
    /// Release the capture device. Repeated calls are no-ops.
    fn stop(&mut self);
    /// Current question's metrics, without resetting.
    fn snapshot(&self) -> QuestionMetrics;
    /// Swap in a fresh aggregate for a new question.
    fn reset(&mut self);
    /// Process one frame, called from the display-refresh loop.
    fn on_frame(&mut self);
    fn is_running(&self) -> bool;
}

/// Opaque face landmark detection capability.
pub trait LandmarkDetector: Send {
    type Frame;

    fn initialize(&mut self) -> Result<(), ProctorError>;

    /// Landmarks of the first detected face, or `None` when no face is found.
    fn detect(&mut self, frame: &Self::Frame, timestamp_ms: u64) -> Option<FaceLandmarks>;
}

/// Live video source.
pub trait FrameSource: Send {
    type Frame;

    /// Acquire the device; fails with `PermissionDenied` when access is refused.
    fn open(&mut self) -> Result<(), ProctorError>;
    /// Latest frame, or `None` when the device has no frame ready yet.
    fn next_frame(&mut self) -> Option<Self::Frame>;
    fn release(&mut self);
}

/// Webcam-backed capture pipeline
pub struct SignalPipeline<D, S>
where
    D: LandmarkDetector,
    S: FrameSource<Frame = D::Frame>,
{
    config: SignalsConfig,
    clock: Arc<dyn Clock>,
    detector: D,
    source: S,
    detection_available: bool,
    source_open: bool,
    aggregator: MetricsAggregator,
}

impl<D, S> SignalPipeline<D, S>
where
    D: LandmarkDetector,
    S: FrameSource<Frame = D::Frame>,
{
    /// Build the pipeline and initialize the detector. An initialization
    /// failure is logged and leaves the pipeline in degraded mode.
    pub fn new(config: SignalsConfig, clock: Arc<dyn Clock>, mut detector: D, source: S) -> Self {
        let detection_available = match detector.initialize() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "landmark detection unavailable, passive capture disabled");
                false
            }
        };
        let aggregator = MetricsAggregator::new(config.clone(), clock.now_ms());
        Self {
            config,
            clock,
            detector,
            source,
            detection_available,
            source_open: false,
            aggregator,
        }
    }

    pub fn detection_available(&self) -> bool {
        self.detection_available
    }
}

impl<D, S> BehaviorCapture for SignalPipeline<D, S>
where
    D: LandmarkDetector,
    S: FrameSource<Frame = D::Frame>,
{
    fn start(&mut self) -> Result<(), ProctorError> {
        if !self.detection_available {
            return Err(ProctorError::DetectionUnavailable(
                "detector failed to initialize".to_string(),
            ));
        }
        if self.source_open {
            return Ok(());
        }
        self.source.open()?;
        self.source_open = true;
        tracing::debug!("capture device acquired");
        Ok(())
    }

    fn stop(&mut self) {
        if !self.source_open {
            return;
        }
        self.source.release();
        self.source_open = false;
        tracing::debug!("capture device released");
    }

    fn snapshot(&self) -> QuestionMetrics {
        self.aggregator.snapshot(self.clock.now_ms())
    }

    fn reset(&mut self) {
        let fresh = MetricsAggregator::new(self.config.clone(), self.clock.now_ms());
        let previous = std::mem::replace(&mut self.aggregator, fresh);
        tracing::trace!(frames = previous.frames_analyzed(), "question metrics swapped");
    }

    fn on_frame(&mut self) {
        if !self.is_running() {
            return;
        }
        let Some(frame) = self.source.next_frame() else {
            return;
        };
        let now = self.clock.now_ms();
        let sample = match self.detector.detect(&frame, now) {
            Some(landmarks) => match extract_features(&landmarks) {
                Ok(features) => FrameSample::Face(features),
                Err(e) => {
                    tracing::debug!(error = %e, "unusable landmark set treated as no face");
                    FrameSample::FaceAbsent
                }
            },
            None => FrameSample::FaceAbsent,
        };
        self.aggregator.ingest(&sample, now);
    }

    fn is_running(&self) -> bool {
        self.detection_available && self.source_open
    }
}

/// Capture that records nothing; used when passive capture is switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCapture;

impl BehaviorCapture for NullCapture {
    fn start(&mut self) -> Result<(), ProctorError> {
        Ok(())
    }

    fn stop(&mut self) {}

    fn snapshot(&self) -> QuestionMetrics {
        QuestionMetrics::empty()
    }

    fn reset(&mut self) {}

    fn on_frame(&mut self) {}

    fn is_running(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::signals::features::tests::neutral_face;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays scripted detections; `None` entries mean no face.
    struct ScriptedDetector {
        fail_init: bool,
        script: Vec<Option<FaceLandmarks>>,
        cursor: usize,
    }

    impl LandmarkDetector for ScriptedDetector {
        type Frame = u32;

        fn initialize(&mut self) -> Result<(), ProctorError> {
            if self.fail_init {
                Err(ProctorError::DetectionUnavailable("model download failed".into()))
            } else {
                Ok(())
            }
        }

        fn detect(&mut self, _frame: &u32, _timestamp_ms: u64) -> Option<FaceLandmarks> {
            let result = self.script.get(self.cursor).cloned().flatten();
            self.cursor += 1;
            result
        }
    }

    #[derive(Clone, Default)]
    struct CountingSource {
        deny: bool,
        opens: Arc<AtomicUsize>,
        releases: Arc<AtomicUsize>,
    }

    impl FrameSource for CountingSource {
        type Frame = u32;

        fn open(&mut self) -> Result<(), ProctorError> {
            if self.deny {
                return Err(ProctorError::PermissionDenied("camera".into()));
            }
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn next_frame(&mut self) -> Option<u32> {
            Some(0)
        }

        fn release(&mut self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn pipeline(
        fail_init: bool,
        source: CountingSource,
        script: Vec<Option<FaceLandmarks>>,
    ) -> (SignalPipeline<ScriptedDetector, CountingSource>, ManualClock) {
        let clock = ManualClock::new(0);
        let detector = ScriptedDetector {
            fail_init,
            script,
            cursor: 0,
        };
        let pipeline =
            SignalPipeline::new(SignalsConfig::default(), Arc::new(clock.clone()), detector, source);
        (pipeline, clock)
    }

    #[test]
    fn test_frames_flow_into_metrics() {
        let script = vec![Some(neutral_face()), None, Some(neutral_face())];
        let (mut pipeline, clock) = pipeline(false, CountingSource::default(), script);
        pipeline.start().unwrap();
        for _ in 0..3 {
            clock.advance(33);
            pipeline.on_frame();
        }
        let metrics = pipeline.snapshot();
        assert_eq!(metrics.frames_analyzed, 3);
        assert!((metrics.face_detection_rate - 0.6667).abs() < 1e-9);
    }

    #[test]
    fn test_frames_ignored_until_started() {
        let (mut pipeline, _clock) = pipeline(false, CountingSource::default(), vec![]);
        pipeline.on_frame();
        assert_eq!(pipeline.snapshot().frames_analyzed, 0);
    }

    #[test]
    fn test_reset_swaps_in_empty_aggregate() {
        let script = vec![Some(neutral_face()); 4];
        let (mut pipeline, clock) = pipeline(false, CountingSource::default(), script);
        pipeline.start().unwrap();
        for _ in 0..4 {
            clock.advance(400);
            pipeline.on_frame();
        }
        assert!(!pipeline.snapshot().timeline.is_empty());

        pipeline.reset();
        let metrics = pipeline.snapshot();
        assert_eq!(metrics.frames_analyzed, 0);
        assert_eq!(metrics.total_blinks, 0);
        assert!(metrics.timeline.is_empty());
    }

    #[test]
    fn test_detector_failure_degrades_to_empty_metrics() {
        let (mut pipeline, _clock) = pipeline(true, CountingSource::default(), vec![]);
        assert!(!pipeline.detection_available());
        assert!(matches!(
            pipeline.start(),
            Err(ProctorError::DetectionUnavailable(_))
        ));
        pipeline.on_frame();
        assert_eq!(pipeline.snapshot(), QuestionMetrics::empty());
    }

    #[test]
    fn test_camera_denial_is_reported_and_capture_stays_off() {
        let source = CountingSource {
            deny: true,
            ..Default::default()
        };
        let (mut pipeline, _clock) = pipeline(false, source, vec![Some(neutral_face())]);
        assert!(matches!(pipeline.start(), Err(ProctorError::PermissionDenied(_))));
        assert!(!pipeline.is_running());
        pipeline.on_frame();
        assert_eq!(pipeline.snapshot().frames_analyzed, 0);
    }

    #[test]
    fn test_stop_releases_device_once() {
        let source = CountingSource::default();
        let releases = source.releases.clone();
        let opens = source.opens.clone();
        let (mut pipeline, _clock) = pipeline(false, source, vec![]);

        pipeline.start().unwrap();
        pipeline.start().unwrap();
        pipeline.stop();
        pipeline.stop();

        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
        assert!(!pipeline.is_running());
    }

    #[test]
    fn test_null_capture_is_inert() {
        let mut capture = NullCapture;
        capture.start().unwrap();
        capture.on_frame();
        assert!(!capture.is_running());
        assert_eq!(capture.snapshot(), QuestionMetrics::empty());
    }
}
