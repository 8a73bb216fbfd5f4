//! Webcam behavioral signal extraction
//!
//! Converts a live video stream into per-question behavioral aggregates.
//!
//! Pipeline: Frame → Landmark detector → Features → Aggregator → QuestionMetrics

pub mod adapter;
pub mod aggregator;
pub mod features;
pub mod pipeline;
pub mod types;

pub use adapter::{parse_ndjson, replay, RecordedFrame, ReplayedQuestion};
pub use aggregator::MetricsAggregator;
pub use pipeline::{BehaviorCapture, FrameSource, LandmarkDetector, NullCapture, SignalPipeline};
pub use types::{
    FaceLandmarks, FacialFeatures, FrameFeatures, FrameSample, HeadPose, Landmark,
    QuestionMetrics, TimelinePoint,
};
