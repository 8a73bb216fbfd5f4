//! TOML-based proctoring configuration.
//!
//! Every fixed constant of the session protocol and the signal pipeline lives
//! here so hosts can tune them without touching code:
//! - `[session]`: countdown, grace period, time budget per question
//! - `[signals]`: blink, head-pose, gaze and expression thresholds, cadences
//! - `[backend]`: quiz service location
//!
//! All fields fall back to their defaults when omitted.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ProctorError;

/// Session protocol configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Pre-quiz countdown length, in one-second units.
    #[serde(default = "default_countdown_secs")]
    pub countdown_secs: u32,
    /// Grace period after losing exclusive display mode, in one-second units.
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u32,
    /// Primary time budget allotted per question.
    #[serde(default = "default_seconds_per_question")]
    pub seconds_per_question: u32,
    /// Number of questions requested from the backend.
    #[serde(default = "default_num_questions")]
    pub num_questions: usize,
    /// Confidence sent with each answer before the session-wide value is known.
    #[serde(default = "default_confidence")]
    pub default_confidence: u8,
}

/// Signal extraction configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalsConfig {
    /// EAR below this value counts as a closed-eye frame.
    #[serde(default = "default_ear_threshold")]
    pub ear_threshold: f64,
    /// Minimum run of closed-eye frames that registers a blink on recovery.
    #[serde(default = "default_min_closed_frames")]
    pub min_closed_frames: u32,
    /// Yaw or pitch delta between frames that counts as a head movement.
    #[serde(default = "default_head_movement_threshold")]
    pub head_movement_threshold: f64,
    /// Absolute yaw or pitch at which gaze counts as off-screen.
    #[serde(default = "default_gaze_off_threshold")]
    pub gaze_off_threshold: f64,
    /// Eyebrow height change that counts as a raise / expression change.
    #[serde(default = "default_eyebrow_change_threshold")]
    pub eyebrow_change_threshold: f64,
    /// Minimum wall-clock spacing between timeline points.
    #[serde(default = "default_timeline_interval_ms")]
    pub timeline_interval_ms: u64,
    /// Frame loop cadence used by the driver (display refresh proxy).
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
    /// Whether passive webcam capture runs at all.
    #[serde(default = "default_true")]
    pub capture_enabled: bool,
}

/// Quiz backend configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Full proctoring configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProctorConfig {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub signals: SignalsConfig,
    #[serde(default)]
    pub backend: BackendConfig,
}

fn default_countdown_secs() -> u32 {
    5
}
fn default_grace_secs() -> u32 {
    10
}
fn default_seconds_per_question() -> u32 {
    120
}
fn default_num_questions() -> usize {
    10
}
fn default_confidence() -> u8 {
    50
}
fn default_ear_threshold() -> f64 {
    0.21
}
fn default_min_closed_frames() -> u32 {
    2
}
fn default_head_movement_threshold() -> f64 {
    5.0
}
fn default_gaze_off_threshold() -> f64 {
    15.0
}
fn default_eyebrow_change_threshold() -> f64 {
    0.02
}
fn default_timeline_interval_ms() -> u64 {
    500
}
fn default_frame_interval_ms() -> u64 {
    33
}
fn default_true() -> bool {
    true
}
fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}
fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            countdown_secs: default_countdown_secs(),
            grace_secs: default_grace_secs(),
            seconds_per_question: default_seconds_per_question(),
            num_questions: default_num_questions(),
            default_confidence: default_confidence(),
        }
    }
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            ear_threshold: default_ear_threshold(),
            min_closed_frames: default_min_closed_frames(),
            head_movement_threshold: default_head_movement_threshold(),
            gaze_off_threshold: default_gaze_off_threshold(),
            eyebrow_change_threshold: default_eyebrow_change_threshold(),
            timeline_interval_ms: default_timeline_interval_ms(),
            frame_interval_ms: default_frame_interval_ms(),
            capture_enabled: default_true(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl SessionConfig {
    /// Primary time budget in seconds for a quiz of `question_count` questions.
    pub fn time_budget_secs(&self, question_count: usize) -> u32 {
        self.seconds_per_question
            .saturating_mul(u32::try_from(question_count).unwrap_or(u32::MAX))
    }
}

impl ProctorConfig {
    /// Parse a configuration from TOML text and validate it.
    pub fn from_toml_str(text: &str) -> Result<Self, ProctorError> {
        let config: ProctorConfig =
            toml::from_str(text).map_err(|e| ProctorError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file from disk.
    pub fn load(path: &Path) -> Result<Self, ProctorError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ProctorError::ConfigError(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// Serialize back to TOML.
    pub fn to_toml_string(&self) -> Result<String, ProctorError> {
        toml::to_string_pretty(self).map_err(|e| ProctorError::ConfigError(e.to_string()))
    }

    /// Reject settings the protocol cannot run with.
    pub fn validate(&self) -> Result<(), ProctorError> {
        if self.session.countdown_secs == 0 {
            return Err(ProctorError::ConfigError(
                "session.countdown_secs must be at least 1".to_string(),
            ));
        }
        if self.session.grace_secs == 0 {
            return Err(ProctorError::ConfigError(
                "session.grace_secs must be at least 1".to_string(),
            ));
        }
        if self.session.seconds_per_question == 0 {
            return Err(ProctorError::ConfigError(
                "session.seconds_per_question must be at least 1".to_string(),
            ));
        }
        if self.session.num_questions == 0 {
            return Err(ProctorError::ConfigError(
                "session.num_questions must be at least 1".to_string(),
            ));
        }
        if self.session.default_confidence > 100 {
            return Err(ProctorError::ConfigError(
                "session.default_confidence must be within 0-100".to_string(),
            ));
        }
        if self.signals.ear_threshold <= 0.0 {
            return Err(ProctorError::ConfigError(
                "signals.ear_threshold must be positive".to_string(),
            ));
        }
        if self.signals.frame_interval_ms == 0 || self.signals.timeline_interval_ms == 0 {
            return Err(ProctorError::ConfigError(
                "signal intervals must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
