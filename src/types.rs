//! Core types for SIMCO Proctor sessions
//!
//! This module defines the data that flows through a proctored session: the
//! candidate's profile and preferences, the session and its questions, the
//! per-answer records, the backend wire shapes and the events the controller
//! emits to its host.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::ProctorError;
use crate::interaction::InteractionRecord;
use crate::signals::types::QuestionMetrics;

/// Session controller phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    CollectingProfile,
    CollectingPreferences,
    ReadingInstructions,
    AwaitingCameraPermission,
    GeneratingQuestions,
    ReadyToStart,
    Countdown,
    Active,
    GracePeriod,
    ConfidenceCapture,
    Completed,
    Aborted,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::CollectingProfile => "collecting_profile",
            Phase::CollectingPreferences => "collecting_preferences",
            Phase::ReadingInstructions => "reading_instructions",
            Phase::AwaitingCameraPermission => "awaiting_camera_permission",
            Phase::GeneratingQuestions => "generating_questions",
            Phase::ReadyToStart => "ready_to_start",
            Phase::Countdown => "countdown",
            Phase::Active => "active",
            Phase::GracePeriod => "grace_period",
            Phase::ConfidenceCapture => "confidence_capture",
            Phase::Completed => "completed",
            Phase::Aborted => "aborted",
        }
    }

    /// Completed and Aborted are never left.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Completed | Phase::Aborted)
    }

    /// Phases during which a question is on screen.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, Phase::Active | Phase::GracePeriod)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session was forcibly terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortCause {
    /// Primary time budget ran out
    Timeout,
    /// Exclusive display mode was not restored within the grace period
    DistractionExpiry,
}

impl AbortCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            AbortCause::Timeout => "timeout",
            AbortCause::DistractionExpiry => "distraction_expiry",
        }
    }

    /// Terminal message shown to the candidate.
    pub fn message(&self) -> &'static str {
        match self {
            AbortCause::Timeout => "Time is up! The test has ended.",
            AbortCause::DistractionExpiry => {
                "You did not return to full-screen mode. The test has ended."
            }
        }
    }

    pub fn to_error(&self) -> ProctorError {
        match self {
            AbortCause::Timeout => ProctorError::Timeout,
            AbortCause::DistractionExpiry => ProctorError::DistractionExpiry,
        }
    }
}

impl fmt::Display for AbortCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Candidate profile collected before the quiz
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub academic_level: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl Profile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ProctorError> {
        if self.name.trim().is_empty() {
            return Err(ProctorError::InvalidProfile("name is required".to_string()));
        }
        if let Some(email) = &self.email {
            if !email.is_empty() && !email.contains('@') {
                return Err(ProctorError::InvalidProfile(format!(
                    "invalid email address: {}",
                    email
                )));
            }
        }
        Ok(())
    }
}

/// What the candidate wants to be quizzed on
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuizPreferences {
    pub subject: String,
    pub level: String,
    /// Free-text context forwarded to question generation
    #[serde(default)]
    pub user_info: String,
}

impl QuizPreferences {
    pub fn new(subject: impl Into<String>, level: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            level: level.into(),
            user_info: String::new(),
        }
    }

    pub fn with_user_info(mut self, user_info: impl Into<String>) -> Self {
        self.user_info = user_info.into();
        self
    }

    pub fn validate(&self) -> Result<(), ProctorError> {
        if self.subject.trim().is_empty() {
            return Err(ProctorError::InvalidProfile("subject is required".to_string()));
        }
        if self.level.trim().is_empty() {
            return Err(ProctorError::InvalidProfile("level is required".to_string()));
        }
        Ok(())
    }
}

/// One answer option with its stable display letter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizOption {
    pub id: char,
    pub text: String,
}

/// A quiz question as shown to the candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub prompt: String,
    pub options: Vec<QuizOption>,
    /// Index of the correct option; known only after submission
    #[serde(default)]
    pub correct_answer: Option<usize>,
    /// Revealed only after submission
    #[serde(default)]
    pub explanation: Option<String>,
}

impl Question {
    /// Label backend options `A, B, C, …` by position.
    pub fn from_generated(generated: GeneratedQuestion) -> Self {
        let options = generated
            .options
            .into_iter()
            .zip('A'..='Z')
            .map(|(text, id)| QuizOption { id, text })
            .collect();
        Self {
            id: generated.id,
            prompt: generated.question,
            options,
            correct_answer: None,
            explanation: None,
        }
    }

    /// Position of the option labelled `id`, as submitted to the backend.
    pub fn option_index(&self, id: char) -> Result<usize, ProctorError> {
        self.options
            .iter()
            .position(|o| o.id == id)
            .ok_or(ProctorError::UnknownOption(id))
    }

    pub fn has_option(&self, id: char) -> bool {
        self.options.iter().any(|o| o.id == id)
    }
}

/// One submitted answer, kept locally for the outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question_index: usize,
    pub question_id: String,
    pub selected_option: char,
    pub selected_answer: usize,
    pub is_correct: bool,
    /// Session confidence once captured, the per-answer default until then
    pub confidence: u8,
    pub interaction: InteractionRecord,
}

/// A quiz in progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Backend session identifier
    pub id: String,
    pub subject: String,
    pub level: String,
    pub questions: Vec<Question>,
    pub current_index: usize,
    pub phase: Phase,
    /// Primary time budget remaining, in seconds
    pub time_remaining: u32,
    pub answers: Vec<AnswerRecord>,
}

impl Session {
    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current_index)
    }

    pub fn is_last_question(&self) -> bool {
        self.current_index + 1 >= self.questions.len()
    }

    pub fn answered_count(&self) -> usize {
        self.answers.len()
    }
}

// ── Backend wire types ───────────────────────────────────────────────

/// Body of `POST /generate-quiz`; `num_questions` travels in the query string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateQuizRequest {
    #[serde(skip)]
    pub num_questions: usize,
    pub subject: String,
    pub level: String,
    pub user_info: String,
}

/// A question as generated by the backend, without its answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedQuestion {
    pub id: String,
    pub question: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateQuizResponse {
    pub session_id: String,
    pub questions: Vec<GeneratedQuestion>,
}

/// Behavioral payload attached to an answer: the question's metrics flattened
/// alongside its interaction record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehavioralData {
    #[serde(flatten)]
    pub metrics: QuestionMetrics,
    pub interaction: InteractionRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitAnswerRequest {
    pub session_id: String,
    pub question_id: String,
    /// Zero-based option position
    pub selected_answer: usize,
    pub confidence: u8,
    pub behavioral_data: BehavioralData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitAnswerResponse {
    pub correct: bool,
    #[serde(default)]
    pub correct_answer: Option<usize>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub score: Option<u32>,
    #[serde(default)]
    pub total_questions: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateConfidenceRequest {
    pub session_id: String,
    pub confidence: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceAck {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub updated_questions: Option<usize>,
}

/// Per-question line of the results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionResult {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: usize,
    #[serde(default)]
    pub user_answer: Option<usize>,
    pub is_correct: bool,
    #[serde(default)]
    pub is_answered: bool,
    #[serde(default)]
    pub explanation: String,
}

/// Final results as scored by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizResults {
    pub session_id: String,
    pub score: u32,
    pub total_questions: usize,
    pub percentage: f64,
    pub level: String,
    pub message: String,
    pub color: String,
    #[serde(default)]
    pub question_results: Vec<QuestionResult>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub answered_count: usize,
    /// Backend analysis, passed through untouched
    #[serde(default)]
    pub behavioral_analysis: Option<serde_json::Value>,
    #[serde(default)]
    pub behavioral_insights: Vec<String>,
}

/// Immutable record of a finished quiz. Supersedes the [`Session`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizOutcome {
    pub attempt_id: Uuid,
    pub results: QuizResults,
    pub answers: Vec<AnswerRecord>,
    pub confidence: Option<u8>,
    pub completed_at: DateTime<Utc>,
}

// ── Events ───────────────────────────────────────────────────────────

/// Kinds of human-readable notices surfaced to the candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    CameraDenied,
    DisplayDenied,
    GenerationFailed,
    SubmissionFailed,
    NoSelection,
    ExclusiveModeLost,
    CaptureDegraded,
    ConfidenceNotSaved,
    ResultsUnavailable,
    Timeout,
    DistractionExpiry,
}

impl NoticeKind {
    pub fn message(&self) -> &'static str {
        match self {
            NoticeKind::CameraDenied => {
                "Camera access is required for behavioral tracking. Please allow camera access."
            }
            NoticeKind::DisplayDenied => "Full-screen mode is required to start the test.",
            NoticeKind::GenerationFailed => {
                "Error while generating the quiz. Please try again."
            }
            NoticeKind::SubmissionFailed => {
                "Error while submitting the answer. Please try again."
            }
            NoticeKind::NoSelection => "Please select an answer before submitting.",
            NoticeKind::ExclusiveModeLost => {
                "Return to full-screen mode before the countdown ends."
            }
            NoticeKind::CaptureDegraded => {
                "Behavioral tracking is unavailable; the quiz continues without it."
            }
            NoticeKind::ConfidenceNotSaved => "Your confidence level could not be saved.",
            NoticeKind::ResultsUnavailable => "Error while loading the results.",
            NoticeKind::Timeout => AbortCause::Timeout.message(),
            NoticeKind::DistractionExpiry => AbortCause::DistractionExpiry.message(),
        }
    }

    /// Whether the candidate can simply try the same action again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            NoticeKind::CameraDenied
                | NoticeKind::DisplayDenied
                | NoticeKind::GenerationFailed
                | NoticeKind::SubmissionFailed
                | NoticeKind::NoSelection
                | NoticeKind::ResultsUnavailable
        )
    }
}

impl From<AbortCause> for NoticeKind {
    fn from(cause: AbortCause) -> Self {
        match cause {
            AbortCause::Timeout => NoticeKind::Timeout,
            AbortCause::DistractionExpiry => NoticeKind::DistractionExpiry,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn new(kind: NoticeKind) -> Self {
        Self {
            kind,
            message: kind.message().to_string(),
        }
    }
}

/// Observable effect of a controller operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    PhaseChanged { from: Phase, to: Phase },
    CountdownTick { remaining: u32 },
    TimerTick { remaining: u32 },
    GraceTick { remaining: u32 },
    QuestionStarted { index: usize, total: usize },
    AnswerRecorded { index: usize, correct: bool },
    Notice(Notice),
    Aborted { cause: AbortCause },
    ResultsReady { score: u32, percentage: f64 },
}
