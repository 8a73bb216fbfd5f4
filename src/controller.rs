//! Session controller
//!
//! Top-level state machine of a proctored quiz. It owns the phase, the
//! countdown and primary timers, the distraction supervisor, the interaction
//! collector and the capture pipeline, and coordinates them:
//!
//! ```text
//! CollectingProfile -> CollectingPreferences -> ReadingInstructions
//!   -> AwaitingCameraPermission -> GeneratingQuestions -> ReadyToStart
//!   -> Countdown -> Active <-> GracePeriod
//!   -> ConfidenceCapture -> Completed
//! (Active | GracePeriod) -> Aborted
//! ```
//!
//! The controller performs no I/O of its own. Every backend call is split into
//! a `begin_*` step that returns the request and marks it pending, and a
//! `complete_*` step that applies the response. While a call is pending the
//! timers keep ticking but no forward transition happens. The async `*_with`
//! helpers run both halves against a [`QuizBackend`].

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::backend::QuizBackend;
use crate::clock::{Clock, SystemClock};
use crate::config::ProctorConfig;
use crate::environment::{CameraAccess, ExclusiveDisplay};
use crate::error::ProctorError;
use crate::interaction::InteractionCollector;
use crate::signals::pipeline::{BehaviorCapture, NullCapture};
use crate::signals::types::QuestionMetrics;
use crate::supervisor::{DistractionSupervisor, SupervisorEvent};
use crate::timer::{CountdownTimer, Tick};
use crate::types::{
    AbortCause, AnswerRecord, BehavioralData, ConfidenceAck, GenerateQuizRequest,
    GenerateQuizResponse, Notice, NoticeKind, Phase, Profile, Question, QuizOutcome,
    QuizPreferences, QuizResults, Session, SessionEvent, SubmitAnswerRequest,
    SubmitAnswerResponse, UpdateConfidenceRequest,
};

/// Backend call currently awaiting its response
#[derive(Debug, Clone)]
enum Pending {
    Generate,
    Submit(Box<SubmitAnswerRequest>),
    Confidence,
    Results,
}

/// Metrics frozen at the first submission attempt of a question
#[derive(Debug, Clone)]
struct FrozenMetrics {
    question_index: usize,
    metrics: QuestionMetrics,
}

pub struct SessionController {
    config: ProctorConfig,
    clock: Arc<dyn Clock>,
    camera: Box<dyn CameraAccess>,
    display: Box<dyn ExclusiveDisplay>,
    capture: Box<dyn BehaviorCapture>,

    phase: Phase,
    profile: Option<Profile>,
    preferences: Option<QuizPreferences>,
    session: Option<Session>,
    outcome: Option<QuizOutcome>,
    confidence: Option<u8>,
    abort_cause: Option<AbortCause>,

    countdown: CountdownTimer,
    primary: CountdownTimer,
    supervisor: DistractionSupervisor,
    collector: InteractionCollector,
    pending: Option<Pending>,
    frozen: Option<FrozenMetrics>,

    events: Vec<SessionEvent>,
    released: bool,
}

impl SessionController {
    /// Controller with the system clock and passive capture switched off.
    pub fn new(
        config: ProctorConfig,
        camera: Box<dyn CameraAccess>,
        display: Box<dyn ExclusiveDisplay>,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
        let now = clock.now_ms();
        Self {
            countdown: CountdownTimer::new(config.session.countdown_secs),
            primary: CountdownTimer::new(0),
            supervisor: DistractionSupervisor::new(config.session.grace_secs),
            collector: InteractionCollector::new(now),
            config,
            clock,
            camera,
            display,
            capture: Box::new(NullCapture),
            phase: Phase::CollectingProfile,
            profile: None,
            preferences: None,
            session: None,
            outcome: None,
            confidence: None,
            abort_cause: None,
            pending: None,
            frozen: None,
            events: Vec::new(),
            released: false,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.collector = InteractionCollector::new(clock.now_ms());
        self.clock = clock;
        self
    }

    /// Attach a capture pipeline. Ignored when capture is disabled in config.
    pub fn with_capture(mut self, capture: Box<dyn BehaviorCapture>) -> Self {
        if self.config.signals.capture_enabled {
            self.capture = capture;
        } else {
            tracing::info!("passive capture disabled by configuration");
        }
        self
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &ProctorConfig {
        &self.config
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    pub fn preferences(&self) -> Option<&QuizPreferences> {
        self.preferences.as_ref()
    }

    /// The quiz in progress; `None` before generation and after completion.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn outcome(&self) -> Option<&QuizOutcome> {
        self.outcome.as_ref()
    }

    pub fn abort_cause(&self) -> Option<AbortCause> {
        self.abort_cause
    }

    pub fn confidence(&self) -> Option<u8> {
        self.confidence
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.session.as_ref().and_then(|s| s.current_question())
    }

    pub fn selected_option(&self) -> Option<char> {
        self.collector.selected()
    }

    pub fn time_remaining(&self) -> u32 {
        self.primary.remaining()
    }

    pub fn countdown_remaining(&self) -> u32 {
        self.countdown.remaining()
    }

    pub fn grace_remaining(&self) -> Option<u32> {
        self.supervisor.grace_remaining()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Whether the frame loop should be driving capture.
    pub fn wants_frames(&self) -> bool {
        self.phase.is_in_progress() && self.capture.is_running()
    }

    /// Take all events emitted since the last call.
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    // ── Setup phases ─────────────────────────────────────────────────

    pub fn submit_profile(&mut self, profile: Profile) -> Result<(), ProctorError> {
        self.expect_phase(&[Phase::CollectingProfile], "submit a profile")?;
        profile.validate()?;
        self.profile = Some(profile);
        self.set_phase(Phase::CollectingPreferences);
        Ok(())
    }

    pub fn submit_preferences(&mut self, preferences: QuizPreferences) -> Result<(), ProctorError> {
        self.expect_phase(&[Phase::CollectingPreferences], "submit preferences")?;
        preferences.validate()?;
        self.preferences = Some(preferences);
        self.set_phase(Phase::ReadingInstructions);
        Ok(())
    }

    /// Request the camera and, once granted, prepare question generation.
    ///
    /// A denial keeps the controller in `AwaitingCameraPermission`; calling
    /// `start` again retries.
    pub fn start(&mut self) -> Result<GenerateQuizRequest, ProctorError> {
        self.expect_phase(
            &[Phase::ReadingInstructions, Phase::AwaitingCameraPermission],
            "start the quiz",
        )?;
        let preferences = self
            .preferences
            .clone()
            .ok_or_else(|| ProctorError::InvalidProfile("preferences are missing".to_string()))?;

        self.set_phase(Phase::AwaitingCameraPermission);
        if let Err(e) = self.camera.request_access() {
            tracing::warn!(error = %e, "camera access denied");
            self.notice(NoticeKind::CameraDenied);
            return Err(e);
        }

        self.set_phase(Phase::GeneratingQuestions);
        self.pending = Some(Pending::Generate);
        Ok(GenerateQuizRequest {
            num_questions: self.config.session.num_questions,
            subject: preferences.subject,
            level: preferences.level,
            user_info: preferences.user_info,
        })
    }

    pub fn complete_generation(
        &mut self,
        result: Result<GenerateQuizResponse, ProctorError>,
    ) -> Result<(), ProctorError> {
        if !self.take_pending(|p| matches!(p, Pending::Generate), "complete generation")? {
            return Ok(());
        }

        let response = match result {
            Ok(response) if response.questions.is_empty() => Err(ProctorError::NetworkFailure(
                "backend generated no questions".to_string(),
            )),
            other => other,
        };

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "question generation failed");
                self.notice(NoticeKind::GenerationFailed);
                self.set_phase(Phase::ReadingInstructions);
                return Err(e);
            }
        };

        let preferences = self.preferences.clone().unwrap_or_default();
        let questions: Vec<Question> = response
            .questions
            .into_iter()
            .map(Question::from_generated)
            .collect();
        let budget = self.config.session.time_budget_secs(questions.len());
        tracing::info!(
            session_id = %response.session_id,
            questions = questions.len(),
            budget_secs = budget,
            "quiz generated"
        );

        self.primary = CountdownTimer::new(budget);
        self.session = Some(Session {
            id: response.session_id,
            subject: preferences.subject,
            level: preferences.level,
            questions,
            current_index: 0,
            phase: self.phase,
            time_remaining: budget,
            answers: Vec::new(),
        });
        self.set_phase(Phase::ReadyToStart);
        Ok(())
    }

    /// Enter exclusive display mode and begin the pre-quiz countdown.
    ///
    /// If exclusive mode is refused the generated quiz is discarded and the
    /// controller returns to the instructions.
    pub fn confirm_start(&mut self) -> Result<(), ProctorError> {
        self.expect_phase(&[Phase::ReadyToStart], "confirm the start")?;
        if let Err(e) = self.display.enter_exclusive() {
            tracing::warn!(error = %e, "exclusive display refused");
            self.notice(NoticeKind::DisplayDenied);
            self.session = None;
            self.set_phase(Phase::ReadingInstructions);
            return Err(e);
        }

        self.supervisor.on_display_change(true);
        self.countdown = CountdownTimer::new(self.config.session.countdown_secs);
        self.countdown.start();
        self.set_phase(Phase::Countdown);
        self.events.push(SessionEvent::CountdownTick {
            remaining: self.countdown.remaining(),
        });
        Ok(())
    }

    // ── Time ─────────────────────────────────────────────────────────

    /// Advance one second.
    ///
    /// Exactly one clock consumes the tick: the countdown, the primary budget
    /// while Active, or the grace countdown while in GracePeriod.
    pub fn tick(&mut self) {
        match self.phase {
            Phase::Countdown => match self.countdown.tick() {
                Tick::Remaining(remaining) => {
                    self.events.push(SessionEvent::CountdownTick { remaining });
                }
                Tick::Expired => {
                    self.events.push(SessionEvent::CountdownTick { remaining: 0 });
                    self.enter_active();
                }
                Tick::Ignored => {}
            },
            Phase::Active => match self.primary.tick() {
                Tick::Remaining(remaining) => {
                    self.sync_time_remaining();
                    self.events.push(SessionEvent::TimerTick { remaining });
                    tracing::trace!(remaining, "primary timer tick");
                }
                Tick::Expired => {
                    self.sync_time_remaining();
                    self.events.push(SessionEvent::TimerTick { remaining: 0 });
                    self.abort(AbortCause::Timeout);
                }
                Tick::Ignored => {}
            },
            Phase::GracePeriod => match self.supervisor.tick() {
                SupervisorEvent::GraceTick { remaining } => {
                    self.events.push(SessionEvent::GraceTick { remaining });
                    tracing::debug!(remaining, "grace period tick");
                }
                SupervisorEvent::Expired => {
                    self.events.push(SessionEvent::GraceTick { remaining: 0 });
                    self.abort(AbortCause::DistractionExpiry);
                }
                _ => {}
            },
            _ => {}
        }
    }

    /// Exclusive display mode changed outside the controller's control.
    ///
    /// During the countdown the change is only recorded; it takes effect when
    /// the first question opens.
    pub fn display_changed(&mut self, exclusive: bool) {
        if self.phase == Phase::Countdown {
            self.supervisor.on_display_change(exclusive);
            return;
        }
        if !self.phase.is_in_progress() {
            return;
        }
        match self.supervisor.on_display_change(exclusive) {
            SupervisorEvent::GraceStarted { remaining } => self.enter_grace(remaining),
            SupervisorEvent::Regained { elapsed } => {
                self.primary.resume();
                tracing::info!(
                    elapsed,
                    remaining = self.primary.remaining(),
                    "exclusive display regained"
                );
                self.set_phase(Phase::Active);
            }
            _ => {}
        }
    }

    /// Process one video frame if a question is on screen.
    pub fn on_frame(&mut self) {
        if self.phase.is_in_progress() {
            self.capture.on_frame();
        }
    }

    // ── Answering ────────────────────────────────────────────────────

    pub fn select_option(&mut self, option: char) -> Result<(), ProctorError> {
        self.expect_phase(&[Phase::Active], "select an option")?;
        if self.pending.is_some() {
            return Err(ProctorError::RequestPending);
        }
        self.ensure_option(option)?;
        let now = self.clock.now_ms();
        self.collector.select(option, now);
        Ok(())
    }

    pub fn hover_enter(&mut self, option: char) -> Result<(), ProctorError> {
        self.expect_phase(&[Phase::Active], "hover an option")?;
        self.ensure_option(option)?;
        let now = self.clock.now_ms();
        self.collector.hover_enter(option, now);
        Ok(())
    }

    pub fn hover_leave(&mut self, option: char) -> Result<(), ProctorError> {
        self.expect_phase(&[Phase::Active], "hover an option")?;
        self.ensure_option(option)?;
        let now = self.clock.now_ms();
        self.collector.hover_leave(option, now);
        Ok(())
    }

    /// Freeze the current question's behavioral data and build its submission.
    ///
    /// Metrics are frozen at the first attempt and reused on retries; the
    /// interaction record is read again so it matches the submitted option.
    pub fn begin_submit(&mut self) -> Result<SubmitAnswerRequest, ProctorError> {
        self.expect_phase(&[Phase::Active], "submit an answer")?;
        if self.pending.is_some() {
            return Err(ProctorError::RequestPending);
        }
        let Some(selected) = self.collector.selected() else {
            self.notice(NoticeKind::NoSelection);
            return Err(ProctorError::NoSelection);
        };
        let session = self.session.as_ref().ok_or_else(|| self.invalid("submit an answer"))?;
        let index = session.current_index;
        let question = session
            .current_question()
            .ok_or_else(|| self.invalid("submit an answer"))?;
        let selected_answer = question.option_index(selected)?;
        let question_id = question.id.clone();
        let session_id = session.id.clone();

        let reused = self
            .frozen
            .as_ref()
            .filter(|frozen| frozen.question_index == index)
            .map(|frozen| frozen.metrics.clone());
        let metrics = match reused {
            Some(metrics) => metrics,
            None => {
                let metrics = self.capture.snapshot();
                self.frozen = Some(FrozenMetrics {
                    question_index: index,
                    metrics: metrics.clone(),
                });
                metrics
            }
        };

        let request = SubmitAnswerRequest {
            session_id,
            question_id,
            selected_answer,
            confidence: self.config.session.default_confidence,
            behavioral_data: BehavioralData {
                metrics,
                interaction: self.collector.snapshot(self.clock.now_ms()),
            },
        };
        tracing::debug!(
            question = index,
            selected = %selected,
            frames = request.behavioral_data.metrics.frames_analyzed,
            "submitting answer"
        );
        self.pending = Some(Pending::Submit(Box::new(request.clone())));
        Ok(request)
    }

    /// Apply the backend's verdict.
    ///
    /// A response arriving during the grace period is still accepted. A
    /// response arriving after the session was aborted is ignored.
    pub fn complete_submit(
        &mut self,
        result: Result<SubmitAnswerResponse, ProctorError>,
    ) -> Result<(), ProctorError> {
        let stale = self.phase.is_terminal() || self.released;
        if stale && !matches!(self.pending, Some(Pending::Submit(_))) {
            tracing::debug!(phase = %self.phase, "late submission response ignored");
            return Ok(());
        }
        let request = match self.pending.take() {
            Some(Pending::Submit(request)) => request,
            other => {
                self.pending = other;
                return Err(self.invalid("complete a submission"));
            }
        };

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, question_id = %request.question_id, "answer submission failed");
                self.notice(NoticeKind::SubmissionFailed);
                return Err(e);
            }
        };

        let selected_option = self
            .session
            .as_ref()
            .and_then(|s| s.current_question())
            .and_then(|q| q.options.get(request.selected_answer))
            .map(|o| o.id);
        let Some(selected_option) = selected_option else {
            return Err(self.invalid("complete a submission"));
        };
        let Some(session) = self.session.as_mut() else {
            return Err(self.invalid("complete a submission"));
        };
        let index = session.current_index;
        if let Some(question) = session.questions.get_mut(index) {
            question.correct_answer = response.correct_answer;
            question.explanation = response.explanation.clone();
        }
        session.answers.push(AnswerRecord {
            question_index: index,
            question_id: request.question_id,
            selected_option,
            selected_answer: request.selected_answer,
            is_correct: response.correct,
            confidence: request.confidence,
            interaction: request.behavioral_data.interaction,
        });
        let is_last = session.is_last_question();
        tracing::info!(question = index, correct = response.correct, "answer recorded");
        self.events.push(SessionEvent::AnswerRecorded {
            index,
            correct: response.correct,
        });

        if is_last {
            self.enter_confidence_capture();
        } else {
            self.start_question(index + 1);
        }
        Ok(())
    }

    // ── Wrap-up ──────────────────────────────────────────────────────

    /// Record the session-wide confidence and apply it to every answer.
    pub fn submit_confidence(
        &mut self,
        confidence: u8,
    ) -> Result<UpdateConfidenceRequest, ProctorError> {
        self.expect_phase(&[Phase::ConfidenceCapture], "submit confidence")?;
        if self.pending.is_some() {
            return Err(ProctorError::RequestPending);
        }
        if confidence > 100 {
            return Err(ProctorError::InvalidConfidence(confidence));
        }
        let session = self
            .session
            .as_mut()
            .ok_or(ProctorError::InvalidTransition {
                phase: Phase::ConfidenceCapture.to_string(),
                action: "submit confidence",
            })?;
        for answer in &mut session.answers {
            answer.confidence = confidence;
        }
        let session_id = session.id.clone();
        self.confidence = Some(confidence);
        self.pending = Some(Pending::Confidence);
        Ok(UpdateConfidenceRequest {
            session_id,
            confidence,
        })
    }

    /// Persisting confidence is best-effort: a failure is surfaced but the
    /// session completes either way.
    pub fn complete_confidence(
        &mut self,
        result: Result<ConfidenceAck, ProctorError>,
    ) -> Result<(), ProctorError> {
        if !self.take_pending(|p| matches!(p, Pending::Confidence), "complete confidence")? {
            return Ok(());
        }
        if let Err(e) = result {
            tracing::warn!(error = %e, "confidence could not be persisted");
            self.notice(NoticeKind::ConfidenceNotSaved);
        }
        self.set_phase(Phase::Completed);
        self.release();
        Ok(())
    }

    pub fn begin_results(&mut self) -> Result<String, ProctorError> {
        self.expect_phase(&[Phase::Completed], "fetch results")?;
        if self.pending.is_some() {
            return Err(ProctorError::RequestPending);
        }
        if self.outcome.is_some() {
            return Err(self.invalid("fetch results again"));
        }
        let session_id = self
            .session
            .as_ref()
            .map(|s| s.id.clone())
            .ok_or_else(|| self.invalid("fetch results"))?;
        self.pending = Some(Pending::Results);
        Ok(session_id)
    }

    /// Replace the session with its immutable outcome.
    pub fn complete_results(
        &mut self,
        result: Result<QuizResults, ProctorError>,
    ) -> Result<&QuizOutcome, ProctorError> {
        if !self.take_pending(|p| matches!(p, Pending::Results), "complete results")? {
            return Err(self.invalid("complete results"));
        }
        let results = match result {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!(error = %e, "results unavailable");
                self.notice(NoticeKind::ResultsUnavailable);
                return Err(e);
            }
        };
        let session = self
            .session
            .take()
            .ok_or_else(|| self.invalid("complete results"))?;

        tracing::info!(
            session_id = %session.id,
            score = results.score,
            percentage = results.percentage,
            "quiz completed"
        );
        self.events.push(SessionEvent::ResultsReady {
            score: results.score,
            percentage: results.percentage,
        });
        let outcome: &QuizOutcome = self.outcome.insert(QuizOutcome {
            attempt_id: Uuid::new_v4(),
            results,
            answers: session.answers,
            confidence: self.confidence,
            completed_at: Utc::now(),
        });
        Ok(outcome)
    }

    // ── Async helpers ────────────────────────────────────────────────

    pub async fn start_with<B: QuizBackend + ?Sized>(
        &mut self,
        backend: &B,
    ) -> Result<(), ProctorError> {
        let request = self.start()?;
        let result = backend.generate_quiz(&request).await;
        self.complete_generation(result)
    }

    pub async fn submit_with<B: QuizBackend + ?Sized>(
        &mut self,
        backend: &B,
    ) -> Result<(), ProctorError> {
        let request = self.begin_submit()?;
        let result = backend.submit_answer(&request).await;
        self.complete_submit(result)
    }

    /// Send the confidence, then fetch the results.
    pub async fn finish_with<B: QuizBackend + ?Sized>(
        &mut self,
        backend: &B,
        confidence: u8,
    ) -> Result<&QuizOutcome, ProctorError> {
        let request = self.submit_confidence(confidence)?;
        let ack = backend.update_confidence(&request).await;
        self.complete_confidence(ack)?;
        let session_id = self.begin_results()?;
        let results = backend.quiz_results(&session_id).await;
        self.complete_results(results)
    }

    // ── Teardown ─────────────────────────────────────────────────────

    /// Cancel every timer, stop capture and leave exclusive mode.
    ///
    /// Returns `true` only for the call that released anything; repeated calls
    /// are no-ops. Also runs on drop.
    pub fn teardown(&mut self) -> bool {
        let released = self.release();
        if released {
            self.pending = None;
        }
        released
    }

    // ── Internals ────────────────────────────────────────────────────

    fn enter_active(&mut self) {
        self.primary.start();
        let grace = self.supervisor.arm(self.display.is_exclusive());
        self.set_phase(Phase::Active);

        match self.capture.start() {
            Ok(()) => tracing::debug!("passive capture started"),
            Err(e) => {
                tracing::warn!(error = %e, "passive capture unavailable, continuing without it");
                self.notice(NoticeKind::CaptureDegraded);
            }
        }
        self.start_question(0);

        if let SupervisorEvent::GraceStarted { remaining } = grace {
            tracing::warn!("exclusive display lost before the first question");
            self.enter_grace(remaining);
        }
    }

    fn enter_grace(&mut self, remaining: u32) {
        self.primary.pause();
        self.set_phase(Phase::GracePeriod);
        self.notice(NoticeKind::ExclusiveModeLost);
        self.events.push(SessionEvent::GraceTick { remaining });
    }

    /// Swap in fresh per-question state. The only place metrics are reset.
    fn start_question(&mut self, index: usize) {
        let now = self.clock.now_ms();
        self.capture.reset();
        self.collector.reset(now);
        self.frozen = None;

        let total = match self.session.as_mut() {
            Some(session) => {
                session.current_index = index;
                session.questions.len()
            }
            None => 0,
        };
        tracing::debug!(index, total, "question started");
        self.events.push(SessionEvent::QuestionStarted { index, total });
    }

    fn enter_confidence_capture(&mut self) {
        self.primary.cancel();
        self.supervisor.disarm();
        self.capture.stop();
        self.sync_time_remaining();
        self.set_phase(Phase::ConfidenceCapture);
    }

    fn abort(&mut self, cause: AbortCause) {
        if self.phase.is_terminal() {
            return;
        }
        tracing::warn!(
            cause = cause.as_str(),
            phase = %self.phase,
            time_remaining = self.primary.remaining(),
            "session aborted"
        );
        self.abort_cause = Some(cause);
        self.pending = None;
        self.set_phase(Phase::Aborted);
        self.notice(NoticeKind::from(cause));
        self.events.push(SessionEvent::Aborted { cause });
        self.release();
    }

    /// Shared terminal path: cancel timers, stop capture, exit exclusive mode.
    fn release(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;
        self.countdown.cancel();
        self.primary.cancel();
        self.supervisor.disarm();
        self.capture.stop();
        if self.display.is_exclusive() {
            self.display.exit_exclusive();
        }
        tracing::debug!(phase = %self.phase, "session resources released");
        true
    }

    fn set_phase(&mut self, to: Phase) {
        let from = self.phase;
        if from == to {
            return;
        }
        self.phase = to;
        if let Some(session) = self.session.as_mut() {
            session.phase = to;
        }
        tracing::info!(from = %from, to = %to, "phase changed");
        self.events.push(SessionEvent::PhaseChanged { from, to });
    }

    fn sync_time_remaining(&mut self) {
        let remaining = self.primary.remaining();
        if let Some(session) = self.session.as_mut() {
            session.time_remaining = remaining;
        }
    }

    fn notice(&mut self, kind: NoticeKind) {
        self.events.push(SessionEvent::Notice(Notice::new(kind)));
    }

    fn invalid(&self, action: &'static str) -> ProctorError {
        ProctorError::InvalidTransition {
            phase: self.phase.to_string(),
            action,
        }
    }

    fn expect_phase(&self, allowed: &[Phase], action: &'static str) -> Result<(), ProctorError> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    fn ensure_option(&self, option: char) -> Result<(), ProctorError> {
        match self.current_question() {
            Some(question) if question.has_option(option) => Ok(()),
            _ => Err(ProctorError::UnknownOption(option)),
        }
    }

    /// Clear the matching pending call. `Ok(false)` means the response is
    /// stale (the session already ended) and must be ignored.
    fn take_pending(
        &mut self,
        is_expected: impl Fn(&Pending) -> bool,
        action: &'static str,
    ) -> Result<bool, ProctorError> {
        if self.pending.as_ref().is_some_and(is_expected) {
            self.pending = None;
            return Ok(true);
        }
        if self.phase == Phase::Aborted || self.released {
            tracing::debug!(phase = %self.phase, action, "stale backend response ignored");
            return Ok(false);
        }
        Err(self.invalid(action))
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::types::GeneratedQuestion;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FakeCamera {
        deny: Arc<AtomicBool>,
    }

    impl CameraAccess for FakeCamera {
        fn request_access(&mut self) -> Result<(), ProctorError> {
            if self.deny.load(Ordering::SeqCst) {
                Err(ProctorError::PermissionDenied("camera".into()))
            } else {
                Ok(())
            }
        }
    }

    #[derive(Clone, Default)]
    struct FakeDisplay {
        refuse: Arc<AtomicBool>,
        exclusive: Arc<AtomicBool>,
        exits: Arc<AtomicUsize>,
    }

    impl ExclusiveDisplay for FakeDisplay {
        fn enter_exclusive(&mut self) -> Result<(), ProctorError> {
            if self.refuse.load(Ordering::SeqCst) {
                return Err(ProctorError::PermissionDenied("fullscreen".into()));
            }
            self.exclusive.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn exit_exclusive(&mut self) {
            if self.exclusive.swap(false, Ordering::SeqCst) {
                self.exits.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn is_exclusive(&self) -> bool {
            self.exclusive.load(Ordering::SeqCst)
        }
    }

    #[derive(Clone, Default)]
    struct SpyCapture {
        frames: Arc<AtomicUsize>,
        resets: Arc<AtomicUsize>,
        stops: Arc<AtomicUsize>,
        running: Arc<AtomicBool>,
    }

    impl BehaviorCapture for SpyCapture {
        fn start(&mut self) -> Result<(), ProctorError> {
            self.running.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn stop(&mut self) {
            if self.running.swap(false, Ordering::SeqCst) {
                self.stops.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn snapshot(&self) -> QuestionMetrics {
            QuestionMetrics {
                frames_analyzed: self.frames.load(Ordering::SeqCst) as u64,
                ..QuestionMetrics::empty()
            }
        }

        fn reset(&mut self) {
            self.frames.store(0, Ordering::SeqCst);
            self.resets.fetch_add(1, Ordering::SeqCst);
        }

        fn on_frame(&mut self) {
            self.frames.fetch_add(1, Ordering::SeqCst);
        }

        fn is_running(&self) -> bool {
            self.running.load(Ordering::SeqCst)
        }
    }

    struct Harness {
        controller: SessionController,
        clock: ManualClock,
        camera_denied: Arc<AtomicBool>,
        display: FakeDisplay,
        capture: SpyCapture,
    }

    fn harness() -> Harness {
        let clock = ManualClock::new(0);
        let camera_denied = Arc::new(AtomicBool::new(false));
        let display = FakeDisplay::default();
        let capture = SpyCapture::default();
        let controller = SessionController::new(
            ProctorConfig::default(),
            Box::new(FakeCamera {
                deny: camera_denied.clone(),
            }),
            Box::new(display.clone()),
        )
        .with_clock(Arc::new(clock.clone()))
        .with_capture(Box::new(capture.clone()));
        Harness {
            controller,
            clock,
            camera_denied,
            display,
            capture,
        }
    }

    fn generated(count: usize) -> GenerateQuizResponse {
        GenerateQuizResponse {
            session_id: "s-1".to_string(),
            questions: (0..count)
                .map(|i| GeneratedQuestion {
                    id: format!("q{}", i + 1),
                    question: format!("Question {}", i + 1),
                    options: vec!["w".into(), "x".into(), "y".into(), "z".into()],
                })
                .collect(),
        }
    }

    fn verdict(correct: bool) -> SubmitAnswerResponse {
        SubmitAnswerResponse {
            correct,
            correct_answer: Some(0),
            explanation: Some("because".into()),
            score: None,
            total_questions: None,
        }
    }

    /// Drive a fresh harness up to the first Active question.
    fn active(count: usize) -> Harness {
        let mut h = harness();
        let c = &mut h.controller;
        c.submit_profile(Profile::new("Amina")).unwrap();
        c.submit_preferences(QuizPreferences::new("Math", "Lycée")).unwrap();
        c.start().unwrap();
        c.complete_generation(Ok(generated(count))).unwrap();
        c.confirm_start().unwrap();
        for _ in 0..5 {
            c.tick();
        }
        assert_eq!(c.phase(), Phase::Active);
        h
    }

    fn answer(c: &mut SessionController, option: char, correct: bool) {
        c.select_option(option).unwrap();
        c.begin_submit().unwrap();
        c.complete_submit(Ok(verdict(correct))).unwrap();
    }

    #[test]
    fn test_setup_phases_in_order() {
        let mut h = harness();
        let c = &mut h.controller;
        assert_eq!(c.phase(), Phase::CollectingProfile);
        assert!(c.submit_preferences(QuizPreferences::new("Math", "L1")).is_err());

        assert!(c.submit_profile(Profile::new("")).is_err());
        assert_eq!(c.phase(), Phase::CollectingProfile);
        c.submit_profile(Profile::new("Amina")).unwrap();
        c.submit_preferences(QuizPreferences::new("Math", "L1")).unwrap();
        assert_eq!(c.phase(), Phase::ReadingInstructions);

        let request = c.start().unwrap();
        assert_eq!(request.num_questions, 10);
        assert_eq!(request.subject, "Math");
        assert_eq!(c.phase(), Phase::GeneratingQuestions);
        assert!(c.is_pending());
    }

    #[test]
    fn test_camera_denial_keeps_phase_and_is_retryable() {
        let mut h = harness();
        h.camera_denied.store(true, Ordering::SeqCst);
        let c = &mut h.controller;
        c.submit_profile(Profile::new("Amina")).unwrap();
        c.submit_preferences(QuizPreferences::new("Math", "L1")).unwrap();

        let err = c.start().unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(c.phase(), Phase::AwaitingCameraPermission);
        assert!(c.drain_events().contains(&SessionEvent::Notice(Notice::new(
            NoticeKind::CameraDenied
        ))));

        h.camera_denied.store(false, Ordering::SeqCst);
        h.controller.start().unwrap();
        assert_eq!(h.controller.phase(), Phase::GeneratingQuestions);
    }

    #[test]
    fn test_generation_failure_returns_to_instructions() {
        let mut h = harness();
        let c = &mut h.controller;
        c.submit_profile(Profile::new("Amina")).unwrap();
        c.submit_preferences(QuizPreferences::new("Math", "L1")).unwrap();
        c.start().unwrap();
        let err = c
            .complete_generation(Err(ProctorError::NetworkFailure("500".into())))
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(c.phase(), Phase::ReadingInstructions);
        assert!(!c.is_pending());

        c.start().unwrap();
        assert!(c.complete_generation(Ok(generated(0))).is_err());
        assert_eq!(c.phase(), Phase::ReadingInstructions);
    }

    #[test]
    fn test_budget_scales_with_question_count() {
        let mut h = harness();
        let c = &mut h.controller;
        c.submit_profile(Profile::new("Amina")).unwrap();
        c.submit_preferences(QuizPreferences::new("Math", "L1")).unwrap();
        c.start().unwrap();
        c.complete_generation(Ok(generated(10))).unwrap();
        assert_eq!(c.phase(), Phase::ReadyToStart);
        assert_eq!(c.time_remaining(), 1200);
        assert_eq!(c.session().map(|s| s.time_remaining), Some(1200));
    }

    #[test]
    fn test_display_refusal_returns_to_instructions() {
        let mut h = harness();
        h.display.refuse.store(true, Ordering::SeqCst);
        let c = &mut h.controller;
        c.submit_profile(Profile::new("Amina")).unwrap();
        c.submit_preferences(QuizPreferences::new("Math", "L1")).unwrap();
        c.start().unwrap();
        c.complete_generation(Ok(generated(2))).unwrap();
        assert!(c.confirm_start().is_err());
        assert_eq!(c.phase(), Phase::ReadingInstructions);
        assert!(c.session().is_none());
    }

    #[test]
    fn test_countdown_runs_five_seconds() {
        let mut h = harness();
        let c = &mut h.controller;
        c.submit_profile(Profile::new("Amina")).unwrap();
        c.submit_preferences(QuizPreferences::new("Math", "L1")).unwrap();
        c.start().unwrap();
        c.complete_generation(Ok(generated(2))).unwrap();
        c.confirm_start().unwrap();
        c.drain_events();

        for _ in 0..4 {
            c.tick();
            assert_eq!(c.phase(), Phase::Countdown);
        }
        c.tick();
        assert_eq!(c.phase(), Phase::Active);
        assert_eq!(c.time_remaining(), 240);

        let ticks: Vec<u32> = c
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::CountdownTick { remaining } => Some(remaining),
                _ => None,
            })
            .collect();
        assert_eq!(ticks, vec![4, 3, 2, 1, 0]);
    }

    #[test]
    fn test_submit_without_selection_is_surfaced() {
        let mut h = active(2);
        let c = &mut h.controller;
        assert!(matches!(c.begin_submit(), Err(ProctorError::NoSelection)));
        assert!(!c.is_pending());
        assert!(matches!(c.select_option('Q'), Err(ProctorError::UnknownOption('Q'))));
    }

    #[test]
    fn test_request_carries_index_default_confidence_and_metrics() {
        let mut h = active(2);
        for _ in 0..3 {
            h.controller.on_frame();
        }
        let c = &mut h.controller;
        h.clock.advance(2_000);
        c.select_option('C').unwrap();
        let request = c.begin_submit().unwrap();
        assert_eq!(request.session_id, "s-1");
        assert_eq!(request.question_id, "q1");
        assert_eq!(request.selected_answer, 2);
        assert_eq!(request.confidence, 50);
        assert_eq!(request.behavioral_data.metrics.frames_analyzed, 3);
        assert_eq!(request.behavioral_data.interaction.time_to_first_click, 2.0);
        assert!(matches!(c.begin_submit(), Err(ProctorError::RequestPending)));
        assert!(matches!(c.select_option('A'), Err(ProctorError::RequestPending)));
    }

    #[test]
    fn test_failed_submission_keeps_state_and_reuses_frozen_metrics() {
        let mut h = active(2);
        h.controller.on_frame();
        h.controller.on_frame();
        let c = &mut h.controller;
        c.select_option('A').unwrap();
        c.begin_submit().unwrap();
        let err = c
            .complete_submit(Err(ProctorError::NetworkFailure("timeout".into())))
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(c.phase(), Phase::Active);
        assert_eq!(c.selected_option(), Some('A'));
        assert_eq!(c.session().map(|s| s.current_index), Some(0));

        c.on_frame();
        let retry = c.begin_submit().unwrap();
        assert_eq!(retry.behavioral_data.metrics.frames_analyzed, 2);
        c.complete_submit(Ok(verdict(true))).unwrap();
        assert_eq!(c.session().map(|s| s.current_index), Some(1));
    }

    #[test]
    fn test_metrics_reset_exactly_once_per_question() {
        let mut h = active(3);
        assert_eq!(h.capture.resets.load(Ordering::SeqCst), 1);
        answer(&mut h.controller, 'A', true);
        assert_eq!(h.capture.resets.load(Ordering::SeqCst), 2);
        assert_eq!(h.controller.begin_submit().unwrap_err().to_string(), "No option selected");
        assert_eq!(h.capture.resets.load(Ordering::SeqCst), 2);
        assert_eq!(h.controller.selected_option(), None);
    }

    #[test]
    fn test_grace_period_pauses_and_resumes_primary() {
        let mut h = active(2);
        let c = &mut h.controller;
        for _ in 0..30 {
            c.tick();
        }
        let before = c.time_remaining();
        assert_eq!(before, 210);

        c.display_changed(false);
        assert_eq!(c.phase(), Phase::GracePeriod);
        for _ in 0..9 {
            c.tick();
        }
        assert_eq!(c.time_remaining(), before);
        assert_eq!(c.grace_remaining(), Some(1));

        c.display_changed(true);
        assert_eq!(c.phase(), Phase::Active);
        assert_eq!(c.time_remaining(), before);
        c.tick();
        assert_eq!(c.time_remaining(), before - 1);
    }

    #[test]
    fn test_grace_expiry_aborts_once() {
        let mut h = active(2);
        let c = &mut h.controller;
        c.display_changed(false);
        for _ in 0..10 {
            c.tick();
        }
        assert_eq!(c.phase(), Phase::Aborted);
        assert_eq!(c.abort_cause(), Some(AbortCause::DistractionExpiry));

        for _ in 0..20 {
            c.tick();
        }
        c.display_changed(true);
        c.display_changed(false);
        let aborts = c
            .drain_events()
            .into_iter()
            .filter(|e| matches!(e, SessionEvent::Aborted { .. }))
            .count();
        assert_eq!(aborts, 1);
        assert!(!h.display.is_exclusive());
        assert!(!h.capture.is_running());
    }

    fn counting_down(count: usize) -> Harness {
        let mut h = harness();
        let c = &mut h.controller;
        c.submit_profile(Profile::new("Amina")).unwrap();
        c.submit_preferences(QuizPreferences::new("Math", "L1")).unwrap();
        c.start().unwrap();
        c.complete_generation(Ok(generated(count))).unwrap();
        c.confirm_start().unwrap();
        assert_eq!(c.phase(), Phase::Countdown);
        h
    }

    #[test]
    fn test_exclusive_mode_lost_during_countdown_opens_grace() {
        let mut h = counting_down(2);
        let c = &mut h.controller;
        c.tick();
        h.display.exclusive.store(false, Ordering::SeqCst);
        c.display_changed(false);
        assert_eq!(c.phase(), Phase::Countdown);

        for _ in 0..4 {
            c.tick();
        }
        assert_eq!(c.phase(), Phase::GracePeriod);
        assert_eq!(c.grace_remaining(), Some(10));
        assert_eq!(c.session().map(|s| s.current_index), Some(0));

        for _ in 0..9 {
            c.tick();
        }
        assert_eq!(c.time_remaining(), 240);
        assert_eq!(c.phase(), Phase::GracePeriod);
        c.tick();
        assert_eq!(c.phase(), Phase::Aborted);
        assert_eq!(c.abort_cause(), Some(AbortCause::DistractionExpiry));
    }

    #[test]
    fn test_countdown_loss_then_regain_starts_normally() {
        let mut h = counting_down(2);
        let c = &mut h.controller;
        c.display_changed(false);
        c.tick();
        c.display_changed(true);
        for _ in 0..4 {
            c.tick();
        }
        assert_eq!(c.phase(), Phase::Active);
        assert_eq!(c.grace_remaining(), None);
        c.tick();
        assert_eq!(c.time_remaining(), 239);
    }

    #[test]
    fn test_display_not_exclusive_at_first_question_opens_grace() {
        let mut h = counting_down(1);
        h.display.exclusive.store(false, Ordering::SeqCst);
        let c = &mut h.controller;
        for _ in 0..5 {
            c.tick();
        }
        assert_eq!(c.phase(), Phase::GracePeriod);
        let notices = c
            .drain_events()
            .into_iter()
            .filter(|e| {
                matches!(e, SessionEvent::Notice(n) if n.kind == NoticeKind::ExclusiveModeLost)
            })
            .count();
        assert_eq!(notices, 1);

        h.display.exclusive.store(true, Ordering::SeqCst);
        c.display_changed(true);
        assert_eq!(c.phase(), Phase::Active);
        assert_eq!(c.time_remaining(), 120);
    }

    #[test]
    fn test_recorded_option_matches_submitted_index() {
        let mut h = active(2);
        let c = &mut h.controller;
        c.select_option('A').unwrap();
        c.select_option('D').unwrap();
        let request = c.begin_submit().unwrap();
        assert_eq!(request.selected_answer, 3);
        c.complete_submit(Ok(verdict(false))).unwrap();
        let record = &c.session().unwrap().answers[0];
        assert_eq!(record.selected_option, 'D');
        assert_eq!(record.selected_answer, 3);
    }

    #[test]
    fn test_timeout_aborts_with_distinct_cause() {
        let mut h = active(1);
        let c = &mut h.controller;
        for _ in 0..119 {
            c.tick();
        }
        assert_eq!(c.phase(), Phase::Active);
        c.tick();
        assert_eq!(c.phase(), Phase::Aborted);
        assert_eq!(c.abort_cause(), Some(AbortCause::Timeout));
        assert_eq!(h.display.exits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_late_submission_after_abort_is_ignored() {
        let mut h = active(1);
        let c = &mut h.controller;
        c.select_option('B').unwrap();
        c.begin_submit().unwrap();
        for _ in 0..120 {
            c.tick();
        }
        assert_eq!(c.phase(), Phase::Aborted);
        c.complete_submit(Ok(verdict(true))).unwrap();
        assert_eq!(c.phase(), Phase::Aborted);
        assert_eq!(c.session().map(|s| s.answers.len()), Some(0));
    }

    #[test]
    fn test_last_answer_during_grace_moves_to_confidence() {
        let mut h = active(1);
        let c = &mut h.controller;
        c.select_option('A').unwrap();
        c.begin_submit().unwrap();
        c.display_changed(false);
        assert_eq!(c.phase(), Phase::GracePeriod);
        c.complete_submit(Ok(verdict(true))).unwrap();
        assert_eq!(c.phase(), Phase::ConfidenceCapture);
        assert_eq!(c.grace_remaining(), None);

        for _ in 0..30 {
            c.tick();
        }
        assert_eq!(c.phase(), Phase::ConfidenceCapture);
    }

    #[test]
    fn test_confidence_applies_to_all_answers_and_failure_does_not_block() {
        let mut h = active(2);
        answer(&mut h.controller, 'A', true);
        answer(&mut h.controller, 'B', false);
        let c = &mut h.controller;
        assert_eq!(c.phase(), Phase::ConfidenceCapture);
        assert!(matches!(c.submit_confidence(101), Err(ProctorError::InvalidConfidence(101))));

        let request = c.submit_confidence(70).unwrap();
        assert_eq!(request.confidence, 70);
        assert!(c
            .session()
            .unwrap()
            .answers
            .iter()
            .all(|a| a.confidence == 70));

        c.complete_confidence(Err(ProctorError::NetworkFailure("down".into())))
            .unwrap();
        assert_eq!(c.phase(), Phase::Completed);
        assert!(!h.display.is_exclusive());
    }

    #[test]
    fn test_results_supersede_session() {
        let mut h = active(1);
        answer(&mut h.controller, 'A', true);
        let c = &mut h.controller;
        c.submit_confidence(80).unwrap();
        c.complete_confidence(Ok(ConfidenceAck::default())).unwrap();

        let session_id = c.begin_results().unwrap();
        assert_eq!(session_id, "s-1");
        let results = QuizResults {
            session_id,
            score: 1,
            total_questions: 1,
            percentage: 100.0,
            level: "Excellent".into(),
            message: "Félicitations !".into(),
            color: "success".into(),
            question_results: Vec::new(),
            recommendations: Vec::new(),
            answered_count: 1,
            behavioral_analysis: None,
            behavioral_insights: Vec::new(),
        };
        let outcome = c.complete_results(Ok(results)).unwrap();
        assert_eq!(outcome.confidence, Some(80));
        assert_eq!(outcome.answers.len(), 1);
        assert!(c.session().is_none());
        assert!(c.outcome().is_some());
    }

    #[test]
    fn test_frames_only_processed_while_in_progress() {
        let mut h = active(1);
        h.controller.on_frame();
        assert!(h.controller.wants_frames());
        answer(&mut h.controller, 'A', true);
        assert!(!h.controller.wants_frames());
        assert_eq!(h.capture.stops.load(Ordering::SeqCst), 1);
        h.controller.on_frame();
        assert_eq!(h.capture.frames.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let mut h = active(2);
        assert!(h.controller.teardown());
        assert!(!h.controller.teardown());
        assert_eq!(h.display.exits.load(Ordering::SeqCst), 1);
        assert_eq!(h.capture.stops.load(Ordering::SeqCst), 1);
        drop(h.controller);
        assert_eq!(h.display.exits.load(Ordering::SeqCst), 1);
    }
}
