//! Cooperative session runtime
//!
//! [`SessionDriver`] owns a [`SessionController`] inside a single tokio task and
//! feeds it from four sources: a one-second interval, a frame interval (only
//! while capture runs), host commands, and backend replies. Backend calls are
//! spawned onto their own tasks so neither timer ever waits on the network.
//! Because every input is applied on the same task, a display change can never
//! interleave with a tick.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

use crate::backend::{BackendReply, BackendRequest, QuizBackend};
use crate::controller::SessionController;
use crate::error::ProctorError;
use crate::types::{AbortCause, Phase, Profile, QuizOutcome, QuizPreferences, SessionEvent};

/// Host input to a running session
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SubmitProfile(Profile),
    SubmitPreferences(QuizPreferences),
    /// Request the camera and generate questions; also retries after a failure
    Start,
    ConfirmStart,
    Select(char),
    HoverEnter(char),
    HoverLeave(char),
    /// Submit the selected answer; also retries after a failure
    Submit,
    DisplayChanged { exclusive: bool },
    Confidence(u8),
    RetryResults,
    Shutdown,
}

/// Host side of a driver
pub struct DriverHandle {
    pub commands: mpsc::Sender<Command>,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
}

/// How a driven session ended
#[derive(Debug, Clone, PartialEq)]
pub struct SessionExit {
    pub phase: Phase,
    pub abort_cause: Option<AbortCause>,
    pub outcome: Option<QuizOutcome>,
}

pub struct SessionDriver<B: QuizBackend + 'static> {
    controller: SessionController,
    backend: Arc<B>,
    commands: mpsc::Receiver<Command>,
    events: mpsc::UnboundedSender<SessionEvent>,
    frame_interval: Duration,
}

impl<B: QuizBackend + 'static> SessionDriver<B> {
    pub fn new(controller: SessionController, backend: Arc<B>) -> (Self, DriverHandle) {
        let (command_tx, command_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let frame_interval =
            Duration::from_millis(controller.config().signals.frame_interval_ms.max(1));
        let driver = Self {
            controller,
            backend,
            commands: command_rx,
            events: event_tx,
            frame_interval,
        };
        let handle = DriverHandle {
            commands: command_tx,
            events: event_rx,
        };
        (driver, handle)
    }

    /// Run until the session is aborted, its results are in, or the host
    /// shuts it down. The controller is torn down exactly once on the way out.
    pub async fn run(mut self) -> SessionExit {
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<BackendReply>();

        let mut seconds = interval(Duration::from_secs(1));
        seconds.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        seconds.tick().await;

        let mut frames = interval(self.frame_interval);
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::debug!("session driver started");
        loop {
            let wants_frames = self.controller.wants_frames();
            tokio::select! {
                _ = seconds.tick() => self.controller.tick(),
                _ = frames.tick(), if wants_frames => self.controller.on_frame(),
                Some(reply) = reply_rx.recv() => self.apply_reply(reply, &reply_tx),
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => {
                        tracing::info!(phase = %self.controller.phase(), "session driver shut down");
                        break;
                    }
                    Some(command) => self.apply_command(command, &reply_tx),
                },
            }
            self.flush_events();

            if self.controller.phase() == Phase::Aborted || self.controller.outcome().is_some() {
                break;
            }
        }

        self.controller.teardown();
        self.flush_events();
        SessionExit {
            phase: self.controller.phase(),
            abort_cause: self.controller.abort_cause(),
            outcome: self.controller.outcome().cloned(),
        }
    }

    fn apply_command(&mut self, command: Command, replies: &mpsc::UnboundedSender<BackendReply>) {
        let result = match command {
            Command::SubmitProfile(profile) => self.controller.submit_profile(profile),
            Command::SubmitPreferences(preferences) => {
                self.controller.submit_preferences(preferences)
            }
            Command::Start => self
                .controller
                .start()
                .map(|request| self.spawn(BackendRequest::Generate(request), replies)),
            Command::ConfirmStart => self.controller.confirm_start(),
            Command::Select(option) => self.controller.select_option(option),
            Command::HoverEnter(option) => self.controller.hover_enter(option),
            Command::HoverLeave(option) => self.controller.hover_leave(option),
            Command::Submit => self
                .controller
                .begin_submit()
                .map(|request| self.spawn(BackendRequest::Submit(Box::new(request)), replies)),
            Command::DisplayChanged { exclusive } => {
                self.controller.display_changed(exclusive);
                Ok(())
            }
            Command::Confidence(value) => self
                .controller
                .submit_confidence(value)
                .map(|request| self.spawn(BackendRequest::UpdateConfidence(request), replies)),
            Command::RetryResults => self.request_results(replies),
            Command::Shutdown => Ok(()),
        };
        if let Err(e) = result {
            log_rejected(&e);
        }
    }

    fn apply_reply(&mut self, reply: BackendReply, replies: &mpsc::UnboundedSender<BackendReply>) {
        let result = match reply {
            BackendReply::Generate(result) => self.controller.complete_generation(result),
            BackendReply::Submit(result) => self.controller.complete_submit(result),
            BackendReply::UpdateConfidence(result) => self
                .controller
                .complete_confidence(result)
                .and_then(|()| self.request_results(replies)),
            BackendReply::Results(result) => self.controller.complete_results(result).map(|_| ()),
        };
        if let Err(e) = result {
            log_rejected(&e);
        }
    }

    fn request_results(
        &mut self,
        replies: &mpsc::UnboundedSender<BackendReply>,
    ) -> Result<(), ProctorError> {
        if self.controller.phase() != Phase::Completed {
            return Ok(());
        }
        let session_id = self.controller.begin_results()?;
        self.spawn(BackendRequest::Results { session_id }, replies);
        Ok(())
    }

    fn spawn(&self, request: BackendRequest, replies: &mpsc::UnboundedSender<BackendReply>) {
        let backend = Arc::clone(&self.backend);
        let replies = replies.clone();
        let endpoint = request.endpoint();
        tracing::debug!(endpoint, "backend call dispatched");
        tokio::spawn(async move {
            let reply = request.dispatch(backend.as_ref()).await;
            if replies.send(reply).is_err() {
                tracing::debug!(endpoint, "driver gone, backend reply dropped");
            }
        });
    }

    fn flush_events(&mut self) {
        for event in self.controller.drain_events() {
            // A host that stopped listening does not stop the session.
            let _ = self.events.send(event);
        }
    }
}

fn log_rejected(error: &ProctorError) {
    if error.is_retryable() {
        tracing::warn!(error = %error, "operation failed, retry possible");
    } else {
        tracing::debug!(error = %error, "command rejected");
    }
}
