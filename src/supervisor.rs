//! Distraction-mode supervision
//!
//! Watches exclusive display (full-viewport) notifications while a quiz is in
//! progress and turns them into grace-period edges: losing exclusive mode opens
//! a bounded countdown, regaining it closes the countdown, and running out of
//! time reports an expiry exactly once.

use crate::timer::{CountdownTimer, Tick};

/// What a display notification or tick meant for the grace period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// Nothing changed (not armed, duplicate notification, no countdown).
    Unchanged,
    /// Exclusive mode was lost; the grace countdown started.
    GraceStarted { remaining: u32 },
    /// One second of grace consumed.
    GraceTick { remaining: u32 },
    /// Exclusive mode came back after `elapsed` seconds of grace.
    Regained { elapsed: u32 },
    /// The grace countdown ran out.
    Expired,
}

/// Grace-period supervisor for exclusive display mode
#[derive(Debug, Clone)]
pub struct DistractionSupervisor {
    grace_secs: u32,
    armed: bool,
    exclusive: bool,
    grace: Option<CountdownTimer>,
}

impl DistractionSupervisor {
    pub fn new(grace_secs: u32) -> Self {
        Self {
            grace_secs,
            armed: false,
            exclusive: true,
            grace: None,
        }
    }

    /// Start supervising.
    ///
    /// `exclusive` is the display's state as reported by the host. Exclusive
    /// mode lost before arming (including a loss notified while unarmed) starts
    /// the grace countdown immediately.
    pub fn arm(&mut self, exclusive: bool) -> SupervisorEvent {
        let still_exclusive = self.exclusive && exclusive;
        self.armed = true;
        self.exclusive = true;
        self.grace = None;
        if still_exclusive {
            SupervisorEvent::Unchanged
        } else {
            self.on_display_change(false)
        }
    }

    /// Stop supervising and cancel any running countdown.
    pub fn disarm(&mut self) -> bool {
        self.armed = false;
        self.cancel()
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn in_grace(&self) -> bool {
        self.grace.as_ref().is_some_and(|g| g.is_running())
    }

    pub fn grace_remaining(&self) -> Option<u32> {
        self.grace
            .as_ref()
            .filter(|g| g.is_running())
            .map(|g| g.remaining())
    }

    /// Feed an exclusive-mode change notification.
    pub fn on_display_change(&mut self, exclusive: bool) -> SupervisorEvent {
        let previous = self.exclusive;
        self.exclusive = exclusive;

        if !self.armed || previous == exclusive {
            return SupervisorEvent::Unchanged;
        }

        if exclusive {
            match self.grace.take() {
                Some(mut grace) if grace.is_running() => {
                    let elapsed = grace.duration() - grace.remaining();
                    grace.cancel();
                    tracing::debug!(elapsed, "exclusive display regained");
                    SupervisorEvent::Regained { elapsed }
                }
                _ => SupervisorEvent::Unchanged,
            }
        } else {
            let mut grace = CountdownTimer::new(self.grace_secs);
            grace.start();
            let remaining = grace.remaining();
            self.grace = Some(grace);
            tracing::debug!(remaining, "exclusive display lost, grace period started");
            SupervisorEvent::GraceStarted { remaining }
        }
    }

    /// Consume one second of grace, if a countdown is running.
    pub fn tick(&mut self) -> SupervisorEvent {
        let Some(grace) = self.grace.as_mut() else {
            return SupervisorEvent::Unchanged;
        };
        match grace.tick() {
            Tick::Ignored => SupervisorEvent::Unchanged,
            Tick::Remaining(remaining) => SupervisorEvent::GraceTick { remaining },
            Tick::Expired => {
                self.armed = false;
                SupervisorEvent::Expired
            }
        }
    }

    /// Cancel the running countdown. Repeated calls are no-ops.
    pub fn cancel(&mut self) -> bool {
        match self.grace.as_mut() {
            Some(grace) => grace.cancel(),
            None => false,
        }
    }
}
