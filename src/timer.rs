//! Countdown timers.
//!
//! [`CountdownTimer`] is a tick-driven state machine with no internal thread:
//! the owner calls `tick()` once per elapsed second.
//!
//! ```text
//! Idle -> Running <-> Paused
//!            |
//!            +-> Expired
//! (Idle | Running | Paused) -> Cancelled
//! ```
//!
//! Cancelling is idempotent: a second `cancel()` returns `false` and changes
//! nothing. An expired or cancelled timer never ticks again.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerState {
    Idle,
    Running,
    Paused,
    Expired,
    Cancelled,
}

/// Outcome of a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Timer was not running; nothing consumed.
    Ignored,
    /// One unit consumed, this many remain.
    Remaining(u32),
    /// The last unit was consumed.
    Expired,
}

/// Second-granularity countdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountdownTimer {
    duration: u32,
    remaining: u32,
    state: TimerState,
}

impl CountdownTimer {
    pub fn new(duration: u32) -> Self {
        Self {
            duration,
            remaining: duration,
            state: TimerState::Idle,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn duration(&self) -> u32 {
        self.duration
    }

    pub fn is_running(&self) -> bool {
        self.state == TimerState::Running
    }

    /// Expired and cancelled timers are finished for good.
    pub fn is_finished(&self) -> bool {
        matches!(self.state, TimerState::Expired | TimerState::Cancelled)
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn start(&mut self) -> bool {
        if self.state != TimerState::Idle {
            return false;
        }
        if self.remaining == 0 {
            self.state = TimerState::Expired;
            return false;
        }
        self.state = TimerState::Running;
        true
    }

    pub fn pause(&mut self) -> bool {
        if self.state != TimerState::Running {
            return false;
        }
        self.state = TimerState::Paused;
        true
    }

    pub fn resume(&mut self) -> bool {
        if self.state != TimerState::Paused {
            return false;
        }
        self.state = TimerState::Running;
        true
    }

    /// Returns `true` only for the call that actually cancelled the timer.
    pub fn cancel(&mut self) -> bool {
        if self.is_finished() {
            return false;
        }
        self.state = TimerState::Cancelled;
        true
    }

    pub fn tick(&mut self) -> Tick {
        if self.state != TimerState::Running {
            return Tick::Ignored;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.state = TimerState::Expired;
            Tick::Expired
        } else {
            Tick::Remaining(self.remaining)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_down_to_expiry() {
        let mut timer = CountdownTimer::new(3);
        assert!(timer.start());
        assert_eq!(timer.tick(), Tick::Remaining(2));
        assert_eq!(timer.tick(), Tick::Remaining(1));
        assert_eq!(timer.tick(), Tick::Expired);
        assert_eq!(timer.state(), TimerState::Expired);
        assert_eq!(timer.tick(), Tick::Ignored);
    }

    #[test]
    fn test_idle_timer_ignores_ticks() {
        let mut timer = CountdownTimer::new(3);
        assert_eq!(timer.tick(), Tick::Ignored);
        assert_eq!(timer.remaining(), 3);
    }

    #[test]
    fn test_pause_suspends_consumption() {
        let mut timer = CountdownTimer::new(10);
        timer.start();
        timer.tick();
        assert!(timer.pause());
        for _ in 0..20 {
            assert_eq!(timer.tick(), Tick::Ignored);
        }
        assert_eq!(timer.remaining(), 9);
        assert!(timer.resume());
        assert_eq!(timer.tick(), Tick::Remaining(8));
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut timer = CountdownTimer::new(5);
        timer.start();
        assert!(timer.cancel());
        assert!(!timer.cancel());
        assert!(!timer.cancel());
        assert_eq!(timer.state(), TimerState::Cancelled);
        assert_eq!(timer.tick(), Tick::Ignored);
        assert!(!timer.resume());
        assert!(!timer.start());
    }

    #[test]
    fn test_cancel_after_expiry_is_noop() {
        let mut timer = CountdownTimer::new(1);
        timer.start();
        assert_eq!(timer.tick(), Tick::Expired);
        assert!(!timer.cancel());
        assert_eq!(timer.state(), TimerState::Expired);
    }

    #[test]
    fn test_zero_duration_never_runs() {
        let mut timer = CountdownTimer::new(0);
        assert!(!timer.start());
        assert!(timer.is_finished());
    }
}
