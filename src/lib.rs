//! SIMCO Proctor - Client-side engine for proctored adaptive quizzes
//!
//! Proctor drives a timed quiz session against an external question service
//! while passively collecting behavioral signals:
//! session state machine → distraction supervision → per-question webcam
//! aggregates + interaction telemetry → answer submission → results.
//!
//! ## Modules
//!
//! - **Session**: [`SessionController`] (sans-IO state machine) and
//!   [`SessionDriver`] (single tokio task owning timers, frames and backend calls)
//! - **Signals**: landmark geometry, per-question aggregation and offline replay
//! - **Backend**: [`QuizBackend`] contract and its reqwest implementation

pub mod backend;
pub mod clock;
pub mod config;
pub mod controller;
pub mod environment;
pub mod error;
pub mod interaction;
pub mod runtime;
pub mod signals;
pub mod supervisor;
pub mod timer;
pub mod types;

pub use backend::{HttpQuizBackend, QuizBackend};
pub use config::ProctorConfig;
pub use controller::SessionController;
pub use error::ProctorError;
pub use runtime::{Command, DriverHandle, SessionDriver, SessionExit};
pub use types::{AbortCause, Phase, QuizOutcome, SessionEvent};

/// Proctor version reported by the CLI
pub const PROCTOR_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name
pub const PRODUCER_NAME: &str = "simco-proctor";
