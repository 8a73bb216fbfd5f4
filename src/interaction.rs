//! Answer interaction collection
//!
//! Tracks how the candidate interacts with the options of the question on
//! screen: when the first option was clicked, every later change of selection,
//! and how long the pointer rested on each option.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A change of selected option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerChange {
    pub from: char,
    pub to: char,
    /// Seconds since the question was displayed.
    pub timestamp: f64,
}

/// Per-question interaction summary attached to the answer submission
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    /// Seconds from question display to the first option click (0 if none).
    pub time_to_first_click: f64,
    /// Number of selection changes.
    pub answer_changes: usize,
    pub answer_change_history: Vec<AnswerChange>,
    /// Cumulative hover duration per option id, in milliseconds.
    pub hover_times: BTreeMap<String, u64>,
    /// Total hover duration across options, in seconds.
    pub total_hover_time: f64,
}

/// Collector for the question currently on screen
#[derive(Debug, Clone)]
pub struct InteractionCollector {
    question_started_ms: u64,
    first_interaction_ms: Option<u64>,
    selected: Option<char>,
    changes: Vec<AnswerChange>,
    hover_times: BTreeMap<char, u64>,
    total_hover_ms: u64,
    current_hover: Option<(char, u64)>,
}

impl InteractionCollector {
    pub fn new(question_started_ms: u64) -> Self {
        Self {
            question_started_ms,
            first_interaction_ms: None,
            selected: None,
            changes: Vec::new(),
            hover_times: BTreeMap::new(),
            total_hover_ms: 0,
            current_hover: None,
        }
    }

    /// Forget everything and start timing a new question.
    pub fn reset(&mut self, question_started_ms: u64) {
        *self = Self::new(question_started_ms);
    }

    pub fn selected(&self) -> Option<char> {
        self.selected
    }

    /// Record a click on `option`.
    pub fn select(&mut self, option: char, now_ms: u64) {
        if self.first_interaction_ms.is_none() {
            self.first_interaction_ms = Some(now_ms);
        }
        if let Some(previous) = self.selected {
            if previous != option {
                self.changes.push(AnswerChange {
                    from: previous,
                    to: option,
                    timestamp: self.seconds_since_start(now_ms),
                });
            }
        }
        self.selected = Some(option);
    }

    /// Open a hover on `option`, closing any hover still open.
    pub fn hover_enter(&mut self, option: char, now_ms: u64) {
        if let Some((open, _)) = self.current_hover {
            self.hover_leave(open, now_ms);
        }
        self.current_hover = Some((option, now_ms));
    }

    /// Close the hover on `option`. Leaves that don't match the hovered option
    /// are ignored.
    pub fn hover_leave(&mut self, option: char, now_ms: u64) {
        match self.current_hover {
            Some((hovered, since)) if hovered == option => {
                let duration = now_ms.saturating_sub(since);
                self.total_hover_ms += duration;
                *self.hover_times.entry(option).or_insert(0) += duration;
                self.current_hover = None;
            }
            _ => {}
        }
    }

    /// Summary as of `now_ms`. A hover still open counts up to `now_ms`.
    pub fn snapshot(&self, now_ms: u64) -> InteractionRecord {
        let time_to_first_click = self
            .first_interaction_ms
            .map(|t| round_to(self.seconds_since_start(t), 2))
            .unwrap_or(0.0);

        let mut hover_times = self.hover_times.clone();
        let mut total_hover_ms = self.total_hover_ms;
        if let Some((option, since)) = self.current_hover {
            let open = now_ms.saturating_sub(since);
            *hover_times.entry(option).or_insert(0) += open;
            total_hover_ms += open;
        }

        InteractionRecord {
            time_to_first_click,
            answer_changes: self.changes.len(),
            answer_change_history: self.changes.clone(),
            hover_times: hover_times
                .iter()
                .map(|(option, ms)| (option.to_string(), *ms))
                .collect(),
            total_hover_time: round_to(total_hover_ms as f64 / 1000.0, 2),
        }
    }

    fn seconds_since_start(&self, now_ms: u64) -> f64 {
        now_ms.saturating_sub(self.question_started_ms) as f64 / 1000.0
    }
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
