//! # Widget session
//! Pure state machine for one displayed survey widget.
//!
//! ```text
//! Score ──select──▶ Feedback ──submit ok──▶ Thanks ──3s──▶ (closed)
//!   ▲                  │
//!   └──────back────────┘
//! ```
//!
//! No I/O and no timers live here; [`super::runtime`] drives the transitions
//! and performs the submission call. Every method is a no-op (returns
//! `false`/`None`) when its guard does not hold.

use serde::Serialize;

use crate::model::{truncate_chars, Score};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Score,
    Feedback,
    Thanks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Explicit close action.
    Dismissed,
    /// Timer after reaching `Thanks`.
    AutoClosed,
}

/// Final outcome of a widget. Emitted at most once per session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Completion {
    pub score: Option<u8>,
    pub feedback: String,
    pub reason: CloseReason,
}

/// Identifies one submission attempt; results for older tickets are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubmitTicket(u64);

/// What the runtime needs to send after `begin_submit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    pub ticket: SubmitTicket,
    pub score: Score,
    pub feedback: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetSession {
    visible: bool,
    step: Step,
    selected_score: Option<Score>,
    feedback_text: String,
    pending: Option<SubmitTicket>,
    next_ticket: u64,
    last_error: Option<String>,
    completed: bool,
    max_feedback_chars: usize,
}

impl WidgetSession {
    pub fn new(max_feedback_chars: usize) -> Self {
        Self {
            visible: true,
            step: Step::Score,
            selected_score: None,
            feedback_text: String::new(),
            pending: None,
            next_ticket: 0,
            last_error: None,
            completed: false,
            max_feedback_chars,
        }
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn selected_score(&self) -> Option<Score> {
        self.selected_score
    }

    pub fn feedback_text(&self) -> &str {
        &self.feedback_text
    }

    pub fn is_submitting(&self) -> bool {
        self.pending.is_some()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn accepts_input(&self) -> bool {
        self.visible && self.pending.is_none()
    }

    /// `Score → Feedback`, remembering the rating.
    pub fn select_score(&mut self, score: Score) -> bool {
        if !self.accepts_input() || self.step != Step::Score {
            return false;
        }
        self.selected_score = Some(score);
        self.step = Step::Feedback;
        true
    }

    /// `Score → Feedback` with the rating kept from before a `back`.
    pub fn resume(&mut self) -> bool {
        if !self.accepts_input() || self.step != Step::Score || self.selected_score.is_none() {
            return false;
        }
        self.step = Step::Feedback;
        true
    }

    /// `Feedback → Score`. Score and text are kept.
    pub fn back(&mut self) -> bool {
        if !self.accepts_input() || self.step != Step::Feedback {
            return false;
        }
        self.step = Step::Score;
        true
    }

    pub fn set_feedback(&mut self, text: &str) -> bool {
        if !self.accepts_input() || self.step != Step::Feedback {
            return false;
        }
        self.feedback_text = truncate_chars(text, self.max_feedback_chars).to_string();
        true
    }

    /// Start a submission. `None` without a score, outside `Feedback`, or
    /// while another call is still pending.
    pub fn begin_submit(&mut self) -> Option<SubmitRequest> {
        if !self.accepts_input() || self.step != Step::Feedback {
            return None;
        }
        let score = self.selected_score?;
        let ticket = SubmitTicket(self.next_ticket);
        self.next_ticket += 1;
        self.pending = Some(ticket);
        self.last_error = None;
        Some(SubmitRequest {
            ticket,
            score,
            feedback: self.feedback_text.clone(),
        })
    }

    /// Apply the result of a submission. Stale tickets and results arriving
    /// after close are dropped; returns whether the session changed.
    pub fn finish_submit(&mut self, ticket: SubmitTicket, outcome: Result<(), String>) -> bool {
        if !self.visible || self.pending != Some(ticket) {
            return false;
        }
        self.pending = None;
        match outcome {
            Ok(()) => {
                self.step = Step::Thanks;
            }
            Err(msg) => {
                self.last_error = Some(msg);
            }
        }
        true
    }

    /// Close from any state. Any pending submission is abandoned.
    pub fn close(&mut self) -> Option<Completion> {
        self.finish(CloseReason::Dismissed)
    }

    /// Auto-close after `Thanks`.
    pub fn expire_thanks(&mut self) -> Option<Completion> {
        if self.step != Step::Thanks {
            return None;
        }
        self.finish(CloseReason::AutoClosed)
    }

    fn finish(&mut self, reason: CloseReason) -> Option<Completion> {
        if self.completed {
            return None;
        }
        self.completed = true;
        self.visible = false;
        self.pending = None;
        Some(Completion {
            score: self.selected_score.map(Score::get),
            feedback: self.feedback_text.clone(),
            reason,
        })
    }
}
