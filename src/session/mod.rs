//! Verification dialogue state.
//!
//! A [`VerifySession`] is one interactive backward-chaining dialogue: the
//! caller names a target animal and is asked about one feature per turn until
//! the hypothesis is confirmed, refuted, or the protocol errors out. The
//! entity enforces the dialogue invariants; the keyed [`SessionStore`] owns
//! the live sessions.

mod store;

pub use store::{SessionHandle, SessionStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ternary answer to a feature question.
///
/// `Unknown` is genuinely unresolved evidence, never a euphemism for `No`;
/// it is forwarded to the rule engine verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Answer {
    /// The feature is present.
    Yes,
    /// The feature is absent.
    No,
    /// The caller cannot tell.
    Unknown,
}

impl Answer {
    /// Get the answer as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Answer::Yes => "yes",
            Answer::No => "no",
            Answer::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Answer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Answer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "yes" => Ok(Answer::Yes),
            "no" => Ok(Answer::No),
            "unknown" => Ok(Answer::Unknown),
            _ => Err(format!("Unknown answer: {}", s)),
        }
    }
}

/// Where a verification dialogue stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    /// A question is pending; the dialogue continues.
    Asking,
    /// The target hypothesis was confirmed.
    Success,
    /// The evidence refuted the target, or could not confirm it.
    Failed,
    /// The protocol broke; distinct from a business-level `Failed`.
    Error,
}

impl TurnStatus {
    /// Whether no further transition is possible from this status.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TurnStatus::Asking)
    }

    /// Get the status as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnStatus::Asking => "asking",
            TurnStatus::Success => "success",
            TurnStatus::Failed => "failed",
            TurnStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for TurnStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TurnStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asking" => Ok(TurnStatus::Asking),
            "success" => Ok(TurnStatus::Success),
            "failed" => Ok(TurnStatus::Failed),
            "error" => Ok(TurnStatus::Error),
            _ => Err(format!("Unknown turn status: {}", s)),
        }
    }
}

/// One rule firing recorded during a dialogue, kept for explainability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    /// Identifier of the rule that fired (e.g. "R7").
    pub rule_id: String,
    /// Condition features the rule consumed.
    pub conditions: Vec<String>,
    /// Fact the rule produced.
    pub conclusion: String,
    /// Optional human-readable rule description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A feature the caller has already answered, in question order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnsweredFeature {
    /// The feature that was asked about.
    pub feature: String,
    /// The caller's ternary answer.
    pub answer: Answer,
}

/// One interactive verification dialogue.
///
/// Invariants maintained across turns:
/// - exactly one pending question while `status` is `Asking`, none otherwise;
/// - a feature appears at most once in `answered`;
/// - `trace` is append-only;
/// - a terminal session accepts no further mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifySession {
    /// Opaque session identifier, echoed on every turn.
    pub id: String,
    /// The animal hypothesis under verification; immutable for the session.
    pub target: String,
    /// Current dialogue status.
    pub status: TurnStatus,
    /// The feature awaiting an answer, present only while asking.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_question: Option<String>,
    /// Optional hint accompanying the pending question.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Terminal outcome message, present once the dialogue ends.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Features answered so far, in question order.
    pub answered: Vec<AnsweredFeature>,
    /// Rule firings recorded so far, append-only.
    pub trace: Vec<TraceStep>,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When the session last saw a state-changing turn; drives idle expiry.
    pub last_active: DateTime<Utc>,
}

impl VerifySession {
    /// Create a new dialogue for the given target hypothesis
    pub fn new(id: impl Into<String>, target: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            target: target.into(),
            status: TurnStatus::Asking,
            pending_question: None,
            hint: None,
            message: None,
            answered: Vec::new(),
            trace: Vec::new(),
            created_at: now,
            last_active: now,
        }
    }

    /// Whether the dialogue has reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether the given feature was already answered in this dialogue.
    pub fn has_answered(&self, feature: &str) -> bool {
        self.answered.iter().any(|a| a.feature == feature)
    }

    /// Park the dialogue on the next question.
    pub fn await_answer(&mut self, question: impl Into<String>, hint: Option<String>) {
        debug_assert!(!self.is_terminal());
        self.pending_question = Some(question.into());
        self.hint = hint;
        self.last_active = Utc::now();
    }

    /// Consume the pending question, recording the caller's answer.
    ///
    /// The caller guarantees the feature is not a duplicate; the pending
    /// question is cleared until the next `await_answer` or `conclude`.
    pub fn push_answer(&mut self, feature: impl Into<String>, answer: Answer) {
        self.pending_question = None;
        self.hint = None;
        self.answered.push(AnsweredFeature {
            feature: feature.into(),
            answer,
        });
        self.last_active = Utc::now();
    }

    /// Append a rule firing to the trace.
    pub fn record_trace(&mut self, step: TraceStep) {
        self.trace.push(step);
    }

    /// Move the dialogue into a terminal status.
    pub fn conclude(&mut self, status: TurnStatus, message: Option<String>) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.message = message;
        self.pending_question = None;
        self.hint = None;
        self.last_active = Utc::now();
    }
}
