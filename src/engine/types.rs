use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::session::{Answer, AnsweredFeature, TraceStep, TurnStatus};

/// Evidence snapshot sent to the rule engine for one verification turn.
///
/// The engine is stateless, so every turn carries the full evidence: the
/// target hypothesis, every answered feature in question order, and the
/// answer that closed the previous question.
#[derive(Debug, Clone, Serialize)]
pub struct StepQuery {
    pub target: String,
    pub answered_features: Vec<AnsweredFeature>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_answer: Option<Answer>,
}

/// The engine's verdict for one turn: ask another feature, or stop.
#[derive(Debug, Clone, Deserialize)]
pub struct StepDecision {
    pub status: TurnStatus,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub animal: Option<String>,
    #[serde(default)]
    pub trace_step: Option<TraceStep>,
}

/// Rule type tag: intermediate classification or final animal conclusion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    /// Concludes an intermediate fact (e.g. "mammal").
    #[default]
    Classification,
    /// Concludes a final animal.
    Final,
}

impl std::fmt::Display for RuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleKind::Classification => write!(f, "classification"),
            RuleKind::Final => write!(f, "final"),
        }
    }
}

impl std::str::FromStr for RuleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "classification" => Ok(RuleKind::Classification),
            "final" => Ok(RuleKind::Final),
            _ => Err(format!("Unknown rule kind: {}", s)),
        }
    }
}

/// A production rule as stored by the rule service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub conditions: Vec<String>,
    pub conclusion: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: RuleKind,
}

/// Payload for creating or replacing a rule.
///
/// The id is assigned by the service on create, and the kind is inferred
/// from the conclusion when omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDraft {
    pub conditions: Vec<String>,
    pub conclusion: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<RuleKind>,
}

/// The full rule book as returned by the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleBook {
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub animals: Vec<String>,
    #[serde(default)]
    pub intermediates: Vec<String>,
    #[serde(default)]
    pub features: Vec<String>,
}

/// Acknowledgement for a created or updated rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSaved {
    pub success: bool,
    pub rule: Rule,
}

/// Acknowledgement for a deleted rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleRemoved {
    pub success: bool,
    pub deleted: Rule,
}

/// Forward-chaining request: the observed features to derive from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardQuery {
    pub features: Vec<String>,
}

/// Forward-chaining outcome with its derivation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardOutcome {
    pub success: bool,
    #[serde(default)]
    pub animal: Option<String>,
    #[serde(default)]
    pub log: Vec<TraceStep>,
    #[serde(default)]
    pub facts: Vec<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Known animals plus their display emojis.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnimalCatalog {
    pub animals: Vec<String>,
    #[serde(default)]
    pub emojis: HashMap<String, String>,
}

/// Askable features plus their display grouping.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeatureCatalog {
    pub features: Vec<String>,
    #[serde(default)]
    pub categories: HashMap<String, Vec<String>>,
}

impl StepQuery {
    /// Build the opening query for a fresh dialogue: no evidence yet
    pub fn opening(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            answered_features: Vec::new(),
            last_answer: None,
        }
    }

    /// Build a follow-up query carrying the accumulated evidence
    pub fn with_evidence(
        target: impl Into<String>,
        answered_features: Vec<AnsweredFeature>,
        last_answer: Answer,
    ) -> Self {
        Self {
            target: target.into(),
            answered_features,
            last_answer: Some(last_answer),
        }
    }
}

impl StepDecision {
    /// Decision asking for one more feature
    pub fn ask(question: impl Into<String>) -> Self {
        Self {
            status: TurnStatus::Asking,
            question: Some(question.into()),
            hint: None,
            message: None,
            animal: None,
            trace_step: None,
        }
    }

    /// Terminal decision confirming the target
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: TurnStatus::Success,
            question: None,
            hint: None,
            message: Some(message.into()),
            animal: None,
            trace_step: None,
        }
    }

    /// Terminal decision refuting the target or giving up
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: TurnStatus::Failed,
            question: None,
            hint: None,
            message: Some(message.into()),
            animal: None,
            trace_step: None,
        }
    }

    /// Terminal decision reporting an engine-side error
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: TurnStatus::Error,
            question: None,
            hint: None,
            message: Some(message.into()),
            animal: None,
            trace_step: None,
        }
    }

    /// Attach a hint to the question
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Attach the confirmed animal
    pub fn with_animal(mut self, animal: impl Into<String>) -> Self {
        self.animal = Some(animal.into());
        self
    }

    /// Attach a fired-rule trace step
    pub fn with_trace_step(mut self, step: TraceStep) -> Self {
        self.trace_step = Some(step);
        self
    }
}
