use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::{InferenceOracle, StepDecision, StepQuery};
use crate::error::{AppResult, EngineError, SessionError};
use crate::session::{
    Answer, AnsweredFeature, SessionStore, TraceStep, TurnStatus, VerifySession,
};

#[cfg(test)]
#[path = "controller_tests.rs"]
mod controller_tests;

/// Parameters for opening a verification dialogue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartParams {
    /// The animal hypothesis to verify.
    pub target: String,
    /// Caller-supplied session id; the server allocates one when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Parameters for answering the pending question of a dialogue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerParams {
    /// The dialogue being answered.
    pub session_id: String,
    /// Ternary answer: "yes", "no" or "unknown".
    pub response: String,
}

/// Reply to a `start` turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartReply {
    /// The session id binding all further turns of this dialogue.
    pub session_id: String,
    /// Resulting dialogue status.
    pub status: TurnStatus,
    /// First question, when the dialogue keeps asking.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    /// Optional hint accompanying the question.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Outcome message, when the dialogue concluded immediately.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Reply to an `answer` turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerReply {
    /// Resulting dialogue status.
    pub status: TurnStatus,
    /// Next question, while the dialogue keeps asking.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    /// Optional hint accompanying the question.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Outcome message on a terminal turn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// The confirmed animal, present on `success`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub animal: Option<String>,
}

/// Snapshot of a dialogue for the transcript renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// The dialogue's session id.
    pub session_id: String,
    /// The hypothesis under verification.
    pub target: String,
    /// Current dialogue status.
    pub status: TurnStatus,
    /// The pending question, while asking.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    /// Outcome message, once terminal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Features answered so far, in question order.
    pub answered: Vec<AnsweredFeature>,
    /// Rule firings recorded so far.
    pub trace: Vec<TraceStep>,
}

/// Reply to an `abandon` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbandonReply {
    /// The abandoned session id.
    pub session_id: String,
    /// Whether a session was actually removed.
    pub removed: bool,
}

/// Drives verification dialogues: one `start`, then `answer` turns until a
/// terminal status.
///
/// Local state is only committed after the engine returns a well-formed
/// decision, so a failed turn leaves the session exactly where it was and
/// the caller can retry it.
#[derive(Clone)]
pub struct Verifier {
    store: SessionStore,
    oracle: Arc<dyn InferenceOracle>,
}

impl Verifier {
    /// Create a new dialogue controller
    pub fn new(store: SessionStore, oracle: Arc<dyn InferenceOracle>) -> Self {
        Self { store, oracle }
    }

    /// Open a dialogue and resolve its first step.
    pub async fn start(&self, params: StartParams) -> AppResult<StartReply> {
        let target = params.target.trim().to_string();
        if target.is_empty() {
            return Err(SessionError::InvalidTarget {
                reason: "target must not be empty".to_string(),
            }
            .into());
        }

        let session_id = params
            .session_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let handle = self.store.create(&session_id, &target)?;

        debug!(session_id = %session_id, target = %target, "Resolving opening step");

        // No local state beyond the empty session exists yet; if the opening
        // step cannot be resolved the session is removed so the caller can
        // retry with the same id.
        let decision = match self.oracle.next_step(StepQuery::opening(&target)).await {
            Ok(decision) => decision,
            Err(e) => {
                self.store.remove(&session_id);
                return Err(e.into());
            }
        };

        let mut session = handle.lock().await;
        if let Err(e) = Self::apply_decision(&mut session, decision) {
            drop(session);
            self.store.remove(&session_id);
            return Err(e.into());
        }

        info!(
            session_id = %session.id,
            target = %session.target,
            status = %session.status,
            "Verification dialogue opened"
        );

        Ok(StartReply {
            session_id: session.id.clone(),
            status: session.status,
            question: session.pending_question.clone(),
            hint: session.hint.clone(),
            message: session.message.clone(),
        })
    }

    /// Apply one answer turn to a dialogue.
    pub async fn answer(&self, params: AnswerParams) -> AppResult<AnswerReply> {
        // Reject malformed answers before any state is touched.
        let answer: Answer =
            params
                .response
                .trim()
                .parse()
                .map_err(|_| SessionError::InvalidAnswer {
                    value: params.response.clone(),
                })?;

        let handle = self.store.get(&params.session_id)?;
        let mut session = handle.lock().await;

        if session.is_terminal() {
            return Err(SessionError::Terminated {
                session_id: session.id.clone(),
                status: session.status.to_string(),
            }
            .into());
        }

        let feature =
            session
                .pending_question
                .clone()
                .ok_or_else(|| SessionError::NoPendingQuestion {
                    session_id: session.id.clone(),
                })?;

        // Full evidence including this turn's answer; the engine holds no
        // dialogue state of its own.
        let mut evidence = session.answered.clone();
        evidence.push(AnsweredFeature {
            feature: feature.clone(),
            answer,
        });
        let query = StepQuery::with_evidence(&session.target, evidence, answer);

        // The session is untouched until the decision arrives, so a failed
        // engine call leaves the same question pending and the turn can be
        // replayed.
        let decision = self.oracle.next_step(query).await?;

        Self::check_no_repeat(&session, &feature, &decision)?;

        session.push_answer(feature, answer);
        let animal = match decision.status {
            TurnStatus::Success => decision
                .animal
                .clone()
                .or_else(|| Some(session.target.clone())),
            _ => None,
        };
        Self::apply_decision(&mut session, decision)?;

        info!(
            session_id = %session.id,
            status = %session.status,
            answered = session.answered.len(),
            "Verification turn applied"
        );

        Ok(AnswerReply {
            status: session.status,
            question: session.pending_question.clone(),
            hint: session.hint.clone(),
            message: session.message.clone(),
            animal,
        })
    }

    /// Snapshot a dialogue for display.
    pub async fn snapshot(&self, session_id: &str) -> AppResult<SessionSnapshot> {
        let handle = self.store.get(session_id)?;
        let session = handle.lock().await;

        Ok(SessionSnapshot {
            session_id: session.id.clone(),
            target: session.target.clone(),
            status: session.status,
            question: session.pending_question.clone(),
            message: session.message.clone(),
            answered: session.answered.clone(),
            trace: session.trace.clone(),
        })
    }

    /// Abandon a dialogue, releasing its store entry.
    pub fn abandon(&self, session_id: &str) -> AbandonReply {
        let removed = self.store.remove(session_id);
        if removed {
            info!(session_id = %session_id, "Verification dialogue abandoned");
        }
        AbandonReply {
            session_id: session_id.to_string(),
            removed,
        }
    }

    /// Reject a decision that re-asks a feature this dialogue already
    /// answered; accepting it would corrupt the answered-features record.
    fn check_no_repeat(
        session: &VerifySession,
        current_feature: &str,
        decision: &StepDecision,
    ) -> Result<(), EngineError> {
        if decision.status != TurnStatus::Asking {
            return Ok(());
        }
        match decision.question.as_deref() {
            None => Err(EngineError::InvalidResponse {
                message: "asking decision without a question".to_string(),
            }),
            Some(q) if q == current_feature || session.has_answered(q) => {
                Err(EngineError::InvalidResponse {
                    message: format!("engine re-asked already answered feature '{}'", q),
                })
            }
            Some(_) => Ok(()),
        }
    }

    /// Commit an engine decision to the session.
    fn apply_decision(
        session: &mut VerifySession,
        decision: StepDecision,
    ) -> Result<(), EngineError> {
        if let Some(step) = decision.trace_step {
            session.record_trace(step);
        }

        match decision.status {
            TurnStatus::Asking => {
                let question =
                    decision
                        .question
                        .ok_or_else(|| EngineError::InvalidResponse {
                            message: "asking decision without a question".to_string(),
                        })?;
                session.await_answer(question, decision.hint);
            }
            status => session.conclude(status, decision.message),
        }

        Ok(())
    }
}
