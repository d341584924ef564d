use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use super::*;
use crate::engine::MockInferenceOracle;
use crate::error::AppError;
use crate::session::TraceStep;

fn verifier(oracle: MockInferenceOracle) -> (Verifier, SessionStore) {
    let store = SessionStore::new(Duration::from_secs(1800));
    (Verifier::new(store.clone(), Arc::new(oracle)), store)
}

fn start_params(target: &str, session_id: &str) -> StartParams {
    StartParams {
        target: target.to_string(),
        session_id: Some(session_id.to_string()),
    }
}

fn answer_params(session_id: &str, response: &str) -> AnswerParams {
    AnswerParams {
        session_id: session_id.to_string(),
        response: response.to_string(),
    }
}

fn trace_step(rule_id: &str, conclusion: &str) -> TraceStep {
    TraceStep {
        rule_id: rule_id.to_string(),
        conditions: vec!["has fur?".to_string()],
        conclusion: conclusion.to_string(),
        description: None,
    }
}

#[tokio::test]
async fn test_start_allocates_session_id_when_absent() {
    let mut oracle = MockInferenceOracle::new();
    oracle
        .expect_next_step()
        .returning(|_| Ok(StepDecision::ask("has fur?")));
    let (verifier, _) = verifier(oracle);

    let reply = verifier
        .start(StartParams {
            target: "cat".to_string(),
            session_id: None,
        })
        .await
        .unwrap();

    assert!(!reply.session_id.is_empty());
    assert_eq!(reply.status, TurnStatus::Asking);
    assert_eq!(reply.question.as_deref(), Some("has fur?"));
}

#[tokio::test]
async fn test_start_echoes_caller_supplied_id() {
    let mut oracle = MockInferenceOracle::new();
    oracle
        .expect_next_step()
        .returning(|_| Ok(StepDecision::ask("has fur?").with_hint("mammal check")));
    let (verifier, _) = verifier(oracle);

    let reply = verifier.start(start_params("cat", "dlg-7")).await.unwrap();

    assert_eq!(reply.session_id, "dlg-7");
    assert_eq!(reply.hint.as_deref(), Some("mammal check"));
}

#[tokio::test]
async fn test_start_sends_empty_evidence() {
    let mut oracle = MockInferenceOracle::new();
    oracle
        .expect_next_step()
        .withf(|q| q.target == "cat" && q.answered_features.is_empty() && q.last_answer.is_none())
        .returning(|_| Ok(StepDecision::ask("has fur?")));
    let (verifier, _) = verifier(oracle);

    verifier.start(start_params("cat", "dlg-1")).await.unwrap();
}

#[tokio::test]
async fn test_start_can_conclude_without_asking() {
    let mut oracle = MockInferenceOracle::new();
    oracle
        .expect_next_step()
        .returning(|_| Ok(StepDecision::error("no rule concludes 'unicorn'")));
    let (verifier, _) = verifier(oracle);

    let reply = verifier
        .start(start_params("unicorn", "dlg-1"))
        .await
        .unwrap();

    assert_eq!(reply.status, TurnStatus::Error);
    assert!(reply.question.is_none());
    assert!(reply.message.unwrap().contains("unicorn"));
}

#[tokio::test]
async fn test_start_rejects_empty_target() {
    let oracle = MockInferenceOracle::new();
    let (verifier, _) = verifier(oracle);

    let err = verifier.start(start_params("  ", "dlg-1")).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Session(SessionError::InvalidTarget { .. })
    ));
}

#[tokio::test]
async fn test_start_duplicate_session_rejected() {
    let mut oracle = MockInferenceOracle::new();
    oracle
        .expect_next_step()
        .returning(|_| Ok(StepDecision::ask("has fur?")));
    let (verifier, _) = verifier(oracle);

    verifier.start(start_params("cat", "dlg-1")).await.unwrap();
    let err = verifier
        .start(start_params("dog", "dlg-1"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AppError::Session(SessionError::Duplicate { .. })
    ));
}

#[tokio::test]
async fn test_start_engine_failure_removes_session() {
    let mut oracle = MockInferenceOracle::new();
    oracle.expect_next_step().times(1).returning(|_| {
        Err(EngineError::Unavailable {
            message: "connection refused".to_string(),
            retries: 3,
        })
    });
    let (verifier, store) = verifier(oracle);

    let err = verifier
        .start(start_params("cat", "dlg-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Engine(_)));

    // The id is free again: no half-open session lingers.
    assert!(store.get("dlg-1").is_err());
}

#[tokio::test]
async fn test_confirm_scenario() {
    let mut oracle = MockInferenceOracle::new();
    oracle
        .expect_next_step()
        .withf(|q| q.answered_features.is_empty())
        .times(1)
        .returning(|_| Ok(StepDecision::ask("has fur?")));
    oracle
        .expect_next_step()
        .withf(|q| {
            q.answered_features.len() == 1
                && q.answered_features[0].feature == "has fur?"
                && q.answered_features[0].answer == Answer::Yes
        })
        .times(1)
        .returning(|_| {
            Ok(StepDecision::ask("says meow?").with_trace_step(trace_step("R1", "mammal")))
        });
    oracle
        .expect_next_step()
        .withf(|q| q.answered_features.len() == 2 && q.last_answer == Some(Answer::Yes))
        .times(1)
        .returning(|_| {
            Ok(StepDecision::success("Confirmed! The animal is cat")
                .with_animal("cat")
                .with_trace_step(trace_step("R9", "cat")))
        });
    let (verifier, _) = verifier(oracle);

    let reply = verifier.start(start_params("cat", "dlg-1")).await.unwrap();
    assert_eq!(reply.status, TurnStatus::Asking);
    assert_eq!(reply.question.as_deref(), Some("has fur?"));

    let reply = verifier.answer(answer_params("dlg-1", "yes")).await.unwrap();
    assert_eq!(reply.status, TurnStatus::Asking);
    assert_eq!(reply.question.as_deref(), Some("says meow?"));
    assert!(reply.animal.is_none());

    let reply = verifier.answer(answer_params("dlg-1", "yes")).await.unwrap();
    assert_eq!(reply.status, TurnStatus::Success);
    assert_eq!(reply.animal.as_deref(), Some("cat"));
    assert!(reply.message.unwrap().contains("cat"));

    let snapshot = verifier.snapshot("dlg-1").await.unwrap();
    assert_eq!(snapshot.answered.len(), 2);
    assert_eq!(snapshot.trace.len(), 2);
    assert_eq!(snapshot.trace[1].conclusion, "cat");
}

#[tokio::test]
async fn test_refute_scenario() {
    let mut oracle = MockInferenceOracle::new();
    oracle
        .expect_next_step()
        .withf(|q| q.answered_features.is_empty())
        .times(1)
        .returning(|_| Ok(StepDecision::ask("has fur?")));
    oracle
        .expect_next_step()
        .withf(|q| q.last_answer == Some(Answer::No))
        .times(1)
        .returning(|_| Ok(StepDecision::failed("'has fur?' was denied, cannot confirm cat")));
    let (verifier, _) = verifier(oracle);

    verifier.start(start_params("cat", "dlg-1")).await.unwrap();
    let reply = verifier.answer(answer_params("dlg-1", "no")).await.unwrap();

    assert_eq!(reply.status, TurnStatus::Failed);
    assert!(reply.animal.is_none());
    assert!(!reply.message.unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_answer_is_not_coerced_to_no() {
    let mut oracle = MockInferenceOracle::new();
    oracle
        .expect_next_step()
        .withf(|q| q.answered_features.is_empty())
        .times(1)
        .returning(|_| Ok(StepDecision::ask("has fur?")));
    // The unknown answer must reach the engine verbatim, and the dialogue
    // must keep asking rather than fail outright.
    oracle
        .expect_next_step()
        .withf(|q| {
            q.last_answer == Some(Answer::Unknown)
                && q.answered_features[0].answer == Answer::Unknown
        })
        .times(1)
        .returning(|_| Ok(StepDecision::ask("gives milk?")));
    let (verifier, _) = verifier(oracle);

    verifier.start(start_params("dog", "dlg-1")).await.unwrap();
    let reply = verifier
        .answer(answer_params("dlg-1", "unknown"))
        .await
        .unwrap();

    assert_eq!(reply.status, TurnStatus::Asking);
    assert_eq!(reply.question.as_deref(), Some("gives milk?"));
}

#[tokio::test]
async fn test_answer_unknown_session() {
    let oracle = MockInferenceOracle::new();
    let (verifier, store) = verifier(oracle);

    let err = verifier
        .answer(answer_params("nonexistent-id", "yes"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AppError::Session(SessionError::UnknownSession { .. })
    ));
    // No state was created as a side effect.
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_answer_invalid_value_leaves_state_unchanged() {
    let mut oracle = MockInferenceOracle::new();
    oracle
        .expect_next_step()
        .times(1)
        .returning(|_| Ok(StepDecision::ask("has fur?")));
    let (verifier, _) = verifier(oracle);

    verifier.start(start_params("cat", "dlg-1")).await.unwrap();
    let before = verifier.snapshot("dlg-1").await.unwrap();

    let err = verifier
        .answer(answer_params("dlg-1", "maybe"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Session(SessionError::InvalidAnswer { .. })
    ));

    let after = verifier.snapshot("dlg-1").await.unwrap();
    assert_eq!(before.status, after.status);
    assert_eq!(before.question, after.question);
    assert_eq!(before.answered, after.answered);
    assert_eq!(before.trace, after.trace);
}

#[tokio::test]
async fn test_post_terminal_answer_rejected_and_trace_unchanged() {
    let mut oracle = MockInferenceOracle::new();
    oracle
        .expect_next_step()
        .withf(|q| q.answered_features.is_empty())
        .times(1)
        .returning(|_| Ok(StepDecision::ask("has fur?")));
    oracle
        .expect_next_step()
        .withf(|q| !q.answered_features.is_empty())
        .times(1)
        .returning(|_| {
            Ok(StepDecision::success("Confirmed! The animal is cat")
                .with_animal("cat")
                .with_trace_step(trace_step("R9", "cat")))
        });
    let (verifier, _) = verifier(oracle);

    verifier.start(start_params("cat", "dlg-1")).await.unwrap();
    verifier.answer(answer_params("dlg-1", "yes")).await.unwrap();
    let before = verifier.snapshot("dlg-1").await.unwrap();

    let err = verifier
        .answer(answer_params("dlg-1", "yes"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Session(SessionError::Terminated { .. })
    ));

    let after = verifier.snapshot("dlg-1").await.unwrap();
    assert_eq!(after.status, TurnStatus::Success);
    assert_eq!(before.answered, after.answered);
    assert_eq!(before.trace, after.trace);
}

#[tokio::test]
async fn test_engine_failure_leaves_dialogue_replayable() {
    let mut oracle = MockInferenceOracle::new();
    oracle
        .expect_next_step()
        .withf(|q| q.answered_features.is_empty())
        .times(1)
        .returning(|_| Ok(StepDecision::ask("has fur?")));
    // First follow-up call fails, the replay succeeds.
    let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    oracle
        .expect_next_step()
        .withf(|q| !q.answered_features.is_empty())
        .times(2)
        .returning(move |_| {
            if calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                Err(EngineError::Unavailable {
                    message: "connection reset".to_string(),
                    retries: 3,
                })
            } else {
                Ok(StepDecision::ask("says meow?"))
            }
        });
    let (verifier, _) = verifier(oracle);

    verifier.start(start_params("cat", "dlg-1")).await.unwrap();

    let err = verifier
        .answer(answer_params("dlg-1", "yes"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Engine(_)));

    // The failed turn committed nothing: same question still pending.
    let snapshot = verifier.snapshot("dlg-1").await.unwrap();
    assert_eq!(snapshot.status, TurnStatus::Asking);
    assert_eq!(snapshot.question.as_deref(), Some("has fur?"));
    assert!(snapshot.answered.is_empty());

    // Replaying the same answer now succeeds.
    let reply = verifier.answer(answer_params("dlg-1", "yes")).await.unwrap();
    assert_eq!(reply.question.as_deref(), Some("says meow?"));
}

#[tokio::test]
async fn test_repeated_question_from_engine_is_rejected() {
    let mut oracle = MockInferenceOracle::new();
    oracle
        .expect_next_step()
        .withf(|q| q.answered_features.is_empty())
        .times(1)
        .returning(|_| Ok(StepDecision::ask("has fur?")));
    oracle
        .expect_next_step()
        .withf(|q| !q.answered_features.is_empty())
        .times(1)
        .returning(|_| Ok(StepDecision::ask("has fur?")));
    let (verifier, _) = verifier(oracle);

    verifier.start(start_params("cat", "dlg-1")).await.unwrap();
    let err = verifier
        .answer(answer_params("dlg-1", "yes"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AppError::Engine(EngineError::InvalidResponse { .. })
    ));

    // The malformed decision committed nothing.
    let snapshot = verifier.snapshot("dlg-1").await.unwrap();
    assert!(snapshot.answered.is_empty());
    assert_eq!(snapshot.question.as_deref(), Some("has fur?"));
}

#[tokio::test]
async fn test_asking_decision_without_question_is_rejected() {
    let mut oracle = MockInferenceOracle::new();
    oracle
        .expect_next_step()
        .withf(|q| q.answered_features.is_empty())
        .times(1)
        .returning(|_| Ok(StepDecision::ask("has fur?")));
    oracle
        .expect_next_step()
        .withf(|q| !q.answered_features.is_empty())
        .times(1)
        .returning(|_| {
            let mut decision = StepDecision::ask("placeholder");
            decision.question = None;
            Ok(decision)
        });
    let (verifier, _) = verifier(oracle);

    verifier.start(start_params("cat", "dlg-1")).await.unwrap();
    let err = verifier
        .answer(answer_params("dlg-1", "yes"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AppError::Engine(EngineError::InvalidResponse { .. })
    ));
}

#[tokio::test]
async fn test_success_without_engine_animal_falls_back_to_target() {
    let mut oracle = MockInferenceOracle::new();
    oracle
        .expect_next_step()
        .withf(|q| q.answered_features.is_empty())
        .times(1)
        .returning(|_| Ok(StepDecision::ask("has fur?")));
    oracle
        .expect_next_step()
        .withf(|q| !q.answered_features.is_empty())
        .times(1)
        .returning(|_| Ok(StepDecision::success("Confirmed")));
    let (verifier, _) = verifier(oracle);

    verifier.start(start_params("cat", "dlg-1")).await.unwrap();
    let reply = verifier.answer(answer_params("dlg-1", "yes")).await.unwrap();

    assert_eq!(reply.animal.as_deref(), Some("cat"));
}

#[tokio::test]
async fn test_abandon_then_answer_is_unknown_session() {
    let mut oracle = MockInferenceOracle::new();
    oracle
        .expect_next_step()
        .times(1)
        .returning(|_| Ok(StepDecision::ask("has fur?")));
    let (verifier, _) = verifier(oracle);

    verifier.start(start_params("cat", "dlg-1")).await.unwrap();

    let reply = verifier.abandon("dlg-1");
    assert!(reply.removed);
    let reply = verifier.abandon("dlg-1");
    assert!(!reply.removed);

    let err = verifier
        .answer(answer_params("dlg-1", "yes"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Session(SessionError::UnknownSession { .. })
    ));
}
