use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::SharedState;
use crate::engine::{ForwardQuery, RuleDraft};
use crate::error::{AppError, McpError, McpResult};
use crate::verify::{AnswerParams, StartParams};

/// Route tool calls to appropriate handlers
pub async fn handle_tool_call(
    state: &SharedState,
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<Value> {
    info!(tool = %tool_name, "Routing tool call");

    match tool_name {
        // Backward verification dialogue
        "verify_start" => handle_verify_start(state, arguments).await,
        "verify_answer" => handle_verify_answer(state, arguments).await,
        "verify_state" => handle_verify_state(state, arguments).await,
        "verify_abandon" => handle_verify_abandon(state, arguments).await,
        // Forward chaining (pass-through)
        "forward_run" => handle_forward_run(state, arguments).await,
        // Rule CRUD (pass-through)
        "rules_list" => handle_rules_list(state).await,
        "rule_create" => handle_rule_create(state, arguments).await,
        "rule_update" => handle_rule_update(state, arguments).await,
        "rule_delete" => handle_rule_delete(state, arguments).await,
        // Catalogs (pass-through)
        "animals_list" => handle_animals_list(state).await,
        "features_list" => handle_features_list(state).await,
        _ => Err(McpError::UnknownTool {
            tool_name: tool_name.to_string(),
        }),
    }
}

/// Parse tool arguments into the expected parameter type
fn parse_arguments<T: DeserializeOwned>(tool: &str, arguments: Option<Value>) -> McpResult<T> {
    let arguments = arguments.ok_or_else(|| McpError::InvalidParameters {
        tool_name: tool.to_string(),
        message: "missing arguments".to_string(),
    })?;

    serde_json::from_value(arguments).map_err(|e| McpError::InvalidParameters {
        tool_name: tool.to_string(),
        message: e.to_string(),
    })
}

/// Shape a verification failure as an in-band protocol reply.
///
/// The dialogue protocol reports its own failures in the reply body
/// (`status: "error"` with a machine-readable kind), keeping them distinct
/// from a business-level `failed` verdict.
fn error_reply(err: &AppError) -> Value {
    warn!(kind = err.error_kind(), error = %err, "Verification turn rejected");
    json!({
        "status": "error",
        "error": err.error_kind(),
        "message": err.to_string(),
    })
}

/// Handle verify_start tool call
async fn handle_verify_start(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: StartParams = parse_arguments("verify_start", arguments)?;

    match state.verifier.start(params).await {
        Ok(reply) => serde_json::to_value(reply).map_err(McpError::Json),
        Err(e) => Ok(error_reply(&e)),
    }
}

/// Handle verify_answer tool call
async fn handle_verify_answer(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: AnswerParams = parse_arguments("verify_answer", arguments)?;

    match state.verifier.answer(params).await {
        Ok(reply) => serde_json::to_value(reply).map_err(McpError::Json),
        Err(e) => Ok(error_reply(&e)),
    }
}

/// Handle verify_state tool call
async fn handle_verify_state(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    #[derive(serde::Deserialize)]
    struct StateParams {
        session_id: String,
    }

    let params: StateParams = parse_arguments("verify_state", arguments)?;

    match state.verifier.snapshot(&params.session_id).await {
        Ok(snapshot) => serde_json::to_value(snapshot).map_err(McpError::Json),
        Err(e) => Ok(error_reply(&e)),
    }
}

/// Handle verify_abandon tool call
async fn handle_verify_abandon(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    #[derive(serde::Deserialize)]
    struct AbandonParams {
        session_id: String,
    }

    let params: AbandonParams = parse_arguments("verify_abandon", arguments)?;

    let reply = state.verifier.abandon(&params.session_id);
    serde_json::to_value(reply).map_err(McpError::Json)
}

/// Handle forward_run tool call
async fn handle_forward_run(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let query: ForwardQuery = parse_arguments("forward_run", arguments)?;

    if query.features.is_empty() {
        return Err(McpError::InvalidParameters {
            tool_name: "forward_run".to_string(),
            message: "select at least one feature".to_string(),
        });
    }

    let outcome = state
        .engine
        .run_forward(&query)
        .await
        .map_err(|e| McpError::ExecutionFailed {
            message: e.to_string(),
        })?;

    serde_json::to_value(outcome).map_err(McpError::Json)
}

/// Handle rules_list tool call
async fn handle_rules_list(state: &SharedState) -> McpResult<Value> {
    let book = state
        .engine
        .list_rules()
        .await
        .map_err(|e| McpError::ExecutionFailed {
            message: e.to_string(),
        })?;

    serde_json::to_value(book).map_err(McpError::Json)
}

/// Handle rule_create tool call
async fn handle_rule_create(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let draft: RuleDraft = parse_arguments("rule_create", arguments)?;

    let saved = state
        .engine
        .create_rule(&draft)
        .await
        .map_err(|e| McpError::ExecutionFailed {
            message: e.to_string(),
        })?;

    serde_json::to_value(saved).map_err(McpError::Json)
}

/// Handle rule_update tool call
async fn handle_rule_update(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    #[derive(serde::Deserialize)]
    struct UpdateParams {
        rule_id: String,
        #[serde(flatten)]
        draft: RuleDraft,
    }

    let params: UpdateParams = parse_arguments("rule_update", arguments)?;

    let saved = state
        .engine
        .update_rule(&params.rule_id, &params.draft)
        .await
        .map_err(|e| McpError::ExecutionFailed {
            message: e.to_string(),
        })?;

    serde_json::to_value(saved).map_err(McpError::Json)
}

/// Handle rule_delete tool call
async fn handle_rule_delete(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    #[derive(serde::Deserialize)]
    struct DeleteParams {
        rule_id: String,
    }

    let params: DeleteParams = parse_arguments("rule_delete", arguments)?;

    let removed = state
        .engine
        .delete_rule(&params.rule_id)
        .await
        .map_err(|e| McpError::ExecutionFailed {
            message: e.to_string(),
        })?;

    serde_json::to_value(removed).map_err(McpError::Json)
}

/// Handle animals_list tool call
async fn handle_animals_list(state: &SharedState) -> McpResult<Value> {
    let catalog = state
        .engine
        .list_animals()
        .await
        .map_err(|e| McpError::ExecutionFailed {
            message: e.to_string(),
        })?;

    serde_json::to_value(catalog).map_err(McpError::Json)
}

/// Handle features_list tool call
async fn handle_features_list(state: &SharedState) -> McpResult<Value> {
    let catalog = state
        .engine
        .list_features()
        .await
        .map_err(|e| McpError::ExecutionFailed {
            message: e.to_string(),
        })?;

    serde_json::to_value(catalog).map_err(McpError::Json)
}
