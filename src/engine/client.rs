use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::types::{
    AnimalCatalog, FeatureCatalog, ForwardOutcome, ForwardQuery, RuleBook, RuleDraft, RuleRemoved,
    RuleSaved, StepDecision, StepQuery,
};
use crate::config::{EngineConfig, RequestConfig};
use crate::error::{EngineError, EngineResult};

/// Decision seam between the dialogue controller and the rule engine.
///
/// The engine is a stateless oracle: it keeps no dialogue state of its own,
/// so every call carries the full evidence and is safe to retry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InferenceOracle: Send + Sync {
    /// Ask for the next verification step given the evidence so far.
    async fn next_step(&self, query: StepQuery) -> EngineResult<StepDecision>;
}

/// Client for the remote rule/inference service
#[derive(Clone)]
pub struct EngineClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    request_config: RequestConfig,
}

impl EngineClient {
    /// Create a new engine client
    pub fn new(config: &EngineConfig, request_config: RequestConfig) -> EngineResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(EngineError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            request_config,
        })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve one verification step, retrying transient failures.
    pub async fn step(&self, query: &StepQuery) -> EngineResult<StepDecision> {
        let url = format!("{}/api/backward/step", self.base_url);

        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.request_config.max_retries {
            if retries > 0 {
                let delay = Duration::from_millis(
                    self.request_config.retry_delay_ms * (2_u64.pow(retries - 1)),
                );
                warn!(
                    target = %query.target,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying verification step"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match self.execute_step(&url, query).await {
                Ok(decision) => {
                    let latency = start.elapsed();
                    info!(
                        target = %query.target,
                        status = %decision.status,
                        latency_ms = latency.as_millis(),
                        "Verification step resolved"
                    );
                    return Ok(decision);
                }
                Err(e) => {
                    let latency = start.elapsed();
                    error!(
                        target = %query.target,
                        error = %e,
                        latency_ms = latency.as_millis(),
                        retry = retries,
                        "Verification step failed"
                    );
                    last_error = Some(e);
                    retries += 1;
                }
            }
        }

        Err(EngineError::Unavailable {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
            retries,
        })
    }

    /// Execute a single step request (internal)
    async fn execute_step(&self, url: &str, query: &StepQuery) -> EngineResult<StepDecision> {
        debug!(
            target = %query.target,
            answered = query.answered_features.len(),
            "Calling rule engine step endpoint"
        );

        let mut request = self.client.post(url).json(query);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                EngineError::Timeout {
                    timeout_ms: self.request_config.timeout_ms,
                }
            } else {
                EngineError::Http(e)
            }
        })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(EngineError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        let decision: StepDecision =
            response
                .json()
                .await
                .map_err(|e| EngineError::InvalidResponse {
                    message: format!("Failed to parse step decision: {}", e),
                })?;

        Ok(decision)
    }

    /// Run forward chaining over the given features.
    pub async fn run_forward(&self, query: &ForwardQuery) -> EngineResult<ForwardOutcome> {
        self.post_json("/api/forward", query).await
    }

    /// Fetch the full rule book.
    pub async fn list_rules(&self) -> EngineResult<RuleBook> {
        self.get_json("/api/rules").await
    }

    /// Create a new rule; the service assigns its id.
    pub async fn create_rule(&self, draft: &RuleDraft) -> EngineResult<RuleSaved> {
        self.post_json("/api/rules", draft).await
    }

    /// Replace an existing rule.
    pub async fn update_rule(&self, rule_id: &str, draft: &RuleDraft) -> EngineResult<RuleSaved> {
        let url = format!("{}/api/rules/{}", self.base_url, rule_id);
        let request = self.authorized(self.client.put(&url).json(draft));
        Self::read_json(request.send().await.map_err(EngineError::Http)?).await
    }

    /// Delete a rule.
    pub async fn delete_rule(&self, rule_id: &str) -> EngineResult<RuleRemoved> {
        let url = format!("{}/api/rules/{}", self.base_url, rule_id);
        let request = self.authorized(self.client.delete(&url));
        Self::read_json(request.send().await.map_err(EngineError::Http)?).await
    }

    /// Fetch the animal catalog.
    pub async fn list_animals(&self) -> EngineResult<AnimalCatalog> {
        self.get_json("/api/animals").await
    }

    /// Fetch the feature catalog.
    pub async fn list_features(&self) -> EngineResult<FeatureCatalog> {
        self.get_json("/api/features").await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> EngineResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let request = self.authorized(self.client.get(&url));
        Self::read_json(request.send().await.map_err(EngineError::Http)?).await
    }

    async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> EngineResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let request = self.authorized(self.client.post(&url).json(body));
        Self::read_json(request.send().await.map_err(EngineError::Http)?).await
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("Authorization", format!("Bearer {}", key)),
            None => request,
        }
    }

    async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> EngineResult<T> {
        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(EngineError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| EngineError::InvalidResponse {
                message: format!("Failed to parse response: {}", e),
            })
    }
}

#[async_trait]
impl InferenceOracle for EngineClient {
    async fn next_step(&self, query: StepQuery) -> EngineResult<StepDecision> {
        self.step(&query).await
    }
}
