//! HTTP action executor
//!
//! Forwards each action invocation to the owning module:
//! `POST <endpoint>/actions/<action_type>/<version>` with
//! `{"inputs": ..., "idempotency_key": ..., "is_compensation": ...}`; a 2xx
//! response body `{"output": ...}` is the step output.

use async_trait::async_trait;
use chain_engine::{ActionError, ActionExecutor, ActionRequest};
use chain_types::Registry;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Serialize)]
struct InvokeBody<'a> {
    inputs: &'a Map<String, Value>,
    idempotency_key: String,
    is_compensation: bool,
}

#[derive(Debug, Deserialize)]
struct InvokeResponse {
    #[serde(default)]
    output: Value,
}

/// Executes actions by calling the owning module over HTTP
#[derive(Debug, Clone)]
pub struct HttpActionExecutor {
    client: reqwest::Client,
    /// `(action_type, version)` to module base URL
    routes: HashMap<(String, u32), String>,
}

impl HttpActionExecutor {
    /// Route every registry action whose owning module has an endpoint
    pub fn from_registry(
        client: reqwest::Client,
        registry: &Registry,
        endpoints: &HashMap<String, String>,
    ) -> Self {
        let routes = registry
            .actions()
            .into_iter()
            .filter_map(|action| {
                endpoints.get(&action.owning_module).map(|endpoint| {
                    ((action.action_type.clone(), action.version), endpoint.clone())
                })
            })
            .collect();
        Self { client, routes }
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    fn url(&self, action_type: &str, version: u32) -> Option<String> {
        self.routes
            .get(&(action_type.to_string(), version))
            .map(|endpoint| format!("{}/actions/{}/{}", endpoint, action_type, version))
    }

    async fn post(&self, url: &str, request: &ActionRequest) -> Result<Value, ActionError> {
        let body = InvokeBody {
            inputs: &request.inputs,
            idempotency_key: request.idempotency_key(),
            is_compensation: request.is_compensation,
        };
        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ActionError::failed(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ActionError::failed(format!(
                "{} returned {}: {}",
                url, status, text
            )));
        }

        let parsed: InvokeResponse = response
            .json()
            .await
            .map_err(|e| ActionError::failed(format!("invalid response from {}: {}", url, e)))?;
        Ok(parsed.output)
    }
}

#[async_trait]
impl ActionExecutor for HttpActionExecutor {
    async fn execute(
        &self,
        request: ActionRequest,
        cancel: CancellationToken,
    ) -> Result<Value, ActionError> {
        let Some(url) = self.url(&request.action_type, request.version) else {
            return Err(ActionError::Unhandled {
                action_type: request.action_type,
                version: request.version,
            });
        };

        tracing::debug!(
            execution_id = %request.execution_id,
            alias = %request.alias,
            url = %url,
            "Invoking remote action"
        );

        tokio::select! {
            _ = cancel.cancelled() => Err(ActionError::Cancelled),
            result = self.post(&url, &request) => result,
        }
    }
}
