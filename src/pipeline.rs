//! Pipeline execution API client (C3): invokes the internal flow-execution
//! endpoint for a claimed job and races it against cooperative cancellation.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::error::{sanitize, Result, WorkerError};

#[derive(Debug, Deserialize)]
pub struct PipelineOutcome {
    pub executed_steps: i32,
    pub failed_steps: i32,
    pub skipped_steps: i32,
    #[serde(default)]
    pub error: Option<String>,
}

impl PipelineOutcome {
    pub fn succeeded(&self) -> bool {
        self.failed_steps == 0 && self.error.is_none()
    }
}

pub struct PipelineClient {
    client: Client,
    base_url: String,
    secret: String,
    project_id: String,
}

impl PipelineClient {
    pub fn new(base_url: String, secret: String, project_id: String, connect_timeout: Duration) -> Result<Self> {
        let client = Client::builder().connect_timeout(connect_timeout).build()?;
        Ok(Self { client, base_url, secret, project_id })
    }

    /// Run the job's flow to completion or cancellation, whichever comes
    /// first. Cancellation surfaces as `WorkerError::Other("cancelled")`
    /// so the caller can distinguish it from a genuine pipeline failure.
    pub async fn execute_flow(
        &self,
        global_variables: &HashMap<String, String>,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<PipelineOutcome> {
        let request = self
            .client
            .post(format!("{}/api/internal/execute-flow", self.base_url))
            .header("x-internal-secret", &self.secret)
            .timeout(timeout)
            .json(&json!({
                "projectId": self.project_id,
                "globalVariables": global_variables,
                "clearResults": true,
            }))
            .send();

        tokio::select! {
            _ = cancel.cancelled() => Err(WorkerError::Other("cancelled".to_string())),
            result = request => {
                let response = result.map_err(|e| WorkerError::Other(sanitize(&e.to_string())))?;
                if let Err(e) = response.error_for_status_ref() {
                    let status = e.status();
                    let body = response.text().await.unwrap_or_default();
                    return Err(WorkerError::Other(sanitize(&format!("pipeline returned {status:?}: {body}"))));
                }
                response
                    .json::<PipelineOutcome>()
                    .await
                    .map_err(|e| WorkerError::Other(sanitize(&e.to_string())))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_with_failed_steps_is_not_success() {
        let outcome = PipelineOutcome { executed_steps: 3, failed_steps: 1, skipped_steps: 0, error: None };
        assert!(!outcome.succeeded());
    }

    #[test]
    fn outcome_with_no_failures_and_no_error_is_success() {
        let outcome = PipelineOutcome { executed_steps: 3, failed_steps: 0, skipped_steps: 1, error: None };
        assert!(outcome.succeeded());
    }
}
