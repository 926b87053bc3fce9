//! Frontend API client (C2): fetches externally-queued jobs and mirrors
//! status transitions back. All calls are best-effort — errors are logged
//! and never propagated to the caller.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::error::{sanitize, Result};
use crate::model::{Job, JobStatus};

#[derive(Debug, Deserialize)]
struct QueuedJobsResponse {
    jobs: Vec<QueuedJobPayload>,
}

#[derive(Debug, Deserialize)]
struct QueuedJobPayload {
    #[serde(alias = "jobId")]
    id: String,
    #[serde(rename = "sessionId")]
    session_id: String,
    mode: String,
    #[serde(default)]
    responses: serde_json::Value,
    #[serde(default, rename = "userData")]
    user_data: Option<serde_json::Value>,
    #[serde(default)]
    batch_id: Option<String>,
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default, rename = "createdAt")]
    created_at: Option<DateTime<Utc>>,
}

pub struct FrontendClient {
    client: Client,
    base_url: String,
    secret: String,
}

impl FrontendClient {
    pub fn new(base_url: String, secret: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url, secret })
    }

    /// Fetch jobs the frontend considers queued for the given mode filter.
    /// Batch jobs are not included here — they are sourced from the local
    /// `JobStore` instead, bypassing this client entirely. Never fails the
    /// caller's poll loop on transport error, only logs it.
    pub async fn fetch_queued(&self, mode_filter: Option<&str>) -> Vec<Job> {
        let mut req = self
            .client
            .get(format!("{}/api/external/jobs", self.base_url))
            .header("x-worker-secret", &self.secret)
            .query(&[("status", "queued")]);
        if let Some(mode) = mode_filter {
            req = req.query(&[("mode", mode)]);
        }

        let response = match req.send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %sanitize(&e.to_string()), "frontend fetch_queued failed");
                return Vec::new();
            }
        };

        let payload: QueuedJobsResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %sanitize(&e.to_string()), "frontend fetch_queued returned malformed body");
                return Vec::new();
            }
        };

        let now = chrono::Utc::now();
        payload
            .jobs
            .into_iter()
            .map(|p| Job {
                id: p.id,
                session_id: p.session_id,
                mode: p.mode,
                responses: p.responses,
                user_data: p.user_data,
                status: JobStatus::Queued,
                worker_id: None,
                error: None,
                batch_id: p.batch_id,
                file_name: p.file_name,
                created_at: p.created_at.unwrap_or(now),
                updated_at: now,
                completed_at: None,
            })
            .collect()
    }

    /// Best-effort mirror of a status transition to the frontend. Never
    /// returns an error the caller must handle; logs failures and moves on.
    pub async fn patch_status(
        &self,
        job_id: &str,
        status: JobStatus,
        error_message: Option<&str>,
        completed_at: Option<DateTime<Utc>>,
    ) {
        let body = json!({
            "status": status.to_string(),
            "error": error_message.map(sanitize),
            "completedAt": completed_at,
        });

        let result = self
            .client
            .patch(format!("{}/jobs/{}", self.base_url, job_id))
            .header("x-worker-secret", &self.secret)
            .json(&body)
            .send()
            .await;

        if let Err(e) = result {
            warn!(job_id, error = %sanitize(&e.to_string()), "frontend patch_status failed");
        }
    }
}
