//! Worker configuration, loaded once at startup from the environment.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

/// Validated startup configuration, loaded once from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,

    pub project_id: String,
    pub project_name: String,
    pub mode_filter: Option<String>,

    pub poll_interval: Duration,
    pub external_api_base_url: String,
    pub internal_api_base_url: String,
    pub external_secret: String,
    pub internal_secret: String,
    pub external_api_timeout: Duration,
    pub pipeline_timeout: Duration,
    pub max_job_runtime: Duration,
    pub recovery_interval: Duration,
    pub max_concurrent_jobs: usize,
    pub heartbeat_interval: Duration,
}

impl Config {
    /// Load and validate configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        let project_id = env::var("PROJECT_ID").context("PROJECT_ID must be set")?;
        let project_name = env::var("PROJECT_NAME").context("PROJECT_NAME must be set")?;
        let mode_filter = env::var("MODE_FILTER").ok().filter(|s| !s.is_empty());

        let external_api_base_url = env::var("EXTERNAL_API_BASE_URL").unwrap_or_default();
        let internal_api_base_url = env::var("INTERNAL_API_BASE_URL").unwrap_or_default();

        let external_secret =
            env::var("EXTERNAL_SECRET").context("EXTERNAL_SECRET must be set and non-empty")?;
        if external_secret.is_empty() {
            anyhow::bail!("EXTERNAL_SECRET must be non-empty");
        }
        let internal_secret =
            env::var("INTERNAL_SECRET").context("INTERNAL_SECRET must be set and non-empty")?;
        if internal_secret.is_empty() {
            anyhow::bail!("INTERNAL_SECRET must be non-empty");
        }

        let poll_interval = parse_secs("POLL_INTERVAL_SECS", 10)?;
        let external_api_timeout = parse_secs("EXTERNAL_API_TIMEOUT_SECS", 30)?;
        let pipeline_timeout = parse_secs("PIPELINE_TIMEOUT_SECS", 90 * 60)?;
        let max_job_runtime = parse_secs("MAX_JOB_RUNTIME_SECS", 90 * 60)?;
        let recovery_interval = parse_secs("RECOVERY_INTERVAL_SECS", 60 * 60)?;
        let heartbeat_interval = parse_secs("HEARTBEAT_INTERVAL_SECS", 30)?;

        let max_concurrent_jobs = env::var("MAX_CONCURRENT_JOBS")
            .ok()
            .map(|v| v.parse::<usize>())
            .transpose()
            .context("MAX_CONCURRENT_JOBS must be a valid number")?
            .unwrap_or(1)
            .clamp(1, 100);

        for (name, url) in [
            ("EXTERNAL_API_BASE_URL", &external_api_base_url),
            ("INTERNAL_API_BASE_URL", &internal_api_base_url),
        ] {
            if url.starts_with("http://") && !url.contains("localhost") && !url.contains("127.0.0.1") {
                tracing::warn!(%name, %url, "plain HTTP base URL to a non-localhost host in production");
            }
        }

        Ok(Self {
            database_url,
            project_id,
            project_name,
            mode_filter,
            poll_interval,
            external_api_base_url,
            internal_api_base_url,
            external_secret,
            internal_secret,
            external_api_timeout,
            pipeline_timeout,
            max_job_runtime,
            recovery_interval,
            max_concurrent_jobs,
            heartbeat_interval,
        })
    }

    /// Build this worker's unique identity tag: `worker-<project>-<index>-<pid>`.
    pub fn worker_id(&self, instance_index: u32) -> String {
        let sanitized: String = self
            .project_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
            .collect();
        format!("worker-{}-{}-{}", sanitized, instance_index, std::process::id())
    }
}

fn parse_secs(name: &str, default_secs: u64) -> Result<Duration> {
    let secs = env::var(name)
        .ok()
        .map(|v| v.parse::<u64>())
        .transpose()
        .with_context(|| format!("{name} must be a valid number of seconds"))?
        .unwrap_or(default_secs);
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_id_sanitizes_project_name_and_is_unique_per_index() {
        let cfg = Config {
            database_url: String::new(),
            project_id: "p".into(),
            project_name: "My Cool Project!".into(),
            mode_filter: None,
            poll_interval: Duration::from_secs(10),
            external_api_base_url: String::new(),
            internal_api_base_url: String::new(),
            external_secret: "s".into(),
            internal_secret: "s".into(),
            external_api_timeout: Duration::from_secs(30),
            pipeline_timeout: Duration::from_secs(60),
            max_job_runtime: Duration::from_secs(60),
            recovery_interval: Duration::from_secs(60),
            max_concurrent_jobs: 1,
            heartbeat_interval: Duration::from_secs(30),
        };
        let a = cfg.worker_id(0);
        let b = cfg.worker_id(1);
        assert_ne!(a, b);
        assert!(a.starts_with("worker-my-cool-project--0-"));
    }
}
