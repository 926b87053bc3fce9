//! Crate-wide error type and outbound error-message sanitization.

use once_cell::sync::Lazy;
use regex::Regex;

pub type Result<T> = std::result::Result<T, WorkerError>;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

impl From<String> for WorkerError {
    fn from(msg: String) -> Self {
        WorkerError::Other(msg)
    }
}

static LONG_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z0-9_\-]{20,}").unwrap());
static BEARER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)bearer\s+\S+").unwrap());
static SECRET_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(api[_-]?key|secret|password|token)\s*[:=]\s*\S+"#).unwrap()
});
static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap()
});

const REDACTED: &str = "[REDACTED]";

/// Scrub an error string of anything that looks like a credential before it
/// leaves the process (DB write, log line, or frontend PATCH body).
///
/// Applied unconditionally per the error-handling contract: long tokens,
/// bearer headers, key/secret/password/token fields, and email addresses.
pub fn sanitize(input: &str) -> String {
    let s = SECRET_FIELD.replace_all(input, REDACTED);
    let s = BEARER.replace_all(&s, REDACTED);
    let s = EMAIL.replace_all(&s, REDACTED);
    let s = LONG_TOKEN.replace_all(&s, REDACTED);
    s.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_api_key_field() {
        let out = sanitize("api_key=sk-abcdef123456 bad config");
        assert!(out.contains(REDACTED));
        assert!(!out.contains("sk-abcdef123456"));
    }

    #[test]
    fn redacts_bearer_token() {
        let out = sanitize("request failed: Bearer abc123.def456.ghi789xyz");
        assert!(out.contains(REDACTED));
        assert!(!out.to_lowercase().contains("bearer abc123"));
    }

    #[test]
    fn redacts_email_addresses() {
        let out = sanitize("notify owner@example.com about the failure");
        assert!(out.contains(REDACTED));
        assert!(!out.contains("owner@example.com"));
    }

    #[test]
    fn redacts_long_opaque_tokens() {
        let out = sanitize("trace id abcdefghijklmnopqrstuvwxyz0123456789 failed");
        assert!(out.contains(REDACTED));
    }

    #[test]
    fn leaves_short_plain_text_alone() {
        let out = sanitize("connection refused");
        assert_eq!(out, "connection refused");
    }
}
