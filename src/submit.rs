//! Submission of rendered plans to a remote endpoint
//!
//! The rendered wire list is posted to `<endpoint>/plan`. HTTP statuses are
//! outcomes, not errors; only a failed connection is a [`SubmitError`].

use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Content type of a rendered phase manifest
pub const CONTENT_TYPE: &str = "application/vnd.phase-manifest+json";

/// Errors that prevent a submission from getting a response
#[derive(Debug, Error)]
pub enum SubmitError {
    /// No endpoint configured
    #[error("no submission endpoint configured (use --endpoint, PHASEPLAN_ENDPOINT or [submit] endpoint)")]
    NoEndpoint,

    /// Connection refused, DNS failure, timeout, etc.
    #[error("failed to reach {url}: {message}")]
    Transport { url: String, message: String },

    /// Rendered plan could not be encoded
    #[error("failed to encode rendered plan: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Response classes of the submission endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// 200: manifest accepted
    Accepted { body: String },
    /// 400: manifest rejected as invalid
    Rejected { body: String },
    /// 409: another manifest is in flight
    Conflict { body: String },
    /// Any other status
    Unexpected { status: u16, body: String },
}

impl SubmitOutcome {
    /// Classify an HTTP status
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            200 => Self::Accepted { body },
            400 => Self::Rejected { body },
            409 => Self::Conflict { body },
            status => Self::Unexpected { status, body },
        }
    }
}

/// Blocking client for the submission endpoint
pub struct SubmitClient {
    agent: ureq::Agent,
    endpoint: String,
}

impl SubmitClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            agent,
            endpoint: endpoint.into(),
        }
    }

    /// URL the plan is posted to
    pub fn plan_url(&self) -> String {
        plan_url(&self.endpoint)
    }

    /// Post the rendered plan
    pub fn submit(&self, rendered: &[Value]) -> Result<SubmitOutcome, SubmitError> {
        let url = self.plan_url();
        let body = serde_json::to_string(rendered)?;
        log::debug!("POST {url} ({} bytes)", body.len());

        let transport = |e: ureq::Error| SubmitError::Transport {
            url: url.clone(),
            message: e.to_string(),
        };

        let mut response = self
            .agent
            .post(&url)
            .header("Content-Type", CONTENT_TYPE)
            .send(&body)
            .map_err(transport)?;

        let status = response.status().as_u16();
        // A missing or unreadable body does not change the outcome
        let text = response.body_mut().read_to_string().unwrap_or_default();
        log::info!("Submission to {url} returned {status}");

        Ok(SubmitOutcome::from_status(status, text))
    }
}

/// `<endpoint>/plan`, tolerating a trailing slash
pub fn plan_url(endpoint: &str) -> String {
    format!("{}/plan", endpoint.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::net::TcpListener;

    #[test]
    fn test_plan_url() {
        assert_eq!(plan_url("http://localhost:8080"), "http://localhost:8080/plan");
        assert_eq!(plan_url("http://localhost:8080/"), "http://localhost:8080/plan");
        assert_eq!(plan_url("https://ops.example/api"), "https://ops.example/api/plan");
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            SubmitOutcome::from_status(200, String::new()),
            SubmitOutcome::Accepted { .. }
        ));
        assert_eq!(
            SubmitOutcome::from_status(400, "bad".to_string()),
            SubmitOutcome::Rejected {
                body: "bad".to_string()
            }
        );
        assert!(matches!(
            SubmitOutcome::from_status(409, String::new()),
            SubmitOutcome::Conflict { .. }
        ));
        assert!(matches!(
            SubmitOutcome::from_status(503, String::new()),
            SubmitOutcome::Unexpected { status: 503, .. }
        ));
        assert!(matches!(
            SubmitOutcome::from_status(201, String::new()),
            SubmitOutcome::Unexpected { status: 201, .. }
        ));
    }

    #[test]
    fn test_connection_refused_is_transport_error() {
        // Bind then drop to get a port nothing listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = SubmitClient::new(format!("http://127.0.0.1:{port}"), Duration::from_secs(2));

        let err = client
            .submit(&[json!({"Kind": "Phase", "Id": "a", "Spec": {}})])
            .unwrap_err();
        assert!(matches!(err, SubmitError::Transport { ref url, .. } if url.ends_with("/plan")));
    }
}
