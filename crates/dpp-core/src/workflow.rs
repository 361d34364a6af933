//! Workflow-orchestration proxy: token minting and remote CLI execution.
//!
//! The managed Airflow service exposes no REST API of its own; CLI commands
//! are POSTed as plain text to `https://<web-server-host>/aws_mwaa/cli` with a
//! short-lived bearer token, and the answer is a JSON envelope whose
//! `stdout`/`stderr` are base64 (decoded in [`crate::extract`]).

use crate::aws::AwsCli;
use crate::config::ProbeConfig;
use crate::error::{DppError, Result};
use crate::probe::WorkflowService;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use std::fmt;
use tracing::debug;

const CLI_PATH: &str = "/aws_mwaa/cli";

// ---------------------------------------------------------------------------
// CliToken
// ---------------------------------------------------------------------------

/// Short-lived CLI credential. Lives for the rest of the run and is never
/// written anywhere; `Debug`/`Display` leave the secret out.
#[derive(Clone, PartialEq, Eq)]
pub struct CliToken {
    hostname: String,
    token: String,
}

impl CliToken {
    pub fn new(hostname: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            token: token.into(),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn secret(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for CliToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CliToken")
            .field("hostname", &self.hostname)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl fmt::Display for CliToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hostname={} token=<redacted>", self.hostname)
    }
}

// ---------------------------------------------------------------------------
// HttpWorkflowProxy
// ---------------------------------------------------------------------------

pub struct HttpWorkflowProxy {
    client: Client,
}

impl HttpWorkflowProxy {
    pub fn new(config: &ProbeConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DppError::Upstream(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// CLI endpoint for a web-server hostname. A hostname that already has a
    /// scheme is taken as the base URL.
    pub fn endpoint(hostname: &str) -> String {
        if hostname.contains("://") {
            format!("{}{CLI_PATH}", hostname.trim_end_matches('/'))
        } else {
            format!("https://{hostname}{CLI_PATH}")
        }
    }

    /// POST `command` and return the response body unparsed.
    pub fn execute(&self, token: &CliToken, command: &str) -> Result<String> {
        let url = Self::endpoint(token.hostname());
        debug!(%url, command, "executing workflow CLI command");

        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .bearer_auth(token.secret())
            .body(command.to_string())
            .send()
            .map_err(|e| DppError::Upstream(format!("POST {url}: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| DppError::Upstream(format!("reading response from {url}: {e}")))?;
        if !status.is_success() {
            let hint: String = body.chars().take(200).collect();
            return Err(DppError::Upstream(format!(
                "POST {url} returned {status}: {}",
                hint.trim()
            )));
        }
        Ok(body)
    }
}

// ---------------------------------------------------------------------------
// MwaaWorkflow
// ---------------------------------------------------------------------------

/// Workflow service backed by the AWS CLI (token) and the HTTP proxy (commands).
pub struct MwaaWorkflow<'a> {
    aws: AwsCli<'a>,
    proxy: HttpWorkflowProxy,
}

impl<'a> MwaaWorkflow<'a> {
    pub fn new(config: &'a ProbeConfig) -> Result<Self> {
        Ok(Self {
            aws: AwsCli::new(config),
            proxy: HttpWorkflowProxy::new(config)?,
        })
    }
}

impl WorkflowService for MwaaWorkflow<'_> {
    fn mint_cli_token(&self, environment: &str) -> Result<CliToken> {
        self.aws.create_cli_token(environment)
    }

    fn execute(&self, token: &CliToken, command: &str) -> Result<String> {
        self.proxy.execute(token, command)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn endpoint_defaults_to_https() {
        assert_eq!(
            HttpWorkflowProxy::endpoint("abc.airflow.eu-west-1.on.aws"),
            "https://abc.airflow.eu-west-1.on.aws/aws_mwaa/cli"
        );
        assert_eq!(
            HttpWorkflowProxy::endpoint("http://127.0.0.1:8080/"),
            "http://127.0.0.1:8080/aws_mwaa/cli"
        );
    }

    #[test]
    fn token_is_redacted_in_debug_and_display() {
        let token = CliToken::new("host", "very-secret");
        assert!(!format!("{token:?}").contains("very-secret"));
        assert!(!token.to_string().contains("very-secret"));
        assert_eq!(token.secret(), "very-secret");
    }

    #[test]
    fn execute_posts_command_with_bearer_token() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/aws_mwaa/cli")
            .match_header("authorization", "Bearer tok-123")
            .match_header("content-type", "application/json")
            .match_body("dags list -o json")
            .with_status(200)
            .with_body(r#"{"stderr":"","stdout":"W10="}"#)
            .create();

        let proxy = HttpWorkflowProxy::new(&ProbeConfig::default()).unwrap();
        let body = proxy
            .execute(&CliToken::new(server.url(), "tok-123"), "dags list -o json")
            .unwrap();
        assert_eq!(body, r#"{"stderr":"","stdout":"W10="}"#);
        mock.assert();
    }

    #[test]
    fn non_success_status_is_upstream_error() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/aws_mwaa/cli")
            .with_status(403)
            .with_body("Forbidden: token expired")
            .create();

        let proxy = HttpWorkflowProxy::new(&ProbeConfig::default()).unwrap();
        match proxy.execute(&CliToken::new(server.url(), "stale"), "version") {
            Err(DppError::Upstream(msg)) => {
                assert!(msg.contains("403"));
                assert!(msg.contains("token expired"));
            }
            other => panic!("expected Upstream, got {other:?}"),
        }
    }

    #[test]
    fn unreachable_host_is_upstream_error() {
        let cfg = ProbeConfig::default().with_timeout(Duration::from_secs(2));
        let proxy = HttpWorkflowProxy::new(&cfg).unwrap();
        let result = proxy.execute(&CliToken::new("http://127.0.0.1:1", "t"), "version");
        assert!(matches!(result, Err(DppError::Upstream(_))));
    }
}
