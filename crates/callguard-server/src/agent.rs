//! Outbound voice-agent dispatch.
//!
//! When a fraud alert fires and the caller's number is known, the server
//! asks the voice platform to place an outbound call from the configured
//! assistant. Dispatch is fire-and-forget: the webhook reply never waits
//! on it, and failures are logged and counted.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use callguard_core::CallId;
use callguard_settings::AgentSettings;
use metrics::counter;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::metrics::AGENT_DISPATCH_TOTAL;

/// Errors from an agent dispatch attempt.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Transport-level failure (connect, TLS, body decode).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// The platform answered with a non-success status.
    #[error("agent platform returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },
    /// No response within the configured timeout.
    #[error("agent dispatch timed out")]
    Timeout,
}

impl DispatchError {
    /// Short label for the `outcome` metric.
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Http(_) => "http_error",
            Self::Status { .. } => "rejected",
            Self::Timeout => "timeout",
        }
    }
}

/// Something that can start an outbound agent call.
#[async_trait]
pub trait AgentDispatch: Send + Sync {
    /// Start an agent call to `phone_number`. Returns the platform's reply.
    async fn dispatch(&self, phone_number: &str) -> Result<Value, DispatchError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateCallRequest<'a> {
    assistant_id: &'a str,
    phone_number: &'a str,
}

/// HTTP client for the voice platform's create-call endpoint.
pub struct VapiAgentClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    assistant_id: String,
}

impl std::fmt::Debug for VapiAgentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VapiAgentClient")
            .field("endpoint", &self.endpoint)
            .field("assistant_id", &self.assistant_id)
            .finish_non_exhaustive()
    }
}

impl VapiAgentClient {
    /// Build a client with explicit credentials.
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        assistant_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/call", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            assistant_id: assistant_id.into(),
        })
    }

    /// Build a client from settings. `Ok(None)` when credentials are missing.
    pub fn from_settings(settings: &AgentSettings) -> Result<Option<Self>, DispatchError> {
        match (&settings.api_key, &settings.assistant_id) {
            (Some(key), Some(assistant)) if settings.is_enabled() => Self::new(
                &settings.base_url,
                key.clone(),
                assistant.clone(),
                Duration::from_millis(settings.timeout_ms),
            )
            .map(Some),
            _ => Ok(None),
        }
    }

    /// Full URL calls are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl AgentDispatch for VapiAgentClient {
    async fn dispatch(&self, phone_number: &str) -> Result<Value, DispatchError> {
        let body = CreateCallRequest {
            assistant_id: &self.assistant_id,
            phone_number,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let text = response.text().await.map_err(map_transport)?;
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}

fn map_transport(e: reqwest::Error) -> DispatchError {
    if e.is_timeout() {
        DispatchError::Timeout
    } else {
        DispatchError::Http(e)
    }
}

/// Dispatch in the background; log and count the outcome.
pub fn spawn_dispatch(
    agent: Arc<dyn AgentDispatch>,
    call_id: CallId,
    phone_number: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match agent.dispatch(&phone_number).await {
            Ok(_) => {
                counter!(AGENT_DISPATCH_TOTAL, "outcome" => "ok").increment(1);
                info!(call_id = %call_id, "agent dispatched");
            }
            Err(e) => {
                counter!(AGENT_DISPATCH_TOTAL, "outcome" => e.outcome()).increment(1);
                warn!(call_id = %call_id, error = %e, "agent dispatch failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, timeout: Duration) -> VapiAgentClient {
        VapiAgentClient::new(&server.uri(), "sk-test", "asst_1", timeout).unwrap()
    }

    #[tokio::test]
    async fn posts_assistant_and_number_with_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/call"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_json(json!({"assistantId": "asst_1", "phoneNumber": "+15550100"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "out_1"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_secs(5));
        let reply = client.dispatch("+15550100").await.unwrap();
        assert_eq!(reply["id"], "out_1");
    }

    #[tokio::test]
    async fn non_success_status_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_secs(5));
        let err = client.dispatch("+15550100").await.unwrap_err();
        match &err {
            DispatchError::Status { status, body } => {
                assert_eq!(*status, 401);
                assert_eq!(body, "Unauthorized");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.outcome(), "rejected");
    }

    #[tokio::test]
    async fn slow_platform_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_millis(100));
        let err = client.dispatch("+15550100").await.unwrap_err();
        assert!(matches!(err, DispatchError::Timeout));
    }

    #[tokio::test]
    async fn non_json_reply_kept_as_string() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("queued"))
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_secs(5));
        assert_eq!(client.dispatch("+1").await.unwrap(), json!("queued"));
    }

    #[test]
    fn endpoint_trims_trailing_slash() {
        let client =
            VapiAgentClient::new("https://api.example.com/", "k", "a", Duration::from_secs(1))
                .unwrap();
        assert_eq!(client.endpoint(), "https://api.example.com/call");
    }

    #[test]
    fn from_settings_requires_credentials() {
        let mut settings = AgentSettings::default();
        assert!(VapiAgentClient::from_settings(&settings).unwrap().is_none());

        settings.api_key = Some("k".into());
        assert!(VapiAgentClient::from_settings(&settings).unwrap().is_none());

        settings.assistant_id = Some("a".into());
        let client = VapiAgentClient::from_settings(&settings).unwrap().unwrap();
        assert_eq!(client.endpoint(), "https://api.vapi.ai/call");
    }

    #[test]
    fn error_outcome_labels() {
        assert_eq!(DispatchError::Timeout.outcome(), "timeout");
        let status = DispatchError::Status {
            status: 500,
            body: String::new(),
        };
        assert_eq!(status.outcome(), "rejected");
        assert!(status.to_string().contains("500"));
    }
}
