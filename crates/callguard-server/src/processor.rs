//! Webhook processing: classify, detect, deduplicate, dispatch, reply.

use std::sync::Arc;

use callguard_core::webhook::{StatusUpdate, ToolCallRequest, TranscriptFragment};
use callguard_core::{CallDedupTracker, FraudKeywordSet, WebhookEvent, classify};
use metrics::counter;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::agent::{AgentDispatch, spawn_dispatch};
use crate::dispatcher::EventDispatcher;
use crate::metrics::WEBHOOK_EVENTS_TOTAL;

/// Acknowledgment of one tool invocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallAck {
    /// Echo of the provider's tool call id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Always `"Logged"`.
    pub result: String,
}

/// Body returned to the webhook caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum WebhookReply {
    /// `{"ignored": true}`
    Ignored {
        /// Always `true`.
        ignored: bool,
    },
    /// `{"success": true}`
    Success {
        /// Always `true`.
        success: bool,
    },
    /// `{"results": [{"toolCallId": ..., "result": "Logged"}]}`
    ToolResults {
        /// One entry per acknowledged call.
        results: Vec<ToolCallAck>,
    },
}

impl WebhookReply {
    /// Payload carried no usable type.
    pub fn ignored() -> Self {
        Self::Ignored { ignored: true }
    }

    /// Payload processed.
    pub fn success() -> Self {
        Self::Success { success: true }
    }

    /// Honeypot tool call acknowledged.
    pub fn logged(tool_call_id: Option<String>) -> Self {
        Self::ToolResults {
            results: vec![ToolCallAck {
                tool_call_id,
                result: "Logged".into(),
            }],
        }
    }
}

/// Detection and routing rules applied to each webhook.
#[derive(Clone, Debug)]
pub struct ProcessorRules {
    /// Keyword matcher.
    pub keywords: FraudKeywordSet,
    /// Function name that marks a honeypot tool call.
    pub honeypot_function: String,
    /// Statuses (lowercase) that end a call and clear its dedup entry.
    pub terminal_statuses: Vec<String>,
}

/// Turns webhook bodies into alert events.
pub struct WebhookProcessor {
    rules: ProcessorRules,
    dedup: Arc<CallDedupTracker>,
    dispatcher: EventDispatcher,
    agent: Option<Arc<dyn AgentDispatch>>,
}

impl WebhookProcessor {
    /// Create a processor.
    pub fn new(
        rules: ProcessorRules,
        dedup: Arc<CallDedupTracker>,
        dispatcher: EventDispatcher,
        agent: Option<Arc<dyn AgentDispatch>>,
    ) -> Self {
        let rules = ProcessorRules {
            terminal_statuses: rules
                .terminal_statuses
                .iter()
                .map(|s| s.trim().to_lowercase())
                .collect(),
            ..rules
        };
        Self {
            rules,
            dedup,
            dispatcher,
            agent,
        }
    }

    /// Shared dedup tracker.
    pub fn dedup(&self) -> &Arc<CallDedupTracker> {
        &self.dedup
    }

    /// Whether an agent dispatcher is configured.
    pub fn agent_enabled(&self) -> bool {
        self.agent.is_some()
    }

    /// Handle one decoded webhook body.
    #[instrument(skip_all, fields(kind))]
    pub async fn process(&self, body: &Value) -> WebhookReply {
        let event = classify(body);
        let kind = event.kind().to_owned();
        let _ = tracing::Span::current().record("kind", kind.as_str());
        counter!(WEBHOOK_EVENTS_TOTAL, "kind" => kind).increment(1);

        match event {
            WebhookEvent::Untyped => {
                debug!("webhook without type ignored");
                WebhookReply::ignored()
            }
            WebhookEvent::Transcript(fragment) => {
                self.on_transcript(fragment).await;
                WebhookReply::success()
            }
            WebhookEvent::ToolCalls(request) => self.on_tool_calls(request).await,
            WebhookEvent::StatusUpdate(update) => {
                self.on_status_update(update).await;
                WebhookReply::success()
            }
            WebhookEvent::Other(kind) => {
                debug!(kind, "unhandled webhook type");
                WebhookReply::success()
            }
        }
    }

    async fn on_transcript(&self, fragment: TranscriptFragment) {
        let matches = self.rules.keywords.find_matches(&fragment.text);
        if matches.is_empty() {
            return;
        }
        if !self.dedup.try_mark_alerted(&fragment.call_id) {
            debug!(call_id = %fragment.call_id, ?matches, "call already alerted");
            return;
        }

        let _ = self
            .dispatcher
            .fraud_alert(
                fragment.call_id.clone(),
                matches,
                &fragment.text,
                &fragment.transcript_type,
            )
            .await;

        if let (Some(agent), Some(number)) = (&self.agent, fragment.customer_number) {
            info!(call_id = %fragment.call_id, "dispatching agent to caller");
            let _ = spawn_dispatch(Arc::clone(agent), fragment.call_id, number);
        }
    }

    async fn on_tool_calls(&self, request: ToolCallRequest) -> WebhookReply {
        match request.tool_call {
            Some(call) if call.name == self.rules.honeypot_function => {
                let _ = self
                    .dispatcher
                    .scam_data_captured(request.call_id, call.arguments)
                    .await;
                WebhookReply::logged(call.id)
            }
            Some(call) => {
                debug!(function = %call.name, "tool call ignored");
                WebhookReply::success()
            }
            None => WebhookReply::success(),
        }
    }

    async fn on_status_update(&self, update: StatusUpdate) {
        let _ = self
            .dispatcher
            .call_status(update.call_id.clone(), &update.status)
            .await;
        let status = update.status.to_lowercase();
        if self.rules.terminal_statuses.contains(&status) && self.dedup.clear(&update.call_id) {
            debug!(call_id = %update.call_id, "dedup entry cleared");
        }
    }
}
