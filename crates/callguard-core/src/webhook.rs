//! Inbound provider payload normalization.
//!
//! The provider is loose about payload shape: events may arrive wrapped in a
//! `message` envelope or bare, singly or batched in an array, and sometimes
//! without a `type` at all. [`classify`] is the single place that copes with
//! that; everything downstream works on [`WebhookEvent`].

use serde_json::Value;

use crate::ids::CallId;

/// Fallback for absent `transcriptType` and `status` fields.
pub const UNKNOWN_FIELD: &str = "unknown";

/// Declared type of a transcript event.
pub const TYPE_TRANSCRIPT: &str = "transcript";
/// Declared type of a tool invocation event.
pub const TYPE_TOOL_CALLS: &str = "tool-calls";
/// Declared type of a call status event.
pub const TYPE_STATUS_UPDATE: &str = "status-update";

/// A transcript fragment of an ongoing call.
#[derive(Clone, Debug, PartialEq)]
pub struct TranscriptFragment {
    /// Owning call.
    pub call_id: CallId,
    /// Recognized text, possibly empty.
    pub text: String,
    /// Transcript tag (`partial`, `final`, or `unknown`).
    pub transcript_type: String,
    /// Counter-party phone number, when the provider includes it.
    pub customer_number: Option<String>,
}

/// One function invocation requested by the voice agent.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolCall {
    /// Provider-assigned id, echoed back in the acknowledgment.
    pub id: Option<String>,
    /// Function name.
    pub name: String,
    /// Arguments, parsed when delivered as a JSON string.
    pub arguments: Value,
}

/// A tool invocation event. Only the first listed call is considered.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolCallRequest {
    /// Owning call.
    pub call_id: CallId,
    /// First entry of the tool call list, if any.
    pub tool_call: Option<ToolCall>,
}

/// A call lifecycle status change.
#[derive(Clone, Debug, PartialEq)]
pub struct StatusUpdate {
    /// Owning call.
    pub call_id: CallId,
    /// Provider status string (`unknown` when absent).
    pub status: String,
}

/// Canonical form of every accepted inbound payload.
#[derive(Clone, Debug, PartialEq)]
pub enum WebhookEvent {
    /// No discernible `type`; acknowledged and ignored.
    Untyped,
    /// `transcript`.
    Transcript(TranscriptFragment),
    /// `tool-calls`.
    ToolCalls(ToolCallRequest),
    /// `status-update`.
    StatusUpdate(StatusUpdate),
    /// Any other declared type.
    Other(String),
}

impl WebhookEvent {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &str {
        match self {
            Self::Untyped => "untyped",
            Self::Transcript(_) => TYPE_TRANSCRIPT,
            Self::ToolCalls(_) => TYPE_TOOL_CALLS,
            Self::StatusUpdate(_) => TYPE_STATUS_UPDATE,
            Self::Other(kind) => kind,
        }
    }
}

/// Normalize an arbitrary webhook body into a [`WebhookEvent`].
pub fn classify(body: &Value) -> WebhookEvent {
    let Some(message) = envelope(body) else {
        return WebhookEvent::Untyped;
    };
    let Some(kind) = message
        .get("type")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
    else {
        return WebhookEvent::Untyped;
    };

    let call_id = CallId::or_unknown(message.pointer("/call/id").and_then(Value::as_str));

    match kind {
        TYPE_TRANSCRIPT => WebhookEvent::Transcript(TranscriptFragment {
            call_id,
            text: str_field(message, "transcript").unwrap_or_default(),
            transcript_type: str_field(message, "transcriptType")
                .unwrap_or_else(|| UNKNOWN_FIELD.to_owned()),
            customer_number: message
                .pointer("/call/customer/number")
                .and_then(Value::as_str)
                .filter(|n| !n.is_empty())
                .map(str::to_owned),
        }),
        TYPE_TOOL_CALLS => WebhookEvent::ToolCalls(ToolCallRequest {
            call_id,
            tool_call: first_tool_call(message),
        }),
        TYPE_STATUS_UPDATE => WebhookEvent::StatusUpdate(StatusUpdate {
            call_id,
            status: str_field(message, "status").unwrap_or_else(|| UNKNOWN_FIELD.to_owned()),
        }),
        other => WebhookEvent::Other(other.to_owned()),
    }
}

/// Interpret tool call arguments.
///
/// Structured values pass through. Strings are parsed as JSON; a string
/// that does not parse is kept verbatim. Missing arguments become `null`.
pub fn parse_arguments(raw: Option<&Value>) -> Value {
    match raw {
        None => Value::Null,
        Some(Value::String(s)) => {
            serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.clone()))
        }
        Some(other) => other.clone(),
    }
}

/// Locate the message object: first element of a batch, then the `message`
/// field if present, else the object itself.
fn envelope(body: &Value) -> Option<&Value> {
    let outer = first_object(body)?;
    match outer.get("message") {
        Some(inner) => first_object(inner).or(Some(outer)),
        None => Some(outer),
    }
}

fn first_object(value: &Value) -> Option<&Value> {
    let candidate = match value {
        Value::Array(items) => items.first()?,
        other => other,
    };
    candidate.is_object().then_some(candidate)
}

fn str_field(message: &Value, key: &str) -> Option<String> {
    message.get(key).and_then(Value::as_str).map(str::to_owned)
}

fn first_tool_call(message: &Value) -> Option<ToolCall> {
    let list = message
        .get("toolCallList")
        .or_else(|| message.get("toolCalls"))?;
    let entry = list.as_array()?.first()?;
    let function = entry.get("function")?;
    Some(ToolCall {
        id: entry.get("id").and_then(Value::as_str).map(str::to_owned),
        name: function
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned(),
        arguments: parse_arguments(function.get("arguments")),
    })
}
