//! Alert events pushed to connected listeners.
//!
//! Wire shape is a flat JSON object discriminated by `type`:
//!
//! ```json
//! {"type":"FRAUD_ALERT","severity":"HIGH","keywords":["otp","kyc"],
//!  "transcript":"...","transcriptType":"final","callId":"c1",
//!  "confidence":60,"timestamp":1760000000000}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::CallId;

/// Upper bound for [`AlertEvent::FraudAlert`] confidence.
pub const MAX_CONFIDENCE: u8 = 95;

/// Confidence points contributed by each matched keyword.
pub const CONFIDENCE_PER_KEYWORD: u8 = 30;

/// Fraud alert severity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Two or more distinct indicators matched.
    High,
    /// A single indicator matched.
    Medium,
}

impl Severity {
    /// Severity for a number of distinct matched keywords.
    pub fn from_match_count(count: usize) -> Self {
        if count >= 2 { Self::High } else { Self::Medium }
    }
}

/// Confidence score for a number of distinct matched keywords: `min(95, n * 30)`.
pub fn confidence_for(count: usize) -> u8 {
    let raw = count.saturating_mul(usize::from(CONFIDENCE_PER_KEYWORD));
    raw.min(usize::from(MAX_CONFIDENCE)) as u8
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// An event broadcast to every live listener.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AlertEvent {
    /// Fraud indicators were found in a transcript fragment.
    #[serde(rename = "FRAUD_ALERT", rename_all = "camelCase")]
    FraudAlert {
        /// Derived from the number of matched keywords.
        severity: Severity,
        /// Distinct matched keywords, in configured order.
        keywords: Vec<String>,
        /// The fragment text as received.
        transcript: String,
        /// Provider transcript tag, e.g. `partial` / `final`.
        transcript_type: String,
        /// Owning call.
        call_id: CallId,
        /// `0..=95`.
        confidence: u8,
        /// Epoch milliseconds.
        timestamp: i64,
    },

    /// The honeypot tool captured data from the caller.
    #[serde(rename = "SCAM_DATA_CAPTURED", rename_all = "camelCase")]
    ScamDataCaptured {
        /// Tool arguments: parsed JSON, or the raw string when unparseable.
        data: Value,
        /// Owning call.
        call_id: CallId,
        /// Epoch milliseconds.
        timestamp: i64,
    },

    /// The provider reported a call status change.
    #[serde(rename = "CALL_STATUS", rename_all = "camelCase")]
    CallStatus {
        /// Provider status string, e.g. `ringing`, `in-progress`, `ended`.
        status: String,
        /// Owning call.
        call_id: CallId,
        /// Epoch milliseconds.
        timestamp: i64,
    },
}

impl AlertEvent {
    /// Build a fraud alert from matched keywords, deriving severity and confidence.
    pub fn fraud_alert(
        call_id: CallId,
        keywords: Vec<String>,
        transcript: impl Into<String>,
        transcript_type: impl Into<String>,
    ) -> Self {
        let count = keywords.len();
        Self::FraudAlert {
            severity: Severity::from_match_count(count),
            keywords,
            transcript: transcript.into(),
            transcript_type: transcript_type.into(),
            call_id,
            confidence: confidence_for(count),
            timestamp: now_millis(),
        }
    }

    /// Build a scam-data-captured event.
    pub fn scam_data_captured(call_id: CallId, data: Value) -> Self {
        Self::ScamDataCaptured {
            data,
            call_id,
            timestamp: now_millis(),
        }
    }

    /// Build a call-status event.
    pub fn call_status(call_id: CallId, status: impl Into<String>) -> Self {
        Self::CallStatus {
            status: status.into(),
            call_id,
            timestamp: now_millis(),
        }
    }

    /// Wire discriminant.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::FraudAlert { .. } => "FRAUD_ALERT",
            Self::ScamDataCaptured { .. } => "SCAM_DATA_CAPTURED",
            Self::CallStatus { .. } => "CALL_STATUS",
        }
    }

    /// Call the event refers to.
    pub fn call_id(&self) -> &CallId {
        match self {
            Self::FraudAlert { call_id, .. }
            | Self::ScamDataCaptured { call_id, .. }
            | Self::CallStatus { call_id, .. } => call_id,
        }
    }
}
