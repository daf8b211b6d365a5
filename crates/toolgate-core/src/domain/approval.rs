//! Approval request domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reason attached to a decline caused by the approval timer.
pub const APPROVAL_TIMEOUT_REASON: &str = "Approval timed out";

/// Lifecycle of an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Declined,
}

/// Everything needed to ask a human about one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalContext {
    pub session_id: String,
    pub stream_id: String,
    /// Identifier of the tool call; may be empty when the caller has none.
    pub tool_call_id: String,
    pub tool_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_id: Option<i64>,
    pub input: serde_json::Value,
}

impl ApprovalContext {
    pub fn new(
        session_id: impl Into<String>,
        stream_id: impl Into<String>,
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        input: serde_json::Value,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            stream_id: stream_id.into(),
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            server_id: None,
            input,
        }
    }

    #[must_use]
    pub const fn with_server(mut self, server_id: i64) -> Self {
        self.server_id = Some(server_id);
        self
    }
}

/// An in-flight approval request.
///
/// `id` is generated per request and is never the tool call's own id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub id: Uuid,
    #[serde(flatten)]
    pub context: ApprovalContext,
    pub status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
}

impl ApprovalRequest {
    /// Create a pending request with a fresh identity.
    pub fn pending(context: ApprovalContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            context,
            status: ApprovalStatus::Pending,
            created_at: Utc::now(),
        }
    }

    /// Record the final decision on this request.
    pub fn settle(&mut self, decision: &ApprovalDecision) {
        self.status = decision.status();
    }
}

/// Outcome delivered to the suspended caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub approved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ApprovalDecision {
    pub const fn approved() -> Self {
        Self {
            approved: true,
            reason: None,
        }
    }

    pub fn declined(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            reason: Some(reason.into()),
        }
    }

    pub const fn status(&self) -> ApprovalStatus {
        if self.approved {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Declined
        }
    }

    pub fn is_timeout(&self) -> bool {
        !self.approved && self.reason.as_deref() == Some(APPROVAL_TIMEOUT_REASON)
    }
}
