//! Approval request lifecycle events.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AppEvent;
use crate::domain::{ApprovalDecision, ApprovalRequest, ApprovalStatus};

/// Event delivered to approval subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApprovalEvent {
    /// A new request is pending.
    Requested { request: ApprovalRequest },

    /// A request left the pending set; `request.status` is final.
    Resolved {
        request: ApprovalRequest,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl ApprovalEvent {
    pub fn resolved(mut request: ApprovalRequest, decision: &ApprovalDecision) -> Self {
        request.settle(decision);
        Self::Resolved {
            request,
            reason: decision.reason.clone(),
        }
    }

    /// ID of the request this event concerns.
    pub const fn request_id(&self) -> Uuid {
        match self {
            Self::Requested { request } => request.id,
            Self::Resolved { request, .. } => request.id,
        }
    }
}

impl From<ApprovalEvent> for AppEvent {
    fn from(event: ApprovalEvent) -> Self {
        match event {
            ApprovalEvent::Requested { request } => Self::ApprovalRequested { request },
            ApprovalEvent::Resolved { request, reason } => Self::ApprovalResolved {
                request_id: request.id,
                approved: request.status == ApprovalStatus::Approved,
                reason,
            },
        }
    }
}

impl AppEvent {
    /// Create an approval requested event.
    pub const fn approval_requested(request: ApprovalRequest) -> Self {
        Self::ApprovalRequested { request }
    }

    /// Create an approval resolved event.
    pub const fn approval_resolved(request_id: Uuid, approved: bool, reason: Option<String>) -> Self {
        Self::ApprovalResolved {
            request_id,
            approved,
            reason,
        }
    }
}
