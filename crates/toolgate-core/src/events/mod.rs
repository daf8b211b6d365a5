//! Canonical event union for all cross-adapter events.
//!
//! # Structure
//!
//! - `provider` - Tool provider lifecycle events
//! - `approval` - Approval request lifecycle events
//!
//! # Wire Format
//!
//! Events are serialized with a `type` tag:
//!
//! ```json
//! { "type": "provider_status_changed", "serverId": 3, "state": "connected" }
//! ```

mod approval;
mod provider;

use serde::{Deserialize, Serialize};

use crate::domain::{ApprovalRequest, ProviderState};
use crate::ports::ProviderErrorInfo;

pub use approval::ApprovalEvent;
pub use provider::{ProviderStatusChange, ProviderSummary};

/// Canonical event types for all adapters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppEvent {
    // ========== Provider Events ==========
    /// A tool provider was added to the configuration.
    ProviderAdded {
        /// Summary of the added provider.
        provider: ProviderSummary,
    },

    /// A tool provider was removed from the configuration.
    ProviderRemoved {
        #[serde(rename = "serverId")]
        server_id: i64,
    },

    /// A tool provider's runtime state changed.
    ProviderStatusChanged {
        #[serde(rename = "serverId")]
        server_id: i64,
        state: ProviderState,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// A tool provider failed to start or crashed.
    ProviderError {
        /// User-safe error information.
        error: ProviderErrorInfo,
    },

    // ========== Approval Events ==========
    /// A tool call is waiting for a human decision.
    ApprovalRequested {
        request: ApprovalRequest,
    },

    /// A pending approval was approved, declined or timed out.
    ApprovalResolved {
        #[serde(rename = "requestId")]
        request_id: uuid::Uuid,
        approved: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl AppEvent {
    /// Get the event name for wire protocols.
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::ProviderAdded { .. } => "provider:added",
            Self::ProviderRemoved { .. } => "provider:removed",
            Self::ProviderStatusChanged { .. } => "provider:status_changed",
            Self::ProviderError { .. } => "provider:error",
            Self::ApprovalRequested { .. } => "approval:requested",
            Self::ApprovalResolved { .. } => "approval:resolved",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ApprovalContext;

    #[test]
    fn test_event_serialization() {
        let event = AppEvent::from(&ProviderStatusChange::new(
            4,
            crate::domain::ProviderRuntimeStatus::error("boom", None),
        ));
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"provider_status_changed\""));
        assert!(json.contains("\"serverId\":4"));
        assert!(json.contains("\"state\":\"error\""));
        assert!(json.contains("\"error\":\"boom\""));
    }

    #[test]
    fn event_names_are_stable() {
        let request = ApprovalRequest::pending(ApprovalContext::new(
            "session",
            "stream",
            "call-1",
            "read_file",
            serde_json::json!({}),
        ));
        let id = request.id;
        let cases = vec![
            (
                AppEvent::provider_added(ProviderSummary::new(1, "fs")),
                "provider:added",
            ),
            (AppEvent::provider_removed(1), "provider:removed"),
            (
                AppEvent::provider_error(ProviderErrorInfo::process(Some(1), "fs", "boom", None)),
                "provider:error",
            ),
            (AppEvent::approval_requested(request), "approval:requested"),
            (
                AppEvent::approval_resolved(id, false, Some("nope".into())),
                "approval:resolved",
            ),
        ];

        for (event, expected_name) in cases {
            assert_eq!(event.event_name(), expected_name);
        }
    }
}
