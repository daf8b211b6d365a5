//! Tool provider lifecycle events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AppEvent;
use crate::domain::{ProviderRuntimeStatus, ProviderState, ToolProvider};
use crate::ports::ProviderErrorInfo;

/// Lightweight provider representation for event payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSummary {
    pub id: i64,
    pub name: String,
}

impl ProviderSummary {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl From<&ToolProvider> for ProviderSummary {
    fn from(provider: &ToolProvider) -> Self {
        Self::new(provider.id, provider.name.clone())
    }
}

/// A single status transition delivered to status listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatusChange {
    pub server_id: i64,
    pub status: ProviderRuntimeStatus,
}

impl ProviderStatusChange {
    pub const fn new(server_id: i64, status: ProviderRuntimeStatus) -> Self {
        Self { server_id, status }
    }

    pub const fn state(&self) -> ProviderState {
        self.status.state
    }

    pub fn changed_at(&self) -> DateTime<Utc> {
        self.status.updated_at
    }
}

impl From<&ProviderStatusChange> for AppEvent {
    fn from(change: &ProviderStatusChange) -> Self {
        Self::ProviderStatusChanged {
            server_id: change.server_id,
            state: change.status.state,
            error: change.status.error.clone(),
        }
    }
}

impl AppEvent {
    /// Create a provider added event.
    pub const fn provider_added(provider: ProviderSummary) -> Self {
        Self::ProviderAdded { provider }
    }

    /// Create a provider removed event.
    pub const fn provider_removed(server_id: i64) -> Self {
        Self::ProviderRemoved { server_id }
    }

    /// Create a provider error event.
    pub const fn provider_error(error: ProviderErrorInfo) -> Self {
        Self::ProviderError { error }
    }
}
