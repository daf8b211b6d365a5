//! Event emitter that writes application events to the tracing log.

use toolgate_core::{AppEvent, AppEventEmitter};
use tracing::{debug, warn};

/// Logs every event; provider errors at `warn`, the rest at `debug`.
#[derive(Debug, Clone, Default)]
pub struct LogEmitter;

impl AppEventEmitter for LogEmitter {
    fn emit(&self, event: AppEvent) {
        match &event {
            AppEvent::ProviderError { error } => warn!(
                event = event.event_name(),
                server_name = %error.server_name,
                message = %error.message,
                "Tool provider error"
            ),
            AppEvent::ProviderStatusChanged {
                server_id, state, ..
            } => debug!(
                event = event.event_name(),
                server_id,
                state = %state,
                "Tool provider status changed"
            ),
            _ => debug!(event = event.event_name(), "Application event"),
        }
    }
}
