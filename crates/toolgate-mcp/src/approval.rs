//! Human approval of tool calls.
//!
//! A tool call that no rule auto-approves is suspended on an
//! [`ApprovalCoordinator`] until a human approves or declines it, or until
//! the approval timeout elapses. Every request is resolved exactly once.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use toolgate_core::{
    APPROVAL_TIMEOUT_REASON, AppEvent, AppEventEmitter, ApprovalContext, ApprovalDecision,
    ApprovalEvent, ApprovalRequest, ControlPlaneSettings,
};
use tracing::{debug, info};
use uuid::Uuid;

/// Reason reported when the coordinator goes away before a decision.
const COORDINATOR_DROPPED_REASON: &str = "Approval coordinator shut down";

struct PendingApproval {
    request: ApprovalRequest,
    responder: oneshot::Sender<ApprovalDecision>,
    timer: JoinHandle<()>,
}

/// Pending requests plus subscribers, under one lock so that every
/// subscriber sees `Requested` before the matching `Resolved`.
#[derive(Default)]
struct Registry {
    pending: HashMap<Uuid, PendingApproval>,
    subscribers: Vec<mpsc::UnboundedSender<ApprovalEvent>>,
}

impl Registry {
    fn publish(&mut self, event: &ApprovalEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

struct Inner {
    registry: Mutex<Registry>,
    emitter: Arc<dyn AppEventEmitter>,
    timeout: Duration,
}

impl Inner {
    fn registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove a pending request and deliver its decision.
    ///
    /// Returns `false` if the request is unknown or already resolved.
    fn resolve(&self, id: Uuid, decision: ApprovalDecision, cancel_timer: bool) -> bool {
        let mut registry = self.registry();
        let Some(entry) = registry.pending.remove(&id) else {
            return false;
        };
        if cancel_timer {
            entry.timer.abort();
        }

        let tool = entry.request.context.tool_name.clone();
        let event = ApprovalEvent::resolved(entry.request, &decision);
        registry.publish(&event);
        self.emitter.emit(event.into());
        drop(registry);

        info!(
            request_id = %id,
            tool = %tool,
            approved = decision.approved,
            reason = decision.reason.as_deref().unwrap_or(""),
            "Approval request resolved"
        );

        // The waiter may have given up; the decision is still final.
        let _ = entry.responder.send(decision);
        true
    }
}

/// A submitted request whose decision can be awaited.
#[derive(Debug)]
pub struct ApprovalTicket {
    id: Uuid,
    rx: oneshot::Receiver<ApprovalDecision>,
}

impl ApprovalTicket {
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Wait for the decision.
    pub async fn wait(self) -> ApprovalDecision {
        self.rx
            .await
            .unwrap_or_else(|_| ApprovalDecision::declined(COORDINATOR_DROPPED_REASON))
    }
}

/// Registry of in-flight approval requests.
///
/// Cheap to clone; clones share the same pending set.
#[derive(Clone)]
pub struct ApprovalCoordinator {
    inner: Arc<Inner>,
}

impl ApprovalCoordinator {
    pub fn new(emitter: Arc<dyn AppEventEmitter>, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: Mutex::new(Registry::default()),
                emitter,
                timeout,
            }),
        }
    }

    pub fn from_settings(emitter: Arc<dyn AppEventEmitter>, settings: &ControlPlaneSettings) -> Self {
        Self::new(emitter, settings.approval_timeout())
    }

    /// Ask for approval and wait for the decision.
    pub async fn request_approval(&self, context: ApprovalContext) -> ApprovalDecision {
        self.submit(context).wait().await
    }

    /// Register a pending request without waiting for it.
    ///
    /// Must be called from within a Tokio runtime; the timeout timer is a
    /// spawned task.
    pub fn submit(&self, context: ApprovalContext) -> ApprovalTicket {
        let request = ApprovalRequest::pending(context);
        let id = request.id;
        let (responder, rx) = oneshot::channel();

        {
            // The timer resolves through the registry lock, so it cannot
            // observe the request before it is inserted below.
            let mut registry = self.inner.registry();

            let weak: Weak<Inner> = Arc::downgrade(&self.inner);
            let timeout = self.inner.timeout;
            let timer = tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                if let Some(inner) = weak.upgrade() {
                    debug!(request_id = %id, "Approval request timed out");
                    inner.resolve(id, ApprovalDecision::declined(APPROVAL_TIMEOUT_REASON), false);
                }
            });

            let event = ApprovalEvent::Requested {
                request: request.clone(),
            };
            registry.publish(&event);
            self.inner.emitter.emit(AppEvent::from(event));
            info!(
                request_id = %id,
                tool = %request.context.tool_name,
                session_id = %request.context.session_id,
                "Approval requested"
            );
            registry.pending.insert(
                id,
                PendingApproval {
                    request,
                    responder,
                    timer,
                },
            );
        }

        ApprovalTicket { id, rx }
    }

    /// Approve a pending request. Returns `false` if it is not pending.
    pub fn approve(&self, id: Uuid) -> bool {
        self.inner.resolve(id, ApprovalDecision::approved(), true)
    }

    /// Decline a pending request. Returns `false` if it is not pending.
    pub fn decline(&self, id: Uuid, reason: impl Into<String>) -> bool {
        self.inner
            .resolve(id, ApprovalDecision::declined(reason), true)
    }

    /// Snapshot of pending requests, oldest first, optionally for one session.
    pub fn get_pending_requests(&self, session_id: Option<&str>) -> Vec<ApprovalRequest> {
        let mut requests: Vec<ApprovalRequest> = self
            .inner
            .registry()
            .pending
            .values()
            .filter(|p| session_id.is_none_or(|s| p.request.context.session_id == s))
            .map(|p| p.request.clone())
            .collect();
        requests.sort_by_key(|r| r.created_at);
        requests
    }

    pub fn pending_count(&self) -> usize {
        self.inner.registry().pending.len()
    }

    /// Receive every approval event from now on, in order.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ApprovalEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.registry().subscribers.push(tx);
        rx
    }
}
