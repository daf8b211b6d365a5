//! Tool provider lifecycle management.
//!
//! The [`ProcessManager`] owns the registry view of provider configurations,
//! one connection per running provider and the in-memory status table. It is
//! the only writer of [`ProviderRuntimeStatus`].
//!
//! # State machine
//!
//! ```text
//! stopped --start ok--> connected --stop--> stopped
//! stopped --start err-> error     --start--> connected | error
//! connected --crash---> error     --stop---> stopped
//! ```
//!
//! Start and stop for the same provider are serialized through a per-id
//! lock. Every connection gets a generation number so that exit
//! notifications from a connection that was already replaced or stopped are
//! ignored.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use serde_json::Value;
use tokio::sync::{RwLock, mpsc, watch};
use toolgate_core::{
    AppEvent, AppEventEmitter, NewToolProvider, ProviderErrorInfo, ProviderPrompt,
    ProviderResource, ProviderRuntimeStatus, ProviderServiceError, ProviderState,
    ProviderStatusChange, ProviderSummary, ProviderTool, ToolCallResult, ToolCatalogEntry,
    ToolProvider, ToolProviderPatch, ToolProviderRepository,
};
use tracing::{debug, info, warn};

use crate::connection::{ConnectionFactory, ExitReason, ProviderConnection};

/// Separator between a tool name and its provider id in namespaced catalog keys.
pub const NAMESPACE_SEPARATOR: &str = "__";

/// A connection that completed its handshake.
struct LiveConnection {
    connection: Arc<dyn ProviderConnection>,
    generation: u64,
}

/// Status table plus the listeners observing it.
///
/// Kept under one lock so listeners see changes in the order they were made.
#[derive(Default)]
struct StatusBoard {
    statuses: HashMap<i64, ProviderRuntimeStatus>,
    listeners: Vec<mpsc::UnboundedSender<ProviderStatusChange>>,
}

struct ManagerState {
    repository: Arc<dyn ToolProviderRepository>,
    factory: Arc<dyn ConnectionFactory>,
    emitter: Arc<dyn AppEventEmitter>,
    configs: RwLock<HashMap<i64, ToolProvider>>,
    connections: RwLock<HashMap<i64, LiveConnection>>,
    board: Mutex<StatusBoard>,
    catalog: RwLock<BTreeMap<String, ToolCatalogEntry>>,
    locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
    generation: AtomicU64,
}

/// Supervisor for all configured tool providers.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct ProcessManager {
    state: Arc<ManagerState>,
}

impl ProcessManager {
    /// Create a manager with injected dependencies.
    pub fn new(
        repository: Arc<dyn ToolProviderRepository>,
        factory: Arc<dyn ConnectionFactory>,
        emitter: Arc<dyn AppEventEmitter>,
    ) -> Self {
        Self {
            state: Arc::new(ManagerState {
                repository,
                factory,
                emitter,
                configs: RwLock::new(HashMap::new()),
                connections: RwLock::new(HashMap::new()),
                board: Mutex::new(StatusBoard::default()),
                catalog: RwLock::new(BTreeMap::new()),
                locks: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Load every configuration and start the enabled ones.
    ///
    /// Statuses are seeded to `stopped` without emitting events. A provider
    /// that fails to start is logged and does not abort the others.
    pub async fn initialize(&self) -> Result<(), ProviderServiceError> {
        let providers = self.load_configs().await?;

        for provider in providers.iter().filter(|p| p.enabled) {
            if let Err(e) = self.start(provider.id).await {
                warn!(
                    server_id = provider.id,
                    server_name = %provider.name,
                    error = %e,
                    "Failed to start tool provider"
                );
            }
        }

        Ok(())
    }

    /// Load every configuration from the repository without starting anything.
    ///
    /// Providers seen for the first time get a `stopped` status.
    pub async fn load_configs(&self) -> Result<Vec<ToolProvider>, ProviderServiceError> {
        let providers = self.state.repository.list().await?;

        {
            let mut configs = self.state.configs.write().await;
            let mut board = self.state.board();
            for provider in &providers {
                configs.insert(provider.id, provider.clone());
                board
                    .statuses
                    .entry(provider.id)
                    .or_insert_with(ProviderRuntimeStatus::stopped);
            }
        }

        info!(count = providers.len(), "Loaded tool provider configurations");
        Ok(providers)
    }

    /// Start a provider.
    ///
    /// Succeeds without doing anything if the provider is already connected.
    pub async fn start(&self, id: i64) -> Result<(), ProviderServiceError> {
        let lock = self.state.lock_for(id);
        let _guard = lock.lock().await;
        self.start_locked(id).await
    }

    /// Stop a provider. Stopping a stopped provider is a no-op.
    ///
    /// Fails with `StopFailed` when the process never reports an exit; the
    /// connection is dropped regardless and the status becomes `error`.
    pub async fn stop(&self, id: i64) -> Result<(), ProviderServiceError> {
        let lock = self.state.lock_for(id);
        let _guard = lock.lock().await;
        self.stop_locked(id).await
    }

    /// Persist a new configuration and register it; starts it when enabled.
    ///
    /// A start failure is reflected in the provider's status, not returned.
    pub async fn add_config(
        &self,
        provider: NewToolProvider,
    ) -> Result<ToolProvider, ProviderServiceError> {
        provider
            .validate()
            .map_err(ProviderServiceError::InvalidConfig)?;

        let saved = self.state.repository.insert(provider).await?;
        self.state
            .configs
            .write()
            .await
            .insert(saved.id, saved.clone());
        self.state
            .board()
            .statuses
            .insert(saved.id, ProviderRuntimeStatus::stopped());
        self.state
            .emitter
            .emit(AppEvent::provider_added(ProviderSummary::from(&saved)));

        info!(server_id = saved.id, server_name = %saved.name, "Added tool provider");

        if saved.enabled {
            if let Err(e) = self.start(saved.id).await {
                warn!(server_id = saved.id, error = %e, "New tool provider failed to start");
            }
        }

        Ok(saved)
    }

    /// Persist a patch and reconcile the running process with it.
    ///
    /// - disabled -> enabled: start
    /// - enabled -> disabled: stop
    /// - enabled, other fields changed: restart
    pub async fn update_config(
        &self,
        id: i64,
        patch: ToolProviderPatch,
    ) -> Result<ToolProvider, ProviderServiceError> {
        let lock = self.state.lock_for(id);
        let _guard = lock.lock().await;

        let mut provider = self.get_config(id).await?;
        let was_enabled = provider.enabled;
        let changed = provider.apply(&patch);
        provider
            .validate()
            .map_err(ProviderServiceError::InvalidConfig)?;

        self.state.repository.update(&provider).await?;
        self.state
            .configs
            .write()
            .await
            .insert(id, provider.clone());

        let restart = match (was_enabled, provider.enabled) {
            (false, true) => Some(false),
            (true, true) if changed => Some(true),
            (true, false) => {
                self.stop_locked(id).await?;
                None
            }
            _ => None,
        };

        if let Some(stop_first) = restart {
            if stop_first {
                debug!(server_id = id, "Restarting tool provider after config change");
                self.stop_locked(id).await?;
            }
            if let Err(e) = self.start_locked(id).await {
                warn!(server_id = id, error = %e, "Tool provider failed to start after update");
            }
        }

        Ok(provider)
    }

    /// Stop (if running) and delete a configuration.
    pub async fn remove_config(&self, id: i64) -> Result<(), ProviderServiceError> {
        let lock = self.state.lock_for(id);
        let _guard = lock.lock().await;

        match self.stop_locked(id).await {
            Ok(()) => {}
            Err(e @ ProviderServiceError::StopFailed(_)) => {
                warn!(server_id = id, error = %e, "Removing tool provider anyway");
            }
            Err(e) => return Err(e),
        }
        self.state.repository.delete(id).await?;
        self.state.configs.write().await.remove(&id);
        self.state.board().statuses.remove(&id);
        self.state.emitter.emit(AppEvent::provider_removed(id));

        self.state
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);

        info!(server_id = id, "Removed tool provider");
        Ok(())
    }

    /// Registered configuration by id.
    pub async fn get_config(&self, id: i64) -> Result<ToolProvider, ProviderServiceError> {
        self.state
            .configs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(ProviderServiceError::ConfigNotFound(id))
    }

    /// All registered configurations, ordered by id.
    pub async fn list_configs(&self) -> Vec<ToolProvider> {
        let mut configs: Vec<_> = self.state.configs.read().await.values().cloned().collect();
        configs.sort_by_key(|p| p.id);
        configs
    }

    /// Merge the tools of every connected provider into one catalog.
    ///
    /// Names unique across providers keep their bare name. A name offered by
    /// several providers is keyed `<tool>__<provider id>` for every one of
    /// them. Providers whose listing fails are skipped with a warning.
    pub async fn get_all_tools(&self) -> BTreeMap<String, ToolCatalogEntry> {
        let live = self.live_connections().await;
        let configs = self.state.configs.read().await.clone();

        let mut listed: Vec<(i64, String, Vec<ProviderTool>)> = Vec::with_capacity(live.len());
        for (id, connection) in live {
            let name = configs.get(&id).map(|p| p.name.clone()).unwrap_or_default();
            match connection.list_tools().await {
                Ok(tools) => listed.push((id, name, tools)),
                Err(e) => warn!(server_id = id, error = %e, "Skipping provider in tool catalog"),
            }
        }

        let mut owners: HashMap<&str, BTreeSet<i64>> = HashMap::new();
        for (id, _, tools) in &listed {
            for tool in tools {
                owners.entry(tool.name.as_str()).or_default().insert(*id);
            }
        }

        let mut catalog = BTreeMap::new();
        for (id, server_name, tools) in &listed {
            for tool in tools {
                let shared = owners.get(tool.name.as_str()).map_or(0, BTreeSet::len) > 1;
                let key = if shared {
                    format!("{}{NAMESPACE_SEPARATOR}{id}", tool.name)
                } else {
                    tool.name.clone()
                };
                catalog.insert(
                    key.clone(),
                    ToolCatalogEntry {
                        name: key,
                        server_id: *id,
                        server_name: server_name.clone(),
                        tool: tool.clone(),
                    },
                );
            }
        }

        for (name, ids) in owners.iter().filter(|(_, ids)| ids.len() > 1) {
            warn!(
                tool = %name,
                providers = ?ids,
                "Tool name offered by several providers; namespacing catalog keys"
            );
        }

        *self.state.catalog.write().await = catalog.clone();
        catalog
    }

    /// Resolve a catalog key to the provider serving it.
    ///
    /// Keys from the last [`get_all_tools`](Self::get_all_tools) stay bound to
    /// their provider while it is connected, whatever happens to the others.
    /// `<tool>__<provider id>` also resolves without a catalog. Any other key
    /// rebuilds the catalog once.
    pub async fn resolve_tool(&self, name: &str) -> Option<ToolCatalogEntry> {
        let cached = self.state.catalog.read().await.get(name).cloned();
        if let Some(entry) = cached {
            if self.live_connection(entry.server_id).await.is_ok() {
                return Some(entry);
            }
        }

        if let Some(entry) = self.resolve_namespaced(name).await {
            return Some(entry);
        }

        self.get_all_tools().await.remove(name)
    }

    async fn resolve_namespaced(&self, name: &str) -> Option<ToolCatalogEntry> {
        let (tool_name, suffix) = name.rsplit_once(NAMESPACE_SEPARATOR)?;
        let id: i64 = suffix.parse().ok()?;
        let connection = self.live_connection(id).await.ok()?;

        let tools = match connection.list_tools().await {
            Ok(tools) => tools,
            Err(e) => {
                warn!(server_id = id, error = %e, "Failed to list tools while resolving");
                return None;
            }
        };
        let tool = tools.into_iter().find(|t| t.name == tool_name)?;
        let server_name = self
            .state
            .configs
            .read()
            .await
            .get(&id)
            .map(|p| p.name.clone())
            .unwrap_or_default();

        Some(ToolCatalogEntry {
            name: name.to_string(),
            server_id: id,
            server_name,
            tool,
        })
    }

    /// Tools of one connected provider.
    pub async fn get_tools_for_server(
        &self,
        id: i64,
    ) -> Result<Vec<ProviderTool>, ProviderServiceError> {
        let connection = self.live_connection(id).await?;
        connection
            .list_tools()
            .await
            .map_err(|e| ProviderServiceError::ToolListFailed(e.to_string()))
    }

    /// Resources of one connected provider; empty unless `include_resources` is set.
    pub async fn list_resources(
        &self,
        id: i64,
    ) -> Result<Vec<ProviderResource>, ProviderServiceError> {
        if !self.get_config(id).await?.include_resources {
            return Ok(Vec::new());
        }
        let connection = self.live_connection(id).await?;
        connection
            .list_resources()
            .await
            .map_err(|e| ProviderServiceError::Request(e.to_string()))
    }

    /// Prompts of one connected provider.
    pub async fn list_prompts(&self, id: i64) -> Result<Vec<ProviderPrompt>, ProviderServiceError> {
        let connection = self.live_connection(id).await?;
        connection
            .list_prompts()
            .await
            .map_err(|e| ProviderServiceError::Request(e.to_string()))
    }

    /// Invoke a tool by the provider's own name.
    pub async fn call_tool(
        &self,
        id: i64,
        tool_name: &str,
        arguments: Value,
    ) -> Result<ToolCallResult, ProviderServiceError> {
        let connection = self.live_connection(id).await?;
        debug!(server_id = id, tool = tool_name, "Calling tool");
        connection
            .call_tool(tool_name, arguments)
            .await
            .map_err(|e| ProviderServiceError::Request(e.to_string()))
    }

    /// Subscribe to status changes.
    ///
    /// Each receiver gets every change made after subscribing, in order.
    pub fn on_status_change(&self) -> mpsc::UnboundedReceiver<ProviderStatusChange> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.board().listeners.push(tx);
        rx
    }

    /// Snapshot of every registered provider's status.
    pub fn get_all_server_statuses(&self) -> HashMap<i64, ProviderRuntimeStatus> {
        self.state.board().statuses.clone()
    }

    /// Status of one provider, `None` if it is not registered.
    pub fn get_status(&self, id: i64) -> Option<ProviderRuntimeStatus> {
        self.state.board().statuses.get(&id).cloned()
    }

    /// Stop every running provider.
    pub async fn cleanup(&self) {
        let ids: Vec<i64> = self.state.connections.read().await.keys().copied().collect();
        for id in ids {
            if let Err(e) = self.stop(id).await {
                warn!(server_id = id, error = %e, "Failed to stop tool provider");
            }
        }
    }

    async fn start_locked(&self, id: i64) -> Result<(), ProviderServiceError> {
        let provider = self.get_config(id).await?;

        let stale = {
            let mut connections = self.state.connections.write().await;
            match connections.get(&id) {
                Some(live) if live.connection.is_running() => {
                    debug!(server_id = id, "Tool provider already connected");
                    return Ok(());
                }
                Some(_) => connections.remove(&id),
                None => None,
            }
        };
        if let Some(stale) = stale {
            stale.connection.stop().await;
        }

        if let Err(message) = provider.validate() {
            self.state.set_status(id, ProviderRuntimeStatus::error(message.clone(), None));
            return Err(ProviderServiceError::InvalidConfig(message));
        }

        let connection = self.state.factory.create(&provider);
        if let Err(failure) = connection.start().await {
            let message = failure.error.to_string();
            let diagnostics = Some(failure.diagnostics).filter(|d| !d.is_empty());

            warn!(
                server_id = id,
                server_name = %provider.name,
                error = %message,
                "Tool provider failed to start"
            );
            self.state.set_status(
                id,
                ProviderRuntimeStatus::error(message.clone(), diagnostics.clone()),
            );
            self.state.emitter.emit(AppEvent::provider_error(ProviderErrorInfo::process(
                Some(id),
                provider.name.clone(),
                message.clone(),
                diagnostics.clone(),
            )));
            return Err(ProviderServiceError::StartFailed {
                message,
                diagnostics,
            });
        }

        let generation = self.state.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::spawn(watch_for_exit(
            Arc::downgrade(&self.state),
            id,
            generation,
            connection.exit_signal(),
        ));
        self.state.connections.write().await.insert(
            id,
            LiveConnection {
                connection: connection.clone(),
                generation,
            },
        );
        self.state.set_status(id, ProviderRuntimeStatus::connected());

        // Probe only; a failure here never changes the status.
        match connection.list_tools().await {
            Ok(tools) => info!(
                server_id = id,
                server_name = %provider.name,
                tool_count = tools.len(),
                "Tool provider started"
            ),
            Err(e) => warn!(
                server_id = id,
                server_name = %provider.name,
                error = %e,
                "Tool provider started but listing tools failed"
            ),
        }

        Ok(())
    }

    async fn stop_locked(&self, id: i64) -> Result<(), ProviderServiceError> {
        if !self.state.configs.read().await.contains_key(&id) {
            return Err(ProviderServiceError::ConfigNotFound(id));
        }

        let live = self.state.connections.write().await.remove(&id);
        if let Some(live) = live {
            live.connection.stop().await;
            if live.connection.exit_signal().borrow().is_none() {
                let message = "process did not confirm exit after stop".to_string();
                warn!(server_id = id, "Tool provider {message}");
                self.state.set_status(
                    id,
                    ProviderRuntimeStatus::error(message.clone(), Some(live.connection.diagnostics())),
                );
                return Err(ProviderServiceError::StopFailed(message));
            }
            info!(server_id = id, "Tool provider stopped");
        }

        let already_stopped = self
            .get_status(id)
            .is_some_and(|s| s.state == ProviderState::Stopped);
        if !already_stopped {
            self.state.set_status(id, ProviderRuntimeStatus::stopped());
        }
        Ok(())
    }

    async fn live_connection(
        &self,
        id: i64,
    ) -> Result<Arc<dyn ProviderConnection>, ProviderServiceError> {
        if let Some(live) = self.state.connections.read().await.get(&id) {
            if live.connection.is_running() {
                return Ok(live.connection.clone());
            }
        }
        if self.state.configs.read().await.contains_key(&id) {
            Err(ProviderServiceError::NotRunning(id))
        } else {
            Err(ProviderServiceError::ConfigNotFound(id))
        }
    }

    /// Connected providers ordered by id.
    async fn live_connections(&self) -> Vec<(i64, Arc<dyn ProviderConnection>)> {
        let mut live: Vec<_> = self
            .state
            .connections
            .read()
            .await
            .iter()
            .filter(|(_, live)| live.connection.is_running())
            .map(|(id, live)| (*id, live.connection.clone()))
            .collect();
        live.sort_by_key(|(id, _)| *id);
        live
    }
}

impl ManagerState {
    fn board(&self) -> std::sync::MutexGuard<'_, StatusBoard> {
        self.board.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_for(&self, id: i64) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id)
            .or_default()
            .clone()
    }

    /// Record a status and notify listeners and the emitter.
    fn set_status(&self, id: i64, status: ProviderRuntimeStatus) {
        let change = ProviderStatusChange::new(id, status.clone());
        let mut board = self.board();
        board.statuses.insert(id, status);
        board.listeners.retain(|tx| tx.send(change.clone()).is_ok());
        self.emitter.emit(AppEvent::from(&change));
    }

    /// Handle a process exit reported by a connection's exit watcher.
    async fn handle_exit(&self, id: i64, generation: u64, reason: ExitReason) {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let live = {
            let mut connections = self.connections.write().await;
            match connections.get(&id) {
                Some(live) if live.generation == generation => connections.remove(&id),
                _ => None,
            }
        };
        let Some(live) = live else {
            debug!(server_id = id, generation, "Ignoring exit of a replaced connection");
            return;
        };

        let diagnostics = Some(live.connection.diagnostics()).filter(|d| !d.is_empty());
        let message = format!("Tool provider exited unexpectedly ({reason})");
        warn!(server_id = id, reason = %reason, "Tool provider crashed");

        let name = self
            .configs
            .read()
            .await
            .get(&id)
            .map(|p| p.name.clone())
            .unwrap_or_default();

        self.set_status(id, ProviderRuntimeStatus::error(message.clone(), diagnostics.clone()));
        self.emitter.emit(AppEvent::provider_error(ProviderErrorInfo::process(
            Some(id),
            name,
            message,
            diagnostics,
        )));
    }
}

async fn watch_for_exit(
    state: Weak<ManagerState>,
    id: i64,
    generation: u64,
    mut exit_rx: watch::Receiver<Option<ExitReason>>,
) {
    let reason = loop {
        if let Some(reason) = exit_rx.borrow_and_update().clone() {
            break reason;
        }
        if exit_rx.changed().await.is_err() {
            return;
        }
    };

    if let Some(state) = state.upgrade() {
        state.handle_exit(id, generation, reason).await;
    }
}
