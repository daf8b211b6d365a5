//! Hand-written doubles shared by the unit tests of this crate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use tokio::sync::watch;
use toolgate_core::{
    AppEvent, AppEventEmitter, NewPermissionRule, NewToolProvider, PermissionRepositoryError,
    PermissionRule, PermissionRuleRepository, ProviderPrompt, ProviderRepositoryError,
    ProviderResource, ProviderTool, RecorderError, ToolCallResult, ToolInvocationRecord,
    ToolInvocationRecorder, ToolProvider, ToolProviderRepository,
};

use crate::connection::{
    ConnectionError, ConnectionFactory, ExitReason, ProviderConnection, StartFailure,
};

// ---------------------------------------------------------------------------
// Repositories
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockProviderRepository {
    providers: Mutex<Vec<ToolProvider>>,
    next_id: Mutex<i64>,
}

impl MockProviderRepository {
    pub fn new() -> Self {
        Self {
            providers: Mutex::new(Vec::new()),
            next_id: Mutex::new(1),
        }
    }
}

#[async_trait]
impl ToolProviderRepository for MockProviderRepository {
    async fn insert(&self, new: NewToolProvider) -> Result<ToolProvider, ProviderRepositoryError> {
        let mut providers = self.providers.lock().unwrap();
        if providers.iter().any(|p| p.name == new.name) {
            return Err(ProviderRepositoryError::Conflict(new.name));
        }
        let id = {
            let mut next_id = self.next_id.lock().unwrap();
            let id = *next_id;
            *next_id += 1;
            id
        };
        let now = Utc::now();
        let provider = ToolProvider {
            id,
            name: new.name,
            command: new.command,
            args: new.args,
            env: new.env,
            working_dir: new.working_dir,
            enabled: new.enabled,
            include_resources: new.include_resources,
            created_at: now,
            updated_at: now,
        };
        providers.push(provider.clone());
        Ok(provider)
    }

    async fn get_by_id(&self, id: i64) -> Result<ToolProvider, ProviderRepositoryError> {
        self.providers
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| ProviderRepositoryError::NotFound(id.to_string()))
    }

    async fn get_by_name(&self, name: &str) -> Result<ToolProvider, ProviderRepositoryError> {
        self.providers
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.name == name)
            .cloned()
            .ok_or_else(|| ProviderRepositoryError::NotFound(name.to_string()))
    }

    async fn list(&self) -> Result<Vec<ToolProvider>, ProviderRepositoryError> {
        Ok(self.providers.lock().unwrap().clone())
    }

    async fn update(&self, provider: &ToolProvider) -> Result<(), ProviderRepositoryError> {
        let mut providers = self.providers.lock().unwrap();
        let slot = providers
            .iter_mut()
            .find(|p| p.id == provider.id)
            .ok_or_else(|| ProviderRepositoryError::NotFound(provider.id.to_string()))?;
        *slot = provider.clone();
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), ProviderRepositoryError> {
        let mut providers = self.providers.lock().unwrap();
        let before = providers.len();
        providers.retain(|p| p.id != id);
        if providers.len() == before {
            return Err(ProviderRepositoryError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MockRuleRepository {
    rules: Mutex<Vec<PermissionRule>>,
    next_id: Mutex<i64>,
    pub list_calls: AtomicUsize,
    pub fail_list: AtomicBool,
}

impl MockRuleRepository {
    pub fn new() -> Self {
        Self {
            next_id: Mutex::new(1),
            ..Default::default()
        }
    }
}

#[async_trait]
impl PermissionRuleRepository for MockRuleRepository {
    async fn list(&self) -> Result<Vec<PermissionRule>, PermissionRepositoryError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(PermissionRepositoryError::Internal("database is locked".into()));
        }
        let mut rules = self.rules.lock().unwrap().clone();
        rules.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
        Ok(rules)
    }

    async fn get_by_id(&self, id: i64) -> Result<PermissionRule, PermissionRepositoryError> {
        self.rules
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(PermissionRepositoryError::NotFound(id))
    }

    async fn insert(&self, rule: NewPermissionRule) -> Result<PermissionRule, PermissionRepositoryError> {
        let id = {
            let mut next_id = self.next_id.lock().unwrap();
            let id = *next_id;
            *next_id += 1;
            id
        };
        let now = Utc::now();
        let rule = PermissionRule {
            id,
            server_id: rule.server_id,
            tool_name: rule.tool_name,
            tool_pattern: rule.tool_pattern,
            auto_approve: rule.auto_approve,
            priority: rule.priority,
            created_at: now,
            updated_at: now,
        };
        self.rules.lock().unwrap().push(rule.clone());
        Ok(rule)
    }

    async fn update(&self, rule: &PermissionRule) -> Result<(), PermissionRepositoryError> {
        let mut rules = self.rules.lock().unwrap();
        let slot = rules
            .iter_mut()
            .find(|r| r.id == rule.id)
            .ok_or(PermissionRepositoryError::NotFound(rule.id))?;
        *slot = rule.clone();
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), PermissionRepositoryError> {
        let mut rules = self.rules.lock().unwrap();
        let before = rules.len();
        rules.retain(|r| r.id != id);
        if rules.len() == before {
            return Err(PermissionRepositoryError::NotFound(id));
        }
        Ok(())
    }

    async fn delete_all(&self) -> Result<u64, PermissionRepositoryError> {
        let mut rules = self.rules.lock().unwrap();
        let count = rules.len() as u64;
        rules.clear();
        Ok(count)
    }
}

#[derive(Default)]
pub struct RecordingRecorder {
    pub records: Mutex<Vec<ToolInvocationRecord>>,
}

#[async_trait]
impl ToolInvocationRecorder for RecordingRecorder {
    async fn record(&self, record: ToolInvocationRecord) -> Result<(), RecorderError> {
        self.records.lock().unwrap().push(record);
        Ok(())
    }
}

/// Emitter collecting every event for assertions.
#[derive(Clone, Default)]
pub struct CollectingEmitter {
    pub events: Arc<Mutex<Vec<AppEvent>>>,
}

impl CollectingEmitter {
    pub fn names(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(AppEvent::event_name)
            .collect()
    }
}

impl AppEventEmitter for CollectingEmitter {
    fn emit(&self, event: AppEvent) {
        self.events.lock().unwrap().push(event);
    }
}

// ---------------------------------------------------------------------------
// Connections
// ---------------------------------------------------------------------------

/// Scripted behavior for one provider command.
#[derive(Clone, Default)]
pub struct Script {
    pub fail_start: Option<(String, String)>,
    pub tools: Vec<&'static str>,
    pub fail_list: bool,
    /// `stop` returns without the process ever reporting an exit.
    pub hang_on_stop: bool,
}

impl Script {
    pub fn tools(tools: &[&'static str]) -> Self {
        Self {
            tools: tools.to_vec(),
            ..Default::default()
        }
    }

    pub fn failing(message: &str, diagnostics: &str) -> Self {
        Self {
            fail_start: Some((message.to_string(), diagnostics.to_string())),
            ..Default::default()
        }
    }
}

pub struct MockConnection {
    script: Script,
    running: AtomicBool,
    exit_tx: watch::Sender<Option<ExitReason>>,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub calls: Mutex<Vec<(String, Value)>>,
}

impl MockConnection {
    fn new(script: Script) -> Self {
        let (exit_tx, _) = watch::channel(None);
        Self {
            script,
            running: AtomicBool::new(false),
            exit_tx,
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Simulate the process dying on its own.
    pub fn crash(&self, code: i32) {
        self.running.store(false, Ordering::SeqCst);
        self.exit_tx.send_replace(Some(ExitReason::Exited { code }));
    }
}

#[async_trait]
impl ProviderConnection for MockConnection {
    async fn start(&self) -> Result<(), StartFailure> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if let Some((message, diagnostics)) = &self.script.fail_start {
            self.exit_tx.send_replace(Some(ExitReason::Exited { code: 1 }));
            return Err(StartFailure {
                error: ConnectionError::Protocol(message.clone()),
                diagnostics: diagnostics.clone(),
            });
        }
        self.exit_tx.send_replace(None);
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if self.running.swap(false, Ordering::SeqCst) && !self.script.hang_on_stop {
            self.exit_tx.send_replace(Some(ExitReason::Signaled { signal: 9 }));
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn list_tools(&self) -> Result<Vec<ProviderTool>, ConnectionError> {
        if !self.is_running() {
            return Err(ConnectionError::NotRunning);
        }
        if self.script.fail_list {
            return Err(ConnectionError::Timeout {
                method: "tools/list".to_string(),
            });
        }
        Ok(self
            .script
            .tools
            .iter()
            .map(|name| ProviderTool::new(*name).with_description(format!("{name} tool")))
            .collect())
    }

    async fn list_resources(&self) -> Result<Vec<ProviderResource>, ConnectionError> {
        Ok(vec![ProviderResource {
            uri: "file:///notes.txt".to_string(),
            name: "notes".to_string(),
            description: None,
            mime_type: Some("text/plain".to_string()),
        }])
    }

    async fn list_prompts(&self) -> Result<Vec<ProviderPrompt>, ConnectionError> {
        Ok(vec![ProviderPrompt {
            name: "summarize".to_string(),
            description: None,
            arguments: None,
        }])
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolCallResult, ConnectionError> {
        if !self.is_running() {
            return Err(ConnectionError::NotRunning);
        }
        self.calls.lock().unwrap().push((name.to_string(), arguments.clone()));
        match name {
            "boom" => Ok(ToolCallResult::error("tool exploded")),
            "slow" => {
                tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                Ok(ToolCallResult::success(json!([])))
            }
            _ => Ok(ToolCallResult::success(json!([{ "type": "text", "text": name }]))),
        }
    }

    fn diagnostics(&self) -> String {
        self.exit_tx
            .borrow()
            .as_ref()
            .map(|r| format!("process {r}"))
            .unwrap_or_default()
    }

    fn exit_signal(&self) -> watch::Receiver<Option<ExitReason>> {
        self.exit_tx.subscribe()
    }
}

/// Factory handing out scripted connections keyed by provider command.
#[derive(Default)]
pub struct MockFactory {
    scripts: Mutex<HashMap<String, Script>>,
    pub created: Mutex<Vec<(i64, Arc<MockConnection>)>>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, command: &str, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .insert(command.to_string(), script);
    }

    pub fn created_count(&self, id: i64) -> usize {
        self.created
            .lock()
            .unwrap()
            .iter()
            .filter(|(pid, _)| *pid == id)
            .count()
    }

    /// Most recent connection built for a provider.
    pub fn latest(&self, id: i64) -> Option<Arc<MockConnection>> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(pid, _)| *pid == id)
            .map(|(_, c)| c.clone())
    }
}

impl ConnectionFactory for MockFactory {
    fn create(&self, provider: &ToolProvider) -> Arc<dyn ProviderConnection> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&provider.command)
            .cloned()
            .unwrap_or_default();
        let connection = Arc::new(MockConnection::new(script));
        self.created
            .lock()
            .unwrap()
            .push((provider.id, connection.clone()));
        connection
    }
}
