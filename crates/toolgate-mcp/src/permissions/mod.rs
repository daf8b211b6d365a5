//! Permission rule engine.
//!
//! Decides whether a tool call may run without asking a human. Rules are
//! evaluated in priority order (highest first, ties in storage order) and
//! the first rule that applies decides. With no applicable rule the answer
//! is `false`.

mod cache;
mod pattern;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use toolgate_core::{
    ControlPlaneSettings, NewPermissionRule, PermissionRepositoryError, PermissionRule,
    PermissionRulePatch, PermissionRuleRepository,
};
use tracing::{debug, warn};

pub use cache::{CompiledRule, RuleCache};
pub use pattern::WildcardPattern;

/// Errors from rule management.
#[derive(Debug, Error)]
pub enum PermissionError {
    #[error("Invalid permission rule: {0}")]
    Validation(String),

    #[error(transparent)]
    Repository(#[from] PermissionRepositoryError),
}

/// Evaluates and manages auto-approve rules.
pub struct PermissionEngine {
    repository: Arc<dyn PermissionRuleRepository>,
    cache: RuleCache,
}

impl PermissionEngine {
    pub fn new(repository: Arc<dyn PermissionRuleRepository>, cache_ttl: Duration) -> Self {
        Self {
            repository,
            cache: RuleCache::new(cache_ttl),
        }
    }

    pub fn from_settings(
        repository: Arc<dyn PermissionRuleRepository>,
        settings: &ControlPlaneSettings,
    ) -> Self {
        Self::new(repository, settings.rule_cache_ttl())
    }

    /// Whether a call to `tool_name` on provider `server_id` runs without approval.
    ///
    /// Storage failures are logged and answered with `false`.
    pub async fn should_auto_approve(&self, server_id: i64, tool_name: &str) -> bool {
        match self.rules().await {
            Ok(rules) => evaluate(&rules, server_id, tool_name),
            Err(e) => {
                warn!(
                    server_id,
                    tool = tool_name,
                    error = %e,
                    "Failed to load permission rules; requiring approval"
                );
                false
            }
        }
    }

    /// Synchronous evaluation against the cache only.
    ///
    /// Returns `false` when the cache is empty or expired.
    pub fn should_auto_approve_cached(&self, server_id: i64, tool_name: &str) -> bool {
        self.cache
            .fresh()
            .is_some_and(|rules| evaluate(&rules, server_id, tool_name))
    }

    /// The rule that decides a call, if any.
    pub async fn matching_rule(
        &self,
        server_id: i64,
        tool_name: &str,
    ) -> Result<Option<PermissionRule>, PermissionError> {
        let rules = self.rules().await?;
        Ok(rules
            .iter()
            .find(|r| r.decide(server_id, tool_name).is_some())
            .map(|r| r.rule.clone()))
    }

    /// Load the rules into the cache, returning how many there are.
    pub async fn preload(&self) -> Result<usize, PermissionError> {
        self.cache.invalidate();
        Ok(self.rules().await?.len())
    }

    pub async fn create_rule(
        &self,
        rule: NewPermissionRule,
    ) -> Result<PermissionRule, PermissionError> {
        rule.validate().map_err(PermissionError::Validation)?;
        let created = self.repository.insert(rule).await?;
        self.cache.invalidate();
        debug!(rule_id = created.id, target = %created.target(), "Created permission rule");
        Ok(created)
    }

    pub async fn update_rule(
        &self,
        id: i64,
        patch: PermissionRulePatch,
    ) -> Result<PermissionRule, PermissionError> {
        let mut rule = self.repository.get_by_id(id).await?;
        rule.apply(&patch).map_err(PermissionError::Validation)?;
        self.repository.update(&rule).await?;
        self.cache.invalidate();
        Ok(rule)
    }

    pub async fn delete_rule(&self, id: i64) -> Result<(), PermissionError> {
        let result = self.repository.delete(id).await;
        self.cache.invalidate();
        result.map_err(Into::into)
    }

    pub async fn delete_all_rules(&self) -> Result<u64, PermissionError> {
        let result = self.repository.delete_all().await;
        self.cache.invalidate();
        Ok(result?)
    }

    /// All rules in evaluation order.
    pub async fn list_rules(&self) -> Result<Vec<PermissionRule>, PermissionError> {
        Ok(self
            .rules()
            .await?
            .iter()
            .map(|r| r.rule.clone())
            .collect())
    }

    pub async fn get_rule(&self, id: i64) -> Result<PermissionRule, PermissionError> {
        Ok(self.repository.get_by_id(id).await?)
    }

    async fn rules(&self) -> Result<Arc<Vec<CompiledRule>>, PermissionRepositoryError> {
        if let Some(rules) = self.cache.fresh() {
            return Ok(rules);
        }

        let version = self.cache.version();
        let mut rules = self.repository.list().await?;
        // Stable: equal priorities keep repository order.
        rules.sort_by_key(|r| std::cmp::Reverse(r.priority));

        let compiled: Arc<Vec<CompiledRule>> =
            Arc::new(rules.into_iter().map(CompiledRule::new).collect());
        self.cache.store(version, compiled.clone());
        Ok(compiled)
    }
}

fn evaluate(rules: &[CompiledRule], server_id: i64, tool_name: &str) -> bool {
    rules
        .iter()
        .find_map(|r| r.decide(server_id, tool_name))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockRuleRepository;
    use std::sync::atomic::Ordering;

    fn engine() -> (PermissionEngine, Arc<MockRuleRepository>) {
        let repo = Arc::new(MockRuleRepository::new());
        let engine = PermissionEngine::new(repo.clone(), Duration::from_secs(5));
        (engine, repo)
    }

    #[tokio::test]
    async fn test_empty_rule_set_fails_closed() {
        let (engine, _) = engine();
        assert!(!engine.should_auto_approve(1, "anything").await);
        assert!(!engine.should_auto_approve(2, "").await);
    }

    #[tokio::test]
    async fn test_global_allow_with_specific_deny() {
        let (engine, _) = engine();
        engine
            .create_rule(NewPermissionRule::global(true))
            .await
            .unwrap();
        engine
            .create_rule(NewPermissionRule::for_tool("delete_file", false).with_priority(10))
            .await
            .unwrap();

        assert!(!engine.should_auto_approve(1, "delete_file").await);
        assert!(engine.should_auto_approve(1, "read_file").await);
    }

    #[tokio::test]
    async fn test_priority_order_decides() {
        let (engine, _) = engine();
        engine
            .create_rule(NewPermissionRule::for_tool("t", true).with_priority(1))
            .await
            .unwrap();
        engine
            .create_rule(NewPermissionRule::for_tool("t", false).with_priority(5))
            .await
            .unwrap();
        assert!(!engine.should_auto_approve(3, "t").await);
    }

    #[tokio::test]
    async fn test_equal_priority_keeps_storage_order() {
        let (engine, _) = engine();
        engine
            .create_rule(NewPermissionRule::for_pattern("*", false))
            .await
            .unwrap();
        engine
            .create_rule(NewPermissionRule::global(true))
            .await
            .unwrap();
        assert!(!engine.should_auto_approve(1, "x").await);
    }

    #[tokio::test]
    async fn test_wildcard_rule() {
        let (engine, _) = engine();
        engine
            .create_rule(NewPermissionRule::for_pattern("delete_*", true))
            .await
            .unwrap();
        assert!(engine.should_auto_approve(1, "delete_file").await);
        assert!(engine.should_auto_approve(1, "Delete_Branch").await);
        assert!(!engine.should_auto_approve(1, "read_file").await);
    }

    #[tokio::test]
    async fn test_exact_name_rule_skips_other_tools() {
        let (engine, _) = engine();
        engine
            .create_rule(NewPermissionRule::for_tool("read_file", true).with_priority(10))
            .await
            .unwrap();
        engine
            .create_rule(NewPermissionRule::global(false))
            .await
            .unwrap();
        engine
            .create_rule(NewPermissionRule::for_tool("write_file", true).with_priority(-1))
            .await
            .unwrap();

        assert!(engine.should_auto_approve(1, "read_file").await);
        // The catch-all decides before the lower-priority exact rule.
        assert!(!engine.should_auto_approve(1, "write_file").await);
    }

    #[tokio::test]
    async fn test_server_scoped_rule() {
        let (engine, _) = engine();
        engine
            .create_rule(NewPermissionRule::global(true).on_server(2))
            .await
            .unwrap();
        assert!(engine.should_auto_approve(2, "anything").await);
        assert!(!engine.should_auto_approve(1, "anything").await);
    }

    #[tokio::test]
    async fn test_evaluation_is_deterministic() {
        let (engine, _) = engine();
        engine
            .create_rule(NewPermissionRule::for_pattern("git_*", true).with_priority(2))
            .await
            .unwrap();
        engine
            .create_rule(NewPermissionRule::for_tool("git_push", false).with_priority(2))
            .await
            .unwrap();

        let first = engine.should_auto_approve(1, "git_push").await;
        for _ in 0..10 {
            assert_eq!(engine.should_auto_approve(1, "git_push").await, first);
        }
        assert!(first);
    }

    #[tokio::test]
    async fn test_rejects_name_and_pattern_together() {
        let (engine, repo) = engine();
        let rule = NewPermissionRule {
            tool_name: Some("a".to_string()),
            tool_pattern: Some("a*".to_string()),
            auto_approve: true,
            ..Default::default()
        };
        assert!(matches!(
            engine.create_rule(rule).await,
            Err(PermissionError::Validation(_))
        ));
        assert!(repo.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cache_is_used_and_invalidated() {
        let (engine, repo) = engine();
        engine
            .create_rule(NewPermissionRule::global(false))
            .await
            .unwrap();

        assert!(!engine.should_auto_approve(1, "x").await);
        assert!(!engine.should_auto_approve(1, "y").await);
        assert_eq!(repo.list_calls.load(Ordering::SeqCst), 1);

        let rule = engine.list_rules().await.unwrap().remove(0);
        engine
            .update_rule(
                rule.id,
                PermissionRulePatch {
                    auto_approve: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(engine.should_auto_approve(1, "x").await);
        assert_eq!(repo.list_calls.load(Ordering::SeqCst), 2);

        engine.delete_rule(rule.id).await.unwrap();
        assert!(!engine.should_auto_approve(1, "x").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_path_requires_fresh_cache() {
        let (engine, _) = engine();
        engine
            .create_rule(NewPermissionRule::global(true))
            .await
            .unwrap();
        assert!(!engine.should_auto_approve_cached(1, "x"));

        assert_eq!(engine.preload().await.unwrap(), 1);
        assert!(engine.should_auto_approve_cached(1, "x"));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(!engine.should_auto_approve_cached(1, "x"));
    }

    #[tokio::test]
    async fn test_storage_failure_fails_closed() {
        let (engine, repo) = engine();
        engine
            .create_rule(NewPermissionRule::global(true))
            .await
            .unwrap();
        repo.fail_list.store(true, Ordering::SeqCst);
        assert!(!engine.should_auto_approve(1, "x").await);
    }

    #[tokio::test]
    async fn test_delete_all_and_matching_rule() {
        let (engine, _) = engine();
        let created = engine
            .create_rule(NewPermissionRule::for_pattern("read_*", true))
            .await
            .unwrap();
        engine
            .create_rule(NewPermissionRule::global(false).with_priority(-5))
            .await
            .unwrap();

        let decider = engine.matching_rule(1, "read_file").await.unwrap().unwrap();
        assert_eq!(decider.id, created.id);

        assert_eq!(engine.delete_all_rules().await.unwrap(), 2);
        assert!(engine.matching_rule(1, "read_file").await.unwrap().is_none());
        assert!(!engine.should_auto_approve(1, "read_file").await);
    }

    #[tokio::test]
    async fn test_update_rule_validation() {
        let (engine, _) = engine();
        let rule = engine
            .create_rule(NewPermissionRule::for_tool("a", true))
            .await
            .unwrap();
        let patch = PermissionRulePatch {
            tool_pattern: Some(Some("a*".to_string())),
            ..Default::default()
        };
        assert!(matches!(
            engine.update_rule(rule.id, patch).await,
            Err(PermissionError::Validation(_))
        ));
        assert_eq!(engine.get_rule(rule.id).await.unwrap().tool_pattern, None);
    }
}
