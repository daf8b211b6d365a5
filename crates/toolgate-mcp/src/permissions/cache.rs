//! Time-bounded cache of the ordered rule list.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::time::Instant;
use toolgate_core::PermissionRule;

use super::pattern::WildcardPattern;

/// A rule with its pattern compiled once.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: PermissionRule,
    pattern: Option<WildcardPattern>,
}

impl CompiledRule {
    pub fn new(rule: PermissionRule) -> Self {
        let pattern = rule.tool_pattern.as_deref().map(WildcardPattern::new);
        Self { rule, pattern }
    }

    /// The decision this rule makes for a call, or `None` if it does not apply.
    ///
    /// An exact `tool_name` decides only on equality and never falls
    /// through to a pattern; a rule with neither is a catch-all.
    pub fn decide(&self, server_id: i64, tool_name: &str) -> Option<bool> {
        if self.rule.server_id.is_some_and(|id| id != server_id) {
            return None;
        }

        let applies = match (&self.rule.tool_name, &self.pattern) {
            (Some(name), _) => name == tool_name,
            (None, Some(pattern)) => pattern.matches(tool_name),
            (None, None) => true,
        };
        applies.then_some(self.rule.auto_approve)
    }
}

struct Snapshot {
    rules: Arc<Vec<CompiledRule>>,
    loaded_at: Instant,
}

struct CacheState {
    snapshot: Option<Snapshot>,
    /// Bumped on every invalidation so that a load racing a mutation is discarded.
    version: u64,
}

/// Rule list cache with a fixed time-to-live.
pub struct RuleCache {
    ttl: Duration,
    state: RwLock<CacheState>,
}

impl RuleCache {
    pub const fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: RwLock::new(CacheState {
                snapshot: None,
                version: 0,
            }),
        }
    }

    /// Cached rules if they are younger than the TTL.
    pub fn fresh(&self) -> Option<Arc<Vec<CompiledRule>>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state
            .snapshot
            .as_ref()
            .filter(|s| s.loaded_at.elapsed() < self.ttl)
            .map(|s| s.rules.clone())
    }

    /// Version to hand back to [`RuleCache::store`] after loading.
    pub fn version(&self) -> u64 {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .version
    }

    /// Store freshly loaded rules unless the cache was invalidated meanwhile.
    pub fn store(&self, version: u64, rules: Arc<Vec<CompiledRule>>) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.version == version {
            state.snapshot = Some(Snapshot {
                rules,
                loaded_at: Instant::now(),
            });
        }
    }

    pub fn invalidate(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.snapshot = None;
        state.version += 1;
    }
}
