//! 规则存储：不可变快照 + 原子替换
use std::sync::{Arc, PoisonError, RwLock};

use crate::detectors::{Rule, RuleSet};
use crate::error::DetectError;

/// 持有当前生效规则集快照的存储（线程安全，可跨线程共享）
///
/// 读取方只在克隆 `Arc` 的瞬间持有读锁；已开始的扫描继续使用自己取得的快照，
/// 热更新永远发布一个新快照而不是原地修改。
#[derive(Debug)]
pub struct RuleStore {
    active: RwLock<Arc<RuleSet>>,
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new(RuleSet::default())
    }
}

impl RuleStore {
    pub fn new(rules: RuleSet) -> Self {
        Self { active: RwLock::new(Arc::new(rules)) }
    }

    /// 当前快照（一致、不可变）
    pub fn current(&self) -> Arc<RuleSet> {
        let guard = self.active.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*guard)
    }

    /// 原子替换当前快照
    pub fn publish(&self, rules: RuleSet) {
        let next = Arc::new(rules);
        tracing::info!(rules = next.len(), max_match_span = next.max_match_span(), "rule set published");
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = next;
    }

    /// 加入一条规则（同 id 则替换）并发布新快照
    pub fn insert(&self, rule: Rule) {
        let mut guard = self.active.write().unwrap_or_else(PoisonError::into_inner);
        let id = rule.id().to_string();
        let next = Arc::new(guard.with_rule(rule));
        tracing::info!(rule = %id, rules = next.len(), "rule inserted");
        *guard = next;
    }

    /// 移除指定 id 的规则并发布新快照
    pub fn remove(&self, id: &str) -> Result<(), DetectError> {
        let mut guard = self.active.write().unwrap_or_else(PoisonError::into_inner);
        let next = guard.without_rule(id).ok_or_else(|| DetectError::RuleNotFound(id.to_string()))?;
        tracing::info!(rule = %id, rules = next.len(), "rule removed");
        *guard = Arc::new(next);
        Ok(())
    }
}
