//! 规则缓存
//!
//! 使用 DashMap 提供线程安全的编译规则缓存，供批量评估的并发工作单元共享。
//! 条目一经写入不再变更；同一规则 ID 重复编译按最后写入者胜出幂等覆盖。

use crate::compiler::{CompiledRule, RuleCompiler};
use crate::error::{Result, RuleError};
use crate::models::Rule;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// 规则缓存
#[derive(Debug, Clone, Default)]
pub struct RuleStore {
    /// 编译后的规则，按规则 ID 索引
    rules: Arc<DashMap<String, CompiledRule>>,
}

impl RuleStore {
    /// 创建空缓存
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前缓存的规则数量
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// 缓存是否为空
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 编译并缓存规则（覆盖同 ID 的旧条目）
    #[instrument(skip(self, rule), fields(rule_id = %rule.id, rule_name = %rule.name))]
    pub fn load(&self, rule: &Rule) -> Result<()> {
        let compiled = RuleCompiler::compile(rule)?;
        self.rules.insert(compiled.id().to_string(), compiled);

        info!("规则已加载: {}", rule.id);
        Ok(())
    }

    /// 从 JSON 文档解析、编译并缓存规则
    #[instrument(skip(self, json))]
    pub fn load_from_json(&self, json: &str) -> Result<String> {
        let compiled = RuleCompiler::compile_from_json(json)?;
        let rule_id = compiled.id().to_string();
        self.rules.insert(rule_id.clone(), compiled);

        info!("规则已加载: {}", rule_id);
        Ok(rule_id)
    }

    /// 缓存查找
    pub fn get(&self, rule_id: &str) -> Option<CompiledRule> {
        self.rules.get(rule_id).map(|r| r.clone())
    }

    /// 查找，未命中则按需编译并写入
    ///
    /// 并发未命中时同一规则可能被编译两次：编译是纯函数，
    /// 重复写入幂等，不构成一致性问题。
    pub fn get_or_compile(&self, rule: &Rule) -> Result<CompiledRule> {
        if let Some(compiled) = self.get(&rule.id) {
            return Ok(compiled);
        }

        let compiled = RuleCompiler::compile(rule)?;
        self.rules.insert(compiled.id().to_string(), compiled.clone());
        Ok(compiled)
    }

    /// 更新已存在的规则
    #[instrument(skip(self, rule), fields(rule_id = %rule.id))]
    pub fn update(&self, rule: &Rule) -> Result<()> {
        if !self.rules.contains_key(&rule.id) {
            warn!("更新不存在的规则: {}", rule.id);
            return Err(RuleError::RuleNotFound(rule.id.clone()));
        }

        self.load(rule)
    }

    /// 删除规则
    #[instrument(skip(self))]
    pub fn delete(&self, rule_id: &str) -> Result<()> {
        if self.rules.remove(rule_id).is_some() {
            info!("规则已删除: {}", rule_id);
            Ok(())
        } else {
            warn!("删除不存在的规则: {}", rule_id);
            Err(RuleError::RuleNotFound(rule_id.to_string()))
        }
    }

    /// 检查规则是否存在
    pub fn contains(&self, rule_id: &str) -> bool {
        self.rules.contains_key(rule_id)
    }

    /// 所有规则 ID
    pub fn list_ids(&self) -> Vec<String> {
        self.rules.iter().map(|r| r.key().clone()).collect()
    }

    /// 所有编译后的规则
    pub fn list_all(&self) -> Vec<CompiledRule> {
        self.rules.iter().map(|r| r.value().clone()).collect()
    }

    /// 批量加载规则
    ///
    /// 单条规则的编译失败不影响其余规则，返回成功加载的 ID 列表。
    #[instrument(skip(self, rules))]
    pub fn load_batch(&self, rules: &[Rule]) -> Vec<String> {
        let mut loaded_ids = Vec::with_capacity(rules.len());
        let mut errors = Vec::new();

        for rule in rules {
            match self.load(rule) {
                Ok(()) => loaded_ids.push(rule.id.clone()),
                Err(e) => errors.push((rule.id.clone(), e)),
            }
        }

        if !errors.is_empty() {
            warn!("批量加载部分失败: {:?}", errors);
        }

        info!(
            "批量加载完成: {} 成功, {} 失败",
            loaded_ids.len(),
            errors.len()
        );
        loaded_ids
    }

    /// 清空所有规则
    #[instrument(skip(self))]
    pub fn clear(&self) {
        let count = self.rules.len();
        self.rules.clear();
        info!("已清空 {} 条规则", count);
    }

    /// 缓存统计信息
    pub fn stats(&self) -> RuleStoreStats {
        let rules_count = self.rules.len();
        let total_fields: usize = self.rules.iter().map(|r| r.required_fields.len()).sum();

        RuleStoreStats {
            rules_count,
            total_fields,
            avg_fields_per_rule: if rules_count > 0 {
                total_fields as f64 / rules_count as f64
            } else {
                0.0
            },
        }
    }
}

/// 规则缓存统计信息
#[derive(Debug, Clone)]
pub struct RuleStoreStats {
    /// 规则总数
    pub rules_count: usize,
    /// 所有规则引用的字段总数
    pub total_fields: usize,
    /// 平均每条规则引用的字段数
    pub avg_fields_per_rule: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Condition;
    use crate::operators::Operator;

    fn sample_rule(id: &str, name: &str) -> Rule {
        let mut rule = Rule::new(
            name,
            Condition::and(vec![
                Condition::simple_at("control", "status", Operator::Equals, "active"),
                Condition::simple("hasRequiredEvidence", Operator::Equals, true),
            ]),
        );
        rule.id = id.to_string();
        rule
    }

    #[test]
    fn test_load_and_get() {
        let store = RuleStore::new();
        store.load(&sample_rule("rule-001", "test")).unwrap();

        assert_eq!(store.len(), 1);
        assert!(store.contains("rule-001"));

        let compiled = store.get("rule-001").unwrap();
        assert_eq!(compiled.id(), "rule-001");
        assert_eq!(compiled.name(), "test");
    }

    #[test]
    fn test_load_from_json() {
        let store = RuleStore::new();
        let rule_id = store
            .load_from_json(
                r#"
                {
                    "id": "rule-001",
                    "name": "test",
                    "condition": {
                        "type": "simple",
                        "field": "control",
                        "path": "status",
                        "operator": "equals",
                        "value": "active"
                    }
                }
                "#,
            )
            .unwrap();

        assert_eq!(rule_id, "rule-001");
        assert!(store.contains("rule-001"));
    }

    #[test]
    fn test_get_nonexistent() {
        let store = RuleStore::new();
        assert!(store.get("nonexistent").is_none());
    }

    #[test]
    fn test_get_or_compile_caches() {
        let store = RuleStore::new();
        let rule = sample_rule("rule-001", "test");

        assert!(!store.contains("rule-001"));
        store.get_or_compile(&rule).unwrap();
        assert!(store.contains("rule-001"));

        // 命中后不重新编译，直接返回缓存条目
        let cached = store.get_or_compile(&rule).unwrap();
        assert_eq!(cached.id(), "rule-001");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_reload_overwrites() {
        let store = RuleStore::new();
        store.load(&sample_rule("rule-001", "old")).unwrap();
        store.load(&sample_rule("rule-001", "new")).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("rule-001").unwrap().name(), "new");
    }

    #[test]
    fn test_update_existing() {
        let store = RuleStore::new();
        store.load(&sample_rule("rule-001", "old")).unwrap();
        store.update(&sample_rule("rule-001", "updated")).unwrap();

        assert_eq!(store.get("rule-001").unwrap().name(), "updated");
    }

    #[test]
    fn test_update_nonexistent() {
        let store = RuleStore::new();
        let result = store.update(&sample_rule("rule-001", "test"));
        assert!(matches!(result, Err(RuleError::RuleNotFound(_))));
    }

    #[test]
    fn test_delete() {
        let store = RuleStore::new();
        store.load(&sample_rule("rule-001", "test")).unwrap();

        store.delete("rule-001").unwrap();
        assert!(!store.contains("rule-001"));
        assert!(store.delete("rule-001").is_err());
    }

    #[test]
    fn test_load_batch_isolates_failures() {
        let store = RuleStore::new();

        let mut bad = Rule::new(
            "bad",
            Condition::simple_at("control", "id", Operator::Matches, "[invalid"),
        );
        bad.id = "rule-bad".to_string();

        let rules = vec![
            sample_rule("rule-001", "a"),
            bad,
            sample_rule("rule-002", "b"),
        ];

        let loaded = store.load_batch(&rules);
        assert_eq!(loaded, vec!["rule-001".to_string(), "rule-002".to_string()]);
        assert_eq!(store.len(), 2);
        assert!(!store.contains("rule-bad"));
    }

    #[test]
    fn test_clear() {
        let store = RuleStore::new();
        store.load(&sample_rule("rule-001", "a")).unwrap();
        store.load(&sample_rule("rule-002", "b")).unwrap();

        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_stats() {
        let store = RuleStore::new();
        store.load(&sample_rule("rule-001", "a")).unwrap();
        store.load(&sample_rule("rule-002", "b")).unwrap();

        let stats = store.stats();
        assert_eq!(stats.rules_count, 2);
        assert_eq!(stats.total_fields, 4); // 每条规则引用 2 个字段
        assert_eq!(stats.avg_fields_per_rule, 2.0);
    }

    #[test]
    fn test_concurrent_access() {
        use std::thread;

        let store = RuleStore::new();
        let store_clone = store.clone();

        let handle = thread::spawn(move || {
            for i in 0..100 {
                store_clone
                    .load(&sample_rule(&format!("rule-{}", i), &format!("test-{}", i)))
                    .unwrap();
            }
        });

        for i in 100..200 {
            store
                .load(&sample_rule(&format!("rule-{}", i), &format!("test-{}", i)))
                .unwrap();
        }

        handle.join().unwrap();
        assert_eq!(store.len(), 200);
    }
}
