//! 规则编译器
//!
//! 将条件树一次性编译为可复用的评估闭包：操作符分派、路径拆分、
//! 正则编译等结构性工作只在编译期发生一次，评估期只剩闭包调用。
//! 同一编译产物会被批量评估重复使用任意多次。

use crate::error::{Result, RuleError};
use crate::evaluator::ConditionEvaluator;
use crate::models::{Condition, EvaluationContext, Rule};
use crate::operators::Operator;
use crate::resolver::FieldAccessor;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// 编译产物：对上下文求值的闭包
pub type Evaluator = Arc<dyn Fn(&EvaluationContext) -> Result<bool> + Send + Sync>;

/// 编译后的规则
#[derive(Clone)]
pub struct CompiledRule {
    /// 原始规则（id/元数据/严重级别/修复策略的来源）
    pub rule: Arc<Rule>,
    /// 根条件对应的评估闭包
    pub evaluator: Evaluator,
    /// 规则引用的所有字段路径（用于统计和规则编写工具）
    pub required_fields: HashSet<String>,
}

impl CompiledRule {
    /// 获取规则 ID
    pub fn id(&self) -> &str {
        &self.rule.id
    }

    /// 获取规则名称
    pub fn name(&self) -> &str {
        &self.rule.name
    }

    /// 对单个上下文求值
    pub fn evaluate(&self, context: &EvaluationContext) -> Result<bool> {
        (self.evaluator)(context)
    }
}

impl fmt::Debug for CompiledRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledRule")
            .field("rule_id", &self.rule.id)
            .field("required_fields", &self.required_fields)
            .finish_non_exhaustive()
    }
}

/// 条件编译器
pub struct ConditionCompiler;

impl ConditionCompiler {
    /// 递归编译条件树
    pub fn compile(condition: &Condition) -> Result<Evaluator> {
        match condition {
            Condition::Simple {
                field,
                path,
                operator,
                value,
            } => Self::compile_simple(field, path.as_deref(), *operator, value),
            Condition::And { conditions } => {
                let children = conditions
                    .iter()
                    .map(Self::compile)
                    .collect::<Result<Vec<_>>>()?;

                // AND: 从左到右短路。空组按恒真编译，校验器负责拒绝空组
                Ok(Arc::new(move |ctx| {
                    for child in &children {
                        if !child(ctx)? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }))
            }
            Condition::Or { conditions } => {
                let children = conditions
                    .iter()
                    .map(Self::compile)
                    .collect::<Result<Vec<_>>>()?;

                // OR: 从左到右短路。空组按恒假编译
                Ok(Arc::new(move |ctx| {
                    for child in &children {
                        if child(ctx)? {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }))
            }
            Condition::Not { condition } => {
                let inner = Self::compile(condition)?;
                Ok(Arc::new(move |ctx| inner(ctx).map(|r| !r)))
            }
        }
    }

    /// 编译叶子条件：字段访问器与正则都在此处一次性构建
    fn compile_simple(
        field: &str,
        path: Option<&str>,
        operator: Operator,
        value: &Value,
    ) -> Result<Evaluator> {
        let accessor = FieldAccessor::new(field, path);

        // matches 的模式预编译，无效模式在编译期失败而不是评估期
        if operator == Operator::Matches {
            let pattern = value.as_str().ok_or_else(|| {
                RuleError::CompileError("matches 操作符需要字符串模式".to_string())
            })?;
            let regex = Regex::new(pattern).map_err(|e| {
                RuleError::CompileError(format!("无效的正则表达式 '{}': {}", pattern, e))
            })?;

            return Ok(Arc::new(move |ctx| {
                ConditionEvaluator::matches_compiled(accessor.resolve(ctx), &regex)
            }));
        }

        let value = value.clone();
        Ok(Arc::new(move |ctx| {
            ConditionEvaluator::evaluate(accessor.resolve(ctx), operator, &value)
        }))
    }
}

/// 规则编译器
pub struct RuleCompiler;

impl RuleCompiler {
    /// 编译规则
    pub fn compile(rule: &Rule) -> Result<CompiledRule> {
        let evaluator = ConditionCompiler::compile(&rule.condition)?;
        let required_fields = Self::extract_fields(&rule.condition);

        Ok(CompiledRule {
            rule: Arc::new(rule.clone()),
            evaluator,
            required_fields,
        })
    }

    /// 从 JSON 文档解析并编译规则
    pub fn compile_from_json(json: &str) -> Result<CompiledRule> {
        let rule: Rule = serde_json::from_str(json)?;
        Self::compile(&rule)
    }

    /// 提取规则引用的所有字段路径
    fn extract_fields(condition: &Condition) -> HashSet<String> {
        let mut fields = HashSet::new();
        Self::collect_fields(condition, &mut fields);
        fields
    }

    /// 递归收集字段
    fn collect_fields(condition: &Condition, fields: &mut HashSet<String>) {
        match condition {
            Condition::Simple { field, path, .. } => {
                fields.insert(FieldAccessor::new(field.clone(), path.as_deref()).coverage_key());
            }
            Condition::And { conditions } | Condition::Or { conditions } => {
                for child in conditions {
                    Self::collect_fields(child, fields);
                }
            }
            Condition::Not { condition } => Self::collect_fields(condition, fields),
        }
    }
}
