//! 规则引擎领域模型

use crate::operators::Operator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// 规则严重级别
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Critical => write!(f, "CRITICAL"),
            Self::High => write!(f, "HIGH"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::Low => write!(f, "LOW"),
        }
    }
}

/// 修复策略类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemediationKind {
    Automatic,
    #[default]
    Manual,
    ApprovalRequired,
}

/// 修复策略描述
///
/// 引擎只透传 script 引用，从不执行。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Remediation {
    #[serde(rename = "type", default)]
    pub kind: RemediationKind,
    #[serde(default)]
    pub instructions: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
}

/// 合规框架映射（纯描述性元数据，不参与评估）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameworkMapping {
    pub framework: String,
    pub control_id: String,
}

/// 规则定义
///
/// 编译后视为不可变；变更规则内容需要重新编译。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub framework_mappings: Vec<FrameworkMapping>,
    #[serde(default)]
    pub severity: Severity,
    pub condition: Condition,
    #[serde(default)]
    pub remediation: Remediation,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Rule {
    pub fn new(name: impl Into<String>, condition: Condition) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: String::new(),
            framework_mappings: Vec::new(),
            severity: Severity::default(),
            condition,
            remediation: Remediation::default(),
            metadata: Map::new(),
        }
    }
}

/// 条件树节点
///
/// 自底向上从规则文档构建，构建后不再变更，树结构天然有限无环。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// 叶子比较条件
    Simple {
        field: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        operator: Operator,
        /// exists/isEmpty 忽略期望值，文档中可省略
        #[serde(default)]
        value: Value,
    },
    /// 所有子条件都必须通过
    And { conditions: Vec<Condition> },
    /// 任一子条件通过即可
    Or { conditions: Vec<Condition> },
    /// 单个子条件取反
    Not { condition: Box<Condition> },
}

impl Condition {
    pub fn simple(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self::Simple {
            field: field.into(),
            path: None,
            operator,
            value: value.into(),
        }
    }

    /// 带点号路径的叶子条件，如 `simple_at("control", "config.encryption.enabled", ...)`
    pub fn simple_at(
        field: impl Into<String>,
        path: impl Into<String>,
        operator: Operator,
        value: impl Into<Value>,
    ) -> Self {
        Self::Simple {
            field: field.into(),
            path: Some(path.into()),
            operator,
            value: value.into(),
        }
    }

    pub fn and(conditions: Vec<Condition>) -> Self {
        Self::And { conditions }
    }

    pub fn or(conditions: Vec<Condition>) -> Self {
        Self::Or { conditions }
    }

    pub fn negate(condition: Condition) -> Self {
        Self::Not {
            condition: Box::new(condition),
        }
    }
}

/// 评估上下文 - 提供给规则引擎的数据袋
///
/// 顶层按槽位命名（control、evidence、metadata 及引擎计算字段），
/// 槽位内部由字段解析器按点号路径访问。
#[derive(Debug, Clone, Default)]
pub struct EvaluationContext {
    slots: Map<String, Value>,
}

impl EvaluationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入一个顶层槽位
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.slots.insert(name.into(), value);
    }

    /// 链式构建用
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.insert(name, value);
        self
    }

    /// 读取顶层槽位
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.slots.get(name)
    }
}

/// 单次规则评估结果
///
/// error 非空表示该次评估未能得出结论，此时 passed 保持默认值 false，
/// 不应被解读为断言结果。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub rule_id: String,
    pub control_id: String,
    pub passed: bool,
    pub evaluated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EvaluationResult {
    pub fn new(rule_id: impl Into<String>, control_id: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.into(),
            control_id: control_id.into(),
            passed: false,
            evaluated_at: Utc::now(),
            details: None,
            error: None,
        }
    }

    /// 该结果是否真正完成了评估
    pub fn was_evaluated(&self) -> bool {
        self.error.is_none()
    }
}

/// 单个控制项的评估结果集合
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlEvaluation {
    pub control_id: String,
    pub results: Vec<EvaluationResult>,
}

/// 批量评估汇总
///
/// passed/failed/errors 互斥，三者之和等于 total_rules（总评估次数）。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationSummary {
    pub total_controls: usize,
    pub total_rules: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
}

/// 批量评估结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkEvaluationResult {
    /// 按控制项输入顺序排列的结果（control_id → 结果列表）
    pub results: Vec<ControlEvaluation>,
    pub summary: EvaluationSummary,
    pub evaluated_at: DateTime<Utc>,
}

impl BulkEvaluationResult {
    /// 按控制项 ID 查找结果
    pub fn results_for(&self, control_id: &str) -> Option<&[EvaluationResult]> {
        self.results
            .iter()
            .find(|c| c.control_id == control_id)
            .map(|c| c.results.as_slice())
    }
}
