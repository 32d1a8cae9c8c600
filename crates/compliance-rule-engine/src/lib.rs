//! 合规规则引擎
//!
//! 将声明式的条件树规则编译为可复用的评估闭包，并对合规控制项
//! 逐条或批量执行，产出通过/未通过判定。支持：
//! - JSON 规则文档解析与面向编写界面的结构化校验
//! - 条件树一次编译、多次评估（短路求值）
//! - DashMap 编译规则缓存
//! - 有界并发的批量评估与汇总
//! - 可插拔的评估指标接收器
//!
//! 本 crate 是纯库：规则与结果的持久化、评估调度、结果展示和
//! 修复执行都属于宿主进程的职责。

pub mod compiler;
pub mod error;
pub mod evaluator;
pub mod metrics;
pub mod models;
pub mod operators;
pub mod resolver;
pub mod service;
pub mod store;
pub mod validator;

pub use compiler::{CompiledRule, ConditionCompiler, Evaluator, RuleCompiler};
pub use error::{Result, RuleError};
pub use evaluator::ConditionEvaluator;
pub use metrics::{MetricsRecorder, MetricsSink, RULE_EVALUATION_DURATION_MS};
pub use models::{
    BulkEvaluationResult, Condition, ControlEvaluation, EvaluationContext, EvaluationResult,
    EvaluationSummary, FrameworkMapping, Remediation, RemediationKind, Rule, Severity,
};
pub use operators::Operator;
pub use resolver::FieldAccessor;
pub use service::{DEFAULT_CONCURRENCY, EvaluationService};
pub use store::{RuleStore, RuleStoreStats};
pub use validator::{RuleValidator, ValidationError, ValidationReport};
