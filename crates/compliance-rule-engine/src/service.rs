//! 评估服务
//!
//! 单控制项路径按规则输入顺序逐条评估；批量路径将控制项按固定分片
//! 并发评估，分片之间顺序执行以约束同时在途的评估数量。

use crate::metrics::{MetricsSink, RULE_EVALUATION_DURATION_MS};
use crate::models::{
    BulkEvaluationResult, ControlEvaluation, EvaluationContext, EvaluationResult,
    EvaluationSummary, Rule,
};
use crate::store::RuleStore;
use chrono::Utc;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{instrument, warn};

/// 批量评估的默认并发上限
pub const DEFAULT_CONCURRENCY: usize = 10;

/// 评估服务
///
/// 两个入口都是输入加共享规则缓存的纯函数，缓存是引擎中唯一的共享可变状态。
#[derive(Clone)]
pub struct EvaluationService {
    store: RuleStore,
    metrics: Option<Arc<dyn MetricsSink>>,
    concurrency: usize,
}

impl EvaluationService {
    pub fn new(store: RuleStore) -> Self {
        Self {
            store,
            metrics: None,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// 配置指标接收器
    pub fn with_metrics(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(sink);
        self
    }

    /// 配置批量评估的并发上限
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency = limit.max(1);
        self
    }

    /// 评估单个控制项
    ///
    /// 任一规则的编译或执行失败只体现在该规则自身的结果上，
    /// 不会中断其余规则的评估。结果顺序与规则输入顺序一致。
    #[instrument(skip(self, control, rules), fields(rule_count = rules.len()))]
    pub async fn evaluate_control(&self, control: &Value, rules: &[Rule]) -> Vec<EvaluationResult> {
        let control_id = Self::control_id(control);
        let context = Self::build_context(control);

        rules
            .iter()
            .map(|rule| self.evaluate_one(rule, &context, &control_id))
            .collect()
    }

    /// 批量评估
    ///
    /// 控制项按并发上限分片：分片内并发、分片间顺序执行，结果保持
    /// 控制项输入顺序。引擎自身不设超时；需要墙钟上限的宿主应在外层
    /// 包裹 evaluate_bulk。
    #[instrument(
        skip(self, controls, rules),
        fields(control_count = controls.len(), rule_count = rules.len())
    )]
    pub async fn evaluate_bulk(&self, controls: &[Value], rules: &[Rule]) -> BulkEvaluationResult {
        let mut ordered: Vec<ControlEvaluation> = Vec::with_capacity(controls.len());

        for chunk in controls.chunks(self.concurrency) {
            let futures: Vec<_> = chunk
                .iter()
                .map(|control| async move {
                    ControlEvaluation {
                        control_id: Self::control_id(control),
                        results: self.evaluate_control(control, rules).await,
                    }
                })
                .collect();

            // join_all 的产出顺序与输入一致，无需按完成顺序重排
            for evaluation in futures::future::join_all(futures).await {
                Self::merge_evaluation(&mut ordered, evaluation);
            }
        }

        let summary = Self::summarize(&ordered);
        BulkEvaluationResult {
            results: ordered,
            summary,
            evaluated_at: Utc::now(),
        }
    }

    /// 评估单条规则并记录指标
    fn evaluate_one(
        &self,
        rule: &Rule,
        context: &EvaluationContext,
        control_id: &str,
    ) -> EvaluationResult {
        let start = Instant::now();
        let mut result = EvaluationResult::new(rule.id.clone(), control_id);

        match self.store.get_or_compile(rule) {
            Ok(compiled) => match compiled.evaluate(context) {
                Ok(passed) => {
                    result.passed = passed;
                    if !passed {
                        result.details = Some(Self::failure_details(rule));
                    }
                }
                Err(e) => {
                    warn!(rule_id = %rule.id, control_id, error = %e, "规则执行失败");
                    result.error = Some(e.to_string());
                }
            },
            Err(e) => {
                warn!(rule_id = %rule.id, control_id, error = %e, "规则编译失败");
                result.error = Some(e.to_string());
            }
        }

        self.record_metrics(&rule.id, &result, start.elapsed());
        result
    }

    fn record_metrics(&self, rule_id: &str, result: &EvaluationResult, elapsed: Duration) {
        let Some(sink) = &self.metrics else { return };

        let outcome = if result.error.is_some() {
            "error"
        } else if result.passed {
            "passed"
        } else {
            "failed"
        };

        let tags = [
            ("rule_id".to_string(), rule_id.to_string()),
            ("outcome".to_string(), outcome.to_string()),
        ];
        sink.record_histogram(
            RULE_EVALUATION_DURATION_MS,
            elapsed.as_secs_f64() * 1000.0,
            &tags,
        );
    }

    /// 未通过时的说明文本，引用规则名称与描述
    fn failure_details(rule: &Rule) -> String {
        if rule.description.is_empty() {
            format!("控制项未满足规则「{}」", rule.name)
        } else {
            format!("控制项未满足规则「{}」: {}", rule.name, rule.description)
        }
    }

    /// 重复的控制项 ID 合并到首次出现的位置
    fn merge_evaluation(ordered: &mut Vec<ControlEvaluation>, evaluation: ControlEvaluation) {
        match ordered
            .iter_mut()
            .find(|c| c.control_id == evaluation.control_id)
        {
            Some(existing) => existing.results.extend(evaluation.results),
            None => ordered.push(evaluation),
        }
    }

    /// 单次扫描生成汇总（passed/failed/errors 互斥）
    fn summarize(results: &[ControlEvaluation]) -> EvaluationSummary {
        let mut summary = EvaluationSummary {
            total_controls: results.len(),
            ..Default::default()
        };

        for control in results {
            for result in &control.results {
                summary.total_rules += 1;
                if result.error.is_some() {
                    summary.errors += 1;
                } else if result.passed {
                    summary.passed += 1;
                } else {
                    summary.failed += 1;
                }
            }
        }

        summary
    }

    /// 控制项 ID（输入至少应包含 id 字段）
    fn control_id(control: &Value) -> String {
        control
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string()
    }

    /// 从控制项构建评估上下文
    ///
    /// 除 control/evidence/metadata 槽位外，附带引擎计算的便利字段：
    /// daysSinceLastAssessment（距上次评估天数）与 hasRequiredEvidence。
    fn build_context(control: &Value) -> EvaluationContext {
        let mut context = EvaluationContext::new();

        if let Some(evidence) = control.get("evidence") {
            context.insert("evidence", evidence.clone());
        }
        if let Some(metadata) = control.get("metadata") {
            context.insert("metadata", metadata.clone());
        }

        if let Some(days) = Self::days_since_last_assessment(control) {
            context.insert("daysSinceLastAssessment", json!(days));
        }
        context.insert(
            "hasRequiredEvidence",
            json!(Self::has_required_evidence(control)),
        );

        context.insert("control", control.clone());
        context
    }

    /// 距上次评估的天数（控制项的 lastAssessedAt 字段，RFC 3339）
    fn days_since_last_assessment(control: &Value) -> Option<i64> {
        let raw = control.get("lastAssessedAt")?.as_str()?;
        let assessed = chrono::DateTime::parse_from_rfc3339(raw).ok()?;
        Some((Utc::now() - assessed.with_timezone(&Utc)).num_days())
    }

    /// 是否存在非空的证据列表
    fn has_required_evidence(control: &Value) -> bool {
        control
            .get("evidence")
            .and_then(Value::as_array)
            .is_some_and(|items| !items.is_empty())
    }
}
