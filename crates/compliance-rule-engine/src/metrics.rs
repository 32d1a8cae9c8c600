//! 评估指标
//!
//! 通过 MetricsSink 接口与指标后端解耦。默认实现基于 metrics crate 门面，
//! 宿主未安装 recorder 时记录自动退化为空操作，引擎功能不受影响；
//! 未配置接收器的评估服务同样正常工作。

/// 评估耗时直方图名称（毫秒）
pub const RULE_EVALUATION_DURATION_MS: &str = "rule_evaluation_duration_ms";

/// 指标接收器接口
///
/// 每次规则评估调用一次 record_histogram，标签携带规则 ID 与评估结局
/// （passed / failed / error）。
pub trait MetricsSink: Send + Sync {
    /// 记录一次耗时采样（毫秒）
    fn record_histogram(&self, name: &str, value_ms: f64, tags: &[(String, String)]);
}

/// 基于 metrics 门面的默认接收器
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsRecorder;

impl MetricsSink for MetricsRecorder {
    fn record_histogram(&self, name: &str, value_ms: f64, tags: &[(String, String)]) {
        let labels: Vec<metrics::Label> = tags
            .iter()
            .map(|(k, v)| metrics::Label::new(k.clone(), v.clone()))
            .collect();

        metrics::histogram!(name.to_string(), labels.clone()).record(value_ms);
        metrics::counter!("rule_evaluations_total", labels).increment(1);
    }
}

/// 注册指标描述（出现在导出端点的 HELP 注释中）
pub fn describe_metrics() {
    metrics::describe_histogram!(
        RULE_EVALUATION_DURATION_MS,
        "Rule evaluation duration in milliseconds"
    );
    metrics::describe_counter!(
        "rule_evaluations_total",
        "Total number of rule evaluations"
    );
}
