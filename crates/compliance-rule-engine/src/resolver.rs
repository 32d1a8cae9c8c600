//! 字段解析器
//!
//! 将字段名与可选的点号路径编译为访问器，评估时从上下文中提取值。
//! 任一中间节点缺失即短路返回 None：缺数据是正常的评估结果，不是错误。

use crate::models::EvaluationContext;
use serde_json::Value;

/// 字段访问器
///
/// 路径拆分在编译期完成一次，评估期只做查表和下钻。
#[derive(Debug, Clone)]
pub struct FieldAccessor {
    field: String,
    segments: Vec<String>,
}

impl FieldAccessor {
    pub fn new(field: impl Into<String>, path: Option<&str>) -> Self {
        let segments = path
            .map(|p| {
                p.split('.')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            field: field.into(),
            segments,
        }
    }

    /// 字段覆盖统计用的键：`field` 或 `field.path`
    pub fn coverage_key(&self) -> String {
        if self.segments.is_empty() {
            self.field.clone()
        } else {
            format!("{}.{}", self.field, self.segments.join("."))
        }
    }

    /// 从上下文中解析字段值
    pub fn resolve<'a>(&self, context: &'a EvaluationContext) -> Option<&'a Value> {
        let mut current = context.get(&self.field)?;

        for segment in &self.segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                // 支持数组索引访问，如 "items.0.name"
                Value::Array(arr) => arr.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }

        Some(current)
    }
}
