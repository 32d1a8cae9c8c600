//! 规则校验器
//!
//! 面向规则编写界面的结构化校验：一次性收集所有问题而不是快速失败，
//! 错误路径用点号标记，与条件树的嵌套层级一一对应
//! （如 condition.conditions.1.conditions.0）。

use crate::compiler::RuleCompiler;
use crate::models::{Condition, Rule};
use crate::operators::Operator;
use serde::Serialize;

/// 单条校验错误
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

/// 校验报告
///
/// errors 为空即 valid，规则可安全编译缓存用于生产评估。
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
}

/// 规则校验器
pub struct RuleValidator;

impl RuleValidator {
    /// 校验规则，收集全部错误
    pub fn validate(rule: &Rule) -> ValidationReport {
        let mut errors = Vec::new();

        if rule.id.trim().is_empty() {
            errors.push(ValidationError {
                path: "id".to_string(),
                message: "规则 ID 不能为空".to_string(),
            });
        }

        if rule.name.trim().is_empty() {
            errors.push(ValidationError {
                path: "name".to_string(),
                message: "规则名称不能为空".to_string(),
            });
        }

        // 尝试编译：无效正则等编译期问题在此暴露；
        // 结构性问题由下面的递归检查报告，编译器对其保持宽容以免重复计数
        if let Err(e) = RuleCompiler::compile(rule) {
            errors.push(ValidationError {
                path: "condition".to_string(),
                message: e.to_string(),
            });
        }

        Self::validate_node(&rule.condition, "condition", &mut errors);

        ValidationReport {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// 递归校验条件节点
    fn validate_node(condition: &Condition, path: &str, errors: &mut Vec<ValidationError>) {
        match condition {
            Condition::Simple {
                field,
                operator,
                value,
                ..
            } => {
                if field.trim().is_empty() {
                    errors.push(ValidationError {
                        path: format!("{}.field", path),
                        message: "条件字段不能为空".to_string(),
                    });
                }

                if matches!(operator, Operator::In | Operator::NotIn) && !value.is_array() {
                    errors.push(ValidationError {
                        path: format!("{}.value", path),
                        message: format!("{} 操作符需要数组值", operator),
                    });
                }
            }
            Condition::And { conditions } | Condition::Or { conditions } => {
                if conditions.is_empty() {
                    errors.push(ValidationError {
                        path: format!("{}.conditions", path),
                        message: "逻辑组的子条件列表不能为空".to_string(),
                    });
                }

                for (i, child) in conditions.iter().enumerate() {
                    Self::validate_node(child, &format!("{}.conditions.{}", path, i), errors);
                }
            }
            Condition::Not { condition } => {
                Self::validate_node(condition, &format!("{}.condition", path), errors);
            }
        }
    }
}
