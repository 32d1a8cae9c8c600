//! 条件评估器
//!
//! 实现各操作符对字段值与期望值的纯函数比较，支持多种数据类型。

use crate::error::{Result, RuleError};
use crate::operators::Operator;
use regex::Regex;
use serde_json::Value;

/// 条件评估器
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// 评估条件
    ///
    /// # Arguments
    /// * `field_value` - 从上下文中解析出的字段值（缺失为 None）
    /// * `operator` - 操作符
    /// * `expected_value` - 规则中定义的期望值
    pub fn evaluate(
        field_value: Option<&Value>,
        operator: Operator,
        expected_value: &Value,
    ) -> Result<bool> {
        // 存在性与空值检查先于缺失短路处理，它们的语义就是观察缺失本身
        match operator {
            Operator::Exists => {
                return Ok(!matches!(field_value, None | Some(Value::Null)));
            }
            Operator::IsEmpty => return Ok(Self::is_empty(field_value)),
            _ => {}
        }

        // 字段缺失时，所有值比较一律不通过（含取反形式的操作符）
        let field_value = match field_value {
            Some(v) => v,
            None => return Ok(false),
        };

        match operator {
            Operator::Equals => Self::eq(field_value, expected_value),
            Operator::NotEquals => Self::eq(field_value, expected_value).map(|r| !r),
            Operator::Contains => Self::contains(field_value, expected_value),
            Operator::NotContains => Self::contains(field_value, expected_value).map(|r| !r),
            Operator::GreaterThan => Self::compare(field_value, expected_value, |a, b| a > b),
            Operator::LessThan => Self::compare(field_value, expected_value, |a, b| a < b),
            Operator::GreaterThanOrEqual => {
                Self::compare(field_value, expected_value, |a, b| a >= b)
            }
            Operator::LessThanOrEqual => Self::compare(field_value, expected_value, |a, b| a <= b),
            Operator::In => Self::in_list(field_value, expected_value),
            Operator::NotIn => Self::in_list(field_value, expected_value).map(|r| !r),
            Operator::Matches => Self::matches_pattern(field_value, expected_value),
            Operator::Exists | Operator::IsEmpty => unreachable!(),
        }
    }

    /// 用预编译正则评估 matches 条件（编译路径专用）
    pub fn matches_compiled(field_value: Option<&Value>, regex: &Regex) -> Result<bool> {
        let field_value = match field_value {
            Some(v) => v,
            None => return Ok(false),
        };

        Ok(regex.is_match(&Self::string_form(field_value)?))
    }

    /// 判断值是否为空
    fn is_empty(value: Option<&Value>) -> bool {
        match value {
            None => true,
            Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(Value::Array(arr)) => arr.is_empty(),
            Some(Value::Object(obj)) => obj.is_empty(),
            _ => false,
        }
    }

    /// 相等比较
    fn eq(field: &Value, expected: &Value) -> Result<bool> {
        // 数值统一转为浮点数比较，避免整数和浮点数形式不一致（如 100 与 100.0）
        if let (Some(f1), Some(f2)) = (Self::as_f64(field), Self::as_f64(expected)) {
            return Ok((f1 - f2).abs() < f64::EPSILON);
        }

        Ok(field == expected)
    }

    /// 数值比较
    fn compare<F>(field: &Value, expected: &Value, cmp: F) -> Result<bool>
    where
        F: Fn(f64, f64) -> bool,
    {
        let field_num = Self::as_f64(field).ok_or_else(|| RuleError::TypeMismatch {
            expected: "number".to_string(),
            actual: Self::type_name(field).to_string(),
        })?;

        let expected_num = Self::as_f64(expected).ok_or_else(|| RuleError::TypeMismatch {
            expected: "number".to_string(),
            actual: Self::type_name(expected).to_string(),
        })?;

        Ok(cmp(field_num, expected_num))
    }

    /// 字符串/数组包含检查（按字段值的运行时类型分派）
    fn contains(field: &Value, expected: &Value) -> Result<bool> {
        match field {
            Value::String(s) => {
                let substr = expected.as_str().ok_or_else(|| RuleError::TypeMismatch {
                    expected: "string".to_string(),
                    actual: Self::type_name(expected).to_string(),
                })?;
                Ok(s.contains(substr))
            }
            Value::Array(arr) => {
                for item in arr {
                    if Self::eq(item, expected)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            _ => Err(RuleError::TypeMismatch {
                expected: "string or array".to_string(),
                actual: Self::type_name(field).to_string(),
            }),
        }
    }

    /// 列表成员检查 (in)
    fn in_list(field: &Value, expected: &Value) -> Result<bool> {
        let arr = expected.as_array().ok_or_else(|| RuleError::TypeMismatch {
            expected: "array".to_string(),
            actual: Self::type_name(expected).to_string(),
        })?;

        for item in arr {
            if Self::eq(field, item)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// 正则匹配
    ///
    /// 编译路径会预编译正则并走 matches_compiled，这里覆盖直接调用场景。
    fn matches_pattern(field: &Value, expected: &Value) -> Result<bool> {
        let pattern = expected.as_str().ok_or_else(|| RuleError::TypeMismatch {
            expected: "string (regex pattern)".to_string(),
            actual: Self::type_name(expected).to_string(),
        })?;

        let regex = Regex::new(pattern).map_err(|e| {
            RuleError::CompileError(format!("无效的正则表达式 '{}': {}", pattern, e))
        })?;

        Ok(regex.is_match(&Self::string_form(field)?))
    }

    /// 标量值的字符串形式（模式匹配用）
    fn string_form(value: &Value) -> Result<String> {
        match value {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            _ => Err(RuleError::TypeMismatch {
                expected: "string, number or boolean".to_string(),
                actual: Self::type_name(value).to_string(),
            }),
        }
    }

    /// 尝试将 Value 转换为 f64
    fn as_f64(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// 获取值的类型名称
    fn type_name(value: &Value) -> &'static str {
        match value {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_equals_numbers() {
        assert!(
            ConditionEvaluator::evaluate(Some(&json!(100)), Operator::Equals, &json!(100)).unwrap()
        );

        // 整数与浮点数形式等价
        assert!(
            ConditionEvaluator::evaluate(Some(&json!(100.0)), Operator::Equals, &json!(100))
                .unwrap()
        );
    }

    #[test]
    fn test_equals_strings_and_bools() {
        assert!(
            ConditionEvaluator::evaluate(Some(&json!("active")), Operator::Equals, &json!("active"))
                .unwrap()
        );
        assert!(
            !ConditionEvaluator::evaluate(Some(&json!(false)), Operator::Equals, &json!(true))
                .unwrap()
        );
    }

    #[test]
    fn test_not_equals() {
        assert!(
            ConditionEvaluator::evaluate(Some(&json!("a")), Operator::NotEquals, &json!("b"))
                .unwrap()
        );
        assert!(
            !ConditionEvaluator::evaluate(Some(&json!("a")), Operator::NotEquals, &json!("a"))
                .unwrap()
        );
    }

    #[test]
    fn test_numeric_comparisons() {
        assert!(
            ConditionEvaluator::evaluate(Some(&json!(100)), Operator::GreaterThan, &json!(50))
                .unwrap()
        );
        assert!(
            ConditionEvaluator::evaluate(
                Some(&json!(100)),
                Operator::GreaterThanOrEqual,
                &json!(100)
            )
            .unwrap()
        );
        assert!(
            ConditionEvaluator::evaluate(Some(&json!(50)), Operator::LessThan, &json!(100))
                .unwrap()
        );
        assert!(
            ConditionEvaluator::evaluate(Some(&json!(100)), Operator::LessThanOrEqual, &json!(100))
                .unwrap()
        );
    }

    #[test]
    fn test_numeric_coercion_from_string() {
        // 字符串形式的数值两侧都做强制转换
        assert!(
            ConditionEvaluator::evaluate(Some(&json!("30")), Operator::GreaterThan, &json!(7))
                .unwrap()
        );
    }

    #[test]
    fn test_comparison_type_mismatch_is_error() {
        let result =
            ConditionEvaluator::evaluate(Some(&json!("abc")), Operator::GreaterThan, &json!(7));
        assert!(matches!(result, Err(RuleError::TypeMismatch { .. })));
    }

    #[test]
    fn test_contains_string() {
        assert!(
            ConditionEvaluator::evaluate(
                Some(&json!("encryption disabled")),
                Operator::Contains,
                &json!("disabled")
            )
            .unwrap()
        );
    }

    #[test]
    fn test_contains_array() {
        assert!(
            ConditionEvaluator::evaluate(
                Some(&json!(["soc2", "iso27001"])),
                Operator::Contains,
                &json!("soc2")
            )
            .unwrap()
        );
    }

    #[test]
    fn test_not_contains() {
        assert!(
            ConditionEvaluator::evaluate(
                Some(&json!(["soc2"])),
                Operator::NotContains,
                &json!("hipaa")
            )
            .unwrap()
        );
    }

    #[test]
    fn test_contains_on_number_is_error() {
        let result =
            ConditionEvaluator::evaluate(Some(&json!(42)), Operator::Contains, &json!("4"));
        assert!(matches!(result, Err(RuleError::TypeMismatch { .. })));
    }

    #[test]
    fn test_in_list() {
        assert!(
            ConditionEvaluator::evaluate(
                Some(&json!("HIGH")),
                Operator::In,
                &json!(["CRITICAL", "HIGH"])
            )
            .unwrap()
        );
        assert!(
            !ConditionEvaluator::evaluate(
                Some(&json!("LOW")),
                Operator::In,
                &json!(["CRITICAL", "HIGH"])
            )
            .unwrap()
        );
    }

    #[test]
    fn test_in_requires_array_target() {
        let result = ConditionEvaluator::evaluate(Some(&json!("a")), Operator::In, &json!("a"));
        assert!(matches!(result, Err(RuleError::TypeMismatch { .. })));
    }

    #[test]
    fn test_not_in() {
        assert!(
            ConditionEvaluator::evaluate(
                Some(&json!("LOW")),
                Operator::NotIn,
                &json!(["CRITICAL", "HIGH"])
            )
            .unwrap()
        );
    }

    #[test]
    fn test_matches() {
        assert!(
            ConditionEvaluator::evaluate(
                Some(&json!("AWS-EC2-001")),
                Operator::Matches,
                &json!(r"^AWS-[A-Z0-9]+-\d+$")
            )
            .unwrap()
        );
    }

    #[test]
    fn test_matches_number_string_form() {
        // 模式匹配作用于字段值的字符串形式
        assert!(
            ConditionEvaluator::evaluate(Some(&json!(404)), Operator::Matches, &json!(r"^4\d\d$"))
                .unwrap()
        );
    }

    #[test]
    fn test_matches_compiled() {
        let regex = Regex::new(r"^ctrl-\d+$").unwrap();
        assert!(ConditionEvaluator::matches_compiled(Some(&json!("ctrl-12")), &regex).unwrap());
        assert!(!ConditionEvaluator::matches_compiled(None, &regex).unwrap());
    }

    #[test]
    fn test_exists() {
        assert!(
            ConditionEvaluator::evaluate(Some(&json!("x")), Operator::Exists, &json!(null))
                .unwrap()
        );
        assert!(!ConditionEvaluator::evaluate(None, Operator::Exists, &json!(null)).unwrap());
        // null 等同于缺失
        assert!(
            !ConditionEvaluator::evaluate(Some(&json!(null)), Operator::Exists, &json!(null))
                .unwrap()
        );
    }

    #[test]
    fn test_is_empty() {
        assert!(ConditionEvaluator::evaluate(None, Operator::IsEmpty, &json!(null)).unwrap());
        assert!(
            ConditionEvaluator::evaluate(Some(&json!(null)), Operator::IsEmpty, &json!(null))
                .unwrap()
        );
        assert!(
            ConditionEvaluator::evaluate(Some(&json!("")), Operator::IsEmpty, &json!(null))
                .unwrap()
        );
        assert!(
            ConditionEvaluator::evaluate(Some(&json!([])), Operator::IsEmpty, &json!(null))
                .unwrap()
        );
        assert!(
            ConditionEvaluator::evaluate(Some(&json!({})), Operator::IsEmpty, &json!(null))
                .unwrap()
        );
        assert!(
            !ConditionEvaluator::evaluate(Some(&json!(["x"])), Operator::IsEmpty, &json!(null))
                .unwrap()
        );
        assert!(
            !ConditionEvaluator::evaluate(Some(&json!(0)), Operator::IsEmpty, &json!(null))
                .unwrap()
        );
    }

    #[test]
    fn test_missing_field_fails_value_comparisons() {
        // 缺失字段时所有值比较（含取反形式）都不通过
        for op in [
            Operator::Equals,
            Operator::NotEquals,
            Operator::Contains,
            Operator::NotContains,
            Operator::GreaterThan,
            Operator::In,
            Operator::NotIn,
            Operator::Matches,
        ] {
            assert!(
                !ConditionEvaluator::evaluate(None, op, &json!(["x"])).unwrap(),
                "{} 在字段缺失时应返回 false",
                op
            );
        }
    }
}
