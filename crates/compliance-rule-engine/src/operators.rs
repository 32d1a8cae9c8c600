//! 规则操作符定义

use crate::error::RuleError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 条件操作符
///
/// 封闭枚举：外部规则文档中的未知操作符名在反序列化阶段即被拒绝，
/// 评估期不存在查找失败的路径。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    // 通用比较
    Equals,
    NotEquals,

    // 包含检查（按字段值的运行时类型分派：字符串子串或数组成员）
    Contains,
    NotContains,

    // 数值比较（两侧操作数做数值强制转换）
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,

    // 集合成员
    In,
    NotIn,

    // 模式匹配
    Matches,

    // 存在性与空值检查
    Exists,
    IsEmpty,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Equals => "equals",
            Self::NotEquals => "notEquals",
            Self::Contains => "contains",
            Self::NotContains => "notContains",
            Self::GreaterThan => "greaterThan",
            Self::LessThan => "lessThan",
            Self::GreaterThanOrEqual => "greaterThanOrEqual",
            Self::LessThanOrEqual => "lessThanOrEqual",
            Self::In => "in",
            Self::NotIn => "notIn",
            Self::Matches => "matches",
            Self::Exists => "exists",
            Self::IsEmpty => "isEmpty",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Operator {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let op = match s {
            "equals" => Self::Equals,
            "notEquals" => Self::NotEquals,
            "contains" => Self::Contains,
            "notContains" => Self::NotContains,
            "greaterThan" => Self::GreaterThan,
            "lessThan" => Self::LessThan,
            "greaterThanOrEqual" => Self::GreaterThanOrEqual,
            "lessThanOrEqual" => Self::LessThanOrEqual,
            "in" => Self::In,
            "notIn" => Self::NotIn,
            "matches" => Self::Matches,
            "exists" => Self::Exists,
            "isEmpty" => Self::IsEmpty,
            _ => return Err(RuleError::ParseError(format!("未知操作符: {}", s))),
        };
        Ok(op)
    }
}
