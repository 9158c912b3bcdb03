//! 规则集与等级规则
//!
//! 规则集按 `effective_from` 版本化，创建后不可修改。
//! 一次操作只受其业务时间点上生效的规则集约束。

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::money::{Money, Percent};

/// 等级编码
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LevelCode(String);

impl LevelCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LevelCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 等级规则
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelRule {
    /// 持久化后分配，新建时为 0
    pub id: i64,
    pub level_code: LevelCode,
    /// 累计消费门槛
    pub threshold_total_spend: Money,
    /// 赚取百分比
    pub percent_earn: Percent,
}

/// 规则集
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ruleset {
    pub id: i64,
    pub effective_from: DateTime<Utc>,
    /// 每积分对应的卢布数
    pub base_rub_per_point: Money,
    /// 按门槛升序
    pub levels: Vec<LevelRule>,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Ruleset {
    /// 基础等级（门槛最低的等级）
    pub fn baseline_level(&self) -> Option<&LevelRule> {
        self.levels
            .iter()
            .min_by(|a, b| a.threshold_total_spend.cmp(&b.threshold_total_spend))
    }
}

/// 新建规则集（已校验、已排序）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRuleset {
    pub effective_from: DateTime<Utc>,
    pub base_rub_per_point: Money,
    pub levels: Vec<LevelRule>,
    pub created_by: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(code: &str, threshold: &str, pct: &str) -> LevelRule {
        LevelRule {
            id: 0,
            level_code: LevelCode::new(code),
            threshold_total_spend: Money::parse(threshold).unwrap(),
            percent_earn: Percent::parse(pct).unwrap(),
        }
    }

    #[test]
    fn test_baseline_level() {
        let ruleset = Ruleset {
            id: 1,
            effective_from: Utc::now(),
            base_rub_per_point: Money::parse("10").unwrap(),
            levels: vec![level("GOLD", "5000", "10"), level("BASE", "0", "5")],
            created_by: None,
            created_at: Utc::now(),
        };
        assert_eq!(ruleset.baseline_level().unwrap().level_code.as_str(), "BASE");
    }

    #[test]
    fn test_level_rule_json_shape() {
        let json = serde_json::to_value(level("BASE", "0", "5")).unwrap();
        assert_eq!(json["levelCode"], "BASE");
        assert_eq!(json["thresholdTotalSpend"], "0.00");
        assert_eq!(json["percentEarn"], "5.00");
    }
}
