//! 等级解析与积分计算
//!
//! 所有运算都在精确的定点小数上进行，取整一律向下截断（顾客不会获得小数积分）。

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use super::validator::prepare_levels;
use crate::error::{LedgerError, Result};
use crate::models::{LevelRule, Money, Percent, Points, Ruleset};

/// 解析累计消费对应的等级
///
/// `levels` 必须按门槛升序。升序遍历，保留最后一个门槛不超过累计消费的等级，
/// 遇到第一个超过的门槛即停止
pub fn resolve_level(total_spend: Money, levels: &[LevelRule]) -> Result<&LevelRule> {
    let mut resolved = None;
    for level in levels {
        if level.threshold_total_spend > total_spend {
            break;
        }
        resolved = Some(level);
    }
    resolved.ok_or_else(|| {
        LedgerError::InvalidLevels(format!("累计消费 {total_spend} 无法匹配任何等级"))
    })
}

/// 计算赚取积分
///
/// `basePoints = floor(purchase / base)`，`earned = floor(basePoints * percent / 100)`
pub fn compute_earn_points(purchase: Money, base_rub_per_point: Money, percent: Percent) -> Result<Points> {
    if purchase.is_negative() {
        return Err(LedgerError::InvalidRuleset(format!(
            "消费金额不能为负: {purchase}"
        )));
    }
    if !base_rub_per_point.is_positive() {
        return Err(LedgerError::InvalidRuleset(format!(
            "每积分卢布数必须大于 0: {base_rub_per_point}"
        )));
    }
    if !percent.is_positive() {
        return Err(LedgerError::InvalidRuleset(format!(
            "赚取百分比必须大于 0: {percent}"
        )));
    }

    let base_points = floor_div(purchase.value(), base_rub_per_point.value())?;
    let scaled = base_points
        .checked_mul(percent.value())
        .ok_or_else(|| LedgerError::InvalidRuleset("积分计算溢出".to_string()))?;
    let earned = floor_div(scaled, Decimal::ONE_HUNDRED)?;

    let earned = earned
        .to_i64()
        .ok_or_else(|| LedgerError::InvalidPoints(format!("赚取积分超出范围: {earned}")))?;
    Points::non_negative(earned)
}

/// 非负数的精确向下取整除法
///
/// 先减去余数再相除，商一定是整数，不受小数除法精度影响
fn floor_div(dividend: Decimal, divisor: Decimal) -> Result<Decimal> {
    let overflow = || LedgerError::InvalidRuleset("积分计算溢出".to_string());
    let remainder = dividend.checked_rem(divisor).ok_or_else(overflow)?;
    let whole = dividend.checked_sub(remainder).ok_or_else(overflow)?;
    whole
        .checked_div(divisor)
        .map(|q| q.trunc())
        .ok_or_else(overflow)
}

/// 一次赚取的规则计算结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EarnEvaluation {
    pub earned_points: Points,
    /// 消费前的等级（决定赚取百分比）
    pub level_before: LevelRule,
    /// 消费后的等级（写回账户）
    pub level_after: LevelRule,
}

/// 按规则集计算一次消费的赚取结果
///
/// 赚取百分比取自消费前的等级；消费后的等级由累计消费加上本次消费重新解析
pub fn evaluate_earn(ruleset: &Ruleset, total_spend_before: Money, purchase: Money) -> Result<EarnEvaluation> {
    let levels = prepare_levels(&ruleset.levels)?;

    let level_before = resolve_level(total_spend_before, &levels)?.clone();
    let total_spend_after = total_spend_before.checked_add(purchase)?;
    let level_after = resolve_level(total_spend_after, &levels)?.clone();

    let earned_points = compute_earn_points(
        purchase,
        ruleset.base_rub_per_point,
        level_before.percent_earn,
    )?;

    Ok(EarnEvaluation {
        earned_points,
        level_before,
        level_after,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::LevelCode;
    use chrono::Utc;

    fn money(v: &str) -> Money {
        Money::parse(v).unwrap()
    }

    fn pct(v: &str) -> Percent {
        Percent::parse(v).unwrap()
    }

    fn level(code: &str, threshold: &str, percent: &str) -> LevelRule {
        LevelRule {
            id: 0,
            level_code: LevelCode::new(code),
            threshold_total_spend: money(threshold),
            percent_earn: pct(percent),
        }
    }

    fn two_levels() -> Vec<LevelRule> {
        vec![level("BASE", "0", "5"), level("SILVER", "1000", "10")]
    }

    #[test]
    fn test_floor_arithmetic_example() {
        // base=10.00, percent=100.00, purchase=105.00 -> 10
        let earned = compute_earn_points(money("105.00"), money("10.00"), pct("100.00")).unwrap();
        assert_eq!(earned, Points::new(10));
    }

    #[test]
    fn test_compute_earn_points_truncates() {
        // floor(999.99 / 10) = 99, floor(99 * 5 / 100) = 4
        let earned = compute_earn_points(money("999.99"), money("10"), pct("5")).unwrap();
        assert_eq!(earned, Points::new(4));

        // floor(1 / 3) = 0
        let earned = compute_earn_points(money("1"), money("3"), pct("100")).unwrap();
        assert_eq!(earned, Points::ZERO);

        // floor(100 / 0.03) = 3333, floor(3333 * 33.33 / 100) = 1110
        let earned = compute_earn_points(money("100"), money("0.03"), pct("33.33")).unwrap();
        assert_eq!(earned, Points::new(1110));
    }

    #[test]
    fn test_compute_earn_points_zero_purchase() {
        let earned = compute_earn_points(Money::ZERO, money("10"), pct("5")).unwrap();
        assert_eq!(earned, Points::ZERO);
    }

    #[test]
    fn test_compute_earn_points_invalid_inputs() {
        let cases = [
            (money("-1"), money("10"), pct("5")),
            (money("10"), Money::ZERO, pct("5")),
            (money("10"), money("-10"), pct("5")),
            (money("10"), money("10"), pct("0")),
        ];
        for (purchase, base, percent) in cases {
            let err = compute_earn_points(purchase, base, percent).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidRuleset);
        }
    }

    #[test]
    fn test_resolve_level_boundary() {
        let levels = two_levels();
        let below = resolve_level(money("999.99"), &levels).unwrap();
        assert_eq!(below.level_code.as_str(), "BASE");

        let at = resolve_level(money("1000.00"), &levels).unwrap();
        assert_eq!(at.level_code.as_str(), "SILVER");

        let above = resolve_level(money("123456.78"), &levels).unwrap();
        assert_eq!(above.level_code.as_str(), "SILVER");
    }

    #[test]
    fn test_resolve_level_empty() {
        let err = resolve_level(Money::ZERO, &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidLevels);
    }

    #[test]
    fn test_evaluate_earn_uses_level_before_purchase() {
        let ruleset = Ruleset {
            id: 1,
            effective_from: Utc::now(),
            base_rub_per_point: money("10"),
            // 故意乱序，evaluate_earn 会先排序
            levels: vec![level("SILVER", "1000", "10"), level("BASE", "0", "5")],
            created_by: None,
            created_at: Utc::now(),
        };

        // 消费前 900（BASE 5%），消费 200 后 1100（SILVER）
        let eval = evaluate_earn(&ruleset, money("900"), money("200")).unwrap();
        assert_eq!(eval.level_before.level_code.as_str(), "BASE");
        assert_eq!(eval.level_after.level_code.as_str(), "SILVER");
        // floor(200 / 10) = 20, floor(20 * 5 / 100) = 1
        assert_eq!(eval.earned_points, Points::new(1));
    }

    #[test]
    fn test_evaluate_earn_rejects_invalid_levels() {
        let ruleset = Ruleset {
            id: 1,
            effective_from: Utc::now(),
            base_rub_per_point: money("10"),
            levels: vec![level("SILVER", "1000", "10")],
            created_by: None,
            created_at: Utc::now(),
        };
        let err = evaluate_earn(&ruleset, Money::ZERO, money("10")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidLevels);
    }
}
