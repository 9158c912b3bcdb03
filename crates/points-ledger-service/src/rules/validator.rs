//! 等级规则校验
//!
//! 创建规则集时校验一次，每次解析等级前再校验一次。

use std::collections::HashSet;

use crate::error::{LedgerError, Result};
use crate::models::{LevelRule, Money};

/// 等级编码最大长度
pub const MAX_LEVEL_CODE_LEN: usize = 64;

/// 校验等级集合
///
/// 要求：至少一个等级；编码非空且唯一；门槛非负且唯一；百分比大于 0；
/// 必须存在门槛为 0 的基础等级
pub fn validate_levels(levels: &[LevelRule]) -> Result<()> {
    if levels.is_empty() {
        return Err(LedgerError::InvalidLevels("至少需要一个等级".to_string()));
    }

    let mut codes = HashSet::with_capacity(levels.len());
    let mut thresholds = HashSet::with_capacity(levels.len());
    let mut has_baseline = false;

    for level in levels {
        let code = level.level_code.as_str();
        if code.trim().is_empty() {
            return Err(LedgerError::InvalidLevels("等级编码不能为空".to_string()));
        }
        if code.chars().count() > MAX_LEVEL_CODE_LEN {
            return Err(LedgerError::InvalidLevels(format!(
                "等级编码长度不能超过 {MAX_LEVEL_CODE_LEN}: {code}"
            )));
        }
        if !codes.insert(code) {
            return Err(LedgerError::InvalidLevels(format!("等级编码重复: {code}")));
        }

        let threshold = level.threshold_total_spend;
        if threshold.is_negative() {
            return Err(LedgerError::InvalidLevels(format!(
                "等级 {code} 的门槛不能为负: {threshold}"
            )));
        }
        if !thresholds.insert(threshold) {
            return Err(LedgerError::InvalidLevels(format!(
                "等级门槛重复: {threshold}"
            )));
        }
        if threshold == Money::ZERO {
            has_baseline = true;
        }

        if !level.percent_earn.is_positive() {
            return Err(LedgerError::InvalidLevels(format!(
                "等级 {code} 的赚取百分比必须大于 0: {}",
                level.percent_earn
            )));
        }
    }

    if !has_baseline {
        return Err(LedgerError::InvalidLevels(
            "缺少门槛为 0 的基础等级".to_string(),
        ));
    }

    Ok(())
}

/// 按门槛升序排序（返回副本）
pub fn sort_levels(levels: &[LevelRule]) -> Vec<LevelRule> {
    let mut sorted = levels.to_vec();
    sorted.sort_by(|a, b| a.threshold_total_spend.cmp(&b.threshold_total_spend));
    sorted
}

/// 校验并排序
pub fn prepare_levels(levels: &[LevelRule]) -> Result<Vec<LevelRule>> {
    validate_levels(levels)?;
    Ok(sort_levels(levels))
}

/// 校验基础兑换率（每积分卢布数必须大于 0）
pub fn validate_base_rate(base_rub_per_point: Money) -> Result<()> {
    if !base_rub_per_point.is_positive() {
        return Err(LedgerError::InvalidMoney(format!(
            "每积分卢布数必须大于 0: {base_rub_per_point}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::{LevelCode, Percent};

    fn level(code: &str, threshold: &str, pct: &str) -> LevelRule {
        LevelRule {
            id: 0,
            level_code: LevelCode::new(code),
            threshold_total_spend: Money::parse(threshold).unwrap(),
            percent_earn: Percent::parse(pct).unwrap(),
        }
    }

    fn assert_invalid(levels: &[LevelRule]) {
        let err = validate_levels(levels).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidLevels, "{err}");
    }

    #[test]
    fn test_valid_levels() {
        let levels = vec![level("GOLD", "5000", "10"), level("BASE", "0", "5")];
        assert!(validate_levels(&levels).is_ok());
    }

    #[test]
    fn test_rejects_empty() {
        assert_invalid(&[]);
    }

    #[test]
    fn test_rejects_duplicate_threshold() {
        assert_invalid(&[
            level("BASE", "0", "5"),
            level("SILVER", "1000", "7"),
            level("GOLD", "1000.00", "10"),
        ]);
    }

    #[test]
    fn test_rejects_duplicate_code() {
        assert_invalid(&[level("BASE", "0", "5"), level("BASE", "1000", "7")]);
    }

    #[test]
    fn test_rejects_non_positive_percent() {
        assert_invalid(&[level("BASE", "0", "0")]);
        assert_invalid(&[level("BASE", "0", "5"), level("GOLD", "100", "-1")]);
    }

    #[test]
    fn test_rejects_missing_baseline() {
        assert_invalid(&[level("SILVER", "100", "5"), level("GOLD", "1000", "10")]);
    }

    #[test]
    fn test_rejects_negative_threshold_and_blank_code() {
        assert_invalid(&[level("BASE", "0", "5"), level("NEG", "-1", "5")]);
        assert_invalid(&[level("  ", "0", "5")]);
    }

    #[test]
    fn test_sort_levels() {
        let levels = vec![
            level("GOLD", "5000", "10"),
            level("BASE", "0", "5"),
            level("SILVER", "1000", "7"),
        ];
        let sorted = sort_levels(&levels);
        let codes: Vec<&str> = sorted.iter().map(|l| l.level_code.as_str()).collect();
        assert_eq!(codes, vec!["BASE", "SILVER", "GOLD"]);
        // 原切片不变
        assert_eq!(levels[0].level_code.as_str(), "GOLD");
    }

    #[test]
    fn test_validate_base_rate() {
        assert!(validate_base_rate(Money::parse("10").unwrap()).is_ok());
        assert_eq!(
            validate_base_rate(Money::ZERO).unwrap_err().kind(),
            ErrorKind::InvalidMoney
        );
    }
}
