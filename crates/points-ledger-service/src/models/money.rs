//! 金额、积分与百分比值类型
//!
//! 金额与百分比使用定点小数（最多两位小数），序列化为固定两位小数的字符串；
//! 积分是 64 位整数。所有算术都经过溢出检查。

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};

/// 金额与百分比允许的最大小数位数
pub const MAX_SCALE: u32 = 2;

/// 金额整数部分最多位数，对应 NUMERIC(14,2)
pub const MONEY_INTEGER_DIGITS: u32 = 12;

/// 百分比整数部分最多位数，对应 NUMERIC(7,2)
pub const PERCENT_INTEGER_DIGITS: u32 = 5;

/// 定点小数字段的取值范围
#[derive(Debug, Clone, Copy)]
struct Bounds {
    field: &'static str,
    integer_digits: u32,
}

const MONEY_BOUNDS: Bounds = Bounds {
    field: "金额",
    integer_digits: MONEY_INTEGER_DIGITS,
};

const PERCENT_BOUNDS: Bounds = Bounds {
    field: "百分比",
    integer_digits: PERCENT_INTEGER_DIGITS,
};

impl Bounds {
    fn parse(self, raw: &str) -> Result<Decimal> {
        let value = raw.trim();
        if value.is_empty() {
            return Err(LedgerError::InvalidMoney(format!("{} 不能为空", self.field)));
        }
        let decimal = Decimal::from_str(value).map_err(|e| {
            LedgerError::InvalidMoney(format!("{} 无法解析 '{value}': {e}", self.field))
        })?;
        self.check(decimal)
    }

    fn check(self, decimal: Decimal) -> Result<Decimal> {
        if decimal.scale() > MAX_SCALE {
            return Err(LedgerError::InvalidMoney(format!(
                "{} 最多 {MAX_SCALE} 位小数: {decimal}",
                self.field
            )));
        }
        let limit = Decimal::from(10_i64.pow(self.integer_digits));
        if decimal.abs() >= limit {
            return Err(LedgerError::InvalidMoney(format!(
                "{} 整数部分最多 {} 位: {decimal}",
                self.field, self.integer_digits
            )));
        }
        Ok(decimal)
    }
}

fn fixed_two(decimal: Decimal) -> String {
    let mut d = decimal;
    d.rescale(MAX_SCALE);
    d.to_string()
}

// ==================== Money ====================

/// 金额（卢布）
///
/// 不变量：小数位不超过两位，整数部分不超过 12 位。可以为负数，语义校验（如消费金额非负）由调用方负责。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// 从十进制字符串解析，如 "105.50"
    pub fn parse(raw: &str) -> Result<Self> {
        MONEY_BOUNDS.parse(raw).map(Self)
    }

    /// 从已有的定点小数构造
    pub fn from_decimal(value: Decimal) -> Result<Self> {
        MONEY_BOUNDS.check(value).map(Self)
    }

    /// 以整数卢布构造，调用方保证不超过金额范围
    pub fn from_major(units: i64) -> Self {
        Self(Decimal::from(units))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    pub fn checked_add(self, other: Money) -> Result<Money> {
        self.0
            .checked_add(other.0)
            .ok_or_else(|| LedgerError::InvalidMoney(format!("金额相加溢出: {self} + {other}")))
            .and_then(|sum| MONEY_BOUNDS.check(sum))
            .map(Money)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&fixed_two(self.0))
    }
}

impl FromStr for Money {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Money {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Money> for String {
    fn from(value: Money) -> Self {
        value.to_string()
    }
}

// ==================== Points ====================

/// 积分（整数）
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Points(i64);

impl Points {
    pub const ZERO: Points = Points(0);

    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// 要求为正数（消费积分）
    pub fn positive(value: i64) -> Result<Self> {
        if value <= 0 {
            return Err(LedgerError::InvalidPoints(format!("积分必须大于 0: {value}")));
        }
        Ok(Self(value))
    }

    /// 要求非负（余额、赚取积分）
    pub fn non_negative(value: i64) -> Result<Self> {
        if value < 0 {
            return Err(LedgerError::InvalidPoints(format!("积分不能为负: {value}")));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn checked_add(self, other: Points) -> Result<Points> {
        self.0
            .checked_add(other.0)
            .map(Points)
            .ok_or_else(|| LedgerError::InvalidPoints(format!("积分相加溢出: {self} + {other}")))
    }

    pub fn checked_sub(self, other: Points) -> Result<Points> {
        self.0
            .checked_sub(other.0)
            .map(Points)
            .ok_or_else(|| LedgerError::InvalidPoints(format!("积分相减溢出: {self} - {other}")))
    }

    pub fn negate(self) -> Result<Points> {
        self.0
            .checked_neg()
            .map(Points)
            .ok_or_else(|| LedgerError::InvalidPoints(format!("积分取反溢出: {self}")))
    }
}

impl fmt::Display for Points {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ==================== Percent ====================

/// 赚取百分比（如 "5.00" 表示 5%）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Percent(Decimal);

impl Percent {
    pub fn parse(raw: &str) -> Result<Self> {
        PERCENT_BOUNDS.parse(raw).map(Self)
    }

    pub fn from_decimal(value: Decimal) -> Result<Self> {
        PERCENT_BOUNDS.check(value).map(Self)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }
}

impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&fixed_two(self.0))
    }
}

impl TryFrom<String> for Percent {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Percent> for String {
    fn from(value: Percent) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_money_parse_and_format() {
        assert_eq!(Money::parse("105").unwrap().to_string(), "105.00");
        assert_eq!(Money::parse("105.5").unwrap().to_string(), "105.50");
        assert_eq!(Money::parse(" 0.01 ").unwrap().to_string(), "0.01");
        assert_eq!(Money::parse("-3.20").unwrap().to_string(), "-3.20");
        assert_eq!(Money::ZERO.to_string(), "0.00");
    }

    #[test]
    fn test_money_rejects_extra_precision() {
        let err = Money::parse("1.005").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidMoney);
        assert_eq!(Money::parse("abc").unwrap_err().kind(), ErrorKind::InvalidMoney);
        assert_eq!(Money::parse("").unwrap_err().kind(), ErrorKind::InvalidMoney);
    }

    #[test]
    fn test_money_integer_digits_follow_column_range() {
        assert_eq!(
            Money::parse("999999999999.99").unwrap().to_string(),
            "999999999999.99"
        );
        assert!(Money::parse("-999999999999.99").is_ok());
        assert_eq!(
            Money::parse("1000000000000.00").unwrap_err().kind(),
            ErrorKind::InvalidMoney
        );
        assert_eq!(
            Money::parse("-1000000000000").unwrap_err().kind(),
            ErrorKind::InvalidMoney
        );
        let huge = Decimal::from(10_i64.pow(MONEY_INTEGER_DIGITS));
        assert_eq!(Money::from_decimal(huge).unwrap_err().kind(), ErrorKind::InvalidMoney);
    }

    #[test]
    fn test_money_sum_beyond_range_is_invalid() {
        let max = Money::parse("999999999999.99").unwrap();
        let err = max.checked_add(Money::parse("0.01").unwrap()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidMoney);
        assert_eq!(
            max.checked_add(Money::parse("-0.99").unwrap()).unwrap().to_string(),
            "999999999999.00"
        );
    }

    #[test]
    fn test_money_equality_ignores_trailing_zeros() {
        assert_eq!(Money::parse("10").unwrap(), Money::parse("10.00").unwrap());
        assert!(Money::parse("10.01").unwrap() > Money::parse("10").unwrap());
    }

    #[test]
    fn test_money_sign() {
        assert!(Money::parse("-0.01").unwrap().is_negative());
        assert!(!Money::ZERO.is_negative());
        assert!(!Money::ZERO.is_positive());
        assert!(Money::parse("0.01").unwrap().is_positive());
    }

    #[test]
    fn test_money_serde_as_fixed_string() {
        let money = Money::parse("7.5").unwrap();
        assert_eq!(serde_json::to_string(&money).unwrap(), "\"7.50\"");
        let back: Money = serde_json::from_str("\"7.50\"").unwrap();
        assert_eq!(back, money);
        assert!(serde_json::from_str::<Money>("\"7.505\"").is_err());
    }

    #[test]
    fn test_points_arithmetic() {
        let a = Points::new(100);
        assert_eq!(a.checked_sub(Points::new(60)).unwrap(), Points::new(40));
        assert_eq!(a.checked_add(Points::new(5)).unwrap(), Points::new(105));
        assert_eq!(a.negate().unwrap(), Points::new(-100));
        assert_eq!(
            Points::new(i64::MAX).checked_add(Points::new(1)).unwrap_err().kind(),
            ErrorKind::InvalidPoints
        );
    }

    #[test]
    fn test_points_constructors() {
        assert!(Points::positive(1).is_ok());
        assert_eq!(Points::positive(0).unwrap_err().kind(), ErrorKind::InvalidPoints);
        assert!(Points::non_negative(0).is_ok());
        assert_eq!(Points::non_negative(-1).unwrap_err().kind(), ErrorKind::InvalidPoints);
    }

    #[test]
    fn test_percent() {
        let pct = Percent::parse("5").unwrap();
        assert!(pct.is_positive());
        assert_eq!(pct.to_string(), "5.00");
        assert!(!Percent::parse("0").unwrap().is_positive());
        assert!(Percent::parse("1.234").is_err());
        assert!(Percent::parse("99999.99").is_ok());
        assert_eq!(Percent::parse("100000").unwrap_err().kind(), ErrorKind::InvalidMoney);
    }
}
