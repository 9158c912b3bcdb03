//! 积分账户聚合
//!
//! 账户只通过 [`Account::apply_earn`] 与 [`Account::apply_spend`] 变更。
//! 两者都是纯函数：校验前置条件后返回新的账户值和一份待持久化的流水草稿，
//! 不会出现部分变更，也从不访问存储。

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ledger::EventDraft;
use super::money::{Money, Points};
use super::ruleset::LevelCode;
use crate::error::{LedgerError, Result};

/// 账户公开码
///
/// 面向顾客的不可猜测标识（UUID），统一保存为小写带连字符的规范形式
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PublicCode(String);

impl PublicCode {
    pub fn parse(raw: &str) -> Result<Self> {
        let value = raw.trim();
        let uuid = Uuid::parse_str(value)
            .map_err(|_| LedgerError::InvalidPublicCode(format!("'{value}' 不是合法的 UUID")))?;
        Ok(Self(uuid.hyphenated().to_string()))
    }

    /// 生成新的随机公开码
    pub fn generate() -> Self {
        Self(Uuid::new_v4().hyphenated().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PublicCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PublicCode {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<PublicCode> for String {
    fn from(value: PublicCode) -> Self {
        value.0
    }
}

/// 积分账户
///
/// 不变量：余额等于该账户全部流水增量之和且不为负；累计消费单调不减
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: i64,
    pub public_code: PublicCode,
    pub balance_points: Points,
    pub total_spend_money: Money,
    pub level_code: LevelCode,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// 检查是否可以花费指定积分
    pub fn can_spend(&self, points: Points) -> Result<()> {
        if points.value() <= 0 {
            return Err(LedgerError::InvalidPoints(format!(
                "花费积分必须大于 0: {points}"
            )));
        }
        if points > self.balance_points {
            return Err(LedgerError::NotEnoughBalance(format!(
                "需要 {points}, 可用 {}",
                self.balance_points
            )));
        }
        Ok(())
    }

    /// 花费积分
    ///
    /// 成功时余额减少 `points`，流水增量为其相反数，余额快照为扣减后的余额
    pub fn apply_spend(
        &self,
        points: Points,
        actor_user_id: Option<i64>,
        ts: DateTime<Utc>,
    ) -> Result<(Account, EventDraft)> {
        self.can_spend(points)?;

        let balance_after = self.balance_points.checked_sub(points)?;
        let delta = points.negate()?;

        let next = Account {
            balance_points: balance_after,
            ..self.clone()
        };
        let draft = EventDraft::spend(self.id, delta, balance_after, actor_user_id, ts);

        Ok((next, draft))
    }

    /// 消费赚取积分
    ///
    /// 余额增加赚取积分，累计消费增加消费金额，等级覆盖为调用方解析出的新等级
    pub fn apply_earn(
        &self,
        earned_points: Points,
        purchase_amount: Money,
        new_level: LevelCode,
        ruleset_id: Option<i64>,
        actor_user_id: Option<i64>,
        ts: DateTime<Utc>,
    ) -> Result<(Account, EventDraft)> {
        if earned_points.value() < 0 {
            return Err(LedgerError::InvalidPoints(format!(
                "赚取积分不能为负: {earned_points}"
            )));
        }
        if purchase_amount.is_negative() {
            return Err(LedgerError::InvalidPurchaseAmount(format!(
                "消费金额不能为负: {purchase_amount}"
            )));
        }

        let balance_after = self.balance_points.checked_add(earned_points)?;
        let total_spend = self.total_spend_money.checked_add(purchase_amount)?;

        let next = Account {
            balance_points: balance_after,
            total_spend_money: total_spend,
            level_code: new_level,
            ..self.clone()
        };
        let draft = EventDraft::earn(
            self.id,
            earned_points,
            balance_after,
            purchase_amount,
            ruleset_id,
            actor_user_id,
            ts,
        );

        Ok((next, draft))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::enums::EventType;

    fn account(balance: i64, total_spend: &str) -> Account {
        Account {
            id: 7,
            public_code: PublicCode::generate(),
            balance_points: Points::new(balance),
            total_spend_money: Money::parse(total_spend).unwrap(),
            level_code: LevelCode::new("BASE"),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_public_code_parse() {
        let code = PublicCode::parse(" 6F9619FF-8B86-D011-B42D-00C04FC964FF ").unwrap();
        assert_eq!(code.as_str(), "6f9619ff-8b86-d011-b42d-00c04fc964ff");

        let err = PublicCode::parse("not-a-code").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPublicCode);
    }

    #[test]
    fn test_public_code_generate_is_unique() {
        assert_ne!(PublicCode::generate(), PublicCode::generate());
    }

    #[test]
    fn test_can_spend() {
        let acc = account(100, "0");
        assert!(acc.can_spend(Points::new(100)).is_ok());
        assert_eq!(
            acc.can_spend(Points::new(101)).unwrap_err().kind(),
            ErrorKind::NotEnoughBalance
        );
        assert_eq!(
            acc.can_spend(Points::new(0)).unwrap_err().kind(),
            ErrorKind::InvalidPoints
        );
        assert_eq!(
            acc.can_spend(Points::new(-5)).unwrap_err().kind(),
            ErrorKind::InvalidPoints
        );
    }

    #[test]
    fn test_apply_spend() {
        let acc = account(100, "50.00");
        let ts = Utc::now();
        let (next, draft) = acc.apply_spend(Points::new(60), Some(3), ts).unwrap();

        assert_eq!(next.balance_points, Points::new(40));
        assert_eq!(next.total_spend_money, acc.total_spend_money);
        assert_eq!(draft.event_type, EventType::Spend);
        assert_eq!(draft.delta_points, Points::new(-60));
        assert_eq!(draft.balance_after, Points::new(40));
        assert_eq!(draft.amount_money, None);
        assert_eq!(draft.ruleset_id, None);
        assert_eq!(draft.actor_user_id, Some(3));
        assert_eq!(draft.ts, ts);
        // 原值不受影响
        assert_eq!(acc.balance_points, Points::new(100));
    }

    #[test]
    fn test_apply_spend_insufficient_balance() {
        let acc = account(40, "0");
        let err = acc.apply_spend(Points::new(60), None, Utc::now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotEnoughBalance);
    }

    #[test]
    fn test_apply_earn() {
        let acc = account(10, "990.00");
        let purchase = Money::parse("20.00").unwrap();
        let (next, draft) = acc
            .apply_earn(
                Points::new(5),
                purchase,
                LevelCode::new("SILVER"),
                Some(11),
                Some(3),
                Utc::now(),
            )
            .unwrap();

        assert_eq!(next.balance_points, Points::new(15));
        assert_eq!(next.total_spend_money, Money::parse("1010.00").unwrap());
        assert_eq!(next.level_code, LevelCode::new("SILVER"));
        assert_eq!(draft.event_type, EventType::Earn);
        assert_eq!(draft.delta_points, Points::new(5));
        assert_eq!(draft.balance_after, Points::new(15));
        assert_eq!(draft.amount_money, Some(purchase));
        assert_eq!(draft.ruleset_id, Some(11));
    }

    #[test]
    fn test_apply_earn_rejects_negative_inputs() {
        let acc = account(10, "0");
        let err = acc
            .apply_earn(
                Points::new(-1),
                Money::ZERO,
                LevelCode::new("BASE"),
                None,
                None,
                Utc::now(),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPoints);

        let err = acc
            .apply_earn(
                Points::new(1),
                Money::parse("-1.00").unwrap(),
                LevelCode::new("BASE"),
                None,
                None,
                Utc::now(),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPurchaseAmount);
    }
}
