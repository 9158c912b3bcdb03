//! 积分流水
//!
//! 流水只追加、持久化后不可变。每次成功的赚取/花费恰好产生一条流水，
//! 其中的余额快照可用于还原任意时点的余额。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::EventType;
use super::money::{Money, Points};

/// 待持久化的流水草稿（由账户聚合产生）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDraft {
    pub account_id: i64,
    pub event_type: EventType,
    /// 带符号的积分增量（花费为负）
    pub delta_points: Points,
    /// 本次变动后的余额快照
    pub balance_after: Points,
    /// 消费金额（仅赚取）
    pub amount_money: Option<Money>,
    /// 计算所用的规则集（仅赚取）
    pub ruleset_id: Option<i64>,
    pub actor_user_id: Option<i64>,
    /// 业务时间
    pub ts: DateTime<Utc>,
}

impl EventDraft {
    pub fn earn(
        account_id: i64,
        delta_points: Points,
        balance_after: Points,
        amount_money: Money,
        ruleset_id: Option<i64>,
        actor_user_id: Option<i64>,
        ts: DateTime<Utc>,
    ) -> Self {
        Self {
            account_id,
            event_type: EventType::Earn,
            delta_points,
            balance_after,
            amount_money: Some(amount_money),
            ruleset_id,
            actor_user_id,
            ts,
        }
    }

    pub fn spend(
        account_id: i64,
        delta_points: Points,
        balance_after: Points,
        actor_user_id: Option<i64>,
        ts: DateTime<Utc>,
    ) -> Self {
        Self {
            account_id,
            event_type: EventType::Spend,
            delta_points,
            balance_after,
            amount_money: None,
            ruleset_id: None,
            actor_user_id,
            ts,
        }
    }

    /// 附加存储分配的标识，得到已持久化的流水
    pub fn into_event(self, id: i64, created_at: DateTime<Utc>) -> LedgerEvent {
        LedgerEvent {
            id,
            account_id: self.account_id,
            event_type: self.event_type,
            delta_points: self.delta_points,
            balance_after: self.balance_after,
            amount_money: self.amount_money,
            ruleset_id: self.ruleset_id,
            actor_user_id: self.actor_user_id,
            ts: self.ts,
            created_at,
        }
    }
}

/// 已持久化的积分流水
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEvent {
    pub id: i64,
    pub account_id: i64,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub delta_points: Points,
    pub balance_after: Points,
    pub amount_money: Option<Money>,
    pub ruleset_id: Option<i64>,
    pub actor_user_id: Option<i64>,
    pub ts: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
