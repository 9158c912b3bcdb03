//! 服务层数据传输对象
//!
//! 定义服务层与外部交互使用的 DTO，与内部领域模型解耦。
//! 金额一律序列化为两位小数的字符串。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Account, LedgerEvent, LevelCode, Money, OperationType, Points, PublicCode};

/// 消费赚取积分请求
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EarnRequest {
    /// 客户端生成的幂等操作 ID
    pub operation_id: String,
    pub public_code: String,
    /// 消费金额，如 "105.00"
    pub amount_money: String,
    /// 业务时间，缺省为当前时间
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<DateTime<Utc>>,
}

/// 花费积分请求
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendRequest {
    pub operation_id: String,
    pub public_code: String,
    pub amount_points: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<DateTime<Utc>>,
}

/// 操作后的余额视图
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceDto {
    pub account_id: i64,
    pub public_code: PublicCode,
    pub balance_points: Points,
    pub total_spend_money: Money,
    pub level_code: LevelCode,
    pub as_of: DateTime<Utc>,
}

impl BalanceDto {
    pub fn from_account(account: &Account, as_of: DateTime<Utc>) -> Self {
        Self {
            account_id: account.id,
            public_code: account.public_code.clone(),
            balance_points: account.balance_points,
            total_spend_money: account.total_spend_money,
            level_code: account.level_code.clone(),
            as_of,
        }
    }
}

/// 赚取/花费结果
///
/// 规范化载荷会写入幂等记录，回放时原样返回并把 `replayed` 置为 true
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResponse {
    pub operation_id: String,
    pub op_type: OperationType,
    pub event: LedgerEvent,
    pub balance: BalanceDto,
    pub replayed: bool,
}

/// 账户摘要
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummaryDto {
    pub id: i64,
    pub public_code: PublicCode,
    pub balance_points: Points,
    pub total_spend_money: Money,
    pub level_code: LevelCode,
    pub created_at: DateTime<Utc>,
}

impl From<Account> for AccountSummaryDto {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            public_code: account.public_code,
            balance_points: account.balance_points,
            total_spend_money: account.total_spend_money,
            level_code: account.level_code,
            created_at: account.created_at,
        }
    }
}

/// 流水分页查询参数
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsQuery {
    /// 缺省或非正数时使用默认条数，超过上限时截断
    #[serde(default)]
    pub limit: Option<i64>,
    /// 只返回业务时间早于该值的流水
    #[serde(default)]
    pub before_ts: Option<DateTime<Utc>>,
}

/// 流水分页结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsPage {
    pub items: Vec<LedgerEvent>,
    /// 取满一页时为最后一条的业务时间，否则为空
    pub next_before_ts: Option<DateTime<Utc>>,
}

/// 等级规则输入
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelRuleInput {
    pub level_code: String,
    pub threshold_total_spend: String,
    pub percent_earn: String,
}

/// 创建规则集请求
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRulesetRequest {
    pub effective_from: DateTime<Utc>,
    pub base_rub_per_point: String,
    pub levels: Vec<LevelRuleInput>,
}
