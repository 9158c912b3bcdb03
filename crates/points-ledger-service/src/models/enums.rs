//! 积分账本枚举类型定义
//!
//! 所有枚举都支持数据库（sqlx）和 JSON（serde）序列化

use serde::{Deserialize, Serialize};

/// 流水事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// 消费赚取积分
    Earn,
    /// 花费积分
    Spend,
}

/// 幂等操作类型
///
/// 幂等键由 (账户, 操作类型, 操作 ID) 组成，同一操作 ID 在赚取与花费之间互不冲突
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    Earn,
    Spend,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Earn => "EARN",
            Self::Spend => "SPEND",
        }
    }

    /// 对应的流水事件类型
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Earn => EventType::Earn,
            Self::Spend => EventType::Spend,
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
