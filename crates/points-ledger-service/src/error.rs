//! 积分账本错误类型
//!
//! 定义领域校验错误、业务拒绝与系统错误。每个错误都映射到一个封闭的
//! [`ErrorKind`]，其字符串错误码是对外契约，也是幂等缓存中记录的内容。

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 错误种类（封闭集合，错误码稳定）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidPublicCode,
    InvalidOperationId,
    InvalidMoney,
    InvalidPoints,
    InvalidPurchaseAmount,
    NotEnoughBalance,
    InvalidRuleset,
    InvalidLevels,
    AccountNotFound,
    #[serde(rename = "INTERNAL_ERROR")]
    Internal,
}

impl ErrorKind {
    /// 错误码字符串（与 JSON 序列化结果一致）
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidPublicCode => "INVALID_PUBLIC_CODE",
            Self::InvalidOperationId => "INVALID_OPERATION_ID",
            Self::InvalidMoney => "INVALID_MONEY",
            Self::InvalidPoints => "INVALID_POINTS",
            Self::InvalidPurchaseAmount => "INVALID_PURCHASE_AMOUNT",
            Self::NotEnoughBalance => "NOT_ENOUGH_BALANCE",
            Self::InvalidRuleset => "INVALID_RULESET",
            Self::InvalidLevels => "INVALID_LEVELS",
            Self::AccountNotFound => "ACCOUNT_NOT_FOUND",
            Self::Internal => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// 积分账本错误类型
#[derive(Debug, Error)]
pub enum LedgerError {
    // === 输入校验错误 ===
    #[error("公开码格式无效: {0}")]
    InvalidPublicCode(String),

    #[error("操作 ID 无效: {0}")]
    InvalidOperationId(String),

    #[error("金额格式无效: {0}")]
    InvalidMoney(String),

    #[error("积分数值无效: {0}")]
    InvalidPoints(String),

    #[error("消费金额无效: {0}")]
    InvalidPurchaseAmount(String),

    // === 业务规则错误 ===
    #[error("积分余额不足: {0}")]
    NotEnoughBalance(String),

    #[error("规则集无效: {0}")]
    InvalidRuleset(String),

    #[error("等级配置无效: {0}")]
    InvalidLevels(String),

    #[error("账户不存在: {0}")]
    AccountNotFound(String),

    // === 系统错误 ===
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON 序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("数据损坏: {0}")]
    Corruption(String),

    #[error("操作超时: {0}")]
    Timeout(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 积分账本 Result 类型别名
pub type Result<T> = std::result::Result<T, LedgerError>;

impl LedgerError {
    /// 由错误种类与消息重建错误（用于幂等回放）
    pub fn from_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::InvalidPublicCode => Self::InvalidPublicCode(message),
            ErrorKind::InvalidOperationId => Self::InvalidOperationId(message),
            ErrorKind::InvalidMoney => Self::InvalidMoney(message),
            ErrorKind::InvalidPoints => Self::InvalidPoints(message),
            ErrorKind::InvalidPurchaseAmount => Self::InvalidPurchaseAmount(message),
            ErrorKind::NotEnoughBalance => Self::NotEnoughBalance(message),
            ErrorKind::InvalidRuleset => Self::InvalidRuleset(message),
            ErrorKind::InvalidLevels => Self::InvalidLevels(message),
            ErrorKind::AccountNotFound => Self::AccountNotFound(message),
            ErrorKind::Internal => Self::Internal(message),
        }
    }

    /// 错误种类
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidPublicCode(_) => ErrorKind::InvalidPublicCode,
            Self::InvalidOperationId(_) => ErrorKind::InvalidOperationId,
            Self::InvalidMoney(_) => ErrorKind::InvalidMoney,
            Self::InvalidPoints(_) => ErrorKind::InvalidPoints,
            Self::InvalidPurchaseAmount(_) => ErrorKind::InvalidPurchaseAmount,
            Self::NotEnoughBalance(_) => ErrorKind::NotEnoughBalance,
            Self::InvalidRuleset(_) => ErrorKind::InvalidRuleset,
            Self::InvalidLevels(_) => ErrorKind::InvalidLevels,
            Self::AccountNotFound(_) => ErrorKind::AccountNotFound,
            Self::Database(_)
            | Self::Serialization(_)
            | Self::Corruption(_)
            | Self::Timeout(_)
            | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// 获取错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        self.kind().code()
    }

    /// 不带前缀的错误消息（缓存与回放使用）
    pub fn message(&self) -> String {
        match self {
            Self::InvalidPublicCode(m)
            | Self::InvalidOperationId(m)
            | Self::InvalidMoney(m)
            | Self::InvalidPoints(m)
            | Self::InvalidPurchaseAmount(m)
            | Self::NotEnoughBalance(m)
            | Self::InvalidRuleset(m)
            | Self::InvalidLevels(m)
            | Self::AccountNotFound(m)
            | Self::Corruption(m)
            | Self::Timeout(m)
            | Self::Internal(m) => m.clone(),
            Self::Database(e) => e.to_string(),
            Self::Serialization(e) => e.to_string(),
        }
    }

    /// 检查是否为可重试的错误
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Timeout(_))
    }

    /// 检查是否为业务错误（非系统错误）
    pub fn is_business_error(&self) -> bool {
        self.kind() != ErrorKind::Internal
    }

    /// 是否在幂等键占用之后需要缓存为拒绝结果
    ///
    /// 这类错误发生时账户与流水都未改动，事务提交后回放返回同一错误。
    pub fn is_cacheable_rejection(&self) -> bool {
        matches!(
            self,
            Self::NotEnoughBalance(_)
                | Self::InvalidRuleset(_)
                | Self::InvalidLevels(_)
                | Self::InvalidPoints(_)
                | Self::InvalidPurchaseAmount(_)
                | Self::InvalidMoney(_)
        )
    }

    /// 是否为数据损坏（调用方可视为致命错误）
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corruption(_))
    }
}
