//! 幂等操作记录
//!
//! 以 (账户, 操作类型, 客户端操作 ID) 为键。先以"待定"状态插入（仅含请求快照），
//! 之后写入结果码与规范化的结果载荷（成功结果或被拒绝的业务错误）。

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::enums::OperationType;
use crate::error::{LedgerError, Result};

/// 成功结果码
pub const STATUS_SUCCEEDED: i32 = 200;
/// 业务拒绝结果码
pub const STATUS_REJECTED: i32 = 409;

/// 客户端操作 ID 最大长度
pub const MAX_OPERATION_ID_LEN: usize = 128;

/// 校验并规范化客户端操作 ID
pub fn validate_operation_id(raw: &str) -> Result<String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(LedgerError::InvalidOperationId("操作 ID 不能为空".to_string()));
    }
    if value.chars().count() > MAX_OPERATION_ID_LEN {
        return Err(LedgerError::InvalidOperationId(format!(
            "操作 ID 长度不能超过 {MAX_OPERATION_ID_LEN}"
        )));
    }
    Ok(value.to_string())
}

/// 幂等键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationKey {
    pub account_id: i64,
    pub op_type: OperationType,
    pub operation_id: String,
}

/// 待插入的"待定"记录
#[derive(Debug, Clone)]
pub struct PendingOperation {
    pub key: OperationKey,
    pub request_json: Value,
}

/// 最终结果
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutcome {
    /// 200，载荷为规范化的成功结果
    Succeeded(Value),
    /// 409，载荷为 `{code, msg}`
    Rejected(Value),
}

impl OperationOutcome {
    pub fn status_code(&self) -> i32 {
        match self {
            Self::Succeeded(_) => STATUS_SUCCEEDED,
            Self::Rejected(_) => STATUS_REJECTED,
        }
    }

    pub fn payload(&self) -> &Value {
        match self {
            Self::Succeeded(v) | Self::Rejected(v) => v,
        }
    }
}

/// 幂等操作记录
#[derive(Debug, Clone, PartialEq)]
pub struct OperationRecord {
    pub key: OperationKey,
    pub request_json: Value,
    pub status_code: Option<i32>,
    pub response_json: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub finalized_at: Option<DateTime<Utc>>,
}

impl OperationRecord {
    pub fn is_finalized(&self) -> bool {
        self.status_code.is_some()
    }

    /// 解析最终结果
    ///
    /// 未完成时返回 `None`；结果码或载荷不合法视为数据损坏
    pub fn outcome(&self) -> Result<Option<OperationOutcome>> {
        let Some(status) = self.status_code else {
            return Ok(None);
        };
        let payload = self.response_json.clone().ok_or_else(|| {
            LedgerError::Corruption(format!(
                "操作 {} 已完成但缺少结果载荷",
                self.key.operation_id
            ))
        })?;
        match status {
            STATUS_SUCCEEDED => Ok(Some(OperationOutcome::Succeeded(payload))),
            STATUS_REJECTED => Ok(Some(OperationOutcome::Rejected(payload))),
            other => Err(LedgerError::Corruption(format!(
                "操作 {} 的结果码未知: {other}",
                self.key.operation_id
            ))),
        }
    }
}
