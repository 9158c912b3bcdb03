//! 幂等载荷编解码
//!
//! 幂等记录保存请求快照与规范化结果。成功结果是 [`OperationResponse`] 的 JSON，
//! 业务拒绝是 `{code, msg}`。回放时按原样解码，格式不合法即视为数据损坏。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::dto::OperationResponse;
use crate::error::{ErrorKind, LedgerError, Result};
use crate::models::{Money, OperationOutcome, OperationRecord, Points, PublicCode};

/// 缓存的业务拒绝
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedRejection {
    pub code: ErrorKind,
    pub msg: String,
}

impl From<&LedgerError> for CachedRejection {
    fn from(err: &LedgerError) -> Self {
        Self {
            code: err.kind(),
            msg: err.message(),
        }
    }
}

impl CachedRejection {
    pub fn into_error(self) -> LedgerError {
        LedgerError::from_kind(self.code, self.msg)
    }
}

/// 回放结果
#[derive(Debug)]
pub enum Replay {
    Succeeded(OperationResponse),
    Rejected(LedgerError),
}

/// 赚取请求快照
pub fn earn_request_snapshot(
    operation_id: &str,
    public_code: &PublicCode,
    amount: Money,
    ts: DateTime<Utc>,
) -> Value {
    json!({
        "operationId": operation_id,
        "publicCode": public_code,
        "amountMoney": amount,
        "ts": ts,
    })
}

/// 花费请求快照
pub fn spend_request_snapshot(
    operation_id: &str,
    public_code: &PublicCode,
    points: Points,
    ts: DateTime<Utc>,
) -> Value {
    json!({
        "operationId": operation_id,
        "publicCode": public_code,
        "amountPoints": points,
        "ts": ts,
    })
}

/// 编码成功结果（规范化载荷中 `replayed` 恒为 false）
pub fn success_outcome(response: &OperationResponse) -> Result<OperationOutcome> {
    let mut canonical = response.clone();
    canonical.replayed = false;
    Ok(OperationOutcome::Succeeded(serde_json::to_value(&canonical)?))
}

/// 编码业务拒绝
pub fn rejection_outcome(err: &LedgerError) -> Result<OperationOutcome> {
    Ok(OperationOutcome::Rejected(serde_json::to_value(
        CachedRejection::from(err),
    )?))
}

/// 解码幂等记录用于回放
///
/// 记录未完成说明先前的尝试中途崩溃，作为内部错误返回，不做自动恢复
pub fn decode_replay(record: &OperationRecord) -> Result<Replay> {
    let outcome = record.outcome()?.ok_or_else(|| {
        LedgerError::Internal(format!(
            "操作 {} 仍处于待定状态",
            record.key.operation_id
        ))
    })?;

    match outcome {
        OperationOutcome::Succeeded(payload) => {
            let mut response: OperationResponse =
                serde_json::from_value(payload).map_err(|e| {
                    LedgerError::Corruption(format!(
                        "操作 {} 的成功载荷无法解析: {e}",
                        record.key.operation_id
                    ))
                })?;
            response.replayed = true;
            Ok(Replay::Succeeded(response))
        }
        OperationOutcome::Rejected(payload) => {
            let cached: CachedRejection = serde_json::from_value(payload).map_err(|e| {
                LedgerError::Corruption(format!(
                    "操作 {} 的拒绝载荷无法解析: {e}",
                    record.key.operation_id
                ))
            })?;
            Ok(Replay::Rejected(cached.into_error()))
        }
    }
}
