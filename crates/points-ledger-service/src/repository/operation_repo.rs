//! 幂等操作日志仓储（PostgreSQL）

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::traits::OperationLog;
use super::tx::PgTx;
use crate::error::{LedgerError, Result};
use crate::models::{
    OperationKey, OperationOutcome, OperationRecord, OperationType, PendingOperation,
};

#[derive(Debug, sqlx::FromRow)]
struct OperationRow {
    account_id: i64,
    op_type: OperationType,
    operation_id: String,
    request_json: Value,
    status_code: Option<i32>,
    response_json: Option<Value>,
    created_at: DateTime<Utc>,
    finalized_at: Option<DateTime<Utc>>,
}

impl From<OperationRow> for OperationRecord {
    fn from(row: OperationRow) -> Self {
        OperationRecord {
            key: OperationKey {
                account_id: row.account_id,
                op_type: row.op_type,
                operation_id: row.operation_id,
            },
            request_json: row.request_json,
            status_code: row.status_code,
            response_json: row.response_json,
            created_at: row.created_at,
            finalized_at: row.finalized_at,
        }
    }
}

/// 幂等操作日志仓储
#[derive(Debug, Clone, Copy, Default)]
pub struct OperationRepository;

impl OperationRepository {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl OperationLog<PgTx> for OperationRepository {
    async fn get(&self, tx: &mut PgTx, key: &OperationKey) -> Result<Option<OperationRecord>> {
        let row = sqlx::query_as::<_, OperationRow>(
            r#"
            SELECT account_id, op_type, operation_id, request_json, status_code,
                   response_json, created_at, finalized_at
            FROM operations
            WHERE account_id = $1 AND op_type = $2 AND operation_id = $3
            "#,
        )
        .bind(key.account_id)
        .bind(key.op_type)
        .bind(&key.operation_id)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(row.map(OperationRecord::from))
    }

    /// 冲突时跳过的插入，是幂等键的准入关口
    ///
    /// 并发的同键插入会阻塞到先到者的事务结束，之后只有一方看到 `true`
    async fn insert_pending(&self, tx: &mut PgTx, pending: &PendingOperation) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO operations (account_id, op_type, operation_id, request_json)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (account_id, op_type, operation_id) DO NOTHING
            "#,
        )
        .bind(pending.key.account_id)
        .bind(pending.key.op_type)
        .bind(&pending.key.operation_id)
        .bind(&pending.request_json)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn finalize(
        &self,
        tx: &mut PgTx,
        key: &OperationKey,
        outcome: &OperationOutcome,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE operations
            SET status_code = $4, response_json = $5, finalized_at = NOW()
            WHERE account_id = $1 AND op_type = $2 AND operation_id = $3
              AND status_code IS NULL
            "#,
        )
        .bind(key.account_id)
        .bind(key.op_type)
        .bind(&key.operation_id)
        .bind(outcome.status_code())
        .bind(outcome.payload())
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() != 1 {
            return Err(LedgerError::Internal(format!(
                "操作 {} 不处于待定状态，无法写入结果",
                key.operation_id
            )));
        }
        Ok(())
    }
}
