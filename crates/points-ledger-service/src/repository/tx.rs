//! PostgreSQL 事务管理

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use super::traits::TxManager;
use crate::error::Result;

/// PostgreSQL 事务句柄
///
/// sqlx 的事务在未提交时 drop 会自动回滚
pub type PgTx = Transaction<'static, Postgres>;

/// PostgreSQL 事务管理器
#[derive(Clone)]
pub struct PgTxManager {
    pool: PgPool,
}

impl PgTxManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TxManager for PgTxManager {
    type Tx = PgTx;

    async fn begin(&self) -> Result<PgTx> {
        Ok(self.pool.begin().await?)
    }

    async fn commit(&self, tx: PgTx) -> Result<()> {
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&self, tx: PgTx) -> Result<()> {
        tx.rollback().await?;
        Ok(())
    }
}
