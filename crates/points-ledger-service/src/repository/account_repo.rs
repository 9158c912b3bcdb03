//! 账户仓储（PostgreSQL）

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::corrupted;
use super::traits::AccountStore;
use super::tx::PgTx;
use crate::error::{LedgerError, Result};
use crate::models::{Account, LevelCode, Money, Points, PublicCode};

const ACCOUNT_COLUMNS: &str =
    "id, public_code, balance_points, total_spend_money, level_code, created_at";

#[derive(Debug, sqlx::FromRow)]
struct AccountRow {
    id: i64,
    public_code: String,
    balance_points: i64,
    total_spend_money: Decimal,
    level_code: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = LedgerError;

    fn try_from(row: AccountRow) -> Result<Self> {
        Ok(Account {
            id: row.id,
            public_code: PublicCode::parse(&row.public_code).map_err(corrupted("accounts"))?,
            balance_points: Points::non_negative(row.balance_points)
                .map_err(corrupted("accounts"))?,
            total_spend_money: Money::from_decimal(row.total_spend_money)
                .map_err(corrupted("accounts"))?,
            level_code: LevelCode::new(row.level_code),
            created_at: row.created_at,
        })
    }
}

/// 账户仓储
#[derive(Debug, Clone, Copy, Default)]
pub struct AccountRepository;

impl AccountRepository {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AccountStore<PgTx> for AccountRepository {
    async fn create(
        &self,
        tx: &mut PgTx,
        public_code: &PublicCode,
        level_code: &LevelCode,
    ) -> Result<Option<Account>> {
        let sql = format!(
            r#"
            INSERT INTO accounts (public_code, balance_points, total_spend_money, level_code)
            VALUES ($1, 0, 0, $2)
            ON CONFLICT (public_code) DO NOTHING
            RETURNING {ACCOUNT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(public_code.as_str())
            .bind(level_code.as_str())
            .fetch_optional(&mut **tx)
            .await?;

        row.map(Account::try_from).transpose()
    }

    async fn get_by_public_code(
        &self,
        tx: &mut PgTx,
        public_code: &PublicCode,
    ) -> Result<Option<Account>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE public_code = $1");
        let row = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(public_code.as_str())
            .fetch_optional(&mut **tx)
            .await?;

        row.map(Account::try_from).transpose()
    }

    /// 使用 FOR UPDATE 锁定行，同一账户的并发记账在此串行化
    async fn lock_by_id(&self, tx: &mut PgTx, id: i64) -> Result<Account> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 FOR UPDATE");
        let row = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(format!("id={id}")))?;

        Account::try_from(row)
    }

    async fn update_after_earn(
        &self,
        tx: &mut PgTx,
        id: i64,
        balance: Points,
        total_spend: Money,
        level_code: &LevelCode,
    ) -> Result<Account> {
        let sql = format!(
            r#"
            UPDATE accounts
            SET balance_points = $2, total_spend_money = $3, level_code = $4, updated_at = NOW()
            WHERE id = $1
            RETURNING {ACCOUNT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(id)
            .bind(balance.value())
            .bind(total_spend.value())
            .bind(level_code.as_str())
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(format!("id={id}")))?;

        Account::try_from(row)
    }

    async fn update_after_spend(&self, tx: &mut PgTx, id: i64, balance: Points) -> Result<Account> {
        let sql = format!(
            r#"
            UPDATE accounts
            SET balance_points = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {ACCOUNT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(id)
            .bind(balance.value())
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(format!("id={id}")))?;

        Account::try_from(row)
    }
}
