//! 积分流水仓储（PostgreSQL）
//!
//! 流水只追加，不提供更新与删除

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::corrupted;
use super::traits::EventStore;
use super::tx::PgTx;
use crate::error::{LedgerError, Result};
use crate::models::{EventDraft, EventType, LedgerEvent, Money, Points};

#[derive(Debug, sqlx::FromRow)]
struct LedgerEventRow {
    id: i64,
    account_id: i64,
    event_type: EventType,
    delta_points: i64,
    balance_after: i64,
    amount_money: Option<Decimal>,
    ruleset_id: Option<i64>,
    actor_user_id: Option<i64>,
    ts: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl TryFrom<LedgerEventRow> for LedgerEvent {
    type Error = LedgerError;

    fn try_from(row: LedgerEventRow) -> Result<Self> {
        Ok(LedgerEvent {
            id: row.id,
            account_id: row.account_id,
            event_type: row.event_type,
            delta_points: Points::new(row.delta_points),
            balance_after: Points::non_negative(row.balance_after)
                .map_err(corrupted("ledger_events"))?,
            amount_money: row
                .amount_money
                .map(Money::from_decimal)
                .transpose()
                .map_err(corrupted("ledger_events"))?,
            ruleset_id: row.ruleset_id,
            actor_user_id: row.actor_user_id,
            ts: row.ts,
            created_at: row.created_at,
        })
    }
}

/// 积分流水仓储
#[derive(Debug, Clone, Copy, Default)]
pub struct LedgerEventRepository;

impl LedgerEventRepository {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventStore<PgTx> for LedgerEventRepository {
    async fn insert(&self, tx: &mut PgTx, draft: &EventDraft) -> Result<LedgerEvent> {
        let (id, ts, created_at): (i64, DateTime<Utc>, DateTime<Utc>) = sqlx::query_as(
            r#"
            INSERT INTO ledger_events (
                account_id, event_type, delta_points, balance_after,
                amount_money, ruleset_id, actor_user_id, ts
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, ts, created_at
            "#,
        )
        .bind(draft.account_id)
        .bind(draft.event_type)
        .bind(draft.delta_points.value())
        .bind(draft.balance_after.value())
        .bind(draft.amount_money.map(|m| m.value()))
        .bind(draft.ruleset_id)
        .bind(draft.actor_user_id)
        .bind(draft.ts)
        .fetch_one(&mut **tx)
        .await?;

        // 以库中存储的 ts（微秒精度）为准
        Ok(LedgerEvent {
            ts,
            ..draft.clone().into_event(id, created_at)
        })
    }

    async fn list_by_account(
        &self,
        tx: &mut PgTx,
        account_id: i64,
        limit: i64,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<LedgerEvent>> {
        let rows = sqlx::query_as::<_, LedgerEventRow>(
            r#"
            SELECT id, account_id, event_type, delta_points, balance_after,
                   amount_money, ruleset_id, actor_user_id, ts, created_at
            FROM ledger_events
            WHERE account_id = $1
              AND ($2::timestamptz IS NULL OR ts < $2)
            ORDER BY ts DESC, id DESC
            LIMIT $3
            "#,
        )
        .bind(account_id)
        .bind(before)
        .bind(limit)
        .fetch_all(&mut **tx)
        .await?;

        rows.into_iter().map(LedgerEvent::try_from).collect()
    }
}
