//! 内存存储
//!
//! 实现全部存储接口的内存版本，适用于测试和本地开发环境。
//!
//! 事务是整库串行化的：`begin` 获取全局互斥锁并复制一份工作副本，
//! `commit` 把工作副本写回，未提交就 drop 时副本被丢弃，效果等同回滚。
//!
//! 由于整库串行化，`lock_by_id` 在这里不会真正发生等待，基于本存储的并发测试
//! 只能验证业务结果（如同一余额只能被花费一次），不能验证行锁本身。
//! 行锁与唯一约束冲突的行为由 `tests/pg_ledger_test.rs` 中的 PostgreSQL 测试覆盖。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::traits::{
    AccountStore, EventStore, LedgerStorage, OperationLog, RulesetStore, TxManager,
};
use crate::error::{LedgerError, Result};
use crate::models::{
    Account, EventDraft, LedgerEvent, LevelCode, LevelRule, Money, NewRuleset, OperationKey,
    OperationOutcome, OperationRecord, PendingOperation, Points, PublicCode, Ruleset,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    accounts: BTreeMap<i64, Account>,
    rulesets: BTreeMap<DateTime<Utc>, Ruleset>,
    events: Vec<LedgerEvent>,
    operations: HashMap<OperationKey, OperationRecord>,
    next_account_id: i64,
    next_ruleset_id: i64,
    next_level_id: i64,
    next_event_id: i64,
}

impl MemoryState {
    fn next_id(counter: &mut i64) -> i64 {
        *counter += 1;
        *counter
    }

    fn account(&self, id: i64) -> Result<&Account> {
        self.accounts
            .get(&id)
            .ok_or_else(|| LedgerError::AccountNotFound(format!("id={id}")))
    }

    fn account_mut(&mut self, id: i64) -> Result<&mut Account> {
        self.accounts
            .get_mut(&id)
            .ok_or_else(|| LedgerError::AccountNotFound(format!("id={id}")))
    }
}

/// 内存事务
///
/// 持有全局锁期间其他事务在 `begin` 处等待
pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

/// 内存账本存储
#[derive(Debug, Clone, Default)]
pub struct MemoryLedgerStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryLedgerStore {
    /// 创建新的内存存储实例
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TxManager for MemoryLedgerStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(MemoryTx { guard, working })
    }

    async fn commit(&self, tx: MemoryTx) -> Result<()> {
        let MemoryTx { mut guard, working } = tx;
        *guard = working;
        Ok(())
    }

    async fn rollback(&self, tx: MemoryTx) -> Result<()> {
        drop(tx);
        Ok(())
    }
}

#[async_trait]
impl AccountStore<MemoryTx> for MemoryLedgerStore {
    async fn create(
        &self,
        tx: &mut MemoryTx,
        public_code: &PublicCode,
        level_code: &LevelCode,
    ) -> Result<Option<Account>> {
        let state = &mut tx.working;
        if state.accounts.values().any(|a| &a.public_code == public_code) {
            return Ok(None);
        }

        let id = MemoryState::next_id(&mut state.next_account_id);
        let account = Account {
            id,
            public_code: public_code.clone(),
            balance_points: Points::ZERO,
            total_spend_money: Money::ZERO,
            level_code: level_code.clone(),
            created_at: Utc::now(),
        };
        state.accounts.insert(id, account.clone());
        Ok(Some(account))
    }

    async fn get_by_public_code(
        &self,
        tx: &mut MemoryTx,
        public_code: &PublicCode,
    ) -> Result<Option<Account>> {
        Ok(tx
            .working
            .accounts
            .values()
            .find(|a| &a.public_code == public_code)
            .cloned())
    }

    async fn lock_by_id(&self, tx: &mut MemoryTx, id: i64) -> Result<Account> {
        tx.working.account(id).cloned()
    }

    async fn update_after_earn(
        &self,
        tx: &mut MemoryTx,
        id: i64,
        balance: Points,
        total_spend: Money,
        level_code: &LevelCode,
    ) -> Result<Account> {
        let account = tx.working.account_mut(id)?;
        account.balance_points = balance;
        account.total_spend_money = total_spend;
        account.level_code = level_code.clone();
        Ok(account.clone())
    }

    async fn update_after_spend(
        &self,
        tx: &mut MemoryTx,
        id: i64,
        balance: Points,
    ) -> Result<Account> {
        let account = tx.working.account_mut(id)?;
        account.balance_points = balance;
        Ok(account.clone())
    }
}

#[async_trait]
impl RulesetStore<MemoryTx> for MemoryLedgerStore {
    async fn get_effective_at(
        &self,
        tx: &mut MemoryTx,
        at: DateTime<Utc>,
    ) -> Result<Option<Ruleset>> {
        Ok(tx
            .working
            .rulesets
            .range(..=at)
            .next_back()
            .map(|(_, ruleset)| ruleset.clone()))
    }

    async fn create(&self, tx: &mut MemoryTx, ruleset: &NewRuleset) -> Result<Ruleset> {
        let state = &mut tx.working;
        if state.rulesets.contains_key(&ruleset.effective_from) {
            return Err(LedgerError::InvalidRuleset(format!(
                "生效时间 {} 已存在规则集",
                ruleset.effective_from.to_rfc3339()
            )));
        }

        let id = MemoryState::next_id(&mut state.next_ruleset_id);
        let mut levels: Vec<LevelRule> = ruleset
            .levels
            .iter()
            .map(|level| LevelRule {
                id: MemoryState::next_id(&mut state.next_level_id),
                ..level.clone()
            })
            .collect();
        levels.sort_by(|a, b| a.threshold_total_spend.cmp(&b.threshold_total_spend));

        let created = Ruleset {
            id,
            effective_from: ruleset.effective_from,
            base_rub_per_point: ruleset.base_rub_per_point,
            levels,
            created_by: ruleset.created_by,
            created_at: Utc::now(),
        };
        state.rulesets.insert(created.effective_from, created.clone());
        Ok(created)
    }

    async fn list(&self, tx: &mut MemoryTx, limit: i64, offset: i64) -> Result<Vec<Ruleset>> {
        Ok(tx
            .working
            .rulesets
            .values()
            .rev()
            .skip(usize::try_from(offset).unwrap_or(0))
            .take(usize::try_from(limit).unwrap_or(0))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl EventStore<MemoryTx> for MemoryLedgerStore {
    async fn insert(&self, tx: &mut MemoryTx, draft: &EventDraft) -> Result<LedgerEvent> {
        let state = &mut tx.working;
        state.account(draft.account_id)?;

        let id = MemoryState::next_id(&mut state.next_event_id);
        let event = draft.clone().into_event(id, Utc::now());
        state.events.push(event.clone());
        Ok(event)
    }

    async fn list_by_account(
        &self,
        tx: &mut MemoryTx,
        account_id: i64,
        limit: i64,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<LedgerEvent>> {
        let mut events: Vec<LedgerEvent> = tx
            .working
            .events
            .iter()
            .filter(|e| e.account_id == account_id)
            .filter(|e| before.is_none_or(|b| e.ts < b))
            .cloned()
            .collect();
        events.sort_by(|a, b| b.ts.cmp(&a.ts).then(b.id.cmp(&a.id)));
        events.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(events)
    }
}

#[async_trait]
impl OperationLog<MemoryTx> for MemoryLedgerStore {
    async fn get(&self, tx: &mut MemoryTx, key: &OperationKey) -> Result<Option<OperationRecord>> {
        Ok(tx.working.operations.get(key).cloned())
    }

    async fn insert_pending(&self, tx: &mut MemoryTx, pending: &PendingOperation) -> Result<bool> {
        let operations = &mut tx.working.operations;
        if operations.contains_key(&pending.key) {
            return Ok(false);
        }
        operations.insert(
            pending.key.clone(),
            OperationRecord {
                key: pending.key.clone(),
                request_json: pending.request_json.clone(),
                status_code: None,
                response_json: None,
                created_at: Utc::now(),
                finalized_at: None,
            },
        );
        Ok(true)
    }

    async fn finalize(
        &self,
        tx: &mut MemoryTx,
        key: &OperationKey,
        outcome: &OperationOutcome,
    ) -> Result<()> {
        let record = tx
            .working
            .operations
            .get_mut(key)
            .filter(|r| !r.is_finalized())
            .ok_or_else(|| {
                LedgerError::Internal(format!(
                    "操作 {} 不处于待定状态，无法写入结果",
                    key.operation_id
                ))
            })?;
        record.status_code = Some(outcome.status_code());
        record.response_json = Some(outcome.payload().clone());
        record.finalized_at = Some(Utc::now());
        Ok(())
    }
}

impl LedgerStorage for MemoryLedgerStore {
    type Tx = MemoryTx;
    type Transactions = Self;
    type Accounts = Self;
    type Rulesets = Self;
    type Events = Self;
    type Operations = Self;

    fn transactions(&self) -> &Self {
        self
    }

    fn accounts(&self) -> &Self {
        self
    }

    fn rulesets(&self) -> &Self {
        self
    }

    fn events(&self) -> &Self {
        self
    }

    fn operations(&self) -> &Self {
        self
    }
}
