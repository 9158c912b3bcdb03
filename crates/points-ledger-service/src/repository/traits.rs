//! 仓储 Trait 定义
//!
//! 每个存储都是一个能力接口，所有方法都接收事务句柄 `&mut Tx`，
//! 由服务层决定事务边界。`LedgerStorage` 把事务管理器与四个存储
//! 绑定到同一个事务类型上，服务层只依赖这一抽象。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{
    Account, EventDraft, LedgerEvent, LevelCode, Money, NewRuleset, OperationKey,
    OperationOutcome, OperationRecord, PendingOperation, Points, PublicCode, Ruleset,
};

/// 事务边界
///
/// 未提交的事务句柄被 drop 时必须回滚（取消与超时依赖这一点）
#[async_trait]
pub trait TxManager: Send + Sync {
    type Tx: Send;

    async fn begin(&self) -> Result<Self::Tx>;
    async fn commit(&self, tx: Self::Tx) -> Result<()>;
    async fn rollback(&self, tx: Self::Tx) -> Result<()>;
}

/// 账户存储
#[async_trait]
pub trait AccountStore<Tx: Send>: Send + Sync {
    /// 创建账户；公开码已存在时返回 `None`
    async fn create(
        &self,
        tx: &mut Tx,
        public_code: &PublicCode,
        level_code: &LevelCode,
    ) -> Result<Option<Account>>;

    async fn get_by_public_code(&self, tx: &mut Tx, public_code: &PublicCode)
    -> Result<Option<Account>>;

    /// 获取账户并加排他行锁，直到事务结束
    async fn lock_by_id(&self, tx: &mut Tx, id: i64) -> Result<Account>;

    async fn update_after_earn(
        &self,
        tx: &mut Tx,
        id: i64,
        balance: Points,
        total_spend: Money,
        level_code: &LevelCode,
    ) -> Result<Account>;

    async fn update_after_spend(&self, tx: &mut Tx, id: i64, balance: Points) -> Result<Account>;
}

/// 规则集存储
#[async_trait]
pub trait RulesetStore<Tx: Send>: Send + Sync {
    /// `effective_from <= at` 中最新的规则集（含等级，按门槛升序）
    async fn get_effective_at(&self, tx: &mut Tx, at: DateTime<Utc>) -> Result<Option<Ruleset>>;

    /// 原子地创建规则集与等级；`effective_from` 重复返回 `InvalidRuleset`
    async fn create(&self, tx: &mut Tx, ruleset: &NewRuleset) -> Result<Ruleset>;

    /// 按 `effective_from` 倒序分页
    async fn list(&self, tx: &mut Tx, limit: i64, offset: i64) -> Result<Vec<Ruleset>>;
}

/// 流水存储
#[async_trait]
pub trait EventStore<Tx: Send>: Send + Sync {
    async fn insert(&self, tx: &mut Tx, draft: &EventDraft) -> Result<LedgerEvent>;

    /// 按 (ts, id) 倒序，`before` 为上一页最后一条的业务时间
    async fn list_by_account(
        &self,
        tx: &mut Tx,
        account_id: i64,
        limit: i64,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<LedgerEvent>>;
}

/// 幂等操作日志
#[async_trait]
pub trait OperationLog<Tx: Send>: Send + Sync {
    async fn get(&self, tx: &mut Tx, key: &OperationKey) -> Result<Option<OperationRecord>>;

    /// 插入待定记录；键已存在时不做任何事并返回 `false`
    async fn insert_pending(&self, tx: &mut Tx, pending: &PendingOperation) -> Result<bool>;

    /// 为待定记录写入最终结果
    async fn finalize(&self, tx: &mut Tx, key: &OperationKey, outcome: &OperationOutcome)
    -> Result<()>;
}

/// 账本存储组合
pub trait LedgerStorage: Send + Sync + 'static {
    type Tx: Send;
    type Transactions: TxManager<Tx = Self::Tx>;
    type Accounts: AccountStore<Self::Tx>;
    type Rulesets: RulesetStore<Self::Tx>;
    type Events: EventStore<Self::Tx>;
    type Operations: OperationLog<Self::Tx>;

    fn transactions(&self) -> &Self::Transactions;
    fn accounts(&self) -> &Self::Accounts;
    fn rulesets(&self) -> &Self::Rulesets;
    fn events(&self) -> &Self::Events;
    fn operations(&self) -> &Self::Operations;
}
