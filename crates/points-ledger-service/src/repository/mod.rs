//! 数据库仓储层
//!
//! 提供所有实体的数据访问接口，封装 SQL 操作细节。
//!
//! ## 设计原则
//!
//! - 仓储只负责数据持久化，不包含业务逻辑
//! - 使用 SQLx 进行类型安全的数据库操作
//! - 事务控制由调用方（服务层）决定，每个方法都接收事务句柄
//! - 定义 trait 接口，服务层可在 PostgreSQL 与内存实现之间切换

mod account_repo;
mod event_repo;
pub mod memory;
mod operation_repo;
mod ruleset_repo;
mod traits;
mod tx;

pub use account_repo::AccountRepository;
pub use event_repo::LedgerEventRepository;
pub use memory::{MemoryLedgerStore, MemoryTx};
pub use operation_repo::OperationRepository;
pub use ruleset_repo::RulesetRepository;
pub use traits::*;
pub use tx::{PgTx, PgTxManager};

use sqlx::PgPool;

use crate::error::LedgerError;

/// 把读回数据的校验失败转换为数据损坏错误
pub(crate) fn corrupted(table: &'static str) -> impl Fn(LedgerError) -> LedgerError {
    move |e| LedgerError::Corruption(format!("{table} 中的数据不合法: {}", e.message()))
}

/// PostgreSQL 账本存储
#[derive(Clone)]
pub struct PgStorage {
    transactions: PgTxManager,
    accounts: AccountRepository,
    rulesets: RulesetRepository,
    events: LedgerEventRepository,
    operations: OperationRepository,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            transactions: PgTxManager::new(pool),
            accounts: AccountRepository::new(),
            rulesets: RulesetRepository::new(),
            events: LedgerEventRepository::new(),
            operations: OperationRepository::new(),
        }
    }
}

impl LedgerStorage for PgStorage {
    type Tx = PgTx;
    type Transactions = PgTxManager;
    type Accounts = AccountRepository;
    type Rulesets = RulesetRepository;
    type Events = LedgerEventRepository;
    type Operations = OperationRepository;

    fn transactions(&self) -> &PgTxManager {
        &self.transactions
    }

    fn accounts(&self) -> &AccountRepository {
        &self.accounts
    }

    fn rulesets(&self) -> &RulesetRepository {
        &self.rulesets
    }

    fn events(&self) -> &LedgerEventRepository {
        &self.events
    }

    fn operations(&self) -> &OperationRepository {
        &self.operations
    }
}
