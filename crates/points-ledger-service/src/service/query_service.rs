//! 账户查询服务
//!
//! 提供账户与流水的只读查询。查询在只读事务中执行，不加行锁。

use std::sync::Arc;

use points_shared::config::LedgerConfig;
use tracing::{debug, instrument};

use super::dto::{AccountSummaryDto, EventsPage, EventsQuery};
use crate::error::{LedgerError, Result};
use crate::models::{Account, PublicCode};
use crate::repository::{AccountStore, EventStore, LedgerStorage, TxManager};

/// 分页条数限制
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_limit: i64,
    pub max_limit: i64,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
        }
    }
}

impl From<&LedgerConfig> for PageLimits {
    fn from(config: &LedgerConfig) -> Self {
        Self {
            default_limit: config.default_page_limit,
            max_limit: config.max_page_limit,
        }
    }
}

impl PageLimits {
    /// 规范化请求条数：缺省或非正数取默认值，超过上限取上限
    pub fn normalize(&self, requested: Option<i64>) -> i64 {
        match requested {
            Some(limit) if limit > 0 => limit.min(self.max_limit),
            _ => self.default_limit.min(self.max_limit),
        }
    }
}

/// 账户查询服务
pub struct QueryService<S: LedgerStorage> {
    storage: Arc<S>,
    limits: PageLimits,
}

impl<S: LedgerStorage> QueryService<S> {
    pub fn new(storage: Arc<S>, limits: PageLimits) -> Self {
        Self { storage, limits }
    }

    /// 按公开码查询账户摘要
    #[instrument(skip(self))]
    pub async fn lookup_account_by_public_code(&self, public_code: &str) -> Result<AccountSummaryDto> {
        let code = PublicCode::parse(public_code)?;

        let transactions = self.storage.transactions();
        let mut tx = transactions.begin().await?;
        let account = self.find_account(&mut tx, &code).await;
        transactions.rollback(tx).await?;

        Ok(AccountSummaryDto::from(account?))
    }

    /// 分页查询账户流水（按业务时间倒序）
    #[instrument(skip(self))]
    pub async fn list_account_events(&self, public_code: &str, query: EventsQuery) -> Result<EventsPage> {
        let code = PublicCode::parse(public_code)?;
        let limit = self.limits.normalize(query.limit);

        let transactions = self.storage.transactions();
        let mut tx = transactions.begin().await?;
        let items = match self.find_account(&mut tx, &code).await {
            Ok(account) => {
                self.storage
                    .events()
                    .list_by_account(&mut tx, account.id, limit, query.before_ts)
                    .await
            }
            Err(err) => Err(err),
        };
        transactions.rollback(tx).await?;
        let items = items?;

        let next_before_ts = if items.len() as i64 == limit {
            items.last().map(|e| e.ts)
        } else {
            None
        };
        debug!(count = items.len(), limit, "查询流水");

        Ok(EventsPage {
            items,
            next_before_ts,
        })
    }

    async fn find_account(&self, tx: &mut S::Tx, code: &PublicCode) -> Result<Account> {
        self.storage
            .accounts()
            .get_by_public_code(tx, code)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(code.to_string()))
    }
}
