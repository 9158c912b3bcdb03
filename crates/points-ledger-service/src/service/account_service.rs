//! 账户开户服务
//!
//! 开户时生成随机公开码，冲突时重新生成。初始等级取当前生效规则集的基础等级，
//! 没有生效规则集时使用配置的默认等级。

use std::sync::Arc;

use points_shared::config::LedgerConfig;
use points_shared::observability::metrics as ledger_metrics;
use tracing::{info, instrument, warn};

use super::dto::AccountSummaryDto;
use crate::clock::Clock;
use crate::error::{LedgerError, Result};
use crate::models::{LevelCode, PublicCode};
use crate::repository::{AccountStore, LedgerStorage, RulesetStore, TxManager};

/// 开户参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountOpening {
    /// 公开码冲突时的最大尝试次数
    pub public_code_retries: u32,
    /// 没有生效规则集时的初始等级
    pub initial_level_code: String,
}

impl Default for AccountOpening {
    fn default() -> Self {
        Self {
            public_code_retries: 3,
            initial_level_code: "BASE".to_string(),
        }
    }
}

impl From<&LedgerConfig> for AccountOpening {
    fn from(config: &LedgerConfig) -> Self {
        Self {
            public_code_retries: config.public_code_retries,
            initial_level_code: config.initial_level_code.clone(),
        }
    }
}

/// 账户开户服务
pub struct AccountService<S: LedgerStorage> {
    storage: Arc<S>,
    clock: Arc<dyn Clock>,
    opening: AccountOpening,
}

impl<S: LedgerStorage> AccountService<S> {
    pub fn new(storage: Arc<S>, clock: Arc<dyn Clock>, opening: AccountOpening) -> Self {
        Self {
            storage,
            clock,
            opening,
        }
    }

    /// 开设新账户，余额与累计消费均为 0
    #[instrument(skip(self))]
    pub async fn open_account(&self) -> Result<AccountSummaryDto> {
        self.open_with(PublicCode::generate).await
    }

    async fn open_with<F>(&self, mut next_code: F) -> Result<AccountSummaryDto>
    where
        F: FnMut() -> PublicCode + Send,
    {
        let attempts = self.opening.public_code_retries.max(1);

        let transactions = self.storage.transactions();
        let mut tx = transactions.begin().await?;

        let level = match self.initial_level(&mut tx).await {
            Ok(level) => level,
            Err(err) => {
                transactions.rollback(tx).await?;
                return Err(err);
            }
        };

        for attempt in 1..=attempts {
            let code = next_code();
            match self.storage.accounts().create(&mut tx, &code, &level).await {
                Ok(Some(account)) => {
                    transactions.commit(tx).await?;
                    ledger_metrics::record_account_opened();
                    info!(
                        account_id = account.id,
                        level_code = %account.level_code,
                        "账户开户成功"
                    );
                    return Ok(AccountSummaryDto::from(account));
                }
                Ok(None) => {
                    warn!(attempt, "公开码冲突，重新生成");
                }
                Err(err) => {
                    transactions.rollback(tx).await?;
                    return Err(err);
                }
            }
        }

        transactions.rollback(tx).await?;
        Err(LedgerError::Internal(format!(
            "连续 {attempts} 次生成的公开码均冲突"
        )))
    }

    async fn initial_level(&self, tx: &mut S::Tx) -> Result<LevelCode> {
        let now = self.clock.now();
        let ruleset = self.storage.rulesets().get_effective_at(tx, now).await?;
        let level = ruleset
            .as_ref()
            .and_then(|r| r.baseline_level())
            .map(|l| l.level_code.clone())
            .unwrap_or_else(|| LevelCode::new(self.opening.initial_level_code.as_str()));
        Ok(level)
    }
}
