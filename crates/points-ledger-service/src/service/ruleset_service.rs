//! 规则集管理服务
//!
//! 创建规则集时解析金额与百分比字符串、校验并排序等级，
//! 然后在同一事务中写入规则集与全部等级。规则集创建后不可修改。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use points_shared::observability::metrics as ledger_metrics;
use tracing::{info, instrument};

use super::dto::CreateRulesetRequest;
use crate::clock::Clock;
use crate::error::{LedgerError, Result};
use crate::models::{LevelCode, LevelRule, Money, NewRuleset, Percent, Ruleset};
use crate::repository::{LedgerStorage, RulesetStore, TxManager};
use crate::rules::{prepare_levels, validate_base_rate};

/// 规则集列表单页上限
const MAX_LIST_LIMIT: i64 = 100;

/// 规则集管理服务
pub struct RulesetService<S: LedgerStorage> {
    storage: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S: LedgerStorage> RulesetService<S> {
    pub fn new(storage: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// 创建规则集
    #[instrument(skip(self, request), fields(effective_from = %request.effective_from))]
    pub async fn create_ruleset(&self, actor_user_id: i64, request: CreateRulesetRequest) -> Result<Ruleset> {
        let new_ruleset = Self::build_ruleset(actor_user_id, request)?;

        let transactions = self.storage.transactions();
        let mut tx = transactions.begin().await?;
        let created = match self.storage.rulesets().create(&mut tx, &new_ruleset).await {
            Ok(created) => created,
            Err(err) => {
                transactions.rollback(tx).await?;
                return Err(err);
            }
        };
        transactions.commit(tx).await?;

        ledger_metrics::record_ruleset_created();
        info!(
            ruleset_id = created.id,
            levels = created.levels.len(),
            base_rub_per_point = %created.base_rub_per_point,
            "规则集创建成功"
        );

        Ok(created)
    }

    /// 分页列出规则集（按生效时间倒序）
    #[instrument(skip(self))]
    pub async fn list_rulesets(&self, limit: i64, offset: i64) -> Result<Vec<Ruleset>> {
        let limit = limit.clamp(1, MAX_LIST_LIMIT);
        let offset = offset.max(0);

        let transactions = self.storage.transactions();
        let mut tx = transactions.begin().await?;
        let rulesets = self.storage.rulesets().list(&mut tx, limit, offset).await;
        transactions.rollback(tx).await?;
        rulesets
    }

    /// 查询指定时间点生效的规则集，缺省为当前时间
    #[instrument(skip(self))]
    pub async fn get_effective_ruleset(&self, at: Option<DateTime<Utc>>) -> Result<Ruleset> {
        let at = at.unwrap_or_else(|| self.clock.now());

        let transactions = self.storage.transactions();
        let mut tx = transactions.begin().await?;
        let ruleset = self.storage.rulesets().get_effective_at(&mut tx, at).await;
        transactions.rollback(tx).await?;

        ruleset?.ok_or_else(|| {
            LedgerError::InvalidRuleset(format!("{} 时没有生效的规则集", at.to_rfc3339()))
        })
    }

    fn build_ruleset(actor_user_id: i64, request: CreateRulesetRequest) -> Result<NewRuleset> {
        let base_rub_per_point = Money::parse(&request.base_rub_per_point)?;
        validate_base_rate(base_rub_per_point)?;

        let levels = request
            .levels
            .into_iter()
            .map(|input| {
                Ok(LevelRule {
                    id: 0,
                    level_code: LevelCode::new(input.level_code.trim()),
                    threshold_total_spend: Money::parse(&input.threshold_total_spend)?,
                    percent_earn: Percent::parse(&input.percent_earn)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(NewRuleset {
            effective_from: request.effective_from,
            base_rub_per_point,
            levels: prepare_levels(&levels)?,
            created_by: Some(actor_user_id),
        })
    }
}
