//! 规则集仓储（PostgreSQL）

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::corrupted;
use super::traits::RulesetStore;
use super::tx::PgTx;
use crate::error::{LedgerError, Result};
use crate::models::{LevelCode, LevelRule, Money, NewRuleset, Percent, Ruleset};

#[derive(Debug, sqlx::FromRow)]
struct RulesetRow {
    id: i64,
    effective_from: DateTime<Utc>,
    base_rub_per_point: Decimal,
    created_by: Option<i64>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct LevelRuleRow {
    id: i64,
    ruleset_id: i64,
    level_code: String,
    threshold_total_spend: Decimal,
    percent_earn: Decimal,
}

impl TryFrom<LevelRuleRow> for LevelRule {
    type Error = LedgerError;

    fn try_from(row: LevelRuleRow) -> Result<Self> {
        Ok(LevelRule {
            id: row.id,
            level_code: LevelCode::new(row.level_code),
            threshold_total_spend: Money::from_decimal(row.threshold_total_spend)
                .map_err(corrupted("level_rules"))?,
            percent_earn: Percent::from_decimal(row.percent_earn)
                .map_err(corrupted("level_rules"))?,
        })
    }
}

impl RulesetRow {
    fn into_ruleset(self, levels: Vec<LevelRule>) -> Result<Ruleset> {
        Ok(Ruleset {
            id: self.id,
            effective_from: self.effective_from,
            base_rub_per_point: Money::from_decimal(self.base_rub_per_point)
                .map_err(corrupted("rulesets"))?,
            levels,
            created_by: self.created_by,
            created_at: self.created_at,
        })
    }
}

/// 规则集仓储
#[derive(Debug, Clone, Copy, Default)]
pub struct RulesetRepository;

impl RulesetRepository {
    pub fn new() -> Self {
        Self
    }

    /// 批量加载等级，按规则集分组（组内按门槛升序）
    async fn load_levels(
        tx: &mut PgTx,
        ruleset_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<LevelRule>>> {
        let rows = sqlx::query_as::<_, LevelRuleRow>(
            r#"
            SELECT id, ruleset_id, level_code, threshold_total_spend, percent_earn
            FROM level_rules
            WHERE ruleset_id = ANY($1)
            ORDER BY ruleset_id, threshold_total_spend ASC
            "#,
        )
        .bind(ruleset_ids)
        .fetch_all(&mut **tx)
        .await?;

        let mut grouped: HashMap<i64, Vec<LevelRule>> = HashMap::new();
        for row in rows {
            let ruleset_id = row.ruleset_id;
            grouped
                .entry(ruleset_id)
                .or_default()
                .push(LevelRule::try_from(row)?);
        }
        Ok(grouped)
    }
}

#[async_trait]
impl RulesetStore<PgTx> for RulesetRepository {
    async fn get_effective_at(&self, tx: &mut PgTx, at: DateTime<Utc>) -> Result<Option<Ruleset>> {
        let row = sqlx::query_as::<_, RulesetRow>(
            r#"
            SELECT id, effective_from, base_rub_per_point, created_by, created_at
            FROM rulesets
            WHERE effective_from <= $1
            ORDER BY effective_from DESC
            LIMIT 1
            "#,
        )
        .bind(at)
        .fetch_optional(&mut **tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut levels = Self::load_levels(tx, &[row.id]).await?;
        let levels = levels.remove(&row.id).unwrap_or_default();
        row.into_ruleset(levels).map(Some)
    }

    async fn create(&self, tx: &mut PgTx, ruleset: &NewRuleset) -> Result<Ruleset> {
        let row = sqlx::query_as::<_, RulesetRow>(
            r#"
            INSERT INTO rulesets (effective_from, base_rub_per_point, created_by)
            VALUES ($1, $2, $3)
            RETURNING id, effective_from, base_rub_per_point, created_by, created_at
            "#,
        )
        .bind(ruleset.effective_from)
        .bind(ruleset.base_rub_per_point.value())
        .bind(ruleset.created_by)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                LedgerError::InvalidRuleset(format!(
                    "生效时间 {} 已存在规则集",
                    ruleset.effective_from.to_rfc3339()
                ))
            }
            other => LedgerError::Database(other),
        })?;

        let mut levels = Vec::with_capacity(ruleset.levels.len());
        for level in &ruleset.levels {
            let level_id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO level_rules (ruleset_id, level_code, threshold_total_spend, percent_earn)
                VALUES ($1, $2, $3, $4)
                RETURNING id
                "#,
            )
            .bind(row.id)
            .bind(level.level_code.as_str())
            .bind(level.threshold_total_spend.value())
            .bind(level.percent_earn.value())
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                    LedgerError::InvalidLevels(format!(
                        "等级 {} 与同规则集的其他等级冲突",
                        level.level_code
                    ))
                }
                other => LedgerError::Database(other),
            })?;

            levels.push(LevelRule {
                id: level_id,
                ..level.clone()
            });
        }

        row.into_ruleset(levels)
    }

    async fn list(&self, tx: &mut PgTx, limit: i64, offset: i64) -> Result<Vec<Ruleset>> {
        let rows = sqlx::query_as::<_, RulesetRow>(
            r#"
            SELECT id, effective_from, base_rub_per_point, created_by, created_at
            FROM rulesets
            ORDER BY effective_from DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut **tx)
        .await?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let mut levels = Self::load_levels(tx, &ids).await?;

        rows.into_iter()
            .map(|row| {
                let row_levels = levels.remove(&row.id).unwrap_or_default();
                row.into_ruleset(row_levels)
            })
            .collect()
    }
}
